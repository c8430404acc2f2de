/*
 * @Author       : 老董
 * @Date         : 2024-01-31 20:23:53
 * @LastEditors  : 老董
 * @LastEditTime : 2025-01-04 19:37:27
 * @Description  : 负责神经网络（neural network）的构建：参数、查找表、层、节点与计算图
 */

mod graph;
pub mod layer;
mod lookup_table;
mod nodes;
mod parameter;
pub mod serialization;

pub use graph::{Graph, GraphError};
pub use layer::{Activation, CellType, Gate, Layer, Linear, RecurrentLayer};
pub use lookup_table::LookupTable;
pub use nodes::NodeId;
pub use parameter::{Parameter, SharedParameter, UpdateRule};

#[cfg(test)]
mod tests;
