/*
 * @Author       : 老董
 * @Date         : 2024-01-31 20:30:11
 * @Description  : 计算图（每个句子一张）：节点存放在arena中并以下标引用，
 *                 节点只能引用已插入的节点，所以插入顺序天然是一个拓扑序。
 *                 前向按显式给定的调度序列执行，反向按其镜像执行
 */

mod error;
mod propagation;

pub use error::GraphError;

use std::rc::Rc;

use crate::nn::layer::{Layer, Linear, RecurrentLayer};
use crate::nn::nodes::raw_node::{
    Composite, Constant, GruCell, InitialState, Lookup, LstmCell, NodeType, RnnCell, Simple,
    TraitNode,
};
use crate::nn::nodes::{NodeHandle, NodeState};
use crate::nn::{CellType, NodeId, SharedParameter};
use crate::tensor::Tensor;

#[derive(Default)]
pub struct Graph {
    nodes: Vec<NodeHandle>,
    /// 前向调度序列。由构建顺序决定：调用方按前向遍历的顺序添加节点
    schedule: Vec<NodeId>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Graph({}个节点)", self.nodes.len())
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 前向调度序列；`backward`按其逆序执行
    pub fn schedule(&self) -> &[NodeId] {
        &self.schedule
    }

    pub(crate) fn get_node(&self, id: NodeId) -> Result<&NodeHandle, GraphError> {
        self.nodes.get(id.0).ok_or(GraphError::NodeNotFound(id))
    }

    fn get_node_mut(&mut self, id: NodeId) -> Result<&mut NodeHandle, GraphError> {
        self.nodes.get_mut(id.0).ok_or(GraphError::NodeNotFound(id))
    }

    fn parent_states(&self, parents: &[NodeId]) -> Result<Vec<&NodeState>, GraphError> {
        for (k, p) in parents.iter().enumerate() {
            if parents[..k].contains(p) {
                return Err(GraphError::InvalidOperation(format!(
                    "同一个父节点{p}不能重复出现"
                )));
            }
        }
        parents
            .iter()
            .map(|&p| self.get_node(p).map(NodeHandle::state))
            .collect()
    }

    fn push<T: Into<NodeType>>(&mut self, raw_node: T, parents: &[NodeId]) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes
            .push(NodeHandle::new(id, raw_node, parents.to_vec()));
        self.schedule.push(id);
        id
    }

    /*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓节点构建↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
    pub fn lookup(&mut self, param: SharedParameter) -> Result<NodeId, GraphError> {
        let node = Lookup::new(param)?;
        Ok(self.push(node, &[]))
    }

    pub fn constant(&mut self, value: Tensor) -> Result<NodeId, GraphError> {
        let node = Constant::new(value)?;
        Ok(self.push(node, &[]))
    }

    pub fn initial_state(&mut self, layer: &Rc<RecurrentLayer>) -> NodeId {
        self.push(InitialState::new(layer), &[])
    }

    pub fn composite(
        &mut self,
        linear: &Rc<Linear>,
        inputs: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        let node = Composite::new(linear.clone(), &self.parent_states(inputs)?)?;
        Ok(self.push(node, inputs))
    }

    pub fn simple(&mut self, layer: &Rc<Layer>, input: NodeId) -> Result<NodeId, GraphError> {
        let node = Simple::new(layer.clone(), &self.parent_states(&[input])?)?;
        Ok(self.push(node, &[input]))
    }

    /// 添加一个循环单元节点：`pred`为前一时刻的状态（或初始状态）节点，`inputs`为当前时刻的输入节点
    pub fn recurrent(
        &mut self,
        layer: &Rc<RecurrentLayer>,
        pred: NodeId,
        inputs: &[NodeId],
    ) -> Result<NodeId, GraphError> {
        let mut parents = vec![pred];
        parents.extend_from_slice(inputs);
        let states = self.parent_states(&parents)?;
        let node: NodeType = match layer.cell_type() {
            CellType::Rnn => RnnCell::new(layer.clone(), &states)?.into(),
            CellType::Gru => GruCell::new(layer.clone(), &states)?.into(),
            CellType::Lstm => LstmCell::new(layer.clone(), &states)?.into(),
        };
        Ok(self.push(node, &parents))
    }
    /*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑节点构建↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

    pub fn value(&self, id: NodeId) -> Result<&Tensor, GraphError> {
        Ok(self.get_node(id)?.value())
    }

    pub fn grad(&self, id: NodeId) -> Result<&Tensor, GraphError> {
        Ok(&self.get_node(id)?.state().grad)
    }

    /// LSTM相关节点的记忆单元c，其它节点返回None
    pub fn memory(&self, id: NodeId) -> Result<Option<&Tensor>, GraphError> {
        Ok(self.get_node(id)?.state().memory.as_ref())
    }

    /// 给softmax节点设置交叉熵的目标类别
    pub fn set_target(&mut self, id: NodeId, target: usize) -> Result<(), GraphError> {
        self.get_node_mut(id)?.raw_node_mut().set_target(target)
    }

    /// 所有带目标的softmax节点上的交叉熵之和：Σ -ln(p[target])
    pub fn loss(&self) -> f64 {
        self.nodes
            .iter()
            .filter_map(|node| {
                node.raw_node()
                    .target()
                    .map(|target| -node.value().get(target).ln())
            })
            .sum()
    }
}
