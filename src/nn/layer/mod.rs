/*
 * @Author       : 老董
 * @Date         : 2025-12-22
 * @Description  : Layer 模块：持有参数的层。层本身不做图的构建，由计算图中的节点引用它们完成计算
 */

mod activation;
mod linear;
mod recurrent;

pub use activation::Activation;
pub use linear::Linear;
pub use recurrent::{CellType, Gate, RecurrentLayer};

/// 分类头中的单输入层：仿射变换或激活函数
#[derive(Debug)]
pub enum Layer {
    Affine(Linear),
    Activation(Activation),
}

impl Layer {
    pub fn output_size(&self, input_size: usize) -> usize {
        match self {
            Self::Affine(linear) => linear.output_size(),
            Self::Activation(_) => input_size,
        }
    }

    pub fn parameters(&self) -> Vec<crate::nn::SharedParameter> {
        match self {
            Self::Affine(linear) => linear.parameters(),
            Self::Activation(_) => Vec::new(),
        }
    }
}
