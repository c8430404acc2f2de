use crate::tensor::Tensor;

/// 单输入、无参数的逐元素激活（softmax除外，它作用于整个向量）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    ReLU,
    Tanh,
    Sigmoid,
    Softmax,
}

impl Activation {
    pub fn forward(&self, x: &Tensor) -> Tensor {
        match self {
            Self::ReLU => x.relu(),
            Self::Tanh => x.tanh(),
            Self::Sigmoid => x.sigmoid(),
            Self::Softmax => x.softmax(),
        }
    }

    /// 由输出`y`和输出梯度`dy`求输入梯度
    pub fn backward(&self, y: &Tensor, dy: &Tensor) -> Tensor {
        match self {
            Self::ReLU => dy * &y.map(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Self::Tanh => dy * &y.map(|v| 1.0 - v * v),
            Self::Sigmoid => dy * &y.map(|v| v * (1.0 - v)),
            // dx = y ⊙ (dy - <dy, y>)
            Self::Softmax => {
                let dot = (dy * y).sum();
                y * &dy.map(|g| g - dot)
            }
        }
    }
}
