use thiserror::Error;
mod ops;
pub use self::ops::*;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
    // 数字比较用
    #[error("{value_name}须{operator}{threshold}")]
    ValueMustSatisfyComparison {
        value_name: String,
        operator: ComparisonOperator,
        threshold: usize,
    },
    // 张量二元运算
    #[error(
        "形状不一致，故无法{operator}：第一个张量的形状为{tensor1_shape:?}，第二个张量的形状为{tensor2_shape:?}"
    )]
    OperatorError {
        operator: Operator,
        tensor1_shape: Vec<usize>,
        tensor2_shape: Vec<usize>,
    },
    #[error("数据长度{data_len}与形状{shape:?}不匹配")]
    DataShapeMismatch { data_len: usize, shape: Vec<usize> },
    #[error("该运算需要向量（1阶张量），但得到的形状为{0:?}")]
    NotAVector(Vec<usize>),
    #[error("该运算需要矩阵（2阶张量），但得到的形状为{0:?}")]
    NotAMatrix(Vec<usize>),
    #[error("索引{index}越界（张量元素个数为{size}）")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("张量为空")]
    Empty,
}
