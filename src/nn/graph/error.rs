/*
 * @Author       : 老董
 * @Date         : 2026-01-27
 * @Description  : 计算图与模型层面的错误类型
 */

use thiserror::Error;

use crate::nn::NodeId;

/// Graph 及其上层（特征提取器、标注器）操作的错误类型
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("节点{0}不存在")]
    NodeNotFound(NodeId),
    #[error("无效操作：{0}")]
    InvalidOperation(String),
    #[error("形状不匹配：期望{expected:?}，实际为{got:?}。{message}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
        message: String,
    },
    #[error("计算错误：{0}")]
    ComputationError(String),
    /// 某节点在其所有消费者完成反向传播之前就被反向传播（或被重复反向传播）
    #[error("反向传播顺序错误：{0}")]
    BackwardOrder(String),
    /// 导入/导出模型时的文件读写失败
    #[error("文件读写失败：{0}")]
    Io(String),
    /// 模型文件内容不合法（魔数、版本、缺失或多余的参数等）
    #[error("模型文件无效：{0}")]
    InvalidModelFile(String),
    #[error("配置错误：{0}")]
    Config(String),
}

impl From<std::io::Error> for GraphError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
