use std::fmt;

use super::raw_node::{NodeType, TraitNode};
use crate::nn::GraphError;
use crate::tensor::Tensor;

/// 节点在所属计算图（arena）中的下标。父节点的id总是小于子节点的id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 节点的输出值与梯度累加器。带记忆单元的节点（LSTM单元及其初始状态）额外持有c及其梯度
#[derive(Debug, Clone)]
pub(crate) struct NodeState {
    pub(crate) value: Tensor,
    pub(crate) grad: Tensor,
    pub(crate) memory: Option<Tensor>,
    pub(crate) memory_grad: Option<Tensor>,
}

impl NodeState {
    pub(crate) fn new(size: usize, has_memory: bool) -> Self {
        let zeros = Tensor::zeros(&[size]);
        Self {
            memory: has_memory.then(|| zeros.clone()),
            memory_grad: has_memory.then(|| zeros.clone()),
            grad: zeros.clone(),
            value: zeros,
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.value.size()
    }

    pub(crate) fn memory(&self) -> Result<&Tensor, GraphError> {
        self.memory.as_ref().ok_or_else(|| {
            GraphError::ComputationError(
                "该节点没有记忆单元。不该触及本错误，否则说明crate代码有问题".to_string(),
            )
        })
    }

    pub(crate) fn clear_grad(&mut self) {
        self.grad.clear();
        if let Some(d) = self.memory_grad.as_mut() {
            d.clear();
        }
    }

    /// 累加一个消费者传来的梯度
    pub(crate) fn accumulate(&mut self, contribution: &ParentGrad) -> Result<(), GraphError> {
        self.grad += &contribution.value;
        match (&mut self.memory_grad, &contribution.memory) {
            (Some(d), Some(m)) => *d += m,
            (None, Some(_)) => {
                return Err(GraphError::ComputationError(
                    "向没有记忆单元的节点回传了记忆梯度。不该触及本错误，否则说明crate代码有问题"
                        .to_string(),
                ));
            }
            _ => {}
        }
        Ok(())
    }
}

/// 一个节点在反向传播时回传给某个父节点的梯度
#[derive(Debug, Clone)]
pub(crate) struct ParentGrad {
    pub(crate) value: Tensor,
    pub(crate) memory: Option<Tensor>,
}

impl ParentGrad {
    pub(crate) fn new(value: Tensor) -> Self {
        Self {
            value,
            memory: None,
        }
    }
}

pub(crate) struct NodeHandle {
    id: NodeId,
    raw_node: NodeType,
    parents: Vec<NodeId>,
    state: NodeState,
}

impl NodeHandle {
    pub(crate) fn new<T: Into<NodeType>>(id: NodeId, raw_node: T, parents: Vec<NodeId>) -> Self {
        let raw_node = raw_node.into();
        let state = NodeState::new(raw_node.output_size(), raw_node.has_memory());
        Self {
            id,
            raw_node,
            parents,
            state,
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub(crate) fn state(&self) -> &NodeState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    pub(crate) fn raw_node(&self) -> &NodeType {
        &self.raw_node
    }

    pub(crate) fn raw_node_mut(&mut self) -> &mut NodeType {
        &mut self.raw_node
    }

    pub(crate) fn value(&self) -> &Tensor {
        &self.state.value
    }

    /// 前向计算：由父节点的状态算出本节点的值
    pub(crate) fn fprop(&mut self, parents: &[&NodeState]) -> Result<(), GraphError> {
        self.raw_node.fprop(parents, &mut self.state)
    }

    /// 反向传播：由本节点已累加完毕的梯度，算出应回传给各父节点的梯度
    pub(crate) fn bprop(&self, parents: &[&NodeState]) -> Result<Vec<ParentGrad>, GraphError> {
        self.raw_node.bprop(parents, &self.state)
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}节点{}]", self.raw_node.type_name(), self.id)
    }
}
