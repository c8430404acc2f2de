//! 三种循环单元节点共用的辅助函数。
//! 循环单元节点的父节点约定为：parents[0]是前一时刻的状态节点（或初始状态节点），其余是当前时刻的输入节点

use crate::nn::GraphError;
use crate::nn::layer::RecurrentLayer;
use crate::nn::nodes::{NodeState, ParentGrad};
use crate::tensor::Tensor;

pub(super) fn check_cell_parents(
    layer: &RecurrentLayer,
    parents: &[&NodeState],
) -> Result<(), GraphError> {
    if parents.len() < 2 {
        return Err(GraphError::InvalidOperation(format!(
            "{}单元节点至少需要2个父节点（前一时刻状态 + 至少1个输入）",
            layer.cell_type()
        )));
    }
    let pred = parents[0];
    if pred.size() != layer.hidden_size() {
        return Err(GraphError::ShapeMismatch {
            expected: vec![layer.hidden_size()],
            got: vec![pred.size()],
            message: format!("{}单元的前一时刻状态维度不匹配", layer.cell_type()),
        });
    }
    if layer.cell_type().has_memory() && pred.memory.is_none() {
        return Err(GraphError::InvalidOperation(format!(
            "{}单元的前一时刻状态节点必须带有记忆单元",
            layer.cell_type()
        )));
    }
    let sizes: Vec<usize> = parents[1..].iter().map(|p| p.size()).collect();
    if sizes != layer.input_sizes() {
        return Err(GraphError::ShapeMismatch {
            expected: layer.input_sizes().to_vec(),
            got: sizes,
            message: format!("{}单元的输入维度不匹配", layer.cell_type()),
        });
    }
    Ok(())
}

/// 各门的输入：[h_{t-1}, x_1, ..., x_k]
pub(super) fn gate_inputs<'a>(parents: &[&'a NodeState]) -> Vec<&'a Tensor> {
    parents.iter().map(|p| &p.value).collect()
}

pub(super) fn zero_grads(parents: &[&NodeState]) -> Vec<Tensor> {
    parents.iter().map(|p| Tensor::zeros_like(&p.value)).collect()
}

/// 把某个门回传给各输入槽的梯度累加到总梯度上
pub(super) fn accumulate(total: &mut [Tensor], grads: &[Tensor]) {
    for (t, g) in total.iter_mut().zip(grads) {
        *t += g;
    }
}

pub(super) fn into_parent_grads(grads: Vec<Tensor>, pred_memory: Option<Tensor>) -> Vec<ParentGrad> {
    let mut parent_grads: Vec<ParentGrad> = grads.into_iter().map(ParentGrad::new).collect();
    if let Some(first) = parent_grads.first_mut() {
        first.memory = pred_memory;
    }
    parent_grads
}

/// σ'(a) 用输出表示：s ⊙ (1 - s)
pub(super) fn sigmoid_derivative(s: &Tensor) -> Tensor {
    s.map(|v| v * (1.0 - v))
}

/// tanh'(a) 用输出表示：1 - t²
pub(super) fn tanh_derivative(t: &Tensor) -> Tensor {
    t.map(|v| 1.0 - v * v)
}
