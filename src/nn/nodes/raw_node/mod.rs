mod cell;
mod composite;
mod constant;
mod gru_cell;
mod initial_state;
mod lookup;
mod lstm_cell;
mod rnn_cell;
mod simple;

pub(crate) use composite::Composite;
pub(crate) use constant::Constant;
pub(crate) use gru_cell::GruCell;
pub(crate) use initial_state::InitialState;
pub(crate) use lookup::Lookup;
pub(crate) use lstm_cell::LstmCell;
pub(crate) use rnn_cell::RnnCell;
pub(crate) use simple::Simple;

use enum_dispatch::enum_dispatch;

use super::{NodeState, ParentGrad};
use crate::nn::GraphError;

#[enum_dispatch]
pub(crate) enum NodeType {
    Lookup(Lookup),
    Constant(Constant),
    InitialState(InitialState),
    Composite(Composite),
    Simple(Simple),
    RnnCell(RnnCell),
    GruCell(GruCell),
    LstmCell(LstmCell),
}

#[enum_dispatch(NodeType)]
pub(crate) trait TraitNode {
    fn type_name(&self) -> &'static str;

    /// 输出向量的维度（构建时确定，之后不变）
    fn output_size(&self) -> usize;

    /// 是否额外输出LSTM的记忆单元c
    fn has_memory(&self) -> bool {
        false
    }

    // 根据父节点的值计算本节点的值（注意：调用方保证所有父节点的值都已预先计算过）
    fn fprop(&mut self, parents: &[&NodeState], state: &mut NodeState) -> Result<(), GraphError>;

    // 根据本节点已累加完毕的梯度，返回应累加到每个父节点上的梯度（与父节点一一对应）。
    // 参数的梯度直接累加到其Parameter中
    fn bprop(&self, parents: &[&NodeState], state: &NodeState)
    -> Result<Vec<ParentGrad>, GraphError>;

    fn set_target(&mut self, _target: usize) -> Result<(), GraphError> {
        Err(GraphError::InvalidOperation(format!(
            "{}节点不能设置目标类别",
            self.type_name()
        )))
    }

    /// 交叉熵的目标类别（仅带目标的softmax节点才有）
    fn target(&self) -> Option<usize> {
        None
    }
}
