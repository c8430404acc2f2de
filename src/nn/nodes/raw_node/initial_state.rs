use std::rc::Rc;

use crate::nn::layer::RecurrentLayer;
use crate::nn::nodes::raw_node::TraitNode;
use crate::nn::nodes::{NodeState, ParentGrad};
use crate::nn::{GraphError, SharedParameter};

/// 初始状态节点：h_0（LSTM另有c_0）直接取自循环层中可学习的参数，而不是全零向量
pub(crate) struct InitialState {
    hidden: SharedParameter,
    memory: Option<SharedParameter>,
    size: usize,
}

impl InitialState {
    pub(crate) fn new(layer: &Rc<RecurrentLayer>) -> Self {
        Self {
            hidden: layer.init_hidden().clone(),
            memory: layer.init_memory().cloned(),
            size: layer.hidden_size(),
        }
    }
}

impl TraitNode for InitialState {
    fn type_name(&self) -> &'static str {
        "InitialState"
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    fn fprop(&mut self, _parents: &[&NodeState], state: &mut NodeState) -> Result<(), GraphError> {
        state.value.assign(self.hidden.borrow().weights());
        if let (Some(c0), Some(memory)) = (&self.memory, state.memory.as_mut()) {
            memory.assign(c0.borrow().weights());
        }
        Ok(())
    }

    fn bprop(
        &self,
        _parents: &[&NodeState],
        state: &NodeState,
    ) -> Result<Vec<ParentGrad>, GraphError> {
        self.hidden.borrow_mut().accumulate_grad(&state.grad);
        if let (Some(c0), Some(d)) = (&self.memory, &state.memory_grad) {
            c0.borrow_mut().accumulate_grad(d);
        }
        Ok(Vec::new())
    }
}
