use std::rc::Rc;

use super::cell::{check_cell_parents, gate_inputs, into_parent_grads, tanh_derivative};
use crate::nn::GraphError;
use crate::nn::layer::{Gate, RecurrentLayer};
use crate::nn::nodes::raw_node::TraitNode;
use crate::nn::nodes::{NodeState, ParentGrad};

/// 普通RNN单元：h_t = tanh(L_h([h_{t-1}, x_t]))
pub(crate) struct RnnCell {
    layer: Rc<RecurrentLayer>,
}

impl RnnCell {
    pub(crate) fn new(layer: Rc<RecurrentLayer>, parents: &[&NodeState]) -> Result<Self, GraphError> {
        check_cell_parents(&layer, parents)?;
        Ok(Self { layer })
    }
}

impl TraitNode for RnnCell {
    fn type_name(&self) -> &'static str {
        "RnnCell"
    }

    fn output_size(&self) -> usize {
        self.layer.hidden_size()
    }

    fn fprop(&mut self, parents: &[&NodeState], state: &mut NodeState) -> Result<(), GraphError> {
        let inputs = gate_inputs(parents);
        state.value = self.layer.gate(Gate::Hidden)?.forward(&inputs).tanh();
        Ok(())
    }

    fn bprop(
        &self,
        parents: &[&NodeState],
        state: &NodeState,
    ) -> Result<Vec<ParentGrad>, GraphError> {
        let inputs = gate_inputs(parents);
        let da = &state.grad * &tanh_derivative(&state.value);
        let grads = self.layer.gate(Gate::Hidden)?.backward(&inputs, &da);
        Ok(into_parent_grads(grads, None))
    }
}
