use std::rc::Rc;

use super::cell::{
    accumulate, check_cell_parents, gate_inputs, into_parent_grads, sigmoid_derivative,
    tanh_derivative, zero_grads,
};
use crate::nn::GraphError;
use crate::nn::layer::{Gate, RecurrentLayer};
use crate::nn::nodes::raw_node::TraitNode;
use crate::nn::nodes::{NodeState, ParentGrad};
use crate::tensor::Tensor;

/// LSTM单元
///
/// forward:
///   i, f, o = σ(L_i/f/o([h_{t-1}, x]))，g = tanh(L_g([h_{t-1}, x]))
///   c = f ⊙ c_{t-1} + i ⊙ g
///   h = o ⊙ tanh(c)
/// 输出值为h，记忆单元为c；反向传播时同时向前一时刻回传h和c的梯度
pub(crate) struct LstmCell {
    layer: Rc<RecurrentLayer>,
    i: Tensor,
    f: Tensor,
    o: Tensor,
    g: Tensor,
    tanh_c: Tensor,
}

impl LstmCell {
    pub(crate) fn new(layer: Rc<RecurrentLayer>, parents: &[&NodeState]) -> Result<Self, GraphError> {
        check_cell_parents(&layer, parents)?;
        let zeros = Tensor::zeros(&[layer.hidden_size()]);
        Ok(Self {
            layer,
            i: zeros.clone(),
            f: zeros.clone(),
            o: zeros.clone(),
            g: zeros.clone(),
            tanh_c: zeros,
        })
    }
}

impl TraitNode for LstmCell {
    fn type_name(&self) -> &'static str {
        "LstmCell"
    }

    fn output_size(&self) -> usize {
        self.layer.hidden_size()
    }

    fn has_memory(&self) -> bool {
        true
    }

    fn fprop(&mut self, parents: &[&NodeState], state: &mut NodeState) -> Result<(), GraphError> {
        let cp = parents[0].memory()?;
        let inputs = gate_inputs(parents);

        self.i = self.layer.gate(Gate::Input)?.forward(&inputs).sigmoid();
        self.f = self.layer.gate(Gate::Forget)?.forward(&inputs).sigmoid();
        self.o = self.layer.gate(Gate::Output)?.forward(&inputs).sigmoid();
        self.g = self.layer.gate(Gate::Candidate)?.forward(&inputs).tanh();

        let c = &(&self.f * cp) + &(&self.i * &self.g);
        self.tanh_c = c.tanh();
        state.value = &self.o * &self.tanh_c;
        state.memory = Some(c);
        Ok(())
    }

    fn bprop(
        &self,
        parents: &[&NodeState],
        state: &NodeState,
    ) -> Result<Vec<ParentGrad>, GraphError> {
        let cp = parents[0].memory()?;
        let dh = &state.grad;
        let inputs = gate_inputs(parents);
        let mut grads = zero_grads(parents);

        // c的总梯度 = 后一时刻传来的记忆梯度 + 经由h = o ⊙ tanh(c)传来的梯度
        let mut dc = dh * &(&self.o * &tanh_derivative(&self.tanh_c));
        if let Some(dc_next) = &state.memory_grad {
            dc += dc_next;
        }

        let gate_deltas = [
            (Gate::Input, &(&dc * &self.g) * &sigmoid_derivative(&self.i)),
            (Gate::Forget, &(&dc * cp) * &sigmoid_derivative(&self.f)),
            (Gate::Output, &(dh * &self.tanh_c) * &sigmoid_derivative(&self.o)),
            (Gate::Candidate, &(&dc * &self.i) * &tanh_derivative(&self.g)),
        ];
        for (gate, delta) in &gate_deltas {
            let gate_grads = self.layer.gate(*gate)?.backward(&inputs, delta);
            accumulate(&mut grads, &gate_grads);
        }

        let dcp = &dc * &self.f;
        Ok(into_parent_grads(grads, Some(dcp)))
    }
}
