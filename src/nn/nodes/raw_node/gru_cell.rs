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

/// GRU单元
///
/// forward:
///   r = σ(L_r([h_{t-1}, x]))，z = σ(L_z([h_{t-1}, x]))
///   g = tanh(L_g([r ⊙ h_{t-1}, x]))
///   h = (1 - z) ⊙ h_{t-1} + z ⊙ g
/// 前向时缓存各门的激活值，供反向传播使用
pub(crate) struct GruCell {
    layer: Rc<RecurrentLayer>,
    r: Tensor,
    z: Tensor,
    rh: Tensor,
    g: Tensor,
}

impl GruCell {
    pub(crate) fn new(layer: Rc<RecurrentLayer>, parents: &[&NodeState]) -> Result<Self, GraphError> {
        check_cell_parents(&layer, parents)?;
        let zeros = Tensor::zeros(&[layer.hidden_size()]);
        Ok(Self {
            layer,
            r: zeros.clone(),
            z: zeros.clone(),
            rh: zeros.clone(),
            g: zeros,
        })
    }
}

impl TraitNode for GruCell {
    fn type_name(&self) -> &'static str {
        "GruCell"
    }

    fn output_size(&self) -> usize {
        self.layer.hidden_size()
    }

    fn fprop(&mut self, parents: &[&NodeState], state: &mut NodeState) -> Result<(), GraphError> {
        let hp = &parents[0].value;
        let inputs = gate_inputs(parents);

        self.r = self.layer.gate(Gate::Reset)?.forward(&inputs).sigmoid();
        self.z = self.layer.gate(Gate::Update)?.forward(&inputs).sigmoid();
        self.rh = &self.r * hp;

        let mut candidate_inputs = inputs;
        candidate_inputs[0] = &self.rh;
        self.g = self
            .layer
            .gate(Gate::Candidate)?
            .forward(&candidate_inputs)
            .tanh();

        // h = h_{t-1} + z ⊙ (g - h_{t-1})
        state.value = hp + &(&self.z * &(&self.g - hp));
        Ok(())
    }

    fn bprop(
        &self,
        parents: &[&NodeState],
        state: &NodeState,
    ) -> Result<Vec<ParentGrad>, GraphError> {
        let hp = &parents[0].value;
        let dh = &state.grad;
        let inputs = gate_inputs(parents);
        let mut grads = zero_grads(parents);

        // h对h_{t-1}的直接依赖
        grads[0] += &(dh * &self.z.map(|v| 1.0 - v));

        // 候选状态
        let dg = dh * &self.z;
        let da_g = &dg * &tanh_derivative(&self.g);
        let mut candidate_inputs = inputs.clone();
        candidate_inputs[0] = &self.rh;
        let candidate_grads = self.layer.gate(Gate::Candidate)?.backward(&candidate_inputs, &da_g);
        let drh = &candidate_grads[0];
        grads[0] += &(drh * &self.r);
        accumulate(&mut grads[1..], &candidate_grads[1..]);

        // 更新门
        let dz = dh * &(&self.g - hp);
        let da_z = &dz * &sigmoid_derivative(&self.z);
        let update_grads = self.layer.gate(Gate::Update)?.backward(&inputs, &da_z);
        accumulate(&mut grads, &update_grads);

        // 重置门
        let dr = drh * hp;
        let da_r = &dr * &sigmoid_derivative(&self.r);
        let reset_grads = self.layer.gate(Gate::Reset)?.backward(&inputs, &da_r);
        accumulate(&mut grads, &reset_grads);

        Ok(into_parent_grads(grads, None))
    }
}
