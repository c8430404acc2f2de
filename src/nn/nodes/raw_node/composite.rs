use std::rc::Rc;

use crate::nn::GraphError;
use crate::nn::layer::Linear;
use crate::nn::nodes::raw_node::TraitNode;
use crate::nn::nodes::{NodeState, ParentGrad};

/// 组合节点：把多个（维度可以不同的）输入节点经同一个多输入全连接层合成一个向量，
/// 即 y = b + Σ_k W_k x_k
pub(crate) struct Composite {
    linear: Rc<Linear>,
}

impl Composite {
    pub(crate) fn new(linear: Rc<Linear>, parents: &[&NodeState]) -> Result<Self, GraphError> {
        if parents.is_empty() {
            return Err(GraphError::InvalidOperation(
                "Composite节点至少需要1个输入节点".to_string(),
            ));
        }
        let sizes: Vec<usize> = parents.iter().map(|p| p.size()).collect();
        linear.check_inputs(&sizes)?;
        Ok(Self { linear })
    }
}

impl TraitNode for Composite {
    fn type_name(&self) -> &'static str {
        "Composite"
    }

    fn output_size(&self) -> usize {
        self.linear.output_size()
    }

    fn fprop(&mut self, parents: &[&NodeState], state: &mut NodeState) -> Result<(), GraphError> {
        let inputs: Vec<_> = parents.iter().map(|p| &p.value).collect();
        state.value = self.linear.forward(&inputs);
        Ok(())
    }

    fn bprop(
        &self,
        parents: &[&NodeState],
        state: &NodeState,
    ) -> Result<Vec<ParentGrad>, GraphError> {
        let inputs: Vec<_> = parents.iter().map(|p| &p.value).collect();
        Ok(self
            .linear
            .backward(&inputs, &state.grad)
            .into_iter()
            .map(ParentGrad::new)
            .collect())
    }
}
