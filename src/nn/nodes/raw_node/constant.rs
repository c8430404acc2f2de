use crate::nn::GraphError;
use crate::nn::nodes::raw_node::TraitNode;
use crate::nn::nodes::{NodeState, ParentGrad};
use crate::tensor::Tensor;

/// 常量节点：值由调用方给定（如预计算好的字符级表示），不可训练，反向传播为空操作
pub(crate) struct Constant {
    value: Tensor,
}

impl Constant {
    pub(crate) fn new(value: Tensor) -> Result<Self, GraphError> {
        if !value.is_vector() {
            return Err(GraphError::ShapeMismatch {
                expected: vec![value.size()],
                got: value.shape().to_vec(),
                message: "Constant节点的值必须是向量".to_string(),
            });
        }
        Ok(Self { value })
    }
}

impl TraitNode for Constant {
    fn type_name(&self) -> &'static str {
        "Constant"
    }

    fn output_size(&self) -> usize {
        self.value.size()
    }

    fn fprop(&mut self, _parents: &[&NodeState], state: &mut NodeState) -> Result<(), GraphError> {
        state.value.assign(&self.value);
        Ok(())
    }

    fn bprop(
        &self,
        _parents: &[&NodeState],
        _state: &NodeState,
    ) -> Result<Vec<ParentGrad>, GraphError> {
        Ok(Vec::new())
    }
}
