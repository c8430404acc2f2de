use crate::nn::nodes::raw_node::TraitNode;
use crate::nn::nodes::{NodeState, ParentGrad};
use crate::nn::{GraphError, SharedParameter};

/// 查找节点：输出值即嵌入参数的当前权重，反向传播时把梯度累加到该参数上
pub(crate) struct Lookup {
    param: SharedParameter,
    size: usize,
}

impl Lookup {
    pub(crate) fn new(param: SharedParameter) -> Result<Self, GraphError> {
        let size = {
            let p = param.borrow();
            if p.shape().len() != 1 {
                return Err(GraphError::ShapeMismatch {
                    expected: vec![p.size()],
                    got: p.shape().to_vec(),
                    message: format!("Lookup节点引用的参数`{}`必须是向量", p.name()),
                });
            }
            p.size()
        };
        Ok(Self { param, size })
    }
}

impl TraitNode for Lookup {
    fn type_name(&self) -> &'static str {
        "Lookup"
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn fprop(&mut self, _parents: &[&NodeState], state: &mut NodeState) -> Result<(), GraphError> {
        state.value.assign(self.param.borrow().weights());
        Ok(())
    }

    fn bprop(
        &self,
        _parents: &[&NodeState],
        state: &NodeState,
    ) -> Result<Vec<ParentGrad>, GraphError> {
        self.param.borrow_mut().accumulate_grad(&state.grad);
        Ok(Vec::new())
    }
}
