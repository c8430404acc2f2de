use std::rc::Rc;

use crate::nn::GraphError;
use crate::nn::layer::{Activation, Layer};
use crate::nn::nodes::raw_node::TraitNode;
use crate::nn::nodes::{NodeState, ParentGrad};
use crate::tensor::Tensor;

/// 单输入节点：仿射层或激活函数。
///
/// 作为分类头最后一层的softmax节点可以设置目标类别，此时反向传播会额外注入
/// 交叉熵损失 -log(p[target]) 对输入（logits）的梯度 p - one_hot(target)。
pub(crate) struct Simple {
    layer: Rc<Layer>,
    size: usize,
    target: Option<usize>,
}

impl Simple {
    pub(crate) fn new(layer: Rc<Layer>, parents: &[&NodeState]) -> Result<Self, GraphError> {
        if parents.len() != 1 {
            return Err(GraphError::InvalidOperation(
                "Simple节点只需要1个父节点".to_string(),
            ));
        }
        let input_size = parents[0].size();
        if let Layer::Affine(linear) = layer.as_ref() {
            linear.check_inputs(&[input_size])?;
        }
        Ok(Self {
            size: layer.output_size(input_size),
            layer,
            target: None,
        })
    }
}

impl TraitNode for Simple {
    fn type_name(&self) -> &'static str {
        "Simple"
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn fprop(&mut self, parents: &[&NodeState], state: &mut NodeState) -> Result<(), GraphError> {
        let x = &parents[0].value;
        state.value = match self.layer.as_ref() {
            Layer::Affine(linear) => linear.forward(&[x]),
            Layer::Activation(activation) => activation.forward(x),
        };
        Ok(())
    }

    fn bprop(
        &self,
        parents: &[&NodeState],
        state: &NodeState,
    ) -> Result<Vec<ParentGrad>, GraphError> {
        let dx = match self.layer.as_ref() {
            Layer::Affine(linear) => linear
                .backward(&[&parents[0].value], &state.grad)
                .into_iter()
                .next()
                .ok_or_else(|| {
                    GraphError::ComputationError(
                        "仿射层没有返回输入梯度。不该触及本错误，否则说明crate代码有问题"
                            .to_string(),
                    )
                })?,
            Layer::Activation(activation) => {
                let mut dx = activation.backward(&state.value, &state.grad);
                if let Some(target) = self.target {
                    dx += &(&state.value - &Tensor::one_hot(self.size, target));
                }
                dx
            }
        };
        Ok(vec![ParentGrad::new(dx)])
    }

    fn set_target(&mut self, target: usize) -> Result<(), GraphError> {
        if !matches!(self.layer.as_ref(), Layer::Activation(Activation::Softmax)) {
            return Err(GraphError::InvalidOperation(
                "只有softmax节点才能设置目标类别".to_string(),
            ));
        }
        if target >= self.size {
            return Err(GraphError::InvalidOperation(format!(
                "目标类别{}超出了softmax的输出维度{}",
                target, self.size
            )));
        }
        self.target = Some(target);
        Ok(())
    }

    fn target(&self) -> Option<usize> {
        self.target
    }
}
