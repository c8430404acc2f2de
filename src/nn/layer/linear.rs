/*
 * @Author       : 老董
 * @Date         : 2026-01-17
 * @Description  : Linear (全连接) 层，支持多个维度不同的输入槽：y = b + Σ_k W_k x_k
 */

use rand::Rng;

use crate::nn::{GraphError, Parameter, SharedParameter};
use crate::tensor::Tensor;

/// 多输入全连接层
///
/// 每个输入槽k拥有自己的权重矩阵`W_k`（形状[output_size, input_sizes[k]]），所有槽共享一个偏置`b`。
/// 既用于标注器的分类头（单输入即普通仿射层），也用于循环单元的每一个门（输入为[h_{t-1}, x_1, ..., x_k]）。
#[derive(Debug)]
pub struct Linear {
    name: String,
    weights: Vec<SharedParameter>,
    bias: SharedParameter,
    input_sizes: Vec<usize>,
    output_size: usize,
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        input_sizes: &[usize],
        output_size: usize,
        rng: &mut R,
    ) -> Self {
        let weights = input_sizes
            .iter()
            .enumerate()
            .map(|(k, &in_size)| {
                Parameter::new_glorot(&format!("{name}.w{k}"), &[output_size, in_size], rng)
                    .into_shared()
            })
            .collect();
        let bias =
            Parameter::new(&format!("{name}.b"), Tensor::zeros(&[output_size])).into_shared();
        Self {
            name: name.to_string(),
            weights,
            bias,
            input_sizes: input_sizes.to_vec(),
            output_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_sizes(&self) -> &[usize] {
        &self.input_sizes
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// 检查输入的个数与各自维度是否与本层匹配
    pub fn check_inputs(&self, sizes: &[usize]) -> Result<(), GraphError> {
        if sizes != self.input_sizes.as_slice() {
            return Err(GraphError::ShapeMismatch {
                expected: self.input_sizes.clone(),
                got: sizes.to_vec(),
                message: format!("全连接层`{}`的输入维度不匹配", self.name),
            });
        }
        Ok(())
    }

    pub fn forward(&self, inputs: &[&Tensor]) -> Tensor {
        let mut y = self.bias.borrow().weights().clone();
        for (w, x) in self.weights.iter().zip(inputs) {
            y += &w.borrow().weights().mat_vec(x);
        }
        y
    }

    /// 给定输出梯度`dy`：累加 dW_k += dy·x_kᵀ、db += dy，并返回各输入的梯度 W_kᵀ·dy
    pub fn backward(&self, inputs: &[&Tensor], dy: &Tensor) -> Vec<Tensor> {
        self.bias.borrow_mut().accumulate_grad(dy);
        self.weights
            .iter()
            .zip(inputs)
            .map(|(w, x)| {
                let mut w = w.borrow_mut();
                w.accumulate_outer_grad(dy, x);
                w.weights().t_mat_vec(dy)
            })
            .collect()
    }

    /// 按固定顺序（各输入槽的权重，最后是偏置）返回全部参数
    pub fn parameters(&self) -> Vec<SharedParameter> {
        let mut params = self.weights.clone();
        params.push(self.bias.clone());
        params
    }
}
