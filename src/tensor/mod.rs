/*
 * @Author       : 老董
 * @Date         : 2023-08-17 17:24:24
 * @Description  : 张量（Tensor）：计算图中所有节点值、梯度与可学习参数的载体。
 *                 本库只需要向量（形状[n]）和矩阵（形状[rows, cols]）两种形态，
 *                 数据统一用 f64 存储（有限差分梯度检验对精度敏感）。
 */

use approx::{AbsDiffEq, RelativeEq};
use ndarray::{Array, IxDyn};
use rand::Rng;
use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::errors::{ComparisonOperator, TensorError};

mod linalg;
mod ops;
mod property;

#[cfg(test)]
mod tests;

/// 定义张量的结构体。其可以是向量或矩阵。
/// 注：维度在创建时确定，之后只会原地修改数值，不会改变形状。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: Array<f64, IxDyn>,
}

impl Tensor {
    /// 创建一个张量。若为向量，`shape`为[n]；若为矩阵，`shape`为[rows, cols]。
    /// `data`的长度必须和`shape`中所有元素的乘积相等。
    pub fn new(data: &[f64], shape: &[usize]) -> Self {
        let expected = shape.iter().product::<usize>();
        assert!(
            data.len() == expected,
            "{}",
            TensorError::DataShapeMismatch {
                data_len: data.len(),
                shape: shape.to_vec(),
            }
        );
        let data = Array::from_shape_vec(IxDyn(shape), data.to_vec()).unwrap();
        Self { data }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: Array::zeros(IxDyn(shape)),
        }
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self {
            data: Array::ones(IxDyn(shape)),
        }
    }

    /// 创建一个形状与`other`相同的全零张量
    pub fn zeros_like(other: &Self) -> Self {
        Self::zeros(other.shape())
    }

    /// 创建一个随机张量，其值服从[min, max)上的均匀分布
    pub fn new_random_with_rng<R: Rng + ?Sized>(
        min: f64,
        max: f64,
        shape: &[usize],
        rng: &mut R,
    ) -> Self {
        assert!(
            min < max,
            "{}",
            TensorError::ValueMustSatisfyComparison {
                value_name: "max - min".to_string(),
                operator: ComparisonOperator::GreaterThan,
                threshold: 0,
            }
        );
        let uniform = Uniform::new(min, max);
        let data = (0..shape.iter().product::<usize>())
            .map(|_| uniform.sample(rng))
            .collect::<Vec<_>>();
        Self::new(&data, shape)
    }
}

impl AbsDiffEq for Tensor {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}

impl RelativeEq for Tensor {
    fn default_max_relative() -> f64 {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: f64, max_relative: f64) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.relative_eq(b, epsilon, max_relative))
    }
}

impl std::fmt::Display for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "形状: {:?}", self.shape())?;
        write!(f, "{:8.4}", self.data)
    }
}
