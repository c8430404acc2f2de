/*
 * @Author       : 老董
 * @Date         : 2023-10-21 03:22:26
 * @Description  : 计算图用到的线性代数与激活函数（矩阵乘向量、外积累加、tanh/sigmoid/softmax等）
 */

use super::Tensor;
use crate::errors::{Operator, TensorError};
use ndarray::{ArrayView1, ArrayView2, ArrayViewMut2, Ix1, Ix2};

impl Tensor {
    fn as_vector_view(&self) -> ArrayView1<'_, f64> {
        assert!(
            self.is_vector(),
            "{}",
            TensorError::NotAVector(self.shape().to_vec())
        );
        self.data.view().into_dimensionality::<Ix1>().unwrap()
    }

    fn as_matrix_view(&self) -> ArrayView2<'_, f64> {
        assert!(
            self.is_matrix(),
            "{}",
            TensorError::NotAMatrix(self.shape().to_vec())
        );
        self.data.view().into_dimensionality::<Ix2>().unwrap()
    }

    fn as_matrix_view_mut(&mut self) -> ArrayViewMut2<'_, f64> {
        assert!(
            self.is_matrix(),
            "{}",
            TensorError::NotAMatrix(self.shape().to_vec())
        );
        self.data.view_mut().into_dimensionality::<Ix2>().unwrap()
    }

    /// 矩阵乘向量：`self`形状为[rows, cols]，`x`形状为[cols]，返回形状为[rows]的向量
    pub fn mat_vec(&self, x: &Self) -> Self {
        let w = self.as_matrix_view();
        let v = x.as_vector_view();
        assert!(
            w.ncols() == v.len(),
            "{}",
            TensorError::OperatorError {
                operator: Operator::MatVec,
                tensor1_shape: self.shape().to_vec(),
                tensor2_shape: x.shape().to_vec(),
            }
        );
        Self {
            data: w.dot(&v).into_dyn(),
        }
    }

    /// 转置矩阵乘向量：`self`形状为[rows, cols]，`g`形状为[rows]，返回形状为[cols]的向量
    pub fn t_mat_vec(&self, g: &Self) -> Self {
        let w = self.as_matrix_view();
        let v = g.as_vector_view();
        assert!(
            w.nrows() == v.len(),
            "{}",
            TensorError::OperatorError {
                operator: Operator::TransposedMatVec,
                tensor1_shape: self.shape().to_vec(),
                tensor2_shape: g.shape().to_vec(),
            }
        );
        Self {
            data: w.t().dot(&v).into_dyn(),
        }
    }

    /// 原地累加外积：self[r, c] += a[r] * b[c]
    pub fn add_outer(&mut self, a: &Self, b: &Self) {
        let (rows, cols) = (a.size(), b.size());
        let a = a.as_vector_view();
        let b = b.as_vector_view();
        let shape = self.shape().to_vec();
        let mut w = self.as_matrix_view_mut();
        assert!(
            w.nrows() == rows && w.ncols() == cols,
            "{}",
            TensorError::OperatorError {
                operator: Operator::Outer,
                tensor1_shape: shape,
                tensor2_shape: vec![rows, cols],
            }
        );
        for (r, mut row) in w.rows_mut().into_iter().enumerate() {
            let ar = a[r];
            row.zip_mut_with(&b, |x, &bc| *x += ar * bc);
        }
    }

    pub fn tanh(&self) -> Self {
        self.map(f64::tanh)
    }

    pub fn sigmoid(&self) -> Self {
        self.map(|x| 1.0 / (1.0 + (-x).exp()))
    }

    pub fn relu(&self) -> Self {
        self.map(|x| x.max(0.0))
    }

    /// 数值稳定的softmax（先减去最大值）
    pub fn softmax(&self) -> Self {
        let v = self.as_vector_view();
        let max = v.fold(f64::NEG_INFINITY, |m, &x| m.max(x));
        let exp = v.mapv(|x| (x - max).exp());
        let total = exp.sum();
        Self {
            data: (exp / total).into_dyn(),
        }
    }

    /// 独热向量
    pub fn one_hot(size: usize, index: usize) -> Self {
        let mut t = Self::zeros(&[size]);
        t.set(index, 1.0);
        t
    }
}
