/*
 * @Author       : 老董
 * @Date         : 2023-08-17 17:24:24
 * @Description  : 张量的逐元素运算（加、减、乘）以及与纯数之间的运算。
 *                 与 NumPy 不同，这里不做广播：两个张量的形状必须严格一致，否则 panic。
 */

use crate::errors::{Operator, TensorError};
use crate::tensor::Tensor;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

fn assert_same_shape(operator: Operator, tensor_1: &Tensor, tensor_2: &Tensor) {
    assert!(
        tensor_1.is_same_shape(tensor_2),
        "{}",
        TensorError::OperatorError {
            operator,
            tensor1_shape: tensor_1.shape().to_vec(),
            tensor2_shape: tensor_2.shape().to_vec(),
        }
    );
}

/*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓张量 +/-/× 张量↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
impl<'b> Add<&'b Tensor> for &Tensor {
    type Output = Tensor;

    fn add(self, other: &'b Tensor) -> Tensor {
        assert_same_shape(Operator::Add, self, other);
        Tensor {
            data: &self.data + &other.data,
        }
    }
}

impl Add for Tensor {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        &self + &other
    }
}

impl<'b> Sub<&'b Tensor> for &Tensor {
    type Output = Tensor;

    fn sub(self, other: &'b Tensor) -> Tensor {
        assert_same_shape(Operator::Sub, self, other);
        Tensor {
            data: &self.data - &other.data,
        }
    }
}

impl Sub for Tensor {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        &self - &other
    }
}

/// 逐元素相乘（Hadamard积）
impl<'b> Mul<&'b Tensor> for &Tensor {
    type Output = Tensor;

    fn mul(self, other: &'b Tensor) -> Tensor {
        assert_same_shape(Operator::Mul, self, other);
        Tensor {
            data: &self.data * &other.data,
        }
    }
}

impl Mul for Tensor {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        &self * &other
    }
}
/*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑张量 +/-/× 张量↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

/*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓张量与纯数↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
impl Mul<f64> for &Tensor {
    type Output = Tensor;

    fn mul(self, scalar: f64) -> Tensor {
        Tensor {
            data: &self.data * scalar,
        }
    }
}

impl Mul<f64> for Tensor {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        &self * scalar
    }
}

impl Mul<&Tensor> for f64 {
    type Output = Tensor;

    fn mul(self, tensor: &Tensor) -> Tensor {
        tensor * self
    }
}

impl Add<f64> for &Tensor {
    type Output = Tensor;

    fn add(self, scalar: f64) -> Tensor {
        Tensor {
            data: &self.data + scalar,
        }
    }
}

impl Neg for &Tensor {
    type Output = Tensor;

    fn neg(self) -> Tensor {
        Tensor {
            data: -&self.data,
        }
    }
}
/*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑张量与纯数↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

/*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓原地运算↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
impl<'a> AddAssign<&'a Tensor> for Tensor {
    fn add_assign(&mut self, other: &'a Tensor) {
        assert_same_shape(Operator::AddAssign, self, other);
        self.data += &other.data;
    }
}

impl AddAssign for Tensor {
    fn add_assign(&mut self, other: Self) {
        *self += &other;
    }
}

impl<'a> SubAssign<&'a Tensor> for Tensor {
    fn sub_assign(&mut self, other: &'a Tensor) {
        assert_same_shape(Operator::SubAssign, self, other);
        self.data -= &other.data;
    }
}

impl<'a> MulAssign<&'a Tensor> for Tensor {
    fn mul_assign(&mut self, other: &'a Tensor) {
        assert_same_shape(Operator::MulAssign, self, other);
        self.data *= &other.data;
    }
}

impl MulAssign<f64> for Tensor {
    fn mul_assign(&mut self, scalar: f64) {
        self.data *= scalar;
    }
}
/*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑原地运算↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

impl Tensor {
    /// 用`other`的值原地覆盖本张量（形状必须一致）
    pub fn assign(&mut self, other: &Self) {
        assert_same_shape(Operator::Assign, self, other);
        self.data.assign(&other.data);
    }

    /// 所有元素置零（形状不变）
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// 对每个元素应用`f`，返回新张量
    pub fn map<F: FnMut(f64) -> f64>(&self, f: F) -> Self {
        Self {
            data: self.data.mapv(f),
        }
    }

    /// 对每个元素原地应用`f`
    pub fn map_inplace<F: FnMut(f64) -> f64>(&mut self, f: F) {
        self.data.mapv_inplace(f);
    }
}
