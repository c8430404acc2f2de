/*
 * @Author       : 老董
 * @Date         : 2023-10-21 03:22:26
 * @Description  : 本文件仅包含一些属性方法，不包含任何运算方法，所以不会需要用到mut
 */

use super::Tensor;
use crate::errors::TensorError;

impl Tensor {
    /// 若为向量，`shape`为[n]；若为矩阵，`shape`为[rows, cols]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// 张量的维（dim）数、阶（rank）数：向量为1，矩阵为2
    pub fn dimension(&self) -> usize {
        self.data.ndim()
    }

    /// 计算张量中所有元素的数量
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 判断两个张量的形状是否严格一致。如：形状为 [1, 4] 和 [4] 是不一致的
    pub fn is_same_shape(&self, other: &Self) -> bool {
        self.shape() == other.shape()
    }

    pub fn is_vector(&self) -> bool {
        self.dimension() == 1
    }

    pub fn is_matrix(&self) -> bool {
        self.dimension() == 2
    }

    /// 按行优先顺序返回底层数据
    pub fn data_as_slice(&self) -> &[f64] {
        self.data.as_slice().unwrap()
    }

    /// 按行优先顺序（扁平下标）读取单个元素
    pub fn get(&self, index: usize) -> f64 {
        self.assert_index(index);
        self.data_as_slice()[index]
    }

    /// 按行优先顺序（扁平下标）写入单个元素
    pub fn set(&mut self, index: usize, value: f64) {
        self.assert_index(index);
        self.data.as_slice_mut().unwrap()[index] = value;
    }

    /// 按行优先顺序（扁平下标）给单个元素加上`delta`
    pub fn add_at(&mut self, index: usize, delta: f64) {
        self.assert_index(index);
        self.data.as_slice_mut().unwrap()[index] += delta;
    }

    /// 最大元素的（扁平）下标，若有多个最大值则取第一个
    pub fn argmax(&self) -> usize {
        assert!(self.size() > 0, "{}", TensorError::Empty);
        let mut best = 0;
        for (i, &x) in self.data.iter().enumerate() {
            if x > self.data_as_slice()[best] {
                best = i;
            }
        }
        best
    }

    pub fn sum(&self) -> f64 {
        self.data.sum()
    }

    /// 所有元素的平方和（L2范数的平方）
    pub fn squared_norm(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum()
    }

    pub fn norm(&self) -> f64 {
        self.squared_norm().sqrt()
    }

    /// 是否所有元素都为0
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&x| x == 0.0)
    }

    fn assert_index(&self, index: usize) {
        assert!(
            index < self.size(),
            "{}",
            TensorError::IndexOutOfRange {
                index,
                size: self.size(),
            }
        );
    }
}
