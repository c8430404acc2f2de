/*
 * @Author       : 老董
 * @Date         : 2024-02-01 10:12:45
 * @Description  : 可学习参数：权重张量 + 梯度累加器 + 更新所需的状态（AdaGrad历史、隐式平均累加器）
 */

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::nn::GraphError;
use crate::tensor::Tensor;

/// 被多个层/节点共享的参数。整个训练过程是单线程的，所以用`Rc<RefCell<_>>`即可
pub type SharedParameter = Rc<RefCell<Parameter>>;

/// AdaGrad分母中防止除零的小常数
const ADAGRAD_EPSILON: f64 = 1e-8;
/// 高斯噪声方差的衰减指数：σ² = η / (1 + t)^0.55
const NOISE_DECAY_EXPONENT: f64 = 0.55;

/// 一次参数更新所需的全部超参数。学习率由调用方按`lr0 / (1 + T·decrease_constant)`算好后传入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateRule {
    pub learning_rate: f64,
    /// 全局更新步数T（从0开始），同时用于噪声衰减和隐式平均
    pub step: f64,
    pub clip_value: f64,
    pub gradient_clipping: bool,
    pub gaussian_noise: bool,
    pub gaussian_noise_eta: f64,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    weights: Tensor,
    grad: Tensor,
    /// AdaGrad：累计的梯度平方
    grad_history: Tensor,
    /// 隐式平均：Σ t·Δw_t，平均后的权重为 w - acc / T
    average_acc: Tensor,
}

impl Parameter {
    pub fn new(name: &str, weights: Tensor) -> Self {
        let zeros = Tensor::zeros_like(&weights);
        Self {
            name: name.to_string(),
            grad: zeros.clone(),
            grad_history: zeros.clone(),
            average_acc: zeros,
            weights,
        }
    }

    /// Glorot均匀初始化：U(-a, a)，a = sqrt(6 / (fan_in + fan_out))。向量按fan_in=1处理
    pub fn new_glorot<R: Rng + ?Sized>(name: &str, shape: &[usize], rng: &mut R) -> Self {
        let (fan_out, fan_in) = match shape {
            [rows, cols] => (*rows, *cols),
            [n] => (*n, 1),
            _ => (shape.iter().product(), 1),
        };
        let bound = (6.0 / (fan_in + fan_out) as f64).sqrt();
        Self::new(name, Tensor::new_random_with_rng(-bound, bound, shape, rng))
    }

    pub fn into_shared(self) -> SharedParameter {
        Rc::new(RefCell::new(self))
    }

    /// 参数的稳定名称，用于导出/导入时按名匹配
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    pub fn grad(&self) -> &Tensor {
        &self.grad
    }

    pub fn shape(&self) -> &[usize] {
        self.weights.shape()
    }

    /// 参数中元素的个数
    pub fn size(&self) -> usize {
        self.weights.size()
    }

    /// 覆盖权重（形状须一致），用于模型导入
    pub fn set_weights(&mut self, weights: &Tensor) -> Result<(), GraphError> {
        if !self.weights.is_same_shape(weights) {
            return Err(GraphError::ShapeMismatch {
                expected: self.shape().to_vec(),
                got: weights.shape().to_vec(),
                message: format!("参数`{}`的权重形状不一致", self.name),
            });
        }
        self.weights.assign(weights);
        Ok(())
    }

    /// 往梯度累加器中加上一份贡献
    pub fn accumulate_grad(&mut self, grad: &Tensor) {
        self.grad += grad;
    }

    /// 累加外积形式的梯度贡献：grad[r, c] += a[r] * b[c]
    pub fn accumulate_outer_grad(&mut self, a: &Tensor, b: &Tensor) {
        self.grad.add_outer(a, b);
    }

    pub fn clear_grad(&mut self) {
        self.grad.clear();
    }

    pub fn gradient_squared_norm(&self) -> f64 {
        self.grad.squared_norm()
    }

    pub fn scale_gradient(&mut self, scale: f64) {
        self.grad *= scale;
    }

    pub fn reset_gradient_history(&mut self) {
        self.grad_history.clear();
    }

    /// 按扁平下标给第k个权重加上epsilon（梯度检验用）
    pub fn add_epsilon(&mut self, k: usize, epsilon: f64) {
        self.weights.add_at(k, epsilon);
    }

    /// 一次参数更新：梯度裁剪 → 高斯噪声 → AdaGrad步长 → 累加隐式平均 → 清空梯度。
    /// 梯度为零（本步未参与反向传播）时不做任何事
    pub fn update<R: Rng + ?Sized>(&mut self, rule: &UpdateRule, rng: &mut R) {
        if self.grad.is_zero() {
            return;
        }

        // 1. 梯度裁剪（按单个参数的范数）
        if rule.gradient_clipping {
            let norm = self.grad.norm();
            if norm > rule.clip_value {
                self.grad *= rule.clip_value / norm;
            }
        }

        // 2. 高斯噪声
        if rule.gaussian_noise {
            let variance = rule.gaussian_noise_eta / (1.0 + rule.step).powf(NOISE_DECAY_EXPONENT);
            if let Ok(normal) = Normal::new(0.0, variance.sqrt()) {
                self.grad.map_inplace(|g| g + normal.sample(&mut *rng));
            }
        }

        // 3. AdaGrad
        self.grad_history += &(&self.grad * &self.grad);
        let delta = (&self.grad * -rule.learning_rate)
            * self.grad_history.map(|h| 1.0 / (h + ADAGRAD_EPSILON).sqrt());
        self.weights += &delta;

        // 4. 隐式平均
        self.average_acc += &(&delta * rule.step);

        // 5. 清空梯度
        self.grad.clear();
    }

    /// 把权重替换为前T次更新后的权重均值。之后累加器清零，因此重复调用不会改变权重
    pub fn average(&mut self, t: f64) {
        if t <= 0.0 {
            return;
        }
        let correction = &self.average_acc * (1.0 / t);
        self.weights -= &correction;
        self.average_acc.clear();
        debug!("参数`{}`已完成平均（T={}）", self.name, t);
    }

    /// 从另一参数复制权重与平均累加器（不复制梯度与AdaGrad历史）
    pub fn assign(&mut self, other: &Parameter) {
        self.weights.assign(&other.weights);
        self.average_acc.assign(&other.average_acc);
    }
}
