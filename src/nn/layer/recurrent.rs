/*
 * @Author       : 老董
 * @Date         : 2026-01-21
 * @Description  : 循环层（单向、单层）：持有一种循环单元全部门的参数以及可学习的初始状态
 *
 * 公式（[a, b, ...]表示各输入槽分别乘以各自的权重后相加）:
 *   RNN : h_t = tanh(L_h([h_{t-1}, x_t]))
 *   GRU : r_t = σ(L_r([h_{t-1}, x_t]))                        # 重置门
 *         z_t = σ(L_z([h_{t-1}, x_t]))                        # 更新门
 *         g_t = tanh(L_g([r_t ⊙ h_{t-1}, x_t]))               # 候选状态
 *         h_t = (1 - z_t) ⊙ h_{t-1} + z_t ⊙ g_t
 *   LSTM: i_t, f_t, o_t = σ(L_i/f/o([h_{t-1}, x_t]))          # 输入门、遗忘门、输出门
 *         g_t = tanh(L_g([h_{t-1}, x_t]))                     # 候选记忆
 *         c_t = f_t ⊙ c_{t-1} + i_t ⊙ g_t
 *         h_t = o_t ⊙ tanh(c_t)
 *
 * 其中x_t可以由多个维度不同的输入槽组成。
 * 本层只是参数的容器，具体的前向/反向计算由计算图中的循环单元节点完成。
 */

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Linear;
use crate::nn::{GraphError, Parameter, SharedParameter};

/// 循环单元类型。数字编码与超参数文件中的`cell type`一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    Rnn,
    Gru,
    Lstm,
}

impl CellType {
    pub fn code(&self) -> usize {
        match self {
            Self::Rnn => 0,
            Self::Gru => 1,
            Self::Lstm => 2,
        }
    }

    pub fn from_code(code: usize) -> Option<Self> {
        match code {
            0 => Some(Self::Rnn),
            1 => Some(Self::Gru),
            2 => Some(Self::Lstm),
            _ => None,
        }
    }

    /// 该单元类型拥有的门（顺序固定，决定参数的排列顺序）
    pub fn gates(&self) -> &'static [Gate] {
        match self {
            Self::Rnn => &[Gate::Hidden],
            Self::Gru => &[Gate::Reset, Gate::Update, Gate::Candidate],
            Self::Lstm => &[Gate::Input, Gate::Forget, Gate::Output, Gate::Candidate],
        }
    }

    /// 是否带有记忆单元c
    pub fn has_memory(&self) -> bool {
        matches!(self, Self::Lstm)
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rnn => "RNN",
            Self::Gru => "GRU",
            Self::Lstm => "LSTM",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Hidden,
    Reset,
    Update,
    Input,
    Forget,
    Output,
    Candidate,
}

impl Gate {
    fn label(&self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Reset => "reset",
            Self::Update => "update",
            Self::Input => "input",
            Self::Forget => "forget",
            Self::Output => "output",
            Self::Candidate => "candidate",
        }
    }
}

#[derive(Debug)]
pub struct RecurrentLayer {
    cell_type: CellType,
    hidden_size: usize,
    input_sizes: Vec<usize>,
    gates: Vec<(Gate, Linear)>,
    /// h_0
    init_hidden: SharedParameter,
    /// c_0（仅LSTM）
    init_memory: Option<SharedParameter>,
}

impl RecurrentLayer {
    /// `input_sizes`为当前时刻各输入槽的维度（不含h_{t-1}）
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        cell_type: CellType,
        input_sizes: &[usize],
        hidden_size: usize,
        rng: &mut R,
    ) -> Self {
        let mut gate_inputs = vec![hidden_size];
        gate_inputs.extend_from_slice(input_sizes);

        let gates = cell_type
            .gates()
            .iter()
            .map(|&gate| {
                let linear = Linear::new(
                    &format!("{name}.{}", gate.label()),
                    &gate_inputs,
                    hidden_size,
                    rng,
                );
                (gate, linear)
            })
            .collect();
        let init_hidden =
            Parameter::new_glorot(&format!("{name}.h0"), &[hidden_size], rng).into_shared();
        let init_memory = cell_type.has_memory().then(|| {
            Parameter::new_glorot(&format!("{name}.c0"), &[hidden_size], rng).into_shared()
        });

        Self {
            cell_type,
            hidden_size,
            input_sizes: input_sizes.to_vec(),
            gates,
            init_hidden,
            init_memory,
        }
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn input_sizes(&self) -> &[usize] {
        &self.input_sizes
    }

    pub fn gate(&self, gate: Gate) -> Result<&Linear, GraphError> {
        self.gates
            .iter()
            .find(|(g, _)| *g == gate)
            .map(|(_, linear)| linear)
            .ok_or_else(|| {
                GraphError::InvalidOperation(format!(
                    "{}单元没有{:?}门。不该触及本错误，否则说明crate代码有问题",
                    self.cell_type, gate
                ))
            })
    }

    pub fn init_hidden(&self) -> &SharedParameter {
        &self.init_hidden
    }

    pub fn init_memory(&self) -> Option<&SharedParameter> {
        self.init_memory.as_ref()
    }

    /// 全部参数：各门（按门的固定顺序）的参数，然后是初始状态
    pub fn parameters(&self) -> Vec<SharedParameter> {
        let mut params: Vec<SharedParameter> = self
            .gates
            .iter()
            .flat_map(|(_, linear)| linear.parameters())
            .collect();
        params.push(self.init_hidden.clone());
        if let Some(c0) = &self.init_memory {
            params.push(c0.clone());
        }
        params
    }
}
