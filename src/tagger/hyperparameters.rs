/*
 * @Author       : 老董
 * @Date         : 2026-02-05
 * @Description  : 超参数。选项文件每行一个`键<TAB>值`，例如`learning rate\t0.02`、`embedding sizes\t8 8`
 */

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::encoder::Tokenizer;
use crate::nn::{CellType, GraphError, UpdateRule};

/// 分类头的结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetTopology {
    /// 分类头的隐藏层数（0表示循环网络的输出直接接softmax）
    pub n_hidden_layers: usize,
    pub size_hidden_layers: usize,
    /// 各输入特征的嵌入维度，第0个为词嵌入
    pub embedding_sizes: Vec<usize>,
}

impl Default for NetTopology {
    fn default() -> Self {
        Self {
            n_hidden_layers: 2,
            size_hidden_layers: 16,
            embedding_sizes: vec![8, 8, 8, 8],
        }
    }
}

/// 字符级子编码器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharRnnParameters {
    pub dim_char: usize,
    pub dim_char_based_embeddings: usize,
    /// 词形的切分方式，None表示不使用字符级子编码器
    pub tokenizer: Option<Tokenizer>,
}

impl Default for CharRnnParameters {
    fn default() -> Self {
        Self {
            dim_char: 16,
            dim_char_based_embeddings: 32,
            tokenizer: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RnnParameters {
    pub cell_type: CellType,
    /// 1：单个前向层；2：双向；更深时方向按层的奇偶交替
    pub depth: usize,
    pub hidden_size: usize,
    /// 每个位置的词特征个数（目前只有词本身）
    pub features: usize,
    pub crnn: CharRnnParameters,
}

impl Default for RnnParameters {
    fn default() -> Self {
        Self {
            cell_type: CellType::Lstm,
            depth: 2,
            hidden_size: 64,
            features: 1,
            crnn: CharRnnParameters::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetParameters {
    pub topology: NetTopology,
    pub rnn: RnnParameters,
    pub learning_rate: f64,
    pub decrease_constant: f64,
    pub clip_value: f64,
    pub gaussian_noise_eta: f64,
    pub gaussian_noise: bool,
    pub gradient_clipping: bool,
    /// 参数初始化、词dropout与梯度噪声的随机种子
    pub seed: u64,
    pub voc_sizes: Vec<usize>,
}

impl Default for NeuralNetParameters {
    fn default() -> Self {
        Self {
            topology: NetTopology::default(),
            rnn: RnnParameters::default(),
            learning_rate: 0.02,
            decrease_constant: 1e-6,
            clip_value: 10.0,
            gaussian_noise_eta: 0.1,
            gaussian_noise: false,
            gradient_clipping: false,
            seed: 0,
            voc_sizes: Vec::new(),
        }
    }
}

impl NeuralNetParameters {
    pub fn read_option_file(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse_options(&text)
    }

    /// 从默认值出发，依次应用每一行选项。格式不对的行只给出警告，未知的键或非法的值则报错
    pub fn parse_options(text: &str) -> Result<Self, GraphError> {
        let mut p = Self::default();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match line.split('\t').collect::<Vec<_>>().as_slice() {
                [key, value] => p.set_option(key.trim(), value.trim())?,
                _ => warn!("无法识别的选项行：{line}"),
            }
        }
        Ok(p)
    }

    fn set_option(&mut self, key: &str, value: &str) -> Result<(), GraphError> {
        match key {
            "learning rate" => self.learning_rate = parse(key, value)?,
            "decrease constant" => self.decrease_constant = parse(key, value)?,
            "gradient clipping" => self.gradient_clipping = parse_flag(key, value)?,
            "clip value" => self.clip_value = parse(key, value)?,
            "gaussian noise" => self.gaussian_noise = parse_flag(key, value)?,
            "gaussian noise eta" => self.gaussian_noise_eta = parse(key, value)?,
            "hidden layers" => self.topology.n_hidden_layers = parse(key, value)?,
            "size hidden layers" => self.topology.size_hidden_layers = parse(key, value)?,
            "embedding sizes" => self.topology.embedding_sizes = parse_list(key, value)?,
            "cell type" => {
                let code = parse(key, value)?;
                self.rnn.cell_type = CellType::from_code(code).ok_or_else(|| {
                    GraphError::Config(format!("未知的循环单元类型{code}（0=RNN，1=GRU，2=LSTM）"))
                })?;
            }
            "rnn depth" => self.rnn.depth = parse(key, value)?,
            "rnn state size" => self.rnn.hidden_size = parse(key, value)?,
            "number of token feature (rnn)" => self.rnn.features = parse(key, value)?,
            "char rnn" => {
                let code = parse(key, value)?;
                self.rnn.crnn.tokenizer = match code {
                    0 => None,
                    _ => Some(Tokenizer::from_code(code).ok_or_else(|| {
                        GraphError::Config(format!("未知的切分方式{code}"))
                    })?),
                };
            }
            "char embedding size" => self.rnn.crnn.dim_char = parse(key, value)?,
            "char based embedding size" => {
                self.rnn.crnn.dim_char_based_embeddings = parse(key, value)?
            }
            "seed" => self.seed = parse(key, value)?,
            "voc sizes" => self.voc_sizes = parse_list(key, value)?,
            "bi-rnn" | "auxiliary task" | "auxiliary task max idx" => {
                debug!("选项`{key}`已不再使用，忽略");
            }
            _ => return Err(GraphError::Config(format!("未知的选项`{key}`"))),
        }
        Ok(())
    }

    /// 按选项文件的格式输出，`parse_options`可以读回
    pub fn print<W: Write>(&self, os: &mut W) -> io::Result<()> {
        writeln!(os, "learning rate\t{}", self.learning_rate)?;
        writeln!(os, "decrease constant\t{}", self.decrease_constant)?;
        writeln!(os, "gradient clipping\t{}", u8::from(self.gradient_clipping))?;
        writeln!(os, "clip value\t{}", self.clip_value)?;
        writeln!(os, "gaussian noise\t{}", u8::from(self.gaussian_noise))?;
        writeln!(os, "gaussian noise eta\t{}", self.gaussian_noise_eta)?;
        writeln!(os, "hidden layers\t{}", self.topology.n_hidden_layers)?;
        writeln!(os, "size hidden layers\t{}", self.topology.size_hidden_layers)?;
        writeln!(os, "embedding sizes\t{}", join(&self.topology.embedding_sizes))?;
        writeln!(os, "cell type\t{}", self.rnn.cell_type.code())?;
        writeln!(os, "rnn depth\t{}", self.rnn.depth)?;
        writeln!(os, "rnn state size\t{}", self.rnn.hidden_size)?;
        writeln!(os, "number of token feature (rnn)\t{}", self.rnn.features)?;
        writeln!(
            os,
            "char rnn\t{}",
            self.rnn.crnn.tokenizer.map_or(0, |t| t.code())
        )?;
        writeln!(os, "char embedding size\t{}", self.rnn.crnn.dim_char)?;
        writeln!(
            os,
            "char based embedding size\t{}",
            self.rnn.crnn.dim_char_based_embeddings
        )?;
        writeln!(os, "seed\t{}", self.seed)?;
        writeln!(os, "voc sizes\t{}", join(&self.voc_sizes))
    }

    /// 检查能否据此构建模型
    pub fn validate(&self) -> Result<(), GraphError> {
        let fail = |msg: &str| Err(GraphError::Config(msg.to_string()));
        if self.rnn.depth == 0 || self.rnn.hidden_size == 0 {
            return fail("循环网络的层数与状态维度都必须大于0");
        }
        if self.rnn.features != 1 {
            return fail("目前每个位置只支持1个词特征");
        }
        if self.topology.embedding_sizes.first().is_none_or(|&d| d == 0) {
            return fail("必须给出大于0的词嵌入维度");
        }
        if self.topology.n_hidden_layers > 0 && self.topology.size_hidden_layers == 0 {
            return fail("分类头隐藏层的维度必须大于0");
        }
        let crnn = &self.rnn.crnn;
        if crnn.tokenizer.is_some() && (crnn.dim_char == 0 || crnn.dim_char_based_embeddings == 0)
        {
            return fail("字符级子编码器的维度必须大于0");
        }
        Ok(())
    }

    /// 词嵌入维度
    pub fn word_embedding_size(&self) -> usize {
        self.topology.embedding_sizes.first().copied().unwrap_or(0)
    }

    /// 第`step`次更新使用的更新规则
    pub fn update_rule(&self, learning_rate: f64, step: usize) -> UpdateRule {
        UpdateRule {
            learning_rate,
            step: step as f64,
            clip_value: self.clip_value,
            gradient_clipping: self.gradient_clipping,
            gaussian_noise: self.gaussian_noise,
            gaussian_noise_eta: self.gaussian_noise_eta,
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, GraphError> {
    value
        .parse()
        .map_err(|_| GraphError::Config(format!("选项`{key}`的值`{value}`无法解析")))
}

/// 0为假，其它整数为真
fn parse_flag(key: &str, value: &str) -> Result<bool, GraphError> {
    parse::<i64>(key, value).map(|v| v != 0)
}

fn parse_list(key: &str, value: &str) -> Result<Vec<usize>, GraphError> {
    value.split_whitespace().map(|v| parse(key, v)).collect()
}

fn join(values: &[usize]) -> String {
    values
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
