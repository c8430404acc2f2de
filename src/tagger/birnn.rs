/*
 * @Author       : 老董
 * @Date         : 2026-02-06
 * @Description  : 序列特征提取器：词嵌入（+字符级表示）→ 多层循环网络，方向按层的奇偶交替。
 *                 第0层前向、第1层后向；d≥2的层以同一位置上第d-1、d-2层的状态为输入。
 *                 节点按前向遍历顺序插入图中：字符级节点 → 词嵌入 → 各层初始状态 → 第0层 → 第1层 → ...，
 *                 所以图的反向传播恰好是逐层由深到浅、每层逆着自己的方向进行
 */

use std::path::Path;
use std::rc::Rc;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{CharBiRnnFeatureExtractor, NeuralNetParameters};
use crate::encoder::{SharedVocabulary, UNDEF, UNKNOWN};
use crate::nn::serialization::{load_parameters, save_parameters};
use crate::nn::{Graph, GraphError, LookupTable, NodeId, RecurrentLayer, SharedParameter, UpdateRule};

const PARAMETERS_FILE: &str = "rnn_parameters.bin";
/// 词dropout：词w被替换为UNKNOWN的概率为 α / (α + count(w))
const WORD_DROPOUT_ALPHA: f64 = 0.8375;

#[derive(Debug)]
pub struct BiRnnFeatureExtractor {
    /// 偶数层前向，奇数层后向
    layers: Vec<Rc<RecurrentLayer>>,
    char_rnn: Option<CharBiRnnFeatureExtractor>,
    vocabulary: SharedVocabulary,
    train_time: bool,
    /// 推理时字符级表示是否可以走预计算缓存
    char_cache: bool,
    /// 词dropout专用
    rng: StdRng,
}

impl BiRnnFeatureExtractor {
    pub fn new<R: Rng + ?Sized>(
        params: &NeuralNetParameters,
        vocabulary: SharedVocabulary,
        rng: &mut R,
    ) -> Self {
        let rnn = &params.rnn;
        let char_rnn = rnn.crnn.tokenizer.map(|tokenizer| {
            CharBiRnnFeatureExtractor::new(&rnn.crnn, tokenizer, vocabulary.clone(), rng)
        });

        let mut input_sizes = Vec::new();
        if let Some(c) = &char_rnn {
            input_sizes.extend([c.output_size(), c.output_size()]);
        }
        input_sizes.push(params.word_embedding_size());

        let layers = (0..rnn.depth)
            .map(|d| {
                let sizes = if d < 2 {
                    input_sizes.clone()
                } else {
                    vec![rnn.hidden_size, rnn.hidden_size]
                };
                Rc::new(RecurrentLayer::new(
                    &format!("rnn.l{d}"),
                    rnn.cell_type,
                    &sizes,
                    rnn.hidden_size,
                    rng,
                ))
            })
            .collect();

        Self {
            layers,
            char_rnn,
            vocabulary,
            train_time: false,
            char_cache: true,
            rng: StdRng::seed_from_u64(rng.r#gen()),
        }
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// 训练时启用词dropout，且字符级表示不走预计算缓存
    pub fn set_train_time(&mut self, train_time: bool) {
        self.train_time = train_time;
    }

    /// 梯度检验时关闭缓存，让字符级参数的扰动反映到损失上
    pub fn set_char_cache(&mut self, enabled: bool) {
        self.char_cache = enabled;
    }

    pub fn char_rnn(&self) -> Option<&CharBiRnnFeatureExtractor> {
        self.char_rnn.as_ref()
    }

    /// 每个位置输出的状态维度：深度≥2时为最上面两层，深度为1时只有第0层
    pub fn output_sizes(&self) -> Vec<usize> {
        let n = self.layers.len().min(2);
        self.layers[self.layers.len() - n..]
            .iter()
            .map(|l| l.hidden_size())
            .collect()
    }

    fn drop_word(&mut self, id: usize) -> usize {
        if !self.train_time || id == UNDEF || id == UNKNOWN {
            return id;
        }
        let count = self.vocabulary.borrow().frequency(id);
        let threshold = WORD_DROPOUT_ALPHA / (WORD_DROPOUT_ALPHA + count);
        if self.rng.r#gen::<f64>() < threshold {
            UNKNOWN
        } else {
            id
        }
    }

    /// 为整句话构建节点，返回每个位置的输出状态节点（见[`Self::output_sizes`]）
    pub fn build(
        &mut self,
        graph: &mut Graph,
        ids: &[usize],
        lu: &mut LookupTable,
    ) -> Result<Vec<Vec<NodeId>>, GraphError> {
        if ids.is_empty() {
            return Err(GraphError::InvalidOperation("不能为空句子构建计算图".to_string()));
        }
        let n = ids.len();

        let char_outputs = match &mut self.char_rnn {
            Some(c) => Some(c.build(graph, ids, self.char_cache && !self.train_time)?),
            None => None,
        };

        // 词dropout只作用于词嵌入，字符级表示仍使用原词
        let mut inputs = Vec::with_capacity(n);
        for (i, &id) in ids.iter().enumerate() {
            let mut slots = Vec::with_capacity(3);
            if let Some(outputs) = &char_outputs {
                let (forward, backward) = outputs[i];
                slots.extend([forward, backward]);
            }
            let word = self.drop_word(id);
            slots.push(graph.lookup(lu.get(word))?);
            inputs.push(slots);
        }

        let init: Vec<NodeId> = self
            .layers
            .iter()
            .map(|layer| graph.initial_state(layer))
            .collect();

        let mut states: Vec<Vec<NodeId>> = Vec::with_capacity(self.layers.len());
        for (d, layer) in self.layers.iter().enumerate() {
            let positions: Vec<usize> = if d % 2 == 0 {
                (0..n).collect()
            } else {
                (0..n).rev().collect()
            };
            let mut row = vec![init[d]; n];
            let mut pred = init[d];
            for i in positions {
                let input = if d < 2 {
                    inputs[i].clone()
                } else {
                    vec![states[d - 1][i], states[d - 2][i]]
                };
                pred = graph.recurrent(layer, pred, &input)?;
                row[i] = pred;
            }
            states.push(row);
        }
        debug!("特征提取器为{}个词构建了{}层状态", n, states.len());

        let top = states.len().min(2);
        Ok((0..n)
            .map(|i| states[states.len() - top..].iter().map(|row| row[i]).collect())
            .collect())
    }

    /// 循环层的参数（不含字符级子编码器）
    pub fn parameters(&self) -> Vec<SharedParameter> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    /// 梯度检验用：循环层参数 + 字符级子编码器的参数与活跃嵌入
    pub fn get_parameters(&self) -> Vec<SharedParameter> {
        let mut params = self.parameters();
        if let Some(c) = &self.char_rnn {
            params.extend(c.get_parameters());
        }
        params
    }

    pub fn update<R: Rng + ?Sized>(&mut self, rule: &UpdateRule, rng: &mut R) {
        for p in self.parameters() {
            p.borrow_mut().update(rule, rng);
        }
        if let Some(c) = &mut self.char_rnn {
            c.update(rule, rng);
        }
    }

    pub fn gradient_squared_norm(&self) -> f64 {
        let own: f64 = self
            .parameters()
            .iter()
            .map(|p| p.borrow().gradient_squared_norm())
            .sum();
        own + self
            .char_rnn
            .as_ref()
            .map_or(0.0, |c| c.gradient_squared_norm())
    }

    pub fn scale_gradient(&self, scale: f64) {
        for p in self.parameters() {
            p.borrow_mut().scale_gradient(scale);
        }
        if let Some(c) = &self.char_rnn {
            c.scale_gradient(scale);
        }
    }

    pub fn reset_gradient_history(&self) {
        for p in self.parameters() {
            p.borrow_mut().reset_gradient_history();
        }
        if let Some(c) = &self.char_rnn {
            c.reset_gradient_history();
        }
    }

    pub fn assign(&mut self, other: &BiRnnFeatureExtractor) {
        for (p, q) in self.parameters().iter().zip(other.parameters()) {
            p.borrow_mut().assign(&q.borrow());
        }
        if let (Some(c), Some(o)) = (&mut self.char_rnn, &other.char_rnn) {
            c.assign(o);
        }
    }

    pub fn average(&mut self, t: f64) {
        for p in self.parameters() {
            p.borrow_mut().average(t);
        }
        if let Some(c) = &mut self.char_rnn {
            c.average(t);
        }
    }

    /// 预计算字符级表示（没有字符级子编码器时什么都不做）
    pub fn precompute_char_lstm(&mut self) -> Result<(), GraphError> {
        match &mut self.char_rnn {
            Some(c) => c.precompute(),
            None => Ok(()),
        }
    }

    pub fn export_model(&self, dir: &Path) -> Result<(), GraphError> {
        save_parameters(&self.parameters(), dir.join(PARAMETERS_FILE))?;
        match &self.char_rnn {
            Some(c) => c.export_model(dir),
            None => Ok(()),
        }
    }

    pub fn load_parameters(&mut self, dir: &Path) -> Result<(), GraphError> {
        load_parameters(&self.parameters(), dir.join(PARAMETERS_FILE))?;
        match &mut self.char_rnn {
            Some(c) => c.load_parameters(dir),
            None => Ok(()),
        }
    }
}
