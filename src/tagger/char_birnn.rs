/*
 * @Author       : 老董
 * @Date         : 2026-02-06
 * @Description  : 字符级子编码器：对每个词的片段序列跑一个前向LSTM和一个后向LSTM，
 *                 以（前向最后状态，后向最前状态）作为该词的字符级表示。
 *                 训练结束后可对整个词表预计算并缓存这对向量，之后以常量节点代替整条LSTM链
 */

use std::path::Path;
use std::rc::Rc;

use log::{info, warn};
use rand::Rng;

use super::CharRnnParameters;
use crate::encoder::{SequenceEncoder, SharedVocabulary, Tokenizer};
use crate::nn::serialization::{load_parameters, save_parameters};
use crate::nn::{
    CellType, Graph, GraphError, LookupTable, NodeId, RecurrentLayer, SharedParameter, UpdateRule,
};
use crate::tensor::Tensor;

const PARAMETERS_FILE: &str = "char_rnn_parameters.bin";
const LOOKUP_FILE: &str = "lu_char_rnn.bin";
const ENCODER_FILE: &str = "char_encoder.bin";

#[derive(Debug)]
pub struct CharBiRnnFeatureExtractor {
    /// 0：前向，1：后向
    layers: [Rc<RecurrentLayer>; 2],
    lu: LookupTable,
    encoder: SequenceEncoder,
    vocabulary: SharedVocabulary,
    /// 按词id缓存的（前向，后向）向量
    precomputed: Vec<(Tensor, Tensor)>,
}

impl CharBiRnnFeatureExtractor {
    pub fn new<R: Rng + ?Sized>(
        params: &CharRnnParameters,
        tokenizer: Tokenizer,
        vocabulary: SharedVocabulary,
        rng: &mut R,
    ) -> Self {
        let input_sizes = [params.dim_char];
        let hidden = params.dim_char_based_embeddings;
        let layers = [0, 1].map(|d| {
            Rc::new(RecurrentLayer::new(
                &format!("char_rnn.l{d}"),
                CellType::Lstm,
                &input_sizes,
                hidden,
                rng,
            ))
        });
        let mut encoder = SequenceEncoder::new(tokenizer);
        encoder.init(&vocabulary.borrow());
        Self {
            layers,
            lu: LookupTable::new("lu_char_rnn", params.dim_char, rng.r#gen()),
            encoder,
            vocabulary,
            precomputed: Vec::new(),
        }
    }

    /// 字符级表示中每个向量的维度
    pub fn output_size(&self) -> usize {
        self.layers[0].hidden_size()
    }

    pub fn encoder(&self) -> &SequenceEncoder {
        &self.encoder
    }

    pub fn lookup_table(&self) -> &LookupTable {
        &self.lu
    }

    /// 为句子中的每个词添加节点，返回各词的（前向最后状态，后向最前状态）节点。
    /// `use_precomputed`为真时有缓存的词直接使用常量节点；训练时必须为假，否则梯度传不到字符级参数
    pub fn build(
        &mut self,
        graph: &mut Graph,
        ids: &[usize],
        use_precomputed: bool,
    ) -> Result<Vec<(NodeId, NodeId)>, GraphError> {
        let init = [
            graph.initial_state(&self.layers[0]),
            graph.initial_state(&self.layers[1]),
        ];
        let vocabulary = self.vocabulary.borrow();
        let mut outputs = Vec::with_capacity(ids.len());
        for &id in ids {
            if use_precomputed {
                if let Some((forward, backward)) = self.precomputed.get(id) {
                    outputs.push((graph.constant(forward.clone())?, graph.constant(backward.clone())?));
                    continue;
                }
            }

            let segments = self.encoder.encode(id, &vocabulary);
            let mut inputs = Vec::with_capacity(segments.len());
            for &segment in segments {
                inputs.push(graph.lookup(self.lu.get(segment))?);
            }

            let mut forward = init[0];
            for &x in &inputs {
                forward = graph.recurrent(&self.layers[0], forward, &[x])?;
            }
            let mut backward = init[1];
            for &x in inputs.iter().rev() {
                backward = graph.recurrent(&self.layers[1], backward, &[x])?;
            }
            outputs.push((forward, backward));
        }
        Ok(outputs)
    }

    /// 对词表中的每个词（按id）跑一遍字符级网络并缓存结果
    pub fn precompute(&mut self) -> Result<(), GraphError> {
        let n = self.vocabulary.borrow().len();
        info!("为词表中的{}个词预计算字符级LSTM", n);
        self.precomputed.clear();
        for id in 0..n {
            let mut graph = Graph::new();
            let (forward, backward) = self.build(&mut graph, &[id], false)?[0];
            graph.forward()?;
            self.precomputed
                .push((graph.value(forward)?.clone(), graph.value(backward)?.clone()));
        }
        self.lu.clear_active();
        info!("字符级LSTM预计算完成");
        Ok(())
    }

    pub fn has_precomputed(&self) -> bool {
        !self.precomputed.is_empty()
    }

    /// 参数一旦改变，缓存就不再有效
    fn invalidate_precomputed(&mut self) {
        if self.has_precomputed() {
            warn!("字符级LSTM的参数已改变，丢弃{}个预计算向量", self.precomputed.len());
            self.precomputed.clear();
        }
    }

    /// 两个LSTM层的参数（不含查找表）
    pub fn parameters(&self) -> Vec<SharedParameter> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    /// 梯度检验用：层参数 + 本步活跃的字符嵌入
    pub fn get_parameters(&self) -> Vec<SharedParameter> {
        let mut params = self.parameters();
        params.extend(self.lu.get_active_params());
        params
    }

    pub fn update<R: Rng + ?Sized>(&mut self, rule: &UpdateRule, rng: &mut R) {
        for p in self.parameters() {
            p.borrow_mut().update(rule, rng);
        }
        self.lu.update(rule, rng);
        self.invalidate_precomputed();
    }

    pub fn gradient_squared_norm(&self) -> f64 {
        self.parameters()
            .iter()
            .map(|p| p.borrow().gradient_squared_norm())
            .sum::<f64>()
            + self.lu.gradient_squared_norm()
    }

    pub fn scale_gradient(&self, scale: f64) {
        for p in self.parameters() {
            p.borrow_mut().scale_gradient(scale);
        }
        self.lu.scale_gradient(scale);
    }

    pub fn reset_gradient_history(&self) {
        for p in self.parameters() {
            p.borrow_mut().reset_gradient_history();
        }
        self.lu.reset_gradient_history();
    }

    /// 复制另一个编码器的参数、字符嵌入与片段词表
    pub fn assign(&mut self, other: &CharBiRnnFeatureExtractor) {
        for (p, q) in self.parameters().iter().zip(other.parameters()) {
            p.borrow_mut().assign(&q.borrow());
        }
        self.lu.assign(&other.lu);
        self.encoder = other.encoder.clone();
        self.invalidate_precomputed();
    }

    pub fn average(&mut self, t: f64) {
        for p in self.parameters() {
            p.borrow_mut().average(t);
        }
        self.lu.average(t);
        self.invalidate_precomputed();
    }

    pub fn export_model(&self, dir: &Path) -> Result<(), GraphError> {
        save_parameters(&self.parameters(), dir.join(PARAMETERS_FILE))?;
        self.lu.export_model(dir.join(LOOKUP_FILE))?;
        self.encoder.export_model(dir.join(ENCODER_FILE))
    }

    pub fn load_parameters(&mut self, dir: &Path) -> Result<(), GraphError> {
        load_parameters(&self.parameters(), dir.join(PARAMETERS_FILE))?;
        self.lu.load(dir.join(LOOKUP_FILE))?;
        self.encoder = SequenceEncoder::import_model(dir.join(ENCODER_FILE))?;
        self.invalidate_precomputed();
        Ok(())
    }
}
