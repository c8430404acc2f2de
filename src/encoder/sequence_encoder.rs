use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use super::{Tokenizer, UNKNOWN, Vocabulary};
use crate::nn::GraphError;

const UNKNOWN_SEGMENTS: &[usize] = &[UNKNOWN];

/// 词id → 片段id序列。片段有自己的词表（保留id与词的词表相同）。
/// 映射按需扩展：遇到超出当前范围的词id时，把词表中尚未处理的词一次性切分编码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEncoder {
    tokenizer: Tokenizer,
    segments: Vocabulary,
    dictionary: Vec<Vec<usize>>,
}

impl SequenceEncoder {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            segments: Vocabulary::new(),
            dictionary: Vec::new(),
        }
    }

    pub fn tokenizer(&self) -> Tokenizer {
        self.tokenizer
    }

    /// 片段词表大小
    pub fn char_voc_size(&self) -> usize {
        self.segments.len()
    }

    /// 已经编码过的词的个数
    pub fn len(&self) -> usize {
        self.dictionary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty()
    }

    /// 编码`vocabulary`中尚未编码的词。保留id按其占位字符串编码；
    /// 切分结果为空的词（如空串）编码为单个[`UNKNOWN`]片段
    pub fn init(&mut self, vocabulary: &Vocabulary) {
        let from = self.dictionary.len();
        for id in from..vocabulary.len() {
            let word = vocabulary.decode(id).unwrap_or_default();
            let mut encoded: Vec<usize> = self
                .tokenizer
                .segment(word)
                .iter()
                .map(|segment| self.segments.code(segment))
                .collect();
            if encoded.is_empty() {
                encoded.push(UNKNOWN);
            }
            self.dictionary.push(encoded);
        }
        if vocabulary.len() > from {
            debug!(
                "序列编码器（{}）新编码了{}个词，片段词表大小为{}",
                self.tokenizer,
                vocabulary.len() - from,
                self.segments.len()
            );
        }
    }

    /// 词id对应的片段id序列（非空）。词表中新增的词会先被切分编码；
    /// 词表中根本没有的id没有词形可切分，按单个[`UNKNOWN`]片段处理且不记入映射
    pub fn encode(&mut self, id: usize, vocabulary: &Vocabulary) -> &[usize] {
        if id >= self.dictionary.len() {
            self.init(vocabulary);
        }
        self.dictionary
            .get(id)
            .map_or(UNKNOWN_SEGMENTS, Vec::as_slice)
    }

    pub fn export_model(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serialize_into(writer, self)
            .map_err(|e| GraphError::Io(format!("导出序列编码器失败: {e}")))
    }

    pub fn import_model(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        bincode::deserialize_from(reader)
            .map_err(|e| GraphError::InvalidModelFile(format!("无法解析序列编码器: {e}")))
    }
}
