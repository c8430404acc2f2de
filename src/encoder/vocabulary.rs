use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::nn::GraphError;

/// 未登录词
pub const UNKNOWN: usize = 0;
/// 未定义（占位）
pub const UNDEF: usize = 1;

const RESERVED: [&str; 2] = ["UNKNOWN", "UNDEF"];

/// 标注器及其子编码器共享的词表。开发集、测试集中的新词形可以随时编码进来
pub type SharedVocabulary = Rc<RefCell<Vocabulary>>;

/// 字符串 ↔ id 的双向词表，附带词形的出现次数（词dropout用）。
/// id从0开始连续分配，0和1保留给[`UNKNOWN`]与[`UNDEF`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    encoder: HashMap<String, usize>,
    decoder: Vec<String>,
    counts: Vec<f64>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocabulary {
    pub fn new() -> Self {
        let mut vocabulary = Self {
            encoder: HashMap::new(),
            decoder: Vec::new(),
            counts: Vec::new(),
        };
        for s in RESERVED {
            vocabulary.code(s);
        }
        vocabulary
    }

    pub fn into_shared(self) -> SharedVocabulary {
        Rc::new(RefCell::new(self))
    }

    /// 返回`s`的id，没有则新分配一个
    pub fn code(&mut self, s: &str) -> usize {
        if let Some(&id) = self.encoder.get(s) {
            return id;
        }
        let id = self.decoder.len();
        self.encoder.insert(s.to_string(), id);
        self.decoder.push(s.to_string());
        id
    }

    /// 只查询不分配：不在词表中的字符串映射为[`UNKNOWN`]
    pub fn code_unknown(&self, s: &str) -> usize {
        self.encoder.get(s).copied().unwrap_or(UNKNOWN)
    }

    pub fn decode(&self, id: usize) -> Option<&str> {
        self.decoder.get(id).map(String::as_str)
    }

    /// 词表大小（含保留id）
    pub fn len(&self) -> usize {
        self.decoder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoder.is_empty()
    }

    /// 编码`s`并把它的出现次数加1，返回id
    pub fn add_occurrence(&mut self, s: &str) -> usize {
        let id = self.code(s);
        self.add_count(id, 1.0);
        id
    }

    /// 按id批量累加出现次数
    pub fn update_frequencies(&mut self, counts: &HashMap<usize, usize>) {
        for (&id, &count) in counts {
            self.add_count(id, count as f64);
        }
    }

    fn add_count(&mut self, id: usize, count: f64) {
        if id >= self.counts.len() {
            self.counts.resize(id + 1, 0.0);
        }
        self.counts[id] += count;
    }

    /// 出现次数（不是相对频率）。从未统计过的id为0
    pub fn frequency(&self, id: usize) -> f64 {
        self.counts.get(id).copied().unwrap_or(0.0)
    }

    /// 每行一个词，按id顺序
    pub fn export_model(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        for s in &self.decoder {
            writeln!(writer, "{s}")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// 读入`export_model`写出的词表。出现次数不随词表保存
    pub fn import_model(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut vocabulary = Self {
            encoder: HashMap::new(),
            decoder: Vec::new(),
            counts: Vec::new(),
        };
        for line in reader.lines() {
            vocabulary.code(&line?);
        }
        if vocabulary.decoder.len() < RESERVED.len()
            || vocabulary.decoder[..RESERVED.len()] != RESERVED
        {
            return Err(GraphError::InvalidModelFile(format!(
                "词表文件{}必须以{:?}开头",
                path.as_ref().display(),
                RESERVED
            )));
        }
        debug!("已导入{}个词", vocabulary.len());
        Ok(vocabulary)
    }
}
