/*
 * @Author       : 老董
 * @Date         : 2024-02-03 16:40:21
 * @Description  : 查找表：符号id → 可训练的嵌入向量（每个id一个Parameter，按需惰性创建，只增不减）
 */

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::nn::{GraphError, Parameter, SharedParameter, UpdateRule};
use crate::tensor::Tensor;

#[derive(Debug)]
pub struct LookupTable {
    name: String,
    dim: usize,
    entries: BTreeMap<usize, SharedParameter>,
    /// 自上次`update`以来被查询过的id
    active: BTreeSet<usize>,
    rng: StdRng,
}

/// 导出到磁盘的快照（只含权重）
#[derive(Serialize, Deserialize)]
struct LookupTableSnapshot {
    name: String,
    dim: usize,
    entries: Vec<(usize, Tensor)>,
}

impl LookupTable {
    pub fn new(name: &str, dim: usize, seed: u64) -> Self {
        Self {
            name: name.to_string(),
            dim,
            entries: BTreeMap::new(),
            active: BTreeSet::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 已经创建过的嵌入个数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: usize) -> bool {
        self.entries.contains_key(&id)
    }

    /// 返回id对应的嵌入参数（不存在则创建），并把它标记为活跃
    pub fn get(&mut self, id: usize) -> SharedParameter {
        self.active.insert(id);
        self.entry(id)
    }

    fn entry(&mut self, id: usize) -> SharedParameter {
        if let Some(p) = self.entries.get(&id) {
            return p.clone();
        }
        let name = format!("{}[{}]", self.name, id);
        let p = Self::new_embedding(&name, self.dim, &mut self.rng).into_shared();
        self.entries.insert(id, p.clone());
        p
    }

    fn new_embedding<R: Rng + ?Sized>(name: &str, dim: usize, rng: &mut R) -> Parameter {
        Parameter::new_glorot(name, &[dim], rng)
    }

    /// 自上次更新以来被查询过的参数（梯度检验用）
    pub fn get_active_params(&self) -> Vec<SharedParameter> {
        self.active
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }

    /// 只更新活跃的嵌入，然后清空活跃集合
    pub fn update<R: Rng + ?Sized>(&mut self, rule: &UpdateRule, rng: &mut R) {
        for id in &self.active {
            if let Some(p) = self.entries.get(id) {
                p.borrow_mut().update(rule, rng);
            }
        }
        self.active.clear();
    }

    pub fn gradient_squared_norm(&self) -> f64 {
        self.get_active_params()
            .iter()
            .map(|p| p.borrow().gradient_squared_norm())
            .sum()
    }

    pub fn scale_gradient(&self, scale: f64) {
        for p in self.get_active_params() {
            p.borrow_mut().scale_gradient(scale);
        }
    }

    pub fn reset_gradient_history(&self) {
        for p in self.entries.values() {
            p.borrow_mut().reset_gradient_history();
        }
    }

    /// 平均要作用于所有曾经创建过的嵌入（一个嵌入即便本步未被更新，之前的更新仍需纳入平均）
    pub fn average(&mut self, t: f64) {
        for p in self.entries.values() {
            p.borrow_mut().average(t);
        }
    }

    /// 复制另一张表的全部嵌入（缺失的id会被创建）
    pub fn assign(&mut self, other: &LookupTable) {
        for (&id, p) in &other.entries {
            self.entry(id).borrow_mut().assign(&p.borrow());
        }
    }

    /// 不更新，只清空活跃集合
    pub fn clear_active(&mut self) {
        self.active.clear();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.active.clear();
    }

    pub fn export_model(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let snapshot = LookupTableSnapshot {
            name: self.name.clone(),
            dim: self.dim,
            entries: self
                .entries
                .iter()
                .map(|(&id, p)| (id, p.borrow().weights().clone()))
                .collect(),
        };
        let writer = BufWriter::new(File::create(path.as_ref())?);
        bincode::serialize_into(writer, &snapshot)
            .map_err(|e| GraphError::Io(format!("导出查找表`{}`失败: {}", self.name, e)))?;
        debug!("查找表`{}`已导出{}个嵌入", self.name, self.entries.len());
        Ok(())
    }

    /// 清空当前内容后从文件读入全部嵌入
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let snapshot: LookupTableSnapshot = bincode::deserialize_from(reader).map_err(|e| {
            GraphError::InvalidModelFile(format!("无法解析查找表`{}`: {}", self.name, e))
        })?;
        if snapshot.dim != self.dim {
            return Err(GraphError::ShapeMismatch {
                expected: vec![self.dim],
                got: vec![snapshot.dim],
                message: format!("查找表`{}`的嵌入维度不一致", self.name),
            });
        }
        self.clear();
        for (id, weights) in snapshot.entries {
            if weights.shape() != [self.dim].as_slice() {
                return Err(GraphError::InvalidModelFile(format!(
                    "查找表`{}`中id为{}的嵌入形状为{:?}",
                    self.name,
                    id,
                    weights.shape()
                )));
            }
            let name = format!("{}[{}]", self.name, id);
            self.entries
                .insert(id, Parameter::new(&name, weights).into_shared());
        }
        debug!("查找表`{}`已导入{}个嵌入", self.name, self.entries.len());
        Ok(())
    }
}
