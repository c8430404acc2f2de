/*
 * @Author       : 老董
 * @Date         : 2026-02-07
 * @Description  : 多任务序列标注器。每个任务一个分类头：
 *                 组合层（输入为特征提取器在该位置的输出）→ ReLU →（仿射 → ReLU）* → 仿射 → softmax，
 *                 没有隐藏层时为 组合层 → softmax。
 *                 每句话构建一张新的计算图；训练一步 = 前向 + 反向 + 更新全部参数
 */

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{BiRnnFeatureExtractor, NeuralNetParameters};
use crate::encoder::{SharedVocabulary, Vocabulary};
use crate::nn::serialization::{load_parameters, save_parameters};
use crate::nn::{
    Activation, Graph, GraphError, Layer, Linear, LookupTable, NodeId, SharedParameter,
    UpdateRule,
};
use crate::tensor::Tensor;

const DESCRIPTOR_VERSION: &str = "1.0";
const DESCRIPTOR_FILE: &str = "model.json";
const HYPERPARAMETERS_FILE: &str = "hyperparameters";
const PARAMETERS_FILE: &str = "parameters.bin";
const LOOKUP_FILE: &str = "lu.bin";
const VOCABULARY_FILE: &str = "vocabulary.txt";
/// 专家分类器的类别数
const EXPERT_CLASSES: usize = 3;

/// 导出模型时写入`model.json`的描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub version: String,
    pub n_classes: Vec<usize>,
    pub hyperparameters: NeuralNetParameters,
    /// 分类头参数的名称（按保存顺序）
    pub parameters: Vec<String>,
}

/// 一个任务的分类头
#[derive(Debug)]
struct TaskHead {
    input: Rc<Linear>,
    layers: Vec<Rc<Layer>>,
}

impl TaskHead {
    fn new<R: Rng + ?Sized>(
        task: usize,
        input_sizes: &[usize],
        n_hidden: usize,
        hidden_size: usize,
        n_classes: usize,
        rng: &mut R,
    ) -> Self {
        let relu = || Rc::new(Layer::Activation(Activation::ReLU));
        let first_output = if n_hidden > 0 { hidden_size } else { n_classes };
        let input = Rc::new(Linear::new(
            &format!("task{task}.in"),
            input_sizes,
            first_output,
            rng,
        ));

        let mut layers = Vec::new();
        if n_hidden > 0 {
            layers.push(relu());
            for l in 1..n_hidden {
                let affine = Linear::new(&format!("task{task}.h{l}"), &[hidden_size], hidden_size, rng);
                layers.push(Rc::new(Layer::Affine(affine)));
                layers.push(relu());
            }
            let out = Linear::new(&format!("task{task}.out"), &[hidden_size], n_classes, rng);
            layers.push(Rc::new(Layer::Affine(out)));
        }
        layers.push(Rc::new(Layer::Activation(Activation::Softmax)));
        Self { input, layers }
    }

    /// 返回softmax节点
    fn build(&self, graph: &mut Graph, inputs: &[NodeId]) -> Result<NodeId, GraphError> {
        let mut node = graph.composite(&self.input, inputs)?;
        for layer in &self.layers {
            node = graph.simple(layer, node)?;
        }
        Ok(node)
    }

    fn parameters(&self) -> Vec<SharedParameter> {
        let mut params = self.input.parameters();
        params.extend(self.layers.iter().flat_map(|l| l.parameters()));
        params
    }
}

#[derive(Debug)]
pub struct BiLstmTagger {
    params: NeuralNetParameters,
    n_classes: Vec<usize>,
    vocabulary: SharedVocabulary,
    lu: LookupTable,
    rnn: BiRnnFeatureExtractor,
    heads: Vec<TaskHead>,
    /// 已完成的更新步数T
    step: usize,
    /// 参数初始化与梯度噪声
    rng: StdRng,
    /// 最近一次前向传播的图，以及每个位置、每个任务的softmax节点
    graph: Graph,
    outputs: Vec<Vec<NodeId>>,
}

impl BiLstmTagger {
    pub fn new(
        vocabulary: SharedVocabulary,
        n_classes: &[usize],
        params: NeuralNetParameters,
    ) -> Result<Self, GraphError> {
        params.validate()?;
        if n_classes.iter().any(|&n| n == 0) {
            return Err(GraphError::Config(format!(
                "每个任务至少要有1个类别，得到{n_classes:?}"
            )));
        }
        let mut rng = StdRng::seed_from_u64(params.seed);
        let lu = LookupTable::new("lu", params.word_embedding_size(), rng.r#gen());
        let rnn = BiRnnFeatureExtractor::new(&params, vocabulary.clone(), &mut rng);

        let mut tagger = Self {
            params,
            n_classes: Vec::new(),
            vocabulary,
            lu,
            rnn,
            heads: Vec::new(),
            step: 0,
            rng,
            graph: Graph::new(),
            outputs: Vec::new(),
        };
        for &n in n_classes {
            tagger.add_head(n);
        }
        debug!(
            "标注器已创建：{}个任务，{}个分类头参数",
            tagger.n_classes.len(),
            tagger.head_parameters().len()
        );
        Ok(tagger)
    }

    fn add_head(&mut self, n_classes: usize) {
        let topology = &self.params.topology;
        let head = TaskHead::new(
            self.heads.len(),
            &self.rnn.output_sizes(),
            topology.n_hidden_layers,
            topology.size_hidden_layers,
            n_classes,
            &mut self.rng,
        );
        self.heads.push(head);
        self.n_classes.push(n_classes);
    }

    /// 追加一个3分类的专家分类头
    pub fn add_expert_classifier(&mut self) {
        self.add_head(EXPERT_CLASSES);
    }

    pub fn n_classes(&self) -> &[usize] {
        &self.n_classes
    }

    pub fn hyperparameters(&self) -> &NeuralNetParameters {
        &self.params
    }

    pub fn vocabulary(&self) -> &SharedVocabulary {
        &self.vocabulary
    }

    /// 已完成的更新步数T
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn feature_extractor(&self) -> &BiRnnFeatureExtractor {
        &self.rnn
    }

    /// lr0 / (1 + T·decrease_constant)
    pub fn get_learning_rate(&self) -> f64 {
        self.params.learning_rate / (1.0 + self.step as f64 * self.params.decrease_constant)
    }

    /*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓训练与推理↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
    /// 一步训练：前向、反向、以学习率lr(T)和步数T更新全部参数，然后T加1
    pub fn train_one(&mut self, ids: &[usize], targets: &[Vec<usize>]) -> Result<(), GraphError> {
        self.rnn.set_train_time(true);
        self.fprop(ids)?;
        self.bprop(targets)?;
        let rule = self.params.update_rule(self.get_learning_rate(), self.step);
        self.update(&rule);
        self.step += 1;
        Ok(())
    }

    /// 每个位置、每个任务的预测类别
    pub fn predict_one(&mut self, ids: &[usize]) -> Result<Vec<Vec<usize>>, GraphError> {
        self.rnn.set_train_time(false);
        self.fprop(ids)?;
        self.predictions()
    }

    /// 只做前向：返回每个任务在整句上的负对数似然之和，以及预测类别
    pub fn eval_one(
        &mut self,
        ids: &[usize],
        targets: &[Vec<usize>],
    ) -> Result<(Vec<f64>, Vec<Vec<usize>>), GraphError> {
        self.rnn.set_train_time(false);
        self.fprop(ids)?;
        Ok((self.losses(targets)?, self.predictions()?))
    }

    /// 为整句构建新图并前向传播
    pub fn fprop(&mut self, ids: &[usize]) -> Result<(), GraphError> {
        let mut graph = Graph::new();
        let features = self.rnn.build(&mut graph, ids, &mut self.lu)?;
        let mut outputs = Vec::with_capacity(features.len());
        for inputs in &features {
            let mut nodes = Vec::with_capacity(self.heads.len());
            for head in &self.heads {
                nodes.push(head.build(&mut graph, inputs)?);
            }
            outputs.push(nodes);
        }
        graph.forward()?;
        self.outputs = outputs;
        self.graph = graph;
        Ok(())
    }

    /// 给每个softmax节点设置目标类别后沿前向调度的逆序反向传播
    pub fn bprop(&mut self, targets: &[Vec<usize>]) -> Result<(), GraphError> {
        self.check_targets(targets)?;
        for (nodes, position_targets) in self.outputs.iter().zip(targets) {
            for (&node, &target) in nodes.iter().zip(position_targets) {
                self.graph.set_target(node, target)?;
            }
        }
        self.graph.backward()
    }

    pub fn update(&mut self, rule: &UpdateRule) {
        for p in self.head_parameters() {
            p.borrow_mut().update(rule, &mut self.rng);
        }
        self.rnn.update(rule, &mut self.rng);
        self.lu.update(rule, &mut self.rng);
    }

    fn check_targets(&self, targets: &[Vec<usize>]) -> Result<(), GraphError> {
        if targets.len() != self.outputs.len() {
            return Err(GraphError::InvalidOperation(format!(
                "句子有{}个词，却给出了{}个位置的目标",
                self.outputs.len(),
                targets.len()
            )));
        }
        for (i, position_targets) in targets.iter().enumerate() {
            if position_targets.len() != self.n_classes.len() {
                return Err(GraphError::InvalidOperation(format!(
                    "第{}个位置需要{}个任务的目标，得到{}个",
                    i,
                    self.n_classes.len(),
                    position_targets.len()
                )));
            }
            for (t, (&target, &n)) in position_targets.iter().zip(&self.n_classes).enumerate() {
                if target >= n {
                    return Err(GraphError::InvalidOperation(format!(
                        "第{i}个位置任务{t}的目标类别{target}超出了类别数{n}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn losses(&self, targets: &[Vec<usize>]) -> Result<Vec<f64>, GraphError> {
        self.check_targets(targets)?;
        let mut losses = vec![0.0; self.n_classes.len()];
        for (nodes, position_targets) in self.outputs.iter().zip(targets) {
            for (t, (&node, &target)) in nodes.iter().zip(position_targets).enumerate() {
                losses[t] -= self.graph.value(node)?.get(target).ln();
            }
        }
        Ok(losses)
    }

    fn predictions(&self) -> Result<Vec<Vec<usize>>, GraphError> {
        self.outputs
            .iter()
            .map(|nodes| {
                nodes
                    .iter()
                    .map(|&node| self.graph.value(node).map(Tensor::argmax))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }
    /*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑训练与推理↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

    /*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓参数管理↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
    fn head_parameters(&self) -> Vec<SharedParameter> {
        self.heads.iter().flat_map(TaskHead::parameters).collect()
    }

    /// 全部可训练参数：分类头、循环层、字符级子编码器（含活跃的字符嵌入），以及活跃的词嵌入
    pub fn parameters(&self) -> Vec<SharedParameter> {
        let mut params = self.head_parameters();
        params.extend(self.rnn.get_parameters());
        params.extend(self.lu.get_active_params());
        params
    }

    pub fn gradient_squared_norm(&self) -> f64 {
        let heads: f64 = self
            .head_parameters()
            .iter()
            .map(|p| p.borrow().gradient_squared_norm())
            .sum();
        heads + self.rnn.gradient_squared_norm() + self.lu.gradient_squared_norm()
    }

    pub fn scale_gradient(&self, scale: f64) {
        for p in self.head_parameters() {
            p.borrow_mut().scale_gradient(scale);
        }
        self.rnn.scale_gradient(scale);
        self.lu.scale_gradient(scale);
    }

    pub fn reset_gradient_history(&self) {
        for p in self.head_parameters() {
            p.borrow_mut().reset_gradient_history();
        }
        self.rnn.reset_gradient_history();
        self.lu.reset_gradient_history();
    }

    /// 从结构相同的另一个标注器复制全部参数（含词嵌入与字符级子编码器）
    pub fn assign_parameters(&mut self, other: &BiLstmTagger) -> Result<(), GraphError> {
        if self.n_classes != other.n_classes {
            return Err(GraphError::InvalidOperation(format!(
                "两个标注器的任务不同：{:?} vs {:?}",
                self.n_classes, other.n_classes
            )));
        }
        for (p, q) in self.head_parameters().iter().zip(other.head_parameters()) {
            p.borrow_mut().assign(&q.borrow());
        }
        self.rnn.assign(&other.rnn);
        self.lu.assign(&other.lu);
        Ok(())
    }

    /// 结构相同、参数相等的副本（常用于平均后评估），之后两者互不影响
    pub fn copy(&self) -> Result<Self, GraphError> {
        let mut copy = Self::new(self.vocabulary.clone(), &self.n_classes, self.params.clone())?;
        copy.step = self.step;
        copy.assign_parameters(self)?;
        Ok(copy)
    }

    /// 以当前步数T对全部参数做隐式平均。平均后再次调用不会改变参数
    pub fn average_parameters(&mut self) {
        let t = self.step as f64;
        self.lu.average(t);
        self.rnn.average(t);
        for p in self.head_parameters() {
            p.borrow_mut().average(t);
        }
        info!("已用T={}平均全部参数", self.step);
    }

    /// 对已知词预计算字符级表示（推理加速）
    pub fn precompute_char_lstm(&mut self) -> Result<(), GraphError> {
        self.rnn.precompute_char_lstm()
    }
    /*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑参数管理↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

    /*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓模型导入导出↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
    pub fn describe(&self) -> ModelDescriptor {
        ModelDescriptor {
            version: DESCRIPTOR_VERSION.to_string(),
            n_classes: self.n_classes.clone(),
            hyperparameters: self.params.clone(),
            parameters: self
                .head_parameters()
                .iter()
                .map(|p| p.borrow().name().to_string())
                .collect(),
        }
    }

    /// 导出到目录`dir`（不存在则创建）
    pub fn export_model(&self, dir: impl AsRef<Path>) -> Result<(), GraphError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        self.vocabulary.borrow().export_model(dir.join(VOCABULARY_FILE))?;
        self.lu.export_model(dir.join(LOOKUP_FILE))?;
        self.rnn.export_model(dir)?;
        save_parameters(&self.head_parameters(), dir.join(PARAMETERS_FILE))?;

        let mut os = BufWriter::new(File::create(dir.join(HYPERPARAMETERS_FILE))?);
        self.params.print(&mut os)?;
        os.flush()?;

        let json = serde_json::to_string_pretty(&self.describe())
            .map_err(|e| GraphError::Io(format!("序列化模型描述失败: {e}")))?;
        fs::write(dir.join(DESCRIPTOR_FILE), json)?;

        info!("模型已导出到{}", dir.display());
        Ok(())
    }

    /// 读入`model.json`
    pub fn read_descriptor(dir: impl AsRef<Path>) -> Result<ModelDescriptor, GraphError> {
        let json = fs::read_to_string(dir.as_ref().join(DESCRIPTOR_FILE))?;
        serde_json::from_str(&json)
            .map_err(|e| GraphError::InvalidModelFile(format!("解析模型描述失败: {e}")))
    }

    /// 把导出的参数读入结构相同的标注器，步数归零，然后预计算字符级表示
    pub fn import_model(&mut self, dir: impl AsRef<Path>) -> Result<(), GraphError> {
        let dir = dir.as_ref();
        let descriptor = Self::read_descriptor(dir)?;
        if descriptor.n_classes != self.n_classes {
            return Err(GraphError::InvalidModelFile(format!(
                "模型的任务{:?}与当前标注器的任务{:?}不一致",
                descriptor.n_classes, self.n_classes
            )));
        }

        self.lu.load(dir.join(LOOKUP_FILE))?;
        self.rnn.load_parameters(dir)?;
        load_parameters(&self.head_parameters(), dir.join(PARAMETERS_FILE))?;
        self.step = 0;

        self.precompute_char_lstm()?;
        info!("已从{}导入模型", dir.display());
        Ok(())
    }

    /// 只凭导出目录重建标注器：词表、超参数与任务都从目录中读取
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, GraphError> {
        let dir = dir.as_ref();
        let descriptor = Self::read_descriptor(dir)?;
        let vocabulary = Vocabulary::import_model(dir.join(VOCABULARY_FILE))?.into_shared();
        let mut tagger = Self::new(vocabulary, &descriptor.n_classes, descriptor.hyperparameters)?;
        tagger.import_model(dir)?;
        Ok(tagger)
    }
    /*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑模型导入导出↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

    /// 用中心差分检查全部参数（含本句活跃的嵌入）的解析梯度，返回两者之差的最大绝对值。
    /// 检查期间不做词dropout，也不用字符级缓存，结束后梯度被清空
    pub fn gradient_check(
        &mut self,
        ids: &[usize],
        targets: &[Vec<usize>],
        epsilon: f64,
    ) -> Result<f64, GraphError> {
        self.rnn.set_train_time(false);
        self.rnn.set_char_cache(false);
        let result = self.max_gradient_error(ids, targets, epsilon);
        self.rnn.set_char_cache(true);
        result
    }

    fn max_gradient_error(
        &mut self,
        ids: &[usize],
        targets: &[Vec<usize>],
        epsilon: f64,
    ) -> Result<f64, GraphError> {
        self.fprop(ids)?;
        let params = self.parameters();
        for p in &params {
            p.borrow_mut().clear_grad();
        }
        self.bprop(targets)?;
        let analytic: Vec<_> = params.iter().map(|p| p.borrow().grad().clone()).collect();

        let mut max_diff: f64 = 0.0;
        for (p, grad) in params.iter().zip(&analytic) {
            let size = p.borrow().size();
            for k in 0..size {
                p.borrow_mut().add_epsilon(k, epsilon);
                let plus = self.total_loss(ids, targets)?;
                p.borrow_mut().add_epsilon(k, -2.0 * epsilon);
                let minus = self.total_loss(ids, targets)?;
                p.borrow_mut().add_epsilon(k, epsilon);

                let numeric = (plus - minus) / (2.0 * epsilon);
                max_diff = max_diff.max((grad.get(k) - numeric).abs());
            }
        }
        for p in &params {
            p.borrow_mut().clear_grad();
        }
        debug!("梯度检验：{}个参数，最大误差{:e}", params.len(), max_diff);
        Ok(max_diff)
    }

    fn total_loss(&mut self, ids: &[usize], targets: &[Vec<usize>]) -> Result<f64, GraphError> {
        self.fprop(ids)?;
        Ok(self.losses(targets)?.iter().sum())
    }
}
