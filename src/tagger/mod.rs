/*
 * @Author       : 老董
 * @Date         : 2026-02-05
 * @Description  : 多任务序列标注器：双向多层循环网络特征提取（可选字符级子编码器）+ 每个任务一个分类头
 */

mod bilstm_tagger;
mod birnn;
mod char_birnn;
mod hyperparameters;

pub use bilstm_tagger::{BiLstmTagger, ModelDescriptor};
pub use birnn::BiRnnFeatureExtractor;
pub use char_birnn::CharBiRnnFeatureExtractor;
pub use hyperparameters::{CharRnnParameters, NetTopology, NeuralNetParameters, RnnParameters};

#[cfg(test)]
mod tests;
