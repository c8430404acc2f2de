//! # Only Tagger
//!
//! `only_tagger`用纯rust从零实现了一个反向模式的自动微分计算图，
//! 并在其上搭建了基于双向多层循环网络（RNN/GRU/LSTM，可选字符级子编码器）的多任务序列标注器。
//! 每个句子都会构建一张独立的计算图，前向、反向与参数更新完成后即被丢弃。
//!

pub mod encoder;
pub mod errors;
pub mod nn;
pub mod tagger;
pub mod tensor;
pub mod utils;
