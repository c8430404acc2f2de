/*
 * @Author       : 老董
 * @Date         : 2026-02-03
 * @Description  : 符号编码：词表（字符串 ↔ id）、词形切分器，以及把词id映射为切分片段id序列的序列编码器。
 *                 词表作为显式的上下文对象传给需要它的组件，不存在进程级的全局单例
 */

mod sequence_encoder;
mod tokenizer;
mod vocabulary;

pub use sequence_encoder::SequenceEncoder;
pub use tokenizer::Tokenizer;
pub use vocabulary::{SharedVocabulary, UNDEF, UNKNOWN, Vocabulary};
