mod save_load;
mod training;

use std::collections::HashMap;
use crate::encoder::{SharedVocabulary, Tokenizer, Vocabulary};
use crate::nn::CellType;
use crate::tagger::NeuralNetParameters;

/// 词表：le=2, chat=3, dort=4, sur=5, tapis=6, petit=7
pub(super) fn vocabulary() -> SharedVocabulary {
    let mut voc = Vocabulary::new();
    let mut counts = HashMap::new();
    for (word, count) in [
        ("le", 50),
        ("chat", 3),
        ("dort", 2),
        ("sur", 100_000),
        ("tapis", 1),
        ("petit", 4),
    ] {
        counts.insert(voc.code(word), count);
    }
    voc.update_frequencies(&counts);
    voc.into_shared()
}

/// 维度都很小的超参数，便于做梯度检验
pub(super) fn small_params(cell_type: CellType, depth: usize, char_rnn: bool) -> NeuralNetParameters {
    let mut p = NeuralNetParameters::default();
    p.topology.n_hidden_layers = 1;
    p.topology.size_hidden_layers = 3;
    p.topology.embedding_sizes = vec![3];
    p.rnn.cell_type = cell_type;
    p.rnn.depth = depth;
    p.rnn.hidden_size = 4;
    p.rnn.crnn.dim_char = 2;
    p.rnn.crnn.dim_char_based_embeddings = 3;
    p.rnn.crnn.tokenizer = char_rnn.then_some(Tokenizer::Char);
    p.seed = 1234;
    p
}

/// "le chat dort"，两个任务（3类和2类）
pub(super) fn sentence() -> (Vec<usize>, Vec<Vec<usize>>) {
    (vec![2, 3, 4], vec![vec![0, 1], vec![2, 0], vec![1, 1]])
}

pub(super) const N_CLASSES: [usize; 2] = [3, 2];
