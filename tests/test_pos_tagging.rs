/*
 * 词性标注集成测试（双任务：词性 + 是否句首）
 *
 * 语料由简单的模板生成：DET [ADJ] NOUN VERB [DET NOUN]
 * 网络结构：
 *   词嵌入 + 字符级LSTM ──→ 2层双向GRU ──→ 每个任务一个分类头 ──→ softmax
 *
 * 验收标准：
 *   1. 训练若干轮后，平均参数的副本在训练语料上的词性准确率达到90%以上
 *   2. 导出后重建的标注器给出完全相同的预测
 */

use std::collections::HashMap;
use std::fs;

use only_tagger::encoder::{SharedVocabulary, Tokenizer, Vocabulary};
use only_tagger::nn::{CellType, GraphError};
use only_tagger::tagger::{BiLstmTagger, NeuralNetParameters};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const DET: usize = 0;
const NOUN: usize = 1;
const VERB: usize = 2;
const ADJ: usize = 3;

const LEXICON: [(&str, usize); 16] = [
    ("the", DET),
    ("a", DET),
    ("every", DET),
    ("cat", NOUN),
    ("dog", NOUN),
    ("bird", NOUN),
    ("child", NOUN),
    ("sees", VERB),
    ("likes", VERB),
    ("chases", VERB),
    ("sleeps", VERB),
    ("small", ADJ),
    ("happy", ADJ),
    ("old", ADJ),
    ("table", NOUN),
    ("eats", VERB),
];

type Sentence = (Vec<usize>, Vec<Vec<usize>>);

fn words_of(tag: usize) -> Vec<&'static str> {
    LEXICON
        .iter()
        .filter(|(_, t)| *t == tag)
        .map(|(w, _)| *w)
        .collect()
}

fn generate_corpus(n: usize, seed: u64) -> (SharedVocabulary, Vec<Sentence>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut vocabulary = Vocabulary::new();
    let mut counts = HashMap::new();
    let mut corpus = Vec::with_capacity(n);

    for _ in 0..n {
        let mut tags = vec![DET];
        if rng.r#gen::<bool>() {
            tags.push(ADJ);
        }
        tags.extend([NOUN, VERB]);
        if rng.r#gen::<bool>() {
            tags.extend([DET, NOUN]);
        }

        let mut ids = Vec::with_capacity(tags.len());
        let mut targets = Vec::with_capacity(tags.len());
        for (i, &tag) in tags.iter().enumerate() {
            let word = words_of(tag).choose(&mut rng).copied().unwrap_or("the");
            let id = vocabulary.code(word);
            *counts.entry(id).or_insert(0) += 1;
            ids.push(id);
            targets.push(vec![tag, usize::from(i == 0)]);
        }
        corpus.push((ids, targets));
    }
    vocabulary.update_frequencies(&counts);
    (vocabulary.into_shared(), corpus)
}

fn accuracy(tagger: &mut BiLstmTagger, corpus: &[Sentence]) -> Result<f64, GraphError> {
    let (mut correct, mut total) = (0, 0);
    for (ids, targets) in corpus {
        let predictions = tagger.predict_one(ids)?;
        for (p, t) in predictions.iter().zip(targets) {
            correct += usize::from(p[0] == t[0]);
            total += 1;
        }
    }
    Ok(correct as f64 / total as f64)
}

#[test]
fn test_pos_tagging() -> Result<(), GraphError> {
    let _ = env_logger::builder().is_test(true).try_init();

    let (vocabulary, mut corpus) = generate_corpus(60, 2024);
    let mut params = NeuralNetParameters::default();
    params.rnn.cell_type = CellType::Gru;
    params.rnn.depth = 2;
    params.rnn.hidden_size = 16;
    params.topology.embedding_sizes = vec![8];
    params.rnn.crnn.tokenizer = Some(Tokenizer::Char);
    params.rnn.crnn.dim_char = 4;
    params.rnn.crnn.dim_char_based_embeddings = 8;
    params.gradient_clipping = true;
    params.seed = 5;

    let mut tagger = BiLstmTagger::new(vocabulary, &[4, 2], params)?;
    let mut shuffle_rng = StdRng::seed_from_u64(9);
    for epoch in 0..8 {
        corpus.shuffle(&mut shuffle_rng);
        for (ids, targets) in &corpus {
            tagger.train_one(ids, targets)?;
        }
        let mut averaged = tagger.copy()?;
        averaged.average_parameters();
        println!("第{epoch}轮：平均参数的准确率{:.3}", accuracy(&mut averaged, &corpus)?);
    }

    let mut averaged = tagger.copy()?;
    averaged.average_parameters();
    let acc = accuracy(&mut averaged, &corpus)?;
    assert!(acc >= 0.9, "准确率只有{acc:.3}");

    // 导出后重建
    let dir = std::env::temp_dir().join("only_tagger_test_pos_tagging");
    fs::remove_dir_all(&dir).ok();
    averaged.export_model(&dir)?;
    let mut loaded = BiLstmTagger::load(&dir)?;
    for (ids, _) in &corpus {
        assert_eq!(loaded.predict_one(ids)?, averaged.predict_one(ids)?);
    }
    fs::remove_dir_all(&dir).ok();
    Ok(())
}
