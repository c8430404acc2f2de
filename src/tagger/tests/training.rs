use std::rc::Rc;

use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{N_CLASSES, sentence, small_params, vocabulary};
use crate::assert_err;
use crate::encoder::UNDEF;
use crate::nn::{CellType, Graph, GraphError, LookupTable};
use crate::tagger::{BiLstmTagger, BiRnnFeatureExtractor, NeuralNetParameters};

fn snapshot(tagger: &BiLstmTagger) -> Vec<Vec<f64>> {
    tagger
        .parameters()
        .iter()
        .map(|p| p.borrow().weights().data_as_slice().to_vec())
        .collect()
}

/// 测试一步训练后训练样本上的损失下降（2层LSTM，状态维度4，单词句子）
#[test]
fn test_one_step_decreases_loss() -> Result<(), GraphError> {
    let mut params = NeuralNetParameters::default();
    params.rnn.cell_type = CellType::Lstm;
    params.rnn.depth = 2;
    params.rnn.hidden_size = 4;
    params.seed = 7;
    let mut tagger = BiLstmTagger::new(vocabulary(), &[3], params)?;

    let ids = [5];
    let targets = [vec![2]];
    let (before, _) = tagger.eval_one(&ids, &targets)?;
    tagger.train_one(&ids, &targets)?;
    let (after, _) = tagger.eval_one(&ids, &targets)?;

    assert_eq!(tagger.step(), 1);
    assert!(after[0] < before[0], "训练前{}，训练后{}", before[0], after[0]);
    Ok(())
}

/// 测试多步训练后能记住一句话的标注
#[test]
fn test_fit_single_sentence() -> Result<(), GraphError> {
    let mut params = small_params(CellType::Gru, 2, true);
    params.learning_rate = 0.05;
    params.topology.size_hidden_layers = 8;
    let mut tagger = BiLstmTagger::new(vocabulary(), &N_CLASSES, params)?;
    let (ids, targets) = sentence();

    let (initial, _) = tagger.eval_one(&ids, &targets)?;
    for _ in 0..200 {
        tagger.train_one(&ids, &targets)?;
    }
    let (losses, predictions) = tagger.eval_one(&ids, &targets)?;

    assert_eq!(predictions, targets);
    assert_eq!(tagger.predict_one(&ids)?, targets);
    for (l, l0) in losses.iter().zip(&initial) {
        assert!(l < l0);
    }
    Ok(())
}

/// 测试学习率随步数衰减：lr0 / (1 + T·decrease_constant)
#[test]
fn test_learning_rate_decay() -> Result<(), GraphError> {
    let mut params = small_params(CellType::Rnn, 1, false);
    params.learning_rate = 0.1;
    params.decrease_constant = 0.5;
    let mut tagger = BiLstmTagger::new(vocabulary(), &N_CLASSES, params)?;
    assert_abs_diff_eq!(tagger.get_learning_rate(), 0.1);

    let (ids, targets) = sentence();
    tagger.train_one(&ids, &targets)?;
    tagger.train_one(&ids, &targets)?;
    assert_abs_diff_eq!(tagger.get_learning_rate(), 0.05);
    Ok(())
}

/// 测试平均是幂等的，且T=0时不改变参数
#[test]
fn test_average_parameters_idempotent() -> Result<(), GraphError> {
    let mut tagger = BiLstmTagger::new(
        vocabulary(),
        &N_CLASSES,
        small_params(CellType::Lstm, 3, true),
    )?;
    let (ids, targets) = sentence();

    // T = 0
    let (initial, _) = tagger.eval_one(&ids, &targets)?;
    tagger.average_parameters();
    let (unchanged, _) = tagger.eval_one(&ids, &targets)?;
    assert_eq!(initial, unchanged);

    for _ in 0..5 {
        tagger.train_one(&ids, &targets)?;
    }
    let trained = snapshot(&tagger);
    tagger.average_parameters();
    let averaged = snapshot(&tagger);
    assert_ne!(trained, averaged);

    tagger.average_parameters();
    assert_eq!(snapshot(&tagger), averaged);
    Ok(())
}

/// 测试副本与原标注器输出一致，且之后互不影响
#[test]
fn test_copy_is_independent() -> Result<(), GraphError> {
    let mut tagger = BiLstmTagger::new(
        vocabulary(),
        &N_CLASSES,
        small_params(CellType::Lstm, 2, true),
    )?;
    let (ids, targets) = sentence();
    for _ in 0..3 {
        tagger.train_one(&ids, &targets)?;
    }

    let mut copy = tagger.copy()?;
    assert_eq!(copy.step(), tagger.step());
    let (expected, _) = tagger.eval_one(&ids, &targets)?;
    let (got, _) = copy.eval_one(&ids, &targets)?;
    for (a, b) in expected.iter().zip(&got) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }

    tagger.train_one(&ids, &targets)?;
    let (after_copy, _) = copy.eval_one(&ids, &targets)?;
    assert_eq!(got, after_copy);
    Ok(())
}

/// 测试任务不同的标注器之间不能复制参数
#[test]
fn test_assign_parameters_task_mismatch() -> Result<(), GraphError> {
    let params = small_params(CellType::Rnn, 1, false);
    let mut a = BiLstmTagger::new(vocabulary(), &[3], params.clone())?;
    let b = BiLstmTagger::new(vocabulary(), &[3, 2], params)?;
    assert_err!(
        a.assign_parameters(&b),
        GraphError::InvalidOperation(msg) if msg == "两个标注器的任务不同：[3] vs [3, 2]"
    );
    Ok(())
}

/// 测试追加专家分类头后多出一个3分类任务
#[test]
fn test_add_expert_classifier() -> Result<(), GraphError> {
    let mut tagger = BiLstmTagger::new(vocabulary(), &[4], small_params(CellType::Gru, 2, false))?;
    let before = tagger.describe().parameters.len();
    tagger.add_expert_classifier();
    assert_eq!(tagger.n_classes(), &[4, 3]);
    assert_eq!(tagger.describe().parameters.len(), 2 * before);

    let ids = [2, 6];
    let targets = [vec![3, 2], vec![0, 1]];
    tagger.train_one(&ids, &targets)?;
    let predictions = tagger.predict_one(&ids)?;
    assert_eq!(predictions.len(), 2);
    assert!(predictions.iter().all(|p| p.len() == 2 && p[0] < 4 && p[1] < 3));
    Ok(())
}

/// 测试目标与句子、任务不匹配时报错
#[test]
fn test_target_validation() -> Result<(), GraphError> {
    let mut tagger = BiLstmTagger::new(
        vocabulary(),
        &N_CLASSES,
        small_params(CellType::Rnn, 1, false),
    )?;
    let (ids, _) = sentence();

    assert_err!(
        tagger.train_one(&ids, &[vec![0, 1]]),
        GraphError::InvalidOperation(msg) if msg == "句子有3个词，却给出了1个位置的目标"
    );
    assert_err!(
        tagger.eval_one(&ids, &[vec![0, 1], vec![0], vec![0, 1]]),
        GraphError::InvalidOperation(msg) if msg == "第1个位置需要2个任务的目标，得到1个"
    );
    assert_err!(
        tagger.train_one(&ids, &[vec![0, 1], vec![0, 1], vec![0, 2]]),
        GraphError::InvalidOperation(msg) if msg == "第2个位置任务1的目标类别2超出了类别数2"
    );
    // 校验失败不算一步
    assert_eq!(tagger.step(), 0);
    Ok(())
}

/// 测试空句子与非法构造参数
#[test]
fn test_invalid_inputs() -> Result<(), GraphError> {
    let mut tagger = BiLstmTagger::new(
        vocabulary(),
        &N_CLASSES,
        small_params(CellType::Rnn, 1, false),
    )?;
    assert_err!(
        tagger.predict_one(&[]),
        GraphError::InvalidOperation(msg) if msg == "不能为空句子构建计算图"
    );

    assert_err!(
        BiLstmTagger::new(vocabulary(), &[3, 0], small_params(CellType::Rnn, 1, false)),
        GraphError::Config(msg) if msg == "每个任务至少要有1个类别，得到[3, 0]"
    );

    let mut params = small_params(CellType::Rnn, 1, false);
    params.rnn.features = 2;
    assert_err!(
        BiLstmTagger::new(vocabulary(), &N_CLASSES, params),
        GraphError::Config(msg) if msg == "目前每个位置只支持1个词特征"
    );
    Ok(())
}

/// 测试训练时低频词会被替换为UNKNOWN，推理时则不会
#[test]
fn test_word_dropout_only_at_train_time() -> Result<(), GraphError> {
    let params = small_params(CellType::Rnn, 1, false);
    let mut rng = StdRng::seed_from_u64(3);
    let mut rnn = BiRnnFeatureExtractor::new(&params, vocabulary(), &mut rng);
    let mut lu = LookupTable::new("lu", params.word_embedding_size(), 5);

    let mut used_ids = |rnn: &mut BiRnnFeatureExtractor, ids: &[usize]| -> Result<Vec<String>, GraphError> {
        let mut graph = Graph::new();
        rnn.build(&mut graph, ids, &mut lu)?;
        let names = lu
            .get_active_params()
            .iter()
            .map(|p| p.borrow().name().to_string())
            .collect();
        lu.clear_active();
        Ok(names)
    };

    // "tapis"只出现过1次，训练时的丢弃概率约为0.46
    for _ in 0..50 {
        assert_eq!(used_ids(&mut rnn, &[6])?, vec!["lu[6]"]);
    }
    rnn.set_train_time(true);
    let mut dropped = 0;
    for _ in 0..50 {
        let names = used_ids(&mut rnn, &[6])?;
        assert_eq!(names.len(), 1);
        if names[0] == "lu[0]" {
            dropped += 1;
        }
    }
    assert!(dropped > 5 && dropped < 45, "丢弃了{dropped}次");

    // 高频词与保留id几乎不会被替换
    for _ in 0..50 {
        assert_eq!(used_ids(&mut rnn, &[5, UNDEF])?, vec!["lu[1]", "lu[5]"]);
    }
    Ok(())
}

/// 测试两个标注器可以共享同一个词表
#[test]
fn test_shared_vocabulary() -> Result<(), GraphError> {
    let voc = vocabulary();
    let a = BiLstmTagger::new(voc.clone(), &[2], small_params(CellType::Rnn, 1, false))?;
    let b = BiLstmTagger::new(voc.clone(), &[2], small_params(CellType::Gru, 1, true))?;
    assert!(Rc::ptr_eq(a.vocabulary(), b.vocabulary()));
    assert_eq!(a.vocabulary().borrow().code_unknown("chat"), 3);
    Ok(())
}
