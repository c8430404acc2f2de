use std::fs;

use approx::assert_abs_diff_eq;

use super::{N_CLASSES, sentence, small_params, vocabulary};
use crate::assert_err;
use crate::nn::{CellType, GraphError};
use crate::tagger::BiLstmTagger;

fn trained_tagger(char_rnn: bool) -> Result<BiLstmTagger, GraphError> {
    let mut tagger = BiLstmTagger::new(
        vocabulary(),
        &N_CLASSES,
        small_params(CellType::Lstm, 3, char_rnn),
    )?;
    let (ids, targets) = sentence();
    for _ in 0..3 {
        tagger.train_one(&ids, &targets)?;
    }
    Ok(tagger)
}

/// 测试导出后用`load`重建的标注器与原标注器的输出一致（含字符级子编码器）
#[test]
fn test_export_and_load() -> Result<(), GraphError> {
    let dir = std::env::temp_dir().join("only_tagger_test_export_and_load");
    fs::remove_dir_all(&dir).ok();

    let mut tagger = trained_tagger(true)?;
    let (ids, targets) = sentence();
    let (expected_losses, expected_predictions) = tagger.eval_one(&ids, &targets)?;
    tagger.export_model(&dir)?;

    for file in [
        "model.json",
        "hyperparameters",
        "parameters.bin",
        "lu.bin",
        "vocabulary.txt",
        "rnn_parameters.bin",
        "char_rnn_parameters.bin",
        "lu_char_rnn.bin",
        "char_encoder.bin",
    ] {
        assert!(dir.join(file).exists(), "缺少{file}");
    }

    let mut loaded = BiLstmTagger::load(&dir)?;
    assert_eq!(loaded.n_classes(), tagger.n_classes());
    assert_eq!(loaded.hyperparameters(), tagger.hyperparameters());
    assert_eq!(loaded.step(), 0);
    assert_eq!(loaded.vocabulary().borrow().len(), tagger.vocabulary().borrow().len());
    assert_eq!(loaded.vocabulary().borrow().decode(6), Some("tapis"));
    // 导入后已经预计算了字符级表示
    assert!(
        loaded
            .feature_extractor()
            .char_rnn()
            .is_some_and(|c| c.has_precomputed())
    );

    let (losses, predictions) = loaded.eval_one(&ids, &targets)?;
    assert_eq!(predictions, expected_predictions);
    for (a, b) in losses.iter().zip(&expected_losses) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-10);
    }

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

/// 测试把导出的参数读入一个新建的同构标注器
#[test]
fn test_import_into_fresh_tagger() -> Result<(), GraphError> {
    let dir = std::env::temp_dir().join("only_tagger_test_import_into_fresh_tagger");
    fs::remove_dir_all(&dir).ok();

    let mut tagger = trained_tagger(false)?;
    let (ids, targets) = sentence();
    let (expected, _) = tagger.eval_one(&ids, &targets)?;
    tagger.export_model(&dir)?;

    let mut fresh = BiLstmTagger::new(
        vocabulary(),
        &N_CLASSES,
        small_params(CellType::Lstm, 3, false),
    )?;
    let (before, _) = fresh.eval_one(&ids, &targets)?;
    assert_ne!(before, expected);

    fresh.import_model(&dir)?;
    let (after, _) = fresh.eval_one(&ids, &targets)?;
    for (a, b) in after.iter().zip(&expected) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

/// 测试模型描述文件的内容
#[test]
fn test_descriptor() -> Result<(), GraphError> {
    let dir = std::env::temp_dir().join("only_tagger_test_descriptor");
    fs::remove_dir_all(&dir).ok();

    let tagger = trained_tagger(false)?;
    tagger.export_model(&dir)?;
    let descriptor = BiLstmTagger::read_descriptor(&dir)?;
    assert_eq!(descriptor, tagger.describe());
    assert_eq!(descriptor.n_classes, vec![3, 2]);
    assert!(descriptor.parameters.contains(&"task0.in.w0".to_string()));

    let hyperparameters = fs::read_to_string(dir.join("hyperparameters"))?;
    assert!(hyperparameters.contains("rnn depth\t3\n"));
    assert!(hyperparameters.contains("cell type\t2\n"));

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

/// 测试任务不一致或目录不存在时导入失败
#[test]
fn test_import_errors() -> Result<(), GraphError> {
    let dir = std::env::temp_dir().join("only_tagger_test_import_errors");
    fs::remove_dir_all(&dir).ok();

    let tagger = trained_tagger(false)?;
    tagger.export_model(&dir)?;

    let mut other = BiLstmTagger::new(vocabulary(), &[3], small_params(CellType::Lstm, 3, false))?;
    assert_err!(
        other.import_model(&dir),
        GraphError::InvalidModelFile(msg) if msg == "模型的任务[3, 2]与当前标注器的任务[3]不一致"
    );

    // 结构不同：参数个数对不上
    let mut shallow = BiLstmTagger::new(
        vocabulary(),
        &N_CLASSES,
        small_params(CellType::Lstm, 1, false),
    )?;
    assert_err!(shallow.import_model(&dir), GraphError::InvalidModelFile(_));

    fs::remove_dir_all(&dir).ok();
    assert_err!(BiLstmTagger::load(&dir), GraphError::Io(_));
    Ok(())
}
