/*
 * @Author       : 老董
 * @Date         : 2026-01-27
 * @Description  : 参数的二进制序列化（save_parameters/load_parameters）
 *
 * 职责：纯二进制序列化，只处理参数权重的读写，按参数的稳定名称匹配。
 * 文件格式（小端）：魔数"OTTG" | 版本u32 | 参数个数u32 |
 *                 每个参数：名称长度u32 + 名称 | 维数u32 + 各维u32 | f64数据
 */

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::nn::{GraphError, SharedParameter};
use crate::tensor::Tensor;

/// 参数文件魔数
const PARAMS_MAGIC: &[u8; 4] = b"OTTG";
/// 参数文件版本
const PARAMS_VERSION: u32 = 1;
/// 参数张量的最大维数
const MAX_SHAPE_DIMS: usize = 8;

/// 保存参数权重到二进制文件
pub fn save_parameters<P: AsRef<Path>>(
    params: &[SharedParameter],
    path: P,
) -> Result<(), GraphError> {
    let file = File::create(path.as_ref())
        .map_err(|e| GraphError::Io(format!("无法创建参数文件: {e}")))?;
    let mut writer = BufWriter::new(file);

    writer.write_all(PARAMS_MAGIC)?;
    writer.write_all(&PARAMS_VERSION.to_le_bytes())?;
    writer.write_all(&(params.len() as u32).to_le_bytes())?;

    for p in params {
        let p = p.borrow();
        let name_bytes = p.name().as_bytes();
        writer.write_all(&(name_bytes.len() as u32).to_le_bytes())?;
        writer.write_all(name_bytes)?;

        let shape = p.shape();
        writer.write_all(&(shape.len() as u32).to_le_bytes())?;
        for &dim in shape {
            writer.write_all(&(dim as u32).to_le_bytes())?;
        }
        for &val in p.weights().data_as_slice() {
            writer.write_all(&val.to_le_bytes())?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// 从二进制文件加载参数权重。文件中的参数集合必须与`params`完全一致（按名称）
pub fn load_parameters<P: AsRef<Path>>(
    params: &[SharedParameter],
    path: P,
) -> Result<(), GraphError> {
    let file = File::open(path.as_ref())
        .map_err(|e| GraphError::Io(format!("无法打开参数文件: {e}")))?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != PARAMS_MAGIC {
        return Err(GraphError::InvalidModelFile(
            "这不是 only_tagger 格式的参数文件".to_string(),
        ));
    }
    let version = read_u32(&mut reader)?;
    if version != PARAMS_VERSION {
        return Err(GraphError::InvalidModelFile(format!(
            "不支持的参数文件版本: {version}"
        )));
    }

    let by_name: HashMap<String, &SharedParameter> = params
        .iter()
        .map(|p| (p.borrow().name().to_string(), p))
        .collect();

    let param_count = read_u32(&mut reader)? as usize;
    if param_count != params.len() {
        return Err(GraphError::InvalidModelFile(format!(
            "参数个数不一致：文件中有{}个，模型中有{}个",
            param_count,
            params.len()
        )));
    }

    // 文件头中的长度都先与模型中的参数核对，再分配内存
    let max_name_len = by_name.keys().map(String::len).max().unwrap_or(0);
    for _ in 0..param_count {
        let name_len = read_u32(&mut reader)? as usize;
        if name_len > max_name_len {
            return Err(GraphError::InvalidModelFile(format!(
                "参数名称长度{name_len}超出了模型中最长的名称"
            )));
        }
        let mut name_bytes = vec![0u8; name_len];
        reader.read_exact(&mut name_bytes)?;
        let name = String::from_utf8(name_bytes)
            .map_err(|e| GraphError::InvalidModelFile(format!("名称编码无效: {e}")))?;
        let param = by_name.get(&name).ok_or_else(|| {
            GraphError::InvalidModelFile(format!("模型中不存在名为`{name}`的参数"))
        })?;

        let shape_dims = read_u32(&mut reader)? as usize;
        let expected = param.borrow().shape().to_vec();
        if shape_dims > MAX_SHAPE_DIMS {
            return Err(GraphError::InvalidModelFile(format!(
                "参数`{name}`的维数{shape_dims}无效"
            )));
        }
        let mut shape = Vec::with_capacity(shape_dims);
        for _ in 0..shape_dims {
            shape.push(read_u32(&mut reader)? as usize);
        }
        let data_len = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                GraphError::InvalidModelFile(format!("参数`{name}`的形状{shape:?}溢出"))
            })?;
        if shape != expected {
            return Err(GraphError::ShapeMismatch {
                expected,
                got: shape,
                message: format!("参数`{name}`的权重形状不一致"),
            });
        }

        let mut data = Vec::with_capacity(data_len);
        let mut val_bytes = [0u8; 8];
        for _ in 0..data_len {
            reader.read_exact(&mut val_bytes)?;
            data.push(f64::from_le_bytes(val_bytes));
        }
        param
            .borrow_mut()
            .set_weights(&Tensor::new(&data, &shape))?;
    }

    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, GraphError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}
