use crate::config::OnnxConfig;
use crate::utils::error::CaneError;
use crate::Result;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::ValueType;
use std::path::Path;

/// 已加载的会话及其动态发现的输入输出名称
pub(crate) struct LoadedSession {
    pub session: Session,
    pub input_name: String,
    /// 第一个输入的张量形状，动态维度保留为 -1
    pub input_shape: Option<Vec<i64>>,
    pub output_names: Vec<String>,
}

/// 从输入形状 `[batch, features]` 中读取特征维度
///
/// 最后一维为动态（-1 或 0）或形状为空时返回 None。
pub(crate) fn feature_dim(shape: &[i64]) -> Option<usize> {
    match shape.last() {
        Some(&dim) if dim > 0 => Some(dim as usize),
        _ => None,
    }
}

fn optimization_level(level: i32) -> GraphOptimizationLevel {
    match level {
        i32::MIN..=0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

/// 加载ONNX模型并发现输入输出名称
pub(crate) fn load_session(
    kind: &str,
    model_path: &Path,
    onnx_config: &OnnxConfig,
) -> Result<LoadedSession> {
    if !model_path.exists() {
        return Err(CaneError::ModelLoad(format!(
            "{} model not found: {}",
            kind,
            model_path.display()
        )));
    }

    tracing::info!("Loading {} model from: {}", kind, model_path.display());

    let session = Session::builder()?
        .with_optimization_level(optimization_level(onnx_config.optimization_level))?
        .with_intra_threads(onnx_config.intra_threads)?
        .commit_from_file(model_path)?;

    let (input_name, input_shape) = match session.inputs.first() {
        Some(input) => {
            let shape = match &input.input_type {
                ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect::<Vec<i64>>()),
                _ => None,
            };
            (input.name.clone(), shape)
        }
        None => {
            return Err(CaneError::ModelLoad(format!("{} model has no inputs", kind)));
        }
    };

    if session.outputs.is_empty() {
        return Err(CaneError::ModelLoad(format!("{} model has no outputs", kind)));
    }

    // 记录所有可用输出用于调试
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
    for (i, name) in output_names.iter().enumerate() {
        tracing::debug!("{} output[{}]: '{}'", kind, i, name);
    }
    tracing::info!("{} model input: '{}' {:?}", kind, input_name, input_shape);

    Ok(LoadedSession {
        session,
        input_name,
        input_shape,
        output_names,
    })
}
