use crate::config::OnnxConfig;
use crate::models::session::{feature_dim, load_session};
use crate::models::traits::{Classifier, Regressor};
use crate::utils::error::CaneError;
use crate::Result;
use ndarray::{Array2, ArrayD};
use ort::{inputs, session::Session, value::Tensor};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// sklearn 概率分类器（skl2onnx 导出，zipmap=False）
pub struct OnnxClassifier {
    session: Arc<Mutex<Session>>,
    kind: &'static str,
    input_name: String,
    output_name: String, // 概率输出
    input_dim: usize,
}

impl OnnxClassifier {
    /// `fallback_dim` 仅在模型输入维度为动态时使用
    pub fn new(
        kind: &'static str,
        model_path: &Path,
        fallback_dim: usize,
        onnx_config: &OnnxConfig,
    ) -> Result<Self> {
        let loaded = load_session(kind, model_path, onnx_config)?;
        let input_dim = match loaded.input_shape.as_deref().and_then(feature_dim) {
            Some(dim) => dim,
            None => {
                tracing::warn!(
                    "{} input dimension is dynamic, assuming {} features",
                    kind,
                    fallback_dim
                );
                fallback_dim
            }
        };

        // skl2onnx 的输出为 label 与 probabilities，优先按名称匹配
        let output_name = loaded
            .output_names
            .iter()
            .find(|name| name.to_lowercase().contains("prob"))
            .or_else(|| loaded.output_names.last())
            .cloned()
            .ok_or_else(|| CaneError::ModelLoad(format!("{} model has no outputs", kind)))?;
        tracing::info!("{} probability output: '{}'", kind, output_name);

        Ok(Self {
            session: Arc::new(Mutex::new(loaded.session)),
            kind,
            input_name: loaded.input_name,
            output_name,
            input_dim,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        let input = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| CaneError::Inference(format!("{} input: {}", self.kind, e)))?;
        let probabilities = run_single(
            &self.session,
            self.kind,
            &self.input_name,
            &self.output_name,
            input,
        )?;
        first_row(self.kind, &probabilities)
    }
}

const REGRESSOR_INPUTS: usize = 3;

/// sklearn 回归模型（输入 [1, 3]）
pub struct OnnxRegressor {
    session: Arc<Mutex<Session>>,
    kind: &'static str,
    input_name: String,
    output_name: String,
}

impl OnnxRegressor {
    pub fn new(kind: &'static str, model_path: &Path, onnx_config: &OnnxConfig) -> Result<Self> {
        let loaded = load_session(kind, model_path, onnx_config)?;
        if let Some(dim) = loaded.input_shape.as_deref().and_then(feature_dim) {
            if dim != REGRESSOR_INPUTS {
                return Err(CaneError::DimensionMismatch {
                    model: kind,
                    expected: dim,
                    actual: REGRESSOR_INPUTS,
                });
            }
        }
        let output_name = loaded.output_names[0].clone();
        tracing::info!("{} model output: '{}'", kind, output_name);

        Ok(Self {
            session: Arc::new(Mutex::new(loaded.session)),
            kind,
            input_name: loaded.input_name,
            output_name,
        })
    }
}

impl Regressor for OnnxRegressor {
    fn predict(&self, inputs: [f32; 3]) -> Result<f32> {
        let input = Array2::from_shape_vec((1, REGRESSOR_INPUTS), inputs.to_vec())
            .map_err(|e| CaneError::Inference(format!("{} input: {}", self.kind, e)))?;
        let prediction = run_single(
            &self.session,
            self.kind,
            &self.input_name,
            &self.output_name,
            input,
        )?;
        prediction.iter().next().copied().ok_or_else(|| {
            CaneError::MalformedOutput(format!("{} returned an empty tensor", self.kind))
        })
    }
}

/// 单样本推理，立即拷出输出避免生命周期冲突
fn run_single(
    session: &Mutex<Session>,
    kind: &str,
    input_name: &str,
    output_name: &str,
    input: Array2<f32>,
) -> Result<ArrayD<f32>> {
    let input_tensor = Tensor::from_array(input)?;
    let mut session = session.lock();
    let outputs = session.run(inputs![input_name => input_tensor])?;

    let prediction = match outputs.get(output_name) {
        Some(output) => output.try_extract_array::<f32>()?.into_owned(),
        None => {
            let available_outputs: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
            return Err(CaneError::MalformedOutput(format!(
                "{} output '{}' not found. Available outputs: {:?}",
                kind, output_name, available_outputs
            )));
        }
    };
    Ok(prediction)
}

/// 取 batch 中第一行概率
fn first_row(kind: &str, probabilities: &ArrayD<f32>) -> Result<Vec<f32>> {
    match probabilities.shape() {
        [1, classes] if *classes > 0 => Ok(probabilities.iter().copied().collect()),
        [classes] if *classes > 0 => Ok(probabilities.iter().copied().collect()),
        shape => Err(CaneError::MalformedOutput(format!(
            "{} expected probabilities of shape [1, C], got {:?}",
            kind, shape
        ))),
    }
}
