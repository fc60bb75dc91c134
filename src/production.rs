use crate::classify::round2;
use crate::models::Regressor;
use crate::utils::error::CaneError;
use crate::utils::run_blocking;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// 产量单位，固定为吨
pub const PRODUCTION_UNIT: &str = "tons";

/// 三个农艺测量值，顺序即回归模型的输入顺序
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgronomicInputs {
    pub sunshine: f64,
    pub soil_temp: f64,
    pub temp_max: f64,
}

impl AgronomicInputs {
    pub fn to_features(&self) -> [f32; 3] {
        [
            self.sunshine as f32,
            self.soil_temp as f32,
            self.temp_max as f32,
        ]
    }
}

/// `/predict-sugar-production/` 请求体
///
/// 字段保留原始JSON值：既接受数字，也接受数字字符串。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SugarProductionRequest {
    pub sunshine: Option<Value>,
    pub soil_temp: Option<Value>,
    pub temp_max: Option<Value>,
}

impl SugarProductionRequest {
    pub fn parse(&self) -> Result<AgronomicInputs> {
        Ok(AgronomicInputs {
            sunshine: parse_field("sunshine", self.sunshine.as_ref())?,
            soil_temp: parse_field("soil_temp", self.soil_temp.as_ref())?,
            temp_max: parse_field("temp_max", self.temp_max.as_ref())?,
        })
    }
}

fn parse_field(field: &'static str, value: Option<&Value>) -> Result<f64> {
    let value = match value {
        None | Some(Value::Null) => {
            return Err(CaneError::MissingField(format!(
                "Missing required field: {}",
                field
            )))
        }
        Some(value) => value,
    };

    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(CaneError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}

/// 产糖量预测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SugarProduction {
    pub predicted_sugar_production: f64,
    pub unit: &'static str,
}

/// 产糖量预测器
#[derive(Clone)]
pub struct SugarProductionPredictor {
    regressor: Arc<dyn Regressor>,
    deadline: Duration,
}

impl SugarProductionPredictor {
    pub fn new(regressor: Arc<dyn Regressor>, deadline: Duration) -> Self {
        Self {
            regressor,
            deadline,
        }
    }

    pub async fn predict(&self, inputs: AgronomicInputs) -> Result<SugarProduction> {
        let regressor = Arc::clone(&self.regressor);
        let features = inputs.to_features();
        let raw = run_blocking("sugar production regression", self.deadline, move || {
            regressor.predict(features)
        })
        .await?;

        if !raw.is_finite() {
            return Err(CaneError::Inference(format!(
                "regressor returned non-finite value {}",
                raw
            )));
        }

        tracing::debug!("Sugar production for {:?}: {}", inputs, raw);
        Ok(SugarProduction {
            predicted_sugar_production: round2(raw as f64),
            unit: PRODUCTION_UNIT,
        })
    }
}
