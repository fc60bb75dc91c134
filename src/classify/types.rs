use crate::classify::labels::variety_name;
use crate::utils::error::CaneError;
use crate::Result;
use serde::Serialize;
use std::fmt;

/// 参与分类的植株部位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlantPart {
    Bud,
    Stem,
}

impl PlantPart {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlantPart::Bud => "bud",
            PlantPart::Stem => "stem",
        }
    }

    /// multipart 表单字段名
    pub fn field_name(&self) -> &'static str {
        match self {
            PlantPart::Bud => "bud_image",
            PlantPart::Stem => "stem_image",
        }
    }

    /// 裁剪结果的存放子目录
    pub fn crop_dir(&self) -> &'static str {
        match self {
            PlantPart::Bud => "cropped_buds",
            PlantPart::Stem => "cropped_stems",
        }
    }
}

impl fmt::Display for PlantPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模型内部的类别下标（从0开始）
///
/// 所有分类器统一约定：显示编号 = 下标 + 1，再经品种表映射。
/// 这一约定来自模型作者，修改前需与其确认。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassId(usize);

impl ClassId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }

    pub fn display_id(&self) -> usize {
        self.0 + 1
    }

    pub fn variety(&self) -> &'static str {
        variety_name(self.display_id())
    }
}

/// 按类别下标排列的概率分布
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityDistribution(Vec<f64>);

impl ProbabilityDistribution {
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(CaneError::Inference(
                "empty probability distribution".to_string(),
            ));
        }
        if values.iter().any(|p| !p.is_finite()) {
            return Err(CaneError::Inference(format!(
                "non-finite probability in {:?}",
                values
            )));
        }
        Ok(Self(values))
    }

    pub fn from_f32(values: &[f32]) -> Result<Self> {
        Self::new(values.iter().map(|p| *p as f64).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    /// 最大概率的类别，并列时取下标最小者
    pub fn argmax(&self) -> ClassId {
        let mut best = 0;
        for (i, p) in self.0.iter().enumerate() {
            if *p > self.0[best] {
                best = i;
            }
        }
        ClassId(best)
    }

    pub fn prediction(&self) -> Prediction {
        let class = self.argmax();
        Prediction {
            class,
            confidence: self.0[class.index()] * 100.0,
        }
    }
}

/// 预测类别及其置信度（百分比）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class: ClassId,
    pub confidence: f64,
}

impl Prediction {
    pub fn variety(&self) -> &'static str {
        self.class.variety()
    }
}

/// `/predict/` 成功响应
#[derive(Debug, Clone, Serialize)]
pub struct VarietyResponse {
    pub variety: String,
    pub confidence: f64,
    pub cropped_bud_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cropped_stem_image: Option<String>,
}

/// 保留两位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_ids_are_shifted_by_one_for_display() {
        let class = ClassId::new(1);
        assert_eq!(class.display_id(), 2);
        assert_eq!(class.variety(), "SL 03 336");
        assert_eq!(ClassId::new(9).variety(), "Unknown Variety");
    }

    #[test]
    fn argmax_prefers_first_of_ties() {
        let dist = ProbabilityDistribution::new(vec![0.4, 0.4, 0.2]).unwrap();
        assert_eq!(dist.argmax().index(), 0);
    }

    #[test]
    fn prediction_reports_percentage() {
        let dist = ProbabilityDistribution::from_f32(&[0.1, 0.7, 0.1, 0.1]).unwrap();
        let prediction = dist.prediction();
        assert_eq!(prediction.class.index(), 1);
        assert!((prediction.confidence - 70.0).abs() < 1e-4);
        assert_eq!(prediction.variety(), "SL 03 336");
    }

    #[test]
    fn rejects_empty_and_non_finite() {
        assert!(ProbabilityDistribution::new(Vec::new()).is_err());
        assert!(ProbabilityDistribution::new(vec![0.5, f64::NAN]).is_err());
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(64.999999), 65.0);
        assert_eq!(round2(12.3456), 12.35);
        assert_eq!(round2(-1.234), -1.23);
    }

    #[test]
    fn stem_response_omitted_when_absent() {
        let response = VarietyResponse {
            variety: "Common".to_string(),
            confidence: 80.0,
            cropped_bud_image: "abc".to_string(),
            cropped_stem_image: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("cropped_stem_image").is_none());
        assert_eq!(json["variety"], "Common");
    }
}
