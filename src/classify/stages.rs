use crate::classify::types::ProbabilityDistribution;
use crate::image::{FeatureVector, ImageLoader};
use crate::models::{BoundingBox, Classifier, Detector};
use crate::utils::error::CaneError;
use crate::Result;
use image::RgbImage;

/// 定位目标区域：取检测器返回的第一个框
///
/// 空图像返回解码错误；检测器失败或输出异常时记录警告并视为未检测到。
pub fn locate_region(detector: &dyn Detector, image: &RgbImage) -> Result<Option<BoundingBox>> {
    ImageLoader::ensure_non_empty(image)?;

    let detections = match detector.detect(image) {
        Ok(detections) => detections,
        Err(e) => {
            tracing::warn!("Detector failed, treating as no detection: {}", e);
            return Ok(None);
        }
    };

    let Some(first) = detections.first() else {
        return Ok(None);
    };

    let bbox = BoundingBox::from_detection(first, image.width(), image.height());
    if bbox.is_none() {
        tracing::warn!("Degenerate detection box discarded: {:?}", first);
    }
    Ok(bbox)
}

/// 对特征向量分类，返回按类别下标排列的概率
pub fn classify(
    classifier: &dyn Classifier,
    features: &FeatureVector,
    model: &'static str,
) -> Result<ProbabilityDistribution> {
    if features.len() != classifier.input_dim() {
        return Err(CaneError::DimensionMismatch {
            model,
            expected: classifier.input_dim(),
            actual: features.len(),
        });
    }

    let probabilities = classifier.predict_proba(features.as_slice())?;
    if probabilities.is_empty() {
        return Err(CaneError::MalformedOutput(format!(
            "{} returned no probabilities",
            model
        )));
    }
    ProbabilityDistribution::from_f32(&probabilities)
}
