use crate::classify::fusion::{fuse, FusionWeights};
use crate::classify::stages::{classify, locate_region};
use crate::classify::types::{PlantPart, Prediction, ProbabilityDistribution};
use crate::config::InferenceConfig;
use crate::image::{FeatureExtractor, ImageTransforms};
use crate::models::{Classifier, Detector, ModelRegistry};
use crate::utils::error::CaneError;
use crate::utils::run_blocking;
use crate::Result;
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 单个部位的分析结果
#[derive(Debug, Clone)]
pub struct PartOutcome {
    pub part: PlantPart,
    pub crop: RgbImage,
    pub distribution: ProbabilityDistribution,
}

/// 一次品种识别的完整结果
#[derive(Debug, Clone)]
pub struct VarietyOutcome {
    pub prediction: Prediction,
    pub bud: PartOutcome,
    pub stem: Option<PartOutcome>,
}

/// 品种识别流水线：检测 -> 裁剪 -> 特征 -> 分类 -> 融合
///
/// 每次模型调用都在阻塞线程池中执行并受截止时间约束。
#[derive(Clone)]
pub struct ClassificationPipeline {
    models: Arc<ModelRegistry>,
    deadline: Duration,
    weights: FusionWeights,
}

impl ClassificationPipeline {
    pub fn new(models: Arc<ModelRegistry>, inference: &InferenceConfig) -> Self {
        Self {
            models,
            deadline: inference.model_deadline,
            weights: inference.fusion_weights,
        }
    }

    pub async fn run(
        &self,
        bud_image: RgbImage,
        stem_image: Option<RgbImage>,
    ) -> Result<VarietyOutcome> {
        let start = Instant::now();

        // 先确认茎模型可用，避免做无用功
        let stem_job = match stem_image {
            Some(image) => match self.models.stem() {
                Some(models) => Some((models, image)),
                None => {
                    return Err(CaneError::ModelUnavailable(
                        "stem models are not loaded".to_string(),
                    ))
                }
            },
            None => None,
        };

        let bud = self
            .analyze(
                PlantPart::Bud,
                self.models.bud_detector(),
                self.models.bud_classifier(),
                bud_image,
            )
            .await?;

        let (prediction, stem) = match stem_job {
            Some((models, image)) => {
                let stem = self
                    .analyze(PlantPart::Stem, models.detector, models.classifier, image)
                    .await?;
                let fused = fuse(&bud.distribution, &stem.distribution, self.weights)?;
                (fused.prediction(), Some(stem))
            }
            None => (bud.distribution.prediction(), None),
        };

        tracing::info!(
            "Classified as '{}' ({:.2}%) in {:?}, stem={}",
            prediction.variety(),
            prediction.confidence,
            start.elapsed(),
            stem.is_some()
        );

        Ok(VarietyOutcome {
            prediction,
            bud,
            stem,
        })
    }

    async fn analyze(
        &self,
        part: PlantPart,
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
        image: RgbImage,
    ) -> Result<PartOutcome> {
        let (detect_stage, classify_stage, model) = match part {
            PlantPart::Bud => ("bud detection", "bud classification", "bud classifier"),
            PlantPart::Stem => ("stem detection", "stem classification", "stem classifier"),
        };

        let detect_start = Instant::now();
        let (image, region) = run_blocking(detect_stage, self.deadline, move || {
            let region = locate_region(detector.as_ref(), &image)?;
            Ok((image, region))
        })
        .await?;
        tracing::debug!("{} took {:?}", detect_stage, detect_start.elapsed());

        let bbox = region.ok_or(CaneError::NotDetected(part))?;
        let crop = ImageTransforms::crop(&image, &bbox)?;
        tracing::debug!(
            "Cropped {} region {}x{} at ({}, {})",
            part,
            bbox.width(),
            bbox.height(),
            bbox.x1(),
            bbox.y1()
        );

        let classify_start = Instant::now();
        let (crop, distribution) = run_blocking(classify_stage, self.deadline, move || {
            let features = match part {
                PlantPart::Bud => FeatureExtractor::bud_features(&crop)?,
                PlantPart::Stem => FeatureExtractor::stem_features(&crop)?,
            };
            let distribution = classify(classifier.as_ref(), &features, model)?;
            Ok((crop, distribution))
        })
        .await?;
        tracing::debug!("{} took {:?}", classify_stage, classify_start.elapsed());

        Ok(PartOutcome {
            part,
            crop,
            distribution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{BUD_FEATURE_LEN, STEM_FEATURE_LEN};
    use crate::models::Detection;
    use image::Rgb;

    struct BoxAt(Option<Detection>);

    impl Detector for BoxAt {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self.0.into_iter().collect())
        }
    }

    struct Fixed {
        dim: usize,
        probabilities: Vec<f32>,
    }

    impl Classifier for Fixed {
        fn input_dim(&self) -> usize {
            self.dim
        }

        fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
            assert_eq!(features.len(), self.dim);
            Ok(self.probabilities.clone())
        }
    }

    struct Slow;

    impl Detector for Slow {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Vec::new())
        }
    }

    fn full_box() -> Option<Detection> {
        Some(Detection {
            x1: 4.0,
            y1: 4.0,
            x2: 36.0,
            y2: 28.0,
            score: 0.9,
            class_id: 0,
        })
    }

    fn photo() -> RgbImage {
        RgbImage::from_fn(48, 32, |x, y| Rgb([(x * 5) as u8, (y * 7) as u8, 90]))
    }

    fn inference(deadline: Duration) -> InferenceConfig {
        InferenceConfig {
            model_deadline: deadline,
            fusion_weights: FusionWeights::default(),
        }
    }

    fn bud_only(detection: Option<Detection>) -> ModelRegistry {
        ModelRegistry::builder(
            Arc::new(BoxAt(detection)),
            Arc::new(Fixed {
                dim: BUD_FEATURE_LEN,
                probabilities: vec![0.1, 0.7, 0.1, 0.1],
            }),
        )
        .build()
    }

    #[tokio::test]
    async fn bud_only_reports_bud_argmax() {
        let pipeline = ClassificationPipeline::new(
            Arc::new(bud_only(full_box())),
            &inference(Duration::from_secs(10)),
        );
        let outcome = pipeline.run(photo(), None).await.unwrap();
        assert_eq!(outcome.prediction.variety(), "SL 03 336");
        assert!((outcome.prediction.confidence - 70.0).abs() < 1e-4);
        assert_eq!(outcome.bud.crop.dimensions(), (32, 24));
        assert!(outcome.stem.is_none());
    }

    #[tokio::test]
    async fn bud_and_stem_are_fused() {
        let registry = ModelRegistry::builder(
            Arc::new(BoxAt(full_box())),
            Arc::new(Fixed {
                dim: BUD_FEATURE_LEN,
                probabilities: vec![0.1, 0.7, 0.1, 0.1],
            }),
        )
        .with_stem(
            Arc::new(BoxAt(full_box())),
            Arc::new(Fixed {
                dim: STEM_FEATURE_LEN,
                probabilities: vec![0.2, 0.6, 0.1, 0.1],
            }),
        )
        .build();
        let pipeline =
            ClassificationPipeline::new(Arc::new(registry), &inference(Duration::from_secs(10)));

        let outcome = pipeline.run(photo(), Some(photo())).await.unwrap();
        assert_eq!(outcome.prediction.class.index(), 1);
        assert!((outcome.prediction.confidence - 65.0).abs() < 1e-4);
        assert!(outcome.stem.is_some());
    }

    #[tokio::test]
    async fn missing_bud_is_not_detected() {
        let pipeline = ClassificationPipeline::new(
            Arc::new(bud_only(None)),
            &inference(Duration::from_secs(10)),
        );
        let err = pipeline.run(photo(), None).await.unwrap_err();
        assert_eq!(err.to_string(), "No bud detected in the image");
    }

    #[tokio::test]
    async fn stem_without_models_is_unavailable() {
        let pipeline = ClassificationPipeline::new(
            Arc::new(bud_only(full_box())),
            &inference(Duration::from_secs(10)),
        );
        let err = pipeline.run(photo(), Some(photo())).await.unwrap_err();
        assert!(matches!(err, CaneError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn slow_detector_times_out() {
        let registry = ModelRegistry::builder(
            Arc::new(Slow),
            Arc::new(Fixed {
                dim: BUD_FEATURE_LEN,
                probabilities: vec![1.0],
            }),
        )
        .build();
        let pipeline = ClassificationPipeline::new(
            Arc::new(registry),
            &inference(Duration::from_millis(50)),
        );
        let err = pipeline.run(photo(), None).await.unwrap_err();
        assert!(matches!(
            err,
            CaneError::Timeout {
                stage: "bud detection",
                ..
            }
        ));
    }
}
