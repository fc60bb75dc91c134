use crate::config::OnnxConfig;
use crate::image::{BUD_FEATURE_LEN, STEM_FEATURE_LEN};
use crate::models::{
    Classifier, Detector, OnnxClassifier, OnnxRegressor, Regressor, YoloDetector,
};
use crate::utils::error::CaneError;
use crate::{Config, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// 茎路径的一对模型，要么都有要么都没有
#[derive(Clone)]
pub struct StemModels {
    pub detector: Arc<dyn Detector>,
    pub classifier: Arc<dyn Classifier>,
}

/// 进程级模型注册表：启动时构建一次，之后只读
///
/// 通过 axum state 以 `Arc` 注入到处理器中，测试里可用替身模型构建。
pub struct ModelRegistry {
    bud_detector: Arc<dyn Detector>,
    bud_classifier: Arc<dyn Classifier>,
    stem: Option<StemModels>,
    sugar_regressor: Option<Arc<dyn Regressor>>,
    runtime: Option<OnnxConfig>,
}

impl ModelRegistry {
    /// 从模型目录加载全部ONNX模型
    pub fn load(config: &Config) -> Result<Self> {
        tracing::info!("Initializing model registry...");
        let onnx = &config.onnx_config;

        // 芽模型是必需的
        let bud_detector: Arc<dyn Detector> = Arc::new(YoloDetector::new(
            "bud detector",
            &config.bud_detector_path(),
            onnx,
        )?);
        let bud_classifier: Arc<dyn Classifier> = Arc::new(OnnxClassifier::new(
            "bud classifier",
            &config.bud_classifier_path(),
            BUD_FEATURE_LEN,
            onnx,
        )?);

        // 茎模型和产糖量模型是可选的
        let stem = Self::load_optional(
            "Stem models",
            &[config.stem_detector_path(), config.stem_classifier_path()],
            || {
                Ok(StemModels {
                    detector: Arc::new(YoloDetector::new(
                        "stem detector",
                        &config.stem_detector_path(),
                        onnx,
                    )?),
                    classifier: Arc::new(OnnxClassifier::new(
                        "stem classifier",
                        &config.stem_classifier_path(),
                        STEM_FEATURE_LEN,
                        onnx,
                    )?),
                })
            },
        );

        let sugar_regressor = Self::load_optional(
            "Sugar production model",
            &[config.production_regressor_path()],
            || {
                let regressor: Arc<dyn Regressor> = Arc::new(OnnxRegressor::new(
                    "sugar production regressor",
                    &config.production_regressor_path(),
                    onnx,
                )?);
                Ok(regressor)
            },
        );

        let registry = Self {
            bud_detector,
            bud_classifier,
            stem,
            sugar_regressor,
            runtime: Some(onnx.clone()),
        };
        registry.health_check()?;

        tracing::info!("Model registry initialized successfully");
        Ok(registry)
    }

    fn load_optional<T>(
        what: &str,
        paths: &[PathBuf],
        load: impl FnOnce() -> Result<T>,
    ) -> Option<T> {
        if let Some(missing) = paths.iter().find(|p| !p.exists()) {
            tracing::info!("{} not found ({}), skipping", what, missing.display());
            return None;
        }
        match load() {
            Ok(models) => {
                tracing::info!("{} loaded successfully", what);
                Some(models)
            }
            Err(e) => {
                tracing::warn!("Failed to load {}: {}", what.to_lowercase(), e);
                None
            }
        }
    }

    /// 使用任意实现构建注册表
    pub fn builder(
        bud_detector: Arc<dyn Detector>,
        bud_classifier: Arc<dyn Classifier>,
    ) -> ModelRegistryBuilder {
        ModelRegistryBuilder {
            registry: Self {
                bud_detector,
                bud_classifier,
                stem: None,
                sugar_regressor: None,
                runtime: None,
            },
        }
    }

    /// 获取芽检测器引用
    pub fn bud_detector(&self) -> Arc<dyn Detector> {
        Arc::clone(&self.bud_detector)
    }

    /// 获取芽分类器引用
    pub fn bud_classifier(&self) -> Arc<dyn Classifier> {
        Arc::clone(&self.bud_classifier)
    }

    /// 获取茎模型（如果可用）
    pub fn stem(&self) -> Option<StemModels> {
        self.stem.clone()
    }

    /// 获取产糖量回归模型（如果可用）
    pub fn sugar_regressor(&self) -> Option<Arc<dyn Regressor>> {
        self.sugar_regressor.as_ref().map(Arc::clone)
    }

    /// 检查分类器维度与特征提取器是否一致
    pub fn health_check(&self) -> Result<()> {
        tracing::debug!("Performing model health check...");

        let expected = [
            ("bud classifier", Some(&self.bud_classifier), BUD_FEATURE_LEN),
            (
                "stem classifier",
                self.stem.as_ref().map(|s| &s.classifier),
                STEM_FEATURE_LEN,
            ),
        ];
        for (model, classifier, features) in expected {
            if let Some(classifier) = classifier {
                if classifier.input_dim() != features {
                    return Err(CaneError::DimensionMismatch {
                        model,
                        expected: classifier.input_dim(),
                        actual: features,
                    });
                }
            }
        }

        tracing::debug!("Model health check passed");
        Ok(())
    }

    /// 获取模型统计信息
    pub fn stats(&self) -> ModelStats {
        ModelStats {
            has_bud_models: true,
            has_stem_models: self.stem.is_some(),
            has_sugar_regressor: self.sugar_regressor.is_some(),
            bud_feature_len: BUD_FEATURE_LEN,
            stem_feature_len: STEM_FEATURE_LEN,
            intra_threads: self.runtime.as_ref().map(|r| r.intra_threads),
            optimization_level: self.runtime.as_ref().map(|r| r.optimization_level),
        }
    }
}

pub struct ModelRegistryBuilder {
    registry: ModelRegistry,
}

impl ModelRegistryBuilder {
    pub fn with_stem(mut self, detector: Arc<dyn Detector>, classifier: Arc<dyn Classifier>) -> Self {
        self.registry.stem = Some(StemModels {
            detector,
            classifier,
        });
        self
    }

    pub fn with_sugar_regressor(mut self, regressor: Arc<dyn Regressor>) -> Self {
        self.registry.sugar_regressor = Some(regressor);
        self
    }

    pub fn build(self) -> ModelRegistry {
        self.registry
    }
}

/// 模型统计信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub has_bud_models: bool,
    pub has_stem_models: bool,
    pub has_sugar_regressor: bool,
    pub bud_feature_len: usize,
    pub stem_feature_len: usize,
    pub intra_threads: Option<usize>,
    pub optimization_level: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Detection;
    use image::RgbImage;

    struct NoDetections;

    impl Detector for NoDetections {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    struct Uniform(usize);

    impl Classifier for Uniform {
        fn input_dim(&self) -> usize {
            self.0
        }

        fn predict_proba(&self, _features: &[f32]) -> Result<Vec<f32>> {
            Ok(vec![0.25; 4])
        }
    }

    struct Constant;

    impl Regressor for Constant {
        fn predict(&self, _inputs: [f32; 3]) -> Result<f32> {
            Ok(1.0)
        }
    }

    #[test]
    fn builder_wires_optional_models() {
        let registry = ModelRegistry::builder(Arc::new(NoDetections), Arc::new(Uniform(BUD_FEATURE_LEN)))
            .with_stem(Arc::new(NoDetections), Arc::new(Uniform(STEM_FEATURE_LEN)))
            .with_sugar_regressor(Arc::new(Constant))
            .build();
        registry.health_check().unwrap();

        let stats = registry.stats();
        assert!(stats.has_stem_models);
        assert!(stats.has_sugar_regressor);
        assert_eq!(stats.intra_threads, None);
    }

    #[test]
    fn health_check_flags_dimension_mismatch() {
        let registry =
            ModelRegistry::builder(Arc::new(NoDetections), Arc::new(Uniform(BUD_FEATURE_LEN)))
                .with_stem(Arc::new(NoDetections), Arc::new(Uniform(10)))
                .build();
        assert!(matches!(
            registry.health_check(),
            Err(CaneError::DimensionMismatch {
                model: "stem classifier",
                ..
            })
        ));
    }

    #[test]
    fn missing_required_models_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(
            "127.0.0.1:0".to_string(),
            dir.path().display().to_string(),
            dir.path().join("media").display().to_string(),
            Some(1),
            false,
        )
        .unwrap();
        assert!(matches!(
            ModelRegistry::load(&config),
            Err(CaneError::ModelLoad(_))
        ));
    }
}
