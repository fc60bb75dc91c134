pub mod classifier;
pub mod detector;
pub mod manager;
mod session;
pub mod traits;

pub use classifier::{OnnxClassifier, OnnxRegressor};
pub use detector::YoloDetector;
pub use manager::{ModelRegistry, ModelRegistryBuilder, ModelStats, StemModels};
pub use traits::{BoundingBox, Classifier, Detection, Detector, Regressor};
