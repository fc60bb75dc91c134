pub mod descriptors;
pub mod loader;
pub mod preprocessing;
pub mod transforms;

pub use loader::ImageLoader;
pub use preprocessing::{FeatureExtractor, FeatureVector, BUD_FEATURE_LEN, STEM_FEATURE_LEN};
pub use transforms::ImageTransforms;
