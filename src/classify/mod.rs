pub mod fusion;
pub mod labels;
pub mod pipeline;
pub mod stages;
pub mod types;

pub use fusion::{fuse, FusionWeights};
pub use labels::{variety_name, UNKNOWN_VARIETY};
pub use pipeline::{ClassificationPipeline, PartOutcome, VarietyOutcome};
pub use types::{round2, ClassId, PlantPart, Prediction, ProbabilityDistribution, VarietyResponse};
