pub mod classify;
pub mod config;
pub mod image;
pub mod media;
pub mod models;
pub mod production;
pub mod utils;
pub mod web;

// 重新导出主要类型
pub use classify::{ClassificationPipeline, FusionWeights, PlantPart, VarietyResponse};
pub use config::Config;
pub use production::{AgronomicInputs, SugarProduction, SugarProductionPredictor};
pub use utils::error::CaneError;

pub type Result<T> = std::result::Result<T, CaneError>;
