pub mod deadline;
pub mod error;

pub use deadline::run_blocking;
pub use error::CaneError;
