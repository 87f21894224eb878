pub mod engine;
pub mod error;
pub mod legacy;
pub mod params;
pub mod progress;
pub mod record;
pub mod request;
pub mod seed;

pub use engine::{ComputeOptions, ComputeUnits, DiffusionEngine, EngineError, GenerationInput, ProgressCallback};
pub use error::{Error, Result, ValidationError};
pub use params::SamplingParams;
pub use progress::Progress;
pub use record::ImageRecord;
pub use request::{GenerationRequest, GenerationStatus, RequestId};
