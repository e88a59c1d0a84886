pub mod blob;
pub mod config;
pub mod error;
pub mod generator;
pub mod prediction;
pub mod predictor;
pub mod task;
pub mod tryon;

pub use blob::{BlobInfo, BlobRef, BlobStore, WeakBlob};
pub use config::ApiConfig;
pub use error::{ConfigError, ServiceFailure, ValidationRejection};
pub use generator::{
    Cancellation, HttpTryOnGenerator, StubGenerator, TryOnGenerator, TryOnJob, TryOnPipeline,
};
pub use prediction::{
    FieldRetention, FormField, PredictionFlow, PredictionForm, SubmitOutcome, ViewState,
};
pub use predictor::{HttpPredictor, Predictor};
pub use tryon::{AdvanceOutcome, ImageSlot, TryOnSession, TryOnStep, TryOnView};
