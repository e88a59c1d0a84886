mod status;
mod tryon;

pub use status::{HealthResponse, ModelStatus, ModelsStatus, ReadyResponse};
pub use tryon::{GarmentCategory, TryOnResponse};
