mod panel;
mod request;
mod response;

pub use panel::{format_confidence, AlternativeRow, ResultPanel};
pub use request::{ModelType, PredictionRequest};
pub use response::{Alternative, PredictionResult};
