pub mod error_body;
pub mod events;
pub mod service;
pub mod sizing;
