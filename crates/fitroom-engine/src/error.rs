use std::error::Error as StdError;

use fitroom_contracts::error_body::SERVER_ERROR_MESSAGE;

use crate::prediction::FormField;
use crate::tryon::ImageSlot;

const MAX_TRANSPORT_MESSAGE_CHARS: usize = 512;
const CANCELLED_MESSAGE: &str = "Request cancelled.";

/// Input that blocks the triggering action. Never changes flow state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationRejection {
    #[error("Please enter height, weight, and age.")]
    MissingFields { missing: Vec<FormField> },
    #[error("Please enter valid positive numbers.")]
    NonPositive { fields: Vec<FormField> },
    #[error("Please choose a supported model.")]
    UnknownModel { raw: String },
    #[error("Please upload both user and product images.")]
    MissingImages { missing: Vec<ImageSlot> },
}

/// A remote call that did not produce a usable result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceFailure {
    /// The service answered with a non-success status or an unusable body.
    #[error("{message}")]
    Request { status: u16, message: String },
    /// No response arrived.
    #[error("{message}")]
    Transport { message: String },
    /// The caller abandoned the call or released its inputs.
    #[error("Request cancelled.")]
    Cancelled,
}

impl ServiceFailure {
    pub fn message(&self) -> &str {
        match self {
            ServiceFailure::Request { message, .. } | ServiceFailure::Transport { message } => {
                message
            }
            ServiceFailure::Cancelled => CANCELLED_MESSAGE,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceFailure::Request { status, .. } => Some(*status),
            ServiceFailure::Transport { .. } | ServiceFailure::Cancelled => None,
        }
    }

    pub fn transport(err: &(dyn StdError + 'static)) -> Self {
        let text = error_chain_text(err);
        ServiceFailure::Transport {
            message: if text.is_empty() {
                SERVER_ERROR_MESSAGE.to_string()
            } else {
                text
            },
        }
    }

    /// The worker carrying the call went away without reporting.
    pub fn lost() -> Self {
        ServiceFailure::Transport {
            message: SERVER_ERROR_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {key} is not set")]
    MissingEnv { key: String },
    #[error("base URL is empty")]
    MissingBaseUrl,
    #[error("invalid base URL '{value}': {reason}")]
    InvalidBaseUrl { value: String, reason: String },
}

fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    truncate_text(&parts.join(" | caused by: "), MAX_TRANSPORT_MESSAGE_CHARS)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
