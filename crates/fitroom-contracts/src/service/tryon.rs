use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GarmentCategory {
    #[default]
    #[serde(rename = "Upper-body")]
    UpperBody,
    #[serde(rename = "Lower-body")]
    LowerBody,
    #[serde(rename = "Dress")]
    Dress,
}

impl GarmentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            GarmentCategory::UpperBody => "Upper-body",
            GarmentCategory::LowerBody => "Lower-body",
            GarmentCategory::Dress => "Dress",
        }
    }
}

impl fmt::Display for GarmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GarmentCategory {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "upper-body" | "upper" => Ok(GarmentCategory::UpperBody),
            "lower-body" | "lower" => Ok(GarmentCategory::LowerBody),
            "dress" => Ok(GarmentCategory::Dress),
            _ => Err(format!("Unknown garment category '{}'.", raw.trim())),
        }
    }
}

/// Body returned by the try-on service once a composite is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryOnResponse {
    pub image_url: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub processing_time: Option<f64>,
}
