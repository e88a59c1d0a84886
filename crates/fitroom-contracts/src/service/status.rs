use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Body of `GET {base_url}/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// Body of `GET {base_url}/ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub ready: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `GET {base_url}/models`; model order follows the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsStatus {
    pub ready: bool,
    #[serde(default)]
    pub models: IndexMap<String, ModelStatus>,
    #[serde(default)]
    pub model_version: Option<String>,
}

impl ModelsStatus {
    pub fn available(&self) -> Vec<&str> {
        self.models
            .iter()
            .filter(|(_, status)| status.ready)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
