use anyhow::{bail, Context, Result};
use fitroom_contracts::error_body::{failure_message, REQUEST_FAILED_MESSAGE};
use fitroom_contracts::service::{HealthResponse, ModelsStatus, ReadyResponse};
use fitroom_contracts::sizing::{PredictionRequest, PredictionResult};
use reqwest::blocking::Client as HttpClient;
use serde::de::DeserializeOwned;

use crate::config::ApiConfig;
use crate::error::ServiceFailure;

/// Remote size classifier, consumed only through its request/response contract.
pub trait Predictor: Send + Sync {
    fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, ServiceFailure>;
}

#[derive(Debug, Clone)]
pub struct HttpPredictor {
    config: ApiConfig,
    http: HttpClient,
}

impl HttpPredictor {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout())
            .build()
            .context("failed building predictor HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn health(&self) -> Result<HealthResponse> {
        self.get_json("health")
    }

    pub fn ready(&self) -> Result<ReadyResponse> {
        self.get_json("ready")
    }

    pub fn models(&self) -> Result<ModelsStatus> {
        self.get_json("models")
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let endpoint = self.config.endpoint(path);
        let response = self
            .http
            .get(&endpoint)
            .send()
            .with_context(|| format!("predictor request failed ({endpoint})"))?;
        let status = response.status();
        let body = response
            .text()
            .with_context(|| format!("predictor response body read failed ({endpoint})"))?;
        if !status.is_success() {
            bail!(
                "predictor request failed ({}): {}",
                status.as_u16(),
                failure_message(&body, REQUEST_FAILED_MESSAGE)
            );
        }
        serde_json::from_str(&body)
            .with_context(|| format!("predictor returned invalid JSON payload ({endpoint})"))
    }
}

impl Predictor for HttpPredictor {
    fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult, ServiceFailure> {
        let response = self
            .http
            .post(self.config.endpoint("predict"))
            .json(request)
            .send()
            .map_err(|err| ServiceFailure::transport(&err))?;
        let status = response.status();
        let code = status.as_u16();
        let body = response
            .text()
            .map_err(|err| ServiceFailure::transport(&err))?;
        if !status.is_success() {
            return Err(ServiceFailure::Request {
                status: code,
                message: failure_message(&body, REQUEST_FAILED_MESSAGE),
            });
        }
        serde_json::from_str(&body).map_err(|_| ServiceFailure::Request {
            status: code,
            message: REQUEST_FAILED_MESSAGE.to_string(),
        })
    }
}
