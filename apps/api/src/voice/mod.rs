//! Voice provider client — the single point of entry for all outbound-call
//! API traffic in Switchboard.
//!
//! ARCHITECTURAL RULE: no other module may call the voice provider directly.
//! Campaign code depends on the `VoiceProvider` trait so tests can swap in a
//! scripted fake; `VoiceClient` is the production implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// HTTP timeout for provider calls. Launch and status calls are quick; the
/// long-running part of a call happens on the provider's side.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Launch payload, serialized to the provider's wire names.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub phone_number: String,
    pub assistant_id: String,
    pub first_message: String,
    pub system_message: String,
}

#[derive(Debug, Deserialize)]
pub struct LaunchedCall {
    pub id: String,
}

/// Point-in-time status report for one call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusReport {
    pub status: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Post-call artifacts, retrievable only after the provider reports the call
/// completed. Every field is best-effort.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallArtifacts {
    #[serde(default)]
    pub transcript: Vec<ArtifactTurn>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub structured_outputs: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactTurn {
    pub role: String,
    pub message: String,
    #[serde(default)]
    pub time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: String,
}

/// The three provider operations the campaign core consumes.
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    async fn launch_call(&self, request: &LaunchRequest) -> Result<LaunchedCall, VoiceError>;

    async fn call_status(&self, call_id: &str) -> Result<CallStatusReport, VoiceError>;

    async fn call_artifacts(&self, call_id: &str) -> Result<CallArtifacts, VoiceError>;
}

/// Production provider client. Bearer-token auth against a configurable base
/// URL.
#[derive(Clone)]
pub struct VoiceClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl VoiceClient {
    pub fn new(base_url: String, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn parse_or_error<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, VoiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        // Providers return `{ "error": "..." }`; fall back to the raw body.
        let message = serde_json::from_str::<ProviderError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        Err(VoiceError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl VoiceProvider for VoiceClient {
    async fn launch_call(&self, request: &LaunchRequest) -> Result<LaunchedCall, VoiceError> {
        debug!("Launching call to {}", request.phone_number);
        let response = self
            .client
            .post(format!("{}/call", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        Self::parse_or_error(response).await
    }

    async fn call_status(&self, call_id: &str) -> Result<CallStatusReport, VoiceError> {
        let response = self
            .client
            .get(format!("{}/call/{call_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::parse_or_error(response).await
    }

    async fn call_artifacts(&self, call_id: &str) -> Result<CallArtifacts, VoiceError> {
        let response = self
            .client
            .get(format!("{}/call/{call_id}/artifacts", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::parse_or_error(response).await
    }
}
