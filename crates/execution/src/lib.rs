use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::protocol::ExecutionResult;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_EXECUTION_URL: &str = "https://emkc.org/api/v2/piston/execute";
pub const WILDCARD_VERSION: &str = "*";

const RUNTIME_VERSIONS: &[(&str, &str)] = &[
    ("javascript", "18.15.0"),
    ("python", "3.10.0"),
    ("java", "15.0.2"),
    ("cpp", "10.2.0"),
];

/// Runtime version sent to the execution service for `language`.
pub fn runtime_version(language: &str) -> &'static str {
    RUNTIME_VERSIONS
        .iter()
        .find(|(name, _)| *name == language)
        .map(|(_, version)| *version)
        .unwrap_or(WILDCARD_VERSION)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: String,
    pub version_hint: Option<String>,
}

#[derive(Debug, Serialize)]
struct SourceFile<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ServiceRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: Vec<SourceFile<'a>>,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    message: String,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("malformed execution response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Runs `request`. Failures come back as a synthetic [`ExecutionResult`].
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult;
}

#[derive(Debug, Clone)]
pub struct PistonConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for PistonConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_EXECUTION_URL.to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Clone)]
pub struct PistonExecutor {
    http: reqwest::Client,
    endpoint: String,
}

impl PistonExecutor {
    pub fn new(config: PistonConfig) -> Result<Self, ExecutionError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn try_execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutionError> {
        let version = runtime_version(&request.language);
        let body = ServiceRequest {
            language: &request.language,
            version,
            files: vec![SourceFile {
                content: &request.code,
            }],
        };
        debug!(
            language = %request.language,
            version,
            version_hint = request.version_hint.as_deref().unwrap_or(""),
            "execution: dispatching request"
        );

        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ServiceErrorBody>(&bytes)
                .map(|body| body.message)
                .unwrap_or_else(|_| format!("Request failed with status code {}", status.as_u16()));
            return Err(ExecutionError::Status { status, message });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl CodeExecutor for PistonExecutor {
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        match self.try_execute(&request).await {
            Ok(result) => result,
            Err(error) => {
                warn!(language = %request.language, %error, "execution: service call failed");
                ExecutionResult::failure(error.to_string())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
