//! Client for the remote HRV analysis service (token + analyze endpoints).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TOKEN_URL: &str =
    "https://kubioscloud.auth.eu-west-1.amazoncognito.com/oauth2/token";
pub const DEFAULT_ANALYSIS_URL: &str = "https://analysis.kubioscloud.com/v2/analytics/analyze";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned HTTP {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("analysis rejected with status '{0}'")]
    Rejected(String),
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
}

/// Opaque bearer credential. The value is kept out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Continuous outputs of a readiness analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisScores {
    pub sns_index: f64,
    pub pns_index: f64,
}

/// Remote analyzer as seen by the analysis session.
pub trait Analyzer {
    /// Exchange client credentials for a bearer token.
    fn fetch_token(&self) -> Result<AccessToken, CloudError>;
    /// Submit RR intervals (milliseconds) for a readiness analysis.
    fn analyze(&self, token: &AccessToken, rr_ms: &[u32]) -> Result<AnalysisScores, CloudError>;
}

/// Endpoints and credentials for [`KubiosClient`].
#[derive(Clone)]
pub struct CloudSettings {
    pub token_url: String,
    pub analysis_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.into(),
            analysis_url: DEFAULT_ANALYSIS_URL.into(),
            client_id: String::new(),
            client_secret: String::new(),
            api_key: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a [u32],
    analysis: AnalysisKind,
}

#[derive(Debug, Serialize)]
struct AnalysisKind {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    status: String,
    #[serde(default)]
    analysis: Option<AnalysisScores>,
}

/// Blocking HTTP client built on `ureq`.
pub struct KubiosClient {
    settings: CloudSettings,
    agent: ureq::Agent,
}

impl KubiosClient {
    pub fn new(settings: CloudSettings) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(settings.timeout).build();
        Self { settings, agent }
    }

    fn basic_auth(&self) -> String {
        let pair = format!("{}:{}", self.settings.client_id, self.settings.client_secret);
        format!("Basic {}", STANDARD.encode(pair))
    }
}

impl Analyzer for KubiosClient {
    fn fetch_token(&self) -> Result<AccessToken, CloudError> {
        if self.settings.client_id.is_empty() {
            return Err(CloudError::MissingCredential("client_id"));
        }
        if self.settings.client_secret.is_empty() {
            return Err(CloudError::MissingCredential("client_secret"));
        }
        let response = self
            .agent
            .post(&self.settings.token_url)
            .set("Authorization", &self.basic_auth())
            .send_form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.settings.client_id.as_str()),
            ])
            .map_err(map_ureq_error)?;
        let body: TokenResponse = response
            .into_json()
            .map_err(|e| CloudError::InvalidResponse(e.to_string()))?;
        Ok(AccessToken::new(body.access_token))
    }

    fn analyze(&self, token: &AccessToken, rr_ms: &[u32]) -> Result<AnalysisScores, CloudError> {
        let request = AnalyzeRequest {
            kind: "RRI",
            data: rr_ms,
            analysis: AnalysisKind { kind: "readiness" },
        };
        let response = self
            .agent
            .post(&self.settings.analysis_url)
            .set("Authorization", &format!("Bearer {}", token.as_str()))
            .set("X-Api-Key", &self.settings.api_key)
            .send_json(&request)
            .map_err(map_ureq_error)?;
        let body: AnalyzeResponse = response
            .into_json()
            .map_err(|e| CloudError::InvalidResponse(e.to_string()))?;
        if body.status != "ok" {
            return Err(CloudError::Rejected(body.status));
        }
        body.analysis
            .ok_or_else(|| CloudError::InvalidResponse("missing 'analysis' object".into()))
    }
}

fn map_ureq_error(err: ureq::Error) -> CloudError {
    match err {
        ureq::Error::Status(code, _) => CloudError::Status(code),
        ureq::Error::Transport(t) => CloudError::Transport(t.to_string()),
    }
}
