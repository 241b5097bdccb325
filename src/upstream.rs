use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::settings::{AgentSettings, AuthScheme};

pub const NO_RESPONSE: &str = "No response";

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{} {} - {body}", .status.as_u16(), .status.canonical_reason().unwrap_or(""))]
    Status { status: StatusCode, body: String },
    #[error("no thread id returned")]
    MissingThreadId,
    #[error("no last message returned")]
    MissingLastMessage,
    #[error("base url `{0}` cannot carry a path")]
    InvalidBaseUrl(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct ThreadMetadata<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateThreadRequest<'a> {
    metadata: ThreadMetadata<'a>,
    if_exists: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreateThreadResponse {
    #[serde(default)]
    thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct RunInput<'a> {
    messages: Vec<InputMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    assistant_id: &'a str,
    input: RunInput<'a>,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    last_message: Option<LastMessage>,
}

/// `last_message` as the remote API returns it: a bare string or a message object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum LastMessage {
    Text(String),
    Structured { content: Option<Value> },
    Other(Value),
}

impl From<Value> for LastMessage {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => LastMessage::Text(text),
            Value::Object(mut fields) => LastMessage::Structured { content: fields.remove("content") },
            other => LastMessage::Other(other),
        }
    }
}

impl LastMessage {
    /// Reply text, or `None` when the upstream sent an empty string.
    pub fn into_text(self) -> Option<String> {
        match self {
            LastMessage::Text(text) if text.is_empty() => None,
            LastMessage::Text(text) => Some(text),
            LastMessage::Structured { content } => Some(match content {
                Some(Value::String(text)) if !text.is_empty() => text,
                None | Some(Value::Null) | Some(Value::String(_)) => NO_RESPONSE.to_string(),
                Some(other) => other.to_string(),
            }),
            LastMessage::Other(value) => Some(value.to_string()),
        }
    }
}

/// Client for one agent on the remote agent-run API.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    settings: AgentSettings,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, settings: AgentSettings) -> Self {
        Self { http, settings }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub async fn create_thread(&self) -> Result<String, UpstreamError> {
        let url = self.endpoint(&["threads"])?;
        let body = CreateThreadRequest {
            metadata: ThreadMetadata { assistant_id: &self.settings.assistant_id },
            if_exists: "raise",
        };
        tracing::debug!(%url, "creating thread");
        let resp = self.authorized(self.http.post(url)).json(&body).send().await?;
        let parsed: CreateThreadResponse = Self::success_json(resp).await?;
        parsed
            .thread_id
            .filter(|id| !id.is_empty())
            .ok_or(UpstreamError::MissingThreadId)
    }

    /// Posts one user message to the thread and returns the agent's reply text.
    pub async fn run(&self, thread_id: &str, content: &str) -> Result<String, UpstreamError> {
        let mut segments = vec!["threads", thread_id];
        segments.extend_from_slice(self.settings.run_mode.path_segments());
        let url = self.endpoint(&segments)?;
        let body = RunRequest {
            assistant_id: &self.settings.assistant_id,
            input: RunInput { messages: vec![InputMessage { role: "user", content }] },
        };
        tracing::debug!(%url, "running agent");
        let resp = self.authorized(self.http.post(url)).json(&body).send().await?;
        let parsed: RunResponse = Self::success_json(resp).await?;
        parsed
            .last_message
            .and_then(LastMessage::into_text)
            .ok_or(UpstreamError::MissingLastMessage)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = self.settings.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| UpstreamError::InvalidBaseUrl(self.settings.base_url.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn authorized(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.settings.auth_scheme {
            AuthScheme::ApiKeyHeader => rb.header("X-API-Key", &self.settings.api_key),
            AuthScheme::Bearer => rb.bearer_auth(&self.settings.api_key),
        }
    }

    async fn success_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, UpstreamError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }
        Ok(resp.json().await?)
    }
}
