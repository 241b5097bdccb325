use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use crate::conversation::Message;
use crate::server::CreateThreadResponse;
use crate::settings::AgentKey;
use crate::upstream::{UpstreamClient, UpstreamError};

pub const CREATE_FAILED: &str = "Failed to create new thread";
pub const SEND_FAILED: &str = "Failed to send message";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The relay (or the remote API in direct mode) answered with a failure status.
    /// `message` already starts with the failed operation.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
    #[error("{operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation}: {message}")]
    Failed { operation: &'static str, message: String },
}

/// Prefixes `detail` with `operation` unless the relay already did.
fn with_operation(operation: &str, detail: String) -> String {
    if detail.starts_with(operation) { detail } else { format!("{operation}: {detail}") }
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One agent as seen from a conversation panel.
#[async_trait]
pub trait AgentApi: Send + Sync {
    /// Whether the credentials this API needs are present.
    fn is_ready(&self) -> bool {
        true
    }

    async fn create_conversation(&self) -> Result<String, ClientError>;

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message, ClientError>;
}

/// Talks to the relay server; credentials stay on the server.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    relay: Url,
    agent: AgentKey,
}

impl RelayClient {
    pub fn new(http: reqwest::Client, relay: Url, agent: AgentKey) -> Self {
        Self { http, relay, agent }
    }

    fn endpoint(&self, operation: &'static str, tail: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.relay.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| ClientError::Failed {
                operation,
                message: format!("relay url `{}` cannot carry a path", self.relay),
            })?;
            path.pop_if_empty().extend(["agents", self.agent.as_str(), "threads"]).extend(tail);
        }
        Ok(url)
    }

    async fn rejection(operation: &'static str, resp: reqwest::Response) -> ClientError {
        let status = resp.status();
        let detail = resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| status.to_string());
        ClientError::Rejected { status, message: with_operation(operation, detail) }
    }
}

#[async_trait]
impl AgentApi for RelayClient {
    async fn create_conversation(&self) -> Result<String, ClientError> {
        let url = self.endpoint(CREATE_FAILED, &[])?;
        let transport = |source| ClientError::Transport { operation: CREATE_FAILED, source };
        let resp = self.http.post(url).send().await.map_err(transport)?;
        if !resp.status().is_success() {
            return Err(Self::rejection(CREATE_FAILED, resp).await);
        }
        let body: CreateThreadResponse = resp.json().await.map_err(transport)?;
        Ok(body.thread_id)
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message, ClientError> {
        let url = self.endpoint(SEND_FAILED, &[conversation_id, "messages"])?;
        let transport = |source| ClientError::Transport { operation: SEND_FAILED, source };
        let resp = self
            .http
            .post(url)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(Self::rejection(SEND_FAILED, resp).await);
        }
        // The RFC 3339 timestamp is rehydrated into a `DateTime<Utc>` here.
        resp.json::<Message>().await.map_err(transport)
    }
}

/// Calls the remote agent API directly with credentials held on this side.
#[derive(Debug, Clone, Default)]
pub struct DirectAgent {
    upstream: Option<UpstreamClient>,
}

impl DirectAgent {
    pub fn new(upstream: Option<UpstreamClient>) -> Self {
        Self { upstream }
    }

    fn upstream(&self, operation: &'static str) -> Result<&UpstreamClient, ClientError> {
        self.upstream.as_ref().ok_or_else(|| ClientError::Failed {
            operation,
            message: "agent credentials are not configured".into(),
        })
    }
}

fn from_upstream(operation: &'static str, err: UpstreamError) -> ClientError {
    match err {
        UpstreamError::Status { status, .. } => {
            ClientError::Rejected { status, message: with_operation(operation, err.to_string()) }
        }
        UpstreamError::MissingThreadId => {
            ClientError::Failed { operation, message: "No thread ID returned from API".into() }
        }
        UpstreamError::MissingLastMessage => {
            ClientError::Failed { operation, message: "No response message received from agent".into() }
        }
        UpstreamError::Transport(source) => ClientError::Transport { operation, source },
        other => ClientError::Failed { operation, message: other.to_string() },
    }
}

#[async_trait]
impl AgentApi for DirectAgent {
    fn is_ready(&self) -> bool {
        self.upstream.is_some()
    }

    async fn create_conversation(&self) -> Result<String, ClientError> {
        self.upstream(CREATE_FAILED)?
            .create_thread()
            .await
            .map_err(|e| from_upstream(CREATE_FAILED, e))
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message, ClientError> {
        let reply = self
            .upstream(SEND_FAILED)?
            .run(conversation_id, content)
            .await
            .map_err(|e| from_upstream(SEND_FAILED, e))?;
        Ok(Message::assistant(reply))
    }
}
