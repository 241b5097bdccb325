use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;

use crate::conversation::Message;
use crate::settings::{AgentKey, RelaySettings};
use crate::upstream::{UpstreamClient, UpstreamError};

const CREATE_THREAD: &str = "create_thread";
const SEND_MESSAGE: &str = "send_message";

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<RelaySettings>,
    pub http: reqwest::Client,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(settings: RelaySettings) -> Self {
        Self { settings: Arc::new(settings), http: reqwest::Client::new(), metrics: None }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn upstream(&self, agent_key: &str) -> Result<UpstreamClient, RelayError> {
        let key: AgentKey = agent_key.parse().map_err(|_| RelayError::NotConfigured)?;
        let settings = self.settings.agent(key).ok_or(RelayError::NotConfigured)?;
        Ok(UpstreamClient::new(self.http.clone(), settings.clone()))
    }
}

/// Failure of a relay call, rendered as `{"error": ...}` with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Agent configuration not found or incomplete")]
    NotConfigured,
    #[error("Message content is required")]
    MissingContent,
    #[error("{operation}: {detail}")]
    Upstream { operation: &'static str, status: StatusCode, detail: String },
    #[error("No thread ID returned from API")]
    MissingThreadId,
    #[error("No response message received from agent")]
    MissingLastMessage,
    #[error("Internal server error")]
    Internal,
}

impl RelayError {
    fn from_upstream(operation: &'static str, err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status { status, .. } => {
                tracing::warn!(%status, operation, "upstream rejected request");
                RelayError::Upstream { operation, status, detail: err.to_string() }
            }
            UpstreamError::MissingThreadId => RelayError::MissingThreadId,
            UpstreamError::MissingLastMessage => RelayError::MissingLastMessage,
            other => {
                tracing::error!(error = %other, operation, "upstream call failed");
                RelayError::Internal
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::NotConfigured => StatusCode::NOT_FOUND,
            RelayError::MissingContent => StatusCode::BAD_REQUEST,
            RelayError::Upstream { status, .. } => *status,
            RelayError::MissingThreadId | RelayError::MissingLastMessage | RelayError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            RelayError::NotConfigured => "not_configured",
            RelayError::MissingContent => "invalid_request",
            RelayError::Upstream { .. } => "upstream_error",
            RelayError::MissingThreadId | RelayError::MissingLastMessage => "contract_violation",
            RelayError::Internal => "internal_error",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadResponse {
    pub thread_id: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageBody {
    #[serde(default)]
    content: Option<Value>,
}

fn parse_content(body: &[u8]) -> Result<String, RelayError> {
    let parsed: SendMessageBody = serde_json::from_slice(body).map_err(|_| RelayError::MissingContent)?;
    match parsed.content {
        Some(Value::String(content)) if !content.is_empty() => Ok(content),
        _ => Err(RelayError::MissingContent),
    }
}

fn record<T>(agent_key: &str, operation: &'static str, result: &Result<T, RelayError>) {
    let agent = match agent_key.parse::<AgentKey>() {
        Ok(key) => key.as_str(),
        Err(_) => "unknown",
    };
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    };
    metrics::counter!("relay_requests_total", "agent" => agent, "operation" => operation, "outcome" => outcome)
        .increment(1);
}

#[tracing::instrument(skip(state))]
async fn create_thread(
    State(state): State<AppState>,
    Path(agent_key): Path<String>,
) -> Result<Json<CreateThreadResponse>, RelayError> {
    let result = async {
        let upstream = state.upstream(&agent_key)?;
        let thread_id = upstream
            .create_thread()
            .await
            .map_err(|e| RelayError::from_upstream("Failed to create thread", e))?;
        tracing::info!(%thread_id, "thread created");
        Ok::<_, RelayError>(Json(CreateThreadResponse { thread_id }))
    }
    .await;
    record(&agent_key, CREATE_THREAD, &result);
    result
}

#[tracing::instrument(skip(state, body))]
async fn send_message(
    State(state): State<AppState>,
    Path((agent_key, thread_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Message>, RelayError> {
    let result = async {
        let upstream = state.upstream(&agent_key)?;
        let content = parse_content(&body)?;
        let reply = upstream
            .run(&thread_id, &content)
            .await
            .map_err(|e| RelayError::from_upstream("Failed to send message", e))?;
        Ok::<_, RelayError>(Json(Message::assistant(reply)))
    }
    .await;
    record(&agent_key, SEND_MESSAGE, &result);
    result
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "agent-duet",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agents/:agent_key/threads", post(create_thread))
        .route("/agents/:agent_key/threads/:thread_id/messages", post(send_message))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    for key in state.settings.configured() {
        tracing::info!(agent = %key, "relay enabled");
    }
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "relay listening");
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await?;
    Ok(())
}
