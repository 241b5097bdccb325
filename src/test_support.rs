//! In-process stand-ins for the remote agent API, the relay and agent clients.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use serde_json::Value;
use tokio::sync::{Barrier, Mutex};
use url::Url;

use crate::client::{AgentApi, ClientError};
use crate::conversation::Message;
use crate::server::{self, AppState};
use crate::settings::{AgentSettings, AuthScheme, RelaySettings, RunMode};

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub api_key: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone, Default)]
struct MockState {
    replies: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

/// Remote agent API double: answers with scripted replies in order and records every request.
pub struct MockUpstream {
    pub url: Url,
    state: MockState,
}

impl MockUpstream {
    pub async fn spawn(replies: Vec<(StatusCode, String)>) -> Self {
        let state = MockState {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(record).with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { url: Url::parse(&format!("http://{addr}")).unwrap(), state }
    }

    pub async fn seen(&self) -> Vec<SeenRequest> {
        self.state.seen.lock().await.clone()
    }
}

async fn record(State(state): State<MockState>, uri: Uri, headers: HeaderMap, body: Bytes) -> (StatusCode, String) {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    state.seen.lock().await.push(SeenRequest {
        path: uri.path().to_string(),
        api_key: header("x-api-key"),
        authorization: header("authorization"),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });
    state
        .replies
        .lock()
        .await
        .pop_front()
        .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, "no scripted reply".into()))
}

pub fn agent_settings(base_url: &Url, auth_scheme: AuthScheme) -> AgentSettings {
    AgentSettings {
        api_key: "test-key".into(),
        base_url: base_url.clone(),
        assistant_id: "assistant-1".into(),
        auth_scheme,
        run_mode: RunMode::Wait,
    }
}

/// Starts a relay on an ephemeral port and returns its base url without a trailing slash.
pub async fn spawn_relay(settings: RelaySettings) -> String {
    spawn_relay_with(AppState::new(settings)).await
}

pub async fn spawn_relay_with(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// `AgentApi` double with scripted replies and a call counter.
pub struct ScriptedAgent {
    ready: bool,
    thread: Option<String>,
    replies: std::sync::Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    last_conversation: std::sync::Mutex<Option<String>>,
    rendezvous: Option<Arc<Barrier>>,
}

impl ScriptedAgent {
    fn with_replies(replies: VecDeque<Result<String, String>>) -> Self {
        Self {
            ready: true,
            thread: None,
            replies: std::sync::Mutex::new(replies),
            calls: AtomicUsize::new(0),
            last_conversation: std::sync::Mutex::new(None),
            rendezvous: None,
        }
    }

    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_replies(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_replies(VecDeque::from([Err(message.into())]))
    }

    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
        self
    }

    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn with_thread(mut self, id: impl Into<String>) -> Self {
        self.thread = Some(id.into());
        self
    }

    /// Every send waits at `barrier` before answering.
    pub fn meeting_at(mut self, barrier: Arc<Barrier>) -> Self {
        self.rendezvous = Some(barrier);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_conversation(&self) -> Option<String> {
        self.last_conversation.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentApi for ScriptedAgent {
    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn create_conversation(&self) -> Result<String, ClientError> {
        self.thread.clone().ok_or_else(|| ClientError::Rejected {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "No thread ID returned from API".into(),
        })
    }

    async fn send_message(&self, conversation_id: &str, _content: &str) -> Result<Message, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_conversation.lock().unwrap() = Some(conversation_id.to_string());
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(reply)) => Ok(Message::assistant(reply)),
            Some(Err(message)) => Err(ClientError::Rejected { status: StatusCode::SERVICE_UNAVAILABLE, message }),
            None => Err(ClientError::Rejected { status: StatusCode::INTERNAL_SERVER_ERROR, message: "no scripted reply".into() }),
        }
    }
}
