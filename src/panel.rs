use crate::client::{AgentApi, ClientError, SEND_FAILED};
use crate::conversation::{ConversationConfig, Message};
use crate::history::BoundedHistory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    Sending,
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("please configure API key, thread ID and agent ID")]
    NotConfigured,
    #[error("message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Agent(#[from] ClientError),
}

/// One agent's side of the dashboard: its config, its bounded history and its send state.
pub struct ConversationPanel<A> {
    api: A,
    config: ConversationConfig,
    history: BoundedHistory,
    state: PanelState,
}

impl<A: AgentApi> ConversationPanel<A> {
    pub fn new(api: A, config: ConversationConfig) -> Self {
        let history = BoundedHistory::new(config.effective_max_messages());
        Self { api, config, history, state: PanelState::Idle }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn history(&self) -> &BoundedHistory {
        &self.history
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            PanelState::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api.is_ready() && self.config.has_conversation()
    }

    /// `len/max` label shown next to the agent name.
    pub fn counter(&self) -> String {
        format!("{}/{}", self.history.len(), self.history.capacity())
    }

    /// Sends `content` and returns the agent's reply.
    ///
    /// The user message is appended before the call and stays in the history
    /// whether or not the agent answers.
    pub async fn send(&mut self, content: &str) -> Result<Message, PanelError> {
        if content.trim().is_empty() {
            return Err(PanelError::EmptyMessage);
        }
        if !self.is_configured() {
            let err = PanelError::NotConfigured;
            self.state = PanelState::Error(err.to_string());
            return Err(err);
        }

        self.append(Message::user(content));
        self.state = PanelState::Sending;

        match self.api.send_message(&self.config.conversation_id, content).await {
            Ok(reply) => {
                self.append(reply.clone());
                self.state = PanelState::Idle;
                Ok(reply)
            }
            Err(err) => {
                let message = err.to_string();
                let message = if message.is_empty() { SEND_FAILED.to_string() } else { message };
                tracing::warn!(agent = %self.config.agent_name, error = %message, "send failed");
                self.state = PanelState::Error(message);
                Err(err.into())
            }
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        self.state = PanelState::Idle;
    }

    /// Replaces the config wholesale; this starts a new conversation view.
    pub fn save_config(&mut self, config: ConversationConfig) {
        self.history.set_capacity(config.effective_max_messages());
        self.config = config;
        self.clear_history();
    }

    /// Creates a remote conversation when none is set. Returns the new id, if any.
    pub async fn ensure_conversation(&mut self) -> Result<Option<String>, PanelError> {
        if self.config.has_conversation() {
            return Ok(None);
        }
        if !self.api.is_ready() {
            return Err(PanelError::NotConfigured);
        }
        let id = self.api.create_conversation().await?;
        tracing::info!(agent = %self.config.agent_name, conversation_id = %id, "conversation created");
        self.config.conversation_id = id.clone();
        Ok(Some(id))
    }

    fn append(&mut self, message: Message) {
        let evicted = self.history.push(message);
        if evicted > 0 {
            tracing::debug!(agent = %self.config.agent_name, evicted, "history trimmed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::test_support::ScriptedAgent;
    use std::sync::Arc;
    use tokio::sync::Barrier;

    fn panel(agent: ScriptedAgent, conversation_id: &str) -> ConversationPanel<ScriptedAgent> {
        ConversationPanel::new(agent, ConversationConfig::new("小文").with_conversation_id(conversation_id))
    }

    #[tokio::test]
    async fn incomplete_config_never_touches_the_network() {
        let mut p = panel(ScriptedAgent::replying(["hi"]), "");
        let err = p.send("hello").await.unwrap_err();
        assert!(matches!(err, PanelError::NotConfigured));
        assert_eq!(p.error(), Some("please configure API key, thread ID and agent ID"));
        assert_eq!(p.history().len(), 0);
        assert_eq!(p.api().calls(), 0);

        let mut p = panel(ScriptedAgent::replying(["hi"]).not_ready(), "t-1");
        assert!(p.send("hello").await.is_err());
        assert_eq!(p.api().calls(), 0);
    }

    #[tokio::test]
    async fn success_appends_user_then_assistant() {
        let mut p = panel(ScriptedAgent::replying(["hi there"]), "t-1");
        let reply = p.send("hello").await.unwrap();
        assert_eq!(reply.content, "hi there");
        assert_eq!(p.state(), &PanelState::Idle);
        let roles: Vec<Role> = p.messages().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(p.api().calls(), 1);
        assert_eq!(p.api().last_conversation().as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn state_is_sending_while_the_reply_is_outstanding() {
        // A lone party at a two-party barrier never gets its reply.
        let barrier = Arc::new(Barrier::new(2));
        let mut p = panel(ScriptedAgent::replying(["late"]).meeting_at(barrier), "t-1");
        {
            let send = p.send("hello");
            tokio::pin!(send);
            assert!(futures::poll!(send.as_mut()).is_pending());
        }
        assert_eq!(p.state(), &PanelState::Sending);
        assert_eq!(p.api().calls(), 1);
        let msgs: Vec<_> = p.messages().map(|m| (m.role, m.content.clone())).collect();
        assert_eq!(msgs, vec![(Role::User, "hello".to_string())]);
    }

    #[tokio::test]
    async fn failure_keeps_optimistic_user_message() {
        let mut p = panel(ScriptedAgent::failing("Failed to send message: 503 Service Unavailable - busy"), "t-1");
        assert!(p.send("hello").await.is_err());
        assert_eq!(p.history().len(), 1);
        assert_eq!(p.messages().next().unwrap().role, Role::User);
        assert!(p.error().unwrap().contains("503 Service Unavailable"));
    }

    #[tokio::test]
    async fn later_success_clears_previous_error() {
        let mut p = panel(ScriptedAgent::failing("boom").then_reply("ok"), "t-1");
        assert!(p.send("one").await.is_err());
        assert!(p.error().is_some());
        p.send("two").await.unwrap();
        assert_eq!(p.state(), &PanelState::Idle);
        assert_eq!(p.history().len(), 3);
    }

    #[tokio::test]
    async fn history_stays_bounded_across_sends() {
        let agent = ScriptedAgent::replying((0..20).map(|i| format!("r{i}")));
        let mut p = ConversationPanel::new(agent, ConversationConfig::new("a").with_conversation_id("t").with_max_messages(10));
        for i in 0..20 {
            p.send(&format!("q{i}")).await.unwrap();
        }
        assert_eq!(p.history().len(), 10);
        assert_eq!(p.counter(), "10/10");
        assert_eq!(p.messages().next().unwrap().content, "q15");
        assert_eq!(p.history().last().unwrap().content, "r19");
    }

    #[tokio::test]
    async fn clear_and_save_config_reset_the_view() {
        let mut p = panel(ScriptedAgent::failing("boom").then_reply("ok"), "t-1");
        let _ = p.send("one").await;
        p.clear_history();
        assert_eq!(p.history().len(), 0);
        assert_eq!(p.error(), None);

        p.send("two").await.unwrap();
        p.save_config(ConversationConfig::new("renamed").with_conversation_id("t-2").with_max_messages(50));
        assert_eq!(p.history().len(), 0);
        assert_eq!(p.config().agent_name, "renamed");
        assert_eq!(p.counter(), "0/50");
    }

    #[tokio::test]
    async fn empty_input_is_ignored() {
        let mut p = panel(ScriptedAgent::replying(["x"]), "t-1");
        assert!(matches!(p.send("   ").await, Err(PanelError::EmptyMessage)));
        assert_eq!(p.state(), &PanelState::Idle);
        assert_eq!(p.api().calls(), 0);
    }

    #[tokio::test]
    async fn ensure_conversation_only_creates_when_missing() {
        let mut p = panel(ScriptedAgent::replying(["x"]).with_thread("new-thread"), "");
        assert_eq!(p.ensure_conversation().await.unwrap().as_deref(), Some("new-thread"));
        assert_eq!(p.config().conversation_id, "new-thread");
        assert!(p.is_configured());
        assert_eq!(p.ensure_conversation().await.unwrap(), None);
    }
}
