use futures::future::join_all;

use crate::client::AgentApi;
use crate::conversation::Message;
use crate::panel::{ConversationPanel, PanelError};
use crate::settings::AgentKey;

/// Settled outcome of every panel a broadcast was dispatched to.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub outcomes: Vec<(AgentKey, Result<Message, PanelError>)>,
}

impl BroadcastReport {
    pub fn dispatched(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn outcome(&self, key: AgentKey) -> Option<&Result<Message, PanelError>> {
        self.outcomes.iter().find(|(k, _)| *k == key).map(|(_, r)| r)
    }
}

/// The two side-by-side panels.
pub struct Dashboard<A> {
    panels: [ConversationPanel<A>; 2],
}

impl<A: AgentApi> Dashboard<A> {
    pub fn new(agent1: ConversationPanel<A>, agent2: ConversationPanel<A>) -> Self {
        Self { panels: [agent1, agent2] }
    }

    pub fn panel(&self, key: AgentKey) -> &ConversationPanel<A> {
        &self.panels[key.index()]
    }

    pub fn panel_mut(&mut self, key: AgentKey) -> &mut ConversationPanel<A> {
        &mut self.panels[key.index()]
    }

    pub fn can_broadcast(&self) -> bool {
        self.panels.iter().any(ConversationPanel::is_configured)
    }

    /// Creates a conversation for every panel that lacks one.
    ///
    /// Failures are logged per agent and leave that panel unconfigured; the
    /// other panel is unaffected. Returns how many panels are ready afterwards.
    pub async fn initialize(&mut self) -> usize {
        let pending = AgentKey::ALL
            .into_iter()
            .zip(self.panels.iter_mut())
            .filter(|(_, panel)| !panel.config().has_conversation())
            .map(|(key, panel)| async move { (key, panel.ensure_conversation().await) });

        for (key, result) in join_all(pending).await {
            if let Err(err) = result {
                tracing::warn!(agent = %key, error = %err, "could not create conversation");
            }
        }
        self.panels.iter().filter(|p| p.is_configured()).count()
    }

    /// Sends `text` to every configured panel at once and waits for all of them.
    ///
    /// One panel failing does not stop or undo the other. Blank text or no
    /// configured panel is a no-op.
    pub async fn broadcast(&mut self, text: &str) -> BroadcastReport {
        let text = text.trim();
        if text.is_empty() || !self.can_broadcast() {
            return BroadcastReport::default();
        }

        let sends = AgentKey::ALL
            .into_iter()
            .zip(self.panels.iter_mut())
            .filter(|(_, panel)| panel.is_configured())
            .map(|(key, panel)| async move { (key, panel.send(text).await) });
        let outcomes = join_all(sends).await;

        for (key, result) in &outcomes {
            if let Err(err) = result {
                tracing::warn!(agent = %key, error = %err, "broadcast send failed");
            }
        }
        BroadcastReport { outcomes }
    }

    pub async fn send_to(&mut self, key: AgentKey, text: &str) -> Result<Message, PanelError> {
        self.panel_mut(key).send(text.trim()).await
    }
}
