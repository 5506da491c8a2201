use crate::tier::ServiceTier;
use crate::types::ChatTurn;

/// Multi-turn conversation bound to a tier
///
/// Created by [`crate::ModelRouter::create_chat_with_history`] and advanced
/// with [`crate::ModelRouter::continue_chat`].
#[derive(Debug, Clone)]
pub struct ChatSession {
    tier: ServiceTier,
    backend: String,
    history: Vec<ChatTurn>,
}

impl ChatSession {
    pub(crate) const fn new(tier: ServiceTier, backend: String, history: Vec<ChatTurn>) -> Self {
        Self { tier, backend, history }
    }

    pub const fn tier(&self) -> ServiceTier {
        self.tier
    }

    /// Backend that was healthy when the session was created, or that
    /// served the most recent turn
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub(crate) fn record_exchange(&mut self, user: String, reply: String, backend: &str) {
        self.history.push(ChatTurn::user(user));
        self.history.push(ChatTurn::assistant(reply));
        backend.clone_into(&mut self.backend);
    }
}
