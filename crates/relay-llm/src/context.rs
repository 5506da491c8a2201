use std::sync::Arc;

use crate::tier::ServiceTier;
use crate::types::{ChatTurn, ImageInput, InlineImage, ToolSet};

/// What a caller asks the router to send
#[derive(Debug, Clone)]
pub struct MessageRequest {
    pub message: String,
    pub tier: ServiceTier,
    pub history: Vec<ChatTurn>,
    pub images: Vec<ImageInput>,
    /// Attach the router's registered tools to this call
    pub enable_tools: bool,
}

impl MessageRequest {
    pub fn new(message: impl Into<String>, tier: ServiceTier) -> Self {
        Self {
            message: message.into(),
            tier,
            history: Vec::new(),
            images: Vec::new(),
            enable_tools: false,
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    #[must_use]
    pub fn with_images(mut self, images: Vec<ImageInput>) -> Self {
        self.images = images;
        self
    }

    #[must_use]
    pub const fn with_tools(mut self, enable: bool) -> Self {
        self.enable_tools = enable;
        self
    }
}

/// Per-request state carried through the fallback search
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub message: String,
    pub history: Vec<ChatTurn>,
    /// Images that survived decoding
    pub images: Vec<InlineImage>,
    /// Tool snapshot taken when the request started, if tools are enabled
    pub tools: Option<Arc<ToolSet>>,
    pub tier: ServiceTier,
    /// Whether the caller supplied any images, valid or not
    images_supplied: bool,
    chain_len: usize,
    cost: f64,
    attempts: usize,
}

impl RequestContext {
    pub fn new(message: impl Into<String>, tier: ServiceTier, chain_len: usize) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            images: Vec::new(),
            tools: None,
            tier,
            images_supplied: false,
            chain_len,
            cost: 0.0,
            attempts: 0,
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    /// Attach decoded images; `supplied` is how many the caller sent
    #[must_use]
    pub fn with_images(mut self, images: Vec<InlineImage>, supplied: usize) -> Self {
        self.images = images;
        self.images_supplied = supplied > 0;
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Option<Arc<ToolSet>>) -> Self {
        self.tools = tools.filter(|t| !t.is_empty());
        self
    }

    pub const fn images_supplied(&self) -> bool {
        self.images_supplied
    }

    pub const fn chain_len(&self) -> usize {
        self.chain_len
    }

    /// Cost accumulated across attempts so far
    pub const fn cost(&self) -> f64 {
        self.cost
    }

    /// Attempts made so far; skipped backends are not counted
    pub const fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn charge(&mut self, cost: f64) {
        if cost.is_finite() && cost > 0.0 {
            self.cost += cost;
        }
    }

    pub const fn record_attempt(&mut self) {
        self.attempts += 1;
    }
}
