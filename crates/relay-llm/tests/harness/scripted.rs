//! In-process backends that follow a per-model script

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_llm::protocol::anthropic::AnthropicRequest;
use relay_llm::protocol::google::GoogleRequest;
use relay_llm::{Backend, BackendError, BackendReply, SecondaryBackend};

/// What a scripted backend does on its next call
pub enum Step {
    Reply(BackendReply),
    Fail(BackendError),
    /// Never answer within any reasonable timeout
    Hang,
}

pub fn quota_exhausted() -> Step {
    Step::Fail(BackendError::Status {
        status: 429,
        reason: Some("RESOURCE_EXHAUSTED".to_owned()),
        message: "Quota exceeded".to_owned(),
    })
}

pub fn unavailable() -> Step {
    Step::Fail(BackendError::Status {
        status: 503,
        reason: Some("UNAVAILABLE".to_owned()),
        message: "The model is overloaded".to_owned(),
    })
}

pub fn reply(text: &str) -> Step {
    Step::Reply(BackendReply::text(text))
}

/// Primary backend; models without a script answer `reply from <model>`
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<GoogleRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue steps for `model`, consumed one per call
    pub fn script(&self, model: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(model.to_owned())
            .or_default()
            .extend(steps);
    }

    /// Models called, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<GoogleRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, model: &str, request: &GoogleRequest) -> Result<BackendReply, BackendError> {
        self.calls.lock().unwrap().push(model.to_owned());
        self.requests.lock().unwrap().push(request.clone());

        let step = self.scripts.lock().unwrap().get_mut(model).and_then(VecDeque::pop_front);

        run(step, model).await
    }
}

/// Secondary backend with its own script
pub struct ScriptedSecondary {
    model: String,
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<AnthropicRequest>>,
}

impl ScriptedSecondary {
    pub fn new(model: &str, steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            model: model.to_owned(),
            steps: Mutex::new(steps.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<AnthropicRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecondaryBackend for ScriptedSecondary {
    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        1024
    }

    async fn generate(&self, request: &AnthropicRequest) -> Result<BackendReply, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();

        run(step, &self.model).await
    }
}

async fn run(step: Option<Step>, model: &str) -> Result<BackendReply, BackendError> {
    match step {
        Some(Step::Reply(reply)) => Ok(reply),
        Some(Step::Fail(error)) => Err(error),
        Some(Step::Hang) => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(BackendError::Other("hung backend woke up".to_owned()))
        }
        None => Ok(BackendReply::text(format!("reply from {model}"))),
    }
}
