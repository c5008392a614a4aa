use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Completion, FinishReason, Provider, Usage};

/// A request as the mock provider saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
}

/// A mock provider that returns pre-configured responses for testing
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Result<Completion, String>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Completion>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().map(Ok).collect())),
            requests: Arc::default(),
        }
    }

    /// Queue a failure for the next unanswered request
    pub fn then_fail<S: Into<String>>(self, error: S) -> Self {
        self.responses.lock().unwrap().push(Err(error.into()));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn answer<S: Into<String>>(text: S) -> Completion {
        Completion {
            message: Message::assistant().with_text(text),
            finish_reason: FinishReason::Other("stop".to_string()),
        }
    }

    pub fn tool_calls(message: Message) -> Completion {
        Completion {
            message,
            finish_reason: FinishReason::ToolCalls,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<(Completion, Usage)> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            tools: tools.to_vec(),
        });

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            return Ok((Self::answer(""), Usage::default()));
        }
        match responses.remove(0) {
            Ok(completion) => Ok((completion, Usage::default())),
            Err(error) => Err(anyhow!(error)),
        }
    }
}
