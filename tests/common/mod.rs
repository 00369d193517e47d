#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;

use async_trait::async_trait;
use statesman::analysis::{CompletionClient, CompletionError, CompletionRequest};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Completion client that replays a fixed script of responses and keeps
/// the prompts it was asked, for assertions.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(CompletionError::Provider {
                message: "script exhausted".to_string(),
            })
    }
}
