//! LLM orchestration: synthesize a workflow, run it, render the answer.
//!
//! The engine drives three completion exchanges around one interpretation:
//! a relevance gate, workflow generation (with the catalog's metadata
//! document embedded in the prompt), and final rendering over whatever the
//! run recorded. A failed or timed-out run is not fatal; its error text
//! replaces the collected data, so the user still gets an explanation.

mod client;
#[cfg(feature = "http-client")]
mod http;
mod prompts;

pub use client::{CompletionClient, CompletionError, CompletionRequest};
#[cfg(feature = "http-client")]
pub use http::HttpCompletionClient;

use miette::Diagnostic;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::AnalysisConfig;
use crate::catalog::MethodCatalog;
use crate::definition::{DefinitionError, StateMachine};
use crate::interpreter::Interpreter;
use crate::recorder::OutputRecorder;

/// Failures of the orchestration itself. Interpretation failures are not
/// here: they are folded into the final prompt as text.
#[derive(Debug, Error, Diagnostic)]
pub enum AnalysisError {
    /// A completion exchange failed outright.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Completion(#[from] CompletionError),

    /// The generated workflow was not a usable state machine.
    #[error("generated workflow rejected: {source}")]
    #[diagnostic(
        code(statesman::analysis::bad_workflow),
        help("The model's answer did not contain a valid state machine document.")
    )]
    Workflow {
        #[from]
        source: DefinitionError,
    },
}

/// Orchestrates question → workflow → interpretation → answer.
pub struct AnalysisEngine {
    client: Arc<dyn CompletionClient>,
    catalog: Arc<MethodCatalog>,
    recorder: Arc<OutputRecorder>,
    config: AnalysisConfig,
}

impl AnalysisEngine {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        catalog: Arc<MethodCatalog>,
        recorder: Arc<OutputRecorder>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            client,
            catalog,
            recorder,
            config,
        }
    }

    /// Runs the full pipeline for one question and returns the rendered
    /// answer.
    #[instrument(skip_all)]
    pub async fn analyze(&self, question: &str) -> Result<String, AnalysisError> {
        if self.config.relevance_gate && !self.is_relevant(question).await? {
            info!("question rejected by relevance gate");
            return Ok(prompts::OFF_TOPIC_REPLY.to_string());
        }

        let machine = self.generate_workflow(question).await?;
        let collected = self.execute(&machine).await;

        let request = CompletionRequest::new(prompts::final_prompt(question, &collected))
            .with_system(prompts::RENDER_SYSTEM)
            .with_model(&self.config.model);
        Ok(self.client.complete(request).await?)
    }

    async fn is_relevant(&self, question: &str) -> Result<bool, AnalysisError> {
        let request = CompletionRequest::new(prompts::relevance_prompt(question))
            .with_model(&self.config.model);
        let answer = self.client.complete(request).await?;
        Ok(answer.trim().to_lowercase().starts_with("yes"))
    }

    /// Asks the model for an ASL definition over this catalog and parses
    /// its answer.
    async fn generate_workflow(&self, question: &str) -> Result<StateMachine, AnalysisError> {
        let metadata = self.catalog.metadata_document();
        let metadata_text =
            serde_json::to_string_pretty(&metadata).unwrap_or_else(|_| metadata.to_string());
        let request = CompletionRequest::new(prompts::workflow_prompt(question, &metadata_text))
            .with_system(prompts::WORKFLOW_SYSTEM)
            .with_response_schema(workflow_response_schema())
            .with_model(&self.config.model);
        let response = self.client.complete(request).await?;
        let machine = StateMachine::from_json(prompts::extract_json(&response))?;
        machine.validate()?;
        Ok(machine)
    }

    /// Interprets the machine under the configured timeout and returns the
    /// text that stands in for "collected data" in the final prompt.
    async fn execute(&self, machine: &StateMachine) -> String {
        let interpreter = Interpreter::new(Arc::clone(&self.catalog));
        let run = interpreter.interpret(machine, json!({}));
        match tokio::time::timeout(self.config.interpretation_timeout, run).await {
            Ok(Ok(_)) if !self.recorder.is_empty() => self.recorder.render(),
            Ok(Ok(_)) => "The workflow completed but recorded no data.".to_string(),
            Ok(Err(err)) => {
                warn!(error = %err, "workflow failed");
                format!("The data-gathering workflow failed: {err}")
            }
            Err(_) => {
                warn!("workflow timed out");
                "The data-gathering workflow did not finish in time.".to_string()
            }
        }
    }
}

/// Loose schema handed to providers that support constrained output; the
/// real validation happens in [`StateMachine::validate`].
fn workflow_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "StartAt": { "type": "string" },
            "States": { "type": "object" }
        },
        "required": ["StartAt", "States"]
    })
}
