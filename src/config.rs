//! Environment-driven orchestration settings.

use std::time::Duration;

/// Settings consumed by [`crate::analysis::AnalysisEngine`].
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Model identifier handed to the completion client.
    pub model: String,
    /// Hard cap on one interpretation; a run past it is reported as timed
    /// out rather than failing the whole analysis.
    pub interpretation_timeout: Duration,
    /// Whether off-topic questions are rejected before any workflow is
    /// generated.
    pub relevance_gate: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            interpretation_timeout: Duration::from_secs(600),
            relevance_gate: true,
        }
    }
}

impl AnalysisConfig {
    /// Reads `STATESMAN_MODEL`, `STATESMAN_TIMEOUT_SECS`, and
    /// `STATESMAN_RELEVANCE_GATE`, falling back to the defaults. A `.env`
    /// file is honoured when present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            model: std::env::var("STATESMAN_MODEL").unwrap_or(defaults.model),
            interpretation_timeout: std::env::var("STATESMAN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.interpretation_timeout),
            relevance_gate: std::env::var("STATESMAN_RELEVANCE_GATE")
                .ok()
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.relevance_gate),
        }
    }
}
