//! Token usage tracking for one session.

use std::collections::HashMap;

use crate::TokenUsage;

/// Cumulative token usage, overall and per backend.
#[derive(Debug, Default)]
pub struct TokenTracker {
    total: TokenUsage,
    by_backend: HashMap<String, TokenUsage>,
    /// Number of backend calls recorded.
    call_count: u64,
}

impl TokenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record token usage from one backend call.
    pub fn record(&mut self, backend: &str, usage: &TokenUsage) {
        self.total.input_tokens += usage.input_tokens;
        self.total.output_tokens += usage.output_tokens;
        self.call_count += 1;

        let entry = self.by_backend.entry(backend.to_string()).or_default();
        entry.input_tokens += usage.input_tokens;
        entry.output_tokens += usage.output_tokens;
    }

    pub fn total(&self) -> &TokenUsage {
        &self.total
    }

    pub fn for_backend(&self, backend: &str) -> Option<&TokenUsage> {
        self.by_backend.get(backend)
    }

    pub fn total_tokens(&self) -> u64 {
        self.total.total_tokens()
    }

    pub fn call_count(&self) -> u64 {
        self.call_count
    }
}
