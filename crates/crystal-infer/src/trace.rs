//! Inference trace for compiler observability.
//!
//! One record per top-level definition, in the order inference visited
//! them. Collection is opt-in and costs nothing when disabled.

use serde::Serialize;

/// How inference of one definition went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// Every type was known on the first pass.
    Complete,
    /// Forward references needed the backfill pass.
    Backfilled,
    /// Inference stopped with an error.
    Failed,
}

/// A single step in an inference trace.
#[derive(Debug, Clone, Serialize)]
pub struct InferStep {
    /// Definition name, or its kind for anonymous definitions.
    pub name: String,
    pub kind: &'static str,
    pub outcome: PassOutcome,
    /// Inferred type of the definition, once known.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InferTrace {
    pub steps: Vec<InferStep>,
}

impl InferTrace {
    pub fn push(&mut self, step: InferStep) {
        self.steps.push(step);
    }

    /// Names of the definitions that needed a backfill pass.
    pub fn backfilled(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter(|s| s.outcome == PassOutcome::Backfilled)
            .map(|s| s.name.as_str())
    }
}
