// Externally supplied label validation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of validating one option label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Validation capability injected into the interactive workflow.
///
/// Results are advisory: they decorate item views and raise warnings but
/// never block a transition.
pub trait ValidationLookup: Send + Sync {
    fn validate(&self, label: &str) -> ValidationResult;
}

impl<F> ValidationLookup for F
where
    F: Fn(&str) -> ValidationResult + Send + Sync,
{
    fn validate(&self, label: &str) -> ValidationResult {
        self(label)
    }
}

/// Lookup backed by a fixed table of known-bad labels
#[derive(Debug, Clone, Default)]
pub struct StaticValidation {
    rejected: HashMap<String, String>,
}

impl StaticValidation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `label` invalid with `message`
    pub fn reject(mut self, label: impl Into<String>, message: impl Into<String>) -> Self {
        self.rejected.insert(label.into(), message.into());
        self
    }
}

impl ValidationLookup for StaticValidation {
    fn validate(&self, label: &str) -> ValidationResult {
        match self.rejected.get(label) {
            Some(message) => ValidationResult::invalid(message.clone()),
            None => ValidationResult::ok(),
        }
    }
}
