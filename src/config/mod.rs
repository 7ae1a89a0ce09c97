// Layered configuration: defaults -> config file -> environment

pub mod loader;

// Re-export main types
pub use loader::{validate_config, ConfigLoader, ReportDefinition, WorkflowConfig};

use crate::error::WorkflowError;
use std::path::Path;

/// Load the workflow configuration, optionally from an explicit file.
pub fn load_config(path: Option<&Path>) -> Result<WorkflowConfig, WorkflowError> {
    let loader = match path {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };

    loader
        .load()
        .map_err(|e| WorkflowError::Config(e.to_string()))
}
