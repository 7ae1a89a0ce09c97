// Clippy allows for reasonable defaults
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::derivable_impls)] // Explicit Default impls can be clearer
#![allow(clippy::field_reassign_with_default)] // Builder pattern is clearer
#![allow(clippy::needless_borrow)] // Explicit borrows can clarify ownership
#![allow(clippy::redundant_closure)] // |x| f(x) can be clearer than f

// Module declarations
pub mod archive;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod negotiation;
pub mod selection;
pub mod shell;
mod utils;
pub mod validation;
pub mod workflow;

// Re-export the types a host needs to drive a workflow
pub use archive::{ArchiveDecoder, ArtifactParts, Blob, PreviewHandle, PreviewRegistry, Resource};
pub use config::{load_config, ConfigLoader, ReportDefinition, WorkflowConfig};
pub use error::{IntegrityWarning, WorkflowError};
pub use events::{EventBroadcaster, WorkflowEvent};
pub use models::*;
pub use negotiation::{ArtifactBody, NegotiationApi, NegotiationClient, NegotiationResult};
pub use selection::SelectionStore;
pub use shell::{ArtifactFiles, AutoSnapshot, WorkflowSnapshot};
pub use validation::{StaticValidation, ValidationLookup, ValidationResult};
pub use workflow::{
    AutoOutcome, AutoPhase, AutoWorkflow, InteractivePhase, InteractiveWorkflow, PendingNegotiation, StepOutcome,
};

/// Install an `env_logger` with an `info` default, overridable through `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
