// Error taxonomy for the report workflow

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message shown for any transport-level failure.
pub const NETWORK_RETRY_MESSAGE: &str =
    "Could not reach the report service. Check your connection and try again.";

/// Fallback when a rejection carries no readable body.
pub const GENERIC_REJECTION_MESSAGE: &str = "The report service rejected the request.";

/// Errors surfaced by the negotiation client, archive decoder and workflow controllers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// Request could not be sent or the response could not be read
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status (or an explicit `status: "error"` body)
    #[error("Report service error ({status}): {message}")]
    RemoteRejection {
        status: u16,
        message: String,
        hint: Option<String>,
    },

    /// The artifact body is not a readable archive
    #[error("Invalid artifact archive: {0}")]
    ArchiveFormat(String),

    /// Client-side validation failure; never reaches the network
    #[error("{0}")]
    Validation(String),

    /// `apply`/`finalize` attempted without a live session
    #[error("No active negotiation session")]
    NoSession,

    /// A success response whose shape could not be interpreted
    #[error("Unexpected response from report service: {0}")]
    UnexpectedResponse(String),

    /// The finalized artifact contained neither a spreadsheet nor a document
    #[error("The generated artifact contained no spreadsheet or document")]
    EmptyArtifact,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkflowError {
    /// Human-readable text for a dismissible notification.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Network(_) => NETWORK_RETRY_MESSAGE.to_string(),
            WorkflowError::RemoteRejection { message, .. } => message.clone(),
            WorkflowError::ArchiveFormat(_) => {
                "The generated file could not be opened. Upload the source files again to start a new report.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Secondary, non-blocking hint provided by the server.
    pub fn hint(&self) -> Option<&str> {
        match self {
            WorkflowError::RemoteRejection { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    /// Whether the error was raised before anything was sent.
    pub fn is_client_side(&self) -> bool {
        matches!(self, WorkflowError::Validation(_) | WorkflowError::NoSession)
    }

    /// Short machine-readable kind, carried on error notifications and in failure logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Network(_) => "network",
            WorkflowError::RemoteRejection { .. } => "remote_rejection",
            WorkflowError::ArchiveFormat(_) => "archive_format",
            WorkflowError::Validation(_) => "validation",
            WorkflowError::NoSession => "no_session",
            WorkflowError::UnexpectedResponse(_) => "unexpected_response",
            WorkflowError::EmptyArtifact => "empty_artifact",
            WorkflowError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for WorkflowError {
    fn from(err: reqwest::Error) -> Self {
        WorkflowError::Network(err.to_string())
    }
}

impl From<zip::result::ZipError> for WorkflowError {
    fn from(err: zip::result::ZipError) -> Self {
        WorkflowError::ArchiveFormat(err.to_string())
    }
}

/// Which artifact part an integrity warning refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactPartKind {
    Spreadsheet,
    Document,
}

/// Non-fatal warning: the part is still delivered but flagged as suspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityWarning {
    pub part: ArtifactPartKind,
    pub file_name: String,
    pub expected: String,
    /// First bytes actually found, rendered lossily
    pub found: String,
}

impl std::fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} does not start with the expected {:?} signature (found {:?})",
            self.file_name, self.expected, self.found
        )
    }
}
