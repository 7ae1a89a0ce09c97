//! Upload/negotiation exchange with the report service
//!
//! Three calls make up one negotiation:
//!
//! 1. **start** - multipart upload of the source CSV files. The service
//!    answers either with negotiable rows plus a session id, or directly with
//!    an artifact when nothing needs a decision.
//! 2. **apply** - the user's per-entry choices, keyed by entry id.
//! 3. **finalize** - produces the artifact for the session.
//!
//! Response shapes are dispatched once, here, into [`NegotiationResult`] and
//! [`ArtifactBody`]; nothing downstream re-inspects raw bodies.

pub mod client;
pub mod normalize;
pub mod response;

pub use client::NegotiationClient;
pub use normalize::{normalize_row, normalize_rows, DefaultLabelPolicy};
pub use response::{classify_body, rejection_from_body, ResponseBody};

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;

use crate::config::ReportDefinition;
use crate::error::WorkflowError;
use crate::models::{ArtifactDescriptor, CandidateRow, SelectionSummary, SessionData, UploadFile};

/// Artifact as delivered by the service
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactBody {
    /// Zip archive holding the spreadsheet and/or document
    Archive(Vec<u8>),
    /// A bare printable document
    Document(Vec<u8>),
    /// JSON descriptor pointing at (or embedding) the parts
    Descriptor(ArtifactDescriptor),
}

impl ArtifactBody {
    /// Server hint attached to a descriptor
    pub fn hint(&self) -> Option<&str> {
        match self {
            ArtifactBody::Descriptor(d) => d.hint.as_deref(),
            _ => None,
        }
    }
}

/// Outcome of `start`
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationResult {
    /// Rows that need a decision; an empty list means nothing to negotiate
    Negotiable {
        session: SessionData,
        rows: Vec<CandidateRow>,
    },
    /// The service produced the artifact straight away
    DirectArtifact(ArtifactBody),
}

/// The remote report service, as seen by the workflow controllers
pub trait NegotiationApi: Send + Sync {
    /// Upload source files and obtain candidates (or a finished artifact)
    fn start(
        &self,
        report: &ReportDefinition,
        files: &[UploadFile],
    ) -> impl Future<Output = Result<NegotiationResult, WorkflowError>> + Send;

    /// Submit resolved choices; `selections` must not be empty
    fn apply(
        &self,
        report: &ReportDefinition,
        session: &SessionData,
        selections: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<SelectionSummary, WorkflowError>> + Send;

    /// Produce the final artifact for the session
    fn finalize(
        &self,
        report: &ReportDefinition,
        session: &SessionData,
    ) -> impl Future<Output = Result<ArtifactBody, WorkflowError>> + Send;

    /// Fetch a spreadsheet referenced by a descriptor
    fn download(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, WorkflowError>> + Send;
}

/// Client-side checks run before any upload is sent.
pub fn validate_uploads(report: &ReportDefinition, files: &[UploadFile]) -> Result<(), WorkflowError> {
    if files.is_empty() {
        return Err(WorkflowError::Validation(
            "Select at least one CSV file to upload".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for file in files {
        if file.bytes.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "{} is empty",
                file.file_name
            )));
        }
        if !seen.insert(file.category.as_str()) {
            return Err(WorkflowError::Validation(format!(
                "More than one file was provided for '{}'",
                file.category
            )));
        }
    }

    let missing: Vec<&str> = report
        .required_inputs
        .iter()
        .map(String::as_str)
        .filter(|category| !seen.contains(category))
        .collect();
    if !missing.is_empty() {
        return Err(WorkflowError::Validation(format!(
            "Missing required files: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

fn string_field(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| body.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Parse a finalize (or direct) descriptor, accepting historical aliases.
pub fn parse_descriptor(body: &Value) -> ArtifactDescriptor {
    ArtifactDescriptor {
        spreadsheet_url: string_field(
            body,
            &["download_url", "downloadUrl", "spreadsheet_url", "xlsx_url", "url"],
        ),
        report_key: string_field(body, &["report_key", "reportKey"]),
        report_date: string_field(body, &["report_date", "reportDate"]),
        spreadsheet_base64: string_field(body, &["xlsx_base64", "spreadsheet_base64"]),
        document_base64: string_field(body, &["pdf_base64", "document_base64"]),
        hint: string_field(body, &["hint"]),
    }
}

fn describes_artifact(descriptor: &ArtifactDescriptor) -> bool {
    descriptor.spreadsheet_url.is_some()
        || descriptor.spreadsheet_base64.is_some()
        || descriptor.document_base64.is_some()
}

/// Interpret a JSON `start` body.
pub fn parse_start_json(
    status: u16,
    body: &Value,
    policy: &DefaultLabelPolicy,
) -> Result<NegotiationResult, WorkflowError> {
    response::ensure_not_error_status(status, body)?;

    let Some(session_id) = string_field(body, &["session_id", "sessionId"]) else {
        let descriptor = parse_descriptor(body);
        if describes_artifact(&descriptor) {
            return Ok(NegotiationResult::DirectArtifact(ArtifactBody::Descriptor(
                descriptor,
            )));
        }
        return Err(WorkflowError::UnexpectedResponse(
            "Response carried neither a session id nor an artifact".to_string(),
        ));
    };

    let rows = match body.get("rows") {
        Some(Value::Array(values)) => normalize_rows(values, policy),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            log::warn!("Ignoring non-list rows in start response: {}", other);
            Vec::new()
        }
    };

    Ok(NegotiationResult::Negotiable {
        session: SessionData::new(session_id),
        rows,
    })
}
