//! Read-only views handed to the presentation layer
//!
//! The shell renders from a [`WorkflowSnapshot`] and requests mutations
//! through the workflow's methods; it never touches the selection store or
//! the workflow-owned preview handle directly.

use serde::{Deserialize, Serialize};

use crate::archive::{ArtifactParts, Blob};
use crate::error::IntegrityWarning;
use crate::models::{InteractiveItem, OptionChoice, SelectionState, SelectionSummary, SubmissionEntry};
use crate::validation::ValidationResult;
use crate::workflow::notifications::Notification;
use crate::workflow::phase::{AutoPhase, InteractivePhase};

/// One negotiable item as the shell shows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: String,
    pub vendor_code: String,
    pub vendor_name: String,
    pub item_name: String,
    pub detail: Option<String>,
    pub options: Vec<OptionChoice>,
    pub selection: Option<SelectionState>,
    /// Lookup result for the selected label, when a lookup is configured
    pub validation: Option<ValidationResult>,
}

impl ItemView {
    pub fn new(
        item: &InteractiveItem,
        selection: Option<&SelectionState>,
        validation: Option<ValidationResult>,
    ) -> Self {
        Self {
            id: item.id.clone(),
            vendor_code: item.source.vendor_code.to_string(),
            vendor_name: item.source.vendor_name.clone(),
            item_name: item.source.item_name.clone(),
            detail: item.source.detail.clone(),
            options: item.options.clone(),
            selection: selection.cloned(),
            validation,
        }
    }
}

/// Summary of a finished artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactView {
    pub spreadsheet_name: Option<String>,
    pub spreadsheet_size: Option<usize>,
    pub document_name: Option<String>,
    pub document_size: Option<usize>,
    pub preview_url: Option<String>,
    pub suspect: bool,
    pub warnings: Vec<IntegrityWarning>,
}

impl ArtifactView {
    pub fn from_parts(parts: &ArtifactParts) -> Self {
        Self {
            spreadsheet_name: parts.spreadsheet.as_ref().map(|b| b.file_name().to_string()),
            spreadsheet_size: parts.spreadsheet.as_ref().map(Blob::len),
            document_name: parts.document.as_ref().map(|b| b.file_name().to_string()),
            document_size: parts.document.as_ref().map(Blob::len),
            preview_url: parts.preview_url().map(str::to_string),
            suspect: parts.is_suspect(),
            warnings: parts.warnings.clone(),
        }
    }
}

/// Blobs handed to the shell for download or print.
///
/// `preview_url` stays owned by the workflow; the shell may create its own
/// handles from the shared registry but must not release this one.
#[derive(Debug, Clone)]
pub struct ArtifactFiles {
    pub spreadsheet: Option<Blob>,
    pub document: Option<Blob>,
    pub preview_url: Option<String>,
}

impl ArtifactFiles {
    pub fn from_parts(parts: &ArtifactParts) -> Self {
        Self {
            spreadsheet: parts.spreadsheet.clone(),
            document: parts.document.clone(),
            preview_url: parts.preview_url().map(str::to_string),
        }
    }
}

/// Everything the shell needs to render the interactive workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    pub report_key: String,
    pub phase: InteractivePhase,
    pub phase_name: String,
    /// An async step is suspended; conflicting actions should be disabled
    pub processing: bool,
    pub can_advance: bool,
    pub can_go_back: bool,
    pub can_generate: bool,
    pub session_id: Option<String>,
    pub items: Vec<ItemView>,
    pub completion_percentage: u8,
    pub submission: Vec<SubmissionEntry>,
    pub artifact: Option<ArtifactView>,
    pub notifications: Vec<Notification>,
    pub summary: Option<SelectionSummary>,
}

/// Everything the shell needs to render the auto workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSnapshot {
    pub report_key: String,
    pub phase: AutoPhase,
    pub processing: bool,
    pub artifact: Option<ArtifactView>,
    pub notifications: Vec<Notification>,
}
