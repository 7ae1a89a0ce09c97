// Data models shared by the negotiation client, selection store and controllers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vendor code as sent by the service (historically both strings and numbers)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VendorCode {
    Number(i64),
    Text(String),
}

impl Default for VendorCode {
    fn default() -> Self {
        VendorCode::Text(String::new())
    }
}

impl fmt::Display for VendorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendorCode::Number(n) => write!(f, "{}", n),
            VendorCode::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One negotiable line item, immutable after normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRow {
    pub entry_id: String,
    pub vendor_code: VendorCode,
    pub vendor_name: String,
    pub item_name: String,
    pub detail: Option<String>,
    /// Candidate labels in server order; duplicates are kept
    pub options: Vec<String>,
    /// Always within `[0, options.len() - 1]`, or 0 when there are no options
    pub initial_index: usize,
}

/// A selectable option derived from a candidate label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionChoice {
    /// Position of the label in the row's option list
    pub code: usize,
    pub label: String,
}

/// A candidate row prepared for user selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveItem {
    pub id: String,
    pub options: Vec<OptionChoice>,
    pub initial_selection_index: usize,
    /// Original row carried through for submission fidelity
    pub source: CandidateRow,
}

impl InteractiveItem {
    pub fn from_row(row: CandidateRow) -> Self {
        let options = row
            .options
            .iter()
            .enumerate()
            .map(|(code, label)| OptionChoice {
                code,
                label: label.clone(),
            })
            .collect();

        Self {
            id: row.entry_id.clone(),
            options,
            initial_selection_index: row.initial_index,
            source: row,
        }
    }

    /// Items without options never need a choice
    pub fn requires_selection(&self) -> bool {
        !self.options.is_empty()
    }

    /// Clamp an index into this item's option range
    pub fn clamp_index(&self, index: usize) -> usize {
        if self.options.is_empty() {
            0
        } else {
            index.min(self.options.len() - 1)
        }
    }

    pub fn label_at(&self, index: usize) -> Option<&str> {
        self.options.get(index).map(|o| o.label.as_str())
    }
}

/// The user's current choice for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub index: usize,
    pub label: String,
}

/// Server-held negotiation context threading apply and finalize together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub session_id: String,
}

impl SessionData {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }
}

/// One uploaded source file, tagged with the input category it fills
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub category: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(
        category: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            category: category.into(),
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// One entry of the submission payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionEntry {
    pub entry_id: String,
    pub transport_vendor: String,
}

/// Server acknowledgement of an `apply` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSummary {
    /// `selection_summary` as returned; its inner shape is owned by the service
    pub raw: serde_json::Value,
}

impl SelectionSummary {
    /// Number of applied entries when the summary is a map or list
    pub fn applied_count(&self) -> Option<usize> {
        match &self.raw {
            serde_json::Value::Object(map) => Some(map.len()),
            serde_json::Value::Array(items) => Some(items.len()),
            _ => None,
        }
    }
}

/// Artifact descriptor returned by `finalize` when the body is JSON
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub spreadsheet_url: Option<String>,
    pub report_key: Option<String>,
    pub report_date: Option<String>,
    /// Spreadsheet embedded as base64
    pub spreadsheet_base64: Option<String>,
    /// Printable document embedded as base64
    pub document_base64: Option<String>,
    pub hint: Option<String>,
}
