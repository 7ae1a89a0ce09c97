//! Artifact archive decoding
//!
//! The report service bundles its output as a zip archive holding at most one
//! spreadsheet and one printable document. Decoding picks the first entry of
//! each kind, checks the document's `%PDF` signature (a mismatch is flagged,
//! not fatal) and allocates exactly one preview handle for the document.

pub mod resource;

pub use resource::{Blob, PreviewHandle, PreviewRegistry, Resource};

use std::io::{Cursor, Read};

use crate::error::{ArtifactPartKind, IntegrityWarning, WorkflowError};

/// Leading bytes of every valid PDF
pub const PDF_SIGNATURE: &[u8; 4] = b"%PDF";

/// Leading bytes of a zip local file header
pub const ZIP_SIGNATURE: &[u8; 4] = b"PK\x03\x04";

/// File extensions treated as the spreadsheet part (matched case-insensitively)
pub const SPREADSHEET_EXTENSIONS: &[&str] = &[".xlsx", ".xlsm", ".xls"];

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Raw entries pulled out of an archive, before any handle is allocated
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractedParts {
    pub spreadsheet: Option<(String, Vec<u8>)>,
    pub document: Option<(String, Vec<u8>)>,
}

/// Decoded artifact: blobs, the document preview handle and integrity flags
#[derive(Debug, Default)]
pub struct ArtifactParts {
    pub spreadsheet: Option<Blob>,
    pub document: Option<Blob>,
    /// Owned by whoever holds the parts; released on drop
    pub document_preview: Option<PreviewHandle>,
    pub warnings: Vec<IntegrityWarning>,
}

impl ArtifactParts {
    /// Whether at least one part can be handed to the user
    pub fn is_usable(&self) -> bool {
        self.spreadsheet.is_some() || self.document.is_some()
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.document_preview.as_ref().map(|h| h.get().as_str())
    }

    pub fn is_suspect(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Revoke the preview handle now instead of at drop
    pub fn release(mut self) {
        if let Some(handle) = self.document_preview.take() {
            handle.release();
        }
    }
}

fn is_spreadsheet_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    SPREADSHEET_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn is_document_name(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

fn base_name(entry_name: &str) -> String {
    entry_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(entry_name)
        .to_string()
}

/// Whether a body looks like a zip archive
pub fn looks_like_archive(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_SIGNATURE)
}

/// Whether a body looks like a PDF document
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_SIGNATURE)
}

/// Initial buffer size for an entry. The declared size comes from the sender,
/// so it never exceeds the length of the archive itself.
fn entry_capacity(declared_size: u64, archive_len: usize) -> usize {
    usize::try_from(declared_size)
        .unwrap_or(usize::MAX)
        .min(archive_len)
}

/// Pull the first spreadsheet and first PDF entry out of a zip archive.
pub fn extract_parts(bytes: &[u8]) -> Result<ExtractedParts, WorkflowError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut parts = ExtractedParts::default();

    for i in 0..archive.len() {
        if parts.spreadsheet.is_some() && parts.document.is_some() {
            break;
        }

        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        // Resource forks added by macOS archivers
        if name.starts_with("__MACOSX/") {
            continue;
        }

        let wants_spreadsheet = parts.spreadsheet.is_none() && is_spreadsheet_name(&name);
        let wants_document = parts.document.is_none() && is_document_name(&name);
        if !wants_spreadsheet && !wants_document {
            log::debug!("Skipping archive entry {}", name);
            continue;
        }

        let mut data = Vec::with_capacity(entry_capacity(entry.size(), bytes.len()));
        entry
            .read_to_end(&mut data)
            .map_err(|e| WorkflowError::ArchiveFormat(format!("Failed to read {}: {}", name, e)))?;

        if wants_spreadsheet {
            parts.spreadsheet = Some((base_name(&name), data));
        } else {
            parts.document = Some((base_name(&name), data));
        }
    }

    Ok(parts)
}

/// Check the `%PDF` signature, returning a warning on mismatch.
pub fn check_pdf_signature(file_name: &str, bytes: &[u8]) -> Option<IntegrityWarning> {
    if looks_like_pdf(bytes) {
        return None;
    }

    let head = &bytes[..bytes.len().min(PDF_SIGNATURE.len())];
    Some(IntegrityWarning {
        part: ArtifactPartKind::Document,
        file_name: file_name.to_string(),
        expected: String::from_utf8_lossy(PDF_SIGNATURE).into_owned(),
        found: String::from_utf8_lossy(head).into_owned(),
    })
}

/// Turns artifact bodies into [`ArtifactParts`], allocating preview handles
/// from a shared registry.
#[derive(Debug, Clone, Default)]
pub struct ArchiveDecoder {
    previews: PreviewRegistry,
}

impl ArchiveDecoder {
    pub fn new(previews: PreviewRegistry) -> Self {
        Self { previews }
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Decode an archive body synchronously.
    pub fn decode(&self, bytes: &[u8]) -> Result<ArtifactParts, WorkflowError> {
        let extracted = extract_parts(bytes)?;
        Ok(self.register(extracted))
    }

    /// Decode an archive body off the async executor.
    pub async fn decode_async(&self, bytes: Vec<u8>) -> Result<ArtifactParts, WorkflowError> {
        let extracted = tokio::task::spawn_blocking(move || extract_parts(&bytes))
            .await
            .map_err(|e| WorkflowError::ArchiveFormat(format!("Decoder task failed: {}", e)))??;
        Ok(self.register(extracted))
    }

    /// Wrap a document delivered directly (not inside an archive).
    pub fn document(&self, file_name: &str, bytes: Vec<u8>) -> ArtifactParts {
        self.register(ExtractedParts {
            spreadsheet: None,
            document: Some((file_name.to_string(), bytes)),
        })
    }

    /// Build parts from already-separated payloads (descriptor path).
    pub fn assemble(
        &self,
        spreadsheet: Option<(String, Vec<u8>)>,
        document: Option<(String, Vec<u8>)>,
    ) -> ArtifactParts {
        self.register(ExtractedParts {
            spreadsheet,
            document,
        })
    }

    fn register(&self, extracted: ExtractedParts) -> ArtifactParts {
        let mut parts = ArtifactParts::default();

        if let Some((name, data)) = extracted.spreadsheet {
            parts.spreadsheet = Some(Blob::new(data, XLSX_CONTENT_TYPE, name));
        }

        if let Some((name, data)) = extracted.document {
            if let Some(warning) = check_pdf_signature(&name, &data) {
                log::warn!("Artifact integrity warning: {}", warning);
                parts.warnings.push(warning);
            }
            let blob = Blob::new(data, PDF_CONTENT_TYPE, name);
            parts.document_preview = Some(self.previews.create(&blob));
            parts.document = Some(blob);
        }

        parts
    }
}
