// Turning a delivered artifact body into usable parts

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::archive::{ArchiveDecoder, ArtifactParts};
use crate::config::ReportDefinition;
use crate::error::WorkflowError;
use crate::models::ArtifactDescriptor;
use crate::negotiation::{ArtifactBody, NegotiationApi};
use crate::utils::sanitize_file_component;

/// Date format used in artifact file names
pub const REPORT_DATE_FORMAT: &str = "%Y%m%d";

/// `{reportKey}_{reportDate}.{extension}`, made safe for file systems.
/// A missing date falls back to today.
pub fn artifact_file_name(report_key: &str, report_date: Option<&str>, extension: &str) -> String {
    let date = match report_date.map(str::trim).filter(|d| !d.is_empty()) {
        Some(date) => date.to_string(),
        None => chrono::Local::now().format(REPORT_DATE_FORMAT).to_string(),
    };
    format!(
        "{}_{}.{}",
        sanitize_file_component(report_key),
        sanitize_file_component(&date),
        extension
    )
}

fn decode_embedded(field: &str, encoded: &str) -> Result<Vec<u8>, WorkflowError> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| WorkflowError::UnexpectedResponse(format!("{} is not valid base64: {}", field, e)))
}

async fn materialize_descriptor<A: NegotiationApi>(
    api: &A,
    decoder: &ArchiveDecoder,
    report: &ReportDefinition,
    descriptor: ArtifactDescriptor,
) -> Result<ArtifactParts, WorkflowError> {
    let key = descriptor.report_key.as_deref().unwrap_or(&report.key);
    let date = descriptor.report_date.as_deref();

    let spreadsheet = match (&descriptor.spreadsheet_base64, &descriptor.spreadsheet_url) {
        (Some(encoded), _) => Some(decode_embedded("xlsx_base64", encoded)?),
        (None, Some(url)) => Some(api.download(url).await?),
        (None, None) => None,
    };
    let document = descriptor
        .document_base64
        .as_deref()
        .map(|encoded| decode_embedded("pdf_base64", encoded))
        .transpose()?;

    Ok(decoder.assemble(
        spreadsheet.map(|bytes| (artifact_file_name(key, date, "xlsx"), bytes)),
        document.map(|bytes| (artifact_file_name(key, date, "pdf"), bytes)),
    ))
}

/// Decode, download or unwrap `body` into artifact parts.
///
/// Fails with [`WorkflowError::EmptyArtifact`] when neither part is present;
/// any preview handle allocated along the way is released by the drop.
pub async fn materialize<A: NegotiationApi>(
    api: &A,
    decoder: &ArchiveDecoder,
    report: &ReportDefinition,
    body: ArtifactBody,
) -> Result<ArtifactParts, WorkflowError> {
    let parts = match body {
        ArtifactBody::Archive(bytes) => decoder.decode_async(bytes).await?,
        ArtifactBody::Document(bytes) => {
            decoder.document(&artifact_file_name(&report.key, None, "pdf"), bytes)
        }
        ArtifactBody::Descriptor(descriptor) => {
            materialize_descriptor(api, decoder, report, descriptor).await?
        }
    };

    if !parts.is_usable() {
        return Err(WorkflowError::EmptyArtifact);
    }
    Ok(parts)
}
