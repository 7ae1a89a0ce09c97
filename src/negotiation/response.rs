// Response classification and error-detail extraction

use serde_json::Value;

use crate::archive::{looks_like_archive, looks_like_pdf};
use crate::error::{WorkflowError, GENERIC_REJECTION_MESSAGE};
use crate::utils::truncate_chars;

/// A success body, classified once at the network boundary
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Archive(Vec<u8>),
    Document(Vec<u8>),
}

fn is_archive_content_type(content_type: &str) -> bool {
    content_type.contains("zip") || content_type.contains("octet-stream")
}

/// Classify a 2xx body by content type, falling back to magic bytes.
pub fn classify_body(content_type: Option<&str>, bytes: Vec<u8>) -> Result<ResponseBody, WorkflowError> {
    let content_type = content_type.unwrap_or("").to_ascii_lowercase();

    if content_type.contains("json") {
        return serde_json::from_slice(&bytes)
            .map(ResponseBody::Json)
            .map_err(|e| WorkflowError::UnexpectedResponse(format!("Invalid JSON body: {}", e)));
    }
    if content_type.contains("pdf") || looks_like_pdf(&bytes) {
        return Ok(ResponseBody::Document(bytes));
    }
    if is_archive_content_type(&content_type) || looks_like_archive(&bytes) {
        return Ok(ResponseBody::Archive(bytes));
    }

    // Some deployments omit the content type on JSON replies
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) if value.is_object() => Ok(ResponseBody::Json(value)),
        _ => Err(WorkflowError::UnexpectedResponse(format!(
            "Unsupported response body (content type {:?}, {} bytes)",
            content_type,
            bytes.len()
        ))),
    }
}

/// Render a `detail` value: plain strings, FastAPI-style `[{msg}]` lists or
/// nested `{message}` objects.
fn detail_text(detail: &Value) -> Option<String> {
    match detail {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(obj) => obj
                        .get("msg")
                        .or_else(|| obj.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        Value::Object(obj) => obj
            .get("message")
            .or_else(|| obj.get("detail"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn hint_text(body: &Value) -> Option<String> {
    body.get("hint")
        .or_else(|| body.get("detail").and_then(|d| d.get("hint")))
        .and_then(Value::as_str)
        .filter(|h| !h.trim().is_empty())
        .map(str::to_string)
}

/// Message and hint from a structured error body, if it has one.
pub fn structured_error(body: &Value) -> Option<(String, Option<String>)> {
    let message = body
        .get("detail")
        .and_then(detail_text)
        .or_else(|| {
            body.get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())
                .map(str::to_string)
        })?;
    Some((message, hint_text(body)))
}

/// Build a rejection from a non-2xx body.
///
/// Extraction order: JSON `detail`, JSON `message`, raw text truncated to
/// `text_limit` characters, then a generic message.
pub fn rejection_from_body(status: u16, bytes: &[u8], text_limit: usize) -> WorkflowError {
    if let Ok(body) = serde_json::from_slice::<Value>(bytes) {
        if let Some((message, hint)) = structured_error(&body) {
            return WorkflowError::RemoteRejection {
                status,
                message,
                hint,
            };
        }
    }

    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let message = if text.is_empty() {
        format!("{} (HTTP {})", GENERIC_REJECTION_MESSAGE, status)
    } else {
        truncate_chars(text, text_limit)
    };

    WorkflowError::RemoteRejection {
        status,
        message,
        hint: None,
    }
}

/// A 2xx JSON body can still carry `status: "error"`.
pub fn ensure_not_error_status(status: u16, body: &Value) -> Result<(), WorkflowError> {
    if body.get("status").and_then(Value::as_str) != Some("error") {
        return Ok(());
    }

    let (message, hint) = structured_error(body)
        .unwrap_or_else(|| (GENERIC_REJECTION_MESSAGE.to_string(), hint_text(body)));
    Err(WorkflowError::RemoteRejection {
        status,
        message,
        hint,
    })
}
