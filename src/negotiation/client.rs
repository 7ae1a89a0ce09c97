// HTTP implementation of the negotiation exchange

use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::normalize::DefaultLabelPolicy;
use super::response::{classify_body, ensure_not_error_status, rejection_from_body, ResponseBody};
use super::{parse_descriptor, parse_start_json, validate_uploads, ArtifactBody, NegotiationApi, NegotiationResult};
use crate::config::{ReportDefinition, WorkflowConfig};
use crate::error::WorkflowError;
use crate::models::{SelectionSummary, SessionData, UploadFile};
use crate::utils::resolve_url;

/// Form field carrying the report-type discriminator
pub const REPORT_TYPE_FIELD: &str = "report_type";

/// A successful HTTP exchange
struct RawResponse {
    status: u16,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Report service client
#[derive(Debug, Clone)]
pub struct NegotiationClient {
    http: reqwest::Client,
    base_url: String,
    error_text_limit: usize,
    policy: DefaultLabelPolicy,
}

impl NegotiationClient {
    /// Create a client from configuration
    pub fn new(config: &WorkflowConfig) -> Result<Self, WorkflowError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(concat!("report-workflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WorkflowError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_http_client(http, config))
    }

    /// Create a client around an existing `reqwest::Client`
    pub fn with_http_client(http: reqwest::Client, config: &WorkflowConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            error_text_limit: config.error_text_limit,
            policy: DefaultLabelPolicy::new(config.default_option_label.clone()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> &DefaultLabelPolicy {
        &self.policy
    }

    /// Send a request and turn transport failures and non-2xx statuses into errors.
    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<RawResponse, WorkflowError> {
        let response = request.send().await.map_err(|e| {
            log::error!("{} request failed: {}", operation, e);
            WorkflowError::Network(format!("{} request failed: {}", operation, e))
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(|e| {
            log::error!("Failed to read {} response: {}", operation, e);
            WorkflowError::Network(format!("Failed to read {} response: {}", operation, e))
        })?;

        if !status.is_success() {
            let err = rejection_from_body(status.as_u16(), &bytes, self.error_text_limit);
            log::warn!("{} rejected with HTTP {}: {}", operation, status.as_u16(), err);
            return Err(err);
        }

        Ok(RawResponse {
            status: status.as_u16(),
            content_type,
            bytes: bytes.to_vec(),
        })
    }

    fn build_form(report: &ReportDefinition, files: &[UploadFile]) -> Result<Form, WorkflowError> {
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes.clone())
                .file_name(file.file_name.clone())
                .mime_str("text/csv")
                .map_err(|e| WorkflowError::Validation(format!("Invalid upload {}: {}", file.file_name, e)))?;
            form = form.part(file.category.clone(), part);
        }
        if let Some(ref report_type) = report.report_type {
            form = form.text(REPORT_TYPE_FIELD, report_type.clone());
        }
        Ok(form)
    }
}

impl NegotiationApi for NegotiationClient {
    async fn start(
        &self,
        report: &ReportDefinition,
        files: &[UploadFile],
    ) -> Result<NegotiationResult, WorkflowError> {
        validate_uploads(report, files)?;
        let form = Self::build_form(report, files)?;
        let url = report.start_url(&self.base_url);

        log::info!(
            "Uploading {} file(s) for report {} to {}",
            files.len(),
            report.key,
            url
        );

        let raw = self
            .send(self.http.post(&url).multipart(form), "start")
            .await?;

        match classify_body(raw.content_type.as_deref(), raw.bytes)? {
            ResponseBody::Json(body) => {
                let result = parse_start_json(raw.status, &body, &self.policy)?;
                if let NegotiationResult::Negotiable { ref session, ref rows } = result {
                    log::info!(
                        "Report {} session {} returned {} negotiable row(s)",
                        report.key,
                        session.session_id,
                        rows.len()
                    );
                }
                Ok(result)
            }
            ResponseBody::Archive(bytes) => Ok(NegotiationResult::DirectArtifact(ArtifactBody::Archive(bytes))),
            ResponseBody::Document(bytes) => Ok(NegotiationResult::DirectArtifact(ArtifactBody::Document(bytes))),
        }
    }

    async fn apply(
        &self,
        report: &ReportDefinition,
        session: &SessionData,
        selections: &BTreeMap<String, String>,
    ) -> Result<SelectionSummary, WorkflowError> {
        if selections.is_empty() {
            return Err(WorkflowError::Validation(
                "No selections to apply".to_string(),
            ));
        }

        let body = apply_request_body(session, selections);
        log::info!(
            "Applying {} selection(s) for report {} session {}",
            selections.len(),
            report.key,
            session.session_id
        );

        let raw = self
            .send(self.http.post(report.apply_url(&self.base_url)).json(&body), "apply")
            .await?;

        match classify_body(raw.content_type.as_deref(), raw.bytes)? {
            ResponseBody::Json(body) => {
                ensure_not_error_status(raw.status, &body)?;
                let raw_summary = body.get("selection_summary").cloned().unwrap_or(body);
                Ok(SelectionSummary { raw: raw_summary })
            }
            _ => Err(WorkflowError::UnexpectedResponse(
                "apply returned a non-JSON body".to_string(),
            )),
        }
    }

    async fn finalize(
        &self,
        report: &ReportDefinition,
        session: &SessionData,
    ) -> Result<ArtifactBody, WorkflowError> {
        let body = json!({ "session_id": session.session_id });
        log::info!(
            "Finalizing report {} session {}",
            report.key,
            session.session_id
        );

        let raw = self
            .send(self.http.post(report.finalize_url(&self.base_url)).json(&body), "finalize")
            .await?;

        match classify_body(raw.content_type.as_deref(), raw.bytes)? {
            ResponseBody::Json(body) => {
                ensure_not_error_status(raw.status, &body)?;
                Ok(ArtifactBody::Descriptor(parse_descriptor(&body)))
            }
            ResponseBody::Archive(bytes) => Ok(ArtifactBody::Archive(bytes)),
            ResponseBody::Document(bytes) => Ok(ArtifactBody::Document(bytes)),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, WorkflowError> {
        let url = resolve_url(&self.base_url, url);
        log::debug!("Downloading artifact part from {}", url);
        let raw = self.send(self.http.get(&url), "download").await?;
        Ok(raw.bytes)
    }
}

/// Shape of the apply request body, exposed for mock services and tests
pub fn apply_request_body(session: &SessionData, selections: &BTreeMap<String, String>) -> Value {
    json!({
        "session_id": session.session_id,
        "selections": selections,
    })
}
