// Configuration file loading

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the service base URL
pub const ENV_BASE_URL: &str = "REPORT_WORKFLOW_BASE_URL";
/// Environment variable overriding the request timeout (seconds)
pub const ENV_TIMEOUT_SECS: &str = "REPORT_WORKFLOW_TIMEOUT_SECS";

/// Workflow configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Base URL all report endpoints are relative to
    #[serde(rename = "baseUrl", alias = "base_url", default = "default_base_url")]
    pub base_url: String,
    /// Whole-request timeout; finalize can take a while on large uploads
    #[serde(rename = "requestTimeoutSecs", alias = "request_timeout_secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(rename = "connectTimeoutSecs", alias = "connect_timeout_secs", default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Label that index-0 defaults are re-pointed to; `None` disables the heuristic
    #[serde(rename = "defaultOptionLabel", alias = "default_option_label", default = "default_option_label")]
    pub default_option_label: Option<String>,
    /// Maximum characters of raw error text surfaced to the user
    #[serde(rename = "errorTextLimit", alias = "error_text_limit", default = "default_error_text_limit")]
    pub error_text_limit: usize,
    /// Known report kinds
    #[serde(default = "default_reports")]
    pub reports: Vec<ReportDefinition>,
}

fn default_base_url() -> String { "http://127.0.0.1:8000/api".to_string() }
fn default_request_timeout() -> u64 { 120 }
fn default_connect_timeout() -> u64 { 10 }
fn default_option_label() -> Option<String> { Some("オネスト".to_string()) }
fn default_error_text_limit() -> usize { 200 }

fn default_reports() -> Vec<ReportDefinition> {
    vec![
        ReportDefinition {
            key: "shipping_ledger".to_string(),
            endpoint: "reports/shipping-ledger".to_string(),
            required_inputs: vec!["shipments".to_string(), "vendors".to_string()],
            interactive: true,
            report_type: None,
        },
        ReportDefinition {
            key: "sales_ledger".to_string(),
            endpoint: "reports/generate".to_string(),
            required_inputs: vec!["sales".to_string()],
            interactive: false,
            report_type: Some("sales_ledger".to_string()),
        },
    ]
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            default_option_label: default_option_label(),
            error_text_limit: default_error_text_limit(),
            reports: default_reports(),
        }
    }
}

impl WorkflowConfig {
    /// Look up a report definition by key
    pub fn report(&self, key: &str) -> Option<&ReportDefinition> {
        self.reports.iter().find(|r| r.key == key)
    }

    /// Apply environment overrides through an injectable lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            log::debug!("Base URL overridden from {}", ENV_BASE_URL);
            self.base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(e) => log::warn!("Ignoring invalid {}={:?}: {}", ENV_TIMEOUT_SECS, raw, e),
            }
        }
    }
}

/// One report kind the service can generate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDefinition {
    /// Stable report key, also used in artifact file names
    pub key: String,
    /// Endpoint path relative to the base URL
    pub endpoint: String,
    /// Input categories; exactly one file is uploaded per category
    #[serde(rename = "requiredInputs", alias = "required_inputs", default)]
    pub required_inputs: Vec<String>,
    /// Whether vendor negotiation is expected
    #[serde(default)]
    pub interactive: bool,
    /// Discriminator sent with the auto-path upload
    #[serde(rename = "reportType", alias = "report_type", default)]
    pub report_type: Option<String>,
}

impl ReportDefinition {
    fn base(&self, base_url: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.endpoint.trim_matches('/')
        )
    }

    pub fn start_url(&self, base_url: &str) -> String {
        self.base(base_url)
    }

    pub fn apply_url(&self, base_url: &str) -> String {
        format!("{}/apply", self.base(base_url))
    }

    pub fn finalize_url(&self, base_url: &str) -> String {
        format!("{}/finalize", self.base(base_url))
    }
}

/// Config loader
pub struct ConfigLoader {
    /// Config file path
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader pointing at the per-user config file
    pub fn new() -> Self {
        Self {
            path: Self::get_default_config_path(),
        }
    }

    /// Use an explicit config file instead of the per-user one
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    /// Get the per-user config path
    fn get_default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("report-workflow").join("config.toml"))
    }

    /// Get the configured path
    pub fn config_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load config from the file, if present
    pub fn load_file(&self) -> Result<Option<WorkflowConfig>> {
        match self.path {
            Some(ref path) => self.load_from_path(path),
            None => Ok(None),
        }
    }

    /// Load config from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<Option<WorkflowConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: WorkflowConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;

        validate_config(&config)?;

        Ok(Some(config))
    }

    /// Defaults, then the config file, then environment overrides
    pub fn load(&self) -> Result<WorkflowConfig> {
        let mut config = match self.load_file()? {
            Some(config) => {
                log::info!(
                    "Loaded workflow config from {}",
                    self.path.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
                );
                config
            }
            None => WorkflowConfig::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        validate_config(&config)?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate config values
pub fn validate_config(config: &WorkflowConfig) -> Result<()> {
    if config.base_url.trim().is_empty() {
        return Err(anyhow!("baseUrl must not be empty"));
    }

    if config.request_timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(anyhow!("timeouts must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for report in &config.reports {
        if report.key.trim().is_empty() {
            return Err(anyhow!("report key must not be empty"));
        }
        if !seen.insert(report.key.as_str()) {
            return Err(anyhow!("duplicate report key '{}'", report.key));
        }
    }

    Ok(())
}
