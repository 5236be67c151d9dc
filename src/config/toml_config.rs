use crate::core::query::DEFAULT_TEMPLATE;
use crate::core::ConfigProvider;
use crate::domain::model::{
    ExtractionBackend, ExtractionSettings, SearchBackend, SearchSettings,
};
use crate::utils::error::{LookupError, Result};
use crate::utils::logger::LOG_LEVELS;
use crate::utils::validation::{
    validate_path, validate_positive_number, validate_query_template, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub lookup: LookupConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub input_file: Option<String>,
    pub sheet_url: Option<String>,
    pub credentials: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub template: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub backend: SearchBackend,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub concurrent_requests: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub backend: ExtractionBackend,
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub classifier_model: Option<String>,
    pub summarizer_model: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_path: String,
    #[serde(default)]
    pub bundle: bool,
    #[serde(default)]
    pub sync_to_sheet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
}

/// `${VAR}` left untouched when `VAR` is unset.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    })
    .into_owned()
}

/// An unresolved `${VAR}` or an empty string counts as unset.
fn resolved(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .filter(|v| !v.is_empty() && !(v.starts_with("${") && v.ends_with('}')))
        .map(str::to_string)
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(LookupError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| LookupError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn validate_config(&self) -> Result<()> {
        crate::config::validate_source(self)?;
        validate_query_template("query.template", &self.query.template)?;
        validate_path("output.output_path", &self.output.output_path)?;

        if let Some(concurrent) = self.search.concurrent_requests {
            validate_positive_number("search.concurrent_requests", concurrent, 1)?;
        }
        if let Some(endpoint) = &self.search.endpoint {
            validate_url("search.endpoint", endpoint)?;
        }
        if let Some(endpoint) = &self.extraction.endpoint {
            validate_url("extraction.endpoint", endpoint)?;
        }
        if let Some(level) = self.log_level() {
            if !LOG_LEVELS.contains(&level) {
                return Err(LookupError::ConfigValidationError {
                    field: "monitoring.log_level".to_string(),
                    message: format!(
                        "unknown log level '{}', expected one of {}",
                        level,
                        LOG_LEVELS.join(", ")
                    ),
                });
            }
        }
        if self.search.backend == SearchBackend::Tavily && resolved(&self.search.api_key).is_none()
        {
            return Err(LookupError::MissingConfigError {
                field: "search.api_key".to_string(),
            });
        }

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.monitoring.as_ref().and_then(|m| m.log_level.as_deref())
    }
}

impl ConfigProvider for TomlConfig {
    fn input_file(&self) -> Option<&str> {
        self.source.input_file.as_deref()
    }

    fn sheet_url(&self) -> Option<&str> {
        self.source.sheet_url.as_deref()
    }

    fn credentials_path(&self) -> Option<&str> {
        self.source.credentials.as_deref()
    }

    fn entity_column(&self) -> Option<&str> {
        Some(&self.source.column)
    }

    fn query_template(&self) -> &str {
        &self.query.template
    }

    fn output_path(&self) -> &str {
        &self.output.output_path
    }

    fn sync_to_sheet(&self) -> bool {
        self.output.sync_to_sheet
    }

    fn bundle_output(&self) -> bool {
        self.output.bundle
    }

    fn search_settings(&self) -> SearchSettings {
        let defaults = SearchSettings::default();
        SearchSettings {
            backend: self.search.backend,
            endpoint: self.search.endpoint.clone(),
            api_key: resolved(&self.search.api_key),
            concurrent_requests: self
                .search
                .concurrent_requests
                .unwrap_or(defaults.concurrent_requests),
            timeout_seconds: self.search.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            retry_attempts: self.search.retry_attempts.unwrap_or(defaults.retry_attempts),
            max_results: self.search.max_results.unwrap_or(defaults.max_results),
        }
    }

    fn extraction_settings(&self) -> ExtractionSettings {
        let defaults = ExtractionSettings::default();
        ExtractionSettings {
            backend: self.extraction.backend,
            endpoint: self.extraction.endpoint.clone(),
            api_token: resolved(&self.extraction.api_token),
            classifier_model: self.extraction.classifier_model.clone(),
            summarizer_model: self.extraction.summarizer_model.clone(),
            timeout_seconds: self
                .extraction
                .timeout_seconds
                .unwrap_or(defaults.timeout_seconds),
        }
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
