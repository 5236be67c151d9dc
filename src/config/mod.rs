pub mod cli;
pub mod toml_config;

use crate::core::query::DEFAULT_TEMPLATE;
use crate::core::ConfigProvider;
use crate::domain::model::{
    ExtractionBackend, ExtractionSettings, SearchBackend, SearchSettings,
};
use crate::utils::error::{LookupError, Result};
use crate::utils::validation::{
    validate_path, validate_positive_number, validate_query_template, validate_sheet_url,
    Validate,
};
#[cfg(feature = "cli")]
use clap::Parser;
use serde::{Deserialize, Serialize};

pub const SEARCH_API_KEY_ENV: &str = "TAVILY_API_KEY";
pub const INFERENCE_TOKEN_ENV: &str = "HF_API_TOKEN";

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "entity-lookup")]
#[command(about = "Look up contact details for every entity in a CSV file or Google Sheet")]
pub struct CliConfig {
    #[arg(long, help = "CSV file to read entities from")]
    pub input_file: Option<String>,

    #[arg(long, help = "Google Sheet URL to read entities from (or sync results to)")]
    pub sheet_url: Option<String>,

    #[arg(long, default_value = "credentials.json")]
    pub credentials: String,

    #[arg(long, help = "Column holding the entity names")]
    pub column: Option<String>,

    #[arg(long, default_value = DEFAULT_TEMPLATE)]
    pub template: String,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, default_value = "5")]
    pub concurrent_requests: usize,

    #[arg(long, default_value = "placeholder")]
    pub search_backend: SearchBackend,

    #[arg(long)]
    pub search_endpoint: Option<String>,

    #[arg(long, default_value = "pattern")]
    pub extraction_backend: ExtractionBackend,

    #[arg(long)]
    pub inference_endpoint: Option<String>,

    #[arg(long, help = "Overwrite the first worksheet of --sheet-url with the results")]
    pub sync: bool,

    #[arg(long, help = "Also write a zip bundle of every export")]
    pub bundle: bool,

    #[arg(long, help = "Only print the query preview")]
    pub dry_run: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per stage")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn input_file(&self) -> Option<&str> {
        self.input_file.as_deref()
    }

    fn sheet_url(&self) -> Option<&str> {
        self.sheet_url.as_deref()
    }

    fn credentials_path(&self) -> Option<&str> {
        Some(&self.credentials)
    }

    fn entity_column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    fn query_template(&self) -> &str {
        &self.template
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn sync_to_sheet(&self) -> bool {
        self.sync
    }

    fn bundle_output(&self) -> bool {
        self.bundle
    }

    fn search_settings(&self) -> SearchSettings {
        SearchSettings {
            backend: self.search_backend,
            endpoint: self.search_endpoint.clone(),
            api_key: std::env::var(SEARCH_API_KEY_ENV).ok(),
            concurrent_requests: self.concurrent_requests,
            ..SearchSettings::default()
        }
    }

    fn extraction_settings(&self) -> ExtractionSettings {
        ExtractionSettings {
            backend: self.extraction_backend,
            endpoint: self.inference_endpoint.clone(),
            api_token: std::env::var(INFERENCE_TOKEN_ENV).ok(),
            ..ExtractionSettings::default()
        }
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_source(self)?;
        validate_query_template("template", &self.template)?;
        validate_path("output_path", &self.output_path)?;
        validate_positive_number("concurrent_requests", self.concurrent_requests, 1)?;
        Ok(())
    }
}

/// Checks the source and sync settings shared by every config front end.
pub fn validate_source<C: ConfigProvider + ?Sized>(config: &C) -> Result<()> {
    if config.source_descriptor().is_none() {
        return Err(LookupError::MissingConfigError {
            field: "input_file or sheet_url".to_string(),
        });
    }
    if let Some(path) = config.input_file().filter(|p| !p.is_empty()) {
        validate_path("input_file", path)?;
    }
    if let Some(url) = config.sheet_url().filter(|u| !u.is_empty()) {
        validate_sheet_url("sheet_url", url)?;
    }
    if config.sync_to_sheet() && config.sheet_url().map_or(true, str::is_empty) {
        return Err(LookupError::ConfigValidationError {
            field: "sync".to_string(),
            message: "syncing results requires a sheet URL".to_string(),
        });
    }
    if config.entity_column().map_or(true, str::is_empty) {
        return Err(LookupError::MissingConfigError {
            field: "column".to_string(),
        });
    }
    Ok(())
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let config = CliConfig::parse_from([
            "entity-lookup",
            "--input-file",
            "companies.csv",
            "--column",
            "name",
        ]);

        assert_eq!(config.query_template(), DEFAULT_TEMPLATE);
        assert_eq!(config.output_path(), "./output");
        assert_eq!(config.credentials_path(), Some("credentials.json"));
        assert_eq!(config.search_settings().backend, SearchBackend::Placeholder);
        assert_eq!(config.extraction_settings().backend, ExtractionBackend::Pattern);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_backends_parse() {
        let config = CliConfig::parse_from([
            "entity-lookup",
            "--sheet-url",
            "https://docs.google.com/spreadsheets/d/abc123/edit",
            "--column",
            "name",
            "--search-backend",
            "tavily",
            "--extraction-backend",
            "huggingface",
            "--sync",
        ]);

        assert_eq!(config.search_backend, SearchBackend::Tavily);
        assert_eq!(config.extraction_backend, ExtractionBackend::HuggingFace);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_requires_source_and_column() {
        let no_source = CliConfig::parse_from(["entity-lookup", "--column", "name"]);
        assert!(matches!(
            no_source.validate(),
            Err(LookupError::MissingConfigError { .. })
        ));

        let no_column = CliConfig::parse_from(["entity-lookup", "--input-file", "a.csv"]);
        assert!(no_column.validate().is_err());
    }

    #[test]
    fn test_cli_rejects_template_without_token() {
        let config = CliConfig::parse_from([
            "entity-lookup",
            "--input-file",
            "a.csv",
            "--column",
            "name",
            "--template",
            "email address of",
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sync_requires_sheet_url() {
        let config = CliConfig::parse_from([
            "entity-lookup",
            "--input-file",
            "a.csv",
            "--column",
            "name",
            "--sync",
        ]);
        assert!(matches!(
            config.validate(),
            Err(LookupError::ConfigValidationError { .. })
        ));
    }
}
