use crate::core::collector::search_service_from;
use crate::core::extractor::extraction_service_from;
use crate::core::session::{LookupSession, Stage};
use crate::core::sheets::SheetsClient;
use crate::core::sink::CsvExporter;
use crate::core::{
    ConfigProvider, ExtractionRecord, ExtractionService, Query, SearchService, SourceDescriptor,
    Storage,
};
use crate::utils::error::{LookupError, Result};
use crate::utils::monitor::SystemMonitor;
use std::path::Path;
use std::sync::Arc;

/// Outcome of a non-interactive run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub rows_loaded: usize,
    pub queries: usize,
    pub records: Vec<ExtractionRecord>,
    pub files_written: Vec<String>,
    pub synced: bool,
    /// Set when the sheet sync was requested and failed.
    pub sync_error: Option<String>,
}

/// Drives a [`LookupSession`] from start to finish using a config.
pub struct LookupEngine<C: ConfigProvider, S: Storage> {
    config: C,
    exporter: CsvExporter<S>,
    search: Arc<dyn SearchService>,
    extraction: Arc<dyn ExtractionService>,
    sheets: Option<Arc<SheetsClient>>,
    monitor: SystemMonitor,
}

impl<C: ConfigProvider, S: Storage> LookupEngine<C, S> {
    pub fn from_config(config: C, storage: S) -> Result<Self> {
        let search = search_service_from(&config.search_settings())?;
        let extraction = extraction_service_from(&config.extraction_settings())?;
        let sheets = Self::sheets_client(&config)?;
        let exporter =
            CsvExporter::new(storage, config.output_path()).with_bundle(config.bundle_output());

        tracing::debug!(
            "Engine ready: search={}, extraction={}, sheets={}",
            search.name(),
            extraction.name(),
            sheets.is_some()
        );

        Ok(Self {
            config,
            exporter,
            search,
            extraction,
            sheets,
            monitor: SystemMonitor::new(false),
        })
    }

    fn sheets_client(config: &C) -> Result<Option<Arc<SheetsClient>>> {
        let reads_sheet = matches!(config.source_descriptor(), Some(SourceDescriptor::Sheet(_)));
        if !reads_sheet && !config.sync_to_sheet() {
            return Ok(None);
        }

        match config.credentials_path() {
            Some(path) if Path::new(path).exists() => {
                Ok(Some(Arc::new(SheetsClient::from_credentials_file(path)?)))
            }
            Some(path) => {
                tracing::warn!("⚠️ Credentials file not found: {}", path);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn with_monitor(mut self, monitor: SystemMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_sheets(mut self, sheets: Arc<SheetsClient>) -> Self {
        self.sheets = Some(sheets);
        self
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    fn session(&self) -> LookupSession {
        let session = LookupSession::new(self.search.clone(), self.extraction.clone())
            .with_concurrency(self.config.search_settings().concurrent_requests);
        match &self.sheets {
            Some(sheets) => session.with_sheets(sheets.clone()),
            None => session,
        }
    }

    async fn prepare(&self, session: &mut LookupSession) -> Result<Vec<Query>> {
        let source = self
            .config
            .source_descriptor()
            .ok_or_else(|| LookupError::MissingConfigError {
                field: "input_file or sheet_url".to_string(),
            })?;
        let column = self
            .config
            .entity_column()
            .ok_or_else(|| LookupError::MissingConfigError {
                field: "column".to_string(),
            })?;

        session.load(&source).await?;
        self.monitor.log_stats("Load");

        session.select_column(column)?;
        session.set_template(self.config.query_template())
    }

    /// Loads the source and renders the first few queries without searching.
    pub async fn preview(&self) -> Result<Vec<Query>> {
        let mut session = self.session();
        self.prepare(&mut session).await
    }

    pub async fn run(&self) -> Result<RunReport> {
        tracing::info!("🚀 Starting entity lookup...");
        let mut session = self.session();

        let preview = self.prepare(&mut session).await?;
        for query in &preview {
            tracing::info!("📝 {}", query);
        }
        let rows_loaded = session.table().len();
        let queries = session.queries().len();

        session.search().await?;
        self.monitor.log_stats("Search");

        session
            .extract_with_progress(|done, total| {
                tracing::info!("🧠 Extracted {}/{} records", done, total);
            })
            .await?;
        self.monitor.log_stats("Extract");

        let files_written = session.export(&self.exporter).await?;
        for file in &files_written {
            tracing::info!("💾 Output saved to: {}", file);
        }

        let mut sync_error = None;
        if self.config.sync_to_sheet() {
            let outcome = match self.config.sheet_url().filter(|url| !url.is_empty()) {
                Some(url) => session.sync(url).await,
                None => Err(LookupError::SyncFailure {
                    cause: "no sheet URL configured".to_string(),
                    restored: false,
                }),
            };
            if let Err(e) = outcome {
                tracing::warn!("⚠️ {} ({})", e.user_friendly_message(), e.recovery_suggestion());
                sync_error = Some(e.user_friendly_message());
            }
        }

        self.monitor.log_final_stats();
        tracing::info!("✅ Lookup completed for {} entities", session.extraction_records().len());

        Ok(RunReport {
            rows_loaded,
            queries,
            records: session.extraction_records().to_vec(),
            files_written,
            synced: session.stage() == Stage::Synced,
            sync_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sheets::SheetsAuth;
    use crate::domain::model::{ExtractionSettings, SearchSettings};
    use httpmock::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| LookupError::ValidationError {
                message: format!("File not found: {}", path),
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    struct MockConfig {
        input_file: Option<String>,
        sheet_url: Option<String>,
        column: Option<String>,
        template: String,
        sync: bool,
        search: SearchSettings,
    }

    impl MockConfig {
        fn new(input_file: &str) -> Self {
            Self {
                input_file: Some(input_file.to_string()),
                sheet_url: None,
                column: Some("name".to_string()),
                template: "Get me the email address of {entity}".to_string(),
                sync: false,
                search: SearchSettings::default(),
            }
        }
    }

    impl ConfigProvider for MockConfig {
        fn input_file(&self) -> Option<&str> {
            self.input_file.as_deref()
        }

        fn sheet_url(&self) -> Option<&str> {
            self.sheet_url.as_deref()
        }

        fn credentials_path(&self) -> Option<&str> {
            None
        }

        fn entity_column(&self) -> Option<&str> {
            self.column.as_deref()
        }

        fn query_template(&self) -> &str {
            &self.template
        }

        fn output_path(&self) -> &str {
            "test_output"
        }

        fn sync_to_sheet(&self) -> bool {
            self.sync
        }

        fn bundle_output(&self) -> bool {
            true
        }

        fn search_settings(&self) -> SearchSettings {
            self.search.clone()
        }

        fn extraction_settings(&self) -> ExtractionSettings {
            ExtractionSettings::default()
        }
    }

    fn companies_file() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "name,city\nAcme,Springfield\nGlobex,Cypress Creek\n").unwrap();
        file
    }

    #[tokio::test]
    async fn test_run_with_placeholder_search() {
        let file = companies_file();
        let storage = MockStorage::default();
        let config = MockConfig::new(file.path().to_str().unwrap());
        let engine = LookupEngine::from_config(config, storage.clone()).unwrap();

        let report = engine.run().await.unwrap();

        assert_eq!(report.rows_loaded, 2);
        assert_eq!(report.queries, 2);
        assert_eq!(report.records[0].entity, json!("Acme"));
        assert_eq!(report.records[0].extracted_info, "No email address found.");
        assert_eq!(
            report.files_written,
            vec![
                "test_output/extracted_data.csv".to_string(),
                "test_output/selected_data.csv".to_string(),
                "test_output/lookup_output.zip".to_string(),
            ]
        );
        assert!(!report.synced);
        assert!(report.sync_error.is_none());
        assert!(storage.get_file("lookup_output.zip").await.is_some());
    }

    #[tokio::test]
    async fn test_run_with_tavily_search() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/search")
                .json_body_partial(r#"{"query": "Get me the email address of Acme"}"#);
            then.status(200).json_body(json!({
                "results": [{"title": "Acme", "url": "https://acme.example", "content": "Mail hello@acme.example"}]
            }));
        });
        server.mock(|when, then| {
            when.method(POST)
                .path("/search")
                .json_body_partial(r#"{"query": "Get me the email address of Globex"}"#);
            then.status(200).json_body(json!({"results": []}));
        });

        let file = companies_file();
        let mut config = MockConfig::new(file.path().to_str().unwrap());
        config.search = SearchSettings {
            backend: crate::domain::model::SearchBackend::Tavily,
            endpoint: Some(server.url("/search")),
            api_key: Some("tvly-test".to_string()),
            ..SearchSettings::default()
        };
        let engine = LookupEngine::from_config(config, MockStorage::default()).unwrap();

        let report = engine.run().await.unwrap();

        assert_eq!(report.records[0].extracted_info, "Contact email: hello@acme.example");
        assert_eq!(report.records[1].extracted_info, "No email address found.");
    }

    #[tokio::test]
    async fn test_preview_does_not_search() {
        let file = companies_file();
        let mut config = MockConfig::new(file.path().to_str().unwrap());
        config.template = "{entity} email".to_string();
        let storage = MockStorage::default();
        let engine = LookupEngine::from_config(config, storage.clone()).unwrap();

        let preview = engine.preview().await.unwrap();

        assert_eq!(preview, vec![Query::new("Acme email"), Query::new("Globex email")]);
        assert!(storage.files.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_column_setting() {
        let file = companies_file();
        let mut config = MockConfig::new(file.path().to_str().unwrap());
        config.column = None;
        let engine = LookupEngine::from_config(config, MockStorage::default()).unwrap();

        assert!(matches!(
            engine.run().await,
            Err(LookupError::MissingConfigError { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_source_file() {
        let config = MockConfig::new("/nonexistent/companies.csv");
        let engine = LookupEngine::from_config(config, MockStorage::default()).unwrap();

        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, LookupError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_sync_failure_is_reported_not_fatal() {
        let file = companies_file();
        let mut config = MockConfig::new(file.path().to_str().unwrap());
        config.sync = true;
        config.sheet_url = Some("https://docs.google.com/spreadsheets/d/abc123/edit".to_string());
        let storage = MockStorage::default();
        let sheets = SheetsClient::new(SheetsAuth::AccessToken("t".to_string()))
            .with_base_url("http://127.0.0.1:9/v4");
        let engine = LookupEngine::from_config(config, storage.clone())
            .unwrap()
            .with_sheets(Arc::new(sheets));

        let report = engine.run().await.unwrap();

        assert!(!report.synced);
        assert!(report
            .sync_error
            .as_deref()
            .unwrap()
            .starts_with("Error updating the Google Sheet"));
        assert_eq!(report.records.len(), 2);
        assert!(storage.get_file("extracted_data.csv").await.is_some());
    }

    #[tokio::test]
    async fn test_sync_writes_results() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v4/spreadsheets/abc123");
            then.status(200)
                .json_body(json!({"sheets": [{"properties": {"title": "Sheet1"}}]}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/v4/spreadsheets/abc123/values/'Sheet1'");
            then.status(200).json_body(json!({"range": "Sheet1!A1:Z1000"}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/v4/spreadsheets/abc123/values/'Sheet1':clear");
            then.status(200).json_body(json!({}));
        });
        let update = server.mock(|when, then| {
            when.method(PUT)
                .path("/v4/spreadsheets/abc123/values/'Sheet1'!A1")
                .body_contains("extracted_info");
            then.status(200).json_body(json!({"updatedRows": 3}));
        });

        let file = companies_file();
        let mut config = MockConfig::new(file.path().to_str().unwrap());
        config.sync = true;
        config.sheet_url = Some("https://docs.google.com/spreadsheets/d/abc123/edit".to_string());
        let sheets = SheetsClient::new(SheetsAuth::AccessToken("t".to_string()))
            .with_base_url(server.url("/v4"));
        let engine = LookupEngine::from_config(config, MockStorage::default())
            .unwrap()
            .with_sheets(Arc::new(sheets));

        let report = engine.run().await.unwrap();

        update.assert();
        assert!(report.synced);
        assert!(report.sync_error.is_none());
    }
}
