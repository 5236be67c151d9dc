use crate::domain::model::{Classification, ExtractionSettings, Query, SearchSettings};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Where the entity table comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDescriptor {
    File(PathBuf),
    Bytes { name: String, data: Vec<u8> },
    Sheet(String),
}

impl SourceDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) | Self::Bytes { .. } => "file",
            Self::Sheet(_) => "sheet",
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn input_file(&self) -> Option<&str>;
    fn sheet_url(&self) -> Option<&str>;
    fn credentials_path(&self) -> Option<&str>;
    fn entity_column(&self) -> Option<&str>;
    fn query_template(&self) -> &str;
    fn output_path(&self) -> &str;
    fn sync_to_sheet(&self) -> bool;
    fn bundle_output(&self) -> bool;
    fn search_settings(&self) -> SearchSettings;
    fn extraction_settings(&self) -> ExtractionSettings;

    /// An input file takes precedence over a sheet URL.
    fn source_descriptor(&self) -> Option<SourceDescriptor> {
        if let Some(path) = self.input_file().filter(|p| !p.is_empty()) {
            return Some(SourceDescriptor::File(PathBuf::from(path)));
        }
        self.sheet_url()
            .filter(|url| !url.is_empty())
            .map(|url| SourceDescriptor::Sheet(url.to_string()))
    }
}

#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &Query) -> Result<Vec<String>>;

    fn name(&self) -> &'static str;
}

/// Black-box model capabilities used by the extractor.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<Classification>;

    async fn summarize(&self, text: &str, max_length: usize, min_length: usize)
        -> Result<String>;

    fn name(&self) -> &'static str;
}
