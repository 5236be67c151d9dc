use crate::core::collector::collect;
use crate::core::extractor::Extractor;
use crate::core::loader::load_table;
use crate::core::query::{build_queries, preview_queries, QueryTemplate, PREVIEW_LIMIT};
use crate::core::sheets::SheetsClient;
use crate::core::sink::{records_to_table, CsvExporter};
use crate::core::{
    ExtractionRecord, ExtractionService, Query, SearchRecord, SearchService, SourceDescriptor,
    Storage, Table,
};
use crate::utils::error::{LookupError, Result};
use std::fmt;
use std::sync::Arc;

/// Where a session is in the lookup flow. Later stages compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    Loaded,
    ColumnSelected,
    QueriesPreviewed,
    Collected,
    Extracted,
    Exported,
    Synced,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::ColumnSelected => "column selected",
            Self::QueriesPreviewed => "queries previewed",
            Self::Collected => "collected",
            Self::Extracted => "extracted",
            Self::Exported => "exported",
            Self::Synced => "synced",
        };
        f.write_str(name)
    }
}

/// State for one interactive lookup.
///
/// Each step requires the one before it. Repeating an earlier step clears
/// everything that was derived from it.
pub struct LookupSession {
    search: Arc<dyn SearchService>,
    extractor: Extractor,
    sheets: Option<Arc<SheetsClient>>,
    concurrency: usize,

    table: Table,
    selected_column: Option<String>,
    template: QueryTemplate,
    queries: Vec<Query>,
    search_records: Vec<SearchRecord>,
    extraction_records: Vec<ExtractionRecord>,
    stage: Stage,
}

impl LookupSession {
    pub fn new(search: Arc<dyn SearchService>, extraction: Arc<dyn ExtractionService>) -> Self {
        Self {
            search,
            extractor: Extractor::new(extraction),
            sheets: None,
            concurrency: 5,
            table: Table::empty(),
            selected_column: None,
            template: QueryTemplate::default(),
            queries: Vec::new(),
            search_records: Vec::new(),
            extraction_records: Vec::new(),
            stage: Stage::Idle,
        }
    }

    pub fn with_sheets(mut self, sheets: Arc<SheetsClient>) -> Self {
        self.sheets = Some(sheets);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn selected_column(&self) -> Option<&str> {
        self.selected_column.as_deref()
    }

    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn search_records(&self) -> &[SearchRecord] {
        &self.search_records
    }

    pub fn extraction_records(&self) -> &[ExtractionRecord] {
        &self.extraction_records
    }

    fn require(&self, minimum: Stage, action: &str) -> Result<()> {
        if self.stage >= minimum {
            Ok(())
        } else {
            Err(LookupError::InvalidState {
                action: action.to_string(),
                stage: self.stage.to_string(),
            })
        }
    }

    /// Resets every field derived from `stage` onwards.
    fn clear_from(&mut self, stage: Stage) {
        if stage <= Stage::Loaded {
            self.table = Table::empty();
        }
        if stage <= Stage::ColumnSelected {
            self.selected_column = None;
        }
        if stage <= Stage::QueriesPreviewed {
            self.queries.clear();
        }
        if stage <= Stage::Collected {
            self.search_records.clear();
        }
        if stage <= Stage::Extracted {
            self.extraction_records.clear();
        }
    }

    /// Loads a new table. On failure the session holds an empty table, is
    /// back at `Idle`, and the error is returned for display.
    pub async fn load(&mut self, descriptor: &SourceDescriptor) -> Result<usize> {
        self.clear_from(Stage::Loaded);
        self.stage = Stage::Idle;

        match load_table(descriptor, self.sheets.as_deref()).await {
            Ok(table) => {
                let rows = table.len();
                tracing::info!(
                    "📥 Loaded {} rows with columns [{}] from {}",
                    rows,
                    table.columns().join(", "),
                    descriptor.kind()
                );
                self.table = table;
                self.stage = Stage::Loaded;
                Ok(rows)
            }
            Err(e) => {
                tracing::error!("❌ {}", e.user_friendly_message());
                Err(e)
            }
        }
    }

    pub fn select_column(&mut self, column: &str) -> Result<()> {
        self.require(Stage::Loaded, "select a column")?;
        if !self.table.has_column(column) {
            return Err(LookupError::ColumnNotFound {
                column: column.to_string(),
                available: self.table.columns().to_vec(),
            });
        }

        self.clear_from(Stage::ColumnSelected);
        self.selected_column = Some(column.to_string());
        self.stage = Stage::ColumnSelected;
        tracing::debug!("Selected entity column '{}'", column);
        Ok(())
    }

    /// Builds every query and returns the first few for preview.
    pub fn set_template(&mut self, template: &str) -> Result<Vec<Query>> {
        self.require(Stage::ColumnSelected, "build queries")?;
        let template = QueryTemplate::parse(template)?;
        let column = self.column()?.to_string();
        let queries = build_queries(&self.table, &column, &template)?;
        let preview = preview_queries(&self.table, &column, &template, PREVIEW_LIMIT)?;

        self.clear_from(Stage::QueriesPreviewed);
        self.template = template;
        self.queries = queries;
        self.stage = Stage::QueriesPreviewed;

        Ok(preview)
    }

    pub async fn search(&mut self) -> Result<&[SearchRecord]> {
        self.require(Stage::QueriesPreviewed, "search")?;
        let entities = self.table.column_values(self.column()?)?;
        let records = collect(&self.queries, &entities, self.search.as_ref(), self.concurrency).await?;

        self.clear_from(Stage::Collected);
        self.search_records = records;
        self.stage = Stage::Collected;
        tracing::info!("✅ Collected results for {} entities", self.search_records.len());
        Ok(&self.search_records)
    }

    pub async fn extract(&mut self) -> Result<&[ExtractionRecord]> {
        self.extract_with_progress(|done, total| {
            tracing::debug!("Extraction progress: {}/{}", done, total);
        })
        .await
    }

    pub async fn extract_with_progress<F>(&mut self, on_batch: F) -> Result<&[ExtractionRecord]>
    where
        F: FnMut(usize, usize),
    {
        self.require(Stage::Collected, "extract")?;
        let records = self.extractor.extract_all(&self.search_records, on_batch).await;

        self.clear_from(Stage::Extracted);
        self.extraction_records = records;
        self.stage = Stage::Extracted;
        tracing::info!("✅ Extracted {} records", self.extraction_records.len());
        Ok(&self.extraction_records)
    }

    /// Columns `entity, extracted_info`, one row per record.
    pub fn results_table(&self) -> Result<Table> {
        self.require(Stage::Extracted, "show results")?;
        records_to_table(&self.extraction_records)
    }

    pub async fn export_selection<S: Storage>(&self, exporter: &CsvExporter<S>) -> Result<String> {
        self.require(Stage::ColumnSelected, "export the selected column")?;
        exporter.export_selection(&self.table, self.column()?).await
    }

    pub async fn export<S: Storage>(&mut self, exporter: &CsvExporter<S>) -> Result<Vec<String>> {
        self.require(Stage::Extracted, "export results")?;
        let column = self.column()?;
        let written = exporter
            .export(&self.extraction_records, Some((&self.table, column)))
            .await?;

        self.stage = self.stage.max(Stage::Exported);
        Ok(written)
    }

    /// Overwrites the sheet with the results. A failure leaves the
    /// extraction records in place, so they can still be exported.
    pub async fn sync(&mut self, sheet_url: &str) -> Result<()> {
        self.require(Stage::Extracted, "sync results")?;
        let sheets = self.sheets.as_ref().ok_or_else(|| LookupError::SyncFailure {
            cause: "no spreadsheet credentials configured".to_string(),
            restored: false,
        })?;

        let table = records_to_table(&self.extraction_records)?;
        match sheets.overwrite_first_sheet(sheet_url, &table).await {
            Ok(()) => {
                self.stage = Stage::Synced;
                Ok(())
            }
            Err(e) => {
                tracing::error!("❌ {}", e.user_friendly_message());
                Err(e)
            }
        }
    }

    fn column(&self) -> Result<&str> {
        self.selected_column
            .as_deref()
            .ok_or_else(|| LookupError::InvalidState {
                action: "use the entity column".to_string(),
                stage: self.stage.to_string(),
            })
    }
}
