use crate::core::{ExtractionRecord, Record, Storage, Table};
use crate::utils::error::{LookupError, Result};
use std::collections::HashMap;
use std::io::Write;
use zip::write::{FileOptions, ZipWriter};

pub const SELECTED_DATA_FILE: &str = "selected_data.csv";
pub const EXTRACTED_DATA_FILE: &str = "extracted_data.csv";
pub const BUNDLE_FILE: &str = "lookup_output.zip";

pub const ENTITY_COLUMN: &str = "entity";
pub const EXTRACTED_INFO_COLUMN: &str = "extracted_info";

/// Two-column results table, one row per record in input order.
pub fn records_to_table(records: &[ExtractionRecord]) -> Result<Table> {
    let rows = records
        .iter()
        .map(|record| Record {
            data: HashMap::from([
                (ENTITY_COLUMN.to_string(), record.entity.clone()),
                (
                    EXTRACTED_INFO_COLUMN.to_string(),
                    record.extracted_info.clone().into(),
                ),
            ]),
        })
        .collect();

    Table::new(
        vec![ENTITY_COLUMN.to_string(), EXTRACTED_INFO_COLUMN.to_string()],
        rows,
    )
}

/// Header row plus data rows, no index column. Nulls are written empty.
pub fn table_to_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for row in table.cell_strings() {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| LookupError::IoError(e.into_error()))
}

/// Writes CSV exports through a [`Storage`] backend.
pub struct CsvExporter<S: Storage> {
    storage: S,
    output_path: String,
    bundle: bool,
}

impl<S: Storage> CsvExporter<S> {
    pub fn new(storage: S, output_path: impl Into<String>) -> Self {
        Self {
            storage,
            output_path: output_path.into(),
            bundle: false,
        }
    }

    /// Also pack every export into a single zip archive.
    pub fn with_bundle(mut self, bundle: bool) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn location(&self, file: &str) -> String {
        format!("{}/{}", self.output_path.trim_end_matches('/'), file)
    }

    /// Exports the selected entity column. Returns the written location.
    pub async fn export_selection(&self, table: &Table, column: &str) -> Result<String> {
        let data = table_to_csv(&table.select(column)?)?;
        self.storage.write_file(SELECTED_DATA_FILE, &data).await?;
        tracing::info!("💾 Selected column '{}' saved to {}", column, SELECTED_DATA_FILE);
        Ok(self.location(SELECTED_DATA_FILE))
    }

    /// Exports the extraction results, plus the zip bundle when enabled.
    /// Returns every written location.
    pub async fn export(
        &self,
        records: &[ExtractionRecord],
        selection: Option<(&Table, &str)>,
    ) -> Result<Vec<String>> {
        let extracted = table_to_csv(&records_to_table(records)?)?;
        self.storage.write_file(EXTRACTED_DATA_FILE, &extracted).await?;
        tracing::info!(
            "💾 {} extraction records saved to {}",
            records.len(),
            EXTRACTED_DATA_FILE
        );
        let mut written = vec![self.location(EXTRACTED_DATA_FILE)];

        let selected = match selection {
            Some((table, column)) => {
                let data = table_to_csv(&table.select(column)?)?;
                self.storage.write_file(SELECTED_DATA_FILE, &data).await?;
                written.push(self.location(SELECTED_DATA_FILE));
                Some(data)
            }
            None => None,
        };

        if self.bundle {
            let archive = bundle(&extracted, selected.as_deref())?;
            tracing::debug!("Writing ZIP bundle ({} bytes) to storage", archive.len());
            self.storage.write_file(BUNDLE_FILE, &archive).await?;
            written.push(self.location(BUNDLE_FILE));
        }

        Ok(written)
    }
}

fn bundle(extracted: &[u8], selected: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    zip.start_file::<_, ()>(EXTRACTED_DATA_FILE, FileOptions::default())?;
    zip.write_all(extracted)?;

    if let Some(selected) = selected {
        zip.start_file::<_, ()>(SELECTED_DATA_FILE, FileOptions::default())?;
        zip.write_all(selected)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loader::parse_delimited;
    use serde_json::json;
    use std::io::Read;
    use std::sync::Arc;
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
            files.get(path).cloned().ok_or_else(|| {
                LookupError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    fn records() -> Vec<ExtractionRecord> {
        vec![
            ExtractionRecord {
                entity: json!("Acme, Inc."),
                extracted_info: "Contact email: hello@acme.example".to_string(),
            },
            ExtractionRecord {
                entity: json!(42),
                extracted_info: "No email address found.".to_string(),
            },
        ]
    }

    #[test]
    fn test_csv_has_header_and_quotes_commas() {
        let csv = table_to_csv(&records_to_table(&records()).unwrap()).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "entity,extracted_info\n\"Acme, Inc.\",Contact email: hello@acme.example\n42,No email address found.\n"
        );
    }

    #[test]
    fn test_exported_csv_reads_back() {
        let csv = table_to_csv(&records_to_table(&records()).unwrap()).unwrap();
        let table = parse_delimited(&csv).unwrap();

        assert_eq!(table.columns(), &["entity".to_string(), "extracted_info".to_string()]);
        assert_eq!(
            table.column_values("entity").unwrap(),
            vec![json!("Acme, Inc."), json!(42)]
        );
        assert_eq!(
            table.column_values("extracted_info").unwrap(),
            vec![
                json!("Contact email: hello@acme.example"),
                json!("No email address found."),
            ]
        );
    }

    #[test]
    fn test_empty_results_still_have_header() {
        let csv = table_to_csv(&records_to_table(&[]).unwrap()).unwrap();
        assert_eq!(csv, b"entity,extracted_info\n");
    }

    #[tokio::test]
    async fn test_export_selection() {
        let storage = MockStorage::default();
        let exporter = CsvExporter::new(storage.clone(), "out/");
        let table = parse_delimited(b"name,city\nAcme,Springfield\n,Shelbyville\n").unwrap();

        let location = exporter.export_selection(&table, "name").await.unwrap();

        assert_eq!(location, "out/selected_data.csv");
        let data = storage.get_file(SELECTED_DATA_FILE).await.unwrap();
        assert_eq!(String::from_utf8(data).unwrap(), "name\nAcme\n\"\"\n");
    }

    #[tokio::test]
    async fn test_export_selection_missing_column() {
        let exporter = CsvExporter::new(MockStorage::default(), "out");
        let table = parse_delimited(b"name\nAcme\n").unwrap();

        let err = exporter.export_selection(&table, "company").await.unwrap_err();
        assert!(matches!(err, LookupError::ColumnNotFound { .. }));
    }

    #[tokio::test]
    async fn test_export_writes_bundle() {
        let storage = MockStorage::default();
        let exporter = CsvExporter::new(storage.clone(), "out").with_bundle(true);
        let table = parse_delimited(b"name\n\"Acme, Inc.\"\n42\n").unwrap();

        let written = exporter
            .export(&records(), Some((&table, "name")))
            .await
            .unwrap();

        assert_eq!(
            written,
            vec![
                "out/extracted_data.csv".to_string(),
                "out/selected_data.csv".to_string(),
                "out/lookup_output.zip".to_string(),
            ]
        );

        let archive = storage.get_file(BUNDLE_FILE).await.unwrap();
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive)).unwrap();
        assert_eq!(zip.len(), 2);

        let mut contents = String::new();
        zip.by_name(EXTRACTED_DATA_FILE)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert!(contents.starts_with("entity,extracted_info\n"));
        assert!(contents.contains("No email address found."));
    }

    #[tokio::test]
    async fn test_export_without_bundle() {
        let storage = MockStorage::default();
        let exporter = CsvExporter::new(storage.clone(), "out");

        let written = exporter.export(&records(), None).await.unwrap();

        assert_eq!(written, vec!["out/extracted_data.csv".to_string()]);
        assert!(storage.get_file(BUNDLE_FILE).await.is_none());
    }
}
