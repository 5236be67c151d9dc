use crate::core::sheets::SheetsClient;
use crate::core::{Record, SourceDescriptor, Table};
use crate::domain::model::infer_scalar;
use crate::utils::error::{LookupError, Result};
use std::collections::{HashMap, HashSet};

fn file_unavailable(cause: impl std::fmt::Display) -> LookupError {
    LookupError::SourceUnavailable {
        source_kind: "file".to_string(),
        cause: cause.to_string(),
    }
}

/// Loads the entity table from whichever source the descriptor names.
pub async fn load_table(
    descriptor: &SourceDescriptor,
    sheets: Option<&SheetsClient>,
) -> Result<Table> {
    match descriptor {
        SourceDescriptor::File(path) => {
            tracing::debug!("Reading CSV file: {}", path.display());
            let data = tokio::fs::read(path)
                .await
                .map_err(|e| file_unavailable(format!("{}: {}", path.display(), e)))?;
            parse_delimited(&data)
        }
        SourceDescriptor::Bytes { name, data } => {
            tracing::debug!("Parsing uploaded CSV '{}' ({} bytes)", name, data.len());
            parse_delimited(data)
        }
        SourceDescriptor::Sheet(url) => {
            let client = sheets.ok_or_else(|| LookupError::SourceUnavailable {
                source_kind: "sheet".to_string(),
                cause: "no spreadsheet credentials configured".to_string(),
            })?;
            client.read_first_sheet(url).await
        }
    }
}

/// Parses comma-separated UTF-8 text with a header row.
///
/// Lines with more fields than the header, or that are not valid UTF-8, are
/// skipped. Short lines are padded with nulls.
pub fn parse_delimited(data: &[u8]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers = reader.headers().map_err(file_unavailable)?.clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(file_unavailable("no header row found"));
    }
    let columns = dedupe_headers(headers.iter());

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                return Err(file_unavailable(e));
            }
            Err(e) => {
                tracing::warn!("Skipping malformed line {}: {}", index + 2, e);
                skipped += 1;
                continue;
            }
        };

        if record.len() > columns.len() {
            tracing::warn!(
                "Skipping line {}: expected {} fields, saw {}",
                index + 2,
                columns.len(),
                record.len()
            );
            skipped += 1;
            continue;
        }

        let data: HashMap<String, _> = columns
            .iter()
            .zip(record.iter())
            .map(|(column, raw)| (column.clone(), infer_scalar(raw)))
            .collect();
        rows.push(Record { data });
    }

    if skipped > 0 {
        tracing::warn!("⚠️ Skipped {} malformed line(s)", skipped);
    }
    tracing::info!("📄 Parsed {} rows across {} columns", rows.len(), columns.len());

    Table::new(columns, rows)
}

/// Repeated header names get a `.N` suffix so column names stay unique.
fn dedupe_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut columns = Vec::new();

    for header in headers {
        let mut name = header.to_string();
        while seen.contains(&name) {
            let count = counts.entry(header.to_string()).or_insert(0);
            *count += 1;
            name = format!("{}.{}", header, count);
        }
        seen.insert(name.clone());
        columns.push(name);
    }

    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_csv() {
        let table = parse_delimited(b"name,employees\nAcme,120\nGlobex,3.5\n").unwrap();

        assert_eq!(table.columns(), &["name".to_string(), "employees".to_string()]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].get("name"), Some(&json!("Acme")));
        assert_eq!(table.rows()[0].get("employees"), Some(&json!(120)));
        assert_eq!(table.rows()[1].get("employees"), Some(&json!(3.5)));
    }

    #[test]
    fn test_parse_skips_lines_with_extra_fields() {
        let data = b"name,city\nAcme,Springfield\nBroken,too,many,fields\nGlobex,Cypress Creek\n";
        let table = parse_delimited(data).unwrap();

        let names: Vec<_> = table.column_values("name").unwrap();
        assert_eq!(names, vec![json!("Acme"), json!("Globex")]);
    }

    #[test]
    fn test_parse_skips_invalid_utf8_lines() {
        let mut data = b"name\nAcme\n".to_vec();
        data.extend_from_slice(&[0xff, 0xfe, b'\n']);
        data.extend_from_slice(b"Globex\n");

        let table = parse_delimited(&data).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_parse_pads_short_lines() {
        let table = parse_delimited(b"name,city\nAcme\n").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].get("city"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn test_parse_dedupes_headers() {
        let table = parse_delimited(b"name,name,name\na,b,c\n").unwrap();
        assert_eq!(
            table.columns(),
            &["name".to_string(), "name.1".to_string(), "name.2".to_string()]
        );
    }

    #[test]
    fn test_parse_empty_input_is_unavailable() {
        let err = parse_delimited(b"").unwrap_err();
        assert!(matches!(err, LookupError::SourceUnavailable { ref source_kind, .. } if source_kind == "file"));
    }

    #[tokio::test]
    async fn test_load_table_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"name\nAcme\nGlobex\n").unwrap();

        let descriptor = SourceDescriptor::File(file.path().to_path_buf());
        let table = load_table(&descriptor, None).await.unwrap();
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_load_table_missing_file() {
        let descriptor = SourceDescriptor::File("/nonexistent/companies.csv".into());
        let err = load_table(&descriptor, None).await.unwrap_err();
        assert!(matches!(err, LookupError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_load_sheet_without_credentials() {
        let descriptor = SourceDescriptor::Sheet(
            "https://docs.google.com/spreadsheets/d/abc123/edit".to_string(),
        );
        let err = load_table(&descriptor, None).await.unwrap_err();
        assert!(matches!(err, LookupError::SourceUnavailable { ref source_kind, .. } if source_kind == "sheet"));
    }
}
