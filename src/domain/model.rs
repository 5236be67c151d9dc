use crate::utils::error::{LookupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// A single cell value: string, number, bool or null.
pub type Scalar = serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, Scalar>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.data.get(column)
    }
}

/// Renders a cell the way it is substituted into queries and written to CSV.
pub fn scalar_to_string(value: &Scalar) -> String {
    match value {
        Scalar::Null => String::new(),
        Scalar::String(s) => s.clone(),
        Scalar::Number(n) => n.to_string(),
        Scalar::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Integer, then float, then string. Blank cells become null.
pub fn infer_scalar(raw: &str) -> Scalar {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Scalar::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Scalar::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Scalar::Number(n);
        }
    }
    Scalar::String(raw.to_string())
}

/// Ordered rows sharing one ordered, unique column set.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    /// Cells missing from a row are filled with null; keys outside the
    /// column set are dropped.
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(LookupError::ValidationError {
                    message: format!("Duplicate column name: {}", column),
                });
            }
        }

        let rows = rows
            .into_iter()
            .map(|mut record| {
                let data = columns
                    .iter()
                    .map(|column| {
                        let value = record.data.remove(column).unwrap_or(Scalar::Null);
                        (column.clone(), value)
                    })
                    .collect();
                Record { data }
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    fn require_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(LookupError::ColumnNotFound {
                column: column.to_string(),
                available: self.columns.clone(),
            })
        }
    }

    pub fn column_values(&self, column: &str) -> Result<Vec<Scalar>> {
        self.require_column(column)?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or(Scalar::Null))
            .collect())
    }

    /// Single-column slice used for the selected-data export.
    pub fn select(&self, column: &str) -> Result<Table> {
        let values = self.column_values(column)?;
        let rows = values
            .into_iter()
            .map(|value| Record {
                data: HashMap::from([(column.to_string(), value)]),
            })
            .collect();
        Ok(Table {
            columns: vec![column.to_string()],
            rows,
        })
    }

    /// Rows rendered as strings, in column order.
    pub fn cell_strings(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|column| row.get(column).map(scalar_to_string).unwrap_or_default())
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(String);

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Search results for one entity. Immutable once collected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRecord {
    entity: Scalar,
    results: Vec<String>,
}

impl SearchRecord {
    pub fn new(entity: Scalar, results: Vec<String>) -> Self {
        Self { entity, results }
    }

    pub fn entity(&self) -> &Scalar {
        &self.entity
    }

    pub fn results(&self) -> &[String] {
        &self.results
    }

    pub fn combined_text(&self) -> String {
        self.results.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub entity: Scalar,
    pub extracted_info: String,
}

/// Zero-shot classification output, ordered by descending score.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

impl Classification {
    pub fn new(pairs: Vec<(String, f64)>) -> Self {
        let mut pairs = pairs;
        pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let (labels, scores) = pairs.into_iter().unzip();
        Self { labels, scores }
    }

    /// `None` when nothing scored above zero.
    pub fn top_label(&self) -> Option<&str> {
        match (self.labels.first(), self.scores.first()) {
            (Some(label), Some(score)) if *score > 0.0 => Some(label.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    #[default]
    Placeholder,
    Tavily,
}

impl FromStr for SearchBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "tavily" => Ok(Self::Tavily),
            other => Err(format!(
                "unknown search backend '{}' (expected placeholder or tavily)",
                other
            )),
        }
    }
}

impl fmt::Display for SearchBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => f.write_str("placeholder"),
            Self::Tavily => f.write_str("tavily"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionBackend {
    #[default]
    Pattern,
    HuggingFace,
}

impl FromStr for ExtractionBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pattern" => Ok(Self::Pattern),
            "huggingface" => Ok(Self::HuggingFace),
            other => Err(format!(
                "unknown extraction backend '{}' (expected pattern or huggingface)",
                other
            )),
        }
    }
}

impl fmt::Display for ExtractionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => f.write_str("pattern"),
            Self::HuggingFace => f.write_str("huggingface"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    pub backend: SearchBackend,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub concurrent_requests: usize,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub max_results: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            backend: SearchBackend::Placeholder,
            endpoint: None,
            api_key: None,
            concurrent_requests: 5,
            timeout_seconds: 30,
            retry_attempts: 2,
            max_results: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    pub backend: ExtractionBackend,
    pub endpoint: Option<String>,
    pub api_token: Option<String>,
    pub classifier_model: Option<String>,
    pub summarizer_model: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            backend: ExtractionBackend::Pattern,
            endpoint: None,
            api_token: None,
            classifier_model: None,
            summarizer_model: None,
            timeout_seconds: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Scalar)]) -> Record {
        Record {
            data: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_table_rejects_duplicate_columns() {
        let result = Table::new(vec!["name".to_string(), "name".to_string()], vec![]);
        assert!(matches!(result, Err(LookupError::ValidationError { .. })));
    }

    #[test]
    fn test_table_normalizes_row_columns() {
        let table = Table::new(
            vec!["name".to_string(), "city".to_string()],
            vec![record(&[("name", json!("Acme")), ("extra", json!(1))])],
        )
        .unwrap();

        let row = &table.rows()[0];
        assert_eq!(row.data.len(), 2);
        assert_eq!(row.get("city"), Some(&Scalar::Null));
        assert!(row.get("extra").is_none());
    }

    #[test]
    fn test_select_missing_column() {
        let table = Table::new(vec!["name".to_string()], vec![]).unwrap();
        let err = table.select("company").unwrap_err();
        assert!(matches!(err, LookupError::ColumnNotFound { ref column, .. } if column == "company"));
    }

    #[test]
    fn test_head_and_select() {
        let rows = (1..=7)
            .map(|i| record(&[("name", json!(format!("Org {}", i))), ("id", json!(i))]))
            .collect();
        let table = Table::new(vec!["name".to_string(), "id".to_string()], rows).unwrap();

        assert_eq!(table.head(5).len(), 5);
        let slice = table.select("id").unwrap();
        assert_eq!(slice.columns(), &["id".to_string()]);
        assert_eq!(slice.cell_strings()[6], vec!["7".to_string()]);
    }

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(scalar_to_string(&json!("Acme")), "Acme");
        assert_eq!(scalar_to_string(&json!(42)), "42");
        assert_eq!(scalar_to_string(&json!(2.5)), "2.5");
        assert_eq!(scalar_to_string(&Scalar::Null), "");
        assert_eq!(infer_scalar("42"), json!(42));
        assert_eq!(infer_scalar("2.5"), json!(2.5));
        assert_eq!(infer_scalar("  "), Scalar::Null);
        assert_eq!(infer_scalar("nan"), json!("nan"));
        assert_eq!(infer_scalar("Globex"), json!("Globex"));
    }

    #[test]
    fn test_classification_orders_by_score() {
        let classification = Classification::new(vec![
            ("email".to_string(), 0.2),
            ("email address".to_string(), 0.7),
            ("contact information".to_string(), 0.1),
        ]);
        assert_eq!(classification.top_label(), Some("email address"));
        assert_eq!(classification.scores, vec![0.7, 0.2, 0.1]);

        let empty = Classification::new(vec![("email".to_string(), 0.0)]);
        assert_eq!(empty.top_label(), None);
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Tavily".parse::<SearchBackend>(), Ok(SearchBackend::Tavily));
        assert_eq!(
            "huggingface".parse::<ExtractionBackend>(),
            Ok(ExtractionBackend::HuggingFace)
        );
        assert!("bing".parse::<SearchBackend>().is_err());
    }
}
