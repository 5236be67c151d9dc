//! Google Sheets access for the remote source and the write-back sink.
//!
//! Only the first worksheet of a spreadsheet is read or written. Requests go
//! to the Sheets v4 REST API with a bearer token obtained either from a
//! service-account key (JWT bearer grant) or supplied directly.

use crate::core::{Record, Table};
use crate::domain::model::{infer_scalar, Scalar};
use crate::utils::error::{LookupError, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use regex::Regex;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tokio::sync::Mutex;
use url::Url;

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const SHEETS_SCOPES: [&str; 4] = [
    "https://spreadsheets.google.com/feeds",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/drive.file",
];

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// A1 notation for a worksheet, optionally anchored at `cell`.
///
/// The title is always quoted so names like `FY24` are not read as a cell
/// reference; embedded quotes are doubled.
pub fn sheet_range(title: &str, cell: Option<&str>) -> String {
    let quoted = format!("'{}'", title.replace('\'', "''"));
    match cell {
        Some(cell) => format!("{}!{}", quoted, cell),
        None => quoted,
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The subset of a service-account key file needed for the JWT bearer grant.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| LookupError::AuthError {
            message: format!(
                "cannot read credentials file {}: {}",
                path.as_ref().display(),
                e
            ),
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| LookupError::AuthError {
            message: format!("invalid service account key: {}", e),
        })
    }
}

#[derive(Debug, Clone)]
pub enum SheetsAuth {
    ServiceAccount(ServiceAccountKey),
    AccessToken(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    major_dimension: Option<String>,
    #[serde(default)]
    values: Vec<Vec<Scalar>>,
}

pub struct SheetsClient {
    auth: SheetsAuth,
    base_url: String,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl SheetsClient {
    pub fn new(auth: SheetsAuth) -> Self {
        Self {
            auth,
            base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            client: Client::new(),
            token: Mutex::new(None),
        }
    }

    pub fn from_credentials_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let key = ServiceAccountKey::from_file(path)?;
        Ok(Self::new(SheetsAuth::ServiceAccount(key)))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Extracts the spreadsheet ID from a `.../spreadsheets/d/<id>/...` URL.
    pub fn spreadsheet_id(sheet_url: &str) -> Result<String> {
        static ID_RE: OnceLock<Regex> = OnceLock::new();
        let re = ID_RE.get_or_init(|| {
            Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").expect("spreadsheet id pattern")
        });

        re.captures(sheet_url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| LookupError::SourceUnavailable {
                source_kind: "sheet".to_string(),
                cause: format!("not a spreadsheet URL: {}", sheet_url),
            })
    }

    /// Signs the RS256 assertion exchanged for an access token.
    pub fn signed_assertion(key: &ServiceAccountKey, now: DateTime<Utc>) -> Result<String> {
        let claims = AssertionClaims {
            iss: key.client_email.clone(),
            scope: SHEETS_SCOPES.join(" "),
            aud: key.token_uri.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(60)).timestamp(),
        };

        let encoding_key =
            EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
                LookupError::AuthError {
                    message: format!("invalid service account private key: {}", e),
                }
            })?;

        encode(&Header::new(Algorithm::RS256), &claims, &encoding_key).map_err(|e| {
            LookupError::AuthError {
                message: format!("failed to sign token assertion: {}", e),
            }
        })
    }

    async fn access_token(&self) -> Result<String> {
        let key = match &self.auth {
            SheetsAuth::AccessToken(token) => return Ok(token.clone()),
            SheetsAuth::ServiceAccount(key) => key,
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("Requesting access token for {}", key.client_email);
        let assertion = Self::signed_assertion(key, Utc::now())?;
        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| LookupError::AuthError {
                message: format!("token request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::AuthError {
                message: format!("token endpoint returned {}: {}", status, body),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| LookupError::AuthError {
            message: format!("unreadable token response: {}", e),
        })?;

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        });
        Ok(token.access_token)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| LookupError::ConfigError {
            message: format!("invalid Sheets base URL '{}': {}", self.base_url, e),
        })?;
        url.path_segments_mut()
            .map_err(|_| LookupError::ConfigError {
                message: format!("Sheets base URL cannot be a base: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn checked(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(LookupError::RemoteError {
            service: "Sheets API".to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn first_sheet_title(&self, spreadsheet_id: &str, token: &str) -> Result<String> {
        let mut url = self.endpoint(&["spreadsheets", spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let response = self.client.get(url).bearer_auth(token).send().await?;
        let meta: SpreadsheetMeta = Self::checked(response).await?.json().await?;

        meta.sheets
            .into_iter()
            .next()
            .map(|sheet| sheet.properties.title)
            .ok_or_else(|| LookupError::ValidationError {
                message: format!("spreadsheet {} has no worksheets", spreadsheet_id),
            })
    }

    async fn read_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        render_option: Option<&str>,
        token: &str,
    ) -> Result<Vec<Vec<Scalar>>> {
        let mut url = self.endpoint(&["spreadsheets", spreadsheet_id, "values", range])?;
        if let Some(option) = render_option {
            url.query_pairs_mut().append_pair("valueRenderOption", option);
        }
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let values: ValueRange = Self::checked(response).await?.json().await?;
        Ok(values.values)
    }

    async fn clear_values(&self, spreadsheet_id: &str, range: &str, token: &str) -> Result<()> {
        let clear_segment = format!("{}:clear", range);
        let url = self.endpoint(&["spreadsheets", spreadsheet_id, "values", &clear_segment])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: Vec<Vec<Scalar>>,
        input_option: &str,
        token: &str,
    ) -> Result<()> {
        let mut url = self.endpoint(&["spreadsheets", spreadsheet_id, "values", range])?;
        url.query_pairs_mut().append_pair("valueInputOption", input_option);

        let body = ValueRange {
            range: Some(range.to_string()),
            major_dimension: Some("ROWS".to_string()),
            values,
        };
        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        Self::checked(response).await?;
        Ok(())
    }

    async fn fetch_first_sheet(&self, sheet_url: &str) -> Result<Table> {
        let spreadsheet_id = Self::spreadsheet_id(sheet_url)?;
        let token = self.access_token().await?;
        let title = self.first_sheet_title(&spreadsheet_id, &token).await?;
        tracing::debug!("Reading worksheet '{}' of {}", title, spreadsheet_id);

        let values = self
            .read_values(&spreadsheet_id, &sheet_range(&title, None), None, &token)
            .await?;
        values_to_table(values)
    }

    /// Reads the first worksheet as records keyed by its header row.
    pub async fn read_first_sheet(&self, sheet_url: &str) -> Result<Table> {
        let table = self
            .fetch_first_sheet(sheet_url)
            .await
            .map_err(|e| match e {
                LookupError::SourceUnavailable { .. } => e,
                other => LookupError::SourceUnavailable {
                    source_kind: "sheet".to_string(),
                    cause: other.to_string(),
                },
            })?;
        tracing::info!("📗 Read {} rows from Google Sheet", table.len());
        Ok(table)
    }

    /// Replaces the first worksheet's content with `table`, header included.
    ///
    /// If the write fails after the clear, the previous content is written
    /// back before the failure is reported. The snapshot keeps formulas and
    /// is re-entered as the user typed it, so restored cells keep their types.
    pub async fn overwrite_first_sheet(&self, sheet_url: &str, table: &Table) -> Result<()> {
        let sync_failure = |e: LookupError, restored: bool| LookupError::SyncFailure {
            cause: e.cause_message(),
            restored,
        };

        let spreadsheet_id =
            Self::spreadsheet_id(sheet_url).map_err(|e| sync_failure(e, false))?;
        let token = self
            .access_token()
            .await
            .map_err(|e| sync_failure(e, false))?;
        let title = self
            .first_sheet_title(&spreadsheet_id, &token)
            .await
            .map_err(|e| sync_failure(e, false))?;

        let whole_sheet = sheet_range(&title, None);
        let snapshot = self
            .read_values(&spreadsheet_id, &whole_sheet, Some("FORMULA"), &token)
            .await
            .map_err(|e| sync_failure(e, false))?;

        self.clear_values(&spreadsheet_id, &whole_sheet, &token)
            .await
            .map_err(|e| sync_failure(e, false))?;

        let anchor = sheet_range(&title, Some("A1"));
        if let Err(e) = self
            .update_values(&spreadsheet_id, &anchor, table_to_values(table), "RAW", &token)
            .await
        {
            tracing::error!("❌ Sheet write failed, restoring previous content: {}", e);
            let restored = if snapshot.is_empty() {
                true
            } else {
                match self
                    .update_values(&spreadsheet_id, &anchor, snapshot, "USER_ENTERED", &token)
                    .await
                {
                    Ok(()) => true,
                    Err(restore_error) => {
                        tracing::error!("❌ Restoring sheet content failed: {}", restore_error);
                        false
                    }
                }
            };
            return Err(sync_failure(e, restored));
        }

        tracing::info!(
            "✅ Google Sheet updated with {} rows ({} columns)",
            table.len(),
            table.columns().len()
        );
        Ok(())
    }
}

fn values_to_table(values: Vec<Vec<Scalar>>) -> Result<Table> {
    let mut rows = values.into_iter();
    let header = match rows.next() {
        Some(header) => header,
        None => return Ok(Table::empty()),
    };

    let columns: Vec<String> = header
        .iter()
        .map(crate::domain::model::scalar_to_string)
        .collect();

    let records = rows
        .map(|row| {
            let data: HashMap<String, Scalar> = columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let value = match row.get(i) {
                        Some(Scalar::String(s)) => infer_scalar(s),
                        Some(other) => other.clone(),
                        None => Scalar::Null,
                    };
                    (column.clone(), value)
                })
                .collect();
            Record { data }
        })
        .collect();

    Table::new(columns, records)
}

fn table_to_values(table: &Table) -> Vec<Vec<Scalar>> {
    let header = table
        .columns()
        .iter()
        .map(|c| Scalar::String(c.clone()))
        .collect();

    std::iter::once(header)
        .chain(table.rows().iter().map(|row| {
            table
                .columns()
                .iter()
                .map(|column| match row.get(column) {
                    Some(Scalar::Null) | None => Scalar::String(String::new()),
                    Some(value) => value.clone(),
                })
                .collect()
        }))
        .collect()
}
