use crate::core::{ExtractionRecord, ExtractionService, SearchRecord};
use crate::domain::model::{Classification, ExtractionBackend, ExtractionSettings};
use crate::utils::error::{LookupError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub const CANDIDATE_LABELS: [&str; 3] = ["email address", "contact information", "email"];
pub const TARGET_LABEL: &str = "email address";
pub const NOT_FOUND: &str = "No email address found.";
pub const SUMMARY_MAX_LENGTH: usize = 150;
pub const SUMMARY_MIN_LENGTH: usize = 10;
pub const BATCH_SIZE: usize = 3;

pub const DEFAULT_INFERENCE_ENDPOINT: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_CLASSIFIER_MODEL: &str = "facebook/bart-large-mnli";
pub const DEFAULT_SUMMARIZER_MODEL: &str = "facebook/bart-large-cnn";

/// Classify-then-summarize over each search record.
pub struct Extractor {
    service: Arc<dyn ExtractionService>,
    batch_size: usize,
}

impl Extractor {
    pub fn new(service: Arc<dyn ExtractionService>) -> Self {
        Self {
            service,
            batch_size: BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    async fn try_extract(&self, text: &str) -> Result<String> {
        let classification = self.service.classify(text, &CANDIDATE_LABELS).await?;
        match classification.top_label() {
            Some(TARGET_LABEL) => {
                self.service
                    .summarize(text, SUMMARY_MAX_LENGTH, SUMMARY_MIN_LENGTH)
                    .await
            }
            _ => Ok(NOT_FOUND.to_string()),
        }
    }

    /// Never fails: errors become an `Error: <cause>` annotation.
    pub async fn extract(&self, record: &SearchRecord) -> ExtractionRecord {
        let text = record.combined_text();
        let extracted_info = match self.try_extract(&text).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", record.entity(), e);
                format!("Error: {}", e.cause_message())
            }
        };

        ExtractionRecord {
            entity: record.entity().clone(),
            extracted_info,
        }
    }

    /// Processes records in fixed-size batches, calling `on_batch(done, total)`
    /// after each one. Results are in input order.
    pub async fn extract_all<F>(&self, records: &[SearchRecord], mut on_batch: F) -> Vec<ExtractionRecord>
    where
        F: FnMut(usize, usize),
    {
        let total = records.len();
        let mut extracted = Vec::with_capacity(total);

        for batch in records.chunks(self.batch_size) {
            for record in batch {
                extracted.push(self.extract(record).await);
            }
            on_batch(extracted.len(), total);
        }

        extracted
    }
}

/// Offline extraction backed by regular expressions.
///
/// Labels are scored by how much evidence the text holds for them: email
/// addresses for "email address", phone numbers and contact wording for
/// "contact information", the bare word for "email".
pub struct PatternExtraction {
    email_regex: Regex,
    phone_regex: Regex,
    contact_regex: Regex,
    email_word_regex: Regex,
}

impl PatternExtraction {
    pub fn new() -> Self {
        Self {
            email_regex: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap(),
            phone_regex: Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}")
                .unwrap(),
            contact_regex: Regex::new(r"(?i)\b(contact|phone|call|reach us|get in touch)\b")
                .unwrap(),
            email_word_regex: Regex::new(r"(?i)\be-?mail\b").unwrap(),
        }
    }

    fn evidence(&self, text: &str, label: &str) -> usize {
        match label {
            "email address" => self.email_regex.find_iter(text).count(),
            "contact information" => {
                self.phone_regex.find_iter(text).count() + self.contact_regex.find_iter(text).count()
            }
            "email" => self.email_word_regex.find_iter(text).count(),
            other => text.to_lowercase().matches(&other.to_lowercase()).count(),
        }
    }

    fn distinct_emails(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.email_regex
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .filter(|email| seen.insert(email.clone()))
            .collect()
    }
}

impl Default for PatternExtraction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionService for PatternExtraction {
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<Classification> {
        let counts: Vec<usize> = labels.iter().map(|label| self.evidence(text, label)).collect();
        let total: usize = counts.iter().sum();

        let pairs = labels
            .iter()
            .zip(counts)
            .map(|(label, count)| {
                let score = if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64
                };
                (label.to_string(), score)
            })
            .collect();

        Ok(Classification::new(pairs))
    }

    async fn summarize(&self, text: &str, max_length: usize, _min_length: usize) -> Result<String> {
        let emails = self.distinct_emails(text);
        let summary = if emails.is_empty() {
            text.trim().to_string()
        } else {
            format!("Contact email: {}", emails.join(", "))
        };
        Ok(summary.chars().take(max_length).collect())
    }

    fn name(&self) -> &'static str {
        "pattern"
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ZeroShotResponse {
    Sequence { labels: Vec<String>, scores: Vec<f64> },
    Pairs(Vec<LabelScore>),
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct SummaryOutput {
    summary_text: String,
}

/// Zero-shot classification and summarization through a hosted inference API.
pub struct HuggingFaceInference {
    client: Client,
    endpoint: String,
    token: Option<String>,
    classifier_model: String,
    summarizer_model: String,
}

impl HuggingFaceInference {
    pub fn new(token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: DEFAULT_INFERENCE_ENDPOINT.to_string(),
            token,
            classifier_model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            summarizer_model: DEFAULT_SUMMARIZER_MODEL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_models(mut self, classifier: impl Into<String>, summarizer: impl Into<String>) -> Self {
        self.classifier_model = classifier.into();
        self.summarizer_model = summarizer.into();
        self
    }

    async fn infer<T>(&self, model: &str, body: serde_json::Value) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/models/{}", self.endpoint.trim_end_matches('/'), model);
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| LookupError::ExtractionFailure {
            message: format!("{} request failed: {}", model, e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::ExtractionFailure {
                message: format!("{} returned {}: {}", model, status.as_u16(), body),
            });
        }

        response.json().await.map_err(|e| LookupError::ExtractionFailure {
            message: format!("unexpected {} response: {}", model, e),
        })
    }
}

#[async_trait]
impl ExtractionService for HuggingFaceInference {
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<Classification> {
        let body = serde_json::json!({
            "inputs": text,
            "parameters": { "candidate_labels": labels }
        });

        let pairs = match self.infer::<ZeroShotResponse>(&self.classifier_model, body).await? {
            ZeroShotResponse::Sequence { labels, scores } => labels.into_iter().zip(scores).collect(),
            ZeroShotResponse::Pairs(pairs) => pairs.into_iter().map(|p| (p.label, p.score)).collect(),
        };
        Ok(Classification::new(pairs))
    }

    async fn summarize(&self, text: &str, max_length: usize, min_length: usize) -> Result<String> {
        let body = serde_json::json!({
            "inputs": text,
            "parameters": { "max_length": max_length, "min_length": min_length }
        });

        let outputs: Vec<SummaryOutput> = self.infer(&self.summarizer_model, body).await?;
        outputs
            .into_iter()
            .next()
            .map(|o| o.summary_text)
            .ok_or_else(|| LookupError::ExtractionFailure {
                message: format!("{} returned no summary", self.summarizer_model),
            })
    }

    fn name(&self) -> &'static str {
        "huggingface"
    }
}

pub fn extraction_service_from(settings: &ExtractionSettings) -> Result<Arc<dyn ExtractionService>> {
    match settings.backend {
        ExtractionBackend::Pattern => Ok(Arc::new(PatternExtraction::new())),
        ExtractionBackend::HuggingFace => {
            let mut service = HuggingFaceInference::new(
                settings.api_token.clone(),
                Duration::from_secs(settings.timeout_seconds),
            )?
            .with_models(
                settings
                    .classifier_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CLASSIFIER_MODEL.to_string()),
                settings
                    .summarizer_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SUMMARIZER_MODEL.to_string()),
            );
            if let Some(endpoint) = &settings.endpoint {
                service = service.with_endpoint(endpoint.clone());
            }
            Ok(Arc::new(service))
        }
    }
}
