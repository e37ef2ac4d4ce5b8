//! Elasticsearch writer over the `_bulk` API.

use super::{DocumentFailure, IndexWriter, UpsertReport};
use crate::document::IndexDocument;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

/// Writes documents with `update` + `doc_as_upsert` bulk actions.
#[derive(Debug, Clone)]
pub struct ElasticsearchWriter {
    base_url: String,
    client: reqwest::Client,
}

impl ElasticsearchWriter {
    /// Creates a writer for the cluster at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Creates a writer using an existing HTTP client.
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the cluster URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl IndexWriter for ElasticsearchWriter {
    async fn upsert(&self, index: &str, docs: &[IndexDocument]) -> SyncResult<UpsertReport> {
        if docs.is_empty() {
            return Ok(UpsertReport::default());
        }

        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_body(index, docs)?)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        let body: Value = response.json().await.map_err(transport_error)?;
        let report = parse_bulk_response(docs, &body);
        tracing::debug!(
            index,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "bulk upsert"
        );
        Ok(report)
    }

    async fn get(&self, index: &str, id: &str) -> SyncResult<Option<Value>> {
        let response = self
            .client
            .get(format!("{}/{}/_doc/{}", self.base_url, index, id))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        parse_get_response(status, &text)
    }
}

/// Reads the `_source` of a `_doc` response.
///
/// A 404, from a missing document or a missing index, and `found: false`
/// both mean absent.
pub(crate) fn parse_get_response(status: StatusCode, body: &str) -> SyncResult<Option<Value>> {
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(status_error(status, body));
    }

    let mut body: Value = serde_json::from_str(body)
        .map_err(|e| SyncError::index_retryable(format!("malformed document response: {}", e)))?;
    if body.get("found").and_then(Value::as_bool) == Some(false) {
        return Ok(None);
    }
    Ok(body.get_mut("_source").map(Value::take))
}

/// Renders the NDJSON body of a bulk request.
pub(crate) fn bulk_body(index: &str, docs: &[IndexDocument]) -> SyncResult<String> {
    let mut body = String::new();
    for doc in docs {
        let action = json!({"update": {"_index": index, "_id": doc.id}});
        let source = json!({"doc": doc.body, "doc_as_upsert": true});
        for line in [action, source] {
            let line = serde_json::to_string(&line)
                .map_err(|e| SyncError::index_fatal(format!("cannot encode document: {}", e)))?;
            body.push_str(&line);
            body.push('\n');
        }
    }
    Ok(body)
}

/// Reads per-item results of a bulk response.
///
/// Items come back in request order. Documents without a matching item are
/// counted as failed.
pub(crate) fn parse_bulk_response(docs: &[IndexDocument], body: &Value) -> UpsertReport {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut report = UpsertReport::default();
    for (position, doc) in docs.iter().enumerate() {
        let Some(result) = items.get(position).and_then(|item| {
            item.as_object()
                .and_then(|actions| actions.values().next())
        }) else {
            report.failures.push(DocumentFailure {
                id: doc.id.clone(),
                status: 0,
                reason: "missing from bulk response".to_string(),
            });
            continue;
        };

        let status = result
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(0);
        if (200..300).contains(&status) && result.get("error").is_none() {
            report.succeeded += 1;
        } else {
            let reason = result
                .get("error")
                .map(|e| match e.get("reason").and_then(Value::as_str) {
                    Some(reason) => reason.to_string(),
                    None => e.to_string(),
                })
                .unwrap_or_else(|| format!("status {}", status));
            report.failures.push(DocumentFailure {
                id: doc.id.clone(),
                status,
                reason,
            });
        }
    }
    report
}

fn transport_error(error: reqwest::Error) -> SyncError {
    if error.is_builder() {
        SyncError::index_fatal(error.to_string())
    } else {
        SyncError::index_retryable(error.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> SyncError {
    let message = format!("{}: {}", status, body.chars().take(512).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SyncError::index_retryable(message)
    } else {
        SyncError::index_fatal(message)
    }
}
