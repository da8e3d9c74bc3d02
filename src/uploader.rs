use futures::StreamExt;
use itertools::Itertools;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crate::{
    types::{ChunkReport, CrawlError, ItemRecord},
    utils::MAX_CHUNK_SIZE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// GraphQL endpoint taking an `insertProducts` mutation per chunk.
    GraphQl(Url),
    /// Airtable-style REST table taking one `{fields: record}` per request.
    Airtable(Url),
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub chunk_size: usize,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub insecure_tls: bool,
    // logs every mutation before it is sent
    pub debug: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        UploadOptions {
            chunk_size: MAX_CHUNK_SIZE,
            concurrency: 10,
            request_timeout: Duration::from_secs(30),
            insecure_tls: false,
            debug: false,
        }
    }
}

pub struct Uploader {
    destination: Destination,
    client: Client,
    chunk_size: usize,
    concurrency: usize,
    debug: bool,
}

impl Uploader {
    pub fn new(destination: Destination, options: &UploadOptions) -> Result<Self, CrawlError> {
        if options.chunk_size == 0 || options.chunk_size > MAX_CHUNK_SIZE {
            return Err(CrawlError::Config(format!(
                "chunk size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, options.chunk_size
            )));
        }
        if options.insecure_tls {
            warn!("TLS certificate validation is disabled for uploads");
        }

        let client = Client::builder()
            .timeout(options.request_timeout)
            .danger_accept_invalid_certs(options.insecure_tls)
            .build()
            .map_err(|e| CrawlError::Config(format!("could not build http client: {}", e)))?;

        Ok(Uploader {
            destination,
            client,
            chunk_size: options.chunk_size,
            concurrency: options.concurrency.max(1),
            debug: options.debug,
        })
    }

    /// Sends every chunk without waiting on the others. One report per chunk,
    /// sorted by chunk index; a failed chunk is never resent.
    pub async fn upload(
        &self,
        records: Vec<ItemRecord>,
        should_terminate: &AtomicBool,
    ) -> Vec<ChunkReport> {
        let chunks = split_chunks(records, self.chunk_size);
        info!("uploading {} chunks", chunks.len());

        let mut reports = tokio_stream::iter(chunks.into_iter().enumerate())
            .map(|(index, chunk)| async move {
                let result = if should_terminate.load(Ordering::Relaxed) {
                    Err(CrawlError::Cancelled)
                } else {
                    self.dispatch(index, &chunk).await
                };
                if let Err(e) = &result {
                    error!("chunk {} of {} records not delivered: {}", index, chunk.len(), e);
                }
                ChunkReport {
                    index,
                    size: chunk.len(),
                    result,
                }
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<ChunkReport>>()
            .await;

        reports.sort_by_key(|r| r.index);
        reports
    }

    async fn dispatch(&self, index: usize, chunk: &[ItemRecord]) -> Result<(), CrawlError> {
        match &self.destination {
            Destination::GraphQl(url) => self.post_mutation(url, index, chunk).await,
            Destination::Airtable(url) => self.post_rows(url, index, chunk).await,
        }
    }

    async fn post_mutation(
        &self,
        url: &Url,
        index: usize,
        chunk: &[ItemRecord],
    ) -> Result<(), CrawlError> {
        let query = insert_mutation(chunk).map_err(|e| dispatch_error(index, e))?;
        if self.debug {
            debug!("{}", query);
        }

        let res = self
            .client
            .post(url.clone())
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| dispatch_error(index, e))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| dispatch_error(index, e))?;
        if !status.is_success() {
            return Err(dispatch_error(index, format!("status {}: {}", status, body)));
        }
        if let Ok(res) = serde_json::from_str::<Value>(&body) {
            if let Some(errors) = graphql_errors(&res) {
                return Err(dispatch_error(index, errors));
            }
        }

        info!("chunk {} accepted: {}", index, body);
        Ok(())
    }

    async fn post_rows(
        &self,
        url: &Url,
        index: usize,
        chunk: &[ItemRecord],
    ) -> Result<(), CrawlError> {
        let mut failed = 0;
        for record in chunk {
            let res = self
                .client
                .post(url.clone())
                .json(&json!({ "fields": record }))
                .send()
                .await;

            match res {
                Ok(res) if res.status().is_success() => {}
                Ok(res) => {
                    failed += 1;
                    warn!("row {} rejected with status {}", record.title, res.status());
                }
                Err(e) => {
                    failed += 1;
                    warn!("row {} not sent: {}", record.title, e);
                }
            }
        }

        if failed > 0 {
            return Err(dispatch_error(
                index,
                format!("{} of {} rows failed", failed, chunk.len()),
            ));
        }
        debug!("chunk {} stored {} rows", index, chunk.len());
        Ok(())
    }
}

fn dispatch_error(index: usize, reason: impl ToString) -> CrawlError {
    CrawlError::UploadDispatch {
        chunk: index,
        reason: reason.to_string(),
    }
}

/// The `errors` entry of a GraphQL response, unless it is null or empty.
fn graphql_errors(res: &Value) -> Option<&Value> {
    match res.get("errors")? {
        Value::Null => None,
        Value::Array(errors) if errors.is_empty() => None,
        errors => Some(errors),
    }
}

/// Consecutive chunks of at most `size` records, keeping record order.
pub fn split_chunks(records: Vec<ItemRecord>, size: usize) -> Vec<Vec<ItemRecord>> {
    records
        .into_iter()
        .chunks(size.max(1))
        .into_iter()
        .map(|chunk| chunk.collect::<Vec<ItemRecord>>())
        .collect()
}

pub fn insert_mutation(chunk: &[ItemRecord]) -> Result<String, serde_json::Error> {
    let data = serde_json::to_value(chunk)?;
    Ok(format!(
        "mutation {{ insertProducts(data: {}) {{ affected_rows }} }}",
        bare_key_literal(&data)
    ))
}

/// JSON text with unquoted object keys, the GraphQL input-object syntax.
/// String values stay quoted and escaped.
pub fn bare_key_literal(value: &Value) -> String {
    let mut out = String::new();
    write_literal(value, &mut out);
    out
}

fn write_literal(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            for (i, (key, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(key);
                out.push(':');
                write_literal(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_literal(v, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
