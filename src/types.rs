use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("navigation: could not load {url}: {reason}")]
    Navigation { url: String, reason: String },
    #[error("extraction_schema: {url}: {detail}")]
    ExtractionSchema { url: String, detail: String },
    #[error("scroll_timeout: {url} kept growing after {polls} polls in {elapsed:?}")]
    ScrollTimeout {
        url: String,
        polls: u32,
        elapsed: Duration,
    },
    #[error("upload_dispatch: chunk {chunk}: {reason}")]
    UploadDispatch { chunk: usize, reason: String },
    #[error("browser: {0}")]
    Browser(String),
    #[error("config: {0}")]
    Config(String),
    #[error("output: {0}")]
    Output(String),
    #[error("early_termination")]
    Cancelled,
}

impl CrawlError {
    pub fn schema(url: &str, detail: impl Into<String>) -> Self {
        CrawlError::ExtractionSchema {
            url: url.into(),
            detail: detail.into(),
        }
    }

    pub fn navigation(url: &str, reason: impl ToString) -> Self {
        CrawlError::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Failures worth another attempt at the same page. A schema mismatch
    /// will not fix itself on reload.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CrawlError::Navigation { .. } | CrawlError::ScrollTimeout { .. }
        )
    }
}

/// One listing card as scraped from a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_url: Option<String>,
    pub category: String,
    pub title: String,
    pub description: String,
    pub link: String,
    pub img: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Records of a single page, in DOM order.
pub type PageResult = Vec<ItemRecord>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub today: String,
    pub plus_30_days: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub category: String,
    pub code: Option<u32>,
    pub url: String,
    pub window: Option<DateWindow>,
    pub price_ceiling: Option<u32>,
}

impl CrawlTarget {
    pub fn fixed(category: &str, url: &str) -> Self {
        CrawlTarget {
            category: category.into(),
            code: None,
            url: url.into(),
            window: None,
            price_ceiling: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Navigating,
    Resolving,
    Stabilizing,
    Extracting,
    Advancing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollReport {
    pub polls: u32,
    pub distance: u64,
    pub height: u64,
}

/// What a crawl produced. `records` holds everything gathered before a
/// failure as well.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub records: Vec<ItemRecord>,
    pub pages: usize,
    pub state: CrawlState,
    pub error: Option<CrawlError>,
}

impl CrawlOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
pub struct ChunkReport {
    pub index: usize,
    pub size: usize,
    pub result: Result<(), CrawlError>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub records: usize,
    pub pages: usize,
    pub crawl_error: Option<CrawlError>,
    pub chunk_reports: Vec<ChunkReport>,
    pub output_error: Option<CrawlError>,
}

impl RunSummary {
    pub fn failed_chunks(&self) -> usize {
        self.chunk_reports
            .iter()
            .filter(|r| r.result.is_err())
            .count()
    }

    pub fn exit_code(&self) -> i32 {
        if self.crawl_error.is_some() || self.output_error.is_some() || self.failed_chunks() > 0 {
            return 1;
        }
        0
    }
}
