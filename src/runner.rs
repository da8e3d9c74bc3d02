use std::{
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use anyhow::Context;
use signal_hook::consts::{SIGINT, SIGTERM};
use tokio::fs;

use crate::{
    browser_controller::{ChromeSession, RenderedPage, SessionOptions},
    crawler::{Crawler, CrawlerOptions},
    scroller::ScrollOptions,
    site::{SiteProfile, NICEDAY},
    types::{CrawlError, CrawlTarget, ItemRecord, RunSummary},
    uploader::{Destination, UploadOptions, Uploader},
    utils::{Clock, MAX_CHUNK_SIZE},
};

pub struct Runner {
    uploader: Option<Uploader>,
    options: RunnerOptions,
    should_terminate: Arc<AtomicBool>,
}

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct RunnerOptions {
    // which listing site to crawl
    #[builder(default = "self.default_profile()")]
    profile: SiteProfile,
    // highest price included in search urls, 3000 when unset
    #[builder(default = "None")]
    price_ceiling: Option<u32>,
    // where records are relayed to, nothing is uploaded when unset
    #[builder(default = "None")]
    destination: Option<Destination>,
    // json file receiving every record of a successful run
    #[builder(default = "None")]
    output: Option<PathBuf>,
    #[builder(default = "MAX_CHUNK_SIZE")]
    chunk_size: usize,
    // chunks in flight at once
    #[builder(default = "10")]
    upload_concurrency: usize,
    // per request timeout in seconds
    #[builder(default = "30")]
    upload_timeout: u64,
    // skip certificate validation of the upload endpoint
    #[builder(default = "false")]
    insecure_tls: bool,
    #[builder(default = "false")]
    debug: bool,
    // pixels per scroll poll
    #[builder(default = "100")]
    scroll_step: u64,
    #[builder(default = "100")]
    scroll_interval_ms: u64,
    #[builder(default = "600")]
    max_scroll_polls: u32,
    // scroll timeout in seconds
    #[builder(default = "60")]
    scroll_timeout: u64,
    // browser navigation timeout in seconds
    #[builder(default = "45")]
    timeout: u64,
    #[builder(default = "0")]
    page_retries: u32,
    // minimum wait time after navigation in seconds
    #[builder(default = "0")]
    min_wait_after_navigation: u64,
    // maximum wait time after navigation in seconds
    #[builder(default = "0")]
    max_wait_after_navigation: u64,
}

impl RunnerOptions {
    pub fn default_builder() -> RunnerOptionsBuilder {
        RunnerOptionsBuilder::default()
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }
}

impl RunnerOptionsBuilder {
    fn default_profile(&self) -> SiteProfile {
        NICEDAY.clone()
    }
}

impl Runner {
    pub fn new(options: RunnerOptions) -> anyhow::Result<Self> {
        let uploader = match &options.destination {
            Some(destination) => Some(
                Uploader::new(destination.clone(), &options.upload_options())
                    .context("could not instantiate uploader")?,
            ),
            None => None,
        };

        let should_terminate = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, Arc::clone(&should_terminate))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&should_terminate))?;

        Ok(Runner {
            uploader,
            options,
            should_terminate,
        })
    }

    pub fn targets(&self, clock: &dyn Clock) -> Vec<CrawlTarget> {
        self.options
            .profile
            .targets(clock, self.options.price_ceiling)
    }

    pub async fn run(&self, clock: &dyn Clock) -> anyhow::Result<RunSummary> {
        let targets = self.targets(clock);
        info!(
            "initializing crawl of {} with {} targets and {} page retries",
            self.options.profile.name,
            targets.len(),
            self.options.page_retries
        );

        let session = ChromeSession::launch(&self.options.session_options())
            .context("could not start the browser session")?;

        Ok(self.run_with(session, &targets).await?)
    }

    /// Crawls `targets` on an already acquired session, then writes and
    /// uploads whatever was gathered. A failed crawl still uploads its
    /// partial records but never writes the output file.
    pub async fn run_with<P: RenderedPage>(
        &self,
        session: P,
        targets: &[CrawlTarget],
    ) -> Result<RunSummary, CrawlError> {
        let crawler = Crawler::new(
            session,
            &self.options.profile,
            self.options.crawler_options(),
            self.should_terminate.clone(),
        )?;
        let outcome = crawler.crawl(targets).await;
        let records = outcome.records.len();

        let output_error = match &self.options.output {
            Some(path) if outcome.is_success() => {
                Self::write_output(path, &outcome.records).await.err()
            }
            Some(path) => {
                warn!("crawl failed, not writing {:?}", path);
                None
            }
            None => None,
        };

        let chunk_reports = match &self.uploader {
            Some(uploader) if records > 0 => {
                uploader
                    .upload(outcome.records, &self.should_terminate)
                    .await
            }
            _ => vec![],
        };

        let summary = RunSummary {
            records,
            pages: outcome.pages,
            crawl_error: outcome.error,
            chunk_reports,
            output_error,
        };
        info!(
            "There are {} items from {} pages, {} chunks failed",
            summary.records,
            summary.pages,
            summary.failed_chunks()
        );
        Ok(summary)
    }

    async fn write_output(path: &Path, records: &[ItemRecord]) -> Result<(), CrawlError> {
        let data = serde_json::to_string(records)
            .map_err(|e| CrawlError::Output(format!("could not serialize records: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CrawlError::Output(format!("{:?}: {}", parent, e)))?;
        }
        fs::write(path, data)
            .await
            .map_err(|e| CrawlError::Output(format!("{:?}: {}", path, e)))?;

        info!("JSON file saved to {:?}", path);
        Ok(())
    }
}

impl RunnerOptions {
    fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            chunk_size: self.chunk_size,
            concurrency: self.upload_concurrency,
            request_timeout: Duration::from_secs(self.upload_timeout),
            insecure_tls: self.insecure_tls,
            debug: self.debug,
        }
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            navigation_timeout: Duration::from_secs(self.timeout),
            ..Default::default()
        }
    }

    fn crawler_options(&self) -> CrawlerOptions {
        CrawlerOptions {
            scroll: ScrollOptions {
                step: self.scroll_step,
                interval: Duration::from_millis(self.scroll_interval_ms),
                max_polls: self.max_scroll_polls,
                timeout: Duration::from_secs(self.scroll_timeout),
            },
            page_retries: self.page_retries,
            min_wait_after_navigation: self.min_wait_after_navigation,
            max_wait_after_navigation: self.max_wait_after_navigation,
        }
    }
}
