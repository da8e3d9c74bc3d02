use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;

use crate::{
    browser_controller::RenderedPage,
    extractor::{PageExtractor, PaginationResolver},
    scroller::{scroll_to_end, ScrollOptions},
    site::SiteProfile,
    types::{CrawlError, CrawlOutcome, CrawlState, CrawlTarget, ItemRecord, PageResult},
    utils::{paged_url, settle_duration},
};

#[derive(Debug, Clone)]
pub struct CrawlerOptions {
    pub scroll: ScrollOptions,
    // extra attempts per page for navigation failures and scroll timeouts
    pub page_retries: u32,
    // wait after navigation in seconds, picked uniformly in [min, max]
    pub min_wait_after_navigation: u64,
    pub max_wait_after_navigation: u64,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        CrawlerOptions {
            scroll: ScrollOptions::default(),
            page_retries: 0,
            min_wait_after_navigation: 0,
            max_wait_after_navigation: 0,
        }
    }
}

/// Drives one browser session through every target and every page of it,
/// strictly one page at a time. The session is owned here and released when
/// the crawl ends, whatever the outcome.
pub struct Crawler<P: RenderedPage> {
    session: P,
    extractor: PageExtractor,
    resolver: PaginationResolver,
    options: CrawlerOptions,
    state: CrawlState,
    should_terminate: Arc<AtomicBool>,
}

impl<P: RenderedPage> Crawler<P> {
    pub fn new(
        session: P,
        profile: &SiteProfile,
        options: CrawlerOptions,
        should_terminate: Arc<AtomicBool>,
    ) -> Result<Self, CrawlError> {
        Ok(Crawler {
            session,
            extractor: PageExtractor::new(profile)?,
            resolver: PaginationResolver::new(&profile.pagination)?,
            options,
            state: CrawlState::Idle,
            should_terminate,
        })
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub async fn crawl(mut self, targets: &[CrawlTarget]) -> CrawlOutcome {
        let mut records = Vec::new();
        let mut pages = 0;

        let result = self.crawl_targets(targets, &mut records, &mut pages).await;
        let error = match result {
            Ok(()) => {
                self.transition(CrawlState::Done);
                None
            }
            Err(e) => {
                error!("crawl failed after {} pages: {}", pages, e);
                self.transition(CrawlState::Failed);
                Some(e)
            }
        };
        let state = self.state;

        // releases the browser session
        drop(self);

        info!(
            "crawl ended in {:?} with {} records from {} pages",
            state,
            records.len(),
            pages
        );

        CrawlOutcome {
            records,
            pages,
            state,
            error,
        }
    }

    async fn crawl_targets(
        &mut self,
        targets: &[CrawlTarget],
        records: &mut Vec<ItemRecord>,
        pages: &mut usize,
    ) -> Result<(), CrawlError> {
        for target in targets {
            self.transition(CrawlState::Navigating);
            info!("Current URL: {}", target.url);
            self.navigate_with_retries(&target.url).await?;

            self.transition(CrawlState::Resolving);
            let html = self.session.html()?;
            let total_pages = self.resolver.resolve(&html, &target.url)?;

            for page in 1..=total_pages {
                let url = paged_url(&target.url, page);
                let result = self.crawl_page(&url).await?;
                debug!("page {} of {} yielded {} records", page, target.category, result.len());
                records.extend(result);
                *pages += 1;

                self.transition(CrawlState::Advancing);
                info!("page {} is done", page);
            }
        }
        Ok(())
    }

    async fn navigate_with_retries(&mut self, url: &str) -> Result<(), CrawlError> {
        let mut attempt = 0;
        loop {
            match self.navigate(url).await {
                Err(e) if e.is_transient() && attempt < self.options.page_retries => {
                    attempt += 1;
                    warn!("retrying {} ({}/{}): {}", url, attempt, self.options.page_retries, e);
                }
                other => return other,
            }
        }
    }

    async fn crawl_page(&mut self, url: &str) -> Result<PageResult, CrawlError> {
        let mut attempt = 0;
        loop {
            match self.visit_page(url).await {
                Err(e) if e.is_transient() && attempt < self.options.page_retries => {
                    attempt += 1;
                    warn!(
                        "retrying page {} ({}/{}): {}",
                        url, attempt, self.options.page_retries, e
                    );
                }
                other => return other,
            }
        }
    }

    async fn visit_page(&mut self, url: &str) -> Result<PageResult, CrawlError> {
        self.transition(CrawlState::Navigating);
        self.navigate(url).await?;

        self.transition(CrawlState::Stabilizing);
        scroll_to_end(
            &self.session,
            url,
            &self.options.scroll,
            &self.should_terminate,
        )
        .await?;

        self.transition(CrawlState::Extracting);
        let html = self.session.html()?;
        self.extractor.extract(&html, url)
    }

    // the termination flag is checked on both sides of the blocking navigation
    async fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        self.check_terminated()?;
        self.session.navigate(url)?;

        let settle = settle_duration(
            self.options.min_wait_after_navigation,
            self.options.max_wait_after_navigation,
        );
        if settle > Duration::ZERO {
            debug!("sleeping for {:?}", settle);
            sleep(settle).await;
        }
        self.check_terminated()
    }

    fn check_terminated(&self) -> Result<(), CrawlError> {
        if self.should_terminate.load(Ordering::Relaxed) {
            return Err(CrawlError::Cancelled);
        }
        Ok(())
    }

    fn transition(&mut self, next: CrawlState) {
        debug!("crawl state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
