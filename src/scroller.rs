use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};
use tokio::time::sleep;

use crate::{
    browser_controller::RenderedPage,
    types::{CrawlError, ScrollReport},
};

#[derive(Debug, Clone)]
pub struct ScrollOptions {
    pub step: u64,
    pub interval: Duration,
    pub max_polls: u32,
    pub timeout: Duration,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        ScrollOptions {
            step: 100,
            interval: Duration::from_millis(100),
            max_polls: 600,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Scrolls down `step` pixels per poll until the scrolled distance catches up
/// with the page height, so lazily loaded cards end up in the DOM.
pub async fn scroll_to_end<P: RenderedPage + ?Sized>(
    page: &P,
    url: &str,
    options: &ScrollOptions,
    should_terminate: &AtomicBool,
) -> Result<ScrollReport, CrawlError> {
    let started = Instant::now();
    let mut distance = 0u64;
    let mut polls = 0u32;

    loop {
        sleep(options.interval).await;
        if should_terminate.load(Ordering::Relaxed) {
            return Err(CrawlError::Cancelled);
        }

        let height = page.scroll_height()?;
        page.scroll_by(options.step)?;
        distance += options.step;
        polls += 1;

        if distance >= height {
            debug!("scrolling ended after {} polls at height {}", polls, height);
            return Ok(ScrollReport {
                polls,
                distance,
                height,
            });
        }

        if polls >= options.max_polls || started.elapsed() >= options.timeout {
            return Err(CrawlError::ScrollTimeout {
                url: url.into(),
                polls,
                elapsed: started.elapsed(),
            });
        }
    }
}
