use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::time::Duration;

use crate::types::{CrawlTarget, DateWindow};

pub const NICEDAY_SEARCH_URL: &str = "https://play.niceday.tw/category/search";
pub const NICEDAY_AREA: u32 = 223;
pub const DEFAULT_PRICE_CEILING: u32 = 3000;
pub const SEARCH_WINDOW_DAYS: i64 = 30;
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const MAX_CHUNK_SIZE: usize = 100;

/// niceday category name and its numeric search code, in crawl order.
pub const CATEGORIES: &[(&str, u32)] = &[
    ("art", 12),
    ("cooking", 8),
    ("outdoors", 16),
    ("lifestyle", 341),
];

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn date_window(clock: &dyn Clock) -> DateWindow {
    let today = clock.now().date_naive();
    let later = today + ChronoDuration::days(SEARCH_WINDOW_DAYS);
    DateWindow {
        today: today.format(DATE_FORMAT).to_string(),
        plus_30_days: later.format(DATE_FORMAT).to_string(),
    }
}

pub fn search_url(code: u32, price_ceiling: u32, window: &DateWindow) -> String {
    format!(
        "{}?query=&keyword=&category={}&sort=price_asc&area={}&tags=none&price_from=0&price_to={}&start_date={}&end_date={}",
        NICEDAY_SEARCH_URL, code, NICEDAY_AREA, price_ceiling, window.today, window.plus_30_days
    )
}

/// One search target per category, all sharing the same date window.
pub fn generate_targets(
    clock: &dyn Clock,
    categories: &[(String, u32)],
    price_ceiling: Option<u32>,
) -> Vec<CrawlTarget> {
    let price = price_ceiling.unwrap_or(DEFAULT_PRICE_CEILING);
    let window = date_window(clock);

    categories
        .iter()
        .map(|(name, code)| CrawlTarget {
            category: name.clone(),
            code: Some(*code),
            url: search_url(*code, price, &window),
            window: Some(window.clone()),
            price_ceiling: Some(price),
        })
        .collect()
}

pub fn paged_url(base: &str, page: u32) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}page={}", base, separator, page)
}

/// Pause after a navigation so late scripts can settle.
pub fn settle_duration(min_secs: u64, max_secs: u64) -> Duration {
    if max_secs <= min_secs {
        return Duration::from_secs(min_secs);
    }
    let mut rng = rand::thread_rng();
    Duration::from_secs(rng.gen_range(min_secs..=max_secs))
}
