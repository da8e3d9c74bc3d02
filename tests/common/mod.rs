#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use listcrawl::{
    browser_controller::RenderedPage,
    site::{
        Extraction, Field, FieldRule, MissingPagination, Pagination, PaginationStrategy,
        RecordShape, SiteProfile, TargetPlan,
    },
    types::{CrawlError, CrawlTarget},
};

pub const PAGE_SIZE: u32 = 3;

/// A fake listing site served from memory. Every page is short enough to be
/// scrolled in one poll.
pub struct MockSite {
    pages: HashMap<String, String>,
    current: Mutex<Option<String>>,
    pub visits: Arc<Mutex<Vec<String>>>,
    // url -> number of navigations that still fail
    flaky: Mutex<HashMap<String, u32>>,
    // raised while navigating to the url, like a signal during a page load
    interrupt: Option<(String, Arc<AtomicBool>)>,
    released: Arc<AtomicUsize>,
}

impl MockSite {
    pub fn new(released: Arc<AtomicUsize>) -> Self {
        MockSite {
            pages: HashMap::new(),
            current: Mutex::new(None),
            visits: Arc::new(Mutex::new(vec![])),
            flaky: Mutex::new(HashMap::new()),
            interrupt: None,
            released,
        }
    }

    /// A category with `total` items spread over pages of `PAGE_SIZE`.
    pub fn with_category(mut self, target: &CrawlTarget, total: u32) -> Self {
        self.pages.insert(
            target.url.clone(),
            format!(r#"<div class="total">共 {} 笔</div>"#, total),
        );
        let pages = (total + PAGE_SIZE - 1) / PAGE_SIZE;
        for page in 1..=pages {
            let cards = (0..PAGE_SIZE.min(total - (page - 1) * PAGE_SIZE))
                .map(|i| {
                    format!(
                        r#"<a class="card" href="/{c}/{p}/{i}"><span class="title">{c}-p{p}-{i}</span><img src="/img/{i}.jpg"><b class="price">$ {i}00</b></a>"#,
                        c = target.category,
                        p = page,
                        i = i
                    )
                })
                .collect::<String>();
            self.pages.insert(
                format!("{}&page={}", target.url, page),
                format!("<html><body><h1>{}</h1>{}</body></html>", target.category, cards),
            );
        }
        self
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    pub fn without_page(mut self, url: &str) -> Self {
        self.pages.remove(url);
        self
    }

    pub fn interrupt_at(mut self, url: &str, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some((url.into(), flag));
        self
    }

    pub fn flaky(self, url: &str, failures: u32) -> Self {
        self.flaky.lock().unwrap().insert(url.into(), failures);
        self
    }
}

impl RenderedPage for MockSite {
    fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        self.visits.lock().unwrap().push(url.into());
        if let Some((at, flag)) = &self.interrupt {
            if at == url {
                flag.store(true, Ordering::SeqCst);
            }
        }

        if let Some(left) = self.flaky.lock().unwrap().get_mut(url) {
            if *left > 0 {
                *left -= 1;
                return Err(CrawlError::navigation(url, "net::ERR_CONNECTION_RESET"));
            }
        }
        if !self.pages.contains_key(url) {
            return Err(CrawlError::navigation(url, "404"));
        }
        *self.current.lock().unwrap() = Some(url.into());
        Ok(())
    }

    fn scroll_height(&self) -> Result<u64, CrawlError> {
        Ok(80)
    }

    fn scroll_by(&self, _distance: u64) -> Result<(), CrawlError> {
        Ok(())
    }

    fn html(&self) -> Result<String, CrawlError> {
        let current = self.current.lock().unwrap();
        let url = current
            .as_ref()
            .ok_or_else(|| CrawlError::Browser("no page loaded".into()))?;
        Ok(self.pages[url].clone())
    }
}

impl Drop for MockSite {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn profile() -> SiteProfile {
    SiteProfile {
        name: "mock".into(),
        source: "mock".into(),
        prefix_url: None,
        targets: TargetPlan::Fixed(vec![]),
        pagination: Pagination {
            strategy: PaginationStrategy::TotalCount {
                selector: ".total".into(),
                page_size: PAGE_SIZE,
            },
            on_missing: MissingPagination::Fail,
        },
        shape: RecordShape {
            item: ".card".into(),
            category: Extraction::text("h1"),
            fields: vec![
                (Field::Title, FieldRule::required(Extraction::text(".title"))),
                (Field::Link, FieldRule::required(Extraction::own_attr("href"))),
                (Field::Img, FieldRule::optional(Extraction::attr("img", "src"))),
                (Field::Price, FieldRule::optional(Extraction::text(".price"))),
            ],
        },
    }
}

pub fn targets() -> Vec<CrawlTarget> {
    vec![
        CrawlTarget::fixed("alpha", "https://mock.test/search?category=1"),
        CrawlTarget::fixed("beta", "https://mock.test/search?category=2"),
    ]
}

/// Two categories with 2 and 1 pages of 3 records each.
pub fn two_categories(released: Arc<AtomicUsize>) -> MockSite {
    let t = targets();
    MockSite::new(released)
        .with_category(&t[0], 6)
        .with_category(&t[1], 3)
}
