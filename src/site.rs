//! Per-site crawl configuration: where the listings live, how pagination is
//! read and which DOM locations hold each record field.

use crate::{
    types::CrawlTarget,
    utils::{generate_targets, Clock, CATEGORIES},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextSource {
    Text,
    Attr(String),
}

/// A single DOM read. `selector: None` reads the item card itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub selector: Option<String>,
    pub source: TextSource,
}

impl Extraction {
    pub fn text(selector: &str) -> Self {
        Extraction {
            selector: Some(selector.into()),
            source: TextSource::Text,
        }
    }

    pub fn attr(selector: &str, attr: &str) -> Self {
        Extraction {
            selector: Some(selector.into()),
            source: TextSource::Attr(attr.into()),
        }
    }

    pub fn own_attr(attr: &str) -> Self {
        Extraction {
            selector: None,
            source: TextSource::Attr(attr.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    Remove(String),
    LeadingNonDigits,
}

impl Cleanup {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Cleanup::Remove(needle) => value.replace(needle.as_str(), ""),
            Cleanup::LeadingNonDigits => value
                .trim_start_matches(|c: char| !c.is_ascii_digit())
                .to_string(),
        }
    }
}

/// How one field is read. Parts that match are joined with a space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub parts: Vec<Extraction>,
    pub required: bool,
    pub cleanup: Vec<Cleanup>,
}

impl FieldRule {
    pub fn required(part: Extraction) -> Self {
        FieldRule {
            parts: vec![part],
            required: true,
            cleanup: vec![],
        }
    }

    pub fn optional(part: Extraction) -> Self {
        FieldRule {
            parts: vec![part],
            required: false,
            cleanup: vec![],
        }
    }

    pub fn with_cleanup(mut self, cleanup: Cleanup) -> Self {
        self.cleanup.push(cleanup);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Description,
    Link,
    Img,
    Price,
    Date,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Description => "description",
            Field::Link => "link",
            Field::Img => "img",
            Field::Price => "price",
            Field::Date => "date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShape {
    /// Selector matching every item card on the page.
    pub item: String,
    /// Page-level category label, read once per page.
    pub category: Extraction,
    pub fields: Vec<(Field, FieldRule)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPagination {
    SinglePage,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationStrategy {
    /// Summary text holding the total item count, e.g. "共 45 笔".
    TotalCount { selector: String, page_size: u32 },
    /// The numbered control right before the "next" control is the last page.
    LastControl { container: String, next: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub strategy: PaginationStrategy,
    pub on_missing: MissingPagination,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPlan {
    /// Parameterized category searches.
    Search { categories: Vec<(String, u32)> },
    /// Listing pages with fixed addresses.
    Fixed(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteProfile {
    pub name: String,
    pub source: String,
    pub prefix_url: Option<String>,
    pub targets: TargetPlan,
    pub pagination: Pagination,
    pub shape: RecordShape,
}

impl SiteProfile {
    pub fn targets(&self, clock: &dyn Clock, price_ceiling: Option<u32>) -> Vec<CrawlTarget> {
        match &self.targets {
            TargetPlan::Search { categories } => {
                generate_targets(clock, categories, price_ceiling)
            }
            TargetPlan::Fixed(urls) => urls
                .iter()
                .map(|(name, url)| CrawlTarget::fixed(name, url))
                .collect(),
        }
    }
}

pub fn profile_for(name: &str) -> Option<SiteProfile> {
    match name {
        "niceday" => Some(NICEDAY.clone()),
        "yahoo-movies" => Some(YAHOO_MOVIES.clone()),
        _ => None,
    }
}

lazy_static! {
    pub static ref NICEDAY: SiteProfile = SiteProfile {
        name: "niceday".into(),
        source: "niceday".into(),
        prefix_url: Some("//play.niceday.tw".into()),
        targets: TargetPlan::Search {
            categories: CATEGORIES
                .iter()
                .map(|(name, code)| (name.to_string(), *code))
                .collect(),
        },
        pagination: Pagination {
            strategy: PaginationStrategy::TotalCount {
                selector: ".oyukgo-0-Flexbox__FlexCenterStart-bBQGLq.fzYyhz > span".into(),
                page_size: 20,
            },
            on_missing: MissingPagination::Fail,
        },
        shape: RecordShape {
            item: ".CardGellory__StyledProductCard-rj4q7h-0.fGdaHg.ProductCard__A-sc-1vcdm7s-0.cXwraG"
                .into(),
            category: Extraction::text(".search__CategoryBannerTitle-oafeo4-3.bFWIL"),
            fields: vec![
                (
                    Field::Title,
                    FieldRule::required(Extraction::text(".ProductCard__Title-sc-1vcdm7s-4.beFbhb")),
                ),
                (
                    Field::Description,
                    FieldRule::optional(Extraction::text(
                        ".ProductCard__Description-sc-1vcdm7s-6.kCzSOS",
                    )),
                ),
                (Field::Link, FieldRule::required(Extraction::own_attr("href"))),
                (Field::Img, FieldRule::optional(Extraction::attr("img", "src"))),
                (
                    Field::Price,
                    FieldRule::optional(Extraction::text(".ProductCard__Price-sc-1vcdm7s-3.jmhEVM")),
                ),
            ],
        },
    };
    pub static ref YAHOO_MOVIES: SiteProfile = SiteProfile {
        name: "yahoo-movies".into(),
        source: "yahoo-movies".into(),
        prefix_url: None,
        targets: TargetPlan::Fixed(vec![
            (
                "thisWeek".into(),
                "https://movies.yahoo.com.tw/movie_thisweek.html".into()
            ),
            (
                "inTheater".into(),
                "https://movies.yahoo.com.tw/movie_intheaters.html".into()
            ),
        ]),
        pagination: Pagination {
            strategy: PaginationStrategy::LastControl {
                container: ".page_numbox".into(),
                next: ".nexttxt".into(),
            },
            on_missing: MissingPagination::SinglePage,
        },
        shape: RecordShape {
            item: ".release_list li".into(),
            category: Extraction::text(".title > h1"),
            fields: vec![
                (
                    Field::Title,
                    FieldRule {
                        parts: vec![
                            Extraction::text(".release_movie_name > a"),
                            Extraction::text(".release_movie_name .en"),
                        ],
                        required: true,
                        cleanup: vec![],
                    },
                ),
                (
                    Field::Description,
                    FieldRule::optional(Extraction::text(".release_text"))
                        .with_cleanup(Cleanup::Remove("詳全文".into())),
                ),
                (
                    Field::Link,
                    FieldRule::required(Extraction::attr(".release_foto > a", "href")),
                ),
                (
                    Field::Img,
                    FieldRule::optional(Extraction::attr(".release_foto > a img", "src")),
                ),
                (
                    Field::Date,
                    FieldRule::optional(Extraction::text(".release_movie_time"))
                        .with_cleanup(Cleanup::LeadingNonDigits),
                ),
            ],
        },
    };
}
