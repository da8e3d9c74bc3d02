use scraper::{ElementRef, Html, Selector};

use crate::{
    site::{
        Cleanup, Extraction, Field, MissingPagination, Pagination, PaginationStrategy, SiteProfile,
        TextSource,
    },
    types::{CrawlError, ItemRecord, PageResult},
};

fn compile(selector: &str) -> Result<Selector, CrawlError> {
    Selector::parse(selector)
        .map_err(|e| CrawlError::Config(format!("invalid selector `{}`: {:?}", selector, e)))
}

/// innerText-like reading: text nodes joined, whitespace runs collapsed.
fn inner_text(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

struct CompiledExtraction {
    selector: Option<Selector>,
    source: TextSource,
}

impl CompiledExtraction {
    fn new(extraction: &Extraction) -> Result<Self, CrawlError> {
        Ok(CompiledExtraction {
            selector: extraction.selector.as_deref().map(compile).transpose()?,
            source: extraction.source.clone(),
        })
    }

    fn read(&self, scope: ElementRef) -> Option<String> {
        let el = match &self.selector {
            Some(s) => scope.select(s).next()?,
            None => scope,
        };
        match &self.source {
            TextSource::Text => Some(inner_text(el)),
            TextSource::Attr(name) => el.value().attr(name).map(|v| v.trim().to_string()),
        }
    }
}

struct CompiledRule {
    parts: Vec<CompiledExtraction>,
    required: bool,
    cleanup: Vec<Cleanup>,
}

impl CompiledRule {
    /// `None` when no part of the rule matched anything.
    fn read(&self, card: ElementRef) -> Option<String> {
        let found: Vec<String> = self.parts.iter().filter_map(|p| p.read(card)).collect();
        if found.is_empty() {
            return None;
        }
        let joined = found.join(" ");
        let cleaned = self
            .cleanup
            .iter()
            .fold(joined, |value, step| step.apply(&value));
        Some(cleaned.trim().to_string())
    }
}

/// Turns a rendered listing page into records according to a site's
/// record shape. Selectors are compiled once per run.
pub struct PageExtractor {
    source: String,
    prefix_url: Option<String>,
    item: Selector,
    category: CompiledExtraction,
    fields: Vec<(Field, CompiledRule)>,
}

impl PageExtractor {
    pub fn new(profile: &SiteProfile) -> Result<Self, CrawlError> {
        let shape = &profile.shape;
        let fields = shape
            .fields
            .iter()
            .map(|(field, rule)| {
                let parts = rule
                    .parts
                    .iter()
                    .map(CompiledExtraction::new)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((
                    *field,
                    CompiledRule {
                        parts,
                        required: rule.required,
                        cleanup: rule.cleanup.clone(),
                    },
                ))
            })
            .collect::<Result<Vec<_>, CrawlError>>()?;

        Ok(PageExtractor {
            source: profile.source.clone(),
            prefix_url: profile.prefix_url.clone(),
            item: compile(&shape.item)?,
            category: CompiledExtraction::new(&shape.category)?,
            fields,
        })
    }

    pub fn extract(&self, html: &str, url: &str) -> Result<PageResult, CrawlError> {
        let doc = Html::parse_document(html);
        let cards: Vec<ElementRef> = doc.select(&self.item).collect();
        if cards.is_empty() {
            return Ok(vec![]);
        }

        let category = self
            .category
            .read(doc.root_element())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CrawlError::schema(url, "category label missing"))?;

        cards
            .into_iter()
            .enumerate()
            .map(|(position, card)| self.extract_item(card, &category, position, url))
            .collect()
    }

    fn extract_item(
        &self,
        card: ElementRef,
        category: &str,
        position: usize,
        url: &str,
    ) -> Result<ItemRecord, CrawlError> {
        let mut record = ItemRecord {
            source: self.source.clone(),
            prefix_url: self.prefix_url.clone(),
            category: category.into(),
            title: String::new(),
            description: String::new(),
            link: String::new(),
            img: String::new(),
            price: None,
            date: None,
        };

        for (field, rule) in &self.fields {
            let value = match rule.read(card) {
                Some(v) if !(rule.required && v.is_empty()) => v,
                _ if rule.required => {
                    return Err(CrawlError::schema(
                        url,
                        format!("item {} has no {}", position, field.name()),
                    ))
                }
                _ => String::new(),
            };

            match field {
                Field::Title => record.title = value,
                Field::Description => record.description = value,
                Field::Link => record.link = value,
                Field::Img => record.img = value,
                Field::Price => record.price = Some(value),
                Field::Date => record.date = Some(value),
            }
        }

        Ok(record)
    }
}

enum CompiledStrategy {
    TotalCount { selector: Selector, page_size: u32 },
    LastControl { container: Selector, next: Selector },
}

pub struct PaginationResolver {
    strategy: CompiledStrategy,
    on_missing: MissingPagination,
}

impl PaginationResolver {
    pub fn new(pagination: &Pagination) -> Result<Self, CrawlError> {
        let strategy = match &pagination.strategy {
            PaginationStrategy::TotalCount {
                selector,
                page_size,
            } => {
                if *page_size == 0 {
                    return Err(CrawlError::Config("page size must be positive".into()));
                }
                CompiledStrategy::TotalCount {
                    selector: compile(selector)?,
                    page_size: *page_size,
                }
            }
            PaginationStrategy::LastControl { container, next } => CompiledStrategy::LastControl {
                container: compile(container)?,
                next: compile(next)?,
            },
        };
        Ok(PaginationResolver {
            strategy,
            on_missing: pagination.on_missing,
        })
    }

    pub fn resolve(&self, html: &str, url: &str) -> Result<u32, CrawlError> {
        let doc = Html::parse_document(html);

        let total = match &self.strategy {
            CompiledStrategy::TotalCount {
                selector,
                page_size,
            } => match doc.select(selector).next() {
                Some(summary) => {
                    let text = inner_text(summary);
                    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
                    let count: u32 = digits.parse().map_err(|_| {
                        CrawlError::schema(url, format!("no item count in summary `{}`", text))
                    })?;
                    count.div_ceil(*page_size)
                }
                None => self.missing(url)?,
            },
            CompiledStrategy::LastControl { container, next } => {
                match doc.select(container).next() {
                    Some(widget) => {
                        let next_control = widget.select(next).next().ok_or_else(|| {
                            CrawlError::schema(url, "pagination has no next control")
                        })?;
                        let last = next_control
                            .prev_siblings()
                            .find_map(ElementRef::wrap)
                            .ok_or_else(|| {
                                CrawlError::schema(url, "nothing precedes the next control")
                            })?;
                        let label = inner_text(last);
                        label.parse().map_err(|_| {
                            CrawlError::schema(url, format!("last page label `{}`", label))
                        })?
                    }
                    None => self.missing(url)?,
                }
            }
        };

        info!("Total {} page(s) at {}", total, url);
        Ok(total)
    }

    fn missing(&self, url: &str) -> Result<u32, CrawlError> {
        match self.on_missing {
            MissingPagination::SinglePage => Ok(1),
            MissingPagination::Fail => Err(CrawlError::schema(url, "pagination summary missing")),
        }
    }
}
