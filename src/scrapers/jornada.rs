//! Jornada scraper.
//!
//! - **Categories** come from the main menu.
//! - **Category listing**: every article block of one category page,
//!   each enriched from its own page opened concurrently.
//! - **Top stories** (no category): categories are reordered by
//!   [`PRIORITY`], [`EXCLUDED`] ones are skipped, and a pool of 8 pages
//!   scans them until 10 articles are collected. A second pool of 16 pages
//!   fetches those articles' details.
//!
//! A failed detail fetch keeps the item with blank detail fields. The
//! summary is an excerpt of the body, and dates are normalized.

use super::{
    DetailMode, ListRequest, MAX_LIMIT, QueryParams, SiteAdapter, Timings, absolutize, clamp_limit, first_datetime,
    first_non_empty, first_text, html_or_empty, non_empty, render_page, selector, text_of,
};
use crate::browser::{BrowserPage, BrowserSession, navigate, with_page};
use crate::dates;
use crate::error::{BrowserError, QueryError, ScrapeError};
use crate::fetch::with_page_pool;
use crate::models::{ArticleDetail, Category, NewsItem};
use crate::utils::excerpt;
use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const SITE: &str = "jornada";
pub const SOURCE: &str = "Jornada";
pub const HOME: &str = "https://jornada.com.pe/";

/// Categories scanned first, in this order.
pub const PRIORITY: &[&str] = &["Actualidad", "Política", "Economía", "Mundo"];
/// Menu entries that are not news categories (compared uppercase).
pub const EXCLUDED: &[&str] = &["PORTADA", "EDICIONES"];
/// Articles returned by the top stories flow.
pub const TOP_N: usize = 10;
const CATEGORY_POOL: usize = 8;
const DETAIL_POOL: usize = 16;

static MENU_LINK: Lazy<Selector> = Lazy::new(|| selector("ul#menu-menu-principal-3 li > a"));
static BLOCK: Lazy<Selector> = Lazy::new(|| selector(".tdb_module_loop.td_module_wrap"));
static BLOCK_TITLE: Lazy<Selector> = Lazy::new(|| selector(".td-module-title a"));
static BLOCK_THUMB: Lazy<Selector> = Lazy::new(|| selector(".td-module-thumb .entry-thumb"));
static BLOCK_DATE: Lazy<Selector> = Lazy::new(|| selector(".td-post-date time"));
static BLOCK_EXCERPT: Lazy<Selector> = Lazy::new(|| selector(".td-excerpt"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("h1.tdb-title-text"));
static SUBTITLE: Lazy<Selector> = Lazy::new(|| selector(".tdb_single_subtitle .tdb-block-inner"));
static CONTENT: Lazy<Selector> = Lazy::new(|| selector(".tdb_single_content .tdb-block-inner"));
static CONTENT_TEXT: Lazy<Selector> = Lazy::new(|| selector("p, li"));
static DATE: Lazy<Selector> = Lazy::new(|| selector(".td-single-date, .tdb_single_date time, time.td-module-date"));

/// Paragraphs holding this text are social media footers.
const SOCIAL_FOOTER: &str = "Búscanos en";

/// An article block on a category page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Teaser {
    pub title: String,
    pub url: String,
    pub img: String,
    pub date: String,
    pub excerpt: String,
}

pub fn parse_categories(html: &str) -> Vec<Category> {
    let document = Html::parse_document(html);
    document
        .select(&MENU_LINK)
        .filter_map(|a| {
            let name = text_of(a);
            let url = absolutize(HOME, a.value().attr("href").unwrap_or_default());
            (!name.is_empty() && !url.is_empty()).then(|| Category::new(name, url))
        })
        .collect()
}

/// Article blocks with both a title and a link.
pub fn parse_teasers(html: &str) -> Vec<Teaser> {
    let document = Html::parse_document(html);
    document
        .select(&BLOCK)
        .filter_map(|block| {
            let a = block.select(&BLOCK_TITLE).next()?;
            let title = text_of(a);
            let href = a.value().attr("href").unwrap_or_default();
            if title.is_empty() || href.trim().is_empty() {
                return None;
            }
            Some(Teaser {
                title,
                url: absolutize(HOME, href),
                img: block
                    .select(&BLOCK_THUMB)
                    .next()
                    .and_then(|img| img.value().attr("data-img-url"))
                    .unwrap_or_default()
                    .to_string(),
                date: first_datetime(block, &BLOCK_DATE),
                excerpt: first_text(block, &BLOCK_EXCERPT),
            })
        })
        .collect()
}

pub fn parse_detail(html: &str) -> ArticleDetail {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let content = document
        .select(&CONTENT)
        .next()
        .map(|block| {
            block
                .select(&CONTENT_TEXT)
                .filter(|el| !(el.value().name() == "p" && text_of(*el).contains(SOCIAL_FOOTER)))
                .map(text_of)
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .unwrap_or_default();
    ArticleDetail {
        title: first_text(root, &TITLE),
        subtitle: first_text(root, &SUBTITLE),
        content,
        date: first_datetime(root, &DATE),
        ..Default::default()
    }
}

/// Stable priority order with the non-news entries removed.
pub fn prioritize(mut categories: Vec<Category>) -> Vec<Category> {
    let rank = |c: &Category| {
        PRIORITY
            .iter()
            .position(|p| *p == c.name)
            .unwrap_or(PRIORITY.len())
    };
    categories.sort_by_key(rank);
    categories.retain(|c| !EXCLUDED.contains(&c.name.to_uppercase().as_str()));
    categories
}

/// Build the output item. `None` means the detail page failed.
pub fn build_item(teaser: Teaser, detail: Option<ArticleDetail>, section: Option<String>) -> NewsItem {
    let base = NewsItem {
        section,
        img: Some(teaser.img.clone()),
        ..NewsItem::listing(SITE, SOURCE, teaser.title.clone(), teaser.url.clone())
    };
    match detail {
        Some(detail) => {
            let title = first_non_empty([detail.title.as_str(), teaser.title.as_str()]);
            NewsItem {
                title: title.clone(),
                summary: Some(excerpt(&detail.content)),
                date: Some(dates::normalize(&first_non_empty([
                    detail.date.as_str(),
                    teaser.date.as_str(),
                ]))),
                titulo_detalle: Some(title),
                subtitulo: Some(first_non_empty([detail.subtitle.as_str(), teaser.excerpt.as_str()])),
                contenido: Some(detail.content),
                ..base
            }
        }
        None => NewsItem {
            summary: Some(String::new()),
            date: Some(dates::normalize(&teaser.date)),
            titulo_detalle: Some(String::new()),
            subtitulo: Some(teaser.excerpt),
            contenido: Some(String::new()),
            ..base
        },
    }
}

fn summary_item(teaser: Teaser) -> NewsItem {
    NewsItem {
        summary: non_empty(teaser.excerpt),
        img: Some(teaser.img),
        date: Some(dates::normalize(&teaser.date)),
        ..NewsItem::listing(SITE, SOURCE, teaser.title, teaser.url)
    }
}

async fn read_article(page: &dyn BrowserPage, url: &str, limit: Duration) -> Result<ArticleDetail, BrowserError> {
    navigate(page, url, limit).await?;
    Ok(parse_detail(&page.content().await?))
}

async fn read_teasers(page: &dyn BrowserPage, url: &str, limit: Duration) -> Result<Vec<Teaser>, BrowserError> {
    navigate(page, url, limit).await?;
    Ok(parse_teasers(&page.content().await?))
}

fn detail_or_blank(url: &str, result: Result<ArticleDetail, BrowserError>) -> Option<ArticleDetail> {
    result
        .map_err(|e| debug!(%url, error = %e, "Detail fetch failed; using blank fields"))
        .ok()
}

pub struct Jornada {
    timings: Timings,
}

impl Jornada {
    pub fn new(timings: Timings) -> Self {
        Self { timings }
    }

    async fn load_categories(&self, session: &dyn BrowserSession) -> Result<Vec<Category>, BrowserError> {
        let html = render_page(session, HOME, self.timings.navigation).await?;
        Ok(parse_categories(&html))
    }

    /// One category page, each article enriched on a page of its own.
    async fn category_listing(
        &self,
        session: &dyn BrowserSession,
        url: &str,
        request: &ListRequest,
    ) -> Vec<NewsItem> {
        let t = self.timings;
        let listing = with_page(session, |page| async move { read_teasers(page.as_ref(), url, t.navigation).await }).await;
        let mut teasers = listing.unwrap_or_else(|e| {
            debug!(%url, error = %e, "Category page failed; returning no items");
            Vec::new()
        });
        teasers.truncate(request.limit);

        if request.detail == DetailMode::Summary {
            return teasers.into_iter().map(summary_item).collect();
        }
        join_all(teasers.into_iter().map(|teaser| async move {
            let detail = with_page(session, |page| {
                let url = teaser.url.clone();
                async move { read_article(page.as_ref(), &url, t.navigation).await }
            })
            .await;
            let detail = detail_or_blank(&teaser.url, detail);
            build_item(teaser, detail, None)
        }))
        .await
    }

    /// Top stories across categories.
    async fn top_stories(&self, session: &dyn BrowserSession, limit: usize) -> Result<Vec<NewsItem>, ScrapeError> {
        let t = self.timings;
        let categories = match self.load_categories(session).await {
            Ok(categories) => prioritize(categories),
            Err(e) => {
                debug!(error = %e, "Menu failed to load; returning no items");
                return Ok(Vec::new());
            }
        };

        let collected = AtomicUsize::new(0);
        let collected = &collected;
        let per_category = with_page_pool(session, CATEGORY_POOL, categories, |page, category| async move {
            if collected.load(Ordering::SeqCst) >= TOP_N {
                return Vec::new();
            }
            match read_teasers(page.as_ref(), &category.url, t.navigation).await {
                Ok(teasers) => {
                    collected.fetch_add(teasers.len(), Ordering::SeqCst);
                    teasers
                        .into_iter()
                        .map(|teaser| (teaser, category.name.clone()))
                        .collect()
                }
                Err(e) => {
                    debug!(url = %category.url, error = %e, "Category page failed");
                    Vec::new()
                }
            }
        })
        .await?;
        let top: Vec<(Teaser, String)> = per_category.into_iter().flatten().take(TOP_N).collect();
        info!(count = top.len(), "Collected top stories");

        let mut items = with_page_pool(session, DETAIL_POOL, top, |page, (teaser, section)| async move {
            let detail = read_article(page.as_ref(), &teaser.url, t.detail_navigation).await;
            let detail = detail_or_blank(&teaser.url, detail);
            build_item(teaser, detail, Some(section))
        })
        .await?;
        items.truncate(limit.min(TOP_N));
        Ok(items)
    }
}

#[async_trait]
impl SiteAdapter for Jornada {
    fn site(&self) -> &'static str {
        SITE
    }

    fn source(&self) -> &'static str {
        SOURCE
    }

    /// With `categoria` (a category URL or path) one category is listed;
    /// without it the top stories flow runs.
    fn resolve(&self, params: &QueryParams) -> Result<ListRequest, QueryError> {
        Ok(match params.categoria() {
            Some(categoria) => ListRequest::section(
                absolutize(HOME, categoria),
                clamp_limit(params.limit.as_deref(), MAX_LIMIT),
            ),
            None => ListRequest::front(clamp_limit(params.limit.as_deref(), TOP_N).min(TOP_N)),
        })
    }

    fn supports_categories(&self) -> bool {
        true
    }

    #[instrument(level = "info", skip_all)]
    async fn categories(&self, session: &dyn BrowserSession) -> Result<Vec<Category>, ScrapeError> {
        Ok(self.load_categories(session).await?)
    }

    #[instrument(level = "info", skip_all, fields(target = ?request.target))]
    async fn list_page(
        &self,
        session: &dyn BrowserSession,
        request: &ListRequest,
    ) -> Result<Vec<NewsItem>, ScrapeError> {
        let items = match request.target.as_deref() {
            Some(url) => self.category_listing(session, url, request).await,
            None => self.top_stories(session, request.limit).await?,
        };
        info!(count = items.len(), "Scraped Jornada");
        Ok(items)
    }

    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch_detail(&self, session: &dyn BrowserSession, url: &str) -> Result<ArticleDetail, ScrapeError> {
        let t = self.timings;
        Ok(with_page(session, |page| async move { read_article(page.as_ref(), url, t.navigation).await }).await?)
    }
}
