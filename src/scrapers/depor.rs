//! Depor football sections with cached detail enrichment.
//!
//! A listing request reads the story list of one section. In full mode
//! each story is enriched from its article page, in batches of 8, unless
//! the site's [`DetailCache`] already holds a non-empty body for the same
//! `(url, date)`. Stories whose article page fails are dropped. Fresh
//! details are upserted into the in-memory snapshot as they arrive and the
//! snapshot is written back once at the end. Returned dates are
//! normalized; cached entries keep the raw listing date they are keyed on.
//!
//! Summary mode ("resumen") returns only title, image and URL for stories
//! that have both a title and an image.

use super::{
    DetailMode, ListRequest, QueryParams, SiteAdapter, Timings, absolutize, clamp_limit, first_attr, first_datetime,
    first_non_empty, first_text, html_or_empty, selector, text_of,
};
use crate::browser::{BrowserSession, navigate, wait_for, wait_or_proceed, with_page};
use crate::cache::{CacheSnapshot, DetailCache};
use crate::dates;
use crate::error::{BrowserError, QueryError, ScrapeError};
use crate::fetch::in_batches;
use crate::models::{ArticleDetail, NewsItem};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

pub const SITE: &str = "eldepor";
/// Tag stored in `NewsItem::id` and used as the cache file name.
pub const TAG: &str = "depor";
pub const SOURCE: &str = "Depor";
pub const BASE: &str = "https://depor.com";
pub const PERUANO_URL: &str = "https://depor.com/futbol-peruano/";
pub const INTERNACIONAL_URL: &str = "https://depor.com/futbol-internacional/";

const DEFAULT_LIMIT: usize = 20;
const DETAIL_BATCH: usize = 8;

static STORY: Lazy<Selector> = Lazy::new(|| selector(".stories-news__list .story-item"));
static STORY_TITLE: Lazy<Selector> = Lazy::new(|| selector("a.story-item__title"));
static STORY_IMG: Lazy<Selector> = Lazy::new(|| selector("img.story-item__img"));
static STORY_SUBTITLE: Lazy<Selector> = Lazy::new(|| selector("p.story-item__subtitle"));
static STORY_SECTION: Lazy<Selector> = Lazy::new(|| selector("a.story-item__section"));
static STORY_DATE: Lazy<Selector> = Lazy::new(|| selector("p.story-item__date"));

static HEADLINE: Lazy<Selector> = Lazy::new(|| selector(".sht__title"));
static CATEGORY: Lazy<Selector> = Lazy::new(|| selector(".sht__category a"));
static SUMMARY: Lazy<Selector> = Lazy::new(|| selector(".sht__summary"));
static PUBLISHED: Lazy<Selector> = Lazy::new(|| selector(".story-contents__author-date time"));
static LEAD_IMAGE: Lazy<Selector> = Lazy::new(|| selector(".s-multimedia picture img"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("#contenedor p.story-contents__font-paragraph"));
static LIVE_BLOCK: Lazy<Selector> = Lazy::new(|| selector(".live-event2-comment.score"));
static P: Lazy<Selector> = Lazy::new(|| selector("p"));

/// Section URL for a `categoria` value.
pub fn category_url(categoria: &str) -> Option<&'static str> {
    match categoria {
        "peruano" => Some(PERUANO_URL),
        "internacional" => Some(INTERNACIONAL_URL),
        _ => None,
    }
}

/// One story as shown on a section page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Story {
    pub title: String,
    pub url: String,
    pub img: String,
    pub subtitle: String,
    pub section: String,
    pub date: String,
}

impl Story {
    fn into_item(self) -> NewsItem {
        NewsItem {
            subtitle: Some(self.subtitle),
            section: Some(self.section),
            img: Some(self.img),
            date: Some(self.date),
            ..NewsItem::listing(TAG, SOURCE, self.title, self.url)
        }
    }

    fn into_resumen(self) -> NewsItem {
        NewsItem {
            img: Some(self.img),
            ..NewsItem::listing(TAG, SOURCE, self.title, self.url)
        }
    }
}

/// The first `limit` stories of a section page.
pub fn parse_stories(html: &str, limit: usize) -> Vec<Story> {
    let document = Html::parse_document(html);
    document
        .select(&STORY)
        .take(limit)
        .map(|story| {
            let (title, url) = story
                .select(&STORY_TITLE)
                .next()
                .map(|a| (text_of(a), absolutize(BASE, a.value().attr("href").unwrap_or_default())))
                .unwrap_or_default();
            Story {
                title,
                url,
                img: first_attr(story, &STORY_IMG, "src"),
                subtitle: first_text(story, &STORY_SUBTITLE),
                section: first_text(story, &STORY_SECTION),
                date: first_text(story, &STORY_DATE),
            }
        })
        .collect()
}

fn has_stories(document: &Html) -> bool {
    document.select(&STORY).next().is_some()
}

fn has_headline(document: &Html) -> bool {
    document.select(&HEADLINE).next().is_some()
}

/// Article page fields. The body is the story paragraphs; live coverage
/// pages fall back to their comment blocks.
pub fn parse_detail(html: &str) -> ArticleDetail {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let mut content = document
        .select(&PARAGRAPH)
        .map(text_of)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if content.trim().is_empty() {
        content = document
            .select(&LIVE_BLOCK)
            .map(|block| {
                block
                    .select(&P)
                    .map(text_of)
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
    }

    ArticleDetail {
        title: first_text(root, &HEADLINE),
        subtitle: first_text(root, &SUMMARY),
        content,
        section: first_text(root, &CATEGORY),
        date: first_datetime(root, &PUBLISHED),
        img: first_attr(root, &LEAD_IMAGE, "src"),
    }
}

/// Combine a listing item with its article page. Detail fields win except
/// for the date, which keeps the listing value that cache lookups use.
pub fn merge_detail(item: NewsItem, detail: ArticleDetail) -> NewsItem {
    let listing = |field: &Option<String>| field.as_deref().unwrap_or("").to_string();
    let (subtitle, section, img, date) = (
        listing(&item.subtitle),
        listing(&item.section),
        listing(&item.img),
        listing(&item.date),
    );
    NewsItem {
        id: TAG.to_string(),
        title: first_non_empty([detail.title.as_str(), item.title.as_str()]),
        subtitle: Some(first_non_empty([detail.subtitle.as_str(), subtitle.as_str()])),
        section: Some(first_non_empty([detail.section.as_str(), section.as_str()])),
        img: Some(first_non_empty([detail.img.as_str(), img.as_str()])),
        date: Some(first_non_empty([date.as_str(), detail.date.as_str()])),
        content: Some(detail.content),
        url: item.url,
        source: SOURCE.to_string(),
        ..Default::default()
    }
}

/// Normalize the date of an item leaving the adapter. The cache keeps the
/// raw listing date since that is what the next lookup sees.
fn published(mut item: NewsItem) -> NewsItem {
    item.date = dates::normalize_opt(item.date.as_deref());
    item
}

enum Enriched {
    Cached(NewsItem),
    Fresh(NewsItem),
}

fn lock(snapshot: &Mutex<CacheSnapshot>) -> MutexGuard<'_, CacheSnapshot> {
    snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Depor {
    cache: DetailCache,
    timings: Timings,
}

impl Depor {
    pub fn new(cache_dir: &Path, timings: Timings) -> Self {
        Self {
            cache: DetailCache::for_site(cache_dir, TAG),
            timings,
        }
    }

    async fn load_stories(&self, session: &dyn BrowserSession, url: &str, limit: usize) -> Vec<Story> {
        let t = self.timings;
        let html = with_page(session, |page| async move {
            navigate(page.as_ref(), url, t.navigation).await?;
            wait_or_proceed(page.as_ref(), "story list", t.listing_wait, t.poll_interval, has_stories).await?;
            page.content().await
        })
        .await;
        parse_stories(&html_or_empty(html, url), limit)
    }

    async fn load_detail(&self, session: &dyn BrowserSession, url: &str) -> Result<ArticleDetail, BrowserError> {
        let t = self.timings;
        with_page(session, |page| async move {
            navigate(page.as_ref(), url, t.detail_navigation).await?;
            wait_for(page.as_ref(), "article headline", t.short_wait, t.poll_interval, has_headline).await?;
            Ok(parse_detail(&page.content().await?))
        })
        .await
    }

    /// Cache hit, fresh detail, or `None`: stories whose detail fails or
    /// whose URL is empty or relative are dropped, not passed through.
    async fn enrich(
        &self,
        session: &dyn BrowserSession,
        snapshot: &Mutex<CacheSnapshot>,
        item: NewsItem,
    ) -> Option<Enriched> {
        let cached = {
            let snapshot = lock(snapshot);
            snapshot.lookup(&item.url, item.date.as_deref()).cloned()
        };
        if let Some(hit) = cached {
            debug!(url = %item.url, "Detail cache hit");
            return Some(Enriched::Cached(hit));
        }
        if !item.is_enrichable() {
            return None;
        }
        match self.load_detail(session, &item.url).await {
            Ok(detail) => {
                let fresh = merge_detail(item, detail);
                lock(snapshot).upsert(fresh.clone());
                Some(Enriched::Fresh(fresh))
            }
            Err(e) => {
                warn!(url = %item.url, error = %e, "Detail fetch failed; dropping story");
                None
            }
        }
    }
}

#[async_trait]
impl SiteAdapter for Depor {
    fn site(&self) -> &'static str {
        SITE
    }

    fn source(&self) -> &'static str {
        SOURCE
    }

    fn resolve(&self, params: &QueryParams) -> Result<ListRequest, QueryError> {
        let categoria = params.categoria().unwrap_or_default();
        let url = category_url(categoria).ok_or_else(|| QueryError::UnsupportedCategory {
            site: SITE,
            categoria: categoria.to_string(),
        })?;
        Ok(ListRequest::section(url, clamp_limit(params.limit.as_deref(), DEFAULT_LIMIT)))
    }

    #[instrument(level = "info", skip_all, fields(target = ?request.target, limit = request.limit))]
    async fn list_page(
        &self,
        session: &dyn BrowserSession,
        request: &ListRequest,
    ) -> Result<Vec<NewsItem>, ScrapeError> {
        let url = request.target.as_deref().unwrap_or(PERUANO_URL);
        let stories = self.load_stories(session, url, request.limit).await;

        if request.detail == DetailMode::Summary {
            return Ok(stories
                .into_iter()
                .filter(|s| !s.title.is_empty() && !s.img.is_empty())
                .map(Story::into_resumen)
                .collect());
        }

        let items: Vec<NewsItem> = stories.into_iter().map(Story::into_item).collect();
        let snapshot = Mutex::new(self.cache.snapshot().await);
        let enriched = in_batches(items, DETAIL_BATCH, |item| self.enrich(session, &snapshot, item)).await;

        let (mut hits, mut fetched) = (0usize, 0usize);
        let items: Vec<NewsItem> = enriched
            .into_iter()
            .flatten()
            .map(|e| match e {
                Enriched::Cached(item) => {
                    hits += 1;
                    published(item)
                }
                Enriched::Fresh(item) => {
                    fetched += 1;
                    published(item)
                }
            })
            .collect();
        info!(count = items.len(), cache_hits = hits, fetched, "Enriched Depor stories");

        let snapshot = snapshot.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = self.cache.write_all(&snapshot.into_entries()).await {
            warn!(error = %e, path = %self.cache.path().display(), "Failed to write detail cache");
        }
        Ok(items)
    }

    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch_detail(&self, session: &dyn BrowserSession, url: &str) -> Result<ArticleDetail, ScrapeError> {
        Ok(self.load_detail(session, url).await?)
    }
}
