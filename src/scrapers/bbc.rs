//! BBC News front page scraper.
//!
//! Reads the first five promo headlines of <https://www.bbc.com/news>.
//! There is no detail enrichment: the legacy detail fields are filled from
//! the listing (`titulo_detalle` repeats the title, the rest stay empty)
//! and items without a date are stamped with the current Peru time.

use super::{
    ListRequest, QueryParams, SiteAdapter, Timings, absolutize, clamp_limit, html_or_empty, render_page, selector,
    text_of,
};
use crate::browser::BrowserSession;
use crate::dates;
use crate::error::{QueryError, ScrapeError};
use crate::models::NewsItem;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, instrument};

pub const SITE: &str = "bbc";
pub const SOURCE: &str = "BBC News";
pub const FRONT_PAGE: &str = "https://www.bbc.com/news";

const TOP_N: usize = 5;
const DEFAULT_LIMIT: usize = 10;

static HEADLINE: Lazy<Selector> = Lazy::new(|| selector("a.gs-c-promo-heading"));

/// Extract the top headlines from the front page HTML.
pub fn parse_headlines(html: &str) -> Vec<NewsItem> {
    let document = Html::parse_document(html);
    document
        .select(&HEADLINE)
        .take(TOP_N)
        .map(|a| {
            let href = a.value().attr("href").unwrap_or_default();
            NewsItem::listing(SITE, SOURCE, text_of(a), absolutize(FRONT_PAGE, href))
        })
        .collect()
}

/// Fill the fields consumers expect from every BBC item.
fn complete(mut item: NewsItem, now: &str) -> NewsItem {
    item.date = Some(match item.date.as_deref() {
        Some(d) if !d.is_empty() => dates::normalize(d),
        _ => now.to_string(),
    });
    item.summary.get_or_insert_with(String::new);
    item.titulo_detalle = Some(item.title.clone());
    item.subtitulo = Some(String::new());
    item.contenido = Some(String::new());
    item
}

pub struct Bbc {
    timings: Timings,
}

impl Bbc {
    pub fn new(timings: Timings) -> Self {
        Self { timings }
    }
}

#[async_trait]
impl SiteAdapter for Bbc {
    fn site(&self) -> &'static str {
        SITE
    }

    fn source(&self) -> &'static str {
        SOURCE
    }

    /// `categoria` is ignored.
    fn resolve(&self, params: &QueryParams) -> Result<ListRequest, QueryError> {
        Ok(ListRequest::front(clamp_limit(params.limit.as_deref(), DEFAULT_LIMIT)))
    }

    #[instrument(level = "info", skip_all, fields(limit = request.limit))]
    async fn list_page(
        &self,
        session: &dyn BrowserSession,
        request: &ListRequest,
    ) -> Result<Vec<NewsItem>, ScrapeError> {
        let html = html_or_empty(
            render_page(session, FRONT_PAGE, self.timings.navigation).await,
            FRONT_PAGE,
        );
        let now = dates::now_peru();
        let items: Vec<NewsItem> = parse_headlines(&html)
            .into_iter()
            .take(request.limit)
            .map(|item| complete(item, &now))
            .collect();
        info!(count = items.len(), "Parsed BBC headlines");
        Ok(items)
    }
}
