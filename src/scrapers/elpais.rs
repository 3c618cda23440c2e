//! El País front page scraper: the first five `h2.c_t` headlines.

use super::{
    ListRequest, QueryParams, SiteAdapter, Timings, absolutize, clamp_limit, html_or_empty, render_page, selector,
    text_of,
};
use crate::browser::BrowserSession;
use crate::error::{QueryError, ScrapeError};
use crate::models::NewsItem;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, instrument};

pub const SITE: &str = "elpais";
pub const SOURCE: &str = "El País";
pub const FRONT_PAGE: &str = "https://elpais.com/";

const TOP_N: usize = 5;

static HEADING: Lazy<Selector> = Lazy::new(|| selector("h2.c_t"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));

pub fn parse_headlines(html: &str) -> Vec<NewsItem> {
    let document = Html::parse_document(html);
    document
        .select(&HEADING)
        .take(TOP_N)
        .filter_map(|h2| h2.select(&ANCHOR).next())
        .map(|a| {
            let href = a.value().attr("href").unwrap_or_default();
            NewsItem::listing(SITE, SOURCE, text_of(a), absolutize(FRONT_PAGE, href))
        })
        .collect()
}

pub struct ElPais {
    timings: Timings,
}

impl ElPais {
    pub fn new(timings: Timings) -> Self {
        Self { timings }
    }
}

#[async_trait]
impl SiteAdapter for ElPais {
    fn site(&self) -> &'static str {
        SITE
    }

    fn source(&self) -> &'static str {
        SOURCE
    }

    fn resolve(&self, params: &QueryParams) -> Result<ListRequest, QueryError> {
        Ok(ListRequest::front(clamp_limit(params.limit.as_deref(), TOP_N)))
    }

    #[instrument(level = "info", skip_all)]
    async fn list_page(
        &self,
        session: &dyn BrowserSession,
        request: &ListRequest,
    ) -> Result<Vec<NewsItem>, ScrapeError> {
        let html = html_or_empty(
            render_page(session, FRONT_PAGE, self.timings.navigation).await,
            FRONT_PAGE,
        );
        let mut items = parse_headlines(&html);
        items.truncate(request.limit);
        info!(count = items.len(), "Parsed El País headlines");
        Ok(items)
    }
}
