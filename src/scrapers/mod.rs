//! Per-site adapters behind one interface.
//!
//! Every source site implements [`SiteAdapter`]. The [`Registry`] maps the
//! site identifier used in queries to its adapter, and [`Scraper`] owns the
//! browser lifecycle around each adapter call.
//!
//! # Supported Sites
//!
//! | Site        | Module        | Listing                               | Detail enrichment            |
//! |-------------|---------------|---------------------------------------|------------------------------|
//! | `bbc`       | [`bbc`]       | top 5 headlines                       | none                         |
//! | `elpais`    | [`elpais`]    | top 5 headlines                       | none                         |
//! | `lemonde`   | [`lemonde`]   | top 5 headlines                       | none                         |
//! | `elperuano` | [`elperuano`] | section cards, infinite scroll, max 20 | batches of 10                |
//! | `eldepor`   | [`depor`]     | story list, caller limit              | batches of 8, disk cache     |
//! | `jornada`   | [`jornada`]   | category blocks or top 10 overall     | one page per article / pools |
//!
//! # Request flow
//!
//! `NAVIGATE → WAIT_FOR_CONTENT → EXTRACT_LISTING → [CONSULT_CACHE] →
//! FETCH_DETAIL → NORMALIZE_DATE → RETURN`. Only a failed browser launch
//! ends a request with an error; everything after degrades to empty
//! fields.

pub mod bbc;
pub mod depor;
pub mod elpais;
pub mod elperuano;
pub mod jornada;
pub mod lemonde;

use crate::browser::{BrowserSession, Launcher, navigate, with_page, with_session};
use crate::error::{BrowserError, QueryError, ScrapeError};
use crate::models::{ArticleDetail, Category, NewsItem};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use scraper::{ElementRef, Selector};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Upper bound accepted for a caller-supplied `limit`.
pub const MAX_LIMIT: usize = 50;

/// Fixed waits and delays used while driving pages.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Listing readiness (skeletons resolved, story list present).
    pub listing_wait: Duration,
    /// Detail readiness on sites with placeholder skeletons.
    pub detail_wait: Duration,
    /// Detail readiness on sites that render server-side.
    pub short_wait: Duration,
    /// Upper bound for listing navigations.
    pub navigation: Duration,
    /// Upper bound for detail navigations.
    pub detail_navigation: Duration,
    /// Pause after each infinite-scroll step.
    pub scroll_pause: Duration,
    /// Interval between readiness checks.
    pub poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            listing_wait: Duration::from_secs(10),
            detail_wait: Duration::from_secs(8),
            short_wait: Duration::from_secs(5),
            navigation: Duration::from_secs(30),
            detail_navigation: Duration::from_secs(10),
            scroll_pause: Duration::from_millis(500),
            poll_interval: Duration::from_millis(250),
        }
    }
}

#[cfg(test)]
impl Timings {
    pub fn fast() -> Self {
        Self {
            listing_wait: Duration::from_millis(40),
            detail_wait: Duration::from_millis(40),
            short_wait: Duration::from_millis(40),
            navigation: Duration::from_secs(2),
            detail_navigation: Duration::from_secs(2),
            scroll_pause: Duration::from_millis(1),
            poll_interval: Duration::from_millis(5),
        }
    }
}

/// Whether listing items get their detail pages fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailMode {
    /// Listing fields only.
    Summary,
    /// Listing plus detail enrichment.
    Full,
}

/// A resolved listing request for one adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Section path or URL; `None` means the site's front page or its
    /// cross-category digest.
    pub target: Option<String>,
    pub limit: usize,
    pub detail: DetailMode,
}

impl ListRequest {
    pub fn front(limit: usize) -> Self {
        Self {
            target: None,
            limit,
            detail: DetailMode::Full,
        }
    }

    pub fn section(target: impl Into<String>, limit: usize) -> Self {
        Self {
            target: Some(target.into()),
            limit,
            detail: DetailMode::Full,
        }
    }

    pub fn summary_only(mut self) -> Self {
        self.detail = DetailMode::Summary;
        self
    }
}

/// Raw query parameters as received from a client.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub categoria: Option<String>,
    pub limit: Option<String>,
}

impl QueryParams {
    /// `categoria` trimmed, with blank values treated as absent.
    pub fn categoria(&self) -> Option<&str> {
        self.categoria.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

/// Parse a caller limit: absent, unparsable or zero gives `default`,
/// anything else is clamped to `1..=MAX_LIMIT`.
pub fn clamp_limit(raw: Option<&str>, default: usize) -> usize {
    match raw.and_then(|r| r.trim().parse::<i64>().ok()) {
        None | Some(0) => default,
        Some(n) => n.clamp(1, MAX_LIMIT as i64) as usize,
    }
}

/// One source site.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Identifier used by clients, e.g. `"eldepor"`.
    fn site(&self) -> &'static str;

    /// Human readable site name stored in [`NewsItem::source`].
    fn source(&self) -> &'static str;

    /// Turn client parameters into a listing request, rejecting invalid
    /// ones before any browser is started.
    fn resolve(&self, params: &QueryParams) -> Result<ListRequest, QueryError>;

    fn supports_categories(&self) -> bool {
        false
    }

    async fn categories(&self, _session: &dyn BrowserSession) -> Result<Vec<Category>, ScrapeError> {
        Err(ScrapeError::Unsupported {
            site: self.site(),
            operation: "categories",
        })
    }

    async fn list_page(
        &self,
        session: &dyn BrowserSession,
        request: &ListRequest,
    ) -> Result<Vec<NewsItem>, ScrapeError>;

    async fn fetch_detail(&self, _session: &dyn BrowserSession, _url: &str) -> Result<ArticleDetail, ScrapeError> {
        Err(ScrapeError::Unsupported {
            site: self.site(),
            operation: "detail",
        })
    }
}

/// Adapters keyed by site identifier.
#[derive(Clone, Default)]
pub struct Registry {
    adapters: HashMap<&'static str, Arc<dyn SiteAdapter>>,
}

impl Registry {
    pub fn new(adapters: impl IntoIterator<Item = Arc<dyn SiteAdapter>>) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.site(), a)).collect(),
        }
    }

    /// Every supported site. Depor keeps its detail cache in `cache_dir`.
    pub fn standard(cache_dir: &Path, timings: Timings) -> Self {
        Self::new([
            Arc::new(bbc::Bbc::new(timings)) as Arc<dyn SiteAdapter>,
            Arc::new(elpais::ElPais::new(timings)),
            Arc::new(lemonde::LeMonde::new(timings)),
            Arc::new(elperuano::ElPeruano::new(timings)),
            Arc::new(depor::Depor::new(cache_dir, timings)),
            Arc::new(jornada::Jornada::new(timings)),
        ])
    }

    pub fn get(&self, site: &str) -> Option<Arc<dyn SiteAdapter>> {
        self.adapters.get(site).cloned()
    }

    pub fn sites(&self) -> Vec<&'static str> {
        let mut sites: Vec<_> = self.adapters.keys().copied().collect();
        sites.sort_unstable();
        sites
    }
}

/// Runs adapter operations inside a freshly launched browser session that
/// is closed exactly once when the operation ends.
pub struct Scraper {
    launcher: Arc<dyn Launcher>,
    registry: Registry,
}

impl Scraper {
    pub fn new(launcher: Arc<dyn Launcher>, registry: Registry) -> Self {
        Self { launcher, registry }
    }

    pub fn adapter(&self, site: &str) -> Result<Arc<dyn SiteAdapter>, QueryError> {
        self.registry
            .get(site)
            .ok_or_else(|| QueryError::UnsupportedSite(site.to_string()))
    }

    pub fn sites(&self) -> Vec<&'static str> {
        self.registry.sites()
    }

    #[instrument(level = "info", skip_all, fields(site = adapter.site()))]
    pub async fn categories(&self, adapter: &dyn SiteAdapter) -> Result<Vec<Category>, ScrapeError> {
        let categories = with_session(self.launcher.as_ref(), |session| async move {
            adapter.categories(session.as_ref()).await
        })
        .await?;
        info!(count = categories.len(), "Scraped categories");
        Ok(categories)
    }

    #[instrument(level = "info", skip_all, fields(site = adapter.site(), target = ?request.target, limit = request.limit))]
    pub async fn news(&self, adapter: &dyn SiteAdapter, request: &ListRequest) -> Result<Vec<NewsItem>, ScrapeError> {
        let items = with_session(self.launcher.as_ref(), |session| async move {
            adapter.list_page(session.as_ref(), request).await
        })
        .await?;
        info!(count = items.len(), "Scraped news");
        Ok(items)
    }

    #[instrument(level = "info", skip_all, fields(site = adapter.site(), %url))]
    pub async fn detail(&self, adapter: &dyn SiteAdapter, url: &str) -> Result<ArticleDetail, ScrapeError> {
        with_session(self.launcher.as_ref(), |session| async move {
            adapter.fetch_detail(session.as_ref(), url).await
        })
        .await
    }
}

/// Open a page, load `url` and return its rendered HTML.
pub(crate) async fn render_page(
    session: &dyn BrowserSession,
    url: &str,
    navigation: Duration,
) -> Result<String, BrowserError> {
    with_page(session, |page| async move {
        navigate(page.as_ref(), url, navigation).await?;
        page.content().await
    })
    .await
}

/// A listing that could not be loaded reads as an empty document.
pub(crate) fn html_or_empty(result: Result<String, BrowserError>, url: &str) -> String {
    match result {
        Ok(html) => {
            debug!(%url, bytes = html.len(), head = %truncate_for_log(&html, 120), "Listing page loaded");
            html
        }
        Err(e) => {
            warn!(%url, error = %e, "Listing page failed to load; returning no items");
            String::new()
        }
    }
}

// --- DOM helpers shared by the adapters ---

/// Parse a constant CSS selector.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

/// Trimmed text content of an element.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Trimmed text of the first match of `sel` under `scope`, or `""`.
pub(crate) fn first_text(scope: ElementRef<'_>, sel: &Selector) -> String {
    scope.select(sel).next().map(text_of).unwrap_or_default()
}

/// Attribute of the first match of `sel` under `scope`, or `""`.
pub(crate) fn first_attr(scope: ElementRef<'_>, sel: &Selector, attr: &str) -> String {
    scope
        .select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// A `<time>`-like element's `datetime` attribute, falling back to its text.
pub(crate) fn first_datetime(scope: ElementRef<'_>, sel: &Selector) -> String {
    scope
        .select(sel)
        .next()
        .map(|el| match el.value().attr("datetime").map(str::trim) {
            Some(dt) if !dt.is_empty() => dt.to_string(),
            _ => text_of(el),
        })
        .unwrap_or_default()
}

/// Resolve `href` against `base`. Empty or unresolvable links give `""`.
pub(crate) fn absolutize(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_default()
}

/// `Some(s)` unless `s` is empty.
pub(crate) fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// The first of `candidates` that is not blank, or `""`.
pub(crate) fn first_non_empty<'a>(candidates: impl IntoIterator<Item = &'a str>) -> String {
    candidates
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeLauncher, FakeSite};
    use scraper::Html;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 20), 20);
        assert_eq!(clamp_limit(Some("0"), 20), 20);
        assert_eq!(clamp_limit(Some("abc"), 10), 10);
        assert_eq!(clamp_limit(Some("500"), 20), 50);
        assert_eq!(clamp_limit(Some("-3"), 20), 1);
        assert_eq!(clamp_limit(Some(" 7 "), 20), 7);
    }

    #[test]
    fn test_query_params_blank_categoria_is_absent() {
        let params = QueryParams {
            categoria: Some("   ".into()),
            limit: None,
        };
        assert_eq!(params.categoria(), None);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = Registry::standard(Path::new("cache"), Timings::default());
        assert_eq!(
            registry.sites(),
            vec!["bbc", "eldepor", "elpais", "elperuano", "jornada", "lemonde"]
        );
        assert!(registry.get("eldepor").is_some());
        assert!(registry.get("cnn").is_none());
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(
            absolutize("https://depor.com", "/futbol-peruano/nota/"),
            "https://depor.com/futbol-peruano/nota/"
        );
        assert_eq!(
            absolutize("https://depor.com", "https://other.com/x"),
            "https://other.com/x"
        );
        assert_eq!(absolutize("https://depor.com", "  "), "");
    }

    #[test]
    fn test_dom_helpers() {
        let doc = Html::parse_fragment(
            r#"<div><h2> <a href="/x"> Hola <b>mundo</b> </a></h2>
               <time datetime="2025-04-24T10:00:00Z">24 abr</time>
               <time class="bare"> 25 abr </time></div>"#,
        );
        let root = doc.root_element();
        assert_eq!(first_text(root, &selector("h2 a")), "Hola mundo");
        assert_eq!(first_attr(root, &selector("h2 a"), "href"), "/x");
        assert_eq!(first_attr(root, &selector("img"), "src"), "");
        assert_eq!(first_datetime(root, &selector("time")), "2025-04-24T10:00:00Z");
        assert_eq!(first_datetime(root, &selector("time.bare")), "25 abr");
        assert_eq!(first_non_empty(["", "  ", "b", "c"]), "b");
    }

    #[tokio::test]
    async fn test_scraper_rejects_unsupported_operations_and_closes_session() {
        let site = FakeSite::new();
        let launcher = Arc::new(FakeLauncher::new(site.clone()));
        let scraper = Scraper::new(
            launcher.clone(),
            Registry::standard(Path::new("cache"), Timings::fast()),
        );
        let bbc = scraper.adapter("bbc").unwrap();
        assert!(!bbc.supports_categories());
        let err = scraper.categories(bbc.as_ref()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Unsupported { site: "bbc", .. }));
        assert_eq!(launcher.launches(), 1);
        assert_eq!(site.sessions_closed(), 1);
    }

    #[test]
    fn test_scraper_unknown_site() {
        let scraper = Scraper::new(
            Arc::new(FakeLauncher::unavailable()),
            Registry::standard(Path::new("cache"), Timings::default()),
        );
        assert!(matches!(
            scraper.adapter("cnn"),
            Err(QueryError::UnsupportedSite(site)) if site == "cnn"
        ));
    }
}
