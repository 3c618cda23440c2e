//! El Peruano scraper.
//!
//! # Pages
//!
//! - **Front page**: headline anchors pointing at `/noticia/…` with a
//!   reasonably long text.
//! - **Menu**: a two-level taxonomy taken from the desktop navigation bar.
//! - **Section**: `#notasseccion` renders skeleton cards first and fills
//!   them in client-side, then loads more on scroll. The listing waits for
//!   one real card, scrolls at most twice and keeps up to 20 cards.
//! - **Article**: `main#portada` holds the title (`h1`) and the subtitle
//!   (second `h5`); the body is `#contenido`.
//!
//! Section items are enriched in batches of 10 detail pages. A failed
//! detail fetch leaves the detail fields empty, and every date goes through
//! [`dates::normalize`].

use super::{
    DetailMode, ListRequest, QueryParams, SiteAdapter, Timings, clamp_limit, first_text, html_or_empty, render_page,
    selector, text_of,
};
use crate::browser::{BrowserSession, navigate, wait_or_proceed, with_page};
use crate::dates;
use crate::error::{BrowserError, QueryError, ScrapeError};
use crate::fetch::in_batches;
use crate::models::{ArticleDetail, Category, NewsItem};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

pub const SITE: &str = "elperuano";
pub const SOURCE: &str = "El Peruano";
pub const BASE: &str = "https://elperuano.pe";
pub const HOME: &str = "https://elperuano.pe/";

/// Cards kept from one section listing.
pub const MAX_SECTION_ITEMS: usize = 20;
const DETAIL_BATCH: usize = 10;
const MAX_SCROLLS: usize = 2;
const FRONT_TOP_N: usize = 5;
const MIN_HEADLINE_CHARS: usize = 30;

static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));
static MENU: Lazy<Selector> = Lazy::new(|| selector("ul.hide-on-med-and-down.inlineblock"));
static DROPDOWN: Lazy<Selector> = Lazy::new(|| selector("ul.dropdown-content"));
static DROPDOWN_LINK: Lazy<Selector> = Lazy::new(|| selector("li > a"));
static SECTION: Lazy<Selector> = Lazy::new(|| selector("#notasseccion"));
static ARTICLE: Lazy<Selector> = Lazy::new(|| selector("article"));
static SKELETON: Lazy<Selector> = Lazy::new(|| selector(".skeleton-nota"));
static CARD_IMG: Lazy<Selector> = Lazy::new(|| selector(".card-images img"));
static CARD_TITLE: Lazy<Selector> = Lazy::new(|| selector(".card-title2 .titular"));
static CARD_SUMMARY: Lazy<Selector> = Lazy::new(|| selector(".bajada"));
static CARD_DATE: Lazy<Selector> = Lazy::new(|| selector(".card-title3"));
static DETAIL_TITLE: Lazy<Selector> = Lazy::new(|| selector("main#portada h1"));
static DETAIL_H5: Lazy<Selector> = Lazy::new(|| selector("main#portada h5"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("#contenido"));
static BODY_PARAGRAPH: Lazy<Selector> = Lazy::new(|| selector("#contenido p"));

/// Complete a category path or URL against the site root.
pub fn section_url(categoria: &str) -> String {
    if categoria.starts_with(HOME) {
        categoria.to_string()
    } else {
        format!("{HOME}{}", categoria.trim_start_matches('/'))
    }
}

/// Resolve a menu link. External links give `None`.
fn site_link(href: &str) -> Option<String> {
    if href.starts_with("http") {
        href.contains("elperuano.pe").then(|| href.to_string())
    } else if href.starts_with('/') {
        Some(format!("{BASE}{href}"))
    } else {
        Some(format!("{BASE}/{href}"))
    }
}

fn child_elements<'a>(el: ElementRef<'a>, tag: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| child.value().name() == tag)
}

/// Front page headlines.
pub fn parse_front(html: &str) -> Vec<NewsItem> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let title = text_of(a);
            (href.starts_with("/noticia/") && title.chars().count() > MIN_HEADLINE_CHARS)
                .then(|| NewsItem::listing(SITE, SOURCE, title, format!("{BASE}{href}")))
        })
        .take(FRONT_TOP_N)
        .collect()
}

/// Top-level menu entries with their dropdown children.
pub fn parse_categories(html: &str) -> Vec<Category> {
    let document = Html::parse_document(html);
    let Some(menu) = document.select(&MENU).next() else {
        return Vec::new();
    };

    let mut categories = Vec::new();
    for li in child_elements(menu, "li") {
        let Some(a) = child_elements(li, "a").next() else {
            continue;
        };
        let Some(url) = site_link(a.value().attr("href").unwrap_or_default()) else {
            continue;
        };
        let subcategories = li
            .select(&DROPDOWN)
            .next()
            .map(|dropdown| {
                dropdown
                    .select(&DROPDOWN_LINK)
                    .filter_map(|sub| {
                        let url = site_link(sub.value().attr("href").unwrap_or_default())?;
                        Some(Category::new(text_of(sub), url))
                    })
                    .filter(|sub| !sub.name.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        categories.push(Category::new(text_of(a), url).with_subcategories(subcategories));
    }
    categories.retain(|c| !c.name.is_empty() && !c.url.is_empty());
    categories
}

fn is_real_card(article: &ElementRef<'_>) -> bool {
    article.select(&SKELETON).next().is_none()
}

/// Non-skeleton cards currently inside `#notasseccion`.
pub fn real_card_count(document: &Html) -> usize {
    document
        .select(&SECTION)
        .next()
        .map(|section| section.select(&ARTICLE).filter(is_real_card).count())
        .unwrap_or(0)
}

fn count_cards(html: &str) -> usize {
    real_card_count(&Html::parse_document(html))
}

fn has_skeleton(document: &Html) -> bool {
    document.select(&SKELETON).next().is_some()
}

/// What a section page yielded.
#[derive(Debug, PartialEq)]
pub enum SectionListing {
    NoContainer,
    NoCards,
    Cards(Vec<NewsItem>),
}

pub fn parse_section(html: &str) -> SectionListing {
    let document = Html::parse_document(html);
    let Some(section) = document.select(&SECTION).next() else {
        return SectionListing::NoContainer;
    };
    let cards: Vec<NewsItem> = section
        .select(&ARTICLE)
        .filter(is_real_card)
        .map(|article| {
            let anchor = article.select(&CARD_TITLE).next();
            let href = anchor
                .and_then(|a| a.value().attr("href"))
                .unwrap_or_default();
            let url = if href.starts_with("http") {
                href.to_string()
            } else {
                site_link(href).unwrap_or_default()
            };
            let title = anchor.map(text_of).unwrap_or_default();
            let img = article
                .select(&CARD_IMG)
                .next()
                .and_then(|img| img.value().attr("src"))
                .unwrap_or_default()
                .to_string();
            NewsItem {
                summary: Some(first_text(article, &CARD_SUMMARY)),
                img: Some(img),
                date: Some(first_text(article, &CARD_DATE)),
                ..NewsItem::listing(SITE, SOURCE, title, url)
            }
        })
        .collect();
    if cards.is_empty() {
        SectionListing::NoCards
    } else {
        SectionListing::Cards(cards)
    }
}

/// Title, subtitle and body of an article page.
pub fn parse_detail(html: &str) -> ArticleDetail {
    let document = Html::parse_document(html);
    let title = document.select(&DETAIL_TITLE).next().map(text_of).unwrap_or_default();
    let subtitle = document.select(&DETAIL_H5).nth(1).map(text_of).unwrap_or_default();
    let paragraphs: Vec<String> = document
        .select(&BODY_PARAGRAPH)
        .map(text_of)
        .filter(|p| !p.is_empty())
        .collect();
    let content = if paragraphs.is_empty() {
        document.select(&BODY).next().map(text_of).unwrap_or_default()
    } else {
        paragraphs.join("\n\n")
    };
    ArticleDetail {
        title,
        subtitle,
        content,
        ..Default::default()
    }
}

fn merge_detail(mut item: NewsItem, detail: ArticleDetail) -> NewsItem {
    item.titulo_detalle = Some(detail.title);
    item.subtitulo = Some(detail.subtitle);
    item.contenido = Some(detail.content);
    item
}

pub struct ElPeruano {
    timings: Timings,
}

impl ElPeruano {
    pub fn new(timings: Timings) -> Self {
        Self { timings }
    }

    /// Load a section, wait for real cards and drive the infinite scroll.
    async fn load_section(&self, session: &dyn BrowserSession, url: &str) -> Result<String, BrowserError> {
        let t = self.timings;
        with_page(session, |page| async move {
            navigate(page.as_ref(), url, t.navigation).await?;
            wait_or_proceed(
                page.as_ref(),
                "section cards",
                t.listing_wait,
                t.poll_interval,
                |doc: &Html| real_card_count(doc) > 0,
            )
            .await?;

            let mut html = page.content().await?;
            let mut previous = 0;
            for round in 0..MAX_SCROLLS {
                if let Err(e) = page.scroll_to_bottom().await {
                    warn!(round, error = %e, "Scroll failed; keeping rendered cards");
                    break;
                }
                sleep(t.scroll_pause).await;
                match page.content().await {
                    Ok(current) => html = current,
                    Err(e) => {
                        warn!(round, error = %e, "Could not read section after scroll");
                        break;
                    }
                }
                let count = count_cards(&html);
                debug!(round, count, "Scrolled section");
                if count == previous {
                    break;
                }
                previous = count;
            }
            Ok(html)
        })
        .await
    }

    async fn load_detail(&self, session: &dyn BrowserSession, url: &str) -> Result<ArticleDetail, BrowserError> {
        let t = self.timings;
        with_page(session, |page| async move {
            navigate(page.as_ref(), url, t.navigation).await?;
            wait_or_proceed(
                page.as_ref(),
                "article skeletons",
                t.detail_wait,
                t.poll_interval,
                |doc: &Html| !has_skeleton(doc),
            )
            .await?;
            Ok(parse_detail(&page.content().await?))
        })
        .await
    }

    async fn enrich(&self, session: &dyn BrowserSession, item: NewsItem) -> NewsItem {
        let mut item = if item.is_enrichable() {
            let detail = self.load_detail(session, &item.url).await.unwrap_or_else(|e| {
                debug!(url = %item.url, error = %e, "Detail fetch failed; leaving fields empty");
                ArticleDetail::default()
            });
            merge_detail(item, detail)
        } else {
            item
        };
        item.date = dates::normalize_opt(item.date.as_deref());
        item
    }
}

#[async_trait]
impl SiteAdapter for ElPeruano {
    fn site(&self) -> &'static str {
        SITE
    }

    fn source(&self) -> &'static str {
        SOURCE
    }

    fn resolve(&self, params: &QueryParams) -> Result<ListRequest, QueryError> {
        let categoria = params.categoria().ok_or(QueryError::MissingParameter {
            site: SITE,
            param: "categoria",
        })?;
        let limit = clamp_limit(params.limit.as_deref(), MAX_SECTION_ITEMS);
        Ok(ListRequest::section(section_url(categoria), limit))
    }

    fn supports_categories(&self) -> bool {
        true
    }

    #[instrument(level = "info", skip_all)]
    async fn categories(&self, session: &dyn BrowserSession) -> Result<Vec<Category>, ScrapeError> {
        let html = render_page(session, HOME, self.timings.navigation).await?;
        Ok(parse_categories(&html))
    }

    #[instrument(level = "info", skip_all, fields(target = ?request.target))]
    async fn list_page(
        &self,
        session: &dyn BrowserSession,
        request: &ListRequest,
    ) -> Result<Vec<NewsItem>, ScrapeError> {
        let Some(url) = request.target.as_deref() else {
            let html = html_or_empty(render_page(session, HOME, self.timings.navigation).await, HOME);
            let mut items = parse_front(&html);
            items.truncate(request.limit);
            return Ok(items);
        };

        let html = html_or_empty(self.load_section(session, url).await, url);
        let mut items = match parse_section(&html) {
            SectionListing::Cards(items) => items,
            SectionListing::NoContainer => {
                warn!(%url, "No #notasseccion container on this page");
                return Ok(Vec::new());
            }
            SectionListing::NoCards => {
                warn!(%url, "No real articles inside #notasseccion");
                return Ok(Vec::new());
            }
        };
        items.truncate(request.limit.min(MAX_SECTION_ITEMS));
        info!(count = items.len(), "Parsed section cards");

        if request.detail == DetailMode::Summary {
            for item in &mut items {
                item.date = dates::normalize_opt(item.date.as_deref());
            }
            return Ok(items);
        }
        Ok(in_batches(items, DETAIL_BATCH, |item| self.enrich(session, item)).await)
    }

    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch_detail(&self, session: &dyn BrowserSession, url: &str) -> Result<ArticleDetail, ScrapeError> {
        Ok(self.load_detail(session, url).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeSite;

    const MENU_HTML: &str = r#"<nav><ul class="hide-on-med-and-down inlineblock">
        <li><a href="/politica">Política</a>
            <ul class="dropdown-content">
                <li><a href="/politica/congreso">Congreso</a></li>
                <li><a href="https://twitter.com/elperuano">Twitter</a></li>
                <li><a href="https://elperuano.pe/politica/ejecutivo">Ejecutivo</a></li>
            </ul>
        </li>
        <li><a href="economia">Economía</a></li>
        <li><a href="https://www.andina.pe">Andina</a></li>
        <li><a href="/"></a></li>
    </ul></nav>"#;

    fn card(n: usize) -> String {
        format!(
            r#"<article>
                 <div class="card-images"><img src="https://img.elperuano.pe/{n}.jpg"></div>
                 <div class="card-title2"><a class="titular" href="/noticia/{n}-nota">Nota número {n}</a></div>
                 <p class="bajada">Bajada {n}</p>
                 <div class="card-title3">24/04/2025 1{n}:30</div>
               </article>"#
        )
    }

    fn section_html(real: usize, skeletons: usize) -> String {
        let cards: String = (1..=real).map(card).collect();
        let skeleton: String = (0..skeletons)
            .map(|_| r#"<article><div class="skeleton-nota"></div></article>"#)
            .collect();
        format!(r#"<html><body><div id="notasseccion">{cards}{skeleton}</div></body></html>"#)
    }

    fn detail_html(n: usize) -> String {
        format!(
            r#"<html><body><main id="portada">
                 <h1> Titular completo {n} </h1>
                 <h5>Sección</h5><h5>Subtítulo {n}</h5>
                 <div id="contenido"><p>Párrafo uno.</p><p>Párrafo dos.</p></div>
               </main></body></html>"#
        )
    }

    #[test]
    fn test_section_url_completion() {
        assert_eq!(section_url("politica"), "https://elperuano.pe/politica");
        assert_eq!(section_url("/economia"), "https://elperuano.pe/economia");
        assert_eq!(
            section_url("https://elperuano.pe/seccion/deportes"),
            "https://elperuano.pe/seccion/deportes"
        );
    }

    #[test]
    fn test_resolve_requires_categoria() {
        let adapter = ElPeruano::new(Timings::default());
        let err = adapter.resolve(&QueryParams::default()).unwrap_err();
        assert!(matches!(err, QueryError::MissingParameter { site: "elperuano", .. }));

        let request = adapter
            .resolve(&QueryParams {
                categoria: Some("politica".into()),
                limit: Some("5".into()),
            })
            .unwrap();
        assert_eq!(request.target.as_deref(), Some("https://elperuano.pe/politica"));
        assert_eq!(request.limit, 5);
    }

    #[test]
    fn test_parse_categories() {
        let categories = parse_categories(MENU_HTML);
        assert_eq!(categories.len(), 2);

        assert_eq!(categories[0].name, "Política");
        assert_eq!(categories[0].url, "https://elperuano.pe/politica");
        let subs = categories[0].subcategories.as_ref().unwrap();
        let sub_urls: Vec<_> = subs.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            sub_urls,
            vec!["https://elperuano.pe/politica/congreso", "https://elperuano.pe/politica/ejecutivo"]
        );

        assert_eq!(categories[1].url, "https://elperuano.pe/economia");
        assert!(categories[1].subcategories.is_none());
    }

    #[test]
    fn test_parse_front_filters_short_and_foreign_links() {
        let html = r#"
            <a href="/noticia/1-uno">Un titular suficientemente largo para la portada</a>
            <a href="/noticia/2-dos">Corto</a>
            <a href="/seccion/politica">Un enlace de sección que también es bastante largo</a>
            <a href="/noticia/3-tres">Otro titular suficientemente largo para la portada</a>"#;
        let items = parse_front(html);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://elperuano.pe/noticia/1-uno");
        assert_eq!(items[1].url, "https://elperuano.pe/noticia/3-tres");
    }

    #[test]
    fn test_parse_section_skips_skeletons() {
        match parse_section(&section_html(2, 3)) {
            SectionListing::Cards(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].title, "Nota número 1");
                assert_eq!(items[0].url, "https://elperuano.pe/noticia/1-nota");
                assert_eq!(items[0].summary.as_deref(), Some("Bajada 1"));
                assert_eq!(items[0].img.as_deref(), Some("https://img.elperuano.pe/1.jpg"));
                assert_eq!(items[0].date.as_deref(), Some("24/04/2025 11:30"));
            }
            other => panic!("unexpected listing: {other:?}"),
        }
        assert_eq!(parse_section(&section_html(0, 2)), SectionListing::NoCards);
        assert_eq!(parse_section("<div></div>"), SectionListing::NoContainer);
    }

    #[test]
    fn test_parse_detail_uses_second_h5() {
        let detail = parse_detail(&detail_html(7));
        assert_eq!(detail.title, "Titular completo 7");
        assert_eq!(detail.subtitle, "Subtítulo 7");
        assert_eq!(detail.content, "Párrafo uno.\n\nPárrafo dos.");
    }

    #[tokio::test]
    async fn test_section_scrape_end_to_end() {
        let section = "https://elperuano.pe/politica";
        let mut site = FakeSite::new().page(section, &section_html(3, 1));
        for n in 1..=3 {
            site = site.page(&format!("https://elperuano.pe/noticia/{n}-nota"), &detail_html(n));
        }
        let session = site.session();
        let adapter = ElPeruano::new(Timings::fast());
        let items = adapter
            .list_page(session.as_ref(), &ListRequest::section(section, 20))
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        for (idx, item) in items.iter().enumerate() {
            let n = idx + 1;
            assert!(!item.title.is_empty());
            assert!(item.url.starts_with("https://elperuano.pe"));
            assert_eq!(item.date.as_deref(), Some(format!("2025-04-24T1{n}:30:00-05:00").as_str()));
            assert_eq!(item.titulo_detalle.as_deref(), Some(format!("Titular completo {n}").as_str()));
            assert_eq!(item.subtitulo.as_deref(), Some(format!("Subtítulo {n}").as_str()));
        }
        assert_eq!(site.pages_opened(), site.pages_closed());
    }

    #[tokio::test]
    async fn test_section_scroll_loads_more_cards() {
        let section = "https://elperuano.pe/economia";
        let site = FakeSite::new()
            .page(section, &section_html(2, 2))
            .page_after_scroll(section, &section_html(4, 0));
        let session = site.session();
        let items = ElPeruano::new(Timings::fast())
            .list_page(session.as_ref(), &ListRequest::section(section, 20).summary_only())
            .await
            .unwrap();
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|i| i.titulo_detalle.is_none()));
        assert!(items.iter().all(|i| i.date.as_deref().unwrap().ends_with("-05:00")));
    }

    #[tokio::test]
    async fn test_scroll_failure_keeps_rendered_cards() {
        let section = "https://elperuano.pe/deportes";
        let site = FakeSite::new()
            .page(section, &section_html(3, 0))
            .failing_scroll(section);
        let session = site.session();
        let items = ElPeruano::new(Timings::fast())
            .list_page(session.as_ref(), &ListRequest::section(section, 20).summary_only())
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].title, "Nota número 3");
        assert_eq!(site.pages_opened(), site.pages_closed());
    }

    #[tokio::test]
    async fn test_failed_detail_leaves_fields_empty() {
        let section = "https://elperuano.pe/politica";
        let site = FakeSite::new()
            .page(section, &section_html(2, 0))
            .page("https://elperuano.pe/noticia/1-nota", &detail_html(1))
            .failing("https://elperuano.pe/noticia/2-nota");
        let session = site.session();
        let items = ElPeruano::new(Timings::fast())
            .list_page(session.as_ref(), &ListRequest::section(section, 20))
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].titulo_detalle.as_deref(), Some("Titular completo 1"));
        assert_eq!(items[1].titulo_detalle.as_deref(), Some(""));
        assert_eq!(items[1].contenido.as_deref(), Some(""));
        assert_eq!(items[1].title, "Nota número 2");
    }

    #[tokio::test]
    async fn test_missing_container_yields_no_items() {
        let section = "https://elperuano.pe/inexistente";
        let site = FakeSite::new().page(section, "<html><body><p>404</p></body></html>");
        let session = site.session();
        let items = ElPeruano::new(Timings::fast())
            .list_page(session.as_ref(), &ListRequest::section(section, 20))
            .await
            .unwrap();
        assert!(items.is_empty());
    }
}
