//! Records produced by the site adapters.
//!
//! - [`NewsItem`]: one article as seen on a listing page, optionally
//!   enriched with fields from its detail page
//! - [`Category`]: a site's navigational taxonomy
//! - [`ArticleDetail`]: what a detail page yields before it is merged into
//!   a [`NewsItem`]
//!
//! `titulo_detalle`, `subtitulo` and `contenido` keep the legacy Spanish
//! names consumers already read. `content` is the canonical body field.

use serde::{Deserialize, Serialize};
use url::Url;

/// A news article scraped from one of the supported sites.
///
/// Only `id`, `title`, `url` and `source` are always present. Every other
/// field is skipped when serializing if it was never set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NewsItem {
    /// Site tag, e.g. `"depor"`. The query surface replaces it with a
    /// sequential number.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Absolute article URL.
    pub url: String,
    /// Human readable site name, e.g. `"El Peruano"`.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
    /// Raw listing date or a normalized ISO-8601 string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titulo_detalle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitulo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contenido: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl NewsItem {
    /// Start a listing record for `site_tag`/`source` with nothing but the
    /// required fields.
    pub fn listing(site_tag: &str, source: &str, title: String, url: String) -> Self {
        Self {
            id: site_tag.to_string(),
            title,
            url,
            source: source.to_string(),
            ..Default::default()
        }
    }

    /// Whether the item may be queued for detail enrichment: the URL must
    /// be non-empty, absolute and carry a host.
    pub fn is_enrichable(&self) -> bool {
        !self.url.is_empty()
            && Url::parse(&self.url)
                .map(|u| u.host_str().is_some())
                .unwrap_or(false)
    }

    /// Whether `content` holds a non-blank body.
    pub fn has_content(&self) -> bool {
        self.content
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }
}

/// A node of a site's category tree.
///
/// `subcategories` is omitted rather than serialized as an empty array.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Category {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategories: Option<Vec<Category>>,
}

impl Category {
    pub fn new(name: String, url: String) -> Self {
        Self {
            name,
            url,
            subcategories: None,
        }
    }

    /// Attach children, keeping the field absent when there are none.
    pub fn with_subcategories(mut self, subcategories: Vec<Category>) -> Self {
        self.subcategories = if subcategories.is_empty() {
            None
        } else {
            Some(subcategories)
        };
        self
    }
}

/// Fields extracted from an article's own page. Empty strings mean "not
/// found"; a failed fetch is represented by `ArticleDetail::default()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleDetail {
    pub title: String,
    pub subtitle: String,
    pub content: String,
    pub section: String,
    pub date: String,
    pub img: String,
}
