//! HTTP query surface.
//!
//! Two read-only endpoints wrap the scrapers:
//!
//! | Route                          | Parameters                   | `data`        |
//! |--------------------------------|------------------------------|---------------|
//! | `GET /publicaciones/categorias` | `site`                       | categories    |
//! | `GET /publicaciones/noticias`   | `site`, `categoria`, `limit` | news items    |
//!
//! Every response is an [`Envelope`]: `status` is `"ok"` or `"error"`,
//! `ping` is the elapsed time and `data` carries the records with `id`
//! replaced by their 1-based position.
//!
//! | Outcome                               | HTTP | `status` |
//! |---------------------------------------|------|----------|
//! | scrape finished (possibly partial)    | 200  | ok       |
//! | unknown site                          | 200  | error    |
//! | missing or invalid parameter          | 400  | error    |
//! | browser could not be launched         | 500  | error    |

use crate::error::{QueryError, ScrapeError};
use crate::scrapers::{QueryParams, Scraper};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<Scraper>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoriasQuery {
    pub site: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoticiasQuery {
    pub site: Option<String>,
    pub categoria: Option<String>,
    pub limit: Option<String>,
}

/// Uniform response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: String,
    pub ping: String,
    pub data: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    fn ok(elapsed: Duration, data: Vec<Value>) -> Self {
        Self {
            status: "ok".to_string(),
            ping: format_ping(elapsed.as_millis()),
            data,
            message: None,
        }
    }

    fn error(elapsed: Duration, message: String) -> Self {
        Self {
            status: "error".to_string(),
            ping: format_ping(elapsed.as_millis()),
            data: Vec::new(),
            message: Some(message),
        }
    }
}

type Reply = (StatusCode, Json<Envelope>);

/// `"<ms>ms"` up to one second, `"<s.ss>s"` above.
pub fn format_ping(ms: u128) -> String {
    if ms > 1000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

/// Serialize `records` and number them from 1 in their `id` field.
pub fn numbered<T: Serialize>(records: Vec<T>) -> Vec<Value> {
    records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| {
            let mut value = serde_json::to_value(record).unwrap_or_default();
            if let Value::Object(map) = &mut value {
                map.insert("id".to_string(), Value::from(idx + 1));
            }
            value
        })
        .collect()
}

fn rejected(started: Instant, e: QueryError) -> Reply {
    match e {
        QueryError::UnsupportedSite(ref site) => {
            warn!(%site, "Unsupported site requested");
            (StatusCode::OK, Json(Envelope::error(Duration::ZERO, e.to_string())))
        }
        other => {
            warn!(error = %other, "Rejected query");
            (
                StatusCode::BAD_REQUEST,
                Json(Envelope::error(started.elapsed(), other.to_string())),
            )
        }
    }
}

fn failed(started: Instant, e: ScrapeError) -> Reply {
    error!(error = %e, "Scrape failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Envelope::error(started.elapsed(), e.to_string())),
    )
}

#[instrument(level = "info", skip_all, fields(site = ?query.site))]
pub async fn categorias(State(state): State<AppState>, Query(query): Query<CategoriasQuery>) -> Reply {
    let started = Instant::now();
    let site = query.site.unwrap_or_default();
    let adapter = match state.scraper.adapter(&site) {
        Ok(adapter) if adapter.supports_categories() => adapter,
        _ => return rejected(started, QueryError::UnsupportedSite(site)),
    };
    match state.scraper.categories(adapter.as_ref()).await {
        Ok(categories) => {
            let data = numbered(categories);
            info!(count = data.len(), "Served categories");
            (StatusCode::OK, Json(Envelope::ok(started.elapsed(), data)))
        }
        Err(e) => failed(started, e),
    }
}

#[instrument(level = "info", skip_all, fields(site = ?query.site, categoria = ?query.categoria, limit = ?query.limit))]
pub async fn noticias(State(state): State<AppState>, Query(query): Query<NoticiasQuery>) -> Reply {
    let started = Instant::now();
    let site = query.site.unwrap_or_default();
    let adapter = match state.scraper.adapter(&site) {
        Ok(adapter) => adapter,
        Err(e) => return rejected(started, e),
    };
    let params = QueryParams {
        categoria: query.categoria,
        limit: query.limit,
    };
    let request = match adapter.resolve(&params) {
        Ok(request) => request,
        Err(e) => return rejected(started, e),
    };
    match state.scraper.news(adapter.as_ref(), &request).await {
        Ok(items) => {
            let data = numbered(items);
            info!(count = data.len(), "Served news");
            (StatusCode::OK, Json(Envelope::ok(started.elapsed(), data)))
        }
        Err(e) => failed(started, e),
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/publicaciones/categorias", get(categorias))
        .route("/publicaciones/noticias", get(noticias))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Bind `addr` and serve until the process is stopped.
#[instrument(level = "info", skip(state))]
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), Box<dyn Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, sites = ?state.scraper.sites(), "Listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
