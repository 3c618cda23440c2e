//! # Noticias Scraper
//!
//! Scrapes Peruvian and international news sites with a headless browser
//! and exposes the results as JSON, either through a small HTTP service or
//! as one-shot CLI runs.
//!
//! ## Sites
//!
//! | `site`      | Listing                                      | Categories |
//! |-------------|----------------------------------------------|------------|
//! | `elperuano` | section pages (`categoria` required) or front | yes        |
//! | `eldepor`   | `peruano` / `internacional`, detail cached    | no         |
//! | `jornada`   | top stories or one section                    | yes        |
//! | `bbc`       | front page headlines                          | no         |
//! | `elpais`    | front page headlines                          | no         |
//! | `lemonde`   | front page headlines                          | no         |
//!
//! ## Usage
//!
//! ```sh
//! noticias_scraper serve --bind 0.0.0.0:3000
//! noticias_scraper scrape --site jornada --limit 5
//! ```
//!
//! Every request launches its own browser and closes it before answering.

use chrono::Local;
use clap::Parser;
use itertools::Itertools;
use serde::Serialize;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod browser;
mod cache;
mod cli;
mod dates;
mod error;
mod fetch;
mod models;
mod outputs;
mod scrapers;
mod utils;

use api::AppState;
use browser::chromium::ChromiumLauncher;
use browser::Launcher;
use cli::{Cli, Command};
use error::QueryError;
use outputs::json;
use scrapers::{clamp_limit, ListRequest, QueryParams, Registry, Scraper, Timings, MAX_LIMIT};
use utils::{ensure_writable_dir, excerpt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("noticias_scraper starting up");

    let args = Cli::parse();
    let mode = args.deployment_mode();
    debug!(command = ?args.command, ?mode, cache_dir = %args.cache_dir.display(), "Parsed CLI arguments");

    let launcher: Arc<dyn Launcher> = Arc::new(ChromiumLauncher::new(args.launch_options()));
    let registry = Registry::standard(&args.cache_dir, Timings::default());
    let scraper = Arc::new(Scraper::new(launcher, registry));
    info!(sites = %scraper.sites().iter().join(", "), ?mode, "Scraper ready");

    let result = run(args.command, scraper).await;
    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    result
}

async fn run(command: Command, scraper: Arc<Scraper>) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Serve { bind } => api::serve(AppState { scraper }, bind).await,
        Command::Scrape {
            site,
            categoria,
            limit,
            resumen,
            json_output_dir,
        } => {
            let params = QueryParams { categoria, limit };
            scrape(&scraper, &site, params, resumen, json_output_dir.as_deref()).await
        }
        Command::Categories { site } => {
            let adapter = scraper.adapter(&site)?;
            let categories = scraper.categories(adapter.as_ref()).await?;
            info!(count = categories.len(), "Fetched categories");
            print_json(&categories)
        }
        Command::Detail { site, url } => {
            let adapter = scraper.adapter(&site)?;
            let detail = scraper.detail(adapter.as_ref(), &url).await?;
            info!(title = %detail.title, preview = %excerpt(&detail.content), "Fetched article");
            print_json(&models::NewsItem {
                id: site,
                title: detail.title.clone(),
                url,
                source: adapter.source().to_string(),
                subtitle: scrapers::non_empty(detail.subtitle),
                section: scrapers::non_empty(detail.section),
                img: scrapers::non_empty(detail.img),
                date: scrapers::non_empty(dates::normalize(&detail.date)),
                titulo_detalle: scrapers::non_empty(detail.title),
                content: scrapers::non_empty(detail.content),
                ..Default::default()
            })
        }
    }
}

/// One listing, printed to stdout or written under `json_output_dir`.
///
/// Sites that need a section fall back to their front page when none is
/// given.
#[instrument(level = "info", skip(scraper, params, json_output_dir), fields(categoria = ?params.categoria))]
async fn scrape(
    scraper: &Scraper,
    site: &str,
    params: QueryParams,
    resumen: bool,
    json_output_dir: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    // Early check: fail before launching a browser
    if let Some(dir) = json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(path = %dir, error = %e, "JSON output directory is not writable");
            return Err(e);
        }
    }

    let adapter = scraper.adapter(site)?;
    let request = match adapter.resolve(&params) {
        Ok(request) => request,
        Err(QueryError::MissingParameter { param, .. }) => {
            info!(%param, "No section given; scraping the front page");
            ListRequest::front(clamp_limit(params.limit.as_deref(), MAX_LIMIT))
        }
        Err(e) => return Err(e.into()),
    };
    let request = if resumen { request.summary_only() } else { request };

    let items = scraper.news(adapter.as_ref(), &request).await?;
    info!(count = items.len(), at = %Local::now().to_rfc3339(), "Scraped listing");

    match json_output_dir {
        Some(dir) => {
            json::write_listing(site, &items, dir).await?;
            Ok(())
        }
        None => print_json(&items),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
