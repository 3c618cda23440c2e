//! JSON files for one-shot scrapes.
//!
//! Files are grouped by local date, one per site:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── eldepor.json
//!     └── elperuano.json
//! ```
//!
//! A second run on the same day overwrites that site's file.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// `{json_output_dir}/{date}/{site}.json`
pub fn output_path(json_output_dir: &str, date: NaiveDate, site: &str) -> PathBuf {
    PathBuf::from(json_output_dir)
        .join(date.to_string())
        .join(format!("{site}.json"))
}

/// Serialize `records` into today's file for `site` and return its path.
#[instrument(level = "info", skip_all, fields(%site, json_output_dir = %json_output_dir))]
pub async fn write_listing<T: Serialize + ?Sized>(
    site: &str,
    records: &T,
    json_output_dir: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string(records)?;
    let path = output_path(json_output_dir, Local::now().date_naive(), site);

    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring JSON directory exists");
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote JSON file");
    Ok(path)
}
