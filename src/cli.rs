//! Command-line interface definitions.
//!
//! Every option can be given as a flag or through the environment variable
//! named next to it. Browser options are global so they apply to every
//! subcommand.

use crate::browser::launcher::{DeploymentMode, LaunchOptions};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// News scraping service and one-shot scraper.
///
/// # Examples
///
/// ```sh
/// # Serve the HTTP endpoints on port 3000
/// noticias_scraper serve
///
/// # One Depor listing written to ./json/<date>/eldepor.json
/// noticias_scraper scrape --site eldepor --categoria peruano -j ./json
///
/// # El Peruano menu, with an explicit browser binary
/// noticias_scraper --chrome-path /usr/bin/chromium categories --site elperuano
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Force production (serverless) browser launch settings
    #[arg(long, env = "SCRAPER_PRODUCTION", global = true)]
    pub production: bool,

    /// Deployment environment reported by Vercel
    #[arg(long, env = "VERCEL_ENV", hide = true, global = true)]
    pub vercel_env: Option<String>,

    /// Function version reported by AWS Lambda
    #[arg(long, env = "AWS_LAMBDA_FUNCTION_VERSION", hide = true, global = true)]
    pub lambda_version: Option<String>,

    /// Explicit browser executable
    #[arg(long, env = "CHROME_EXECUTABLE_PATH", global = true)]
    pub chrome_path: Option<PathBuf>,

    /// Directory holding the packaged serverless browser
    #[arg(long, env = "CHROMIUM_PACK_DIR", default_value = "/tmp/chromium", global = true)]
    pub chromium_pack_dir: PathBuf,

    /// Where to download the packaged browser from on first use
    #[arg(long, env = "CHROMIUM_PACK_URL", global = true)]
    pub chromium_pack_url: Option<String>,

    /// Directory for per-site detail caches
    #[arg(long, env = "SCRAPER_CACHE_DIR", default_value = "cache", global = true)]
    pub cache_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Serve /publicaciones/categorias and /publicaciones/noticias
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
        bind: SocketAddr,
    },

    /// Scrape one listing and print it (or write it with --json-output-dir)
    Scrape {
        #[arg(short, long)]
        site: String,

        /// Category name, section path or URL, depending on the site
        #[arg(short, long)]
        categoria: Option<String>,

        #[arg(short, long)]
        limit: Option<String>,

        /// Listing fields only, no detail pages
        #[arg(long)]
        resumen: bool,

        /// Output directory for the JSON file
        #[arg(short, long)]
        json_output_dir: Option<String>,
    },

    /// Print a site's category tree
    Categories {
        #[arg(short, long)]
        site: String,
    },

    /// Fetch one article page
    Detail {
        #[arg(short, long)]
        site: String,

        #[arg(short, long)]
        url: String,
    },
}

impl Cli {
    pub fn deployment_mode(&self) -> DeploymentMode {
        DeploymentMode::detect(
            self.production,
            self.vercel_env.as_deref(),
            self.lambda_version.as_deref(),
        )
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            executable_override: self.chrome_path.clone(),
            pack_dir: self.chromium_pack_dir.clone(),
            pack_url: self.chromium_pack_url.clone(),
            ..LaunchOptions::new(self.deployment_mode())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_scrape_parsing() {
        let cli = Cli::parse_from([
            "noticias_scraper",
            "scrape",
            "--site",
            "eldepor",
            "--categoria",
            "peruano",
            "--limit",
            "5",
            "--json-output-dir",
            "./json",
        ]);

        assert_eq!(
            cli.command,
            Command::Scrape {
                site: "eldepor".into(),
                categoria: Some("peruano".into()),
                limit: Some("5".into()),
                resumen: false,
                json_output_dir: Some("./json".into()),
            }
        );
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["noticias_scraper", "detail", "-s", "jornada", "-u", "https://jornada.com.pe/x/"]);
        assert_eq!(
            cli.command,
            Command::Detail {
                site: "jornada".into(),
                url: "https://jornada.com.pe/x/".into(),
            }
        );
    }

    #[test]
    fn test_global_browser_options() {
        let cli = Cli::parse_from([
            "noticias_scraper",
            "categories",
            "--site",
            "elperuano",
            "--production",
            "--chrome-path",
            "/opt/chrome",
            "--chromium-pack-dir",
            "/var/chromium",
        ]);
        assert_eq!(cli.deployment_mode(), DeploymentMode::Production);

        let options = cli.launch_options();
        assert_eq!(options.executable_override, Some(PathBuf::from("/opt/chrome")));
        assert_eq!(options.pack_dir, PathBuf::from("/var/chromium"));
        assert_eq!(options.mode, DeploymentMode::Production);
    }

    #[test]
    fn test_serve_bind_address() {
        let cli = Cli::parse_from(["noticias_scraper", "serve", "--bind", "127.0.0.1:8080"]);
        assert_eq!(
            cli.command,
            Command::Serve {
                bind: "127.0.0.1:8080".parse().unwrap()
            }
        );
    }
}
