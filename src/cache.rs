//! Disk-backed cache of enriched articles, one JSON file per site.
//!
//! The file holds a JSON array of [`NewsItem`]s. A scrape reads the whole
//! file once into a [`CacheSnapshot`], upserts fresh entries in memory and
//! writes the whole file back once at the end. There is no locking: two
//! concurrent scrapes of the same site race and the last writer wins.

use crate::error::CacheError;
use crate::models::NewsItem;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Location of one site's cache file.
#[derive(Debug, Clone)]
pub struct DetailCache {
    path: PathBuf,
}

impl DetailCache {
    /// Cache for `site_tag` inside `cache_dir`, stored as `<site_tag>.json`.
    pub fn for_site(cache_dir: impl AsRef<Path>, site_tag: &str) -> Self {
        Self {
            path: cache_dir.as_ref().join(format!("{site_tag}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry. Missing, unreadable or malformed files read as an
    /// empty cache.
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    pub async fn read_all(&self) -> Vec<NewsItem> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Cache file not readable; starting empty");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<NewsItem>>(&raw) {
            Ok(entries) => {
                debug!(count = entries.len(), "Loaded cache entries");
                entries
            }
            Err(e) => {
                warn!(error = %e, "Cache file is malformed; starting empty");
                Vec::new()
            }
        }
    }

    /// Replace the file's contents with `entries`.
    ///
    /// The data goes to a sibling temporary file first and is then renamed
    /// over the cache file.
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display(), count = entries.len()))]
    pub async fn write_all(&self, entries: &[NewsItem]) -> Result<(), CacheError> {
        let json = serde_json::to_string(entries)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| CacheError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| CacheError::Io {
                path: self.path.clone(),
                source,
            })?;
        info!("Wrote detail cache");
        Ok(())
    }

    /// Load a snapshot for one scrape.
    pub async fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot::from_entries(self.read_all().await)
    }
}

/// In-memory view of a cache file keyed by article URL.
///
/// Holds at most one entry per URL; [`CacheSnapshot::upsert`] replaces any
/// previous entry for the same URL.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    entries: BTreeMap<String, NewsItem>,
}

impl CacheSnapshot {
    pub fn from_entries(entries: impl IntoIterator<Item = NewsItem>) -> Self {
        let mut snapshot = Self::default();
        for entry in entries {
            snapshot.upsert(entry);
        }
        snapshot
    }

    /// A usable hit for `(url, date)`: the dates must match exactly and the
    /// cached body must be non-blank. Anything else is a miss.
    pub fn lookup(&self, url: &str, date: Option<&str>) -> Option<&NewsItem> {
        self.entries
            .get(url)
            .filter(|entry| entry.date.as_deref().unwrap_or("") == date.unwrap_or(""))
            .filter(|entry| entry.has_content())
    }

    pub fn upsert(&mut self, entry: NewsItem) {
        self.entries.insert(entry.url.clone(), entry);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn into_entries(self) -> Vec<NewsItem> {
        self.entries.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, date: &str, content: &str) -> NewsItem {
        NewsItem {
            id: "depor".into(),
            title: format!("Title for {url}"),
            url: url.into(),
            source: "Depor".into(),
            date: Some(date.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DetailCache::for_site(dir.path(), "depor");
        assert!(cache.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DetailCache::for_site(dir.path(), "depor");
        std::fs::write(cache.path(), "{not json").unwrap();
        assert!(cache.read_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DetailCache::for_site(dir.path().join("nested"), "depor");
        let entries = vec![
            entry("https://depor.com/a", "24/04/2025", "body a"),
            entry("https://depor.com/b", "25/04/2025", "body b"),
        ];
        cache.write_all(&entries).await.unwrap();

        let read = cache.read_all().await;
        assert_eq!(read, entries);
        assert!(!cache.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_cache_file_per_site() {
        let cache = DetailCache::for_site("cache", "depor");
        assert_eq!(cache.path(), Path::new("cache/depor.json"));
    }

    #[test]
    fn test_lookup_requires_matching_date() {
        let snapshot =
            CacheSnapshot::from_entries(vec![entry("https://depor.com/a", "24/04/2025", "body")]);
        assert!(snapshot.lookup("https://depor.com/a", Some("24/04/2025")).is_some());
        assert!(snapshot.lookup("https://depor.com/a", Some("25/04/2025")).is_none());
        assert!(snapshot.lookup("https://depor.com/b", Some("24/04/2025")).is_none());
    }

    #[test]
    fn test_lookup_treats_empty_content_as_miss() {
        let snapshot =
            CacheSnapshot::from_entries(vec![entry("https://depor.com/a", "24/04/2025", "  ")]);
        assert!(snapshot.lookup("https://depor.com/a", Some("24/04/2025")).is_none());
    }

    #[test]
    fn test_upsert_replaces_by_url() {
        let mut snapshot = CacheSnapshot::default();
        snapshot.upsert(entry("https://depor.com/a", "24/04/2025", "old"));
        snapshot.upsert(entry("https://depor.com/a", "25/04/2025", "new"));
        assert_eq!(snapshot.len(), 1);
        let hit = snapshot
            .lookup("https://depor.com/a", Some("25/04/2025"))
            .unwrap();
        assert_eq!(hit.content.as_deref(), Some("new"));
    }

    #[test]
    fn test_from_entries_keeps_last_duplicate() {
        let snapshot = CacheSnapshot::from_entries(vec![
            entry("https://depor.com/a", "1", "first"),
            entry("https://depor.com/a", "2", "second"),
        ]);
        let entries = snapshot.into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content.as_deref(), Some("second"));
    }
}
