//! On-disk caches for yearly summaries and snapshot pages
//!
//! Pages live at `<root>/<YYYY-MM-DD>/<percent-encoded url>`, where root is
//! either the good cache or the blacklist cache. A page is in at most one of them.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::blacklist::Verdict;

/// Calendars for the current year change as new captures land
pub const YEARLY_SUMMARY_MAX_AGE: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Percent-encode a URL into a single path component (`/` included)
pub fn url_to_filename(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

/// The last `.html` path segment of a snapshot URL, ignoring any query string
pub fn page_filename(url: &str) -> Option<&str> {
    let path = url.split('?').next().unwrap_or(url);
    path.rsplit('/').find(|segment| segment.ends_with(".html"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    Missing,
    Kept,
    Removed,
}

pub struct SummaryCache {
    root: PathBuf,
}

impl SummaryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.root.join(url_to_filename(url))
    }

    pub fn read(&self, url: &str) -> Result<Option<String>> {
        let path = self.path_for(url);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache: {:?}", path))?;
        Ok(Some(content))
    }

    pub fn write(&self, url: &str, content: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {:?}", self.root))?;
        let path = self.path_for(url);
        fs::write(&path, content).with_context(|| format!("Failed to write cache: {:?}", path))?;
        Ok(path)
    }

    /// Drop a cached summary; `false` when there was none
    pub fn remove(&self, url: &str) -> Result<bool> {
        let path = self.path_for(url);
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
        Ok(true)
    }

    /// Delete the cached summary if it was written more than `max_age` ago
    pub fn expire_if_stale(&self, url: &str, max_age: Duration) -> Result<Expiry> {
        let path = self.path_for(url);
        if !path.is_file() {
            return Ok(Expiry::Missing);
        }

        let modified = fs::metadata(&path)?.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        if age > max_age {
            fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
            Ok(Expiry::Removed)
        } else {
            Ok(Expiry::Kept)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedPage {
    Good(PathBuf),
    Blacklisted(PathBuf),
    Missing,
}

pub struct PageCache {
    good_root: PathBuf,
    blacklist_root: PathBuf,
}

impl PageCache {
    pub fn new(good_root: impl Into<PathBuf>, blacklist_root: impl Into<PathBuf>) -> Self {
        Self {
            good_root: good_root.into(),
            blacklist_root: blacklist_root.into(),
        }
    }

    fn path_in(root: &Path, date: NaiveDate, url: &str) -> PathBuf {
        root.join(date.format("%Y-%m-%d").to_string())
            .join(url_to_filename(url))
    }

    pub fn good_path(&self, date: NaiveDate, url: &str) -> PathBuf {
        Self::path_in(&self.good_root, date, url)
    }

    pub fn blacklist_path(&self, date: NaiveDate, url: &str) -> PathBuf {
        Self::path_in(&self.blacklist_root, date, url)
    }

    /// Which partition, if any, already holds this snapshot
    pub fn lookup(&self, date: NaiveDate, url: &str) -> CachedPage {
        let good = self.good_path(date, url);
        if good.is_file() {
            return CachedPage::Good(good);
        }
        let blacklisted = self.blacklist_path(date, url);
        if blacklisted.is_file() {
            return CachedPage::Blacklisted(blacklisted);
        }
        CachedPage::Missing
    }

    /// Write fetched content to the partition chosen by `verdict`
    pub fn store(
        &self,
        date: NaiveDate,
        url: &str,
        content: &str,
        verdict: &Verdict,
    ) -> Result<PathBuf> {
        let path = if verdict.is_blacklisted() {
            self.blacklist_path(date, url)
        } else {
            self.good_path(date, url)
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write cache: {:?}", path))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://web.archive.org/web/20160104093012/https://www.cia.gov/library/publications/the-world-factbook/geos/it.html";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_url_to_filename_encodes_everything_but_unreserved() {
        assert_eq!(
            url_to_filename("https://a.b/c-d_e~f?x=1"),
            "https%3A%2F%2Fa.b%2Fc-d_e~f%3Fx%3D1"
        );
        assert!(url_to_filename(URL).ends_with("it.html"));
    }

    #[test]
    fn test_page_filename() {
        assert_eq!(page_filename(URL), Some("it.html"));
        assert_eq!(page_filename("https://x.org/geos/it.html?foo/bar"), Some("it.html"));
        assert_eq!(page_filename("https://x.org/geos/"), None);
    }

    #[test]
    fn test_page_store_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PageCache::new(dir.path().join("good"), dir.path().join("bad"));
        let day = date(2016, 1, 4);

        assert_eq!(cache.lookup(day, URL), CachedPage::Missing);

        let path = cache.store(day, URL, "<html>Italy</html>", &Verdict::Good).unwrap();
        assert!(path.starts_with(dir.path().join("good").join("2016-01-04")));
        assert_eq!(cache.lookup(day, URL), CachedPage::Good(path.clone()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "<html>Italy</html>");
        assert!(!cache.blacklist_path(day, URL).exists());
    }

    #[test]
    fn test_blacklisted_page_goes_to_blacklist_root() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PageCache::new(dir.path().join("good"), dir.path().join("bad"));
        let day = date(2016, 1, 4);

        let verdict = Verdict::Blacklisted(vec!["Access Denied"]);
        cache.store(day, URL, "Access Denied", &verdict).unwrap();

        assert!(!cache.good_path(day, URL).exists());
        assert_eq!(
            cache.lookup(day, URL),
            CachedPage::Blacklisted(cache.blacklist_path(day, URL))
        );
    }

    #[test]
    fn test_summary_cache_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::new(dir.path());
        let url = "https://web.archive.org/__wb/calendarcaptures?selected_year=2016";

        assert_eq!(cache.expire_if_stale(url, YEARLY_SUMMARY_MAX_AGE).unwrap(), Expiry::Missing);

        cache.write(url, "[]").unwrap();
        assert_eq!(cache.expire_if_stale(url, YEARLY_SUMMARY_MAX_AGE).unwrap(), Expiry::Kept);
        assert_eq!(cache.read(url).unwrap().as_deref(), Some("[]"));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.expire_if_stale(url, Duration::from_millis(1)).unwrap(), Expiry::Removed);
        assert_eq!(cache.read(url).unwrap(), None);
    }

    #[test]
    fn test_summary_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SummaryCache::new(dir.path());
        let url = "https://web.archive.org/__wb/calendarcaptures?selected_year=2010";

        assert!(!cache.remove(url).unwrap());
        cache.write(url, "<html>429 Too Many Requests</html>").unwrap();
        assert!(cache.remove(url).unwrap());
        assert!(!cache.path_for(url).exists());
    }
}
