//! Crawl archived Factbook pages week by week into the local caches

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use reqwest::blocking::Client;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use crate::archive::{
    calendar_url, end_of_previous_year, page_code, parse_calendar, walk_year, MIN_ARCHIVE_YEAR,
};
use crate::blacklist::{classify, Verdict};
use crate::cache::{
    page_filename, CachedPage, Expiry, PageCache, SummaryCache, YEARLY_SUMMARY_MAX_AGE,
};
use crate::config::Config;
use crate::countries::{collect_from_cache, SKIPPED_PAGES, WORLD_PAGE};
use crate::utils::osc8_file_link;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; FactbookArchive/1.0)";

/// Outcome of asking for one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Fetched,
    FetchedBlacklisted,
    Cached,
    CachedBlacklisted,
    /// The URL has no `.html` page to store
    Skipped,
}

pub struct ArchiveClient {
    client: Client,
    delay: Duration,
    summaries: SummaryCache,
    pages: PageCache,
    today: NaiveDate,
}

impl ArchiveClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_today(config, Utc::now().date_naive())
    }

    /// Client whose walks start from `today` instead of the current date
    pub fn with_today(config: &Config, today: NaiveDate) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            delay: config.request_delay(),
            summaries: SummaryCache::new(&config.country_html_yearly_summaries),
            pages: PageCache::new(&config.country_html_root, &config.country_html_blacklist),
            today,
        })
    }

    fn get_text(&self, url: &str) -> Result<String> {
        let result = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text());
        // Be a good citizen between requests, failed ones included
        thread::sleep(self.delay);
        result.with_context(|| format!("Failed to fetch: {}", url))
    }

    /// Yearly calendar for a page, from cache when present
    pub fn fetch_yearly_summary(&self, url: &str) -> Result<String> {
        if let Some(content) = self.summaries.read(url)? {
            println!("Reading {}", url);
            return Ok(content);
        }

        println!("Fetching {}", url);
        let content = self.get_text(url)?;
        self.summaries.write(url, &content)?;
        Ok(content)
    }

    /// Download a snapshot once and file it as good or blacklisted
    pub fn fetch_page(&self, url: &str, date: NaiveDate) -> Result<PageOutcome> {
        if page_filename(url).is_none() {
            println!("Not saving blank page for {}", url);
            return Ok(PageOutcome::Skipped);
        }

        match self.pages.lookup(date, url) {
            CachedPage::Good(path) => {
                println!("Reading {}", osc8_file_link(&path.to_string_lossy(), url));
                return Ok(PageOutcome::Cached);
            }
            CachedPage::Blacklisted(path) => {
                println!("Blacklisted {}", osc8_file_link(&path.to_string_lossy(), url));
                return Ok(PageOutcome::CachedBlacklisted);
            }
            CachedPage::Missing => {}
        }

        let mut stdout = io::stdout();
        print!("Fetching {}", url);
        stdout.flush()?;

        let content = self.get_text(url)?;
        let verdict = classify(&content);
        let path = self.pages.store(date, url, &content, &verdict)?;
        let path = path.to_string_lossy();

        match verdict {
            Verdict::Good => {
                println!(" -> {}", osc8_file_link(&path, "saved"));
                Ok(PageOutcome::Fetched)
            }
            Verdict::Blacklisted(phrases) => {
                println!(" -> {}", osc8_file_link(&path, "blacklisted"));
                for phrase in phrases {
                    println!("  Found forbidden blacklist phrase: {}", phrase);
                }
                Ok(PageOutcome::FetchedBlacklisted)
            }
        }
    }

    /// Walk every year from now back to the first archived year for one page.
    ///
    /// Returns the date and outcome of every target that was read or fetched.
    pub fn crawl_page(&self, page_filename: &str) -> Result<Vec<(NaiveDate, PageOutcome)>> {
        let code = page_code(page_filename);
        let current_year = self.today.year();
        let mut year = current_year;
        let mut cursor = self.today;
        let mut outcomes = Vec::new();

        while year >= MIN_ARCHIVE_YEAR {
            let url = calendar_url(code, year);

            // This year's calendar grows as new captures are made
            if year == current_year {
                match self.summaries.expire_if_stale(&url, YEARLY_SUMMARY_MAX_AGE)? {
                    Expiry::Removed => println!("Removing outdated yearly summary for {}", url),
                    Expiry::Kept => println!("Using recently cached yearly summary for {}", url),
                    Expiry::Missing => {}
                }
            }

            let snapshots = match self
                .fetch_yearly_summary(&url)
                .and_then(|json| parse_calendar(&json, code))
            {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    log::warn!("Skipping {} {}: {:#}", page_filename, year, e);
                    // Fetch this year again on the next run
                    if self.summaries.remove(&url)? {
                        println!("Removing unreadable yearly summary for {}", url);
                    }
                    cursor = end_of_previous_year(year);
                    year = cursor.year();
                    continue;
                }
            };
            log::debug!("{} captures of {} in {}", snapshots.len(), page_filename, year);

            let walk = walk_year(&snapshots, cursor, year);
            for snapshot in &walk.targets {
                log::debug!(
                    "Target {} captured {} (HTTP {})",
                    snapshot.date,
                    snapshot.timestamp,
                    snapshot.status
                );
                match self.fetch_page(&snapshot.url, snapshot.date) {
                    Ok(outcome) => outcomes.push((snapshot.date, outcome)),
                    Err(e) => eprintln!("\nError fetching {}: {:#}", snapshot.url, e),
                }
            }

            cursor = walk.cursor;
            year = cursor.year();
        }
        Ok(outcomes)
    }
}

/// Country pages to crawl after the world page, in discovery order
pub fn pages_to_crawl(discovered: Vec<String>) -> Vec<String> {
    discovered
        .into_iter()
        .filter(|page| !SKIPPED_PAGES.contains(&page.as_str()))
        .collect()
}

/// Crawl each page in turn, reporting failures and moving on.
///
/// Returns the pages whose crawl failed.
fn crawl_each<F>(pages: &[String], mut crawl: F) -> Vec<String>
where
    F: FnMut(&str) -> Result<Vec<(NaiveDate, PageOutcome)>>,
{
    let total = pages.len();
    let mut failed = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        println!("Parsing {} of {}", i + 1, total);
        match crawl(page) {
            Ok(outcomes) => log::info!("{}: {} snapshots", page, outcomes.len()),
            Err(e) => {
                eprintln!("\nError crawling {}: {:#}", page, e);
                failed.push(page.clone());
            }
        }
    }
    failed
}

fn report_failed(failed: &[String]) {
    if !failed.is_empty() {
        eprintln!("Failed to crawl {} pages: {}", failed.len(), failed.join(", "));
    }
}

pub fn run_fetch(config: &Config, only: &[String]) -> Result<()> {
    let client = ArchiveClient::new(config)?;

    if !only.is_empty() {
        report_failed(&crawl_each(only, |page| client.crawl_page(page)));
        println!("\nDone!");
        return Ok(());
    }

    // The country list comes from the cached world pages
    client.crawl_page(WORLD_PAGE)?;

    println!("Getting country list");
    let pages = pages_to_crawl(collect_from_cache(&config.country_html_root)?);

    println!("Parsing {} countries", pages.len());
    report_failed(&crawl_each(&pages, |page| client.crawl_page(page)));

    println!("\nDone!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::snapshot_url;
    use crate::cache::url_to_filename;
    use std::fs;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            country_html_root: dir.join("good"),
            country_html_blacklist: dir.join("bad"),
            country_html_yearly_summaries: dir.join("summaries"),
            weekly_json_root: None,
            request_delay_secs: 0,
        }
    }

    fn test_client(dir: &std::path::Path) -> ArchiveClient {
        ArchiveClient::new(&test_config(dir)).unwrap()
    }

    fn calendar_with(timestamp: u64) -> String {
        format!(r#"[[[null, {{"ts": [{}], "st": [200]}}]]]"#, timestamp)
    }

    #[test]
    fn test_pages_to_crawl_skips_world_and_baker_island() {
        let discovered = vec![
            "xx.html".to_string(),
            "af.html".to_string(),
            "fq.html".to_string(),
            "it.html".to_string(),
        ];
        assert_eq!(pages_to_crawl(discovered), vec!["af.html", "it.html"]);
    }

    #[test]
    fn test_fetch_page_uses_cache_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let client = test_client(dir.path());
        let date = NaiveDate::from_ymd_opt(2016, 1, 4).unwrap();
        let url = "https://web.archive.org/web/20160104000000/https://www.cia.gov/geos/it.html";

        let good_dir = dir.path().join("good").join("2016-01-04");
        fs::create_dir_all(&good_dir).unwrap();
        fs::write(good_dir.join(url_to_filename(url)), "<html></html>").unwrap();
        assert_eq!(client.fetch_page(url, date).unwrap(), PageOutcome::Cached);

        let bad_url = "https://web.archive.org/web/20160104000000/https://www.cia.gov/geos/af.html";
        let bad_dir = dir.path().join("bad").join("2016-01-04");
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join(url_to_filename(bad_url)), "404 Not Found").unwrap();
        assert_eq!(
            client.fetch_page(bad_url, date).unwrap(),
            PageOutcome::CachedBlacklisted
        );
    }

    #[test]
    fn test_fetch_page_skips_urls_without_html_page() {
        let dir = tempfile::tempdir().unwrap();
        let client = test_client(dir.path());
        let date = NaiveDate::from_ymd_opt(2016, 1, 4).unwrap();
        assert_eq!(
            client.fetch_page("https://web.archive.org/web/2016/", date).unwrap(),
            PageOutcome::Skipped
        );
    }

    #[test]
    fn test_yearly_summary_reads_cache() {
        let dir = tempfile::tempdir().unwrap();
        let client = test_client(dir.path());
        let url = calendar_url("it", 2010);
        SummaryCache::new(dir.path().join("summaries"))
            .write(&url, "[]")
            .unwrap();
        assert_eq!(client.fetch_yearly_summary(&url).unwrap(), "[]");
    }

    #[test]
    fn test_crawl_page_walks_back_to_first_archived_year() {
        let dir = tempfile::tempdir().unwrap();
        // Wednesday; the walk covers 2009, 2008 and 2007
        let client = ArchiveClient::with_today(&test_config(dir.path()), date(2009, 1, 14)).unwrap();
        let summaries = SummaryCache::new(dir.path().join("summaries"));
        let pages = PageCache::new(dir.path().join("good"), dir.path().join("bad"));

        let url_2009 = calendar_url("it", 2009);
        let url_2008 = calendar_url("it", 2008);
        summaries.write(&url_2009, &calendar_with(20090105120000)).unwrap();
        summaries.write(&url_2008, "<html>429 Too Many Requests</html>").unwrap();
        summaries.write(&calendar_url("it", 2007), &calendar_with(20071219080000)).unwrap();

        let good_url = snapshot_url("20090105120000", "it");
        pages.store(date(2009, 1, 5), &good_url, "<html>Italy</html>", &Verdict::Good).unwrap();
        let bad_url = snapshot_url("20071219080000", "it");
        let verdict = classify("404 Not Found");
        pages.store(date(2007, 12, 19), &bad_url, "404 Not Found", &verdict).unwrap();

        let outcomes = client.crawl_page("it.html").unwrap();
        assert_eq!(
            outcomes,
            vec![
                (date(2009, 1, 5), PageOutcome::Cached),
                (date(2007, 12, 19), PageOutcome::CachedBlacklisted),
            ]
        );

        // A fresh summary for the current year is kept
        assert!(summaries.path_for(&url_2009).is_file());
        // The unreadable one is evicted so the next run fetches it again
        assert!(!summaries.path_for(&url_2008).exists());
    }

    #[test]
    fn test_crawl_page_before_first_archived_year_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let client = ArchiveClient::with_today(&test_config(dir.path()), date(2006, 6, 1)).unwrap();
        assert!(client.crawl_page("it.html").unwrap().is_empty());
    }

    #[test]
    fn test_crawl_each_continues_past_failing_pages() {
        let pages = vec![
            "af.html".to_string(),
            "it.html".to_string(),
            "vm.html".to_string(),
        ];
        let mut crawled = Vec::new();
        let failed = crawl_each(&pages, |page| {
            crawled.push(page.to_string());
            if page == "it.html" {
                anyhow::bail!("calendar unavailable");
            }
            Ok(vec![(date(2016, 1, 4), PageOutcome::Cached)])
        });
        assert_eq!(crawled, pages);
        assert_eq!(failed, vec!["it.html"]);
    }

    #[test]
    fn test_failed_request_still_waits_the_delay() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            request_delay_secs: 1,
            ..test_config(dir.path())
        };
        let client = ArchiveClient::new(&config).unwrap();

        // Nothing listens on port 1, so the connection is refused at once
        let started = std::time::Instant::now();
        assert!(client.get_text("http://127.0.0.1:1/").is_err());
        assert!(started.elapsed() >= Duration::from_secs(1));
    }
}
