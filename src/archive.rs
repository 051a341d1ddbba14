//! Wayback Machine calendar parsing and the backward week-walk over a year

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDate};

use crate::types::{Calendar, Snapshot};

const CALENDAR_API_URL: &str = "https://web.archive.org/__wb/calendarcaptures";
const SNAPSHOT_BASE_URL: &str = "https://web.archive.org/web";
const FACTBOOK_GEOS_URL: &str = "https://www.cia.gov/library/publications/the-world-factbook/geos";

/// The archive has no usable Factbook captures before this year
pub const MIN_ARCHIVE_YEAR: i32 = 2007;

/// Page code from a page filename ("it.html" -> "it")
pub fn page_code(page_filename: &str) -> &str {
    page_filename.strip_suffix(".html").unwrap_or(page_filename)
}

fn factbook_page_url(page_code: &str) -> String {
    format!("{}/{}.html", FACTBOOK_GEOS_URL, page_code)
}

/// Calendar of captures for one page over one year
pub fn calendar_url(page_code: &str, year: i32) -> String {
    format!(
        "{}?url={}&selected_year={}",
        CALENDAR_API_URL,
        urlencoding::encode(&factbook_page_url(page_code)),
        year
    )
}

pub fn snapshot_url(timestamp: &str, page_code: &str) -> String {
    format!(
        "{}/{}/{}",
        SNAPSHOT_BASE_URL,
        timestamp,
        factbook_page_url(page_code)
    )
}

/// Parse the leading `YYYYMMDD` of a Wayback timestamp
pub fn timestamp_date(timestamp: &str) -> Option<NaiveDate> {
    let day = timestamp.get(..8)?;
    NaiveDate::parse_from_str(day, "%Y%m%d").ok()
}

/// Extract one snapshot per calendar day: the first capture that returned 200.
///
/// Redirecting http captures and error captures carry other statuses and are skipped.
pub fn parse_calendar(json: &str, page_code: &str) -> Result<Vec<Snapshot>> {
    let calendar: Calendar =
        serde_json::from_str(json).context("Failed to parse yearly summary JSON")?;

    let mut snapshots = Vec::new();
    for day in calendar.iter().flatten().flatten().flatten() {
        let first_ok = day
            .ts
            .iter()
            .zip(day.st.iter())
            .find(|(_, status)| **status == 200);

        if let Some((ts, status)) = first_ok {
            let timestamp = ts.to_string();
            let Some(date) = timestamp_date(&timestamp) else {
                log::warn!("Skipping capture with malformed timestamp {}", timestamp);
                continue;
            };
            snapshots.push(Snapshot {
                url: snapshot_url(&timestamp, page_code),
                timestamp,
                status: *status,
                date,
            });
        }
    }
    Ok(snapshots)
}

/// The Monday strictly before `date`
pub fn previous_monday(date: NaiveDate) -> NaiveDate {
    let days_after_monday = match date.weekday().num_days_from_monday() {
        0 => 7,
        n => n,
    };
    date - Duration::days(days_after_monday as i64)
}

/// The most recent snapshot dated on or before `date`; the first one wins a tie
pub fn latest_at_or_before(snapshots: &[Snapshot], date: NaiveDate) -> Option<&Snapshot> {
    let mut latest: Option<&Snapshot> = None;
    for snapshot in snapshots {
        if snapshot.date > date {
            continue;
        }
        if latest.map_or(true, |l| snapshot.date > l.date) {
            latest = Some(snapshot);
        }
    }
    latest
}

/// Result of walking one year backward
#[derive(Debug, Clone, PartialEq)]
pub struct YearWalk {
    /// Snapshots to fetch, newest first
    pub targets: Vec<Snapshot>,
    /// Where the walk stopped; its year is the next year to walk
    pub cursor: NaiveDate,
}

/// Step back Monday by Monday through `year`, picking the latest capture before each Monday.
///
/// After a pick the cursor jumps to the capture's date, so the next Monday
/// searched is always older than every capture already picked.
pub fn walk_year(snapshots: &[Snapshot], start: NaiveDate, year: i32) -> YearWalk {
    let mut cursor = start;
    let mut targets = Vec::new();

    while cursor.year() == year {
        cursor = previous_monday(cursor);
        if let Some(snapshot) = latest_at_or_before(snapshots, cursor) {
            cursor = snapshot.date;
            targets.push(snapshot.clone());
        }
    }

    YearWalk { targets, cursor }
}

/// Cursor position used when a year's calendar can't be read
pub fn end_of_previous_year(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year - 1, 12, 31).unwrap_or(NaiveDate::MIN)
}
