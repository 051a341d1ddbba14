//! Shared record types for the archive crawl and the reconciliation report

use chrono::NaiveDate;
use serde::Deserialize;

/// One archived capture of a Factbook page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub url: String,
    /// Wayback timestamp, `YYYYMMDDhhmmss`
    pub timestamp: String,
    pub status: u16,
    pub date: NaiveDate,
}

/// A single calendar cell from the archive's yearly summary.
///
/// `ts` and `st` are parallel arrays: capture timestamps and their HTTP status.
#[derive(Debug, Default, Deserialize)]
pub struct CalendarDay {
    #[serde(default)]
    pub ts: Vec<u64>,
    #[serde(default)]
    pub st: Vec<u16>,
}

/// Yearly summary as served by the archive: months -> weeks -> days
pub type Calendar = Vec<Vec<Vec<Option<CalendarDay>>>>;

/// One country's figure from either dataset
#[derive(Debug, Clone, PartialEq)]
pub struct CountryStat {
    pub value: f64,
    pub year: i32,
    /// Display name (Factbook only)
    pub name: Option<String>,
    /// Source link (Factbook only)
    pub source: Option<String>,
}

impl CountryStat {
    pub fn new(value: f64, year: i32) -> Self {
        Self {
            value,
            year,
            name: None,
            source: None,
        }
    }
}
