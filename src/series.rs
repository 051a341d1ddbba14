//! Time series of one Factbook field across the weekly JSON exports

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const WEEKLY_SUFFIX: &str = "_factbook.json";

/// Weekly export files sorted by date, with the date from their name
pub fn weekly_files(root: &Path) -> Result<Vec<(NaiveDate, PathBuf)>> {
    let mut files: Vec<(NaiveDate, PathBuf)> = fs::read_dir(root)
        .with_context(|| format!("Failed to read weekly directory: {}", root.display()))?
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let prefix = name.strip_suffix(WEEKLY_SUFFIX)?;
            let date = NaiveDate::parse_from_str(prefix.split('_').next()?, "%Y-%m-%d").ok()?;
            Some((date, entry.path()))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Value of `countries.<country>.data.<field path>`, path segments separated by `/`
pub fn field_value<'a>(export: &'a Value, country: &str, field_path: &str) -> Option<&'a Value> {
    let mut value = export.get("countries")?.get(country)?.get("data")?;
    for segment in field_path.split('/').filter(|s| !s.is_empty()) {
        value = value.get(segment)?;
    }
    Some(value)
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Write `date,value` rows for every weekly file that has the field
pub fn write_series<W: io::Write>(
    root: &Path,
    country: &str,
    field_path: &str,
    out: W,
) -> Result<usize> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    let mut rows = 0;

    for (date, path) in weekly_files(root)? {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let export: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        match field_value(&export, country, field_path) {
            Some(value) => {
                writer.write_record([date.format("%Y-%m-%d").to_string(), csv_cell(value)])?;
                rows += 1;
            }
            None => log::warn!("No {} for {} in {}", field_path, country, path.display()),
        }
    }

    writer.flush()?;
    Ok(rows)
}

pub fn run_series(root: Option<&Path>, country: &str, field_path: &str) -> Result<()> {
    let Some(root) = root else {
        bail!("No weekly directory: pass --weekly-root or set weekly_json_root in the config");
    };
    let rows = write_series(root, country, field_path, io::stdout().lock())?;
    log::debug!("Wrote {} rows", rows);
    Ok(())
}
