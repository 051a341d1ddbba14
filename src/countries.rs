//! Country page discovery from cached copies of the Factbook world page

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use std::fs;
use std::path::Path;

/// The world page; its country drop-down lists every other page
pub const WORLD_PAGE: &str = "xx.html";

/// Pages never crawled as countries: the world itself and Baker Island
pub const SKIPPED_PAGES: &[&str] = &[WORLD_PAGE, "fq.html"];

/// Page filenames from the `<select>` options of a world page, in order, without repeats
pub fn country_list(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let option_selector = Selector::parse("select option").unwrap();

    let mut pages: Vec<String> = Vec::new();
    for option in document.select(&option_selector) {
        let Some(value) = option.value().attr("value").filter(|v| !v.is_empty()) else {
            continue;
        };
        let mut page = value.rsplit('/').next().unwrap_or(value).to_lowercase();
        // Some years list bare country codes instead of file names
        if page.len() == 2 && page.chars().all(|c| c.is_ascii_alphabetic()) {
            page.push_str(".html");
        }
        if !page.ends_with(".html") {
            continue;
        }
        if !pages.contains(&page) {
            pages.push(page);
        }
    }
    pages
}

/// Union of the country lists of every cached world page, oldest date first
pub fn collect_from_cache(good_root: &Path) -> Result<Vec<String>> {
    let mut date_dirs: Vec<_> = fs::read_dir(good_root)
        .with_context(|| format!("Failed to read page cache: {}", good_root.display()))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    date_dirs.sort();

    let mut pages: Vec<String> = Vec::new();
    for dir in &date_dirs {
        let mut world_files: Vec<_> = fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .map_or(false, |n| n.to_string_lossy().ends_with(WORLD_PAGE))
            })
            .collect();
        world_files.sort();

        if world_files.len() > 1 {
            log::warn!(
                "Found {} world files in {}: {:?}",
                world_files.len(),
                dir.display(),
                world_files
            );
        }
        let [world_file] = world_files.as_slice() else {
            continue;
        };

        let html = fs::read_to_string(world_file)
            .with_context(|| format!("Failed to read {}", world_file.display()))?;
        for page in country_list(&html) {
            if !pages.contains(&page) {
                pages.push(page);
            }
        }
    }
    Ok(pages)
}

pub fn run_countries(good_root: &Path) -> Result<()> {
    let pages = collect_from_cache(good_root)?;
    if pages.is_empty() {
        println!("No cached world pages found. Run 'fetch' first.");
        return Ok(());
    }
    for page in &pages {
        println!("{}", page);
    }
    println!("\n{} pages", pages.len());
    Ok(())
}
