//! WHO vs Factbook comparison of a per-country statistic
//!
//! Both datasets are keyed by a normalized country name. WHO names are
//! renamed into the Factbook's naming scheme before the join.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::types::CountryStat;
use crate::utils::html_escape;

/// WHO country keys that differ from the Factbook's
const WHO_RENAMES: &[(&str, &str)] = &[
    ("united_states_of_america", "united_states"),
    ("united_kingdom_of_great_britain_and_northern_ireland", "united_kingdom"),
    ("congo", "congo_republic_of_the"),
    ("democratic_republic_of_the_congo", "congo_democratic_republic_of_the"),
    ("venezuela_bolivarian_republic_of", "venezuela"),
    ("bolivia_plurinational_state_of", "bolivia"),
    ("russian_federation", "russia"),
    ("united_republic_of_tanzania", "tanzania"),
    ("the_former_yugoslav_republic_of_macedonia", "macedonia"),
    ("syrian_arab_republic", "syria"),
    ("viet_nam", "vietnam"),
    ("gambia", "gambia_the"),
    ("iran_islamic_republic_of", "iran"),
    ("myanmar", "burma"),
    ("bahamas", "bahamas_the"),
    ("republic_of_korea", "korea_south"),
    ("lao_people's_democratic_republic", "laos"),
    ("democratic_people's_republic_of_korea", "korea_north"),
    ("cote_d'ivoire", "cote_d'_ivoire"),
    ("republic_of_moldova", "moldova"),
    ("brunei_darussalam", "brunei"),
];

/// Rows shown at each end of the partial table
const PARTIAL_ROWS: usize = 5;

/// A statistic present in both datasets
#[derive(Debug, Clone)]
pub struct Indicator {
    /// `dim.GHO` label of the WHO facts to keep
    pub who_label: &'static str,
    /// Field under `data.people` in the Factbook export
    pub factbook_field: &'static str,
    /// Value key inside that field
    pub factbook_value_key: &'static str,
    /// Table column heading
    pub heading: &'static str,
    /// Short name used in summary lines
    pub short_name: &'static str,
    /// Target of the partial table's "Full Table" link
    pub full_table_href: &'static str,
}

pub const MATERNAL_MORTALITY: Indicator = Indicator {
    who_label: "Maternal mortality ratio (per 100 000 live births)",
    factbook_field: "maternal_mortality_rate",
    factbook_value_key: "deaths_per_100k_live_births",
    heading: "Deaths per 100K live births",
    short_name: "MMR",
    full_table_href: "maternal-mortality-rate",
};

/// Factbook-style key for a WHO country name
pub fn normalize_country_key(name: &str) -> String {
    let key = name
        .to_lowercase()
        .replace(' ', "_")
        .replace('-', "_")
        .replace('(', "")
        .replace(')', "");
    match WHO_RENAMES.iter().find(|(who, _)| *who == key) {
        Some((_, factbook)) => factbook.to_string(),
        None => key,
    }
}

#[derive(Debug, Deserialize)]
struct WhoExport {
    fact: Vec<WhoFact>,
}

#[derive(Debug, Deserialize)]
struct WhoFact {
    dim: HashMap<String, String>,
    #[serde(rename = "Value")]
    value: String,
}

/// "12 345 [9 800-15 000]" -> 12345
fn parse_who_value(value: &str) -> Option<f64> {
    let point = value.split('[').next().unwrap_or(value).replace(' ', "");
    point.parse().ok()
}

/// Latest-year figure per country from a WHO GHO export
pub fn load_who(json: &str, indicator: &Indicator) -> Result<BTreeMap<String, CountryStat>> {
    let json = json.replace("Côte", "Cote");
    let export: WhoExport = serde_json::from_str(&json).context("Failed to parse WHO export")?;

    let mut countries: BTreeMap<String, CountryStat> = BTreeMap::new();
    for fact in &export.fact {
        if fact.dim.get("GHO").map(String::as_str) != Some(indicator.who_label) {
            continue;
        }
        let (Some(country), Some(year)) = (fact.dim.get("COUNTRY"), fact.dim.get("YEAR")) else {
            log::warn!("WHO fact without COUNTRY or YEAR: {:?}", fact.dim);
            continue;
        };
        let key = normalize_country_key(country);
        let Ok(year) = year.trim().parse::<i32>() else {
            log::warn!("Unparseable WHO year {:?} for {}", year, key);
            continue;
        };
        if countries.get(&key).map_or(false, |existing| year < existing.year) {
            continue;
        }
        let Some(value) = parse_who_value(&fact.value) else {
            log::warn!("Unparseable WHO value {:?} for {}", fact.value, key);
            continue;
        };
        countries.insert(key, CountryStat::new(value, year));
    }
    Ok(countries)
}

fn json_year(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(year) => i32::try_from(year).ok(),
            // Whole-number floats such as 2015.0
            None => n
                .as_f64()
                .filter(|year| year.fract() == 0.0)
                .and_then(|year| i32::try_from(year as i64).ok()),
        },
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn factbook_stat(country: &Value, indicator: &Indicator) -> Option<CountryStat> {
    let field = country.get("data")?.get("people")?.get(indicator.factbook_field)?;
    Some(CountryStat {
        value: field.get(indicator.factbook_value_key)?.as_f64()?,
        year: json_year(field.get("date")?)?,
        name: Some(country.get("data")?.get("name")?.as_str()?.to_string()),
        source: Some(country.get("metadata")?.get("source")?.as_str()?.to_string()),
    })
}

/// Factbook export: every country key, and the figures of those that have the statistic
pub struct FactbookData {
    pub total_countries: usize,
    pub stats: BTreeMap<String, CountryStat>,
}

pub fn load_factbook(json: &str, indicator: &Indicator) -> Result<FactbookData> {
    let root: Value = serde_json::from_str(json).context("Failed to parse Factbook export")?;
    let countries = root
        .get("countries")
        .and_then(Value::as_object)
        .context("Factbook export has no countries object")?;

    let stats = countries
        .iter()
        .filter_map(|(key, country)| Some((key.clone(), factbook_stat(country, indicator)?)))
        .collect();

    Ok(FactbookData {
        total_countries: countries.len(),
        stats,
    })
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub who: CountryStat,
    pub factbook: CountryStat,
    pub is_match: bool,
    pub diff: f64,
}

/// |a - b| relative to the smaller of the two
pub fn relative_diff(a: f64, b: f64) -> f64 {
    let delta = (a - b).abs();
    if delta == 0.0 {
        return 0.0;
    }
    delta / a.min(b)
}

#[derive(Debug)]
pub struct Reconciliation {
    /// Keyed and ordered by country key
    pub matches: BTreeMap<String, Comparison>,
    pub mismatches: usize,
    pub largest_diff: f64,
    pub largest_diff_country: String,
    pub who_only: Vec<String>,
    pub factbook_only: Vec<String>,
    pub who_count: usize,
    pub factbook_total: usize,
    pub factbook_with_data: usize,
}

impl Reconciliation {
    pub fn matching(&self) -> usize {
        self.matches.len() - self.mismatches
    }
}

pub fn reconcile(
    who: &BTreeMap<String, CountryStat>,
    factbook: &FactbookData,
) -> Reconciliation {
    let mut matches: BTreeMap<String, Comparison> = BTreeMap::new();
    for (key, who_stat) in who {
        let Some(fb_stat) = factbook.stats.get(key) else {
            continue;
        };
        matches.insert(
            key.clone(),
            Comparison {
                who: who_stat.clone(),
                factbook: fb_stat.clone(),
                is_match: who_stat.value == fb_stat.value && who_stat.year == fb_stat.year,
                diff: relative_diff(who_stat.value, fb_stat.value),
            },
        );
    }

    let mismatches = matches.values().filter(|m| !m.is_match).count();
    let mut largest_diff = 0.0;
    let mut largest_diff_country = String::new();
    for (key, m) in &matches {
        if m.diff > largest_diff {
            largest_diff = m.diff;
            largest_diff_country = m.factbook.name.clone().unwrap_or_else(|| key.clone());
        }
    }

    let factbook_only = factbook
        .stats
        .keys()
        .filter(|k| !who.contains_key(*k))
        .cloned()
        .collect();
    let who_only = who
        .keys()
        .filter(|k| !factbook.stats.contains_key(*k))
        .cloned()
        .collect();

    Reconciliation {
        matches,
        mismatches,
        largest_diff,
        largest_diff_country,
        who_only,
        factbook_only,
        who_count: who.len(),
        factbook_total: factbook.total_countries,
        factbook_with_data: factbook.stats.len(),
    }
}

fn table_heading(out: &mut String, indicator: &Indicator) {
    out.push_str("  <tr>\n");
    out.push_str("    <th>Country</th>\n");
    out.push_str(&format!("    <th colspan=2>{}</th>\n", html_escape(indicator.heading)));
    out.push_str("  </tr>\n");
    out.push_str("  <tr>\n");
    out.push_str("    <th></th>\n");
    out.push_str("    <th>CIA</th>\n");
    out.push_str("    <th>WHO</th>\n");
    out.push_str("  </tr>\n");
}

fn table_row(out: &mut String, key: &str, m: &Comparison) {
    let fb = &m.factbook;
    let class = if m.is_match { "match" } else { "mismatch" };
    let name = fb.name.as_deref().unwrap_or(key);
    out.push_str(&format!("  <tr class=\"{}\">\n", class));
    out.push_str("    <td>\n");
    out.push_str(&format!(
        "      <a href=\"{}\">{}</a></td>\n",
        html_escape(fb.source.as_deref().unwrap_or("")),
        html_escape(name)
    ));
    out.push_str("    </td>\n");
    out.push_str(&format!("    <td>{} ({})</td>\n", fb.value, fb.year));
    out.push_str(&format!("    <td>{} ({})</td>\n", m.who.value, m.who.year));
    out.push_str("  </tr>\n");
}

fn filler_row(out: &mut String, first_cell: &str) {
    out.push_str("  <tr>\n");
    out.push_str(&format!("    <td>{}</td>\n", first_cell));
    out.push_str("    <td></td>\n");
    out.push_str("    <td></td>\n");
    out.push_str("  </tr>\n");
}

pub fn full_table(r: &Reconciliation, indicator: &Indicator) -> String {
    let mut out = String::from("<table>\n");
    table_heading(&mut out, indicator);
    for (key, m) in &r.matches {
        table_row(&mut out, key, m);
    }
    out.push_str("</table>\n");
    out
}

/// First and last few rows with a link to the full table
pub fn partial_table(r: &Reconciliation, indicator: &Indicator) -> String {
    let rows: Vec<(&String, &Comparison)> = r.matches.iter().collect();
    let head = &rows[..rows.len().min(PARTIAL_ROWS)];
    let tail = &rows[rows.len().saturating_sub(PARTIAL_ROWS)..];

    let mut out = String::from("<table>\n");
    table_heading(&mut out, indicator);
    for (key, m) in head {
        table_row(&mut out, key, m);
    }
    filler_row(&mut out, "...");
    for (key, m) in tail {
        table_row(&mut out, key, m);
    }
    filler_row(
        &mut out,
        &format!("<a href=\"{}\">Full Table</a>", indicator.full_table_href),
    );
    out.push_str("</table>\n");
    out
}

pub fn summary(r: &Reconciliation, indicator: &Indicator) -> String {
    let mut out = String::new();
    let name = indicator.short_name;

    if !r.factbook_only.is_empty() {
        out.push_str(&format!("Countries in CIA with {} data but not in WHO\n", name));
        for key in &r.factbook_only {
            out.push_str(&format!("{}\n", key));
        }
        out.push('\n');
    }
    if !r.who_only.is_empty() {
        out.push_str(&format!("Countries in WHO with {} data but not in CIA\n", name));
        for key in &r.who_only {
            out.push_str(&format!("{}\n", key));
        }
        out.push('\n');
    }

    let both = r.matches.len();
    out.push_str(&format!("Countries in both CIA and WHO {}\n", both));
    out.push_str(&format!("Countries in WHO {}\n", r.who_count));
    out.push_str(&format!("Countries in CIA {}\n", r.factbook_total));
    out.push_str(&format!("Countries in CIA with data {}\n", r.factbook_with_data));
    out.push_str(&format!(
        "Countries in CIA without data {}\n",
        r.factbook_total - r.factbook_with_data
    ));
    out.push_str(&format!("Countries in CIA but not in WHO {}\n", r.factbook_total - both));
    out.push_str(&format!("Countries in WHO but not in CIA {}\n", r.who_count - both));
    out.push_str(&format!("Countries with matching data {}\n", r.matching()));
    out.push_str(&format!("Countries with mismatching data {}\n", r.mismatches));
    out.push_str(&format!("Country with largest diff {}\n", r.largest_diff_country));
    out.push_str(&format!("Largest diff {}\n", r.largest_diff));
    out
}

pub fn run_reconcile(who_path: &Path, factbook_path: &Path, indicator: &Indicator) -> Result<()> {
    let who_json = fs::read_to_string(who_path)
        .with_context(|| format!("Failed to read {}", who_path.display()))?;
    let factbook_json = fs::read_to_string(factbook_path)
        .with_context(|| format!("Failed to read {}", factbook_path.display()))?;

    let who = load_who(&who_json, indicator)
        .with_context(|| format!("Failed to load {}", who_path.display()))?;
    let factbook = load_factbook(&factbook_json, indicator)
        .with_context(|| format!("Failed to load {}", factbook_path.display()))?;

    let result = reconcile(&who, &factbook);

    println!("{}", full_table(&result, indicator));
    println!("{}", partial_table(&result, indicator));
    println!("{}", summary(&result, indicator));
    Ok(())
}
