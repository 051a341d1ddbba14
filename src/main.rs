use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod archive;
mod blacklist;
mod cache;
mod config;
mod countries;
mod fetch;
mod reconcile;
mod series;
mod types;
mod utils;

use config::{Config, DEFAULT_CONFIG_FILE};
use reconcile::{Indicator, MATERNAL_MORTALITY};

#[derive(Parser)]
#[command(name = "factbook-archive")]
#[command(about = "Archive historical World Factbook pages and reconcile them against WHO data")]
struct Cli {
    /// Config file (CONL, or JSON when the name ends in .json)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum IndicatorArg {
    MaternalMortality,
}

impl IndicatorArg {
    fn indicator(self) -> &'static Indicator {
        match self {
            IndicatorArg::MaternalMortality => &MATERNAL_MORTALITY,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,
    /// Fetch weekly snapshots of the world page and every country page
    Fetch {
        /// Only crawl these pages (e.g. "it.html")
        #[arg(short, long = "page", value_name = "PAGE")]
        pages: Vec<String>,
    },
    /// List country pages found in cached world pages
    Countries,
    /// Compare a WHO GHO export against a Factbook JSON export
    Reconcile {
        /// WHO export (JSON)
        #[arg(long)]
        who: PathBuf,
        /// Factbook export (JSON)
        #[arg(long)]
        factbook: PathBuf,
        #[arg(long, value_enum, default_value = "maternal-mortality")]
        indicator: IndicatorArg,
    },
    /// Print one country's field from every weekly export as date,value CSV
    Series {
        /// Country key (e.g. "italy")
        #[arg(long)]
        country: String,
        /// Field path under data, separated by '/'
        #[arg(long)]
        field: String,
        /// Directory of YYYY-MM-DD_factbook.json files (defaults to weekly_json_root)
        #[arg(long)]
        weekly_root: Option<PathBuf>,
    },
}

fn run_init(path: &std::path::Path) -> Result<()> {
    let config = Config::write_default(path)?;
    println!("Wrote {}", path.display());
    println!("  pages:     {}", config.country_html_root.display());
    println!("  blacklist: {}", config.country_html_blacklist.display());
    println!("  summaries: {}", config.country_html_yearly_summaries.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => run_init(&cli.config),
        Commands::Fetch { pages } => fetch::run_fetch(&Config::load(&cli.config)?, &pages),
        Commands::Countries => {
            countries::run_countries(&Config::load(&cli.config)?.country_html_root)
        }
        Commands::Reconcile {
            who,
            factbook,
            indicator,
        } => reconcile::run_reconcile(&who, &factbook, indicator.indicator()),
        Commands::Series {
            country,
            field,
            weekly_root,
        } => {
            let root = match weekly_root {
                Some(root) => Some(root),
                None => Config::load(&cli.config)?.weekly_json_root,
            };
            series::run_series(root.as_deref(), &country, &field)
        }
    }
}
