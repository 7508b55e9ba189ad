use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod batch;
mod config;
mod dimensions;
mod fetch;
mod merge;
mod page;
mod reconcile;
mod split;
mod types;
mod utils;

use config::Settings;
use fetch::{HttpClient, NetworkExtractor, PageSource};
use merge::MergeOptions;
use page::Page;
use reconcile::{ReconcileStats, Reconciler};
use utils::osc8_file_link;

pub const DEFAULT_COMBINED_FILE: &str = "output.json";
pub const DEFAULT_CATALOG_NAME: &str = "ikea_Jan";

#[derive(Parser)]
#[command(name = "catalog-finisher")]
#[command(about = "Fill missing product dimensions and build the merged catalog")]
struct Cli {
    /// Settings file (defaults to catalog.conl when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a combined scraper output into one file per search query
    Split {
        /// Combined scraper output
        #[arg(short, long, default_value = DEFAULT_COMBINED_FILE)]
        input: PathBuf,
        /// Directory for the per-query files (defaults to input_dir)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Fill missing dimensions in every batch file, in place
    Fill {
        /// Directory of batch files (defaults to split_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Never fetch product pages
        #[arg(long)]
        offline: bool,
        /// Also look for dimensions in the product name
        #[arg(long)]
        from_name: bool,
        /// Pause after every page fetch, in milliseconds (at least 100)
        #[arg(long, value_name = "N")]
        delay_ms: Option<u64>,
    },
    /// Merge batch files into the final JSON and CSV catalog
    Finish {
        /// Merge a single file instead of a directory
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Directory of batch files (defaults to split_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Output base name; .json and .csv are added
        #[arg(short, long, default_value = DEFAULT_CATALOG_NAME)]
        out: PathBuf,
        /// Fill missing dimensions from product pages before merging
        #[arg(long)]
        enrich: bool,
    },
    /// Show where a product page keeps its dimensions
    Inspect {
        #[arg(value_name = "URL")]
        url: String,
    },
}

fn run_split(settings: &Settings, input: &Path, out_dir: Option<PathBuf>) -> Result<()> {
    let out_dir = out_dir.unwrap_or_else(|| settings.input_dir.clone());
    let combined = split::load_combined(input)?;
    let groups = split::split_results(combined);
    println!("Splitting {} into {} queries", input.display(), groups.len());

    let saved = split::save_groups(groups, &out_dir)?;
    let total: usize = saved.iter().map(|(_, count)| count).sum();
    println!(
        "\nDone: {} files, {} products in {}",
        saved.len(),
        total,
        osc8_file_link(&out_dir, &out_dir.to_string_lossy())
    );
    Ok(())
}

fn network_reconciler(settings: &Settings) -> Result<Reconciler<HttpClient>> {
    let client = HttpClient::new(settings).context("Failed to build HTTP client")?;
    Ok(Reconciler::with_network(NetworkExtractor::new(
        client,
        settings.delay(),
    )))
}

fn run_fill(settings: &Settings, dir: Option<PathBuf>, offline: bool, from_name: bool) -> Result<()> {
    let dir = dir.unwrap_or_else(|| settings.split_dir.clone());
    let reconciler = if offline {
        Reconciler::offline()
    } else {
        network_reconciler(settings)?
    }
    .from_name(from_name)
    .verbose(true);

    info!(
        dir = %dir.display(),
        network = reconciler.allows_network(),
        "filling missing dimensions"
    );

    let outcomes = reconcile::fill_directory(&dir, &reconciler)
        .with_context(|| format!("Failed to list batch files in {}", dir.display()))?;
    let failed: Vec<_> = outcomes.iter().filter(|o| o.result.is_err()).collect();
    let total = reconcile::total_stats(&outcomes);

    println!("Processed {} files ({} failed)", outcomes.len(), failed.len());
    for outcome in failed {
        println!("  Skipped: {}", outcome.path.display());
    }
    println!("{}", total);
    Ok(())
}

fn run_finish(
    settings: &Settings,
    input: Option<PathBuf>,
    dir: Option<PathBuf>,
    out: &Path,
    enrich: bool,
) -> Result<()> {
    let mut batches = match input {
        Some(path) => vec![merge::load_single(&path)?],
        None => {
            let dir = dir.unwrap_or_else(|| settings.split_dir.clone());
            let (batches, failures) = merge::load_batches(&dir)?;
            if !failures.is_empty() {
                warn!(count = failures.len(), "some batch files were skipped");
            }
            batches
        }
    };

    if enrich {
        let reconciler = network_reconciler(settings)?.verbose(true);
        let mut total = ReconcileStats::default();
        for batch in &mut batches {
            println!("Enriching {}...", batch.origin.as_deref().unwrap_or("input"));
            total += reconciler.reconcile(batch);
        }
        println!("{}", total);
    }

    let options = MergeOptions {
        brand: &settings.brand,
        categories: &settings.categories,
    };
    let catalog = merge::merge(&batches, &options);

    for summary in &catalog.batches {
        if summary.dropped > 0 {
            println!(
                "  {}: kept {}, dropped {} without a name",
                summary.origin, summary.kept, summary.dropped
            );
        }
    }

    let (json_path, csv_path) = merge::save_catalog(&catalog, out)?;

    println!("\nCombined {} products", catalog.len());
    if !catalog.is_empty() {
        println!(
            "Product IDs: {} to {}",
            merge::format_id(1),
            merge::format_id(catalog.len())
        );
    }
    println!(
        "Saved: {} and {}",
        osc8_file_link(&json_path, &json_path.to_string_lossy()),
        osc8_file_link(&csv_path, &csv_path.to_string_lossy())
    );
    Ok(())
}

fn run_inspect(settings: &Settings, url: &str) -> Result<()> {
    let client = HttpClient::new(settings).context("Failed to build HTTP client")?;
    let fetched = client
        .fetch(url)
        .with_context(|| format!("Failed to fetch {}", url))?;
    let page = Page::parse(&fetched.html);

    match (&page.structured_data, page.structured_object()) {
        (None, _) => println!("Structured data: none"),
        (Some(_), Ok(_)) => println!("Structured data: present"),
        (Some(_), Err(e)) => println!("Structured data: present but unusable ({})", e),
    }

    let candidates = dimensions::candidates(&page.body_text, 5);
    if candidates.is_empty() {
        println!("Dimension candidates in page text: none");
    } else {
        println!("Dimension candidates in page text:");
        for candidate in &candidates {
            println!("  {}", candidate);
        }
    }

    println!("Measurement sections: {}", page.sections.len());
    println!("Result: {}", page::locate_dimension(&page).as_str());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Split { input, out_dir } => run_split(&settings, &input, out_dir),
        Commands::Fill {
            dir,
            offline,
            from_name,
            delay_ms,
        } => {
            if let Some(ms) = delay_ms {
                settings.delay_ms = ms;
            }
            run_fill(&settings, dir, offline, from_name)
        }
        Commands::Finish {
            input,
            dir,
            out,
            enrich,
        } => run_finish(&settings, input, dir, &out, enrich),
        Commands::Inspect { url } => run_inspect(&settings, &url),
    }
}
