use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use sentinel_pipeline::batch::{scan, ScanEntry};
use sentinel_pipeline::price_loader::{load_catalog_file, PriceCatalog};
use sentinel_pipeline::{
    DetectionConfig, DetectionError, DetectionOrchestrator, DetectionReport, DiscountStatus,
    EvaluationContext, Result,
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "discount-sentinel")]
#[command(about = "Check whether advertised discounts are genuine or inflated")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one product, historically or against today's price
    Analyze {
        /// Purchase CSV with order date, product code and price columns
        csv: PathBuf,
        /// Product code to analyze
        #[arg(short, long)]
        product: String,
        /// Evaluation date (YYYY-MM-DD). Defaults to the product's last date,
        /// or to today when prices are given
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Current price; enables real-time evaluation
        #[arg(long, requires = "claimed")]
        price: Option<f64>,
        /// Claimed original price
        #[arg(long, requires = "price")]
        claimed: Option<f64>,
        #[command(flatten)]
        overrides: ConfigArgs,
    },
    /// Scan every product and rank the most suspicious discounts first
    Scan {
        /// Purchase CSV with order date, product code and price columns
        csv: PathBuf,
        /// Evaluation date (YYYY-MM-DD). Defaults to each product's last date
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Show only the first N results
        #[arg(long)]
        top: Option<usize>,
        /// Skip products with fewer distinct price days
        #[arg(long)]
        min_history_days: Option<usize>,
        #[command(flatten)]
        overrides: ConfigArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON detection config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Drop fraction that counts as a large discount (e.g. 0.2)
    #[arg(long)]
    drop_threshold: Option<f64>,
    /// Rolling z-score above which a price is a spike
    #[arg(long)]
    spike_z: Option<f64>,
    /// Look-back window in days
    #[arg(long)]
    window_days: Option<u32>,
    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

impl ConfigArgs {
    fn load(&self) -> Result<DetectionConfig> {
        let mut config = match &self.config {
            Some(path) => DetectionConfig::from_json_file(path)?,
            None => DetectionConfig::default(),
        };
        if let Some(v) = self.drop_threshold {
            config.drop_threshold = v;
        }
        if let Some(v) = self.spike_z {
            config.spike_z_threshold = v;
        }
        if let Some(v) = self.window_days {
            config.window_days = v;
        }
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// JSON output contract
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct AnalyzeJson<'a> {
    product_code: &'a str,
    narrative: String,
    #[serde(flatten)]
    report: &'a DetectionReport,
}

#[derive(Serialize)]
struct ScanJson<'a> {
    eval_date: Option<NaiveDate>,
    products_loaded: usize,
    products_evaluated: usize,
    suspicious: usize,
    results: &'a [ScanEntry],
}

// ---------------------------------------------------------------------------
// Human-readable output
// ---------------------------------------------------------------------------

fn print_banner(title: &str) {
    let rule = "\u{2550}".repeat(62);
    println!();
    println!("  \u{2554}{}\u{2557}", rule);
    println!("  \u{2551}{:^62}\u{2551}", title);
    println!("  \u{255a}{}\u{255d}", rule);
    println!();
}

fn status_icon(status: DiscountStatus) -> &'static str {
    match status {
        DiscountStatus::Suspicious => "!!",
        DiscountStatus::LimitedData => "? ",
        DiscountStatus::Genuine | DiscountStatus::NoDiscount => "  ",
    }
}

fn print_report(product: &str, report: &DetectionReport, load_ms: u128) {
    print_banner("DISCOUNT SENTINEL \u{00b7} Discount Check");

    let m = &report.result.metrics;
    println!(
        "  Product {}  \u{00b7}  {} evaluation on {}",
        product, report.mode, report.eval_date
    );
    println!(
        "  Window {} .. {}  \u{00b7}  {} daily prices",
        report.window.start,
        report.window.anchor,
        report.window.len()
    );
    println!();
    println!(
        "  {} Status: {}",
        status_icon(report.status()),
        report.status()
    );
    println!("  {:\u{2500}<62}", "");
    println!("     Current price        {:>10.2}", report.current_price);
    println!("     Claimed original     {:>10.2}", report.claimed_original_price);
    println!("     Drop                 {:>9.1}%", m.drop_pct * 100.0);
    println!(
        "     Volatility (CV)      {:>10.3}   score {:.2}",
        m.volatility, m.volatility_score
    );
    println!(
        "     Max rolling z        {:>10.2}   {}",
        m.spike_zscore,
        if m.spike_detected { "spike" } else { "no spike" }
    );
    println!("     Anomaly score        {:>10.3}", m.anomaly_score);
    println!("  {:\u{2500}<62}", "");

    if !report.spikes.is_empty() {
        let dates: Vec<String> = report
            .spikes
            .iter()
            .map(|r| format!("{} ({:.2})", r.date, r.price))
            .collect();
        println!("  Spikes: {}", dates.join(", "));
        println!();
    }

    println!("  {}", report.narrative());
    println!();
    println!("  \u{23f1}  CSV loaded in {}ms", load_ms);
    println!();
}

/// `evaluated` and `suspicious` count the whole scan, before any `--top` cut.
fn print_scan(
    entries: &[ScanEntry],
    catalog: &PriceCatalog,
    evaluated: usize,
    suspicious: usize,
    load_ms: u128,
    scan_ms: u128,
) {
    print_banner("DISCOUNT SENTINEL \u{00b7} Catalog Scan");

    let stats = catalog.stats();
    println!(
        "  {} rows read ({} dropped)  \u{00b7}  {} products  \u{00b7}  {} evaluated  \u{00b7}  {} suspicious",
        stats.rows_read,
        stats.rows_dropped,
        catalog.len(),
        evaluated,
        suspicious
    );
    println!();

    if entries.is_empty() {
        println!("  No products had enough history to evaluate.");
    } else {
        println!("  {:\u{2500}<62}", "");
        for (i, e) in entries.iter().enumerate() {
            let m = &e.result.metrics;
            println!(
                "  {} {:>3}. {:14} {:12} drop {:>6.1}%  anomaly {:.2}  {}",
                status_icon(e.status()),
                i + 1,
                e.product_code,
                e.status().to_string(),
                m.drop_pct * 100.0,
                m.anomaly_score,
                e.eval_date,
            );
        }
        println!("  {:\u{2500}<62}", "");
    }

    println!();
    println!(
        "  \u{23f1}  CSV loaded in {}ms \u{00b7} Scan ran in {}ms \u{00b7} Total {}ms",
        load_ms,
        scan_ms,
        load_ms + scan_ms
    );
    println!();
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn load(csv: &Path) -> Result<(PriceCatalog, u128)> {
    let start = Instant::now();
    let catalog = load_catalog_file(csv)?;
    Ok((catalog, start.elapsed().as_millis()))
}

fn run_analyze(
    csv: &Path,
    product: &str,
    date: Option<NaiveDate>,
    prices: Option<(f64, f64)>,
    overrides: &ConfigArgs,
) -> Result<()> {
    let config = overrides.load()?;
    let orchestrator = DetectionOrchestrator::new(config)?;
    let (catalog, load_ms) = load(csv)?;
    let history = catalog.history(product)?;

    let context = match prices {
        Some((current, claimed)) => {
            let eval_date = date.unwrap_or_else(|| Local::now().date_naive());
            EvaluationContext::new(eval_date, current, claimed)
        }
        None => {
            let eval_date = date
                .or_else(|| history.last_date())
                .ok_or(DetectionError::NoRecordOnOrBefore(Local::now().date_naive()))?;
            EvaluationContext::from_history(history, eval_date, orchestrator.config().window_days)?
        }
    };

    log::debug!("product={} context={:?}", product, context);
    let report = orchestrator.analyze_report(history, &context)?;

    if overrides.json {
        let out = AnalyzeJson {
            product_code: product,
            narrative: report.narrative(),
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_report(product, &report, load_ms);
    }
    Ok(())
}

/// Count the whole scan, then cut the ranked entries to `top`.
/// Returns `(evaluated, suspicious)`.
fn keep_top(entries: &mut Vec<ScanEntry>, top: Option<usize>) -> (usize, usize) {
    let evaluated = entries.len();
    let suspicious = entries
        .iter()
        .filter(|e| e.status() == DiscountStatus::Suspicious)
        .count();
    if let Some(n) = top {
        entries.truncate(n);
    }
    (evaluated, suspicious)
}

fn run_scan(
    csv: &Path,
    date: Option<NaiveDate>,
    top: Option<usize>,
    min_history_days: Option<usize>,
    overrides: &ConfigArgs,
) -> Result<()> {
    let mut config = overrides.load()?;
    if let Some(days) = min_history_days {
        config.min_history_days = days;
    }
    let orchestrator = DetectionOrchestrator::new(config)?;
    let (catalog, load_ms) = load(csv)?;

    let scan_start = Instant::now();
    let mut entries = scan(&catalog, date, &orchestrator)?;
    let scan_ms = scan_start.elapsed().as_millis();
    let (evaluated, suspicious) = keep_top(&mut entries, top);

    if overrides.json {
        let out = ScanJson {
            eval_date: date,
            products_loaded: catalog.len(),
            products_evaluated: evaluated,
            suspicious,
            results: &entries,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_scan(&entries, &catalog, evaluated, suspicious, load_ms, scan_ms);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let outcome = match &cli.command {
        Commands::Analyze {
            csv,
            product,
            date,
            price,
            claimed,
            overrides,
        } => {
            let prices = (*price).zip(*claimed);
            run_analyze(csv, product, *date, prices, overrides)
        }
        Commands::Scan {
            csv,
            date,
            top,
            min_history_days,
            overrides,
        } => run_scan(csv, *date, *top, *min_history_days, overrides),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
