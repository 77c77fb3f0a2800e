use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, Table};
use favorita_eda::prepare::{drop_unsold_families, prune_before_opening, store_openings};
use favorita_eda::{
    screen_features_with_alpha, AbTestVerdict, HolidayReconciler, ReconciledTable, SalesTables,
};
use polars::prelude::*;
use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge the holiday calendar onto the sales records and report the result
    Reconcile(ReconcileArgs),
    /// Test every calendar indicator for an association with the target
    Screen(ScreenArgs),
}

#[derive(Args, Debug)]
struct DataArgs {
    /// Directory holding train.csv, test.csv, stores.csv and holidays_events.csv
    #[arg(short, long)]
    data_dir: PathBuf,

    /// Keep rows dated before a store opened and families that never sold
    #[arg(long)]
    no_prune: bool,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Path to write the reconciled table as CSV
    #[arg(long)]
    output_csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScreenArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Column compared between the two groups of each indicator
    #[arg(long, default_value = "sales")]
    target: String,

    /// Significance level for the normality, variance and location tests
    #[arg(long, default_value_t = 0.05)]
    alpha: f64,

    /// Path to export the verdicts as JSON
    #[arg(long)]
    output_json: Option<PathBuf>,
}

fn read_csv(path: &Path) -> Result<DataFrame, Box<dyn Error>> {
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_try_parse_dates(true)
        .finish()
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?
        .collect()?;
    Ok(df)
}

fn load_tables(args: &DataArgs) -> Result<SalesTables, Box<dyn Error>> {
    let dir = &args.data_dir;
    let mut train = read_csv(&dir.join("train.csv"))?;
    let test = read_csv(&dir.join("test.csv"))?;
    let stores = read_csv(&dir.join("stores.csv"))?;
    let holidays = read_csv(&dir.join("holidays_events.csv"))?;

    if !args.no_prune {
        train = prune_before_opening(&train, &store_openings())?;
        let (kept, dropped) = drop_unsold_families(&train)?;
        info!(pairs = dropped.len(), "Dropped store/family pairs without sales");
        train = kept;
    }

    info!(
        train = train.height(),
        test = test.height(),
        stores = stores.height(),
        holidays = holidays.height(),
        "Loaded tables"
    );
    Ok(SalesTables::new(train, test, stores, holidays))
}

fn reconcile(tables: &SalesTables) -> Result<ReconciledTable, Box<dyn Error>> {
    Ok(HolidayReconciler::new(tables).run()?)
}

fn run_reconcile(args: ReconcileArgs) -> Result<(), Box<dyn Error>> {
    let tables = load_tables(&args.data)?;
    let reconciled = reconcile(&tables)?;
    reconciled.summary();

    if let Some(path) = args.output_csv {
        let mut frame = reconciled.frame().clone();
        let mut file = File::create(&path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut frame)?;
        println!("Reconciled table written to {}", path.display());
    }
    Ok(())
}

fn print_verdicts(verdicts: &[AbTestVerdict]) {
    let mut table = Table::new();
    table.set_header(vec![
        "Feature",
        "Test",
        "Homogeneity",
        "Decision",
        "p-value",
        "Mean (A)",
        "Mean (B)",
        "Median (A)",
        "Median (B)",
        "n (A)",
        "n (B)",
    ]);
    for v in verdicts {
        let homogeneity = v
            .homogeneity()
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(v.feature()),
            Cell::new(v.test_type()),
            Cell::new(homogeneity),
            Cell::new(v.decision()),
            Cell::new(format!("{:.4}", v.p_value())),
            Cell::new(format!("{:.2}", v.group_a_mean())),
            Cell::new(format!("{:.2}", v.group_b_mean())),
            Cell::new(format!("{:.2}", v.group_a_median())),
            Cell::new(format!("{:.2}", v.group_b_median())),
            Cell::new(v.group_a_size()),
            Cell::new(v.group_b_size()),
        ]);
    }
    println!("{}", table);
}

fn run_screen(args: ScreenArgs) -> Result<(), Box<dyn Error>> {
    if !(args.alpha > 0.0 && args.alpha < 1.0) {
        return Err(format!("alpha must lie strictly between 0 and 1, got {}", args.alpha).into());
    }

    let tables = load_tables(&args.data)?;
    let reconciled = reconcile(&tables)?;
    let verdicts = screen_features_with_alpha(
        reconciled.frame(),
        reconciled.indicator_columns(),
        &args.target,
        args.alpha,
    )?;

    let skipped = reconciled.indicator_columns().len() - verdicts.len();
    println!("A/B Screening Results ({})", args.target);
    println!("========================================");
    println!(
        "Features tested: {} (skipped for insufficient data: {})",
        verdicts.len(),
        skipped
    );
    print_verdicts(&verdicts);

    if let Some(path) = args.output_json {
        let json = serde_json::to_string_pretty(&verdicts)?;
        std::fs::write(&path, json)?;
        println!("Verdicts written to {}", path.display());
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Reconcile(args) => run_reconcile(args),
        Commands::Screen(args) => run_screen(args),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
