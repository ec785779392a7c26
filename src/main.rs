use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kpi_engine::dashboard::{self, Dashboard};
use kpi_engine::filter::{self, Selection};
use kpi_engine::load::DataCache;
use kpi_engine::locate;

#[derive(Parser)]
#[command(name = "kpi-engine")]
#[command(about = "Manufacturing KPI overview over batch and downtime facts")]
struct Args {
    /// Project root holding data_processed/ (default: walk up from cwd)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Start of the date range, YYYY-MM-DD (default: first observed date)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// End of the date range, YYYY-MM-DD (default: last observed date)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Restrict to one product
    #[arg(long)]
    product: Option<String>,

    /// Restrict to one operator
    #[arg(long)]
    operator: Option<String>,

    /// Emit the full dashboard as JSON instead of the text report
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => Ok(()),
        // A selection that matches nothing is a filter choice, not a failure.
        Err(err) if !err.is_fatal() => {
            warn!("{err}");
            println!("No data for the selected filters.");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn run(args: &Args) -> kpi_engine::error::Result<()> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => locate::find_project_root(&std::env::current_dir()?),
    };
    info!("project root: {}", root.display());

    let mut cache = DataCache::new(&root);
    let tables = cache.get_or_load()?;

    let (min_date, max_date) = filter::date_bounds(&tables.batches)?;
    let selection = Selection {
        start: args.start.unwrap_or(min_date),
        end: args.end.unwrap_or(max_date),
        product: args.product.clone(),
        operator: args.operator.clone(),
    };

    let dashboard = dashboard::build_dashboard(tables, &selection)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
    } else {
        print_report(&root, &dashboard);
    }
    Ok(())
}

fn print_report(root: &Path, dashboard: &Dashboard) {
    println!("Manufacturing KPI Overview");
    println!("Project root: {}", root.display());
    println!(
        "Selection: {} .. {}  product={}  operator={}",
        dashboard.selection.start,
        dashboard.selection.end,
        dashboard.selection.product.as_deref().unwrap_or("all"),
        dashboard.selection.operator.as_deref().unwrap_or("all"),
    );
    println!();

    let kpis = &dashboard.kpis;
    println!("Total Downtime (min)  {:>10.0}", kpis.total_downtime_min);
    println!(
        "Avg Downtime Rate     {:>10.1}%",
        kpis.avg_downtime_rate * 100.0
    );
    println!(
        "Avg Run Ratio         {:>10.1}%",
        kpis.avg_run_ratio * 100.0
    );
    println!("Batches               {:>10}", kpis.batch_count);

    println!();
    println!("{}", dashboard.daily_downtime.title);
    for (day, value) in dashboard
        .daily_downtime
        .x
        .iter()
        .zip(&dashboard.daily_downtime.y)
    {
        println!("  {}  {:>8.0}", day, value.unwrap_or(f64::NAN));
    }

    println!();
    println!("{}", dashboard.daily_rate.title);
    for (day, value) in dashboard.daily_rate.x.iter().zip(&dashboard.daily_rate.y) {
        println!("  {}  {:>7.1}%", day, value.unwrap_or(f64::NAN) * 100.0);
    }

    println!();
    println!("Top Downtime Reasons (Pareto)");
    match &dashboard.pareto {
        Some(pareto) => {
            for ((reason, minutes), share) in pareto
                .reasons
                .iter()
                .zip(&pareto.minutes)
                .zip(&pareto.cumulative)
            {
                println!("  {:<32} {:>8.0}  {:>6.1}%", reason, minutes, share * 100.0);
            }
        }
        None => println!("  No downtime reasons for this selection."),
    }

    println!();
    println!("Worst Batches (Highest Downtime)");
    println!(
        "  {:<12} {:>6} {:<12} {:<12} {:>9} {:>9} {:>7} {:>9}",
        "Date", "Batch", "Product", "Operator", "duration", "downtime", "rate", "run"
    );
    for row in &dashboard.worst_batches {
        println!(
            "  {:<12} {:>6} {:<12} {:<12} {:>9.0} {:>9.0} {:>6.1}% {:>9.0}",
            row.date.map(|d| d.to_string()).unwrap_or_default(),
            row.batch.map(|b| b.to_string()).unwrap_or_default(),
            row.product.as_deref().unwrap_or(""),
            row.operator.as_deref().unwrap_or(""),
            row.duration_min.unwrap_or(f64::NAN),
            row.downtime_total_min.unwrap_or(f64::NAN),
            row.downtime_rate.unwrap_or(f64::NAN) * 100.0,
            row.actual_run_min.unwrap_or(f64::NAN),
        );
    }
}
