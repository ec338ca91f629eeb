//! Confluence CLI.
//!
//! Commands:
//! - `backtest`: one calibrated run with the configured weights and threshold
//! - `optimize`: seeded random search, prints the best trials
//! - `pipeline`: search, then a final run with the best parameters and a saved report

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use confluence_core::domain::Interval;
use confluence_core::engine::{PipelineOutcome, StrategyConfig};
use confluence_runner::{
    build_source, run_strategy, save_report, DataConfig, PipelineConfig, RandomSearch, RunReport,
    SearchOutcome,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "confluence",
    about = "Multi-timeframe signal fusion with calibrated bracket-order backtests"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once with the configured weights and threshold.
    Backtest {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Random search over weights and threshold (and optionally strategy params).
    Optimize {
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        search: SearchArgs,

        /// Number of best trials to print.
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Search, then rerun the best configuration and save its report.
    Pipeline {
        #[command(flatten)]
        run: RunArgs,
        #[command(flatten)]
        search: SearchArgs,
    },
}

/// Run settings. Flags override the config file.
#[derive(Args)]
struct RunArgs {
    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Symbol, e.g. BTCUSDT. Defaults to BTCUSDT without a config file.
    #[arg(long)]
    symbol: Option<String>,

    /// Start date (YYYY-MM-DD or RFC 3339).
    #[arg(long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD or RFC 3339).
    #[arg(long)]
    end: Option<String>,

    /// Comma-separated intervals, e.g. 5m,15m,1h.
    #[arg(long, value_delimiter = ',')]
    intervals: Option<Vec<Interval>>,

    /// Probability threshold floor.
    #[arg(long)]
    threshold: Option<f64>,

    /// Use synthetic candles instead of the configured source.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Read candles from CSV files in this directory.
    #[arg(long, conflicts_with = "synthetic")]
    csv_dir: Option<PathBuf>,

    /// Output directory for report.json, trades.csv and equity.csv.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    trials: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Also sample RSI/Supertrend and stop/target parameters.
    #[arg(long, default_value_t = false)]
    tune_strategy: bool,

    /// Run trials one at a time.
    #[arg(long, default_value_t = false)]
    sequential: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Backtest { run } => run_backtest_cmd(&run),
        Commands::Optimize { run, search, top } => run_optimize_cmd(&run, &search, top),
        Commands::Pipeline { run, search } => run_pipeline_cmd(&run, &search),
    }
}

fn load_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => {
            let (Some(start), Some(end)) = (&args.start, &args.end) else {
                bail!("--start and --end are required without --config");
            };
            PipelineConfig::new("BTCUSDT", start.as_str(), end.as_str())
        }
    };

    if let Some(symbol) = &args.symbol {
        config.symbol = symbol.clone();
    }
    if let Some(start) = &args.start {
        config.start = start.clone();
    }
    if let Some(end) = &args.end {
        config.end = end.clone();
    }
    if let Some(intervals) = &args.intervals {
        config.intervals = intervals.clone();
    }
    if let Some(threshold) = args.threshold {
        config.probability_threshold = threshold;
    }
    if args.synthetic {
        config.data = DataConfig::Synthetic { volatility: None };
    } else if let Some(dir) = &args.csv_dir {
        config.data = DataConfig::Csv { dir: dir.clone() };
    }
    Ok(config)
}

fn apply_search_args(config: &mut PipelineConfig, args: &SearchArgs) {
    if let Some(trials) = args.trials {
        config.search.trials = trials;
    }
    if let Some(seed) = args.seed {
        config.search.seed = seed;
    }
    if args.tune_strategy {
        config.search.tune_strategy = true;
    }
}

fn source_label(data: &DataConfig) -> &'static str {
    match data {
        DataConfig::Binance { .. } => "binance",
        DataConfig::Csv { .. } => "csv",
        DataConfig::Synthetic { .. } => "synthetic",
    }
}

fn run_backtest_cmd(args: &RunArgs) -> Result<()> {
    let config = load_config(args)?;
    let strategy = config.to_strategy()?;
    let source = build_source(&config.data)?;
    let outcome = run_strategy(strategy.clone(), source)?;

    let report = RunReport::new(&strategy, &outcome, source_label(&config.data));
    print_summary(&report, &outcome, config.data.is_synthetic());
    if let Some(dir) = &args.output_dir {
        let path = save_report(&report, &outcome, dir)?;
        println!("Report saved to: {}", path.display());
    }
    Ok(())
}

fn search(config: &PipelineConfig, args: &SearchArgs) -> Result<(StrategyConfig, SearchOutcome)> {
    let strategy = config.to_strategy()?;
    let source = build_source(&config.data)?;
    let outcome = RandomSearch::new(config.search)
        .with_parallelism(!args.sequential)
        .run(&strategy, source.as_ref())?;
    Ok((strategy, outcome))
}

fn run_optimize_cmd(run: &RunArgs, args: &SearchArgs, top: usize) -> Result<()> {
    let mut config = load_config(run)?;
    apply_search_args(&mut config, args);
    let (_, outcome) = search(&config, args)?;

    let mut ranked: Vec<_> = outcome
        .trials
        .iter()
        .filter_map(|t| t.final_value.map(|v| (v, t)))
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.index.cmp(&b.1.index)));
    let failed = outcome.trials.len() - ranked.len();

    println!();
    println!("=== Search: {} ({} trials, seed {}) ===", config.symbol, outcome.trials.len(), config.search.seed);
    if failed > 0 {
        println!("Failed trials: {failed}");
    }
    println!("{:<6} {:>14} {:>10}  Weights", "Trial", "Final value", "Threshold");
    println!("{}", "-".repeat(60));
    for (value, trial) in ranked.iter().take(top) {
        let weights: Vec<String> = trial
            .params
            .weights
            .iter()
            .map(|(name, w)| format!("{name}={w:.3}"))
            .collect();
        println!(
            "{:<6} {:>14.2} {:>10.3}  {}",
            trial.index,
            value,
            trial.params.probability_threshold,
            weights.join(" ")
        );
    }
    if let (Some(signal), Some(bracket)) = (outcome.best.params.signal, outcome.best.params.bracket) {
        println!();
        println!(
            "Best strategy params: rsi {}/{}/{}, supertrend {}/{:.1}, sl {:.4}, rr {:.1}",
            signal.rsi_period,
            signal.rsi_overbought,
            signal.rsi_oversold,
            signal.st_period,
            signal.st_multiplier,
            bracket.sl_pct,
            bracket.rr
        );
    }
    Ok(())
}

fn run_pipeline_cmd(run: &RunArgs, args: &SearchArgs) -> Result<()> {
    let mut config = load_config(run)?;
    apply_search_args(&mut config, args);
    let (_, searched) = search(&config, args)?;

    let best = searched.best_config.clone();
    let outcome = run_strategy(best.clone(), searched.data.clone())?;
    let report = RunReport::new(&best, &outcome, source_label(&config.data));
    print_summary(&report, &outcome, config.data.is_synthetic());

    let dir = run
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("results").join(format!("{}_{}", best.symbol, &report.config_id[..12])));
    let path = save_report(&report, &outcome, &dir)?;
    println!("Report saved to: {}", path.display());
    Ok(())
}

fn print_summary(report: &RunReport, outcome: &PipelineOutcome, synthetic: bool) {
    let fmt_opt = |v: Option<f64>| v.map(|x| format!("{x:.4}")).unwrap_or_else(|| "n/a".into());

    println!();
    println!("=== Run: {} ({} to {}) ===", report.symbol, report.start, report.end);
    if synthetic {
        println!("WARNING: synthetic data; results are not meaningful.");
    }
    println!("Bars:               {}", outcome.frame.len());
    println!("Calibration AUC:    {}", fmt_opt(report.auc));
    println!("Selected threshold: {}", fmt_opt(report.selected_threshold));
    println!("Final threshold:    {}", fmt_opt(report.final_threshold));
    println!("Trades:             {}", report.trades);
    println!("Win rate:           {:.1}%", report.win_rate * 100.0);
    println!("Total return:       {:.2}%", report.total_return * 100.0);
    println!("Max drawdown:       {:.2}%", report.max_drawdown * 100.0);
    println!("Final value:        {:.2}", report.final_value);
    println!("Config id:          {}", &report.config_id[..12]);
}
