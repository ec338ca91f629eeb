//! Run reports: a JSON summary plus CSV trade tape and equity curve.
//!
//! `report.json` carries the fields downstream tooling keys on
//! (`symbol`, `start`, `end`, `final_value`, `weights`,
//! `probability_threshold`) followed by calibration and trade statistics.
//! Infinite or undefined numbers (no usable threshold, single-class AUC)
//! are written as `null`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use confluence_core::domain::TradeRecord;
use confluence_core::engine::{EquityPoint, PipelineOutcome, StrategyConfig};
use confluence_core::signals::WeightSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub symbol: String,
    pub start: String,
    pub end: String,
    pub final_value: f64,
    pub weights: WeightSet,
    /// Configured floor on the entry probability.
    pub probability_threshold: f64,
    pub selected_threshold: Option<f64>,
    pub final_threshold: Option<f64>,
    pub auc: Option<f64>,
    pub trades: usize,
    pub win_rate: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub config_id: String,
    pub data_source: String,
}

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

impl RunReport {
    pub fn new(config: &StrategyConfig, outcome: &PipelineOutcome, data_source: &str) -> Self {
        let bt = &outcome.backtest;
        let cal = &outcome.calibration;
        Self {
            symbol: config.symbol.clone(),
            start: config.start.format("%Y-%m-%d").to_string(),
            end: config.end.format("%Y-%m-%d").to_string(),
            final_value: bt.final_value,
            weights: config.effective_weights(),
            probability_threshold: config.probability_threshold,
            selected_threshold: finite(cal.selected_threshold),
            final_threshold: finite(cal.final_threshold),
            auc: finite(cal.model.auc),
            trades: bt.trades.len(),
            win_rate: bt.win_rate(),
            total_return: bt.total_return(),
            max_drawdown: bt.max_drawdown(),
            config_id: config.config_id(),
            data_source: data_source.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize run report")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse run report")
    }
}

/// Trade tape, one row per closed bracket.
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "side",
        "entry_bar",
        "entry_time",
        "entry_price",
        "exit_bar",
        "exit_time",
        "exit_price",
        "exit_reason",
        "size",
        "gross_pnl",
        "commission",
        "net_pnl",
        "bars_held",
    ])?;

    let time = |t: Option<chrono::DateTime<chrono::Utc>>| t.map(|t| t.to_rfc3339()).unwrap_or_default();
    for t in trades {
        wtr.write_record([
            &format!("{:?}", t.side),
            &t.entry_bar.to_string(),
            &time(t.entry_time),
            &format!("{:.6}", t.entry_price),
            &t.exit_bar.to_string(),
            &time(t.exit_time),
            &format!("{:.6}", t.exit_price),
            &format!("{:?}", t.exit_reason),
            &format!("{:.6}", t.size),
            &format!("{:.2}", t.gross_pnl),
            &format!("{:.2}", t.commission),
            &format!("{:.2}", t.net_pnl),
            &t.bars_held().to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

pub fn export_equity_csv(curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity"])?;
    for p in curve {
        wtr.write_record([p.timestamp.to_rfc3339(), format!("{:.2}", p.equity)])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write `report.json`, `trades.csv` and `equity.csv` into `dir`.
///
/// Returns the path of `report.json`.
pub fn save_report(report: &RunReport, outcome: &PipelineOutcome, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir: {}", dir.display()))?;

    let report_path = dir.join("report.json");
    std::fs::write(&report_path, report.to_json()?)
        .with_context(|| format!("failed to write {}", report_path.display()))?;
    std::fs::write(dir.join("trades.csv"), export_trades_csv(&outcome.backtest.trades)?)?;
    std::fs::write(dir.join("equity.csv"), export_equity_csv(&outcome.backtest.equity_curve)?)?;

    tracing::info!(path = %report_path.display(), "report saved");
    Ok(report_path)
}
