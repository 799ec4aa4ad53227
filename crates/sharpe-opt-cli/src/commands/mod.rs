pub mod optimize;
pub mod stats;

use chrono::NaiveDate;
use clap::Args;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

use sharpe_opt_core::allocation::{AllocationOutput, AllocationSettings, ComparisonSink, PriceRequest};
use sharpe_opt_core::analytics::{PortfolioStatistics, StdDevConvention};
use sharpe_opt_core::ComputationOutput;

use crate::input;
use crate::input::market_data::CsvPriceSource;
use crate::output::chart::HtmlChartRenderer;
use crate::output::export::CsvExporter;

/// Where prices come from and which assets to allocate across
#[derive(Args)]
pub struct DataArgs {
    /// First date of the history (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last date of the history (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub end: NaiveDate,

    /// Comma-separated asset symbols (e.g. "AAPL,MSFT,GLD")
    #[arg(long, value_delimiter = ',', required = true)]
    pub assets: Vec<String>,

    /// Benchmark symbol; its trading days define the date index
    #[arg(long, default_value = "SPY")]
    pub benchmark: String,

    /// Directory holding one <SYMBOL>.csv per asset
    #[arg(long, env = "MARKET_DATA_DIR", default_value = "csv")]
    pub data_dir: PathBuf,

    /// Price column to read from each file
    #[arg(long, default_value = "Adj Close")]
    pub column: String,

    /// YAML or JSON file with `statistics` and `optimizer` sections
    #[arg(long)]
    pub config: Option<String>,

    /// Return periods per year used for annualisation
    #[arg(long)]
    pub periods_per_year: Option<f64>,

    /// Annual risk-free rate (e.g. 0.02)
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,

    /// Use the population standard deviation instead of the sample one
    #[arg(long)]
    pub population_std: bool,
}

/// Artifacts and rounding of the report
#[derive(Args)]
pub struct ReportArgs {
    /// Write an HTML chart of portfolio vs benchmark to this path
    #[arg(long)]
    pub chart: Option<PathBuf>,

    /// Write the normalized portfolio and benchmark series as CSV to this path
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Decimal places for reported figures
    #[arg(long, default_value = "8")]
    pub precision: u32,
}

impl DataArgs {
    pub fn request(&self) -> PriceRequest {
        PriceRequest {
            assets: self.assets.iter().map(|a| a.trim().to_string()).collect(),
            benchmark: self.benchmark.trim().to_string(),
            start: self.start,
            end: self.end,
        }
    }

    pub fn source(&self) -> CsvPriceSource {
        CsvPriceSource::new(self.data_dir.clone(), self.column.clone())
    }

    /// Config file values, then command-line overrides.
    pub fn settings(&self) -> Result<AllocationSettings, Box<dyn std::error::Error>> {
        let mut settings = match &self.config {
            Some(path) => input::file::read_config(path)?,
            None => AllocationSettings::default(),
        };
        if let Some(periods) = self.periods_per_year {
            settings.statistics.periods_per_year = periods;
        }
        if let Some(rate) = self.risk_free_rate {
            settings.statistics.risk_free_rate = rate;
        }
        if self.population_std {
            settings.statistics.std_dev = StdDevConvention::Population;
        }
        Ok(settings)
    }
}

impl ReportArgs {
    pub fn sinks(&self) -> Vec<Box<dyn ComparisonSink>> {
        let mut sinks: Vec<Box<dyn ComparisonSink>> = Vec::new();
        if let Some(path) = &self.chart {
            sinks.push(Box::new(HtmlChartRenderer::new(path.clone())));
        }
        if let Some(path) = &self.export {
            sinks.push(Box::new(CsvExporter::new(path.clone())));
        }
        sinks
    }
}

// ---------------------------------------------------------------------------
// Report rendering
// ---------------------------------------------------------------------------

/// Round through `Decimal` so printed figures carry a fixed number of places.
pub fn rounded(value: f64, precision: u32) -> Value {
    Decimal::from_f64_retain(value)
        .and_then(|d| d.round_dp(precision).to_f64())
        .map(Value::from)
        .unwrap_or(Value::Null)
}

fn statistics_fields(
    prefix: &str,
    stats: &PortfolioStatistics,
    precision: u32,
    out: &mut Map<String, Value>,
) {
    out.insert(format!("{}sharpe_ratio", prefix), rounded(stats.sharpe_ratio, precision));
    out.insert(
        format!("{}cumulative_return", prefix),
        rounded(stats.cumulative_return, precision),
    );
    out.insert(
        format!("{}mean_daily_return", prefix),
        rounded(stats.mean_daily_return, precision),
    );
    out.insert(
        format!("{}daily_std_dev", prefix),
        rounded(stats.daily_std_dev, precision),
    );
}

/// Flatten an allocation into the printed envelope. The comparison series
/// goes to the sinks and is summarized here by its length only.
pub fn render_report(output: &ComputationOutput<AllocationOutput>, precision: u32) -> Value {
    let report = &output.result;
    let mut result = Map::new();

    let allocations: Map<String, Value> = report
        .allocations
        .iter()
        .map(|a| (a.asset.clone(), rounded(a.weight, precision)))
        .collect();
    result.insert("allocations".into(), Value::Object(allocations));
    statistics_fields("", &report.statistics, precision, &mut result);

    if let Some(bench) = &report.benchmark_statistics {
        statistics_fields("benchmark_", bench, precision, &mut result);
    }
    result.insert(
        "benchmark".into(),
        Value::String(report.comparison.benchmark_name.clone()),
    );
    result.insert("periods".into(), json!(report.comparison.dates.len()));

    if let Some(opt) = &report.optimization {
        result.insert("converged".into(), json!(opt.converged));
        result.insert("termination".into(), json!(opt.termination));
        result.insert("iterations".into(), json!(opt.iterations));
        result.insert("evaluations".into(), json!(opt.evaluations));
        result.insert("objective_value".into(), rounded(opt.objective_value, precision));
        result.insert(
            "projected_gradient_norm".into(),
            json!(opt.projected_gradient_norm),
        );
        result.insert("solver".into(), json!(opt.solver));
    }

    json!({
        "result": Value::Object(result),
        "methodology": output.methodology,
        "assumptions": output.assumptions,
        "warnings": output.warnings,
        "metadata": output.metadata,
    })
}
