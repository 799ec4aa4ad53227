use clap::Args;
use serde_json::Value;

use sharpe_opt_core::allocation::{
    evaluate_allocation, load_prices, publish, AllocationInput, ComparisonSink,
};

use super::{render_report, DataArgs, ReportArgs};

/// Arguments for statistics of a fixed allocation
#[derive(Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub report: ReportArgs,

    /// Comma-separated weights in the same order as --assets (must sum to 1)
    #[arg(long, value_delimiter = ',', required = true)]
    pub weights: Vec<f64>,
}

pub fn run_stats(args: StatsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    if args.weights.len() != args.data.assets.len() {
        return Err(format!(
            "{} weights given for {} assets",
            args.weights.len(),
            args.data.assets.len()
        )
        .into());
    }

    let settings = args.data.settings()?;
    let request = args.data.request();
    let prices = load_prices(&args.data.source(), &request)?;
    let input = AllocationInput {
        prices,
        benchmark: request.benchmark.clone(),
        settings,
    };
    let output = evaluate_allocation(&input, &args.weights)?;

    let sinks = args.report.sinks();
    let sinks: Vec<&dyn ComparisonSink> = sinks.iter().map(|s| s.as_ref()).collect();
    publish(&output.result.comparison, &sinks)?;

    Ok(render_report(&output, args.report.precision))
}
