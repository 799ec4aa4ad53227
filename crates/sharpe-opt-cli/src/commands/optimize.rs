use clap::Args;
use serde_json::Value;

use sharpe_opt_core::allocation::{run_allocation, ComparisonSink};

use super::{render_report, DataArgs, ReportArgs};

/// Arguments for maximum Sharpe ratio optimization
#[derive(Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub report: ReportArgs,

    /// Maximum SQP iterations before giving up on convergence
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Step and projected-gradient tolerance
    #[arg(long)]
    pub tolerance: Option<f64>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut settings = args.data.settings()?;
    if let Some(max_iterations) = args.max_iterations {
        settings.optimizer.max_iterations = max_iterations;
    }
    if let Some(tolerance) = args.tolerance {
        settings.optimizer.step_tolerance = tolerance;
        settings.optimizer.gradient_tolerance = tolerance;
    }
    settings.optimizer.validate()?;

    let request = args.data.request();
    let source = args.data.source();
    let sinks = args.report.sinks();
    let sinks: Vec<&dyn ComparisonSink> = sinks.iter().map(|s| s.as_ref()).collect();

    let output = run_allocation(&source, &request, &settings, &sinks)?;
    Ok(render_report(&output, args.report.precision))
}
