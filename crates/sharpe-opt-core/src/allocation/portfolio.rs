use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::allocation::collaborators::{load_prices, publish, ComparisonSink, PriceRequest, PriceSource};
use crate::analytics::statistics::{series_statistics, statistics};
use crate::analytics::{NegativeSharpe, PortfolioStatistics, StatisticsConfig};
use crate::error::SharpeOptError;
use crate::market_data::prices::normalize_series;
use crate::market_data::{PriceMatrix, ReturnMatrix};
use crate::optimizer::{
    check_feasible, uniform_weights, ConstrainedOptimizer, OptimizationResult, OptimizerSettings,
    SqpOptimizer, Termination,
};
use crate::types::{with_metadata, AssetId, ComputationOutput, Weight};
use crate::SharpeOptResult;

/// Weights above this draw a concentration warning.
const CONCENTRATION_WARNING: f64 = 0.40;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Statistics assumptions and solver tuning for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationSettings {
    pub statistics: StatisticsConfig,
    pub optimizer: OptimizerSettings,
}

/// Input to Sharpe-maximizing allocation.
#[derive(Debug, Clone)]
pub struct AllocationInput {
    /// Asset columns plus the benchmark column.
    pub prices: PriceMatrix,
    /// Name of the benchmark column; excluded from the optimizable set.
    pub benchmark: AssetId,
    pub settings: AllocationSettings,
}

/// A single asset weight in the final portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub asset: AssetId,
    pub weight: Weight,
}

/// How the solver run went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSummary {
    pub solver: String,
    pub converged: bool,
    pub termination: Termination,
    pub iterations: usize,
    pub evaluations: usize,
    /// Negative Sharpe at the solver's final point.
    pub objective_value: f64,
    pub projected_gradient_norm: f64,
}

/// Normalized value paths of the portfolio and the benchmark, both starting at 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSeries {
    pub dates: Vec<NaiveDate>,
    pub portfolio: Vec<f64>,
    pub benchmark_name: AssetId,
    pub benchmark: Vec<f64>,
}

/// Output of an allocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationOutput {
    pub allocations: Vec<AssetAllocation>,
    /// Recomputed at the final weights, independent of the solver's own value.
    pub statistics: PortfolioStatistics,
    /// `None` when the benchmark's own returns are degenerate.
    pub benchmark_statistics: Option<PortfolioStatistics>,
    /// Absent when weights were supplied rather than optimized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationSummary>,
    pub comparison: ComparisonSeries,
}

impl AllocationOutput {
    pub fn weights(&self) -> Vec<Weight> {
        self.allocations.iter().map(|a| a.weight).collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Maximize the Sharpe ratio with the bundled SQP solver.
pub fn optimize_portfolio(
    input: &AllocationInput,
) -> SharpeOptResult<ComputationOutput<AllocationOutput>> {
    let solver = SqpOptimizer::new(input.settings.optimizer.clone());
    optimize_portfolio_with(input, &solver)
}

/// Maximize the Sharpe ratio with any conforming solver.
///
/// The solver starts from the uniform allocation. Statistics are recomputed
/// at the returned weights, so a degenerate final allocation fails here even
/// though the solver tolerated degenerate intermediate points.
pub fn optimize_portfolio_with(
    input: &AllocationInput,
    solver: &dyn ConstrainedOptimizer,
) -> SharpeOptResult<ComputationOutput<AllocationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let config = &input.settings.statistics;
    config.validate()?;

    let (assets, benchmark_prices) = input.prices.split_benchmark(&input.benchmark)?;
    let n = assets.num_assets();
    let returns = ReturnMatrix::from_prices(&assets);
    let objective = NegativeSharpe::new(&returns, config);

    tracing::info!(
        assets = n,
        periods = returns.num_periods(),
        solver = solver.name(),
        "optimizing allocation"
    );
    let result = solver.minimize(&objective, &uniform_weights(n))?;
    check_feasible(&result.weights, n).map_err(|e| {
        SharpeOptError::OptimizationFailure(format!("solver returned an infeasible point: {}", e))
    })?;

    if !result.converged {
        warnings.push(format!(
            "Optimizer did not converge ({:?} after {} iterations); weights may be suboptimal",
            result.termination, result.iterations
        ));
    }

    let (output, mut report_warnings) = build_output(
        &assets,
        &returns,
        &input.benchmark,
        &benchmark_prices,
        &result.weights,
        config,
    )?;
    warnings.append(&mut report_warnings);

    let output = AllocationOutput {
        optimization: Some(summarize(solver, &result)),
        ..output
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Maximum Sharpe ratio allocation (long-only, fully invested)",
        &serde_json::json!({
            "n_assets": n,
            "n_returns": returns.num_periods(),
            "benchmark": input.benchmark,
            "periods_per_year": config.periods_per_year,
            "risk_free_rate": config.risk_free_rate,
            "std_dev": config.std_dev,
            "solver": solver.name(),
            "start": "uniform",
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Statistics and comparison series for caller-supplied weights.
pub fn evaluate_allocation(
    input: &AllocationInput,
    weights: &[Weight],
) -> SharpeOptResult<ComputationOutput<AllocationOutput>> {
    let start = Instant::now();
    let config = &input.settings.statistics;
    config.validate()?;

    let (assets, benchmark_prices) = input.prices.split_benchmark(&input.benchmark)?;
    check_feasible(weights, assets.num_assets()).map_err(|e| SharpeOptError::InvalidInput {
        field: "weights".into(),
        reason: e.to_string(),
    })?;
    let returns = ReturnMatrix::from_prices(&assets);
    let (output, warnings) = build_output(
        &assets,
        &returns,
        &input.benchmark,
        &benchmark_prices,
        weights,
        config,
    )?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Historical portfolio statistics for fixed weights",
        &serde_json::json!({
            "n_assets": assets.num_assets(),
            "n_returns": returns.num_periods(),
            "benchmark": input.benchmark,
            "periods_per_year": config.periods_per_year,
            "risk_free_rate": config.risk_free_rate,
            "std_dev": config.std_dev,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Load, optimize, then publish to every sink.
///
/// Sinks are only reached once optimization and statistics have fully
/// succeeded, so a failed run leaves no artifacts behind.
pub fn run_allocation(
    source: &dyn PriceSource,
    request: &PriceRequest,
    settings: &AllocationSettings,
    sinks: &[&dyn ComparisonSink],
) -> SharpeOptResult<ComputationOutput<AllocationOutput>> {
    let prices = load_prices(source, request)?;
    let input = AllocationInput {
        prices,
        benchmark: request.benchmark.clone(),
        settings: settings.clone(),
    };
    let output = optimize_portfolio(&input)?;
    publish(&output.result.comparison, sinks)?;
    Ok(output)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_output(
    assets: &PriceMatrix,
    returns: &ReturnMatrix,
    benchmark_name: &str,
    benchmark_prices: &[f64],
    weights: &[Weight],
    config: &StatisticsConfig,
) -> SharpeOptResult<(AllocationOutput, Vec<String>)> {
    let mut warnings = Vec::new();
    let stats = statistics(weights, returns, config)?;

    let benchmark_returns: Vec<f64> = benchmark_prices
        .windows(2)
        .map(|pair| pair[1] / pair[0] - 1.0)
        .collect();
    let benchmark_statistics = match series_statistics(&benchmark_returns, config) {
        Ok(s) => Some(s),
        Err(e) if e.is_degenerate() => {
            warnings.push(format!("Benchmark {} statistics unavailable: {}", benchmark_name, e));
            None
        }
        Err(e) => return Err(e),
    };

    let allocations: Vec<AssetAllocation> = assets
        .assets()
        .iter()
        .zip(weights.iter())
        .map(|(asset, w)| AssetAllocation {
            asset: asset.clone(),
            weight: *w,
        })
        .collect();

    if allocations.len() > 1 {
        for a in &allocations {
            if a.weight > CONCENTRATION_WARNING {
                warnings.push(format!(
                    "Concentrated position: {} has weight {:.4}",
                    a.asset, a.weight
                ));
            }
        }
    }

    let comparison = ComparisonSeries {
        dates: assets.dates().to_vec(),
        portfolio: portfolio_value(assets, weights),
        benchmark_name: benchmark_name.to_string(),
        benchmark: normalize_series(benchmark_prices),
    };

    Ok((
        AllocationOutput {
            allocations,
            statistics: stats,
            benchmark_statistics,
            optimization: None,
            comparison,
        },
        warnings,
    ))
}

/// Value of one unit invested at the first date: sum of weight * normalized price.
fn portfolio_value(assets: &PriceMatrix, weights: &[Weight]) -> Vec<f64> {
    assets
        .normalized()
        .iter()
        .map(|row| row.iter().zip(weights.iter()).map(|(p, w)| p * w).sum())
        .collect()
}

fn summarize(solver: &dyn ConstrainedOptimizer, result: &OptimizationResult) -> OptimizationSummary {
    OptimizationSummary {
        solver: solver.name().to_string(),
        converged: result.converged,
        termination: result.termination,
        iterations: result.iterations,
        evaluations: result.evaluations,
        objective_value: result.objective_value,
        projected_gradient_norm: result.projected_gradient_norm,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let first = NaiveDate::from_ymd_opt(2006, 1, 2).unwrap();
        (0..n).map(|i| first + chrono::Duration::days(i as i64)).collect()
    }

    fn input() -> AllocationInput {
        let rows = vec![
            vec![100.0, 20.0, 50.0],
            vec![101.0, 21.0, 50.5],
            vec![100.5, 20.5, 51.0],
            vec![102.0, 21.5, 50.8],
            vec![103.0, 22.0, 51.5],
        ];
        AllocationInput {
            prices: PriceMatrix::new(
                dates(rows.len()),
                vec!["SPY".into(), "AAA".into(), "BBB".into()],
                rows,
            )
            .unwrap(),
            benchmark: "SPY".into(),
            settings: AllocationSettings::default(),
        }
    }

    #[test]
    fn test_benchmark_excluded_from_allocation() {
        let out = optimize_portfolio(&input()).unwrap();
        let names: Vec<&str> = out.result.allocations.iter().map(|a| a.asset.as_str()).collect();
        assert_eq!(names, vec!["AAA", "BBB"]);
        assert_eq!(out.result.comparison.benchmark_name, "SPY");
    }

    #[test]
    fn test_comparison_series_start_at_one() {
        let out = optimize_portfolio(&input()).unwrap();
        let cmp = &out.result.comparison;
        assert_eq!(cmp.dates.len(), 5);
        assert!((cmp.portfolio[0] - 1.0).abs() < 1e-9);
        assert!((cmp.benchmark[0] - 1.0).abs() < 1e-12);
        assert!((cmp.benchmark[4] - 1.03).abs() < 1e-12);
    }

    #[test]
    fn test_reported_statistics_match_recomputation() {
        let out = optimize_portfolio(&input()).unwrap();
        let weights = out.result.weights();
        let again = evaluate_allocation(&input(), &weights).unwrap();
        assert_eq!(out.result.statistics, again.result.statistics);
        assert!(again.result.optimization.is_none());
    }

    #[test]
    fn test_portfolio_value_tracks_cumulative_return() {
        // With buy-and-hold weights the final value is the weighted normalized price
        let inp = input();
        let out = evaluate_allocation(&inp, &[0.5, 0.5]).unwrap();
        let last = *out.result.comparison.portfolio.last().unwrap();
        assert!((last - (0.5 * 22.0 / 20.0 + 0.5 * 51.5 / 50.0)).abs() < 1e-12);
    }

    #[test]
    fn test_infeasible_fixed_weights_rejected() {
        let err = evaluate_allocation(&input(), &[0.8, 0.8]).unwrap_err();
        assert!(matches!(err, SharpeOptError::InvalidInput { .. }));
    }

    #[test]
    fn test_flat_benchmark_is_a_warning() {
        let mut inp = input();
        let rows: Vec<Vec<f64>> = inp
            .prices
            .rows()
            .iter()
            .map(|r| vec![100.0, r[1], r[2]])
            .collect();
        inp.prices = PriceMatrix::new(dates(5), inp.prices.assets().to_vec(), rows).unwrap();
        let out = optimize_portfolio(&inp).unwrap();
        assert!(out.result.benchmark_statistics.is_none());
        assert!(out.warnings.iter().any(|w| w.contains("Benchmark SPY")));
    }
}
