use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

use sharpe_opt_core::allocation::collaborators::BoxError;
use sharpe_opt_core::allocation::{
    optimize_portfolio, optimize_portfolio_with, run_allocation, AllocationInput,
    AllocationSettings, ComparisonSeries, ComparisonSink, PriceRequest, PriceSource,
};
use sharpe_opt_core::analytics::statistics::{series_statistics, statistics};
use sharpe_opt_core::analytics::{NegativeSharpe, StatisticsConfig};
use sharpe_opt_core::market_data::{PriceMatrix, ReturnMatrix};
use sharpe_opt_core::optimizer::{
    uniform_weights, ConstrainedOptimizer, Objective, OptimizationResult, SqpOptimizer,
    Termination, FEASIBILITY_TOLERANCE,
};
use sharpe_opt_core::{SharpeOptError, SharpeOptResult};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn dates(n: usize) -> Vec<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(2006, 1, 3).unwrap();
    (0..n).map(|i| first + chrono::Duration::days(i as i64)).collect()
}

/// Compound per-asset returns into prices starting at 100. Column 0 is "SPY".
fn prices_from_returns(names: &[&str], returns: &[Vec<f64>]) -> PriceMatrix {
    let n_assets = names.len();
    let mut rows = vec![vec![100.0; n_assets]];
    for r in returns {
        let prev = rows.last().unwrap().clone();
        rows.push(prev.iter().zip(r.iter()).map(|(p, ri)| p * (1.0 + ri)).collect());
    }
    PriceMatrix::new(
        dates(rows.len()),
        names.iter().map(|s| s.to_string()).collect(),
        rows,
    )
    .unwrap()
}

fn random_returns(rng: &mut StdRng, periods: usize, assets: usize) -> Vec<Vec<f64>> {
    (0..periods)
        .map(|_| (0..assets).map(|_| rng.gen_range(-0.03..0.035)).collect())
        .collect()
}

fn input(prices: PriceMatrix) -> AllocationInput {
    AllocationInput {
        prices,
        benchmark: "SPY".into(),
        settings: AllocationSettings::default(),
    }
}

fn assert_feasible(w: &[f64]) {
    assert!(w.iter().all(|v| (0.0..=1.0).contains(v)), "bounds violated: {:?}", w);
    let sum: f64 = w.iter().sum();
    assert!((sum - 1.0).abs() < FEASIBILITY_TOLERANCE, "sum {} != 1", sum);
}

fn random_simplex_point(rng: &mut StdRng, n: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..n).map(|_| rng.gen_range(0.05..1.0)).collect();
    let total: f64 = raw.iter().sum();
    raw.iter().map(|v| v / total).collect()
}

// ---------------------------------------------------------------------------
// Feasibility and idempotence
// ---------------------------------------------------------------------------

#[test]
fn test_weights_always_feasible() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..5 {
        let mut returns = random_returns(&mut rng, 80, 5);
        // Give each column a different drift so optima land on faces and vertices
        for (t, row) in returns.iter_mut().enumerate() {
            for (i, r) in row.iter_mut().enumerate() {
                *r += 0.0004 * i as f64 - 0.0002 * ((t % 3) as f64);
            }
        }
        let prices = prices_from_returns(&["SPY", "A", "B", "C", "D"], &returns);
        let out = optimize_portfolio(&input(prices)).unwrap();
        assert_feasible(&out.result.weights());
        assert_eq!(out.result.allocations.len(), 4);
    }
}

#[test]
fn test_statistics_are_idempotent() {
    let mut rng = StdRng::seed_from_u64(3);
    let prices = prices_from_returns(&["A", "B", "C"], &random_returns(&mut rng, 40, 3));
    let returns = ReturnMatrix::from_prices(&prices);
    let config = StatisticsConfig::default();
    let w = [0.2, 0.5, 0.3];
    let first = statistics(&w, &returns, &config).unwrap();
    let second = statistics(&w, &returns, &config).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_optimum_beats_uniform_allocation() {
    let mut rng = StdRng::seed_from_u64(21);
    let prices = prices_from_returns(&["SPY", "A", "B", "C"], &random_returns(&mut rng, 100, 4));
    let inp = input(prices);
    let out = optimize_portfolio(&inp).unwrap();

    let (assets, _) = inp.prices.split_benchmark("SPY").unwrap();
    let returns = ReturnMatrix::from_prices(&assets);
    let uniform = statistics(&uniform_weights(3), &returns, &StatisticsConfig::default()).unwrap();
    assert!(out.result.statistics.sharpe_ratio >= uniform.sharpe_ratio - 1e-12);
}

// ---------------------------------------------------------------------------
// Equal-allocation baseline and single asset
// ---------------------------------------------------------------------------

#[test]
fn test_identical_assets_keep_equal_weights() {
    let mut rng = StdRng::seed_from_u64(5);
    let base = random_returns(&mut rng, 60, 1);
    let spy = random_returns(&mut rng, 60, 1);
    let returns: Vec<Vec<f64>> = base
        .iter()
        .zip(spy.iter())
        .map(|(b, s)| vec![s[0], b[0], b[0], b[0]])
        .collect();
    let prices = prices_from_returns(&["SPY", "X", "Y", "Z"], &returns);
    let out = optimize_portfolio(&input(prices)).unwrap();
    for w in out.result.weights() {
        assert!((w - 1.0 / 3.0).abs() < 1e-6, "{:?}", out.result.weights());
    }
}

#[test]
fn test_identical_assets_every_start_is_optimal() {
    let mut rng = StdRng::seed_from_u64(8);
    let base = random_returns(&mut rng, 60, 1);
    let rows: Vec<Vec<f64>> = base.iter().map(|b| vec![b[0]; 3]).collect();
    let returns = ReturnMatrix::from_rows(vec!["X".into(), "Y".into(), "Z".into()], rows).unwrap();
    let config = StatisticsConfig::default();
    let objective = NegativeSharpe::new(&returns, &config);
    let reference = objective.evaluate(&uniform_weights(3)).unwrap();

    for _ in 0..5 {
        let x0 = random_simplex_point(&mut rng, 3);
        let result = SqpOptimizer::default().minimize(&objective, &x0).unwrap();
        assert_feasible(&result.weights);
        assert!((result.objective_value - reference).abs() < 1e-9);
    }
}

#[test]
fn test_single_asset_gets_full_weight() {
    let mut rng = StdRng::seed_from_u64(13);
    let prices = prices_from_returns(&["SPY", "ONLY"], &random_returns(&mut rng, 30, 2));
    let out = optimize_portfolio(&input(prices)).unwrap();
    assert_eq!(out.result.weights(), vec![1.0]);
    let summary = out.result.optimization.unwrap();
    assert_eq!(summary.termination, Termination::SingleAsset);
    assert!(summary.converged);
}

// ---------------------------------------------------------------------------
// Dominance and degenerate series
// ---------------------------------------------------------------------------

#[test]
fn test_dominant_asset_takes_everything() {
    let mut rng = StdRng::seed_from_u64(17);
    let returns: Vec<Vec<f64>> = random_returns(&mut rng, 60, 2)
        .into_iter()
        .map(|r| vec![r[0], r[1] + 0.001, r[1]])
        .collect();
    let prices = prices_from_returns(&["SPY", "WIN", "LOSE"], &returns);
    let inp = input(prices);
    let out = optimize_portfolio(&inp).unwrap();
    let w = out.result.weights();
    assert!((w[0] - 1.0).abs() < 1e-4, "{:?}", w);

    let (assets, _) = inp.prices.split_benchmark("SPY").unwrap();
    let alone = statistics(
        &[1.0, 0.0],
        &ReturnMatrix::from_prices(&assets),
        &StatisticsConfig::default(),
    )
    .unwrap();
    assert!(out.result.statistics.sharpe_ratio <= alone.sharpe_ratio + 1e-9);
    assert!(out.result.statistics.sharpe_ratio >= alone.sharpe_ratio - 1e-6);
}

#[test]
fn test_flat_final_allocation_raises_degenerate() {
    let mut rng = StdRng::seed_from_u64(19);
    let spy = random_returns(&mut rng, 20, 1);
    let returns: Vec<Vec<f64>> = spy.iter().map(|s| vec![s[0], 0.0, 0.0]).collect();
    let prices = prices_from_returns(&["SPY", "CASH", "BILLS"], &returns);
    let err = optimize_portfolio(&input(prices)).unwrap_err();
    assert!(err.is_degenerate(), "unexpected error: {err}");
}

#[test]
fn test_hedged_pair_with_flat_uniform_start_finds_optimum() {
    // B mirrors A, so the uniform blend has zero variance while A alone does not.
    let a = [0.01, -0.01, 0.02, -0.005, 0.015];
    let spy = [0.002, -0.001, 0.003, 0.0, 0.001];
    let returns: Vec<Vec<f64>> = a
        .iter()
        .zip(spy.iter())
        .map(|(ra, rs)| vec![*rs, *ra, -ra])
        .collect();
    let prices = prices_from_returns(&["SPY", "A", "B"], &returns);
    let inp = input(prices);

    let out = optimize_portfolio(&inp).unwrap();
    let w = out.result.weights();
    assert_feasible(&w);
    assert!(w[0] > w[1], "{:?}", w);

    let (assets, _) = inp.prices.split_benchmark("SPY").unwrap();
    let alone = statistics(
        &[1.0, 0.0],
        &ReturnMatrix::from_prices(&assets),
        &StatisticsConfig::default(),
    )
    .unwrap();
    assert!(alone.sharpe_ratio > 0.0);
    assert!(
        (out.result.statistics.sharpe_ratio - alone.sharpe_ratio).abs() < 1e-6,
        "{} vs {}",
        out.result.statistics.sharpe_ratio,
        alone.sharpe_ratio
    );
}

#[test]
fn test_converged_runs_meet_gradient_tolerance() {
    let mut rng = StdRng::seed_from_u64(29);
    let mut names = vec!["SPY".to_string()];
    names.extend((0..20).map(|i| format!("A{i}")));
    let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    let prices = prices_from_returns(&name_refs, &random_returns(&mut rng, 250, 21));
    let inp = input(prices);

    let out = optimize_portfolio(&inp).unwrap();
    assert_feasible(&out.result.weights());
    let summary = out.result.optimization.unwrap();
    if summary.converged {
        assert!(
            summary.projected_gradient_norm <= inp.settings.optimizer.gradient_tolerance,
            "converged with projected gradient {}",
            summary.projected_gradient_norm
        );
    } else {
        assert!(out.warnings.iter().any(|w| w.contains("did not converge")));
    }
}

#[test]
fn test_zero_variance_series_is_not_nan() {
    let err = series_statistics(&[0.0; 10], &StatisticsConfig::default()).unwrap_err();
    assert!(matches!(err, SharpeOptError::DegenerateSeries { .. }));
}

// ---------------------------------------------------------------------------
// Grid search cross-checks
// ---------------------------------------------------------------------------

fn grid_best_sharpe(returns: &ReturnMatrix, config: &StatisticsConfig) -> (f64, f64) {
    (0..=100)
        .filter_map(|k| {
            let w = k as f64 / 100.0;
            statistics(&[w, 1.0 - w], returns, config)
                .ok()
                .map(|s| (w, s.sharpe_ratio))
        })
        .fold((f64::NAN, f64::NEG_INFINITY), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        })
}

#[test]
fn test_end_to_end_against_grid_search() {
    // A = [0.01, -0.01, 0.02], B flat
    let returns = vec![
        vec![0.005, 0.01, 0.0],
        vec![-0.002, -0.01, 0.0],
        vec![0.004, 0.02, 0.0],
    ];
    let prices = prices_from_returns(&["SPY", "A", "B"], &returns);
    let inp = input(prices);
    let out = optimize_portfolio(&inp).unwrap();
    assert_feasible(&out.result.weights());

    let (assets, _) = inp.prices.split_benchmark("SPY").unwrap();
    let r = ReturnMatrix::from_prices(&assets);
    let (_, best) = grid_best_sharpe(&r, &StatisticsConfig::default());
    assert!(
        out.result.statistics.sharpe_ratio >= best - 1e-9,
        "sqp {} < grid {}",
        out.result.statistics.sharpe_ratio,
        best
    );
}

#[test]
fn test_interior_optimum_against_grid_search() {
    let returns: Vec<Vec<f64>> = (0..120)
        .map(|t| {
            let t = t as f64;
            vec![
                0.0003 + 0.009 * (0.9 * t).sin(),
                0.0010 + 0.012 * (1.3 * t).sin(),
                0.0006 + 0.008 * (0.7 * t + 0.4).cos(),
            ]
        })
        .collect();
    let prices = prices_from_returns(&["SPY", "A", "B"], &returns);
    let inp = input(prices);
    let out = optimize_portfolio(&inp).unwrap();

    let (assets, _) = inp.prices.split_benchmark("SPY").unwrap();
    let r = ReturnMatrix::from_prices(&assets);
    let (grid_w, best) = grid_best_sharpe(&r, &StatisticsConfig::default());
    let w = out.result.weights();
    assert!(out.result.statistics.sharpe_ratio >= best - 1e-6);
    assert!((w[0] - grid_w).abs() <= 0.02, "sqp {:?} vs grid {}", w, grid_w);
}

// ---------------------------------------------------------------------------
// Pluggable solvers
// ---------------------------------------------------------------------------

struct HoldStart;

impl ConstrainedOptimizer for HoldStart {
    fn name(&self) -> &str {
        "hold start"
    }

    fn minimize(&self, objective: &dyn Objective, x0: &[f64]) -> SharpeOptResult<OptimizationResult> {
        Ok(OptimizationResult {
            weights: x0.to_vec(),
            objective_value: objective.evaluate(x0)?,
            converged: false,
            termination: Termination::MaxIterations,
            iterations: 0,
            evaluations: 1,
            projected_gradient_norm: f64::NAN,
        })
    }
}

struct Overweight;

impl ConstrainedOptimizer for Overweight {
    fn name(&self) -> &str {
        "overweight"
    }

    fn minimize(&self, objective: &dyn Objective, _x0: &[f64]) -> SharpeOptResult<OptimizationResult> {
        Ok(OptimizationResult {
            weights: vec![1.0; objective.dimension()],
            objective_value: 0.0,
            converged: true,
            termination: Termination::Converged,
            iterations: 1,
            evaluations: 1,
            projected_gradient_norm: 0.0,
        })
    }
}

#[test]
fn test_custom_solver_non_convergence_is_a_warning() {
    let mut rng = StdRng::seed_from_u64(29);
    let prices = prices_from_returns(&["SPY", "A", "B"], &random_returns(&mut rng, 30, 3));
    let out = optimize_portfolio_with(&input(prices), &HoldStart).unwrap();
    assert_eq!(out.result.weights(), vec![0.5, 0.5]);
    assert!(out.warnings.iter().any(|w| w.contains("did not converge")));
    assert_eq!(out.result.optimization.unwrap().solver, "hold start");
}

#[test]
fn test_infeasible_solver_output_is_a_failure() {
    let mut rng = StdRng::seed_from_u64(31);
    let prices = prices_from_returns(&["SPY", "A", "B"], &random_returns(&mut rng, 30, 3));
    let err = optimize_portfolio_with(&input(prices), &Overweight).unwrap_err();
    assert!(matches!(err, SharpeOptError::OptimizationFailure(_)));
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

struct InMemory(PriceMatrix);

impl PriceSource for InMemory {
    fn load(&self, _request: &PriceRequest) -> Result<PriceMatrix, BoxError> {
        Ok(self.0.clone())
    }
}

struct Missing;

impl PriceSource for Missing {
    fn load(&self, request: &PriceRequest) -> Result<PriceMatrix, BoxError> {
        Err(format!("no file for {}", request.assets[0]).into())
    }
}

#[derive(Default)]
struct Recorder {
    received: RefCell<Vec<ComparisonSeries>>,
}

impl ComparisonSink for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn publish(&self, comparison: &ComparisonSeries) -> Result<(), BoxError> {
        self.received.borrow_mut().push(comparison.clone());
        Ok(())
    }
}

fn request(assets: &[&str]) -> PriceRequest {
    PriceRequest {
        assets: assets.iter().map(|s| s.to_string()).collect(),
        benchmark: "SPY".into(),
        start: NaiveDate::from_ymd_opt(2006, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2007, 1, 1).unwrap(),
    }
}

#[test]
fn test_run_publishes_after_success() {
    let mut rng = StdRng::seed_from_u64(37);
    let prices = prices_from_returns(&["SPY", "A", "B"], &random_returns(&mut rng, 50, 3));
    let sink = Recorder::default();
    let out = run_allocation(
        &InMemory(prices),
        &request(&["A", "B"]),
        &AllocationSettings::default(),
        &[&sink],
    )
    .unwrap();
    let received = sink.received.borrow();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], out.result.comparison);
}

#[test]
fn test_missing_data_is_fatal_and_publishes_nothing() {
    let sink = Recorder::default();
    let err = run_allocation(
        &Missing,
        &request(&["A"]),
        &AllocationSettings::default(),
        &[&sink],
    )
    .unwrap_err();
    assert!(matches!(err, SharpeOptError::DataSource(_)));
    assert!(sink.received.borrow().is_empty());
}

#[test]
fn test_degenerate_run_publishes_nothing() {
    let returns: Vec<Vec<f64>> = (0..10).map(|t| vec![0.001 * t as f64, 0.0, 0.0]).collect();
    let prices = prices_from_returns(&["SPY", "A", "B"], &returns);
    let sink = Recorder::default();
    let err = run_allocation(
        &InMemory(prices),
        &request(&["A", "B"]),
        &AllocationSettings::default(),
        &[&sink],
    )
    .unwrap_err();
    assert!(err.is_degenerate());
    assert!(sink.received.borrow().is_empty());
}

#[test]
fn test_requested_asset_missing_from_source() {
    let mut rng = StdRng::seed_from_u64(41);
    let prices = prices_from_returns(&["SPY", "A"], &random_returns(&mut rng, 10, 2));
    let err = run_allocation(
        &InMemory(prices),
        &request(&["A", "B"]),
        &AllocationSettings::default(),
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, SharpeOptError::DataSource(_)));
}
