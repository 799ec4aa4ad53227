use crate::analytics::statistics::{sharpe_ratio, StatisticsConfig};
use crate::market_data::{PriceMatrix, ReturnMatrix};
use crate::optimizer::Objective;
use crate::types::Weight;
use crate::SharpeOptResult;

/// Negative annualised Sharpe ratio of a weighted portfolio.
///
/// Minimizing this maximizes Sharpe. Zero-volatility allocations surface as
/// `DegenerateSeries` so solvers can reject them.
pub struct NegativeSharpe<'a> {
    returns: &'a ReturnMatrix,
    config: &'a StatisticsConfig,
}

impl<'a> NegativeSharpe<'a> {
    pub fn new(returns: &'a ReturnMatrix, config: &'a StatisticsConfig) -> Self {
        Self { returns, config }
    }
}

impl Objective for NegativeSharpe<'_> {
    fn dimension(&self) -> usize {
        self.returns.num_assets()
    }

    fn evaluate(&self, x: &[f64]) -> SharpeOptResult<f64> {
        let portfolio = self.returns.portfolio_returns(x)?;
        Ok(-sharpe_ratio(&portfolio, self.config)?)
    }
}

/// `-sharpe_ratio` of `weights` over `prices`.
pub fn objective(
    weights: &[Weight],
    prices: &PriceMatrix,
    config: &StatisticsConfig,
) -> SharpeOptResult<f64> {
    let returns = ReturnMatrix::from_prices(prices);
    NegativeSharpe::new(&returns, config).evaluate(weights)
}
