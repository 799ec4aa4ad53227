use serde::{Deserialize, Serialize};

use crate::error::SharpeOptError;
use crate::market_data::{PriceMatrix, ReturnMatrix};
use crate::types::Weight;
use crate::SharpeOptResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which divisor to use for the return standard deviation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdDevConvention {
    /// Divide by n.
    Population,
    /// Divide by n - 1.
    #[default]
    Sample,
}

impl StdDevConvention {
    /// Delta degrees of freedom.
    pub fn ddof(&self) -> usize {
        match self {
            StdDevConvention::Population => 0,
            StdDevConvention::Sample => 1,
        }
    }
}

/// Annualisation and risk-free assumptions behind the Sharpe ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Return periods per year (252 trading days for daily data).
    pub periods_per_year: f64,
    /// Annual risk-free rate, spread evenly across periods.
    pub risk_free_rate: f64,
    pub std_dev: StdDevConvention,
    /// Standard deviations at or below this are treated as zero.
    pub degenerate_tolerance: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
            std_dev: StdDevConvention::Sample,
            degenerate_tolerance: 1e-12,
        }
    }
}

impl StatisticsConfig {
    pub fn validate(&self) -> SharpeOptResult<()> {
        if !self.periods_per_year.is_finite() || self.periods_per_year <= 0.0 {
            return Err(SharpeOptError::InvalidInput {
                field: "periods_per_year".into(),
                reason: format!("Must be finite and positive, got {}", self.periods_per_year),
            });
        }
        if !self.risk_free_rate.is_finite() {
            return Err(SharpeOptError::InvalidInput {
                field: "risk_free_rate".into(),
                reason: "Must be finite".into(),
            });
        }
        if !(self.degenerate_tolerance >= 0.0) {
            return Err(SharpeOptError::InvalidInput {
                field: "degenerate_tolerance".into(),
                reason: "Must be non-negative".into(),
            });
        }
        Ok(())
    }

    fn periodic_risk_free(&self) -> f64 {
        self.risk_free_rate / self.periods_per_year
    }
}

/// Summary of a weighted portfolio's historical behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioStatistics {
    /// Compounded return over the whole window.
    pub cumulative_return: f64,
    pub mean_daily_return: f64,
    pub daily_std_dev: f64,
    /// Annualised: (mean - rf) / std * sqrt(periods_per_year).
    pub sharpe_ratio: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Statistics of the portfolio `weights` applied to `returns`.
pub fn statistics(
    weights: &[Weight],
    returns: &ReturnMatrix,
    config: &StatisticsConfig,
) -> SharpeOptResult<PortfolioStatistics> {
    let portfolio = returns.portfolio_returns(weights)?;
    series_statistics(&portfolio, config)
}

/// Same as [`statistics`], deriving returns from `prices` first.
pub fn statistics_from_prices(
    weights: &[Weight],
    prices: &PriceMatrix,
    config: &StatisticsConfig,
) -> SharpeOptResult<PortfolioStatistics> {
    statistics(weights, &ReturnMatrix::from_prices(prices), config)
}

/// Statistics of an already-aggregated return series.
pub fn series_statistics(
    returns: &[f64],
    config: &StatisticsConfig,
) -> SharpeOptResult<PortfolioStatistics> {
    let (mean, std) = mean_and_std(returns, config)?;
    let cumulative_return = returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0;
    Ok(PortfolioStatistics {
        cumulative_return,
        mean_daily_return: mean,
        daily_std_dev: std,
        sharpe_ratio: annualised_sharpe(mean, std, config),
    })
}

/// Annualised Sharpe ratio of a return series, skipping the cumulative product.
pub fn sharpe_ratio(returns: &[f64], config: &StatisticsConfig) -> SharpeOptResult<f64> {
    let (mean, std) = mean_and_std(returns, config)?;
    Ok(annualised_sharpe(mean, std, config))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn annualised_sharpe(mean: f64, std: f64, config: &StatisticsConfig) -> f64 {
    (mean - config.periodic_risk_free()) / std * config.periods_per_year.sqrt()
}

fn mean_and_std(returns: &[f64], config: &StatisticsConfig) -> SharpeOptResult<(f64, f64)> {
    let ddof = config.std_dev.ddof();
    if returns.len() <= ddof {
        return Err(SharpeOptError::DegenerateSeries {
            context: format!(
                "{} return observation(s) cannot support a {:?} standard deviation",
                returns.len(),
                config.std_dev
            ),
        });
    }
    let avg = mean(returns);
    let std = std_dev(returns, avg, ddof);
    if !(std > config.degenerate_tolerance) {
        return Err(SharpeOptError::DegenerateSeries {
            context: format!("return standard deviation is {:e}", std),
        });
    }
    Ok((avg, std))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], avg: f64, ddof: usize) -> f64 {
    let ss: f64 = values.iter().map(|v| (v - avg) * (v - avg)).sum();
    (ss / (values.len() - ddof) as f64).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
