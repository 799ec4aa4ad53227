//! Interfaces to the world outside the optimizer: where prices come from and
//! where comparison series go. Implementations live with the caller.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::allocation::portfolio::ComparisonSeries;
use crate::error::SharpeOptError;
use crate::market_data::PriceMatrix;
use crate::types::AssetId;
use crate::SharpeOptResult;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What to load: assets plus benchmark over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub assets: Vec<AssetId>,
    pub benchmark: AssetId,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PriceRequest {
    pub fn validate(&self) -> SharpeOptResult<()> {
        if self.start > self.end {
            return Err(SharpeOptError::DateError(format!(
                "start date {} is after end date {}",
                self.start, self.end
            )));
        }
        if self.assets.is_empty() {
            return Err(SharpeOptError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for asset in self.assets.iter().chain(std::iter::once(&self.benchmark)) {
            if !seen.insert(asset.as_str()) {
                return Err(SharpeOptError::InvalidInput {
                    field: "assets".into(),
                    reason: format!("'{}' listed more than once (benchmark included)", asset),
                });
            }
        }
        Ok(())
    }

    /// Benchmark first, then assets in request order.
    pub fn columns(&self) -> Vec<AssetId> {
        std::iter::once(self.benchmark.clone())
            .chain(self.assets.iter().cloned())
            .collect()
    }
}

/// Supplies historical prices.
///
/// Returned rows must be dates where the benchmark has a price; how other
/// assets' gaps are filled is up to the implementation.
pub trait PriceSource {
    fn load(&self, request: &PriceRequest) -> Result<PriceMatrix, BoxError>;
}

/// Consumes the normalized portfolio and benchmark series (chart, file, ...).
pub trait ComparisonSink {
    fn name(&self) -> &str;
    fn publish(&self, comparison: &ComparisonSeries) -> Result<(), BoxError>;
}

/// Load prices and translate any source failure into `DataSource`.
///
/// The result is restricted to the requested columns, benchmark first.
pub fn load_prices(source: &dyn PriceSource, request: &PriceRequest) -> SharpeOptResult<PriceMatrix> {
    request.validate()?;
    let prices = source
        .load(request)
        .map_err(|e| SharpeOptError::DataSource(e.to_string()))?;
    prices
        .select(&request.columns())
        .map_err(|e| SharpeOptError::DataSource(e.to_string()))
}

/// Hand the comparison to every sink, stopping at the first failure.
pub fn publish(comparison: &ComparisonSeries, sinks: &[&dyn ComparisonSink]) -> SharpeOptResult<()> {
    for sink in sinks {
        sink.publish(comparison)
            .map_err(|e| SharpeOptError::Export(format!("{}: {}", sink.name(), e)))?;
        tracing::info!(sink = sink.name(), "published comparison series");
    }
    Ok(())
}
