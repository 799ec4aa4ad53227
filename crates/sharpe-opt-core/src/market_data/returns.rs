use chrono::NaiveDate;
use serde::Serialize;

use crate::error::SharpeOptError;
use crate::market_data::PriceMatrix;
use crate::types::{AssetId, Weight};
use crate::SharpeOptResult;

/// Periodic fractional returns, one row fewer than the prices they came from.
///
/// Cell `[t][i]` is `price[t+1][i] / price[t][i] - 1`, dated at the later row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnMatrix {
    dates: Vec<NaiveDate>,
    assets: Vec<AssetId>,
    rows: Vec<Vec<f64>>,
}

impl ReturnMatrix {
    pub fn from_prices(prices: &PriceMatrix) -> Self {
        let rows = prices
            .rows()
            .windows(2)
            .map(|pair| {
                pair[1]
                    .iter()
                    .zip(pair[0].iter())
                    .map(|(cur, prev)| cur / prev - 1.0)
                    .collect()
            })
            .collect();
        Self {
            dates: prices.dates()[1..].to_vec(),
            assets: prices.assets().to_vec(),
            rows,
        }
    }

    /// Build directly from return observations (no dates attached).
    pub fn from_rows(assets: Vec<AssetId>, rows: Vec<Vec<f64>>) -> SharpeOptResult<Self> {
        if assets.is_empty() || rows.is_empty() {
            return Err(SharpeOptError::InsufficientData(
                "At least one asset and one return observation required".into(),
            ));
        }
        for (t, row) in rows.iter().enumerate() {
            if row.len() != assets.len() {
                return Err(SharpeOptError::InvalidInput {
                    field: format!("returns[{}]", t),
                    reason: format!("Row has {} returns, expected {}", row.len(), assets.len()),
                });
            }
            if let Some(bad) = row.iter().find(|r| !r.is_finite() || **r <= -1.0) {
                return Err(SharpeOptError::InvalidInput {
                    field: format!("returns[{}]", t),
                    reason: format!("Return must be finite and above -100%, got {}", bad),
                });
            }
        }
        Ok(Self {
            dates: Vec::new(),
            assets,
            rows,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn num_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn num_periods(&self) -> usize {
        self.rows.len()
    }

    /// Per-period dot product of `weights` with each row.
    pub fn portfolio_returns(&self, weights: &[Weight]) -> SharpeOptResult<Vec<f64>> {
        if weights.len() != self.assets.len() {
            return Err(SharpeOptError::InvalidInput {
                field: "weights".into(),
                reason: format!(
                    "Expected {} weights but got {}",
                    self.assets.len(),
                    weights.len()
                ),
            });
        }
        Ok(self
            .rows
            .iter()
            .map(|row| row.iter().zip(weights.iter()).map(|(r, w)| r * w).sum())
            .collect())
    }
}
