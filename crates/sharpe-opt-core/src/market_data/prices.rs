use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

use crate::error::SharpeOptError;
use crate::types::AssetId;
use crate::SharpeOptResult;

/// Dated price rows for a fixed, ordered set of assets.
///
/// Invariants enforced on construction:
/// - at least two rows (one return),
/// - dates strictly increasing,
/// - every row has one finite, positive price per asset.
///
/// Gaps must be filled or dropped by the data source before a matrix is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceMatrix {
    dates: Vec<NaiveDate>,
    assets: Vec<AssetId>,
    rows: Vec<Vec<f64>>,
}

impl PriceMatrix {
    pub fn new(
        dates: Vec<NaiveDate>,
        assets: Vec<AssetId>,
        rows: Vec<Vec<f64>>,
    ) -> SharpeOptResult<Self> {
        if assets.is_empty() {
            return Err(SharpeOptError::InsufficientData(
                "At least one asset column required".into(),
            ));
        }
        if rows.len() < 2 {
            return Err(SharpeOptError::InsufficientData(format!(
                "At least 2 price rows required to compute a return, got {}",
                rows.len()
            )));
        }
        if dates.len() != rows.len() {
            return Err(SharpeOptError::InvalidInput {
                field: "dates".into(),
                reason: format!("Expected {} dates but got {}", rows.len(), dates.len()),
            });
        }

        let mut seen = HashSet::with_capacity(assets.len());
        for asset in &assets {
            if !seen.insert(asset.as_str()) {
                return Err(SharpeOptError::InvalidInput {
                    field: "assets".into(),
                    reason: format!("Duplicate asset column '{}'", asset),
                });
            }
        }

        for (t, pair) in dates.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(SharpeOptError::InvalidInput {
                    field: "dates".into(),
                    reason: format!(
                        "Dates must be strictly increasing: row {} ({}) follows {}",
                        t + 1,
                        pair[1],
                        pair[0]
                    ),
                });
            }
        }

        for (t, row) in rows.iter().enumerate() {
            if row.len() != assets.len() {
                return Err(SharpeOptError::InvalidInput {
                    field: format!("rows[{}]", t),
                    reason: format!("Row has {} prices, expected {}", row.len(), assets.len()),
                });
            }
            for (i, price) in row.iter().enumerate() {
                if !price.is_finite() || *price <= 0.0 {
                    return Err(SharpeOptError::InvalidInput {
                        field: format!("rows[{}].{}", t, assets[i]),
                        reason: format!("Price must be finite and positive, got {}", price),
                    });
                }
            }
        }

        Ok(Self {
            dates,
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

    /// Number of dated rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn column_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Price series for a single asset.
    pub fn column(&self, asset: &str) -> SharpeOptResult<Vec<f64>> {
        let idx = self.require_column(asset)?;
        Ok(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// New matrix restricted to `assets`, in the order given.
    pub fn select(&self, assets: &[AssetId]) -> SharpeOptResult<PriceMatrix> {
        let indices = assets
            .iter()
            .map(|a| self.require_column(a))
            .collect::<SharpeOptResult<Vec<usize>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect();
        PriceMatrix::new(self.dates.clone(), assets.to_vec(), rows)
    }

    /// Separate the benchmark column from the optimizable assets.
    ///
    /// Asset order of the returned matrix follows the original column order.
    pub fn split_benchmark(&self, benchmark: &str) -> SharpeOptResult<(PriceMatrix, Vec<f64>)> {
        let benchmark_series = self.column(benchmark).map_err(|_| SharpeOptError::InvalidInput {
            field: "benchmark".into(),
            reason: format!("Benchmark column '{}' not present in price data", benchmark),
        })?;
        let assets: Vec<AssetId> = self
            .assets
            .iter()
            .filter(|a| a.as_str() != benchmark)
            .cloned()
            .collect();
        if assets.is_empty() {
            return Err(SharpeOptError::InsufficientData(
                "Price data holds only the benchmark; no assets to allocate".into(),
            ));
        }
        Ok((self.select(&assets)?, benchmark_series))
    }

    /// Each column divided by its first value, row-major like `rows()`.
    pub fn normalized(&self) -> Vec<Vec<f64>> {
        let first = &self.rows[0];
        self.rows
            .iter()
            .map(|row| row.iter().zip(first.iter()).map(|(p, p0)| p / p0).collect())
            .collect()
    }

    fn require_column(&self, asset: &str) -> SharpeOptResult<usize> {
        self.column_index(asset)
            .ok_or_else(|| SharpeOptError::InvalidInput {
                field: "assets".into(),
                reason: format!("Unknown asset column '{}'", asset),
            })
    }
}

/// Divide a series by its first value so it starts at 1.0.
pub fn normalize_series(series: &[f64]) -> Vec<f64> {
    match series.first() {
        Some(&first) if first != 0.0 => series.iter().map(|p| p / first).collect(),
        _ => series.to_vec(),
    }
}
