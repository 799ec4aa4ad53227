use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sharpe_opt_core::allocation::{BoxError, PriceRequest, PriceSource};
use sharpe_opt_core::market_data::PriceMatrix;

const DATE_COLUMN: &str = "Date";

/// Reads one `<SYMBOL>.csv` per asset from a directory.
///
/// The benchmark's trading days inside the requested range form the date
/// index. Other assets are aligned to it, forward-filled, then back-filled
/// for any gap at the start of the range.
pub struct CsvPriceSource {
    dir: PathBuf,
    column: String,
}

impl CsvPriceSource {
    pub fn new(dir: impl Into<PathBuf>, column: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            column: column.into(),
        }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol))
    }

    fn read_series(&self, symbol: &str) -> Result<BTreeMap<NaiveDate, Option<f64>>, BoxError> {
        let path = self.path_for(symbol);
        read_price_file(&path, &self.column)
    }
}

impl PriceSource for CsvPriceSource {
    fn load(&self, request: &PriceRequest) -> Result<PriceMatrix, BoxError> {
        let in_range = |date: &NaiveDate| *date >= request.start && *date <= request.end;

        let benchmark = self.read_series(&request.benchmark)?;
        let (dates, benchmark_prices): (Vec<NaiveDate>, Vec<f64>) = benchmark
            .iter()
            .filter(|(date, _)| in_range(*date))
            .filter_map(|(date, price)| price.map(|p| (*date, p)))
            .unzip();
        if dates.is_empty() {
            return Err(format!(
                "no {} prices for {} between {} and {}",
                self.column, request.benchmark, request.start, request.end
            )
            .into());
        }

        let mut columns = vec![benchmark_prices];
        for asset in &request.assets {
            let series = self.read_series(asset)?;
            let aligned: Vec<Option<f64>> = dates
                .iter()
                .map(|d| series.get(d).copied().flatten())
                .collect();
            let filled = fill_gaps(&aligned).ok_or_else(|| {
                format!(
                    "no {} prices for {} between {} and {}",
                    self.column, asset, request.start, request.end
                )
            })?;
            columns.push(filled);
        }

        tracing::debug!(
            rows = dates.len(),
            assets = request.assets.len(),
            dir = %self.dir.display(),
            "loaded price history"
        );

        let rows: Vec<Vec<f64>> = (0..dates.len())
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect();
        Ok(PriceMatrix::new(dates, request.columns(), rows)?)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_price_file(path: &Path, column: &str) -> Result<BTreeMap<NaiveDate, Option<f64>>, BoxError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| format!("Failed to open '{}': {}", path.display(), e))?;
    let headers = reader.headers()?.clone();
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| format!("'{}' has no '{}' column", path.display(), name))
    };
    let date_idx = find(DATE_COLUMN)?;
    let price_idx = find(column)?;

    let mut series = BTreeMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let raw_date = record.get(date_idx).unwrap_or("").trim();
        let date = parse_date(raw_date).ok_or_else(|| {
            format!("'{}' row {}: bad date '{}'", path.display(), line + 2, raw_date)
        })?;
        let raw_price = record.get(price_idx).unwrap_or("");
        let price = parse_price(raw_price).map_err(|_| {
            format!("'{}' row {}: bad price '{}'", path.display(), line + 2, raw_price)
        })?;
        series.insert(date, price);
    }
    Ok(series)
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

/// Empty, `nan` and `null` cells are missing values.
fn parse_price(raw: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let cell = raw.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    let value: f64 = cell.parse()?;
    Ok(value.is_finite().then_some(value))
}

/// Forward-fill, then back-fill leading gaps. `None` when nothing is present.
fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().flatten().next().copied()?;
    let mut last = first;
    Some(
        values
            .iter()
            .map(|v| {
                if let Some(price) = v {
                    last = *price;
                }
                last
            })
            .collect(),
    )
}
