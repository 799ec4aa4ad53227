use std::fs;
use std::path::PathBuf;

use sharpe_opt_core::allocation::{BoxError, ComparisonSeries, ComparisonSink};

/// Writes `Date,Portfolio,<benchmark>` rows of the normalized series.
pub struct CsvExporter {
    path: PathBuf,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ComparisonSink for CsvExporter {
    fn name(&self) -> &str {
        "csv export"
    }

    fn publish(&self, comparison: &ComparisonSeries) -> Result<(), BoxError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(&self.path)?;
        wtr.write_record(["Date", "Portfolio", comparison.benchmark_name.as_str()])?;
        for ((date, portfolio), benchmark) in comparison
            .dates
            .iter()
            .zip(&comparison.portfolio)
            .zip(&comparison.benchmark)
        {
            wtr.write_record([
                date.format("%Y-%m-%d").to_string(),
                portfolio.to_string(),
                benchmark.to_string(),
            ])?;
        }
        wtr.flush()?;
        tracing::debug!(path = %self.path.display(), rows = comparison.dates.len(), "wrote comparison csv");
        Ok(())
    }
}
