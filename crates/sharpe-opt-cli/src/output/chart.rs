use plotly::common::{Line, Mode, Title};
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};
use std::fs;
use std::path::PathBuf;

use sharpe_opt_core::allocation::{BoxError, ComparisonSeries, ComparisonSink};

/// Renders portfolio and benchmark growth as an interactive HTML line chart.
pub struct HtmlChartRenderer {
    path: PathBuf,
}

impl HtmlChartRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn plot(comparison: &ComparisonSeries) -> Plot {
        let dates: Vec<String> = comparison
            .dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();

        let portfolio = Scatter::new(dates.clone(), comparison.portfolio.clone())
            .name("Portfolio")
            .mode(Mode::Lines)
            .line(Line::new().color("#1f77b4"));
        let benchmark = Scatter::new(dates, comparison.benchmark.clone())
            .name(comparison.benchmark_name.as_str())
            .mode(Mode::Lines)
            .line(Line::new().color("#ff7f0e"));

        let layout = Layout::new()
            .title(Title::from(
                format!("Investment Portfolio vs {}", comparison.benchmark_name).as_str(),
            ))
            .x_axis(Axis::new().title(Title::from("Date")))
            .y_axis(Axis::new().title(Title::from("Relative Price")));

        let mut plot = Plot::new();
        plot.add_trace(portfolio);
        plot.add_trace(benchmark);
        plot.set_layout(layout);
        plot
    }
}

impl ComparisonSink for HtmlChartRenderer {
    fn name(&self) -> &str {
        "html chart"
    }

    fn publish(&self, comparison: &ComparisonSeries) -> Result<(), BoxError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let html = Self::plot(comparison).to_html();
        fs::write(&self.path, html)
            .map_err(|e| format!("Failed to write '{}': {}", self.path.display(), e))?;
        tracing::debug!(path = %self.path.display(), "wrote comparison chart");
        Ok(())
    }
}
