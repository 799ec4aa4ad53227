use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharpeOptError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Degenerate return series: {context}")]
    DegenerateSeries { context: String },

    #[error("Optimization failure: {0}")]
    OptimizationFailure(String),

    #[error("Price data unavailable: {0}")]
    DataSource(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SharpeOptError {
    /// True for the zero-volatility case the optimizer recovers from locally.
    pub fn is_degenerate(&self) -> bool {
        matches!(self, SharpeOptError::DegenerateSeries { .. })
    }
}

impl From<serde_json::Error> for SharpeOptError {
    fn from(e: serde_json::Error) -> Self {
        SharpeOptError::SerializationError(e.to_string())
    }
}
