pub mod allocation;
pub mod analytics;
pub mod error;
pub mod market_data;
pub mod optimizer;
pub mod types;

pub use error::SharpeOptError;
pub use types::*;

/// Standard result type for all sharpe-opt operations
pub type SharpeOptResult<T> = Result<T, SharpeOptError>;
