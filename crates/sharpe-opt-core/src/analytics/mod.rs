//! Portfolio statistics and the Sharpe objective built on them.

pub mod objective;
pub mod statistics;

pub use objective::NegativeSharpe;
pub use statistics::{PortfolioStatistics, StatisticsConfig, StdDevConvention};
