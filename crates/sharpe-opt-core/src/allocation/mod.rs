//! Orchestration: price data in, optimal weights and comparison series out.

pub mod collaborators;
pub mod portfolio;

pub use collaborators::{load_prices, publish, BoxError, ComparisonSink, PriceRequest, PriceSource};
pub use portfolio::{
    evaluate_allocation, optimize_portfolio, optimize_portfolio_with, run_allocation,
    AllocationInput, AllocationOutput, AllocationSettings, AssetAllocation, ComparisonSeries,
    OptimizationSummary,
};
