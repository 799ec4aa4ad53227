pub mod file;
pub mod market_data;
