//! Historical price data and the periodic returns derived from it.

pub mod prices;
pub mod returns;

pub use prices::PriceMatrix;
pub use returns::ReturnMatrix;
