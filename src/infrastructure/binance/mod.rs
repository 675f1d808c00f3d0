pub mod market_data;
pub mod orders;
pub mod signing;

pub use market_data::{BinanceFuturesClient, BinanceFuturesClientBuilder};
