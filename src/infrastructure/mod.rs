pub mod binance;
pub mod core;
pub mod dashboard;
pub mod persistence;
pub mod telegram;
