pub mod candle;
pub mod timeframe;

pub use candle::{Candle, CandleWindow};
pub use timeframe::Timeframe;
