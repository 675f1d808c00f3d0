use crate::application::ports::ChartLinkProvider;
use crate::domain::market::Timeframe;

/// Builds a TradingView chart URL for the notifier's message. Chart
/// rendering itself is a Non-goal; this only produces the link.
pub struct TradingViewChartLink {
    exchange_prefix: String,
}

impl TradingViewChartLink {
    pub fn new(exchange_prefix: impl Into<String>) -> Self {
        Self { exchange_prefix: exchange_prefix.into() }
    }
}

impl Default for TradingViewChartLink {
    fn default() -> Self {
        Self::new("BINANCE")
    }
}

impl ChartLinkProvider for TradingViewChartLink {
    fn link(&self, symbol: &str, timeframe: Timeframe) -> String {
        format!(
            "https://www.tradingview.com/chart/?symbol={}%3A{}.P&interval={}",
            self.exchange_prefix,
            symbol,
            timeframe.minutes(),
        )
    }
}
