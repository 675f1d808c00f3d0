pub mod broadcaster;
pub mod chart_link;

pub use broadcaster::DashboardBroadcaster;
pub use chart_link::TradingViewChartLink;
