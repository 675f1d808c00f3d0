use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::market::Timeframe;
use crate::domain::pattern::{Direction, PatternGroup};

/// A confirmed CHoCH signal. Immutable once produced by the scan
/// orchestrator; published on the signal bus for notifier/dashboard/order
/// manager subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: SignalDirection,
    pub pattern_group: PatternGroup,
    pub choch_price: Decimal,
    pub entry1_price: Decimal,
    pub entry2_price: Decimal,
    pub tp_price: Decimal,
    pub sl_price: Decimal,
    pub pivot5: Decimal,
    pub pivot6: Decimal,
    pub pivot8: Decimal,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Trade direction a signal drives; distinct from [`Direction`] (the
/// recognised pattern's orientation) because a signal's direction is the
/// CHoCH confirmation's direction, the reverse of the pattern's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Long,
    Short,
}

impl From<Direction> for SignalDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Up => Self::Long,
            Direction::Down => Self::Short,
        }
    }
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "Long"),
            Self::Short => write!(f, "Short"),
        }
    }
}

/// Which of the four orders in a position's order set a [`ManagedOrder`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderPurpose {
    Entry1,
    Entry2,
    Tp,
    Sl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Cancelled,
    Failed,
}

/// A single order placed as part of a position's four-order set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedOrder {
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub purpose: OrderPurpose,
    pub side: SignalDirection,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: OrderStatus,
}

/// Lifecycle of a position opened from a signal: `Pending` until an entry
/// fills, then `Entry1Filled`/`Entry2Filled`, `BothFilled` once both have,
/// `Closed` on TP/SL/forced-close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Pending,
    Entry1Filled,
    Entry2Filled,
    BothFilled,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    Forced,
}

/// A live (symbol, timeframe) position derived from a [`Signal`]: two limit
/// entries, a take-profit, and a stop-loss, each with close-position
/// semantics on the TP/SL legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: SignalDirection,
    pub pattern_group: PatternGroup,
    pub signal_timestamp: DateTime<Utc>,
    pub pivot5: Decimal,
    pub pivot6: Decimal,
    pub pivot8: Decimal,
    pub tp_price: Decimal,
    pub sl_price: Decimal,
    pub entry1: ManagedOrder,
    pub entry2: ManagedOrder,
    pub tp: ManagedOrder,
    pub sl: ManagedOrder,
    pub status: PositionStatus,
    pub total_quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub is_closed: bool,
    pub closed_reason: Option<CloseReason>,
    pub realized_pnl: Option<Decimal>,
}

impl Position {
    /// Volume-weighted average entry price across whichever entries have
    /// filled so far.
    pub fn recompute_avg_entry(&mut self) {
        let filled: Vec<&ManagedOrder> =
            [&self.entry1, &self.entry2].into_iter().filter(|o| o.status == OrderStatus::Filled).collect();
        if filled.is_empty() {
            return;
        }
        let total_qty: Decimal = filled.iter().map(|o| o.quantity).sum();
        if total_qty.is_zero() {
            return;
        }
        let weighted: Decimal = filled.iter().map(|o| o.price * o.quantity).sum();
        self.total_quantity = total_qty;
        self.avg_entry_price = weighted / total_qty;
    }
}

/// Persisted alert record. `id` is assigned by the store on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Option<i64>,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub signal_type: String,
    pub direction: SignalDirection,
    pub pattern_group: PatternGroup,
    pub price: Decimal,
    pub signal_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub chart_link: String,
    pub is_futures: bool,
    pub region: Option<String>,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
}

impl Alert {
    pub fn from_signal(signal: &Signal, chart_link: String, region: Option<String>) -> Self {
        Self {
            id: None,
            symbol: signal.symbol.clone(),
            timeframe: signal.timeframe,
            signal_type: format!("CHoCH {}", signal.direction),
            direction: signal.direction,
            pattern_group: signal.pattern_group,
            price: signal.choch_price,
            signal_timestamp: signal.timestamp,
            created_at: Utc::now(),
            chart_link,
            is_futures: true,
            region,
            confidence: None,
            notes: None,
        }
    }
}

/// Archive-stream counterpart of [`Alert`], produced by periodic
/// cleanup of old alert rows rather than deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertArchive {
    pub alert: Alert,
    pub archived_at: DateTime<Utc>,
    pub archive_reason: String,
}
