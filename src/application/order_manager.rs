use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::ports::OrderExecutionPort;
use crate::application::signal_bus::SignalSubscriber;
use crate::domain::market::Timeframe;
use crate::domain::signal::{
    CloseReason, ManagedOrder, OrderPurpose, OrderStatus, Position, PositionStatus, Signal, SignalDirection,
};

/// USDT notional allocated per position, split evenly across the two entry
/// legs (quantity per entry = (position_size * leverage / 2) / entry_price).
#[derive(Debug, Clone, Copy)]
pub struct OrderSizing {
    pub position_size_usdt: Decimal,
    pub leverage: Decimal,
}

/// Derives and tracks the four-order set (Entry1/Entry2/TP/SL) for each
/// confirmed Signal, and the resulting position lifecycle, modeled on the
/// original bot's `_handle_choch_signal`/`Position` state machine: one open
/// position per (symbol, timeframe), superseded by cancel-and-force-close
/// when a new signal for the same pair arrives before it closes.
pub struct OrderManagerSubscriber<E> {
    exchange: E,
    sizing: OrderSizing,
    positions: Mutex<HashMap<(String, Timeframe), Position>>,
}

impl<E: OrderExecutionPort> OrderManagerSubscriber<E> {
    pub fn new(exchange: E, sizing: OrderSizing) -> Self {
        Self { exchange, sizing, positions: Mutex::new(HashMap::new()) }
    }

    fn quantity_per_entry(&self, entry1: Decimal, entry2: Decimal) -> Decimal {
        let worst_case = entry1.min(entry2);
        let entry_size = self.sizing.position_size_usdt * self.sizing.leverage / Decimal::TWO;
        entry_size / worst_case
    }

    fn new_client_order_id() -> String {
        Uuid::new_v4().to_string()
    }

    async fn cancel_and_force_close(&self, key: &(String, Timeframe), position: &mut Position) -> anyhow::Result<()> {
        for order in [&mut position.entry1, &mut position.entry2, &mut position.tp, &mut position.sl] {
            if order.status == OrderStatus::Open || order.status == OrderStatus::Pending {
                if let Some(exchange_id) = &order.exchange_order_id {
                    if let Err(err) = self.exchange.cancel_order(&key.0, exchange_id).await {
                        warn!(%err, symbol = %key.0, "failed to cancel sibling order during supersede");
                    }
                }
                order.status = OrderStatus::Cancelled;
            }
        }

        if position.total_quantity > Decimal::ZERO {
            if let Err(err) = self.exchange.place_market_close(&key.0, position.total_quantity).await {
                warn!(%err, symbol = %key.0, "forced market close failed");
            }
        }

        position.is_closed = true;
        position.status = PositionStatus::Closed;
        position.closed_reason = Some(CloseReason::Forced);
        Ok(())
    }

    fn build_orders(
        &self,
        signal: &Signal,
        entry1_price: Decimal,
        entry2_price: Decimal,
        tp_price: Decimal,
        sl_price: Decimal,
    ) -> (ManagedOrder, ManagedOrder, ManagedOrder, ManagedOrder) {
        let quantity = self.quantity_per_entry(entry1_price, entry2_price);
        let order = |purpose: OrderPurpose, price: Decimal| ManagedOrder {
            client_order_id: Self::new_client_order_id(),
            exchange_order_id: None,
            symbol: signal.symbol.clone(),
            purpose,
            side: signal.direction,
            price,
            quantity,
            status: OrderStatus::Pending,
        };
        (
            order(OrderPurpose::Entry1, entry1_price),
            order(OrderPurpose::Entry2, entry2_price),
            order(OrderPurpose::Tp, tp_price),
            order(OrderPurpose::Sl, sl_price),
        )
    }

    async fn place(&self, order: &mut ManagedOrder, is_take_profit: Option<bool>) {
        let result = match is_take_profit {
            None => self.exchange.place_limit_order(&order.symbol, order.side, order.price, order.quantity).await,
            Some(tp) => self.exchange.place_tp_sl(&order.symbol, order.side, order.price, tp).await,
        };
        match result {
            Ok(exchange_order_id) => {
                order.exchange_order_id = Some(exchange_order_id);
                order.status = OrderStatus::Open;
            }
            Err(err) => {
                warn!(%err, symbol = %order.symbol, purpose = ?order.purpose, "order placement rejected");
                order.status = OrderStatus::Failed;
            }
        }
    }

    /// Re-queries the exchange for an `Open` order's current status. Returns
    /// `true` the moment it is observed to have transitioned to `Filled`.
    async fn refresh_order(&self, symbol: &str, order: &mut ManagedOrder) -> bool {
        if order.status != OrderStatus::Open {
            return false;
        }
        let Some(exchange_order_id) = order.exchange_order_id.clone() else {
            return false;
        };
        match self.exchange.order_status(symbol, &exchange_order_id).await {
            Ok(status) => {
                let newly_filled = status == OrderStatus::Filled && order.status != OrderStatus::Filled;
                order.status = status;
                newly_filled
            }
            Err(err) => {
                warn!(%err, %symbol, purpose = ?order.purpose, "failed to query order status");
                false
            }
        }
    }

    /// Advances every open position's lifecycle by polling the exchange for
    /// fills: `PENDING` -> `ENTRY1_FILLED`/`ENTRY2_FILLED` -> `BOTH_FILLED` as
    /// entries fill, and on a terminal TP/SL fill, cancels the remaining
    /// sibling orders, closes the position, and records realized P&L against
    /// the volume-weighted average entry price.
    pub async fn poll_fills(&self) -> anyhow::Result<()> {
        let mut positions = self.positions.lock().await;
        for (key, position) in positions.iter_mut() {
            if position.is_closed {
                continue;
            }

            let entry1_filled = self.refresh_order(&key.0, &mut position.entry1).await;
            let entry2_filled = self.refresh_order(&key.0, &mut position.entry2).await;
            if entry1_filled || entry2_filled {
                position.recompute_avg_entry();
            }
            position.status = match (position.entry1.status, position.entry2.status) {
                (OrderStatus::Filled, OrderStatus::Filled) => PositionStatus::BothFilled,
                (OrderStatus::Filled, _) => PositionStatus::Entry1Filled,
                (_, OrderStatus::Filled) => PositionStatus::Entry2Filled,
                _ => position.status,
            };

            let tp_filled = self.refresh_order(&key.0, &mut position.tp).await;
            let sl_filled = self.refresh_order(&key.0, &mut position.sl).await;
            if !tp_filled && !sl_filled {
                continue;
            }

            let (reason, close_price) =
                if tp_filled { (CloseReason::TakeProfit, position.tp.price) } else { (CloseReason::StopLoss, position.sl.price) };
            position.realized_pnl = Some(match position.direction {
                SignalDirection::Long => (close_price - position.avg_entry_price) * position.total_quantity,
                SignalDirection::Short => (position.avg_entry_price - close_price) * position.total_quantity,
            });

            for order in [&mut position.entry1, &mut position.entry2, &mut position.tp, &mut position.sl] {
                if order.status == OrderStatus::Open || order.status == OrderStatus::Pending {
                    if let Some(exchange_id) = order.exchange_order_id.clone() {
                        if let Err(err) = self.exchange.cancel_order(&key.0, &exchange_id).await {
                            warn!(%err, symbol = %key.0, "failed to cancel sibling order on terminal fill");
                        }
                    }
                    order.status = OrderStatus::Cancelled;
                }
            }

            position.is_closed = true;
            position.status = PositionStatus::Closed;
            position.closed_reason = Some(reason);
            info!(symbol = %key.0, timeframe = %key.1, ?reason, pnl = %position.realized_pnl.unwrap(), "position closed");
        }
        Ok(())
    }
}

#[async_trait]
impl<E: OrderExecutionPort + Send + Sync> SignalSubscriber for OrderManagerSubscriber<E> {
    fn name(&self) -> &str {
        "order_manager"
    }

    async fn on_signal(&self, signal: &Signal) -> anyhow::Result<()> {
        let key = (signal.symbol.clone(), signal.timeframe);

        let mark_price = self.exchange.mark_price(&signal.symbol).await?;
        let already_past_tp = match signal.direction {
            SignalDirection::Long => mark_price >= signal.tp_price,
            SignalDirection::Short => mark_price <= signal.tp_price,
        };
        if already_past_tp {
            info!(symbol = %signal.symbol, "mark price already past take-profit, skipping signal");
            return Ok(());
        }

        let mut positions = self.positions.lock().await;
        if let Some(existing) = positions.get_mut(&key) {
            if !existing.is_closed {
                info!(symbol = %signal.symbol, timeframe = %signal.timeframe, "superseding open position with new signal");
                self.cancel_and_force_close(&key, existing).await?;
            }
        }

        let (mut entry1, mut entry2, mut tp, mut sl) =
            self.build_orders(signal, signal.entry1_price, signal.entry2_price, signal.tp_price, signal.sl_price);

        self.place(&mut entry1, None).await;
        self.place(&mut entry2, None).await;
        self.place(&mut tp, Some(true)).await;
        self.place(&mut sl, Some(false)).await;

        let position = Position {
            symbol: signal.symbol.clone(),
            timeframe: signal.timeframe,
            direction: signal.direction,
            pattern_group: signal.pattern_group,
            signal_timestamp: signal.timestamp,
            pivot5: signal.pivot5,
            pivot6: signal.pivot6,
            pivot8: signal.pivot8,
            tp_price: signal.tp_price,
            sl_price: signal.sl_price,
            entry1,
            entry2,
            tp,
            sl,
            status: PositionStatus::Pending,
            total_quantity: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            is_closed: false,
            closed_reason: None,
            realized_pnl: None,
        };
        positions.insert(key, position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Timeframe;
    use crate::domain::pattern::PatternGroup;
    use anyhow::Result;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockExchange {
        mark_price: Decimal,
        cancel_calls: AtomicUsize,
        close_calls: AtomicUsize,
    }

    #[async_trait]
    impl OrderExecutionPort for MockExchange {
        async fn place_limit_order(&self, _symbol: &str, _side: SignalDirection, _price: Decimal, _quantity: Decimal) -> Result<String> {
            Ok(Uuid::new_v4().to_string())
        }
        async fn place_market_close(&self, _symbol: &str, _quantity: Decimal) -> Result<String> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Uuid::new_v4().to_string())
        }
        async fn place_tp_sl(&self, _symbol: &str, _side: SignalDirection, _trigger_price: Decimal, _is_take_profit: bool) -> Result<String> {
            Ok(Uuid::new_v4().to_string())
        }
        async fn cancel_order(&self, _symbol: &str, _exchange_order_id: &str) -> Result<()> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn mark_price(&self, _symbol: &str) -> Result<Decimal> {
            Ok(self.mark_price)
        }
        async fn order_status(&self, _symbol: &str, _exchange_order_id: &str) -> Result<OrderStatus> {
            Ok(OrderStatus::Open)
        }
    }

    fn signal(direction: SignalDirection, tp: Decimal) -> Signal {
        Signal {
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::parse("15m").unwrap(),
            direction,
            pattern_group: PatternGroup::G1,
            choch_price: dec!(100),
            entry1_price: dec!(99),
            entry2_price: dec!(98),
            tp_price: tp,
            sl_price: dec!(95),
            pivot5: tp,
            pivot6: dec!(101),
            pivot8: dec!(99),
            timestamp: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn opens_a_four_order_position_for_a_fresh_signal() {
        let exchange = MockExchange { mark_price: dec!(98.5), cancel_calls: AtomicUsize::new(0), close_calls: AtomicUsize::new(0) };
        let manager = OrderManagerSubscriber::new(exchange, OrderSizing { position_size_usdt: dec!(1000), leverage: dec!(1) });
        manager.on_signal(&signal(SignalDirection::Long, dec!(110))).await.unwrap();
        let positions = manager.positions.lock().await;
        let key = ("BTCUSDT".to_string(), Timeframe::parse("15m").unwrap());
        let position = positions.get(&key).expect("position should be tracked");
        assert_eq!(position.status, PositionStatus::Pending);
        assert_eq!(position.entry1.status, OrderStatus::Open);
        assert_eq!(position.tp.status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn signal_already_past_take_profit_is_skipped() {
        let exchange = MockExchange { mark_price: dec!(111), cancel_calls: AtomicUsize::new(0), close_calls: AtomicUsize::new(0) };
        let manager = OrderManagerSubscriber::new(exchange, OrderSizing { position_size_usdt: dec!(1000), leverage: dec!(1) });
        manager.on_signal(&signal(SignalDirection::Long, dec!(110))).await.unwrap();
        let positions = manager.positions.lock().await;
        assert!(positions.is_empty());
    }

    /// Overlapping signals: a new signal for the same (symbol, timeframe)
    /// cancels and force-closes the existing open position before opening
    /// its own order set.
    #[tokio::test]
    async fn overlapping_signal_supersedes_existing_position() {
        let exchange = MockExchange { mark_price: dec!(50), cancel_calls: AtomicUsize::new(0), close_calls: AtomicUsize::new(0) };
        let manager = OrderManagerSubscriber::new(exchange, OrderSizing { position_size_usdt: dec!(1000), leverage: dec!(1) });

        manager.on_signal(&signal(SignalDirection::Long, dec!(110))).await.unwrap();
        {
            let mut positions = manager.positions.lock().await;
            let key = ("BTCUSDT".to_string(), Timeframe::parse("15m").unwrap());
            let position = positions.get_mut(&key).unwrap();
            position.entry1.status = OrderStatus::Filled;
            position.total_quantity = position.entry1.quantity;
        }

        manager.on_signal(&signal(SignalDirection::Short, dec!(40))).await.unwrap();

        assert!(manager.exchange.close_calls.load(Ordering::SeqCst) >= 1);
        assert!(manager.exchange.cancel_calls.load(Ordering::SeqCst) >= 1);

        let positions = manager.positions.lock().await;
        let key = ("BTCUSDT".to_string(), Timeframe::parse("15m").unwrap());
        let position = positions.get(&key).unwrap();
        assert_eq!(position.direction, SignalDirection::Short);
        assert_eq!(position.status, PositionStatus::Pending);
    }

    struct FillMockExchange {
        mark_price: Decimal,
        statuses: Mutex<HashMap<String, OrderStatus>>,
        cancel_calls: AtomicUsize,
    }

    #[async_trait]
    impl OrderExecutionPort for FillMockExchange {
        async fn place_limit_order(&self, _symbol: &str, _side: SignalDirection, _price: Decimal, _quantity: Decimal) -> Result<String> {
            let id = Uuid::new_v4().to_string();
            self.statuses.lock().await.insert(id.clone(), OrderStatus::Open);
            Ok(id)
        }
        async fn place_market_close(&self, _symbol: &str, _quantity: Decimal) -> Result<String> {
            Ok(Uuid::new_v4().to_string())
        }
        async fn place_tp_sl(&self, _symbol: &str, _side: SignalDirection, _trigger_price: Decimal, _is_take_profit: bool) -> Result<String> {
            let id = Uuid::new_v4().to_string();
            self.statuses.lock().await.insert(id.clone(), OrderStatus::Open);
            Ok(id)
        }
        async fn cancel_order(&self, _symbol: &str, exchange_order_id: &str) -> Result<()> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            self.statuses.lock().await.insert(exchange_order_id.to_string(), OrderStatus::Cancelled);
            Ok(())
        }
        async fn mark_price(&self, _symbol: &str) -> Result<Decimal> {
            Ok(self.mark_price)
        }
        async fn order_status(&self, _symbol: &str, exchange_order_id: &str) -> Result<OrderStatus> {
            Ok(*self.statuses.lock().await.get(exchange_order_id).unwrap_or(&OrderStatus::Open))
        }
    }

    /// Module K fill lifecycle: both entries fill (PENDING -> BOTH_FILLED
    /// with a recomputed average entry price), then the take-profit fills,
    /// which cancels the still-open stop-loss and closes the position with
    /// realized P&L against the average entry.
    #[tokio::test]
    async fn poll_fills_advances_lifecycle_to_closed_with_realized_pnl() {
        let exchange =
            FillMockExchange { mark_price: dec!(98.5), statuses: Mutex::new(HashMap::new()), cancel_calls: AtomicUsize::new(0) };
        let manager = OrderManagerSubscriber::new(exchange, OrderSizing { position_size_usdt: dec!(1000), leverage: dec!(1) });
        manager.on_signal(&signal(SignalDirection::Long, dec!(110))).await.unwrap();

        let key = ("BTCUSDT".to_string(), Timeframe::parse("15m").unwrap());
        let (entry1_id, entry2_id, tp_id) = {
            let positions = manager.positions.lock().await;
            let position = positions.get(&key).unwrap();
            (
                position.entry1.exchange_order_id.clone().unwrap(),
                position.entry2.exchange_order_id.clone().unwrap(),
                position.tp.exchange_order_id.clone().unwrap(),
            )
        };

        manager.exchange.statuses.lock().await.insert(entry1_id, OrderStatus::Filled);
        manager.exchange.statuses.lock().await.insert(entry2_id, OrderStatus::Filled);
        manager.poll_fills().await.unwrap();

        {
            let positions = manager.positions.lock().await;
            let position = positions.get(&key).unwrap();
            assert_eq!(position.status, PositionStatus::BothFilled);
            assert_eq!(position.avg_entry_price, (dec!(99) + dec!(98)) / dec!(2));
        }

        manager.exchange.statuses.lock().await.insert(tp_id, OrderStatus::Filled);
        manager.poll_fills().await.unwrap();

        let positions = manager.positions.lock().await;
        let position = positions.get(&key).unwrap();
        assert!(position.is_closed);
        assert_eq!(position.status, PositionStatus::Closed);
        assert_eq!(position.closed_reason, Some(CloseReason::TakeProfit));
        assert_eq!(position.realized_pnl, Some((dec!(110) - position.avg_entry_price) * position.total_quantity));
        assert!(manager.exchange.cancel_calls.load(Ordering::SeqCst) >= 1);
    }
}
