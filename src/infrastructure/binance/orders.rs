use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::OrderExecutionPort;
use crate::domain::signal::{OrderStatus, SignalDirection};
use crate::infrastructure::binance::market_data::BinanceFuturesClient;
use crate::infrastructure::binance::signing::sign_query;

const RECV_WINDOW_MS: i64 = 5000;

fn side_str(side: SignalDirection) -> &'static str {
    match side {
        SignalDirection::Long => "BUY",
        SignalDirection::Short => "SELL",
    }
}

fn opposite_side_str(side: SignalDirection) -> &'static str {
    match side {
        SignalDirection::Long => "SELL",
        SignalDirection::Short => "BUY",
    }
}

impl BinanceFuturesClient {
    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let mut query = params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!("timestamp={timestamp}&recvWindow={RECV_WINDOW_MS}"));
        let signature = sign_query(&self.api_secret, &query);
        format!("{query}&signature={signature}")
    }

    async fn position_side(&self, symbol: &str) -> Result<SignalDirection> {
        #[derive(Debug, Deserialize)]
        struct PositionRisk {
            #[serde(rename = "positionAmt")]
            position_amt: String,
        }

        let query = self.signed_query(&[("symbol", symbol.to_string())]);
        let url = format!("{}/fapi/v2/positionRisk?{query}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("failed to fetch Binance position risk")?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance positionRisk fetch failed: {body}");
        }
        let positions: Vec<PositionRisk> = response.json().await.context("failed to parse Binance positionRisk response")?;
        let amount: Decimal = positions
            .first()
            .and_then(|p| p.position_amt.parse().ok())
            .unwrap_or(Decimal::ZERO);
        Ok(if amount.is_sign_negative() { SignalDirection::Short } else { SignalDirection::Long })
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: i64,
}

#[derive(Debug, Deserialize)]
struct MarkPriceResponse {
    #[serde(rename = "markPrice")]
    mark_price: String,
}

#[async_trait]
impl OrderExecutionPort for BinanceFuturesClient {
    async fn place_limit_order(&self, symbol: &str, side: SignalDirection, price: Decimal, quantity: Decimal) -> Result<String> {
        let query = self.signed_query(&[
            ("symbol", symbol.to_string()),
            ("side", side_str(side).to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", quantity.to_string()),
            ("price", price.to_string()),
        ]);
        let url = format!("{}/fapi/v1/order?{query}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("failed to place Binance limit order")?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance limit order rejected: {body}");
        }
        let order: OrderResponse = response.json().await.context("failed to parse Binance order response")?;
        Ok(order.order_id.to_string())
    }

    async fn place_market_close(&self, symbol: &str, quantity: Decimal) -> Result<String> {
        let closing_side = opposite_side_str(self.position_side(symbol).await?);
        let query = self.signed_query(&[
            ("symbol", symbol.to_string()),
            ("side", closing_side.to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.to_string()),
            ("reduceOnly", "true".to_string()),
        ]);
        let url = format!("{}/fapi/v1/order?{query}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("failed to place Binance market close")?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance market close rejected: {body}");
        }
        let order: OrderResponse = response.json().await.context("failed to parse Binance order response")?;
        Ok(order.order_id.to_string())
    }

    async fn place_tp_sl(&self, symbol: &str, side: SignalDirection, trigger_price: Decimal, is_take_profit: bool) -> Result<String> {
        let order_type = if is_take_profit { "TAKE_PROFIT_MARKET" } else { "STOP_MARKET" };
        let query = self.signed_query(&[
            ("symbol", symbol.to_string()),
            ("side", opposite_side_str(side).to_string()),
            ("type", order_type.to_string()),
            ("stopPrice", trigger_price.to_string()),
            ("closePosition", "true".to_string()),
        ]);
        let url = format!("{}/fapi/v1/order?{query}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("failed to place Binance TP/SL order")?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance TP/SL order rejected: {body}");
        }
        let order: OrderResponse = response.json().await.context("failed to parse Binance order response")?;
        Ok(order.order_id.to_string())
    }

    async fn cancel_order(&self, symbol: &str, exchange_order_id: &str) -> Result<()> {
        let query = self.signed_query(&[("symbol", symbol.to_string()), ("orderId", exchange_order_id.to_string())]);
        let url = format!("{}/fapi/v1/order?{query}", self.base_url);
        let response = self
            .client
            .delete(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("failed to cancel Binance order")?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance order cancel rejected: {body}");
        }
        Ok(())
    }

    async fn mark_price(&self, symbol: &str) -> Result<Decimal> {
        let url = format!("{}/fapi/v1/premiumIndex", self.base_url);
        let url = crate::infrastructure::core::build_url_with_query(&url, &[("symbol", symbol)]);
        let response = self.client.get(&url).send().await.context("failed to fetch Binance mark price")?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance premiumIndex fetch failed: {body}");
        }
        let payload: MarkPriceResponse = response.json().await.context("failed to parse Binance premiumIndex response")?;
        payload.mark_price.parse().context("Binance mark price is not a valid decimal")
    }

    async fn order_status(&self, symbol: &str, exchange_order_id: &str) -> Result<OrderStatus> {
        #[derive(Debug, Deserialize)]
        struct OrderQueryResponse {
            status: String,
        }

        let query = self.signed_query(&[("symbol", symbol.to_string()), ("orderId", exchange_order_id.to_string())]);
        let url = format!("{}/fapi/v1/order?{query}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("failed to query Binance order status")?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance order status query rejected: {body}");
        }
        let payload: OrderQueryResponse = response.json().await.context("failed to parse Binance order status response")?;
        Ok(match payload.status.as_str() {
            "NEW" | "PARTIALLY_FILLED" => OrderStatus::Open,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "EXPIRED" | "REJECTED" => OrderStatus::Cancelled,
            _ => OrderStatus::Open,
        })
    }
}
