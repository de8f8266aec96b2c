use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AccountSnapshot, Candle, OrderSide, OrderType, Result};

/// An order to be submitted to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    /// Required for `OrderType::Limit`, ignored otherwise.
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
        }
    }
}

/// Exchange acknowledgment of an accepted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Exchange-assigned order id, when the response carried one.
    pub order_id: Option<String>,
    pub executed_qty: f64,
    /// Total quote asset spent or received.
    pub cumulative_quote_qty: f64,
    /// Commission charged in the base asset. It reduces what can be sold back.
    #[serde(default)]
    pub base_commission: f64,
    /// Full response payload, kept for the trade journal.
    pub raw: serde_json::Value,
}

impl OrderAck {
    /// Volume-weighted fill price, if the order reports any execution.
    pub fn average_price(&self) -> Option<f64> {
        (self.executed_qty > 0.0 && self.cumulative_quote_qty > 0.0)
            .then(|| self.cumulative_quote_qty / self.executed_qty)
    }

    /// Base-asset quantity actually credited to the account.
    pub fn net_qty(&self) -> f64 {
        (self.executed_qty - self.base_commission).max(0.0)
    }
}

/// Abstraction over one account's exchange connection.
///
/// `BinanceClient` implements this against the REST API.
/// `PaperExchange` implements this for simulation and tests.
///
/// Implementations never panic on an exchange-side error response; every
/// failure is returned as an [`crate::Error`].
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Connectivity probe.
    async fn ping(&self) -> Result<()>;

    /// Exchange clock in milliseconds since the epoch.
    async fn server_time(&self) -> Result<i64>;

    /// Signed account snapshot.
    async fn account_info(&self) -> Result<AccountSnapshot>;

    /// Latest traded price for a symbol.
    async fn ticker_price(&self, symbol: &str) -> Result<f64>;

    /// Candle history, oldest first.
    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>>;

    /// Submit a signed order.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck>;
}
