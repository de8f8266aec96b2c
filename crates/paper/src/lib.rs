use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    AccountSnapshot, Candle, Error, ExchangeClient, OrderAck, OrderRequest, OrderSide, Result,
};

/// An order the simulator accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperOrder {
    pub order_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub fill_price: f64,
}

#[derive(Debug)]
struct PaperState {
    /// Free quote-asset balance.
    balance: f64,
    can_trade: bool,
    prices: HashMap<String, f64>,
    candles: HashMap<String, Vec<Candle>>,
    /// Base-asset holdings per symbol.
    holdings: HashMap<String, f64>,
    orders: Vec<PaperOrder>,
    reject_orders: bool,
    offline: bool,
    clock_offset_ms: i64,
    next_order_id: u64,
}

/// Simulated spot exchange for paper trading.
///
/// Market orders fill at the latest known price with configurable slippage.
/// No real orders are ever sent anywhere. Prices and candles come either
/// from the setters below or, with [`PaperExchange::with_market`], from a
/// real exchange's public endpoints. The toggles (`set_can_trade`,
/// `reject_orders`, `set_offline`) let callers rehearse exchange-side
/// failures.
pub struct PaperExchange {
    state: RwLock<PaperState>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    /// Buy-side commission in basis points, taken from the base asset received.
    base_fee_bps: f64,
    /// Source of live prices and candles. Only market-data calls reach it.
    market: Option<Arc<dyn ExchangeClient>>,
}

impl PaperExchange {
    pub fn new(initial_balance: f64, slippage_bps: f64) -> Self {
        info!(
            balance = initial_balance,
            slippage_bps = slippage_bps,
            "PaperExchange initialized"
        );
        Self {
            state: RwLock::new(PaperState {
                balance: initial_balance,
                can_trade: true,
                prices: HashMap::new(),
                candles: HashMap::new(),
                holdings: HashMap::new(),
                orders: Vec::new(),
                reject_orders: false,
                offline: false,
                clock_offset_ms: 0,
                next_order_id: 1,
            }),
            slippage_bps,
            base_fee_bps: 0.0,
            market: None,
        }
    }

    /// Charge buys a commission in the base asset, as Binance does without BNB fee discounts.
    pub fn with_base_fee_bps(mut self, bps: f64) -> Self {
        self.base_fee_bps = bps;
        self
    }

    /// Read prices and candles from `market` instead of the local tables.
    pub fn with_market(mut self, market: Arc<dyn ExchangeClient>) -> Self {
        self.market = Some(market);
        self
    }

    /// Update the latest price for a symbol.
    pub async fn update_price(&self, symbol: &str, price: f64) {
        self.state
            .write()
            .await
            .prices
            .insert(symbol.to_string(), price);
    }

    pub async fn remove_price(&self, symbol: &str) {
        self.state.write().await.prices.remove(symbol);
    }

    /// Replace the candle history for a symbol. The last close also becomes
    /// the symbol's current price.
    pub async fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        let mut state = self.state.write().await;
        if let Some(last) = candles.last() {
            state.prices.insert(symbol.to_string(), last.close);
        }
        state.candles.insert(symbol.to_string(), candles);
    }

    pub async fn set_balance(&self, balance: f64) {
        self.state.write().await.balance = balance;
    }

    pub async fn set_can_trade(&self, can_trade: bool) {
        self.state.write().await.can_trade = can_trade;
    }

    /// When enabled every order is rejected as if by the exchange.
    pub async fn reject_orders(&self, reject: bool) {
        self.state.write().await.reject_orders = reject;
    }

    /// When enabled every call fails with a connectivity error.
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    pub async fn set_clock_offset_ms(&self, offset_ms: i64) {
        self.state.write().await.clock_offset_ms = offset_ms;
    }

    pub async fn balance(&self) -> f64 {
        self.state.read().await.balance
    }

    /// Every order accepted so far, oldest first.
    pub async fn orders(&self) -> Vec<PaperOrder> {
        self.state.read().await.orders.clone()
    }

    async fn ensure_online(&self) -> Result<()> {
        if self.state.read().await.offline {
            return Err(Error::Connectivity("paper exchange is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn ping(&self) -> Result<()> {
        self.ensure_online().await
    }

    async fn server_time(&self) -> Result<i64> {
        self.ensure_online().await?;
        Ok(Utc::now().timestamp_millis() + self.state.read().await.clock_offset_ms)
    }

    async fn account_info(&self) -> Result<AccountSnapshot> {
        let server_time_ms = self.server_time().await?;
        let state = self.state.read().await;
        Ok(AccountSnapshot {
            quote_free: state.balance,
            can_trade: state.can_trade,
            server_time_ms,
        })
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        self.ensure_online().await?;
        if let Some(market) = &self.market {
            let price = market.ticker_price(symbol).await?;
            self.update_price(symbol, price).await;
            return Ok(price);
        }
        self.state
            .read()
            .await
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::Policy(format!("code=-1121 | msg=Invalid symbol {symbol}")))
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        self.ensure_online().await?;
        if let Some(market) = &self.market {
            let candles = market.klines(symbol, interval, limit).await?;
            if let Some(last) = candles.last() {
                self.update_price(symbol, last.close).await;
            }
            return Ok(candles);
        }
        let state = self.state.read().await;
        let candles = state
            .candles
            .get(symbol)
            .ok_or_else(|| Error::Policy(format!("code=-1121 | msg=Invalid symbol {symbol}")))?;
        let skip = candles.len().saturating_sub(limit as usize);
        Ok(candles[skip..].to_vec())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        self.ensure_online().await?;
        let mut state = self.state.write().await;

        if state.reject_orders {
            return Err(Error::Order("code=-2010 | msg=Order rejected by paper exchange".into()));
        }
        if !state.can_trade {
            return Err(Error::Order(
                "code=-2010 | msg=This action is disabled on this account.".into(),
            ));
        }

        let mid_price = state.prices.get(&order.symbol).copied().ok_or_else(|| {
            Error::Order(format!("code=-1121 | msg=No price for {}", order.symbol))
        })?;

        // Apply slippage: buys pay more, sells receive less
        let fill_price = match order.side {
            OrderSide::Buy => mid_price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid_price * (1.0 - self.slippage_bps / 10_000.0),
        };
        let quote_qty = fill_price * order.quantity;
        let base_commission = match order.side {
            OrderSide::Buy => order.quantity * self.base_fee_bps / 10_000.0,
            OrderSide::Sell => 0.0,
        };

        match order.side {
            OrderSide::Buy => {
                if quote_qty > state.balance {
                    return Err(Error::Order(
                        "code=-2010 | msg=Account has insufficient balance for requested action."
                            .into(),
                    ));
                }
                state.balance -= quote_qty;
                *state.holdings.entry(order.symbol.clone()).or_default() +=
                    order.quantity - base_commission;
            }
            OrderSide::Sell => {
                let held = state.holdings.get(&order.symbol).copied().unwrap_or(0.0);
                if held + 1e-12 < order.quantity {
                    return Err(Error::Order(
                        "code=-2010 | msg=Account has insufficient balance for requested action."
                            .into(),
                    ));
                }
                state.holdings.insert(order.symbol.clone(), (held - order.quantity).max(0.0));
                state.balance += quote_qty;
            }
        }

        let order_id = state.next_order_id;
        state.next_order_id += 1;
        state.orders.push(PaperOrder {
            order_id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            fill_price,
        });

        debug!(
            symbol = %order.symbol,
            side = %order.side,
            mid = mid_price,
            fill = fill_price,
            qty = order.quantity,
            "Paper fill simulated"
        );

        Ok(OrderAck {
            order_id: Some(order_id.to_string()),
            executed_qty: order.quantity,
            cumulative_quote_qty: quote_qty,
            base_commission,
            raw: json!({
                "symbol": order.symbol,
                "orderId": order_id,
                "side": order.side.to_string(),
                "type": order.order_type.to_string(),
                "status": "FILLED",
                "executedQty": order.quantity.to_string(),
                "cummulativeQuoteQty": quote_qty.to_string(),
                "transactTime": Utc::now().timestamp_millis(),
            }),
        })
    }
}
