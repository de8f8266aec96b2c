use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which exchange environment a set of credentials belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Production,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Testnet => write!(f, "testnet"),
            Network::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "testnet" | "test" => Ok(Network::Testnet),
            "production" | "mainnet" | "live" => Ok(Network::Production),
            other => Err(format!("unknown network '{other}'")),
        }
    }
}

/// Account product type. Only spot accounts can be traded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Spot,
    Derivatives,
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountType::Spot => write!(f, "spot"),
            AccountType::Derivatives => write!(f, "derivatives"),
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spot" => Ok(AccountType::Spot),
            "derivatives" | "futures" => Ok(AccountType::Derivatives),
            other => Err(format!("unknown account type '{other}'")),
        }
    }
}

/// API credentials for one account. Immutable for the lifetime of a bot.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub account_type: AccountType,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, network: Network) -> Self {
        let api_key: String = api_key.into();
        let api_secret: String = api_secret.into();
        Self {
            api_key: api_key.trim().to_string(),
            api_secret: api_secret.trim().to_string(),
            network,
            account_type: AccountType::Spot,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &"***")
            .field("network", &self.network)
            .field("account_type", &self.account_type)
            .finish()
    }
}

fn redact(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{visible}***")
}

/// Account state fetched once per cycle. Never reused across cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Free balance of the quote asset (e.g. USDT).
    pub quote_free: f64,
    pub can_trade: bool,
    /// Exchange-side timestamp of the snapshot, in milliseconds.
    pub server_time_ms: i64,
}

/// One OHLCV candle, oldest first when returned in a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time_ms: i64,
}

/// Outcome of a signal scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Hold,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Buy => write!(f, "BUY"),
            Decision::Hold => write!(f, "HOLD"),
        }
    }
}

/// Indicator values that produced a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub price: f64,
    pub sma_short: f64,
    pub sma_long: f64,
    pub rsi: f64,
    /// Percentage change over the short lookback window.
    pub change_pct: f64,
}

/// Scored view of one symbol. Recomputed on every scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    /// Always within [0, 100].
    pub score: f64,
    pub decision: Decision,
    pub indicators: Indicators,
}

impl Signal {
    /// A zero-score HOLD, used when there is not enough history to score.
    pub fn hold(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            score: 0.0,
            decision: Decision::Hold,
            indicators: Indicators::default(),
        }
    }

    pub fn is_buy(&self) -> bool {
        self.decision == Decision::Buy
    }
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// An open long position owned by exactly one position manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Exchange order id of the entry order, or a generated fallback.
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: DateTime<Utc>,
    /// Score of the signal that opened this position.
    pub score: f64,
}

impl Position {
    /// Realized PnL of closing this position at `exit_price`.
    pub fn pnl_at(&self, exit_price: f64) -> f64 {
        match self.side {
            OrderSide::Buy => (exit_price - self.entry_price) * self.quantity,
            OrderSide::Sell => (self.entry_price - exit_price) * self.quantity,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    TimeLimit,
    ManualClose,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "STOP_LOSS"),
            CloseReason::TakeProfit => write!(f, "TAKE_PROFIT"),
            CloseReason::TimeLimit => write!(f, "TIME_LIMIT"),
            CloseReason::ManualClose => write!(f, "MANUAL_CLOSE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeKind {
    Open,
    Closed,
}

impl std::fmt::Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeKind::Open => write!(f, "OPEN"),
            TradeKind::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Write-once trade journal entry. One `Open` record per entry order and one
/// `Closed` record per exit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub kind: TradeKind,
    pub position_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: DateTime<Utc>,
    pub score: f64,
    pub exit_price: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pnl: Option<f64>,
    pub close_reason: Option<CloseReason>,
    /// Raw order acknowledgment returned by the exchange.
    pub order: serde_json::Value,
}

impl TradeRecord {
    pub fn opened(position: &Position, order: serde_json::Value) -> Self {
        Self {
            kind: TradeKind::Open,
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            quantity: position.quantity,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            opened_at: position.opened_at,
            score: position.score,
            exit_price: None,
            closed_at: None,
            pnl: None,
            close_reason: None,
            order,
        }
    }

    pub fn closed(
        position: &Position,
        exit_price: f64,
        reason: CloseReason,
        order: serde_json::Value,
    ) -> Self {
        Self {
            kind: TradeKind::Closed,
            exit_price: Some(exit_price),
            closed_at: Some(Utc::now()),
            pnl: Some(position.pnl_at(exit_price)),
            close_reason: Some(reason),
            ..Self::opened(position, order)
        }
    }
}

/// Whether bots talk to the real exchange or to the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Lifecycle of a per-account bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BotState {
    #[default]
    Idle,
    Running,
    Stopping,
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotState::Idle => write!(f, "idle"),
            BotState::Running => write!(f, "running"),
            BotState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Point-in-time view of one account's bot, as returned by `status()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: BotState,
    pub running: bool,
    /// Quote-asset balance from the latest successful refresh.
    pub balance: f64,
    pub open_positions: usize,
    /// Trades closed since the bot was started.
    pub trade_count: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}
