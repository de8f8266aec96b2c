use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header::CONTENT_TYPE, Client, Method};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use common::{
    AccountSnapshot, Candle, Credentials, Error, ExchangeClient, Network, OrderAck, OrderRequest,
    OrderType, Result,
};

use super::{
    QueryParams, RequestSigner, TimeSyncClient, PRODUCTION_URL, RECV_WINDOW_MS, SIGNED_TIMEOUT,
    TESTNET_URL, UNSIGNED_TIMEOUT,
};

const ORDER_PATH: &str = "/api/v3/order";

/// Binance error codes that mean the key, secret, signature or timestamp was
/// not accepted.
const AUTH_ERROR_CODES: [i64; 5] = [-2014, -2015, -1022, -1021, -2008];

/// REST API client for one Binance spot account.
pub struct BinanceClient {
    api_key: String,
    signer: RequestSigner,
    http: Client,
    base_url: String,
    time_sync: TimeSyncClient,
    quote_asset: String,
}

impl BinanceClient {
    /// Client for the network named in `credentials`.
    pub fn new(credentials: &Credentials) -> Result<Self> {
        Self::with_base_url(credentials, Self::base_url_for(credentials.network))
    }

    pub fn with_base_url(credentials: &Credentials, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: credentials.api_key.clone(),
            signer: RequestSigner::new(credentials.api_secret.clone()),
            time_sync: TimeSyncClient::new(http.clone(), base_url.clone()),
            http,
            base_url,
            quote_asset: "USDT".to_string(),
        })
    }

    /// Asset whose free balance `account_info` reports.
    pub fn with_quote_asset(mut self, asset: impl Into<String>) -> Self {
        self.quote_asset = asset.into();
        self
    }

    pub fn base_url_for(network: Network) -> &'static str {
        match network {
            Network::Testnet => TESTNET_URL,
            Network::Production => PRODUCTION_URL,
        }
    }

    pub async fn get(&self, path: &str, params: QueryParams, signed: bool) -> Result<Value> {
        let query = if signed {
            self.prepare_signed(params).await?.0
        } else {
            params.to_query_string()
        };
        self.send(Method::GET, path, query, signed).await
    }

    pub async fn post(&self, path: &str, params: QueryParams, signed: bool) -> Result<Value> {
        let query = if signed {
            self.prepare_signed(params).await?.0
        } else {
            params.to_query_string()
        };
        self.send(Method::POST, path, query, signed).await
    }

    /// Append `timestamp` and `recvWindow` to `params` and sign the result.
    /// Returns the transmittable query and the timestamp used.
    ///
    /// The clock offset is fetched fresh on every call. If it cannot be
    /// resolved the signed call is abandoned rather than sent unadjusted.
    pub(crate) async fn prepare_signed(&self, params: QueryParams) -> Result<(String, i64)> {
        let offset = self.time_sync.offset().await?;
        let timestamp = Utc::now().timestamp_millis() + offset;
        let params = params
            .push("timestamp", timestamp)
            .push("recvWindow", RECV_WINDOW_MS);
        Ok((self.signer.signed_query(&params), timestamp))
    }

    async fn send(&self, method: Method, path: &str, query: String, signed: bool) -> Result<Value> {
        let mut url = format!("{}{}", self.base_url, path);
        let timeout = if signed { SIGNED_TIMEOUT } else { UNSIGNED_TIMEOUT };

        let mut request = if method == Method::POST {
            self.http
                .post(&url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(query)
        } else {
            if !query.is_empty() {
                url.push('?');
                url.push_str(&query);
            }
            self.http.request(method.clone(), &url)
        };
        if signed {
            request = request.header("X-MBX-APIKEY", &self.api_key);
        }

        debug!(%method, path, signed, "Binance request");
        let resp = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::Connectivity(format!("{method} {path}: {e}")))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Connectivity(format!("{method} {path}: reading body: {e}")))?;

        classify_response(status, &body, path == ORDER_PATH)
    }
}

/// Map an HTTP status and body onto the error taxonomy.
///
/// A 2xx body is parsed as JSON. Anything else becomes an error whose message
/// reads `HTTP <status> | code=<code> | msg=<msg>`, with the exchange's own
/// code and message passed through verbatim.
pub fn classify_response(status: u16, body: &str, order_call: bool) -> Result<Value> {
    if (200..300).contains(&status) {
        return serde_json::from_str(body)
            .map_err(|e| Error::Internal(format!("HTTP {status} | unparseable body: {e}")));
    }

    let api_error = serde_json::from_str::<ApiError>(body).ok();
    let message = match &api_error {
        Some(err) => format!("HTTP {status} | code={} | msg={}", err.code, err.msg),
        None => format!("HTTP {status} | msg={}", body.trim()),
    };
    let code = api_error.map(|e| e.code);

    if status >= 500 {
        Err(Error::Connectivity(message))
    } else if status == 401
        || status == 403
        || code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c))
    {
        Err(Error::Authentication(message))
    } else if order_call {
        Err(Error::Order(message))
    } else {
        Err(Error::Policy(message))
    }
}

/// Quantity rendered without exponent or trailing zeros.
fn format_decimal(value: f64) -> String {
    let fixed = format!("{value:.8}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn parse_decimal(field: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| Error::Internal(format!("invalid {field} '{raw}': {e}")))
}

fn parse_klines(value: Value) -> Result<Vec<Candle>> {
    let rows = value
        .as_array()
        .ok_or_else(|| Error::Internal("klines response is not an array".into()))?;

    rows.iter()
        .map(|row| {
            let row = row
                .as_array()
                .ok_or_else(|| Error::Internal("kline row is not an array".into()))?;
            Ok(Candle {
                open_time_ms: int_at(row, 0)?,
                open: decimal_at(row, 1)?,
                high: decimal_at(row, 2)?,
                low: decimal_at(row, 3)?,
                close: decimal_at(row, 4)?,
                volume: decimal_at(row, 5)?,
                close_time_ms: int_at(row, 6)?,
            })
        })
        .collect()
}

fn int_at(row: &[Value], idx: usize) -> Result<i64> {
    row.get(idx)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Internal(format!("kline field {idx} is not an integer")))
}

fn decimal_at(row: &[Value], idx: usize) -> Result<f64> {
    match row.get(idx) {
        Some(Value::String(s)) => parse_decimal("kline field", s),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Error::Internal(format!("kline field {idx} out of range"))),
        _ => Err(Error::Internal(format!("kline field {idx} missing"))),
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    async fn ping(&self) -> Result<()> {
        self.get("/api/v3/ping", QueryParams::new(), false).await?;
        Ok(())
    }

    async fn server_time(&self) -> Result<i64> {
        self.time_sync.server_time().await
    }

    async fn account_info(&self) -> Result<AccountSnapshot> {
        let (query, timestamp) = self.prepare_signed(QueryParams::new()).await?;
        let value = self.send(Method::GET, "/api/v3/account", query, true).await?;
        let account: AccountResponse = serde_json::from_value(value)
            .map_err(|e| Error::Internal(format!("unexpected account payload: {e}")))?;

        let quote_free = match account.balances.iter().find(|b| b.asset == self.quote_asset) {
            Some(balance) => parse_decimal("free balance", &balance.free)?,
            None => 0.0,
        };

        Ok(AccountSnapshot {
            quote_free,
            can_trade: account.can_trade,
            server_time_ms: timestamp,
        })
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64> {
        let value = self
            .get("/api/v3/ticker/price", QueryParams::new().push("symbol", symbol), false)
            .await?;
        let ticker: PriceTicker = serde_json::from_value(value)
            .map_err(|e| Error::Internal(format!("unexpected ticker payload: {e}")))?;
        parse_decimal("price", &ticker.price)
    }

    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let params = QueryParams::new()
            .push("symbol", symbol)
            .push("interval", interval)
            .push("limit", limit);
        let value = self.get("/api/v3/klines", params, false).await?;
        parse_klines(value)
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let mut params = QueryParams::new()
            .push("symbol", &order.symbol)
            .push("side", order.side)
            .push("type", order.order_type)
            .push("quantity", format_decimal(order.quantity));
        if order.order_type == OrderType::Limit {
            let price = order
                .price
                .ok_or_else(|| Error::Order("limit order requires a price".into()))?;
            params = params
                .push("timeInForce", "GTC")
                .push("price", format_decimal(price));
        }

        debug!(symbol = %order.symbol, side = %order.side, qty = order.quantity, "Submitting order to Binance");
        let value = self.post(ORDER_PATH, params, true).await?;
        let resp: OrderResponse = serde_json::from_value(value.clone())
            .map_err(|e| Error::Internal(format!("unexpected order payload: {e}")))?;

        let base_asset = order.symbol.strip_suffix(self.quote_asset.as_str());
        let mut base_commission = 0.0;
        for fill in &resp.fills {
            if Some(fill.commission_asset.as_str()) == base_asset {
                base_commission += parse_decimal("commission", &fill.commission)?;
            }
        }

        Ok(OrderAck {
            order_id: resp.order_id.map(|id| id.to_string()),
            executed_qty: resp
                .executed_qty
                .as_deref()
                .map(|q| parse_decimal("executedQty", q))
                .transpose()?
                .unwrap_or(0.0),
            cumulative_quote_qty: resp
                .cummulative_quote_qty
                .as_deref()
                .map(|q| parse_decimal("cummulativeQuoteQty", q))
                .transpose()?
                .unwrap_or(0.0),
            base_commission,
            raw: value,
        })
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiError {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: Option<i64>,
    executed_qty: Option<String>,
    cummulative_quote_qty: Option<String>,
    #[serde(default)]
    fills: Vec<Fill>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Fill {
    commission: String,
    commission_asset: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    can_trade: bool,
    #[serde(default)]
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
struct Balance {
    asset: String,
    free: String,
}

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}
