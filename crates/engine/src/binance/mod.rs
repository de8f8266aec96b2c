pub mod rest;
pub mod signer;
pub mod time_sync;

pub use rest::{classify_response, BinanceClient};
pub use signer::{QueryParams, RequestSigner};
pub use time_sync::TimeSyncClient;

use std::time::Duration;

pub const TESTNET_URL: &str = "https://testnet.binance.vision";
pub const PRODUCTION_URL: &str = "https://api.binance.com";

/// Tolerance the exchange applies to a signed request's timestamp.
pub const RECV_WINDOW_MS: i64 = 5_000;

/// Timeout for ping, time, ticker and klines.
pub const UNSIGNED_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for account and order calls.
pub const SIGNED_TIMEOUT: Duration = Duration::from_secs(15);
