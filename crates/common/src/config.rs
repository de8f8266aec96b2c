use crate::{Credentials, Network, TradingMode};

/// Process configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
///
/// Trading parameters (symbols, thresholds, risk) live in the TOML file
/// pointed to by `bot_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    // Control API
    pub api_token: String,
    pub api_port: u16,

    // Trading
    pub trading_mode: TradingMode,
    pub paper_slippage_bps: f64,
    pub paper_balance: f64,

    // Database
    pub database_url: String,

    pub bot_config_path: String,

    /// Account upserted into the store at startup when both keys are set.
    pub seed_account_id: String,
    pub binance_api_key: Option<String>,
    pub binance_secret: Option<String>,
    pub binance_network: Network,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = parse_trading_mode(&required_env("TRADING_MODE"))
            .unwrap_or_else(|other| {
                panic!("ERROR: TRADING_MODE must be 'paper' or 'live', got: '{other}'")
            });

        Config {
            api_token: required_env("API_TOKEN"),
            api_port: optional_env("API_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            trading_mode,
            paper_slippage_bps: optional_env("PAPER_SLIPPAGE_BPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            paper_balance: optional_env("PAPER_BALANCE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_000.0),
            database_url: required_env("DATABASE_URL"),
            bot_config_path: optional_env("BOT_CONFIG_PATH")
                .unwrap_or_else(|| "config/bot.toml".to_string()),
            seed_account_id: optional_env("SEED_ACCOUNT_ID")
                .unwrap_or_else(|| "default".to_string()),
            binance_api_key: optional_env("BINANCE_API_KEY").filter(|v| !v.trim().is_empty()),
            binance_secret: optional_env("BINANCE_SECRET").filter(|v| !v.trim().is_empty()),
            binance_network: optional_env("BINANCE_NETWORK")
                .map(|v| {
                    v.parse::<Network>().unwrap_or_else(|_| {
                        panic!("ERROR: BINANCE_NETWORK must be 'testnet' or 'production', got: '{v}'")
                    })
                })
                .unwrap_or_default(),
        }
    }

    /// Credentials for the seed account, if configured.
    pub fn seed_credentials(&self) -> Option<Credentials> {
        match (&self.binance_api_key, &self.binance_secret) {
            (Some(key), Some(secret)) => Some(Credentials::new(
                key.as_str(),
                secret.as_str(),
                self.binance_network,
            )),
            _ => None,
        }
    }
}

fn parse_trading_mode(raw: &str) -> Result<TradingMode, String> {
    match raw.trim().to_lowercase().as_str() {
        "paper" => Ok(TradingMode::Paper),
        "live" => Ok(TradingMode::Live),
        other => Err(other.to_string()),
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
