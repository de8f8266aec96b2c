use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{AccountStore, Config, Credentials, ExchangeClient, TradingMode};
use engine::{BinanceClient, BotConfigFile, BotController, Connector};
use paper::PaperExchange;
use store::SqliteStore;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(mode = %cfg.trading_mode, "SpotBot starting");

    let bot_config = BotConfigFile::load_or_default(&cfg.bot_config_path)
        .unwrap_or_else(|e| panic!("Failed to load {}: {e}", cfg.bot_config_path));
    info!(
        symbols = ?bot_config.bot.symbols,
        interval = %bot_config.bot.interval,
        poll_secs = bot_config.bot.poll_interval_secs,
        "Bot config loaded"
    );

    // ── Database ──────────────────────────────────────────────────────────────
    let db = SqliteStore::connect(&cfg.database_url)
        .await
        .unwrap_or_else(|e| panic!("Failed to open database: {e}"));
    if let Some(credentials) = cfg.seed_credentials() {
        db.add_account(&cfg.seed_account_id, &cfg.seed_account_id, &credentials)
            .await
            .unwrap_or_else(|e| panic!("Failed to seed account: {e}"));
        info!(account = %cfg.seed_account_id, network = %credentials.network, "Seed account stored");
    }
    info!("Database ready");
    let store: Arc<dyn AccountStore> = Arc::new(db);

    // ── Exchange connector (chosen by TRADING_MODE) ───────────────────────────
    let quote_asset = bot_config.bot.quote_asset.clone();
    let connector: Connector = match cfg.trading_mode {
        TradingMode::Live => {
            info!("Live trading mode, using BinanceClient");
            Arc::new(move |credentials: &Credentials| {
                let client = BinanceClient::new(credentials)?.with_quote_asset(quote_asset.clone());
                Ok(Arc::new(client) as Arc<dyn ExchangeClient>)
            })
        }
        TradingMode::Paper => {
            let (balance, slippage_bps) = (cfg.paper_balance, cfg.paper_slippage_bps);
            info!(balance, slippage_bps, "Paper trading mode, using PaperExchange");
            Arc::new(move |credentials: &Credentials| {
                let market = BinanceClient::new(credentials)?;
                let exchange = PaperExchange::new(balance, slippage_bps).with_market(Arc::new(market));
                Ok(Arc::new(exchange) as Arc<dyn ExchangeClient>)
            })
        }
    };

    let controller = Arc::new(BotController::new(bot_config, store.clone(), connector));

    // ── Control API ───────────────────────────────────────────────────────────
    let api_state = api::AppState {
        controller: controller.clone(),
        store,
        trading_mode: cfg.trading_mode,
        api_token: cfg.api_token.clone(),
    };

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received. Stopping all bots.");
        for (account, result) in controller.stop_all().await {
            match result {
                Ok(report) => info!(
                    account = %account,
                    closed = report.closed,
                    failed = report.failed,
                    "Bot stopped"
                ),
                Err(e) => warn!(account = %account, error = %e, "Bot failed to stop cleanly"),
            }
        }
    };

    info!("All subsystems started. Waiting for shutdown signal.");
    if let Err(e) = api::serve(api_state, cfg.api_port, shutdown).await {
        error!(error = %e, "Control API server failed");
        std::process::exit(1);
    }
    info!("Exiting.");
}
