pub mod binance;
pub mod config;
pub mod lifecycle;
mod worker;

pub use binance::{BinanceClient, RequestSigner, TimeSyncClient};
pub use config::{BotConfigFile, BotSettings};
pub use lifecycle::{BotController, Connector, StartReport, StopReport};
