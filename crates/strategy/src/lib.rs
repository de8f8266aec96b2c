pub mod config;
pub mod signal_engine;
pub mod indicators;

pub use config::SignalConfig;
pub use signal_engine::SignalEngine;
