pub mod config;
pub mod manager;
pub mod sizing;

pub use config::RiskConfig;
pub use manager::{CloseAllReport, PositionManager};
pub use sizing::{position_size, quantity_decimals};
