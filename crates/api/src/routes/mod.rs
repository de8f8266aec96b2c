mod bots;
mod health;

pub use bots::bots_router;
pub use health::health_router;
