pub mod config;
pub mod durability;
pub mod storage;
pub mod transaction;

pub use config::DurabilityConfig;
pub use durability::Durability;
