// src/config/mod.rs
pub mod providers;
pub mod tables;

pub use providers::{MarketDataConfig, ProviderSettings};
pub use tables::ReferenceTables;
