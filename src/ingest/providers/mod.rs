// src/ingest/providers/mod.rs
pub mod finnhub;
pub mod fred;
pub mod newsapi;
pub mod polygon;
pub mod technical;
pub mod yahoo;

pub use finnhub::FinnhubProvider;
pub use fred::FredProvider;
pub use newsapi::NewsApiProvider;
pub use polygon::PolygonProvider;
pub use technical::{HistorySource, TechnicalProvider};
pub use yahoo::YahooProvider;
