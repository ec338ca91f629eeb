//! Market data: source trait, concrete sources, and multi-timeframe merge.

pub mod binance;
pub mod csv_source;
pub mod memory;
pub mod merge;
pub mod provider;
pub mod synthetic;

pub use binance::BinanceFuturesSource;
pub use csv_source::CsvSource;
pub use memory::MemorySource;
pub use merge::{merge, merge_series, MergedFrame, MergedRow};
pub use provider::{DataError, MarketDataSource};
pub use synthetic::SyntheticSource;
