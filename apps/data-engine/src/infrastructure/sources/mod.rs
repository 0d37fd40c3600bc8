//! Market Data Source Adapters
//!
//! Concrete [`MarketDataSource`](crate::application::ports::MarketDataSource)
//! implementations registered with the source registry at startup.

mod exchange;

pub use exchange::SimulatedExchangeSource;
