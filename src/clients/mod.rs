//! External collaborators: chain RPC, aggregator, market data, signals
//!
//! Each client is a trait seam so the tick can be driven against stubs in
//! tests. Real implementations live alongside the traits.

pub mod aggregator;
pub mod chain;
pub mod market_data;
pub mod signals;

pub use aggregator::{AggregatorClient, BuiltSwap, HttpAggregatorClient, Quote, QuoteRequest};
pub use chain::{ChainClient, RpcChainClient, SimulationOutcome, TokenBalance};
pub use market_data::{MarketDataCache, MarketDataProvider, MarketSnapshot};
pub use signals::SignalProducer;
