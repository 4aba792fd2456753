//! Trading consumer
//!
//! Signals flow from the feed into a [`SignalTrader`], which asks a
//! [`SizingEngine`] how much to trade and hands the resulting
//! [`OrderRequest`] to a [`TradeExecutor`]:
//!
//! ```text
//! SignalRecord ─▶ SizingEngine::quantity ─▶ OrderRequest ─▶ TradeExecutor::execute
//! ```
//!
//! Broker integrations implement [`TradeExecutor`]; none ship with this crate.

mod trader;
mod traits;
mod types;

pub use trader::{FixedSizingEngine, SignalTrader, TraderStats};
pub use traits::{BoxedSizingEngine, BoxedTradeExecutor, SizingEngine, TradeExecutor};
pub use types::{OrderRequest, Side};
