use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::common::traits::SignalConsumer;
use crate::common::types::SignalRecord;
use crate::trading::traits::{SizingEngine, TradeExecutor};
use crate::trading::types::OrderRequest;

/// Fixed per-ticker quantities, optionally restricted to some levels
///
/// Tickers without an entry size to zero and are skipped.
#[derive(Debug, Clone, Default)]
pub struct FixedSizingEngine {
    quantities: HashMap<String, u32>,
    allowed_levels: Option<HashSet<String>>,
}

impl FixedSizingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quantity(mut self, ticker: impl Into<String>, quantity: u32) -> Self {
        self.quantities.insert(ticker.into(), quantity);
        self
    }

    /// Only trade signals at these levels (e.g. `["L0", "L2"]`)
    pub fn with_levels<I, L>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.allowed_levels = Some(levels.into_iter().map(Into::into).collect());
        self
    }

    pub fn set_quantity(&mut self, ticker: impl Into<String>, quantity: u32) {
        self.quantities.insert(ticker.into(), quantity);
    }

    fn level_allowed(&self, level: &str) -> bool {
        self.allowed_levels
            .as_ref()
            .map_or(true, |levels| levels.contains(level))
    }
}

impl SizingEngine for FixedSizingEngine {
    fn quantity(&mut self, record: &SignalRecord) -> u32 {
        if !self.level_allowed(&record.level) {
            return 0;
        }
        self.quantities.get(&record.ticker).copied().unwrap_or(0)
    }
}

/// Execution counters kept by [`SignalTrader`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraderStats {
    pub executed: u64,
    pub skipped: u64,
    pub rejected: u64,
}

/// Consumer that turns signals into orders
///
/// A rejected order is reported as a per-message failure so the dispatcher
/// logs it; the stream keeps running either way.
pub struct SignalTrader<S, E> {
    sizing: S,
    executor: E,
    stats: TraderStats,
}

impl<S: SizingEngine, E: TradeExecutor> SignalTrader<S, E> {
    pub fn new(sizing: S, executor: E) -> Self {
        Self {
            sizing,
            executor,
            stats: TraderStats::default(),
        }
    }

    pub fn stats(&self) -> TraderStats {
        self.stats
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}

impl<S: SizingEngine, E: TradeExecutor> SignalConsumer for SignalTrader<S, E> {
    fn handle(&mut self, record: &SignalRecord) -> anyhow::Result<()> {
        let quantity = self.sizing.quantity(record);
        if quantity == 0 {
            debug!(
                "Skipping {} {} signal: no quantity configured",
                record.ticker, record.level
            );
            self.stats.skipped += 1;
            return Ok(());
        }

        let order = OrderRequest::from_signal(record, quantity);
        info!(
            "Executing {:?} {} x{} @ {} (level {})",
            order.side, order.ticker, order.quantity, order.price, order.level
        );

        if self.executor.execute(&order) {
            self.stats.executed += 1;
            Ok(())
        } else {
            warn!("Order rejected: {:?} {} x{}", order.side, order.ticker, order.quantity);
            self.stats.rejected += 1;
            anyhow::bail!(
                "order rejected for {} ({:?} x{})",
                order.ticker,
                order.side,
                order.quantity
            )
        }
    }
}
