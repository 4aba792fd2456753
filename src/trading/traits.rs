use crate::common::types::SignalRecord;
use crate::trading::types::OrderRequest;

/// Decides how many shares a signal is worth
///
/// Called inline for every record, so implementations should not block.
/// Returning `0` skips the signal.
pub trait SizingEngine: Send {
    fn quantity(&mut self, record: &SignalRecord) -> u32;
}

/// Places orders with a broker
pub trait TradeExecutor: Send {
    /// Submit an order. `false` means the broker rejected it.
    fn execute(&mut self, order: &OrderRequest) -> bool;
}

/// Boxed sizing engine for dynamic dispatch
pub type BoxedSizingEngine = Box<dyn SizingEngine>;

/// Boxed executor for dynamic dispatch
pub type BoxedTradeExecutor = Box<dyn TradeExecutor>;

impl<S: SizingEngine + ?Sized> SizingEngine for Box<S> {
    fn quantity(&mut self, record: &SignalRecord) -> u32 {
        (**self).quantity(record)
    }
}

impl<E: TradeExecutor + ?Sized> TradeExecutor for Box<E> {
    fn execute(&mut self, order: &OrderRequest) -> bool {
        (**self).execute(order)
    }
}
