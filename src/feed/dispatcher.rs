//! Decodes stream frames and hands them to the consumer

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

use crate::common::traits::SignalConsumer;
use crate::common::types::SignalRecord;

/// Per-message result of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Malformed,
    ConsumerFailed,
}

/// Running totals kept by the dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub malformed: u64,
    pub consumer_failures: u64,
}

/// Message dispatcher
///
/// Failures are confined to the message that caused them: a malformed
/// payload is dropped, a consumer error or panic is logged, and the next
/// frame is processed normally.
#[derive(Debug, Default)]
pub struct MessageDispatcher {
    stats: DispatchStats,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn dispatch<C: SignalConsumer + ?Sized>(
        &mut self,
        raw: &str,
        consumer: &mut C,
    ) -> DispatchOutcome {
        let record: SignalRecord = match serde_json::from_str(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to parse message: {} - {}", e, raw);
                self.stats.malformed += 1;
                return DispatchOutcome::Malformed;
            }
        };

        debug!(
            "Dispatching {} {} {} at {}",
            record.ticker, record.direction, record.level, record.price
        );

        match catch_unwind(AssertUnwindSafe(|| consumer.handle(&record))) {
            Ok(Ok(())) => {
                self.stats.delivered += 1;
                DispatchOutcome::Delivered
            }
            Ok(Err(e)) => {
                error!("Error processing signal for {}: {:#}", record.ticker, e);
                self.stats.consumer_failures += 1;
                DispatchOutcome::ConsumerFailed
            }
            Err(_) => {
                error!("Signal consumer panicked on {}", record.ticker);
                self.stats.consumer_failures += 1;
                DispatchOutcome::ConsumerFailed
            }
        }
    }
}

/// Consumer that only logs each record
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingConsumer;

impl SignalConsumer for LoggingConsumer {
    fn handle(&mut self, record: &SignalRecord) -> anyhow::Result<()> {
        info!(
            ticker = %record.ticker,
            price = %record.price,
            level = %record.level,
            direction = %record.direction,
            depth = record.depth,
            code_num = record.code_num,
            time = %record.time,
            "Signal received"
        );
        Ok(())
    }
}
