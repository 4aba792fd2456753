//! Bounded hand-off between the receive loop and a slow consumer

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::traits::SignalConsumer;
use super::types::SignalRecord;

/// Default channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Create a new signal channel with the default buffer size
pub fn create_signal_channel() -> (mpsc::Sender<SignalRecord>, mpsc::Receiver<SignalRecord>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new signal channel with a custom buffer size
pub fn create_signal_channel_with_size(
    size: usize,
) -> (mpsc::Sender<SignalRecord>, mpsc::Receiver<SignalRecord>) {
    mpsc::channel(size)
}

/// Consumer that enqueues records for a worker task instead of handling them inline
///
/// Never blocks the receive loop. A full or closed queue drops the record and
/// reports it as a per-message failure.
#[derive(Debug, Clone)]
pub struct QueuedConsumer {
    sender: mpsc::Sender<SignalRecord>,
}

impl QueuedConsumer {
    pub fn new(sender: mpsc::Sender<SignalRecord>) -> Self {
        Self { sender }
    }
}

impl SignalConsumer for QueuedConsumer {
    fn handle(&mut self, record: &SignalRecord) -> anyhow::Result<()> {
        match self.sender.try_send(record.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                anyhow::bail!("signal queue full, dropping {} signal", record.ticker)
            }
            Err(TrySendError::Closed(_)) => {
                anyhow::bail!("signal queue closed, dropping {} signal", record.ticker)
            }
        }
    }
}

/// Spawn a worker that drains `receiver` into `consumer` until every sender is dropped
pub fn spawn_consumer_worker<C>(
    mut receiver: mpsc::Receiver<SignalRecord>,
    mut consumer: C,
) -> JoinHandle<()>
where
    C: SignalConsumer + 'static,
{
    tokio::spawn(async move {
        while let Some(record) = receiver.recv().await {
            if let Err(e) = consumer.handle(&record) {
                error!("Error in queued signal handler for {}: {:#}", record.ticker, e);
            }
        }
        debug!("Signal queue closed, consumer worker exiting");
    })
}

/// Build a queued consumer of the given capacity and spawn its worker
pub fn queued<C>(capacity: usize, consumer: C) -> (QueuedConsumer, JoinHandle<()>)
where
    C: SignalConsumer + 'static,
{
    let (tx, rx) = create_signal_channel_with_size(capacity);
    (QueuedConsumer::new(tx), spawn_consumer_worker(rx, consumer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Direction;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    fn record(ticker: &str) -> SignalRecord {
        SignalRecord {
            time: "t1".to_string(),
            ticker: ticker.to_string(),
            price: dec!(10.5),
            level: "L1".to_string(),
            direction: Direction::Bull,
            depth: 1,
            code_num: 3,
        }
    }

    #[tokio::test]
    async fn test_worker_receives_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (mut queued, worker) = queued(8, move |r: &SignalRecord| -> anyhow::Result<()> {
            sink.lock().unwrap().push(r.ticker.clone());
            Ok(())
        });

        queued.handle(&record("TQQQ")).unwrap();
        queued.handle(&record("SOXL")).unwrap();
        drop(queued);
        worker.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["TQQQ", "SOXL"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_record() {
        let (tx, _rx) = create_signal_channel_with_size(1);
        let mut queued = QueuedConsumer::new(tx);

        assert!(queued.handle(&record("TQQQ")).is_ok());
        let err = queued.handle(&record("SOXL")).unwrap_err();
        assert!(err.to_string().contains("queue full"));
    }

    #[tokio::test]
    async fn test_closed_queue_reports_error() {
        let (tx, rx) = create_signal_channel();
        drop(rx);
        let mut queued = QueuedConsumer::new(tx);
        assert!(queued.handle(&record("IBIT")).is_err());
    }
}
