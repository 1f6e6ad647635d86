//! Best-effort, asynchronous mirroring of registry events to a ledger.
//!
//! The registry commits locally first and then hands the event to
//! [`LedgerMirror::publish`], which never blocks and never fails the caller.
//! A background task delivers events in order, retrying with exponential
//! backoff; events that exhaust their attempts are logged and counted.

use super::gateway::{LedgerError, LedgerGateway};
use super::transaction::LedgerEvent;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub submit_timeout: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            submit_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct MirrorCounters {
    delivered: AtomicU64,
    retries: AtomicU64,
    abandoned: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MirrorStats {
    pub delivered: u64,
    pub retries: u64,
    pub abandoned: u64,
}

#[derive(Clone)]
pub struct LedgerMirror {
    sender: mpsc::UnboundedSender<LedgerEvent>,
    counters: Arc<MirrorCounters>,
}

impl LedgerMirror {
    /// Start the delivery task. It exits once every `LedgerMirror` clone has
    /// been dropped and the queue is drained.
    pub fn spawn(gateway: Arc<dyn LedgerGateway>, config: MirrorConfig) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(MirrorCounters::default());
        let handle = tokio::spawn(run(gateway, receiver, config, counters.clone()));
        (Self { sender, counters }, handle)
    }

    pub fn publish(&self, event: LedgerEvent) {
        if let Err(rejected) = self.sender.send(event) {
            warn!(
                "ledger mirror stopped; event {} not mirrored",
                rejected.0.event_id
            );
        }
    }

    pub fn stats(&self) -> MirrorStats {
        MirrorStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
        }
    }
}

async fn run(
    gateway: Arc<dyn LedgerGateway>,
    mut receiver: mpsc::UnboundedReceiver<LedgerEvent>,
    config: MirrorConfig,
    counters: Arc<MirrorCounters>,
) {
    while let Some(event) = receiver.recv().await {
        deliver(gateway.as_ref(), &event, &config, &counters).await;
    }
    info!("ledger mirror drained");
}

async fn deliver(
    gateway: &dyn LedgerGateway,
    event: &LedgerEvent,
    config: &MirrorConfig,
    counters: &MirrorCounters,
) {
    let attempts = config.max_attempts.max(1);
    let mut backoff = config.initial_backoff;

    for attempt in 1..=attempts {
        let outcome = match tokio::time::timeout(config.submit_timeout, gateway.submit(event)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(config.submit_timeout)),
        };

        match outcome {
            Ok(receipt) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "mirrored {} {} in block {}",
                    event.function_name(),
                    event.fingerprint(),
                    receipt.block_index
                );
                return;
            }
            Err(e) => warn!(
                "ledger submit of {} failed (attempt {}/{}): {}",
                event.event_id, attempt, attempts, e
            ),
        }

        if attempt < attempts {
            counters.retries.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    counters.abandoned.fetch_add(1, Ordering::Relaxed);
    error!(
        "giving up mirroring {} for {} after {} attempts",
        event.function_name(),
        event.fingerprint(),
        attempts
    );
}
