use super::transaction::LedgerEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub event_id: String,
    pub block_index: u64,
    pub block_hash: String,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("ledger did not answer within {0:?}")]
    Timeout(Duration),
    #[error("ledger integrity violated at block {index}: {reason}")]
    Integrity { index: u64, reason: String },
}

/// External immutable log that mirrors registry events.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn submit(&self, event: &LedgerEvent) -> Result<LedgerReceipt, LedgerError>;
}
