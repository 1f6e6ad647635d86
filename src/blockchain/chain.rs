use super::block::Block;
use super::gateway::{LedgerError, LedgerGateway, LedgerReceipt};
use super::transaction::LedgerEvent;
use crate::crypto::Fingerprint;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;
use tokio::sync::RwLock;

const MAX_DIFFICULTY: u32 = 5;

/// In-process hash-chained ledger. Every submitted event is sealed into its
/// own proof-of-work block linked to its predecessor by hash.
pub struct Blockchain {
    chain: Arc<RwLock<Vec<Block>>>,
    difficulty: u32,
}

impl Blockchain {
    pub fn new(difficulty: u32) -> Self {
        Self {
            chain: Arc::new(RwLock::new(vec![Block::genesis()])),
            difficulty: difficulty.min(MAX_DIFFICULTY),
        }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Seal `event` into a new block. Mining runs on the blocking pool; the
    /// write lock is held throughout so blocks stay in submission order.
    pub async fn append(&self, event: LedgerEvent) -> Result<LedgerReceipt, LedgerError> {
        let mut chain = self.chain.write().await;
        let (index, previous_hash) = match chain.last() {
            Some(last) => (last.index + 1, last.hash.clone()),
            None => (0, "0".repeat(64)),
        };

        let event_id = event.event_id.clone();
        let difficulty = self.difficulty;
        let block = tokio::task::spawn_blocking(move || {
            let mut block = Block::new(index, vec![event], previous_hash);
            block.mine(difficulty);
            block
        })
        .await
        .map_err(|e| LedgerError::Unavailable(format!("mining block {index} failed: {e}")))?;
        debug!("sealed event {} in block {} (nonce {})", event_id, index, block.nonce);

        let receipt = LedgerReceipt {
            event_id,
            block_index: index,
            block_hash: block.hash.clone(),
        };
        chain.push(block);
        Ok(receipt)
    }

    /// Walk the chain checking hashes, links and proof of work.
    pub async fn verify_integrity(&self) -> Result<(), LedgerError> {
        let chain = self.chain.read().await;
        let target = "0".repeat(self.difficulty as usize);

        for (position, block) in chain.iter().enumerate() {
            let fail = |reason: &str| LedgerError::Integrity {
                index: block.index,
                reason: reason.to_string(),
            };
            if block.hash != block.compute_hash() {
                return Err(fail("hash does not match contents"));
            }
            if position == 0 {
                continue;
            }
            if block.previous_hash != chain[position - 1].hash {
                return Err(fail("broken link to previous block"));
            }
            if !block.hash.starts_with(&target) {
                return Err(fail("insufficient proof of work"));
            }
        }
        Ok(())
    }

    /// Every event recorded for `fingerprint`, with the index of its block.
    pub async fn events_for(&self, fingerprint: &Fingerprint) -> Vec<(u64, LedgerEvent)> {
        self.chain
            .read()
            .await
            .iter()
            .flat_map(|block| {
                block
                    .events
                    .iter()
                    .filter(|event| event.fingerprint() == fingerprint)
                    .map(move |event| (block.index, event.clone()))
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.chain.read().await.len()
    }
}

#[async_trait]
impl LedgerGateway for Blockchain {
    async fn submit(&self, event: &LedgerEvent) -> Result<LedgerReceipt, LedgerError> {
        self.append(event.clone()).await
    }
}
