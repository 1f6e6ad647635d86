use super::transaction::LedgerEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub events: Vec<LedgerEvent>,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
}

impl Block {
    pub fn new(index: u64, events: Vec<LedgerEvent>, previous_hash: String) -> Self {
        Self {
            index,
            timestamp: Utc::now(),
            events,
            previous_hash,
            hash: String::new(),
            nonce: 0,
        }
    }

    pub fn genesis() -> Self {
        let mut block = Self::new(0, vec![], "0".repeat(64));
        block.hash = block.compute_hash();
        block
    }

    pub fn compute_hash(&self) -> String {
        let event_ids: Vec<&str> = self.events.iter().map(|e| e.event_id.as_str()).collect();
        let data = format!(
            "{}{}{}{}{}",
            self.index,
            self.timestamp.to_rfc3339(),
            event_ids.join(","),
            self.previous_hash,
            self.nonce
        );
        format!("{:x}", Sha256::digest(data.as_bytes()))
    }

    /// Search nonces until the hash carries `difficulty` leading zeros.
    pub fn mine(&mut self, difficulty: u32) {
        let target = "0".repeat(difficulty as usize);
        loop {
            let hash = self.compute_hash();
            if hash.starts_with(&target) {
                self.hash = hash;
                return;
            }
            self.nonce += 1;
        }
    }
}
