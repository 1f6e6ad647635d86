pub mod block;
pub mod chain;
pub mod gateway;
pub mod mirror;
pub mod transaction;

pub use chain::Blockchain;
pub use gateway::{LedgerError, LedgerGateway, LedgerReceipt};
pub use mirror::{LedgerMirror, MirrorConfig, MirrorStats};
pub use transaction::{LedgerEvent, LedgerEventKind};
