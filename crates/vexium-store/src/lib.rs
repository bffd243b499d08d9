//! Vexium economy store.
//!
//! The [`EconomyStore`] contract is the single source of truth for worlds,
//! balances, inventories, the per-world transaction hash chain, loans and
//! intents. Writes are expressed as [`ChangeSet`]s and applied atomically.
//!
//! Backends:
//! - [`memory::InMemoryEconomyStore`] for tests and single-process runs
//! - `postgres::PostgresEconomyStore` (feature `postgres`) as the durable store

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod config;
mod effect;
mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use config::StorageConfig;
pub use effect::{BalanceSlot, ChangeSet, CommitReceipt, Effect};
pub use error::{GuardViolation, StoreError, StoreResult};
pub use memory::InMemoryEconomyStore;
pub use traits::{EconomyStore, QueryWindow};
