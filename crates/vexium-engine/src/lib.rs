//! Vexium economy engine.
//!
//! Multi-tenant virtual economies: wallets, a taxed and hash-chained ledger,
//! token-confirmed transaction intents, a treasury with loans, survival need
//! decay, resource production and role-based permissions.
//!
//! Every operation is a method on [`EconomyEngine`]. Mutations are built as a
//! single [`vexium_store::ChangeSet`] and committed atomically, so a failed
//! operation leaves no trace.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vexium_engine::{EconomyEngine, NewWorld, TransferRequest};
//! use vexium_store::InMemoryEconomyStore;
//! use vexium_types::{AccountRef, TransactionCategory, UserId};
//!
//! # async fn demo() -> vexium_engine::EconomyResult<()> {
//! let engine = EconomyEngine::new(Arc::new(InMemoryEconomyStore::new()));
//! let world = engine
//!     .create_world(NewWorld::new("Harbor", UserId::new("owner")).with_starting_balance(10_000))
//!     .await?;
//! let alice = engine.join_world(world.id, &UserId::new("alice"), "Alice").await?;
//! let bob = engine.join_world(world.id, &UserId::new("bob"), "Bob").await?;
//! let receipt = engine
//!     .execute_transaction(TransferRequest::new(
//!         world.id,
//!         AccountRef::Citizen(alice.id),
//!         AccountRef::Citizen(bob.id),
//!         4_000,
//!         TransactionCategory::Payment,
//!     ))
//!     .await?;
//! assert_eq!(receipt.tax_minor, 200);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod admin;
mod clock;
mod config;
mod decay;
mod engine;
mod error;
mod intent;
mod ledger;
mod permissions;
mod production;
mod tax;
mod treasury;
mod wallet;

#[cfg(test)]
mod testkit;

pub use admin::{NewWorld, WorldSettings};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use decay::{
    decay_amount, productivity_multiplier, productivity_of, CitizenDecay, DecayReport, Multiplier,
    NeedStatus, Productivity, ReplenishReceipt,
};
pub use engine::{BatchFailure, EconomyEngine};
pub use error::{EconomyError, EconomyResult};
pub use intent::{ExpirySweep, IntentExecution, IntentRequest};
pub use ledger::{TransferReceipt, TransferRequest};
pub use permissions::{resolve_role, Action, Role, RoleFacts};
pub use production::{
    ProductionBlocker, ProductionReport, ProductionStatus, ResourceQuantity,
    WorldProductionReport,
};
pub use tax::{calculate_tax, TaxBreakdown, TaxType};
pub use treasury::{
    FeeKind, LoanBatchReport, LoanIssued, LoanPayment, LoanSummary, LoanTerms, RevenueKind,
    TreasuryReport,
};
