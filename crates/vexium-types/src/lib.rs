//! Vexium economy records.
//!
//! Plain data shared by the store backends and the simulation engine. Money is
//! fixed-point (`i64` minor units), rates are basis points, and survival gauges
//! are `f64` in `[0, 100]`.

#![deny(unsafe_code)]

pub mod account;
pub mod business;
pub mod citizen;
pub mod enums;
pub mod ids;
pub mod intent;
pub mod ledger;
pub mod loan;
pub mod money;
pub mod world;

pub use account::{AccountKind, AccountRef, Balance, Party};
pub use business::{Business, InventoryItem, ProductionLine, Resource, ResourceDeposit};
pub use citizen::{clamp_need, Citizen, DecayEvent, NeedKind, SurvivalNeeds, NEED_MAX, NEED_MIN};
pub use enums::ParseEnumError;
pub use ids::{
    BusinessId, CitizenId, DecayEventId, DepositId, IntentId, LoanId, RegionId, ResourceId,
    TransactionId, UserId, WorldId,
};
pub use intent::{IntentStatus, TransactionIntent};
pub use ledger::{verify_chain, ChainVerification, NewTransaction, Transaction, TransactionCategory};
pub use loan::{Loan, LoanStatus};
pub use money::{apply_rate_half_up, div_ceil, format_minor, BASIS_POINTS_SCALE};
pub use world::{DecayConfig, Region, ReplenishPricing, TaxConfig, Treasury, TreasuryCounter, World};
