//! Atomic change sets.
//!
//! Every mutation of economic state is expressed as an ordered list of
//! [`Effect`]s committed through [`crate::EconomyStore::commit`]. Backends apply
//! the whole list inside one transaction. Guarded effects re-check their
//! precondition against the row being changed, so a balance read earlier by
//! the engine is advisory only; the guard is what protects the invariant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use vexium_types::{
    AccountRef, Business, BusinessId, Citizen, CitizenId, DecayConfig, DecayEvent, DepositId,
    IntentId, IntentStatus, Loan, LoanId, NeedKind, NewTransaction, ProductionLine, Region,
    RegionId, ReplenishPricing, Resource, ResourceDeposit, ResourceId, SurvivalNeeds, TaxConfig,
    Transaction, TransactionId, TransactionIntent, Treasury, TreasuryCounter, World, WorldId,
};

/// Slack allowed when a raise fills a gauge exactly to 100.
pub(crate) const NEED_TOLERANCE: f64 = 1e-9;

/// A single balance cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "slot", content = "id", rename_all = "snake_case")]
pub enum BalanceSlot {
    CitizenWallet(CitizenId),
    CitizenBank(CitizenId),
    BusinessWallet(BusinessId),
    Treasury(WorldId),
}

impl BalanceSlot {
    /// The spendable slot of an account.
    pub fn wallet_of(account: AccountRef) -> Self {
        match account {
            AccountRef::Citizen(id) => Self::CitizenWallet(id),
            AccountRef::Business(id) => Self::BusinessWallet(id),
            AccountRef::Treasury(id) => Self::Treasury(id),
        }
    }

    pub fn is_treasury(&self) -> bool {
        matches!(self, Self::Treasury(_))
    }
}

impl fmt::Display for BalanceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CitizenWallet(id) => write!(f, "citizen wallet {id}"),
            Self::CitizenBank(id) => write!(f, "citizen bank {id}"),
            Self::BusinessWallet(id) => write!(f, "business wallet {id}"),
            Self::Treasury(id) => write!(f, "treasury {id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    CreateWorld {
        world: World,
        treasury: Treasury,
    },
    /// Field-scoped settings update; `None` leaves the current value.
    UpdateWorldSettings {
        world_id: WorldId,
        currency_name: Option<String>,
        currency_symbol: Option<String>,
        tax: Option<TaxConfig>,
        decay: Option<DecayConfig>,
        pricing: Option<ReplenishPricing>,
        starting_balance_minor: Option<i64>,
    },
    SetWorldActive {
        world_id: WorldId,
        active: bool,
    },
    CreateRegion(Region),
    SetRegionMayor {
        region_id: RegionId,
        mayor: Option<CitizenId>,
    },
    CreateCitizen {
        citizen: Citizen,
        needs: SurvivalNeeds,
    },
    SetCitizenActive {
        citizen_id: CitizenId,
        active: bool,
    },
    CreateResource(Resource),
    CreateBusiness(Business),
    SetBusinessOperating {
        business_id: BusinessId,
        operating: bool,
    },
    SetProductionPlan {
        business_id: BusinessId,
        inputs: Vec<ProductionLine>,
        outputs: Vec<ProductionLine>,
    },
    CreateDeposit(ResourceDeposit),
    /// Guarded: the slot must hold at least `amount_minor`.
    Debit {
        slot: BalanceSlot,
        amount_minor: i64,
    },
    Credit {
        slot: BalanceSlot,
        amount_minor: i64,
    },
    BumpTreasuryCounter {
        world_id: WorldId,
        counter: TreasuryCounter,
        amount_minor: i64,
    },
    /// Guarded for negative deltas: the quantity may not drop below zero.
    /// The inventory row is created on first credit.
    AdjustInventory {
        business_id: BusinessId,
        resource_id: ResourceId,
        delta: i64,
    },
    /// Guarded: the deposit must still hold `quantity`.
    ExtractDeposit {
        deposit_id: DepositId,
        quantity: i64,
    },
    /// Result is clamped into `[0, 100]`.
    AdjustNeed {
        citizen_id: CitizenId,
        need: NeedKind,
        delta: f64,
    },
    /// Guarded: the gauge must have room for the whole `amount` below 100.
    RaiseNeed {
        citizen_id: CitizenId,
        need: NeedKind,
        amount: f64,
    },
    TouchDecay {
        citizen_id: CitizenId,
        at: DateTime<Utc>,
    },
    RecordDecayEvent(DecayEvent),
    RecordTransaction(NewTransaction),
    CreateLoan(Loan),
    /// Guarded: the loan must be `ACTIVE` with exactly `expected_paid_minor`
    /// repaid so far.
    ApplyLoanPayment {
        loan_id: LoanId,
        expected_paid_minor: i64,
        amount_minor: i64,
        next_payment_due: Option<DateTime<Utc>>,
        paid_off: bool,
    },
    CreateIntent(TransactionIntent),
    /// Guarded: the intent must currently be in `from`.
    TransitionIntent {
        intent_id: IntentId,
        from: IntentStatus,
        to: IntentStatus,
        transaction_id: Option<TransactionId>,
        failure_reason: Option<String>,
        at: DateTime<Utc>,
    },
}

/// Ordered, all-or-nothing list of effects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    effects: Vec<Effect>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) -> &mut Self {
        self.effects.push(effect);
        self
    }

    pub fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn extend(&mut self, other: ChangeSet) {
        self.effects.extend(other.effects);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Worlds whose transaction chains this change set appends to.
    pub fn chained_worlds(&self) -> Vec<WorldId> {
        let mut worlds: Vec<WorldId> = self
            .effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::RecordTransaction(tx) => Some(tx.world_id),
                _ => None,
            })
            .collect();
        worlds.sort();
        worlds.dedup();
        worlds
    }
}

impl From<Vec<Effect>> for ChangeSet {
    fn from(effects: Vec<Effect>) -> Self {
        Self { effects }
    }
}

/// What a successful commit produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Recorded transactions with their assigned sequence and hashes.
    pub transactions: Vec<Transaction>,
}
