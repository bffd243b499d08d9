use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EconomyError, EconomyResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vexium_store::{BalanceSlot, ChangeSet, CommitReceipt, EconomyStore};
use vexium_types::{
    AccountRef, Business, BusinessId, Citizen, CitizenId, Loan, LoanId, SurvivalNeeds,
    Transaction, TransactionId, Treasury, World, WorldId,
};

/// One entity that failed inside a batch tick. The batch carries on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub entity_id: String,
    pub code: String,
    pub message: String,
}

impl BatchFailure {
    pub(crate) fn new(entity_id: impl ToString, err: &EconomyError) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Entry point for every economic operation.
///
/// Operations live in the per-concern modules (`wallet`, `ledger`, `intent`,
/// `treasury`, `decay`, `production`, `permissions`, `admin`) as `impl` blocks
/// on this type. Each mutating call builds one change set and commits it.
#[derive(Clone)]
pub struct EconomyEngine {
    store: Arc<dyn EconomyStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl EconomyEngine {
    pub fn new(store: Arc<dyn EconomyStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn EconomyStore>, config: EngineConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn EconomyStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) async fn commit(&self, changes: ChangeSet) -> EconomyResult<CommitReceipt> {
        Ok(self.store.commit(changes).await?)
    }

    pub(crate) async fn load_world(&self, world_id: WorldId) -> EconomyResult<World> {
        self.store
            .world(world_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("world", world_id))
    }

    pub(crate) async fn load_treasury(&self, world_id: WorldId) -> EconomyResult<Treasury> {
        self.store
            .treasury(world_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("treasury of world", world_id))
    }

    pub(crate) async fn load_citizen(&self, citizen_id: CitizenId) -> EconomyResult<Citizen> {
        self.store
            .citizen(citizen_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("citizen", citizen_id))
    }

    pub(crate) async fn load_needs(&self, citizen_id: CitizenId) -> EconomyResult<SurvivalNeeds> {
        self.store
            .survival_needs(citizen_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("survival needs of citizen", citizen_id))
    }

    pub(crate) async fn load_business(&self, business_id: BusinessId) -> EconomyResult<Business> {
        self.store
            .business(business_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("business", business_id))
    }

    pub(crate) async fn load_loan(&self, loan_id: LoanId) -> EconomyResult<Loan> {
        self.store
            .loan(loan_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("loan", loan_id))
    }

    pub async fn transaction(&self, transaction_id: TransactionId) -> EconomyResult<Transaction> {
        self.store
            .transaction(transaction_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("transaction", transaction_id))
    }

    /// World an account belongs to; fails when the account does not exist.
    pub(crate) async fn account_world(&self, account: AccountRef) -> EconomyResult<WorldId> {
        match account {
            AccountRef::Citizen(id) => Ok(self.load_citizen(id).await?.world_id),
            AccountRef::Business(id) => Ok(self.load_business(id).await?.world_id),
            AccountRef::Treasury(id) => Ok(self.load_treasury(id).await?.world_id),
        }
    }

    /// Accounts of another world are reported as missing from this one.
    pub(crate) async fn ensure_account_in_world(
        &self,
        account: AccountRef,
        world_id: WorldId,
    ) -> EconomyResult<()> {
        if self.account_world(account).await? != world_id {
            return Err(EconomyError::NotFound(format!(
                "{account} in world {world_id}"
            )));
        }
        Ok(())
    }

    pub(crate) async fn available_minor(&self, slot: BalanceSlot) -> EconomyResult<i64> {
        match slot {
            BalanceSlot::CitizenWallet(id) => Ok(self.load_citizen(id).await?.wallet_minor),
            BalanceSlot::CitizenBank(id) => Ok(self.load_citizen(id).await?.bank_minor),
            BalanceSlot::BusinessWallet(id) => Ok(self.load_business(id).await?.wallet_minor),
            BalanceSlot::Treasury(id) => Ok(self.load_treasury(id).await?.balance_minor),
        }
    }

    /// Early, advisory funds check for a clean error before building a change
    /// set. The debit effect itself is guarded at commit time.
    pub(crate) async fn ensure_funds(&self, slot: BalanceSlot, amount_minor: i64) -> EconomyResult<()> {
        let available_minor = self.available_minor(slot).await?;
        if available_minor < amount_minor {
            return Err(EconomyError::insufficient(slot, amount_minor, available_minor));
        }
        Ok(())
    }
}

pub(crate) fn require_positive(amount_minor: i64, what: &str) -> EconomyResult<()> {
    if amount_minor <= 0 {
        return Err(EconomyError::InvalidAmount(format!(
            "{what} must be positive, got {amount_minor}"
        )));
    }
    Ok(())
}

/// The single recorded transaction of a receipt.
pub(crate) fn recorded(receipt: CommitReceipt) -> EconomyResult<Transaction> {
    receipt
        .transactions
        .into_iter()
        .next()
        .ok_or_else(|| EconomyError::Store("commit recorded no transaction".to_string()))
}
