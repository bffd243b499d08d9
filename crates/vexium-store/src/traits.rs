use crate::effect::{ChangeSet, CommitReceipt};
use crate::StoreResult;
use async_trait::async_trait;
use vexium_types::{
    Business, BusinessId, Citizen, CitizenId, DecayEvent, IntentId, InventoryItem, Loan, LoanId,
    Region, Resource, ResourceDeposit, ResourceId, SurvivalNeeds, Transaction, TransactionId,
    TransactionIntent, Treasury, UserId, World, WorldId,
};

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl QueryWindow {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    pub fn first(limit: usize) -> Self {
        Self { limit, offset: 0 }
    }
}

impl Default for QueryWindow {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Persistent source of truth for every world.
///
/// Reads are point-in-time snapshots. All writes go through [`commit`], which
/// applies a [`ChangeSet`] atomically: either every effect lands or none does.
///
/// [`commit`]: EconomyStore::commit
#[async_trait]
pub trait EconomyStore: Send + Sync {
    async fn world(&self, world_id: WorldId) -> StoreResult<Option<World>>;

    async fn worlds(&self) -> StoreResult<Vec<World>>;

    async fn treasury(&self, world_id: WorldId) -> StoreResult<Option<Treasury>>;

    async fn regions(&self, world_id: WorldId) -> StoreResult<Vec<Region>>;

    async fn citizen(&self, citizen_id: CitizenId) -> StoreResult<Option<Citizen>>;

    /// The citizen a user plays in a given world (at most one).
    async fn citizen_by_user(
        &self,
        world_id: WorldId,
        user_id: &UserId,
    ) -> StoreResult<Option<Citizen>>;

    async fn citizens(&self, world_id: WorldId) -> StoreResult<Vec<Citizen>>;

    async fn survival_needs(&self, citizen_id: CitizenId) -> StoreResult<Option<SurvivalNeeds>>;

    async fn business(&self, business_id: BusinessId) -> StoreResult<Option<Business>>;

    async fn businesses(&self, world_id: WorldId) -> StoreResult<Vec<Business>>;

    async fn resource(&self, resource_id: ResourceId) -> StoreResult<Option<Resource>>;

    async fn resources(&self, world_id: WorldId) -> StoreResult<Vec<Resource>>;

    async fn deposits(&self, business_id: BusinessId) -> StoreResult<Vec<ResourceDeposit>>;

    async fn inventory(&self, business_id: BusinessId) -> StoreResult<Vec<InventoryItem>>;

    async fn loan(&self, loan_id: LoanId) -> StoreResult<Option<Loan>>;

    async fn loans(&self, world_id: WorldId) -> StoreResult<Vec<Loan>>;

    async fn transaction(&self, transaction_id: TransactionId) -> StoreResult<Option<Transaction>>;

    /// Transactions newest-first.
    async fn transactions(
        &self,
        world_id: WorldId,
        window: QueryWindow,
    ) -> StoreResult<Vec<Transaction>>;

    /// The world's full chain in ascending sequence order.
    async fn transaction_chain(&self, world_id: WorldId) -> StoreResult<Vec<Transaction>>;

    async fn transactions_by_reference(
        &self,
        world_id: WorldId,
        reference: &str,
    ) -> StoreResult<Vec<Transaction>>;

    async fn intent(&self, intent_id: IntentId) -> StoreResult<Option<TransactionIntent>>;

    async fn intent_by_token(&self, token: &str) -> StoreResult<Option<TransactionIntent>>;

    async fn pending_intents(&self, world_id: WorldId) -> StoreResult<Vec<TransactionIntent>>;

    /// Decay events newest-first.
    async fn decay_events(
        &self,
        citizen_id: CitizenId,
        window: QueryWindow,
    ) -> StoreResult<Vec<DecayEvent>>;

    /// Apply a change set atomically.
    ///
    /// Fails with [`crate::StoreError::Guard`] when a guarded effect's
    /// precondition does not hold, and with `NotFound` when an effect targets
    /// a missing record. Nothing is applied in either case.
    async fn commit(&self, changes: ChangeSet) -> StoreResult<CommitReceipt>;
}
