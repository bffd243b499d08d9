//! Two engine operations racing between their reads and their commit.
//!
//! `YieldingStore` hands control back to the runtime after every read, so
//! `tokio::join!` on a current-thread runtime runs both operations' reads
//! before either commits. Only the commit-time guards keep the state sound.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vexium_engine::{EconomyEngine, IntentRequest, LoanTerms, ManualClock, NewWorld, WorldSettings};
use vexium_store::{
    ChangeSet, CommitReceipt, EconomyStore, Effect, InMemoryEconomyStore, QueryWindow, StoreError,
    StoreResult,
};
use vexium_types::{
    AccountRef, Business, BusinessId, Citizen, CitizenId, DecayEvent, IntentId, IntentStatus,
    InventoryItem, Loan, LoanId, LoanStatus, NeedKind, Region, Resource, ResourceDeposit,
    ResourceId, SurvivalNeeds, Transaction, TransactionCategory, TransactionId,
    TransactionIntent, Treasury, UserId, World, WorldId,
};

#[derive(Default)]
struct YieldingStore {
    inner: InMemoryEconomyStore,
    reject_cancellations: AtomicBool,
}

impl YieldingStore {
    async fn after<T>(&self, value: StoreResult<T>) -> StoreResult<T> {
        tokio::task::yield_now().await;
        value
    }
}

fn cancels_intent(changes: &ChangeSet) -> bool {
    changes.effects().iter().any(|effect| {
        matches!(
            effect,
            Effect::TransitionIntent {
                to: IntentStatus::Cancelled,
                ..
            }
        )
    })
}

#[async_trait]
impl EconomyStore for YieldingStore {
    async fn world(&self, world_id: WorldId) -> StoreResult<Option<World>> {
        self.after(self.inner.world(world_id).await).await
    }

    async fn worlds(&self) -> StoreResult<Vec<World>> {
        self.after(self.inner.worlds().await).await
    }

    async fn treasury(&self, world_id: WorldId) -> StoreResult<Option<Treasury>> {
        self.after(self.inner.treasury(world_id).await).await
    }

    async fn regions(&self, world_id: WorldId) -> StoreResult<Vec<Region>> {
        self.after(self.inner.regions(world_id).await).await
    }

    async fn citizen(&self, citizen_id: CitizenId) -> StoreResult<Option<Citizen>> {
        self.after(self.inner.citizen(citizen_id).await).await
    }

    async fn citizen_by_user(
        &self,
        world_id: WorldId,
        user_id: &UserId,
    ) -> StoreResult<Option<Citizen>> {
        self.after(self.inner.citizen_by_user(world_id, user_id).await)
            .await
    }

    async fn citizens(&self, world_id: WorldId) -> StoreResult<Vec<Citizen>> {
        self.after(self.inner.citizens(world_id).await).await
    }

    async fn survival_needs(&self, citizen_id: CitizenId) -> StoreResult<Option<SurvivalNeeds>> {
        self.after(self.inner.survival_needs(citizen_id).await).await
    }

    async fn business(&self, business_id: BusinessId) -> StoreResult<Option<Business>> {
        self.after(self.inner.business(business_id).await).await
    }

    async fn businesses(&self, world_id: WorldId) -> StoreResult<Vec<Business>> {
        self.after(self.inner.businesses(world_id).await).await
    }

    async fn resource(&self, resource_id: ResourceId) -> StoreResult<Option<Resource>> {
        self.after(self.inner.resource(resource_id).await).await
    }

    async fn resources(&self, world_id: WorldId) -> StoreResult<Vec<Resource>> {
        self.after(self.inner.resources(world_id).await).await
    }

    async fn deposits(&self, business_id: BusinessId) -> StoreResult<Vec<ResourceDeposit>> {
        self.after(self.inner.deposits(business_id).await).await
    }

    async fn inventory(&self, business_id: BusinessId) -> StoreResult<Vec<InventoryItem>> {
        self.after(self.inner.inventory(business_id).await).await
    }

    async fn loan(&self, loan_id: LoanId) -> StoreResult<Option<Loan>> {
        self.after(self.inner.loan(loan_id).await).await
    }

    async fn loans(&self, world_id: WorldId) -> StoreResult<Vec<Loan>> {
        self.after(self.inner.loans(world_id).await).await
    }

    async fn transaction(&self, transaction_id: TransactionId) -> StoreResult<Option<Transaction>> {
        self.after(self.inner.transaction(transaction_id).await).await
    }

    async fn transactions(
        &self,
        world_id: WorldId,
        window: QueryWindow,
    ) -> StoreResult<Vec<Transaction>> {
        self.after(self.inner.transactions(world_id, window).await)
            .await
    }

    async fn transaction_chain(&self, world_id: WorldId) -> StoreResult<Vec<Transaction>> {
        self.after(self.inner.transaction_chain(world_id).await).await
    }

    async fn transactions_by_reference(
        &self,
        world_id: WorldId,
        reference: &str,
    ) -> StoreResult<Vec<Transaction>> {
        self.after(self.inner.transactions_by_reference(world_id, reference).await)
            .await
    }

    async fn intent(&self, intent_id: IntentId) -> StoreResult<Option<TransactionIntent>> {
        self.after(self.inner.intent(intent_id).await).await
    }

    async fn intent_by_token(&self, token: &str) -> StoreResult<Option<TransactionIntent>> {
        self.after(self.inner.intent_by_token(token).await).await
    }

    async fn pending_intents(&self, world_id: WorldId) -> StoreResult<Vec<TransactionIntent>> {
        self.after(self.inner.pending_intents(world_id).await).await
    }

    async fn decay_events(
        &self,
        citizen_id: CitizenId,
        window: QueryWindow,
    ) -> StoreResult<Vec<DecayEvent>> {
        self.after(self.inner.decay_events(citizen_id, window).await)
            .await
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<CommitReceipt> {
        if self.reject_cancellations.load(Ordering::SeqCst) && cancels_intent(&changes) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.commit(changes).await
    }
}

struct Race {
    store: Arc<YieldingStore>,
    engine: EconomyEngine,
    owner: UserId,
    world_id: WorldId,
}

impl Race {
    async fn new() -> Self {
        let store = Arc::new(YieldingStore::default());
        let shared: Arc<dyn EconomyStore> = store.clone();
        let engine = EconomyEngine::new(shared).with_clock(Arc::new(ManualClock::new(Utc::now())));
        let owner = UserId::new("founder");
        let world = engine
            .create_world(NewWorld::new("Tidewater", owner.clone()).with_treasury_balance(100_000))
            .await
            .expect("world");
        Self {
            store,
            engine,
            owner,
            world_id: world.id,
        }
    }

    async fn citizen(&self, user: &str, wallet_minor: i64) -> CitizenId {
        let citizen = self
            .engine
            .join_world(self.world_id, &UserId::new(user), user)
            .await
            .expect("join");
        if wallet_minor > 0 {
            self.engine
                .deposit(AccountRef::Citizen(citizen.id), wallet_minor)
                .await
                .expect("deposit");
        }
        citizen.id
    }

    async fn wallet(&self, citizen_id: CitizenId) -> i64 {
        self.engine
            .balance(AccountRef::Citizen(citizen_id))
            .await
            .expect("balance")
            .wallet_minor
    }
}

#[tokio::test]
async fn racing_loan_payments_never_leave_a_repaid_loan_active() {
    let race = Race::new().await;
    let borrower = race.citizen("borrower", 0).await;
    let issued = race
        .engine
        .issue_loan(
            race.world_id,
            borrower,
            LoanTerms {
                principal_minor: 3_000,
                interest_rate_bps: 0,
                term_months: 3,
            },
        )
        .await
        .expect("loan");
    let loan_id = issued.loan.id;
    race.engine
        .process_loan_payment(loan_id)
        .await
        .expect("first installment");

    let (second, third) = tokio::join!(
        race.engine.process_loan_payment(loan_id),
        race.engine.process_loan_payment(loan_id),
    );
    let outcomes = [second, third];
    let collected = outcomes.iter().filter(|outcome| outcome.is_ok()).count() as i64;
    assert_eq!(collected, 1);
    let rejected = outcomes
        .iter()
        .find_map(|outcome| outcome.as_ref().err())
        .expect("one payment loses the race");
    assert_eq!(rejected.code(), "CONFLICT");

    let loan = race.store.loan(loan_id).await.unwrap().unwrap();
    assert_eq!(loan.amount_paid_minor, 1_000 + collected * 1_000);
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(race.wallet(borrower).await, 3_000 - loan.amount_paid_minor);

    let last = race
        .engine
        .process_loan_payment(loan_id)
        .await
        .expect("final installment");
    assert_eq!(last.status, LoanStatus::PaidOff);
    let loan = race.store.loan(loan_id).await.unwrap().unwrap();
    assert_eq!(loan.amount_paid_minor, loan.total_owed_minor());
    assert_eq!(loan.status, LoanStatus::PaidOff);
}

#[tokio::test]
async fn racing_replenishments_charge_only_for_absorbed_points() {
    let race = Race::new().await;
    let alice = race.citizen("alice", 10_000).await;
    for _ in 0..2 {
        race.engine.process_decay(race.world_id).await.expect("decay");
    }

    let (first, second) = tokio::join!(
        race.engine.replenish_need(alice, NeedKind::Food, 10.0),
        race.engine.replenish_need(alice, NeedKind::Food, 10.0),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    let rejected = outcomes
        .iter()
        .find_map(|outcome| outcome.as_ref().err())
        .expect("one replenishment loses the race");
    assert_eq!(rejected.code(), "CONFLICT");

    let needs = race.store.survival_needs(alice).await.unwrap().unwrap();
    assert_eq!(needs.food, 100.0);
    assert_eq!(race.wallet(alice).await, 8_000);
}

#[tokio::test]
async fn racing_withdrawals_cannot_overdraw() {
    let race = Race::new().await;
    let alice = race.citizen("alice", 1_000).await;

    let (first, second) = tokio::join!(
        race.engine.withdraw(AccountRef::Citizen(alice), 600),
        race.engine.withdraw(AccountRef::Citizen(alice), 600),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    let rejected = outcomes
        .iter()
        .find_map(|outcome| outcome.as_ref().err())
        .expect("one withdrawal loses the race");
    assert_eq!(rejected.code(), "INSUFFICIENT_FUNDS");
    assert_eq!(race.wallet(alice).await, 400);
}

#[tokio::test]
async fn concurrent_world_updates_both_land() {
    let race = Race::new().await;

    let (status, settings) = tokio::join!(
        race.engine.set_world_active(&race.owner, race.world_id, false),
        race.engine.update_world_settings(
            &race.owner,
            race.world_id,
            WorldSettings {
                currency_name: Some("Pearl".to_string()),
                ..WorldSettings::default()
            },
        ),
    );
    status.expect("status change");
    settings.expect("settings change");

    let world = race.store.world(race.world_id).await.unwrap().unwrap();
    assert!(!world.active);
    assert_eq!(world.currency_name, "Pearl");
}

#[tokio::test]
async fn failed_cancellation_keeps_the_transfer_error() {
    let race = Race::new().await;
    let payer = race.citizen("payer", 100).await;
    let payee = race.citizen("payee", 0).await;
    let intent = race
        .engine
        .create_intent(IntentRequest {
            world_id: race.world_id,
            amount_minor: 80,
            category: TransactionCategory::Payment,
            sender: AccountRef::Citizen(payer),
            receiver: AccountRef::Citizen(payee),
            apply_tax: false,
            memo: None,
        })
        .await
        .expect("intent");
    race.engine
        .withdraw(AccountRef::Citizen(payer), 50)
        .await
        .expect("withdraw");
    race.store.reject_cancellations.store(true, Ordering::SeqCst);

    let err = race
        .engine
        .confirm_intent(&intent.token, &UserId::new("payer"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");

    let stored = race.store.intent(intent.id).await.unwrap().unwrap();
    assert_eq!(stored.status, IntentStatus::Confirmed);
    assert_eq!(race.wallet(payee).await, 0);
}
