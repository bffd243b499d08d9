//! Shared setup for the unit tests: one world on an in-memory store with a
//! hand-driven clock.

use crate::admin::NewWorld;
use crate::clock::ManualClock;
use crate::config::EngineConfig;
use crate::engine::EconomyEngine;
use std::sync::Arc;
use vexium_store::{ChangeSet, Effect, EconomyStore, InMemoryEconomyStore};
use vexium_types::{
    AccountRef, BusinessId, CitizenId, NeedKind, ResourceId, SurvivalNeeds, UserId, WorldId,
};

pub(crate) const TREASURY_SEED_MINOR: i64 = 1_000_000;

pub(crate) struct Fixture {
    pub store: Arc<dyn EconomyStore>,
    pub clock: Arc<ManualClock>,
    pub engine: EconomyEngine,
    pub owner: UserId,
    pub world_id: WorldId,
}

impl Fixture {
    pub async fn new() -> Self {
        let store: Arc<dyn EconomyStore> = Arc::new(InMemoryEconomyStore::new());
        let clock = Arc::new(ManualClock::default());
        let engine = EconomyEngine::new(store.clone()).with_clock(clock.clone());
        let owner = UserId::new("owner");
        let world = engine
            .create_world(
                NewWorld::new("Testland", owner.clone()).with_treasury_balance(TREASURY_SEED_MINOR),
            )
            .await
            .unwrap();
        Self {
            store,
            clock,
            engine,
            owner,
            world_id: world.id,
        }
    }

    /// Same store and clock, with `user` configured as protocol admin.
    pub fn engine_with_admin(&self, user: &str) -> EconomyEngine {
        EconomyEngine::with_config(
            self.store.clone(),
            EngineConfig::default().with_protocol_admin(UserId::new(user)),
        )
        .with_clock(self.clock.clone())
    }

    pub async fn citizen(&self, user: &str, wallet_minor: i64) -> CitizenId {
        let citizen = self
            .engine
            .join_world(self.world_id, &UserId::new(user), user)
            .await
            .unwrap();
        if wallet_minor > 0 {
            self.engine
                .deposit(AccountRef::Citizen(citizen.id), wallet_minor)
                .await
                .unwrap();
        }
        citizen.id
    }

    pub async fn business(
        &self,
        owner: CitizenId,
        operating_cost_minor: i64,
        wallet_minor: i64,
    ) -> BusinessId {
        let business = self
            .engine
            .register_business(self.world_id, owner, "Workshop", operating_cost_minor, 10)
            .await
            .unwrap();
        if wallet_minor > 0 {
            self.engine
                .deposit(AccountRef::Business(business.id), wallet_minor)
                .await
                .unwrap();
        }
        business.id
    }

    pub async fn resource(&self, name: &str) -> ResourceId {
        self.engine
            .register_resource(self.world_id, name, "raw", 10)
            .await
            .unwrap()
            .id
    }

    pub async fn wallet(&self, citizen_id: CitizenId) -> i64 {
        self.engine
            .balance(AccountRef::Citizen(citizen_id))
            .await
            .unwrap()
            .wallet_minor
    }

    pub async fn business_wallet(&self, business_id: BusinessId) -> i64 {
        self.engine
            .balance(AccountRef::Business(business_id))
            .await
            .unwrap()
            .wallet_minor
    }

    pub async fn treasury_balance(&self) -> i64 {
        self.engine
            .balance(AccountRef::Treasury(self.world_id))
            .await
            .unwrap()
            .wallet_minor
    }

    pub async fn needs(&self, citizen_id: CitizenId) -> SurvivalNeeds {
        self.store.survival_needs(citizen_id).await.unwrap().unwrap()
    }

    /// Force one gauge to `value`.
    pub async fn set_need(&self, citizen_id: CitizenId, need: NeedKind, value: f64) {
        let current = self.needs(citizen_id).await.get(need);
        self.store
            .commit(ChangeSet::new().with(Effect::AdjustNeed {
                citizen_id,
                need,
                delta: value - current,
            }))
            .await
            .unwrap();
    }
}
