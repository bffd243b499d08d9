//! Business production cycles.
//!
//! A cycle extracts from bound deposits, consumes declared inputs, credits
//! outputs and pays the operating cost. Quantities scale with the owner's
//! productivity multiplier: requirements round up, yields round down.

use crate::decay::{productivity_of, Multiplier};
use crate::engine::{recorded, BatchFailure, EconomyEngine};
use crate::error::{EconomyError, EconomyResult};
use crate::ledger::draft;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use vexium_store::{BalanceSlot, ChangeSet, Effect};
use vexium_types::{
    Business, BusinessId, CitizenId, NewTransaction, Party, ResourceDeposit, ResourceId,
    TransactionCategory, TransactionId, WorldId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuantity {
    pub resource_id: ResourceId,
    pub quantity: i64,
}

fn quantities(map: &BTreeMap<ResourceId, i64>) -> Vec<ResourceQuantity> {
    map.iter()
        .filter(|(_, quantity)| **quantity > 0)
        .map(|(resource_id, quantity)| ResourceQuantity {
            resource_id: *resource_id,
            quantity: *quantity,
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionReport {
    pub business_id: BusinessId,
    pub multiplier: Multiplier,
    pub extracted: Vec<ResourceQuantity>,
    pub consumed: Vec<ResourceQuantity>,
    /// Outputs plus extraction.
    pub produced: Vec<ResourceQuantity>,
    pub operating_cost_minor: i64,
    pub transaction_id: Option<TransactionId>,
}

/// Reason a business cannot run a cycle right now.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductionBlocker {
    BusinessInactive,
    WorldInactive,
    OwnerIncapacitated {
        owner_id: CitizenId,
        lowest_need: f64,
    },
    InsufficientFunds {
        required_minor: i64,
        available_minor: i64,
    },
    MissingInput {
        resource_id: ResourceId,
        required: i64,
        available: i64,
    },
}

impl ProductionBlocker {
    fn into_error(self, business: &Business) -> EconomyError {
        match self {
            Self::BusinessInactive => EconomyError::BusinessInactive(business.id),
            Self::WorldInactive => EconomyError::WorldInactive(business.world_id),
            Self::OwnerIncapacitated {
                owner_id,
                lowest_need,
            } => EconomyError::OwnerIncapacitated {
                owner_id,
                lowest_need,
            },
            Self::InsufficientFunds {
                required_minor,
                available_minor,
            } => EconomyError::insufficient(
                BalanceSlot::BusinessWallet(business.id),
                required_minor,
                available_minor,
            ),
            Self::MissingInput {
                resource_id,
                required,
                available,
            } => EconomyError::MissingInput {
                resource_id,
                required,
                available,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductionStatus {
    pub business_id: BusinessId,
    pub can_produce: bool,
    pub multiplier: Multiplier,
    pub blockers: Vec<ProductionBlocker>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldProductionReport {
    pub world_id: WorldId,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub reports: Vec<ProductionReport>,
    pub failures: Vec<BatchFailure>,
}

/// Everything a cycle would do, computed without touching state.
struct CyclePlan {
    business: Business,
    multiplier: Multiplier,
    blockers: Vec<ProductionBlocker>,
    extraction: Vec<(ResourceDeposit, i64)>,
    extracted: BTreeMap<ResourceId, i64>,
    required: BTreeMap<ResourceId, i64>,
    outputs: BTreeMap<ResourceId, i64>,
}

impl EconomyEngine {
    async fn plan_cycle(&self, business_id: BusinessId) -> EconomyResult<CyclePlan> {
        let business = self.load_business(business_id).await?;
        let world = self.load_world(business.world_id).await?;
        let mut blockers = Vec::new();
        if !business.is_producing() {
            blockers.push(ProductionBlocker::BusinessInactive);
        }
        if !world.active {
            blockers.push(ProductionBlocker::WorldInactive);
        }

        let productivity = productivity_of(&self.load_needs(business.owner_id).await?);
        let multiplier = productivity.multiplier;
        if !productivity.can_operate_business {
            blockers.push(ProductionBlocker::OwnerIncapacitated {
                owner_id: business.owner_id,
                lowest_need: productivity.lowest_need,
            });
        }
        if business.wallet_minor < business.operating_cost_minor {
            blockers.push(ProductionBlocker::InsufficientFunds {
                required_minor: business.operating_cost_minor,
                available_minor: business.wallet_minor,
            });
        }

        let mut extraction = Vec::new();
        let mut extracted: BTreeMap<ResourceId, i64> = BTreeMap::new();
        for deposit in self.store().deposits(business.id).await? {
            let quantity = multiplier
                .apply_floor(deposit.extraction_rate)
                .min(deposit.remaining)
                .max(0);
            if quantity > 0 {
                *extracted.entry(deposit.resource_id).or_default() += quantity;
                extraction.push((deposit, quantity));
            }
        }

        let mut available: BTreeMap<ResourceId, i64> = self
            .store()
            .inventory(business.id)
            .await?
            .into_iter()
            .map(|item| (item.resource_id, item.quantity))
            .collect();
        for (resource_id, quantity) in &extracted {
            *available.entry(*resource_id).or_default() += quantity;
        }

        let mut required: BTreeMap<ResourceId, i64> = BTreeMap::new();
        for line in &business.inputs {
            *required.entry(line.resource_id).or_default() += multiplier.apply_ceil(line.quantity);
        }
        for (resource_id, needed) in &required {
            let have = available.get(resource_id).copied().unwrap_or(0);
            if have < *needed {
                blockers.push(ProductionBlocker::MissingInput {
                    resource_id: *resource_id,
                    required: *needed,
                    available: have,
                });
            }
        }

        let mut outputs: BTreeMap<ResourceId, i64> = BTreeMap::new();
        for line in &business.outputs {
            *outputs.entry(line.resource_id).or_default() += multiplier.apply_floor(line.quantity);
        }

        Ok(CyclePlan {
            business,
            multiplier,
            blockers,
            extraction,
            extracted,
            required,
            outputs,
        })
    }

    /// Run one production cycle as a single atomic change set.
    pub async fn run_production_cycle(
        &self,
        business_id: BusinessId,
    ) -> EconomyResult<ProductionReport> {
        let plan = self.plan_cycle(business_id).await?;
        if let Some(blocker) = plan.blockers.into_iter().next() {
            let err = blocker.into_error(&plan.business);
            warn!(business_id = %business_id, code = err.code(), error = %err, "Production cycle blocked");
            return Err(err);
        }
        let business = plan.business;
        debug!(
            business_id = %business_id,
            multiplier = %plan.multiplier,
            deposits = plan.extraction.len(),
            "Production plan ready"
        );

        let mut changes = ChangeSet::new();
        for (deposit, quantity) in &plan.extraction {
            changes
                .push(Effect::ExtractDeposit {
                    deposit_id: deposit.id,
                    quantity: *quantity,
                })
                .push(Effect::AdjustInventory {
                    business_id,
                    resource_id: deposit.resource_id,
                    delta: *quantity,
                });
        }
        for (resource_id, quantity) in plan.required.iter().filter(|(_, q)| **q > 0) {
            changes.push(Effect::AdjustInventory {
                business_id,
                resource_id: *resource_id,
                delta: -quantity,
            });
        }
        for (resource_id, quantity) in plan.outputs.iter().filter(|(_, q)| **q > 0) {
            changes.push(Effect::AdjustInventory {
                business_id,
                resource_id: *resource_id,
                delta: *quantity,
            });
        }

        let operating_cost_minor = business.operating_cost_minor;
        let has_cost = operating_cost_minor > 0;
        if has_cost {
            let transaction = NewTransaction {
                sender: Some(Party::Business(business_id)),
                memo: Some("production cycle".to_string()),
                ..draft(
                    business.world_id,
                    TransactionCategory::OperatingCost,
                    operating_cost_minor,
                    self.now(),
                )
            };
            changes
                .push(Effect::Debit {
                    slot: BalanceSlot::BusinessWallet(business_id),
                    amount_minor: operating_cost_minor,
                })
                .push(Effect::RecordTransaction(transaction));
        }

        let receipt = self.commit(changes).await?;
        let transaction_id = if has_cost {
            Some(recorded(receipt)?.id)
        } else {
            None
        };

        let mut produced = plan.outputs.clone();
        for (resource_id, quantity) in &plan.extracted {
            *produced.entry(*resource_id).or_default() += quantity;
        }
        let report = ProductionReport {
            business_id,
            multiplier: plan.multiplier,
            extracted: quantities(&plan.extracted),
            consumed: quantities(&plan.required),
            produced: quantities(&produced),
            operating_cost_minor,
            transaction_id,
        };
        info!(
            business_id = %business_id,
            multiplier = %report.multiplier,
            produced = report.produced.len(),
            operating_cost_minor,
            "Production cycle committed"
        );
        Ok(report)
    }

    /// Run a cycle for every active, operating business of a world.
    pub async fn run_world_production(
        &self,
        world_id: WorldId,
    ) -> EconomyResult<WorldProductionReport> {
        let world = self.load_world(world_id).await?;
        if !world.active {
            return Err(EconomyError::WorldInactive(world_id));
        }
        let businesses: Vec<Business> = self
            .store()
            .businesses(world_id)
            .await?
            .into_iter()
            .filter(Business::is_producing)
            .collect();

        let mut report = WorldProductionReport {
            world_id,
            attempted: businesses.len(),
            succeeded: 0,
            failed: 0,
            reports: Vec::new(),
            failures: Vec::new(),
        };
        for business in businesses {
            match self.run_production_cycle(business.id).await {
                Ok(cycle) => {
                    report.succeeded += 1;
                    report.reports.push(cycle);
                }
                Err(err) => {
                    report.failed += 1;
                    report.failures.push(BatchFailure::new(business.id, &err));
                }
            }
        }
        info!(
            world_id = %world_id,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "World production finished"
        );
        Ok(report)
    }

    /// Every reason a cycle would fail now. Read-only.
    pub async fn production_status(
        &self,
        business_id: BusinessId,
    ) -> EconomyResult<ProductionStatus> {
        let plan = self.plan_cycle(business_id).await?;
        Ok(ProductionStatus {
            business_id,
            can_produce: plan.blockers.is_empty(),
            multiplier: plan.multiplier,
            blockers: plan.blockers,
        })
    }

    pub async fn world_production_status(
        &self,
        world_id: WorldId,
    ) -> EconomyResult<Vec<ProductionStatus>> {
        self.load_world(world_id).await?;
        let mut statuses = Vec::new();
        for business in self.store().businesses(world_id).await? {
            statuses.push(self.production_status(business.id).await?);
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Fixture;
    use vexium_types::{NeedKind, ProductionLine};

    async fn inventory_of(fx: &Fixture, business_id: BusinessId, resource_id: ResourceId) -> i64 {
        fx.engine
            .store()
            .inventory(business_id)
            .await
            .unwrap()
            .into_iter()
            .find(|item| item.resource_id == resource_id)
            .map(|item| item.quantity)
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn extraction_feeds_inputs_in_the_same_cycle() {
        let fx = Fixture::new().await;
        let owner = fx.citizen("miller", 0).await;
        let wheat = fx.resource("wheat").await;
        let flour = fx.resource("flour").await;
        let mill = fx.business(owner, 100, 1_000).await;
        fx.engine
            .bind_deposit(mill, wheat, 25, 10)
            .await
            .unwrap();
        fx.engine
            .set_production_plan(
                mill,
                vec![ProductionLine::new(wheat, 4)],
                vec![ProductionLine::new(flour, 2)],
            )
            .await
            .unwrap();

        let report = fx.engine.run_production_cycle(mill).await.unwrap();
        assert_eq!(report.multiplier, Multiplier::FULL);
        assert_eq!(report.operating_cost_minor, 100);
        assert!(report.transaction_id.is_some());
        assert_eq!(inventory_of(&fx, mill, wheat).await, 6);
        assert_eq!(inventory_of(&fx, mill, flour).await, 2);
        assert_eq!(fx.business_wallet(mill).await, 900);

        fx.engine.run_production_cycle(mill).await.unwrap();
        let last = fx.engine.run_production_cycle(mill).await.unwrap();
        // the deposit only had 5 left for the third cycle
        assert_eq!(
            last.extracted,
            vec![ResourceQuantity {
                resource_id: wheat,
                quantity: 5
            }]
        );
        assert_eq!(inventory_of(&fx, mill, wheat).await, 13);
    }

    #[tokio::test]
    async fn missing_input_changes_nothing() {
        let fx = Fixture::new().await;
        let owner = fx.citizen("baker", 0).await;
        let flour = fx.resource("flour").await;
        let bread = fx.resource("bread").await;
        let bakery = fx.business(owner, 50, 500).await;
        fx.engine
            .set_production_plan(
                bakery,
                vec![ProductionLine::new(flour, 1)],
                vec![ProductionLine::new(bread, 3)],
            )
            .await
            .unwrap();

        let err = fx.engine.run_production_cycle(bakery).await.unwrap_err();
        assert_eq!(err.code(), "MISSING_INPUT");
        assert_eq!(fx.business_wallet(bakery).await, 500);
        assert_eq!(inventory_of(&fx, bakery, bread).await, 0);
    }

    #[tokio::test]
    async fn hungry_owner_cannot_produce() {
        let fx = Fixture::new().await;
        let owner = fx.citizen("smith", 0).await;
        let ore = fx.resource("ore").await;
        let forge = fx.business(owner, 0, 0).await;
        fx.engine.bind_deposit(forge, ore, 100, 10).await.unwrap();
        fx.set_need(owner, NeedKind::Food, 20.0).await;

        let err = fx.engine.run_production_cycle(forge).await.unwrap_err();
        assert_eq!(err.code(), "OWNER_INCAPACITATED");
        assert_eq!(inventory_of(&fx, forge, ore).await, 0);

        let status = fx.engine.production_status(forge).await.unwrap();
        assert!(!status.can_produce);
        assert_eq!(status.multiplier, Multiplier::EXHAUSTED);
    }

    #[tokio::test]
    async fn reduced_productivity_scales_quantities() {
        let fx = Fixture::new().await;
        let owner = fx.citizen("weaver", 0).await;
        let wool = fx.resource("wool").await;
        let cloth = fx.resource("cloth").await;
        let shop = fx.business(owner, 0, 0).await;
        fx.engine.bind_deposit(shop, wool, 100, 10).await.unwrap();
        fx.engine
            .set_production_plan(
                shop,
                vec![ProductionLine::new(wool, 3)],
                vec![ProductionLine::new(cloth, 5)],
            )
            .await
            .unwrap();
        fx.set_need(owner, NeedKind::Sleep, 60.0).await;

        let report = fx.engine.run_production_cycle(shop).await.unwrap();
        assert_eq!(report.multiplier, Multiplier::REDUCED);
        assert_eq!(report.transaction_id, None);
        // extraction floor(10 * 0.9) = 9, input ceil(3 * 0.9) = 3, output floor(5 * 0.9) = 4
        assert_eq!(inventory_of(&fx, shop, wool).await, 6);
        assert_eq!(inventory_of(&fx, shop, cloth).await, 4);
    }

    #[tokio::test]
    async fn status_lists_every_blocker() {
        let fx = Fixture::new().await;
        let owner = fx.citizen("tanner", 0).await;
        let hide = fx.resource("hide").await;
        let leather = fx.resource("leather").await;
        let tannery = fx.business(owner, 300, 100).await;
        fx.engine
            .set_production_plan(
                tannery,
                vec![ProductionLine::new(hide, 2)],
                vec![ProductionLine::new(leather, 1)],
            )
            .await
            .unwrap();
        fx.engine
            .set_business_operating(tannery, false)
            .await
            .unwrap();

        let status = fx.engine.production_status(tannery).await.unwrap();
        assert_eq!(status.blockers.len(), 3);
        assert_eq!(status.blockers[0], ProductionBlocker::BusinessInactive);
        assert!(matches!(
            status.blockers[1],
            ProductionBlocker::InsufficientFunds {
                required_minor: 300,
                available_minor: 100
            }
        ));

        let err = fx.engine.run_production_cycle(tannery).await.unwrap_err();
        assert_eq!(err.code(), "BUSINESS_INACTIVE");
    }

    #[tokio::test]
    async fn world_batch_isolates_failures() {
        let fx = Fixture::new().await;
        let owner = fx.citizen("owner", 0).await;
        let ore = fx.resource("ore").await;
        let good = fx.business(owner, 10, 100).await;
        fx.engine.bind_deposit(good, ore, 50, 5).await.unwrap();
        let broke = fx.business(owner, 10, 0).await;
        let idle = fx.business(owner, 0, 0).await;
        fx.engine.set_business_operating(idle, false).await.unwrap();

        let report = fx.engine.run_world_production(fx.world_id).await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].entity_id, broke.to_string());
        assert_eq!(report.failures[0].code, "INSUFFICIENT_FUNDS");
        assert_eq!(inventory_of(&fx, good, ore).await, 5);

        let statuses = fx.engine.world_production_status(fx.world_id).await.unwrap();
        assert_eq!(statuses.len(), 3);
    }
}
