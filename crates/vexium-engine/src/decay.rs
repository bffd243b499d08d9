//! Survival gauges: decay ticks, replenishment and the productivity tiers
//! derived from the weakest gauge.

use crate::engine::{recorded, BatchFailure, EconomyEngine};
use crate::error::{EconomyError, EconomyResult};
use crate::ledger::draft;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};
use vexium_store::{BalanceSlot, ChangeSet, Effect};
use vexium_types::{
    clamp_need, Citizen, CitizenId, DecayConfig, DecayEvent, DecayEventId, NeedKind,
    NewTransaction, Party, ReplenishPricing, SurvivalNeeds, TransactionCategory, TransactionId,
    WorldId, NEED_MAX,
};

const PER_MILLE: i64 = 1_000;

/// Fixed-point output multiplier in thousandths (`1000` = 1.0).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const FULL: Multiplier = Multiplier(1_000);
    pub const REDUCED: Multiplier = Multiplier(900);
    pub const STRAINED: Multiplier = Multiplier(750);
    pub const EXHAUSTED: Multiplier = Multiplier(500);

    pub fn per_mille(self) -> u32 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / PER_MILLE as f64
    }

    /// `floor(quantity * multiplier)`; used for outputs and extraction.
    pub fn apply_floor(self, quantity: i64) -> i64 {
        let scaled = i128::from(quantity) * i128::from(self.0);
        scaled.div_euclid(i128::from(PER_MILLE)) as i64
    }

    /// `ceil(quantity * multiplier)`; used for input requirements.
    pub fn apply_ceil(self, quantity: i64) -> i64 {
        let scaled = i128::from(quantity) * i128::from(self.0);
        let per_mille = i128::from(PER_MILLE);
        (-((-scaled).div_euclid(per_mille))) as i64
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_f64())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Productivity {
    pub multiplier: Multiplier,
    pub can_operate_business: bool,
    pub can_work: bool,
    pub lowest_need: f64,
}

/// Tiered on the weakest of the three gauges.
pub fn productivity_multiplier(food: f64, water: f64, sleep: f64) -> Productivity {
    let lowest_need = clamp_need(food.min(water).min(sleep));
    let (multiplier, can_operate_business, can_work) = if lowest_need >= 75.0 {
        (Multiplier::FULL, true, true)
    } else if lowest_need >= 50.0 {
        (Multiplier::REDUCED, true, true)
    } else if lowest_need >= 25.0 {
        (Multiplier::STRAINED, false, true)
    } else {
        (Multiplier::EXHAUSTED, false, false)
    };
    Productivity {
        multiplier,
        can_operate_business,
        can_work,
        lowest_need,
    }
}

pub fn productivity_of(needs: &SurvivalNeeds) -> Productivity {
    productivity_multiplier(needs.food, needs.water, needs.sleep)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NeedStatus {
    Healthy,
    Warning,
    Critical,
}

impl NeedStatus {
    pub fn classify(lowest_need: f64) -> Self {
        if lowest_need <= 24.0 {
            Self::Critical
        } else if lowest_need <= 49.0 {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

/// Per-tick decrement of one gauge.
pub fn decay_amount(config: &DecayConfig, need: NeedKind) -> f64 {
    let factor = match need {
        NeedKind::Food => config.food_factor,
        NeedKind::Water => config.water_factor,
        NeedKind::Sleep => config.sleep_factor,
    };
    (config.base_rate * factor).max(0.0)
}

fn unit_price(pricing: &ReplenishPricing, need: NeedKind) -> i64 {
    match need {
        NeedKind::Food => pricing.food_minor_per_unit,
        NeedKind::Water => pricing.water_minor_per_unit,
        NeedKind::Sleep => pricing.sleep_minor_per_unit,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CitizenDecay {
    pub citizen_id: CitizenId,
    pub food: f64,
    pub water: f64,
    pub sleep: f64,
    pub status: NeedStatus,
    pub multiplier: Multiplier,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecayReport {
    pub world_id: WorldId,
    pub processed: usize,
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    pub citizens: Vec<CitizenDecay>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplenishReceipt {
    pub citizen_id: CitizenId,
    pub need: NeedKind,
    pub before: f64,
    pub after: f64,
    pub applied: f64,
    pub cost_minor: i64,
    pub transaction_id: Option<TransactionId>,
}

impl EconomyEngine {
    /// One decay tick over every active citizen of the world.
    pub async fn process_decay(&self, world_id: WorldId) -> EconomyResult<DecayReport> {
        let world = self.load_world(world_id).await?;
        if !world.active {
            return Err(EconomyError::WorldInactive(world_id));
        }
        let citizens = self.store().citizens(world_id).await?;

        let mut report = DecayReport {
            world_id,
            processed: 0,
            healthy: 0,
            warning: 0,
            critical: 0,
            citizens: Vec::new(),
            failures: Vec::new(),
        };
        for citizen in citizens.iter().filter(|citizen| citizen.active) {
            match self.decay_citizen(citizen, &world.decay).await {
                Ok(detail) => {
                    report.processed += 1;
                    match detail.status {
                        NeedStatus::Healthy => report.healthy += 1,
                        NeedStatus::Warning => report.warning += 1,
                        NeedStatus::Critical => report.critical += 1,
                    }
                    report.citizens.push(detail);
                }
                Err(err) => {
                    warn!(citizen_id = %citizen.id, code = err.code(), error = %err, "Decay failed for citizen");
                    report.failures.push(BatchFailure::new(citizen.id, &err));
                }
            }
        }
        info!(
            world_id = %world_id,
            processed = report.processed,
            warning = report.warning,
            critical = report.critical,
            failed = report.failures.len(),
            "Decay tick finished"
        );
        Ok(report)
    }

    async fn decay_citizen(
        &self,
        citizen: &Citizen,
        config: &DecayConfig,
    ) -> EconomyResult<CitizenDecay> {
        let mut needs = self.load_needs(citizen.id).await?;
        let now = self.now();
        let mut changes = ChangeSet::new();
        for need in NeedKind::ALL {
            let before = needs.get(need);
            let delta = -decay_amount(config, need);
            let after = needs.adjust(need, delta);
            if after != before {
                changes
                    .push(Effect::AdjustNeed {
                        citizen_id: citizen.id,
                        need,
                        delta,
                    })
                    .push(Effect::RecordDecayEvent(DecayEvent {
                        id: DecayEventId::generate(),
                        world_id: citizen.world_id,
                        citizen_id: citizen.id,
                        need,
                        before,
                        after,
                        occurred_at: now,
                    }));
            }
        }
        changes.push(Effect::TouchDecay {
            citizen_id: citizen.id,
            at: now,
        });
        self.commit(changes).await?;

        let productivity = productivity_of(&needs);
        let status = NeedStatus::classify(productivity.lowest_need);
        debug!(
            citizen_id = %citizen.id,
            food = needs.food,
            water = needs.water,
            sleep = needs.sleep,
            status = ?status,
            "Citizen decayed"
        );
        Ok(CitizenDecay {
            citizen_id: citizen.id,
            food: needs.food,
            water: needs.water,
            sleep: needs.sleep,
            status,
            multiplier: productivity.multiplier,
        })
    }

    /// Buy back gauge points at the world's price.
    pub async fn replenish_need(
        &self,
        citizen_id: CitizenId,
        need: NeedKind,
        amount: f64,
    ) -> EconomyResult<ReplenishReceipt> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(EconomyError::InvalidAmount(format!(
                "replenish amount must be positive and finite, got {amount}"
            )));
        }
        let citizen = self.load_citizen(citizen_id).await?;
        let world = self.load_world(citizen.world_id).await?;
        let needs = self.load_needs(citizen_id).await?;

        let before = needs.get(need);
        let applied = amount.min(NEED_MAX - before).max(0.0);
        if applied <= 0.0 {
            return Ok(ReplenishReceipt {
                citizen_id,
                need,
                before,
                after: before,
                applied: 0.0,
                cost_minor: 0,
                transaction_id: None,
            });
        }

        let cost_minor = (applied * unit_price(&world.pricing, need) as f64).round() as i64;
        let mut changes = ChangeSet::new().with(Effect::RaiseNeed {
            citizen_id,
            need,
            amount: applied,
        });
        let mut transaction_id = None;
        if cost_minor > 0 {
            let slot = BalanceSlot::CitizenWallet(citizen_id);
            self.ensure_funds(slot, cost_minor).await?;
            let transaction = NewTransaction {
                sender: Some(Party::Citizen(citizen_id)),
                memo: Some(format!("replenish {need}")),
                ..draft(
                    world.id,
                    TransactionCategory::Payment,
                    cost_minor,
                    self.now(),
                )
            };
            changes
                .push(Effect::Debit {
                    slot,
                    amount_minor: cost_minor,
                })
                .push(Effect::RecordTransaction(transaction));
            transaction_id = Some(recorded(self.commit(changes).await?)?.id);
        } else {
            self.commit(changes).await?;
        }

        let after = clamp_need(before + applied);
        info!(
            citizen_id = %citizen_id,
            need = %need,
            applied,
            cost_minor,
            "Need replenished"
        );
        Ok(ReplenishReceipt {
            citizen_id,
            need,
            before,
            after,
            applied,
            cost_minor,
            transaction_id,
        })
    }

    /// Current productivity of a citizen.
    pub async fn productivity(&self, citizen_id: CitizenId) -> EconomyResult<Productivity> {
        Ok(productivity_of(&self.load_needs(citizen_id).await?))
    }
}
