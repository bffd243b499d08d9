//! In-memory reference implementation of [`EconomyStore`].
//!
//! A commit clones the whole state, applies every effect to the clone and swaps
//! it in only when all effects succeed. Deterministic and test-friendly;
//! production deployments use the PostgreSQL backend.

use crate::effect::{BalanceSlot, ChangeSet, CommitReceipt, Effect, NEED_TOLERANCE};
use crate::error::GuardViolation;
use crate::traits::{EconomyStore, QueryWindow};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use vexium_types::{
    Business, BusinessId, Citizen, CitizenId, DecayEvent, DepositId, IntentId, InventoryItem,
    Loan, LoanId, LoanStatus, Region, RegionId, Resource, ResourceDeposit, ResourceId,
    SurvivalNeeds, Transaction, TransactionId, TransactionIntent, Treasury, UserId, World,
    WorldId, NEED_MAX,
};

#[derive(Clone, Default)]
struct MemoryState {
    worlds: HashMap<WorldId, World>,
    treasuries: HashMap<WorldId, Treasury>,
    regions: HashMap<RegionId, Region>,
    citizens: HashMap<CitizenId, Citizen>,
    needs: HashMap<CitizenId, SurvivalNeeds>,
    resources: HashMap<ResourceId, Resource>,
    businesses: HashMap<BusinessId, Business>,
    deposits: HashMap<DepositId, ResourceDeposit>,
    inventory: BTreeMap<(BusinessId, ResourceId), i64>,
    chains: HashMap<WorldId, Vec<Transaction>>,
    loans: HashMap<LoanId, Loan>,
    intents: HashMap<IntentId, TransactionIntent>,
    decay_events: HashMap<CitizenId, Vec<DecayEvent>>,
}

/// In-memory economy store.
#[derive(Default)]
pub struct InMemoryEconomyStore {
    state: RwLock<MemoryState>,
}

impl InMemoryEconomyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> StoreResult<T> {
        let guard = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("economy state lock poisoned".to_string()))?;
        Ok(f(&guard))
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> StoreError {
    StoreError::NotFound(format!("{what} {id}"))
}

fn non_negative(amount: i64, what: &str) -> StoreResult<()> {
    if amount < 0 {
        return Err(StoreError::InvalidInput(format!(
            "{what} must be non-negative, got {amount}"
        )));
    }
    Ok(())
}

impl MemoryState {
    fn slot_mut(&mut self, slot: BalanceSlot) -> StoreResult<&mut i64> {
        match slot {
            BalanceSlot::CitizenWallet(id) => self
                .citizens
                .get_mut(&id)
                .map(|citizen| &mut citizen.wallet_minor)
                .ok_or_else(|| not_found("citizen", id)),
            BalanceSlot::CitizenBank(id) => self
                .citizens
                .get_mut(&id)
                .map(|citizen| &mut citizen.bank_minor)
                .ok_or_else(|| not_found("citizen", id)),
            BalanceSlot::BusinessWallet(id) => self
                .businesses
                .get_mut(&id)
                .map(|business| &mut business.wallet_minor)
                .ok_or_else(|| not_found("business", id)),
            BalanceSlot::Treasury(id) => self
                .treasuries
                .get_mut(&id)
                .map(|treasury| &mut treasury.balance_minor)
                .ok_or_else(|| not_found("treasury of world", id)),
        }
    }

    fn apply(&mut self, effect: Effect, receipt: &mut CommitReceipt) -> StoreResult<()> {
        match effect {
            Effect::CreateWorld { world, treasury } => {
                if self.worlds.contains_key(&world.id) {
                    return Err(StoreError::Conflict(format!(
                        "world {} already exists",
                        world.id
                    )));
                }
                self.treasuries.insert(world.id, treasury);
                self.worlds.insert(world.id, world);
            }
            Effect::UpdateWorldSettings {
                world_id,
                currency_name,
                currency_symbol,
                tax,
                decay,
                pricing,
                starting_balance_minor,
            } => {
                let world = self
                    .worlds
                    .get_mut(&world_id)
                    .ok_or_else(|| not_found("world", world_id))?;
                if let Some(name) = currency_name {
                    world.currency_name = name;
                }
                if let Some(symbol) = currency_symbol {
                    world.currency_symbol = symbol;
                }
                if let Some(tax) = tax {
                    world.tax = tax;
                }
                if let Some(decay) = decay {
                    world.decay = decay;
                }
                if let Some(pricing) = pricing {
                    world.pricing = pricing;
                }
                if let Some(amount) = starting_balance_minor {
                    world.starting_balance_minor = amount;
                }
            }
            Effect::SetWorldActive { world_id, active } => {
                self.worlds
                    .get_mut(&world_id)
                    .ok_or_else(|| not_found("world", world_id))?
                    .active = active;
            }
            Effect::CreateRegion(region) => {
                if !self.worlds.contains_key(&region.world_id) {
                    return Err(not_found("world", region.world_id));
                }
                if self.regions.contains_key(&region.id) {
                    return Err(StoreError::Conflict(format!(
                        "region {} already exists",
                        region.id
                    )));
                }
                self.regions.insert(region.id, region);
            }
            Effect::SetRegionMayor { region_id, mayor } => {
                let region = self
                    .regions
                    .get_mut(&region_id)
                    .ok_or_else(|| not_found("region", region_id))?;
                region.mayor = mayor;
            }
            Effect::CreateCitizen { citizen, needs } => {
                if !self.worlds.contains_key(&citizen.world_id) {
                    return Err(not_found("world", citizen.world_id));
                }
                let taken = self.citizens.values().any(|existing| {
                    existing.id == citizen.id
                        || (existing.world_id == citizen.world_id
                            && existing.user_id == citizen.user_id)
                });
                if taken {
                    return Err(StoreError::Conflict(format!(
                        "user {} already has a citizen in world {}",
                        citizen.user_id, citizen.world_id
                    )));
                }
                self.needs.insert(citizen.id, needs);
                self.citizens.insert(citizen.id, citizen);
            }
            Effect::SetCitizenActive { citizen_id, active } => {
                let citizen = self
                    .citizens
                    .get_mut(&citizen_id)
                    .ok_or_else(|| not_found("citizen", citizen_id))?;
                citizen.active = active;
            }
            Effect::CreateResource(resource) => {
                if !self.worlds.contains_key(&resource.world_id) {
                    return Err(not_found("world", resource.world_id));
                }
                let taken = self.resources.values().any(|existing| {
                    existing.id == resource.id
                        || (existing.world_id == resource.world_id
                            && existing.name == resource.name)
                });
                if taken {
                    return Err(StoreError::Conflict(format!(
                        "resource {} already registered in world {}",
                        resource.name, resource.world_id
                    )));
                }
                self.resources.insert(resource.id, resource);
            }
            Effect::CreateBusiness(business) => {
                if !self.citizens.contains_key(&business.owner_id) {
                    return Err(not_found("citizen", business.owner_id));
                }
                if self.businesses.contains_key(&business.id) {
                    return Err(StoreError::Conflict(format!(
                        "business {} already exists",
                        business.id
                    )));
                }
                self.businesses.insert(business.id, business);
            }
            Effect::SetBusinessOperating {
                business_id,
                operating,
            } => {
                let business = self
                    .businesses
                    .get_mut(&business_id)
                    .ok_or_else(|| not_found("business", business_id))?;
                business.operating = operating;
            }
            Effect::SetProductionPlan {
                business_id,
                inputs,
                outputs,
            } => {
                let business = self
                    .businesses
                    .get_mut(&business_id)
                    .ok_or_else(|| not_found("business", business_id))?;
                business.inputs = inputs;
                business.outputs = outputs;
            }
            Effect::CreateDeposit(deposit) => {
                if !self.businesses.contains_key(&deposit.business_id) {
                    return Err(not_found("business", deposit.business_id));
                }
                if !self.resources.contains_key(&deposit.resource_id) {
                    return Err(not_found("resource", deposit.resource_id));
                }
                if self.deposits.contains_key(&deposit.id) {
                    return Err(StoreError::Conflict(format!(
                        "deposit {} already exists",
                        deposit.id
                    )));
                }
                self.deposits.insert(deposit.id, deposit);
            }
            Effect::Debit { slot, amount_minor } => {
                non_negative(amount_minor, "debit")?;
                let balance = self.slot_mut(slot)?;
                if *balance < amount_minor {
                    return Err(GuardViolation::InsufficientBalance {
                        slot,
                        required_minor: amount_minor,
                        available_minor: *balance,
                    }
                    .into());
                }
                *balance -= amount_minor;
            }
            Effect::Credit { slot, amount_minor } => {
                non_negative(amount_minor, "credit")?;
                let balance = self.slot_mut(slot)?;
                *balance = balance.checked_add(amount_minor).ok_or_else(|| {
                    StoreError::InvalidInput(format!("credit overflows {slot}"))
                })?;
            }
            Effect::BumpTreasuryCounter {
                world_id,
                counter,
                amount_minor,
            } => {
                let treasury = self
                    .treasuries
                    .get_mut(&world_id)
                    .ok_or_else(|| not_found("treasury of world", world_id))?;
                *treasury.counter_mut(counter) += amount_minor;
            }
            Effect::AdjustInventory {
                business_id,
                resource_id,
                delta,
            } => {
                if !self.businesses.contains_key(&business_id) {
                    return Err(not_found("business", business_id));
                }
                let available = self
                    .inventory
                    .get(&(business_id, resource_id))
                    .copied()
                    .unwrap_or(0);
                if available + delta < 0 {
                    return Err(GuardViolation::InsufficientInventory {
                        business_id,
                        resource_id,
                        required: -delta,
                        available,
                    }
                    .into());
                }
                self.inventory
                    .insert((business_id, resource_id), available + delta);
            }
            Effect::ExtractDeposit {
                deposit_id,
                quantity,
            } => {
                non_negative(quantity, "extraction")?;
                let deposit = self
                    .deposits
                    .get_mut(&deposit_id)
                    .ok_or_else(|| not_found("deposit", deposit_id))?;
                if deposit.remaining < quantity {
                    return Err(GuardViolation::DepositDepleted {
                        deposit_id,
                        requested: quantity,
                        remaining: deposit.remaining,
                    }
                    .into());
                }
                deposit.remaining -= quantity;
            }
            Effect::AdjustNeed {
                citizen_id,
                need,
                delta,
            } => {
                let needs = self
                    .needs
                    .get_mut(&citizen_id)
                    .ok_or_else(|| not_found("survival needs of citizen", citizen_id))?;
                needs.adjust(need, delta);
            }
            Effect::RaiseNeed {
                citizen_id,
                need,
                amount,
            } => {
                let needs = self
                    .needs
                    .get_mut(&citizen_id)
                    .ok_or_else(|| not_found("survival needs of citizen", citizen_id))?;
                if needs.get(need) + amount > NEED_MAX + NEED_TOLERANCE {
                    return Err(GuardViolation::NeedSaturated { citizen_id, need }.into());
                }
                needs.adjust(need, amount);
            }
            Effect::TouchDecay { citizen_id, at } => {
                let needs = self
                    .needs
                    .get_mut(&citizen_id)
                    .ok_or_else(|| not_found("survival needs of citizen", citizen_id))?;
                needs.last_decay_at = at;
            }
            Effect::RecordDecayEvent(event) => {
                self.decay_events
                    .entry(event.citizen_id)
                    .or_default()
                    .push(event);
            }
            Effect::RecordTransaction(new) => {
                if !self.worlds.contains_key(&new.world_id) {
                    return Err(not_found("world", new.world_id));
                }
                let chain = self.chains.entry(new.world_id).or_default();
                if chain.iter().any(|tx| tx.id == new.id) {
                    return Err(StoreError::Conflict(format!(
                        "transaction {} already recorded",
                        new.id
                    )));
                }
                let tx = Transaction::chain(new, chain.last());
                chain.push(tx.clone());
                receipt.transactions.push(tx);
            }
            Effect::CreateLoan(loan) => {
                if !self.citizens.contains_key(&loan.borrower_id) {
                    return Err(not_found("citizen", loan.borrower_id));
                }
                if self.loans.contains_key(&loan.id) {
                    return Err(StoreError::Conflict(format!(
                        "loan {} already exists",
                        loan.id
                    )));
                }
                self.loans.insert(loan.id, loan);
            }
            Effect::ApplyLoanPayment {
                loan_id,
                expected_paid_minor,
                amount_minor,
                next_payment_due,
                paid_off,
            } => {
                non_negative(amount_minor, "loan payment")?;
                let loan = self
                    .loans
                    .get_mut(&loan_id)
                    .ok_or_else(|| not_found("loan", loan_id))?;
                if loan.status != LoanStatus::Active {
                    return Err(GuardViolation::LoanNotActive { loan_id }.into());
                }
                if loan.amount_paid_minor != expected_paid_minor {
                    return Err(GuardViolation::LoanPaymentStale {
                        loan_id,
                        expected_paid_minor,
                        actual_paid_minor: loan.amount_paid_minor,
                    }
                    .into());
                }
                loan.amount_paid_minor += amount_minor;
                loan.next_payment_due = next_payment_due;
                if paid_off {
                    loan.status = LoanStatus::PaidOff;
                }
            }
            Effect::CreateIntent(intent) => {
                let taken = self
                    .intents
                    .values()
                    .any(|existing| existing.id == intent.id || existing.token == intent.token);
                if taken {
                    return Err(StoreError::Conflict(format!(
                        "intent {} already exists",
                        intent.id
                    )));
                }
                self.intents.insert(intent.id, intent);
            }
            Effect::TransitionIntent {
                intent_id,
                from,
                to,
                transaction_id,
                failure_reason,
                at,
            } => {
                let intent = self
                    .intents
                    .get_mut(&intent_id)
                    .ok_or_else(|| not_found("intent", intent_id))?;
                if intent.status != from {
                    return Err(GuardViolation::IntentStatus {
                        intent_id,
                        expected: from,
                        actual: intent.status,
                    }
                    .into());
                }
                intent.status = to;
                if transaction_id.is_some() {
                    intent.transaction_id = transaction_id;
                }
                if failure_reason.is_some() {
                    intent.failure_reason = failure_reason;
                }
                intent.updated_at = at;
            }
        }
        Ok(())
    }
}

fn window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    items
        .into_iter()
        .skip(window.offset)
        .take(window.limit)
        .collect()
}

#[async_trait]
impl EconomyStore for InMemoryEconomyStore {
    async fn world(&self, world_id: WorldId) -> StoreResult<Option<World>> {
        self.read(|state| state.worlds.get(&world_id).cloned())
    }

    async fn worlds(&self) -> StoreResult<Vec<World>> {
        self.read(|state| {
            let mut worlds: Vec<World> = state.worlds.values().cloned().collect();
            worlds.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            worlds
        })
    }

    async fn treasury(&self, world_id: WorldId) -> StoreResult<Option<Treasury>> {
        self.read(|state| state.treasuries.get(&world_id).cloned())
    }

    async fn regions(&self, world_id: WorldId) -> StoreResult<Vec<Region>> {
        self.read(|state| {
            let mut regions: Vec<Region> = state
                .regions
                .values()
                .filter(|region| region.world_id == world_id)
                .cloned()
                .collect();
            regions.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            regions
        })
    }

    async fn citizen(&self, citizen_id: CitizenId) -> StoreResult<Option<Citizen>> {
        self.read(|state| state.citizens.get(&citizen_id).cloned())
    }

    async fn citizen_by_user(
        &self,
        world_id: WorldId,
        user_id: &UserId,
    ) -> StoreResult<Option<Citizen>> {
        self.read(|state| {
            state
                .citizens
                .values()
                .find(|citizen| citizen.world_id == world_id && &citizen.user_id == user_id)
                .cloned()
        })
    }

    async fn citizens(&self, world_id: WorldId) -> StoreResult<Vec<Citizen>> {
        self.read(|state| {
            let mut citizens: Vec<Citizen> = state
                .citizens
                .values()
                .filter(|citizen| citizen.world_id == world_id)
                .cloned()
                .collect();
            citizens.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
            citizens
        })
    }

    async fn survival_needs(&self, citizen_id: CitizenId) -> StoreResult<Option<SurvivalNeeds>> {
        self.read(|state| state.needs.get(&citizen_id).cloned())
    }

    async fn business(&self, business_id: BusinessId) -> StoreResult<Option<Business>> {
        self.read(|state| state.businesses.get(&business_id).cloned())
    }

    async fn businesses(&self, world_id: WorldId) -> StoreResult<Vec<Business>> {
        self.read(|state| {
            let mut businesses: Vec<Business> = state
                .businesses
                .values()
                .filter(|business| business.world_id == world_id)
                .cloned()
                .collect();
            businesses.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            businesses
        })
    }

    async fn resource(&self, resource_id: ResourceId) -> StoreResult<Option<Resource>> {
        self.read(|state| state.resources.get(&resource_id).cloned())
    }

    async fn resources(&self, world_id: WorldId) -> StoreResult<Vec<Resource>> {
        self.read(|state| {
            let mut resources: Vec<Resource> = state
                .resources
                .values()
                .filter(|resource| resource.world_id == world_id)
                .cloned()
                .collect();
            resources.sort_by(|a, b| a.name.cmp(&b.name));
            resources
        })
    }

    async fn deposits(&self, business_id: BusinessId) -> StoreResult<Vec<ResourceDeposit>> {
        self.read(|state| {
            let mut deposits: Vec<ResourceDeposit> = state
                .deposits
                .values()
                .filter(|deposit| deposit.business_id == business_id)
                .cloned()
                .collect();
            deposits.sort_by_key(|deposit| deposit.id);
            deposits
        })
    }

    async fn inventory(&self, business_id: BusinessId) -> StoreResult<Vec<InventoryItem>> {
        self.read(|state| {
            state
                .inventory
                .iter()
                .filter(|((owner, _), _)| *owner == business_id)
                .map(|((owner, resource_id), quantity)| InventoryItem {
                    business_id: *owner,
                    resource_id: *resource_id,
                    quantity: *quantity,
                })
                .collect()
        })
    }

    async fn loan(&self, loan_id: LoanId) -> StoreResult<Option<Loan>> {
        self.read(|state| state.loans.get(&loan_id).cloned())
    }

    async fn loans(&self, world_id: WorldId) -> StoreResult<Vec<Loan>> {
        self.read(|state| {
            let mut loans: Vec<Loan> = state
                .loans
                .values()
                .filter(|loan| loan.world_id == world_id)
                .cloned()
                .collect();
            loans.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.id.cmp(&b.id)));
            loans
        })
    }

    async fn transaction(&self, transaction_id: TransactionId) -> StoreResult<Option<Transaction>> {
        self.read(|state| {
            state
                .chains
                .values()
                .flat_map(|chain| chain.iter())
                .find(|tx| tx.id == transaction_id)
                .cloned()
        })
    }

    async fn transactions(
        &self,
        world_id: WorldId,
        query: QueryWindow,
    ) -> StoreResult<Vec<Transaction>> {
        self.read(|state| {
            let newest_first: Vec<Transaction> = state
                .chains
                .get(&world_id)
                .map(|chain| chain.iter().rev().cloned().collect())
                .unwrap_or_default();
            window(newest_first, query)
        })
    }

    async fn transaction_chain(&self, world_id: WorldId) -> StoreResult<Vec<Transaction>> {
        self.read(|state| state.chains.get(&world_id).cloned().unwrap_or_default())
    }

    async fn transactions_by_reference(
        &self,
        world_id: WorldId,
        reference: &str,
    ) -> StoreResult<Vec<Transaction>> {
        self.read(|state| {
            state
                .chains
                .get(&world_id)
                .map(|chain| {
                    chain
                        .iter()
                        .filter(|tx| tx.reference.as_deref() == Some(reference))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    async fn intent(&self, intent_id: IntentId) -> StoreResult<Option<TransactionIntent>> {
        self.read(|state| state.intents.get(&intent_id).cloned())
    }

    async fn intent_by_token(&self, token: &str) -> StoreResult<Option<TransactionIntent>> {
        self.read(|state| {
            state
                .intents
                .values()
                .find(|intent| intent.token == token)
                .cloned()
        })
    }

    async fn pending_intents(&self, world_id: WorldId) -> StoreResult<Vec<TransactionIntent>> {
        self.read(|state| {
            let mut intents: Vec<TransactionIntent> = state
                .intents
                .values()
                .filter(|intent| {
                    intent.world_id == world_id
                        && intent.status == vexium_types::IntentStatus::Pending
                })
                .cloned()
                .collect();
            intents.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then(a.id.cmp(&b.id)));
            intents
        })
    }

    async fn decay_events(
        &self,
        citizen_id: CitizenId,
        query: QueryWindow,
    ) -> StoreResult<Vec<DecayEvent>> {
        self.read(|state| {
            let newest_first: Vec<DecayEvent> = state
                .decay_events
                .get(&citizen_id)
                .map(|events| events.iter().rev().cloned().collect())
                .unwrap_or_default();
            window(newest_first, query)
        })
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<CommitReceipt> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("economy state lock poisoned".to_string()))?;
        let mut working = guard.clone();
        let mut receipt = CommitReceipt::default();
        for effect in changes.into_effects() {
            working.apply(effect, &mut receipt)?;
        }
        *guard = working;
        Ok(receipt)
    }
}
