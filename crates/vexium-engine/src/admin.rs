//! World setup and membership: worlds, regions, citizens, resources,
//! businesses and deposits.

use crate::engine::EconomyEngine;
use crate::error::{EconomyError, EconomyResult};
use crate::permissions::Action;
use serde::{Deserialize, Serialize};
use tracing::info;
use vexium_store::{ChangeSet, Effect};
use vexium_types::{
    AccountRef, Business, BusinessId, Citizen, CitizenId, DecayConfig, DepositId, ProductionLine,
    Region, RegionId, ReplenishPricing, Resource, ResourceDeposit, ResourceId, SurvivalNeeds,
    TaxConfig, Treasury, UserId, World, WorldId,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewWorld {
    pub name: String,
    pub owner: UserId,
    pub currency_name: String,
    pub currency_symbol: String,
    pub tax: TaxConfig,
    pub decay: DecayConfig,
    pub pricing: ReplenishPricing,
    pub starting_balance_minor: i64,
    pub treasury_balance_minor: i64,
}

impl NewWorld {
    pub fn new(name: impl Into<String>, owner: UserId) -> Self {
        Self {
            name: name.into(),
            owner,
            currency_name: "Credit".to_string(),
            currency_symbol: "CR".to_string(),
            tax: TaxConfig::default(),
            decay: DecayConfig::default(),
            pricing: ReplenishPricing::default(),
            starting_balance_minor: 0,
            treasury_balance_minor: 0,
        }
    }

    pub fn with_treasury_balance(mut self, amount_minor: i64) -> Self {
        self.treasury_balance_minor = amount_minor;
        self
    }

    pub fn with_starting_balance(mut self, amount_minor: i64) -> Self {
        self.starting_balance_minor = amount_minor;
        self
    }

    pub fn with_tax(mut self, tax: TaxConfig) -> Self {
        self.tax = tax;
        self
    }
}

/// Partial update of a world's settings; `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSettings {
    pub currency_name: Option<String>,
    pub currency_symbol: Option<String>,
    pub tax: Option<TaxConfig>,
    pub decay: Option<DecayConfig>,
    pub pricing: Option<ReplenishPricing>,
    pub starting_balance_minor: Option<i64>,
}

fn validate_world_config(
    tax: &TaxConfig,
    decay: &DecayConfig,
    pricing: &ReplenishPricing,
    starting_balance_minor: i64,
) -> EconomyResult<()> {
    if !tax.is_valid() {
        return Err(EconomyError::InvalidRequest(
            "tax rates must be between 0 and 10000 bps".to_string(),
        ));
    }
    if !decay.is_valid() {
        return Err(EconomyError::InvalidRequest(
            "decay rates must be finite and non-negative with a positive interval".to_string(),
        ));
    }
    if !pricing.is_valid() {
        return Err(EconomyError::InvalidRequest(
            "replenish prices must be non-negative".to_string(),
        ));
    }
    if starting_balance_minor < 0 {
        return Err(EconomyError::InvalidAmount(format!(
            "starting balance must be non-negative, got {starting_balance_minor}"
        )));
    }
    Ok(())
}

fn require_name(value: &str, what: &str) -> EconomyResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EconomyError::InvalidRequest(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn validate_lines(lines: &[ProductionLine], what: &str) -> EconomyResult<()> {
    if let Some(line) = lines.iter().find(|line| line.quantity <= 0) {
        return Err(EconomyError::InvalidAmount(format!(
            "{what} quantity for resource {} must be positive, got {}",
            line.resource_id, line.quantity
        )));
    }
    Ok(())
}

impl EconomyEngine {
    pub async fn create_world(&self, new: NewWorld) -> EconomyResult<World> {
        let name = require_name(&new.name, "world name")?;
        validate_world_config(
            &new.tax,
            &new.decay,
            &new.pricing,
            new.starting_balance_minor,
        )?;
        if new.treasury_balance_minor < 0 {
            return Err(EconomyError::InvalidAmount(format!(
                "treasury balance must be non-negative, got {}",
                new.treasury_balance_minor
            )));
        }

        let world = World {
            id: WorldId::generate(),
            name,
            owner: new.owner,
            currency_name: new.currency_name,
            currency_symbol: new.currency_symbol,
            tax: new.tax,
            decay: new.decay,
            pricing: new.pricing,
            starting_balance_minor: new.starting_balance_minor,
            active: true,
            created_at: self.now(),
        };
        let treasury = Treasury::new(world.id, new.treasury_balance_minor);
        self.commit(ChangeSet::new().with(Effect::CreateWorld {
            world: world.clone(),
            treasury,
        }))
        .await?;
        info!(world_id = %world.id, owner = %world.owner, name = %world.name, "World created");
        Ok(world)
    }

    pub async fn update_world_settings(
        &self,
        actor: &UserId,
        world_id: WorldId,
        settings: WorldSettings,
    ) -> EconomyResult<World> {
        self.require_permission(world_id, actor, Action::UpdateWorldSettings)
            .await?;
        let current = self.load_world(world_id).await?;
        let currency_name = settings
            .currency_name
            .as_deref()
            .map(|name| require_name(name, "currency name"))
            .transpose()?;
        let currency_symbol = settings
            .currency_symbol
            .as_deref()
            .map(|symbol| require_name(symbol, "currency symbol"))
            .transpose()?;
        validate_world_config(
            settings.tax.as_ref().unwrap_or(&current.tax),
            settings.decay.as_ref().unwrap_or(&current.decay),
            settings.pricing.as_ref().unwrap_or(&current.pricing),
            settings
                .starting_balance_minor
                .unwrap_or(current.starting_balance_minor),
        )?;

        self.commit(ChangeSet::new().with(Effect::UpdateWorldSettings {
            world_id,
            currency_name,
            currency_symbol,
            tax: settings.tax,
            decay: settings.decay,
            pricing: settings.pricing,
            starting_balance_minor: settings.starting_balance_minor,
        }))
        .await?;
        info!(world_id = %world_id, actor = %actor, "World settings updated");
        self.load_world(world_id).await
    }

    pub async fn set_world_active(
        &self,
        actor: &UserId,
        world_id: WorldId,
        active: bool,
    ) -> EconomyResult<World> {
        self.require_permission(world_id, actor, Action::ManageWorldStatus)
            .await?;
        self.commit(ChangeSet::new().with(Effect::SetWorldActive { world_id, active }))
            .await?;
        info!(world_id = %world_id, active, "World status changed");
        self.load_world(world_id).await
    }

    pub async fn create_region(
        &self,
        actor: &UserId,
        world_id: WorldId,
        name: &str,
    ) -> EconomyResult<Region> {
        self.require_permission(world_id, actor, Action::ManageRegions)
            .await?;
        let region = Region {
            id: RegionId::generate(),
            world_id,
            name: require_name(name, "region name")?,
            mayor: None,
        };
        self.commit(ChangeSet::new().with(Effect::CreateRegion(region.clone())))
            .await?;
        info!(world_id = %world_id, region_id = %region.id, "Region created");
        Ok(region)
    }

    /// Set or clear a region's mayor.
    pub async fn appoint_mayor(
        &self,
        actor: &UserId,
        world_id: WorldId,
        region_id: RegionId,
        mayor: Option<CitizenId>,
    ) -> EconomyResult<Region> {
        self.require_permission(world_id, actor, Action::AppointMayor)
            .await?;
        let mut region = self
            .store()
            .regions(world_id)
            .await?
            .into_iter()
            .find(|region| region.id == region_id)
            .ok_or_else(|| EconomyError::not_found("region", region_id))?;
        if let Some(citizen_id) = mayor {
            self.ensure_account_in_world(AccountRef::Citizen(citizen_id), world_id)
                .await?;
        }
        self.commit(ChangeSet::new().with(Effect::SetRegionMayor { region_id, mayor }))
            .await?;
        region.mayor = mayor;
        info!(region_id = %region_id, mayor = ?mayor, "Mayor appointed");
        Ok(region)
    }

    /// Join a world, or come back to it. An active membership is returned as is.
    pub async fn join_world(
        &self,
        world_id: WorldId,
        user: &UserId,
        display_name: &str,
    ) -> EconomyResult<Citizen> {
        let world = self.load_world(world_id).await?;
        if !world.active {
            return Err(EconomyError::WorldInactive(world_id));
        }
        if let Some(mut existing) = self.store().citizen_by_user(world_id, user).await? {
            if !existing.active {
                self.commit(ChangeSet::new().with(Effect::SetCitizenActive {
                    citizen_id: existing.id,
                    active: true,
                }))
                .await?;
                existing.active = true;
                info!(world_id = %world_id, citizen_id = %existing.id, "Citizen rejoined");
            }
            return Ok(existing);
        }

        let now = self.now();
        let citizen = Citizen {
            id: CitizenId::generate(),
            world_id,
            user_id: user.clone(),
            display_name: require_name(display_name, "display name")?,
            wallet_minor: world.starting_balance_minor,
            bank_minor: 0,
            active: true,
            joined_at: now,
        };
        self.commit(ChangeSet::new().with(Effect::CreateCitizen {
            citizen: citizen.clone(),
            needs: SurvivalNeeds::full(citizen.id, now),
        }))
        .await?;
        info!(
            world_id = %world_id,
            citizen_id = %citizen.id,
            starting_balance_minor = citizen.wallet_minor,
            "Citizen joined"
        );
        Ok(citizen)
    }

    pub async fn deactivate_citizen(&self, citizen_id: CitizenId) -> EconomyResult<Citizen> {
        let mut citizen = self.load_citizen(citizen_id).await?;
        if citizen.active {
            self.commit(ChangeSet::new().with(Effect::SetCitizenActive {
                citizen_id,
                active: false,
            }))
            .await?;
            citizen.active = false;
            info!(citizen_id = %citizen_id, "Citizen deactivated");
        }
        Ok(citizen)
    }

    pub async fn register_resource(
        &self,
        world_id: WorldId,
        name: &str,
        category: &str,
        base_value_minor: i64,
    ) -> EconomyResult<Resource> {
        self.load_world(world_id).await?;
        if base_value_minor < 0 {
            return Err(EconomyError::InvalidAmount(format!(
                "base value must be non-negative, got {base_value_minor}"
            )));
        }
        let resource = Resource {
            id: ResourceId::generate(),
            world_id,
            name: require_name(name, "resource name")?,
            category: category.trim().to_string(),
            base_value_minor,
        };
        self.commit(ChangeSet::new().with(Effect::CreateResource(resource.clone())))
            .await?;
        info!(world_id = %world_id, resource_id = %resource.id, name = %resource.name, "Resource registered");
        Ok(resource)
    }

    /// Register a business owned by an active citizen. It starts operating
    /// with an empty wallet and no production plan.
    pub async fn register_business(
        &self,
        world_id: WorldId,
        owner_id: CitizenId,
        name: &str,
        operating_cost_minor: i64,
        production_capacity: i64,
    ) -> EconomyResult<Business> {
        self.load_world(world_id).await?;
        let owner = self.load_citizen(owner_id).await?;
        if owner.world_id != world_id || !owner.active {
            return Err(EconomyError::InvalidRequest(format!(
                "citizen {owner_id} is not an active member of world {world_id}"
            )));
        }
        if operating_cost_minor < 0 || production_capacity < 0 {
            return Err(EconomyError::InvalidAmount(
                "operating cost and capacity must be non-negative".to_string(),
            ));
        }
        let business = Business {
            id: BusinessId::generate(),
            world_id,
            owner_id,
            name: require_name(name, "business name")?,
            wallet_minor: 0,
            operating_cost_minor,
            production_capacity,
            active: true,
            operating: true,
            inputs: Vec::new(),
            outputs: Vec::new(),
            created_at: self.now(),
        };
        self.commit(ChangeSet::new().with(Effect::CreateBusiness(business.clone())))
            .await?;
        info!(world_id = %world_id, business_id = %business.id, owner_id = %owner_id, "Business registered");
        Ok(business)
    }

    pub async fn set_production_plan(
        &self,
        business_id: BusinessId,
        inputs: Vec<ProductionLine>,
        outputs: Vec<ProductionLine>,
    ) -> EconomyResult<Business> {
        let mut business = self.load_business(business_id).await?;
        validate_lines(&inputs, "input")?;
        validate_lines(&outputs, "output")?;
        for line in inputs.iter().chain(outputs.iter()) {
            self.ensure_resource_in_world(line.resource_id, business.world_id)
                .await?;
        }
        self.commit(ChangeSet::new().with(Effect::SetProductionPlan {
            business_id,
            inputs: inputs.clone(),
            outputs: outputs.clone(),
        }))
        .await?;
        business.inputs = inputs;
        business.outputs = outputs;
        info!(
            business_id = %business_id,
            inputs = business.inputs.len(),
            outputs = business.outputs.len(),
            "Production plan set"
        );
        Ok(business)
    }

    pub async fn set_business_operating(
        &self,
        business_id: BusinessId,
        operating: bool,
    ) -> EconomyResult<Business> {
        let mut business = self.load_business(business_id).await?;
        self.commit(ChangeSet::new().with(Effect::SetBusinessOperating {
            business_id,
            operating,
        }))
        .await?;
        business.operating = operating;
        info!(business_id = %business_id, operating, "Business operating flag changed");
        Ok(business)
    }

    pub async fn bind_deposit(
        &self,
        business_id: BusinessId,
        resource_id: ResourceId,
        remaining: i64,
        extraction_rate: i64,
    ) -> EconomyResult<ResourceDeposit> {
        let business = self.load_business(business_id).await?;
        self.ensure_resource_in_world(resource_id, business.world_id)
            .await?;
        if remaining < 0 || extraction_rate <= 0 {
            return Err(EconomyError::InvalidAmount(format!(
                "deposit needs remaining >= 0 and a positive rate, got {remaining}/{extraction_rate}"
            )));
        }
        let deposit = ResourceDeposit {
            id: DepositId::generate(),
            business_id,
            resource_id,
            remaining,
            extraction_rate,
        };
        self.commit(ChangeSet::new().with(Effect::CreateDeposit(deposit.clone())))
            .await?;
        info!(business_id = %business_id, deposit_id = %deposit.id, remaining, "Deposit bound");
        Ok(deposit)
    }

    async fn ensure_resource_in_world(
        &self,
        resource_id: ResourceId,
        world_id: WorldId,
    ) -> EconomyResult<()> {
        let resource = self
            .store()
            .resource(resource_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("resource", resource_id))?;
        if resource.world_id != world_id {
            return Err(EconomyError::NotFound(format!(
                "resource {resource_id} in world {world_id}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Fixture;

    #[tokio::test]
    async fn join_is_idempotent_and_reactivates() {
        let fx = Fixture::new().await;
        let user = UserId::new("alice");
        let first = fx.engine.join_world(fx.world_id, &user, "Alice").await.unwrap();
        let again = fx.engine.join_world(fx.world_id, &user, "Alice").await.unwrap();
        assert_eq!(first.id, again.id);

        fx.engine.deactivate_citizen(first.id).await.unwrap();
        let back = fx.engine.join_world(fx.world_id, &user, "Alice").await.unwrap();
        assert_eq!(back.id, first.id);
        assert!(back.active);
    }

    #[tokio::test]
    async fn joining_an_inactive_world_fails() {
        let fx = Fixture::new().await;
        fx.engine
            .set_world_active(&fx.owner, fx.world_id, false)
            .await
            .unwrap();
        let err = fx
            .engine
            .join_world(fx.world_id, &UserId::new("late"), "Late")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "WORLD_INACTIVE");
    }

    #[tokio::test]
    async fn starting_balance_is_granted_on_join() {
        let fx = Fixture::new().await;
        fx.engine
            .update_world_settings(
                &fx.owner,
                fx.world_id,
                WorldSettings {
                    starting_balance_minor: Some(2_500),
                    ..WorldSettings::default()
                },
            )
            .await
            .unwrap();
        let citizen = fx
            .engine
            .join_world(fx.world_id, &UserId::new("newcomer"), "Newcomer")
            .await
            .unwrap();
        assert_eq!(citizen.wallet_minor, 2_500);
        assert_eq!(fx.needs(citizen.id).await.food, 100.0);
    }

    #[tokio::test]
    async fn settings_are_validated_and_guarded() {
        let fx = Fixture::new().await;
        fx.citizen("alice", 0).await;

        let err = fx
            .engine
            .update_world_settings(&UserId::new("alice"), fx.world_id, WorldSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");

        let err = fx
            .engine
            .update_world_settings(
                &fx.owner,
                fx.world_id,
                WorldSettings {
                    tax: Some(TaxConfig {
                        sales_tax_bps: 10_001,
                        ..TaxConfig::default()
                    }),
                    ..WorldSettings::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");

        let world = fx
            .engine
            .update_world_settings(
                &fx.owner,
                fx.world_id,
                WorldSettings {
                    currency_symbol: Some("GLD".to_string()),
                    ..WorldSettings::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(world.currency_symbol, "GLD");
        assert_eq!(world.tax, TaxConfig::default());
    }

    #[tokio::test]
    async fn mayor_must_belong_to_the_world() {
        let fx = Fixture::new().await;
        let other = Fixture::new().await;
        let stranger = other.citizen("stranger", 0).await;
        let region = fx
            .engine
            .create_region(&fx.owner, fx.world_id, "Docks")
            .await
            .unwrap();

        let err = fx
            .engine
            .appoint_mayor(&fx.owner, fx.world_id, region.id, Some(stranger))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn production_plans_reject_foreign_resources() {
        let fx = Fixture::new().await;
        let other = Fixture::new().await;
        let owner = fx.citizen("owner", 0).await;
        let shop = fx.business(owner, 0, 0).await;
        let foreign = other.resource("ore").await;

        let err = fx
            .engine
            .set_production_plan(shop, vec![ProductionLine::new(foreign, 1)], Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let local = fx.resource("ore").await;
        let err = fx
            .engine
            .set_production_plan(shop, vec![ProductionLine::new(local, 0)], Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");
    }
}
