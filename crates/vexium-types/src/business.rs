use crate::ids::{BusinessId, CitizenId, DepositId, ResourceId, WorldId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One declared production input or output (resource + quantity per cycle).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionLine {
    pub resource_id: ResourceId,
    pub quantity: i64,
}

impl ProductionLine {
    pub fn new(resource_id: ResourceId, quantity: i64) -> Self {
        Self {
            resource_id,
            quantity,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Business {
    pub id: BusinessId,
    pub world_id: WorldId,
    pub owner_id: CitizenId,
    pub name: String,
    pub wallet_minor: i64,
    pub operating_cost_minor: i64,
    pub production_capacity: i64,
    pub active: bool,
    pub operating: bool,
    pub inputs: Vec<ProductionLine>,
    pub outputs: Vec<ProductionLine>,
    pub created_at: DateTime<Utc>,
}

impl Business {
    /// Eligible for world production batches.
    pub fn is_producing(&self) -> bool {
        self.active && self.operating
    }
}

/// Catalog entry shared across a world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub world_id: WorldId,
    pub name: String,
    pub category: String,
    pub base_value_minor: i64,
}

/// Finite raw-resource source bound to one extracting business.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDeposit {
    pub id: DepositId,
    pub business_id: BusinessId,
    pub resource_id: ResourceId,
    pub remaining: i64,
    pub extraction_rate: i64,
}

impl ResourceDeposit {
    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub business_id: BusinessId,
    pub resource_id: ResourceId,
    pub quantity: i64,
}
