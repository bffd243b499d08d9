use crate::enums::ParseEnumError;
use crate::ids::{CitizenId, RegionId, UserId, WorldId};
use crate::money::BASIS_POINTS_SCALE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-world tax rates in basis points (`500` = 5%).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxConfig {
    pub sales_tax_bps: u32,
    pub income_tax_bps: u32,
    pub property_tax_bps: u32,
}

impl TaxConfig {
    pub fn is_valid(&self) -> bool {
        [self.sales_tax_bps, self.income_tax_bps, self.property_tax_bps]
            .iter()
            .all(|rate| *rate <= BASIS_POINTS_SCALE)
    }
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            sales_tax_bps: 500,
            income_tax_bps: 1_000,
            property_tax_bps: 200,
        }
    }
}

/// Survival decay tuning for one world.
///
/// Each tick lowers a gauge by `base_rate * <need>_factor`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecayConfig {
    pub base_rate: f64,
    pub food_factor: f64,
    pub water_factor: f64,
    pub sleep_factor: f64,
    /// Cadence the external scheduler is expected to tick at.
    pub interval_minutes: u32,
}

impl DecayConfig {
    pub fn is_valid(&self) -> bool {
        [
            self.base_rate,
            self.food_factor,
            self.water_factor,
            self.sleep_factor,
        ]
        .iter()
        .all(|value| value.is_finite() && *value >= 0.0)
            && self.interval_minutes > 0
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            base_rate: 5.0,
            food_factor: 1.0,
            water_factor: 1.2,
            sleep_factor: 0.8,
            interval_minutes: 60,
        }
    }
}

/// Price per gauge point when a citizen replenishes a need.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishPricing {
    pub food_minor_per_unit: i64,
    pub water_minor_per_unit: i64,
    pub sleep_minor_per_unit: i64,
}

impl ReplenishPricing {
    pub fn is_valid(&self) -> bool {
        self.food_minor_per_unit >= 0
            && self.water_minor_per_unit >= 0
            && self.sleep_minor_per_unit >= 0
    }
}

impl Default for ReplenishPricing {
    fn default() -> Self {
        Self {
            food_minor_per_unit: 200,
            water_minor_per_unit: 100,
            sleep_minor_per_unit: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub id: WorldId,
    pub name: String,
    pub owner: UserId,
    pub currency_name: String,
    pub currency_symbol: String,
    pub tax: TaxConfig,
    pub decay: DecayConfig,
    pub pricing: ReplenishPricing,
    pub starting_balance_minor: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// The world's central fiscal account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    pub world_id: WorldId,
    pub balance_minor: i64,
    pub tax_revenue_minor: i64,
    pub permit_revenue_minor: i64,
    pub land_revenue_minor: i64,
    pub subsidies_paid_minor: i64,
    pub loans_issued_minor: i64,
}

impl Treasury {
    pub fn new(world_id: WorldId, balance_minor: i64) -> Self {
        Self {
            world_id,
            balance_minor,
            tax_revenue_minor: 0,
            permit_revenue_minor: 0,
            land_revenue_minor: 0,
            subsidies_paid_minor: 0,
            loans_issued_minor: 0,
        }
    }

    pub fn counter(&self, counter: TreasuryCounter) -> i64 {
        match counter {
            TreasuryCounter::TaxRevenue => self.tax_revenue_minor,
            TreasuryCounter::PermitRevenue => self.permit_revenue_minor,
            TreasuryCounter::LandRevenue => self.land_revenue_minor,
            TreasuryCounter::SubsidiesPaid => self.subsidies_paid_minor,
            TreasuryCounter::LoansIssued => self.loans_issued_minor,
        }
    }

    pub fn counter_mut(&mut self, counter: TreasuryCounter) -> &mut i64 {
        match counter {
            TreasuryCounter::TaxRevenue => &mut self.tax_revenue_minor,
            TreasuryCounter::PermitRevenue => &mut self.permit_revenue_minor,
            TreasuryCounter::LandRevenue => &mut self.land_revenue_minor,
            TreasuryCounter::SubsidiesPaid => &mut self.subsidies_paid_minor,
            TreasuryCounter::LoansIssued => &mut self.loans_issued_minor,
        }
    }
}

/// Cumulative treasury revenue/spending counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TreasuryCounter {
    TaxRevenue,
    PermitRevenue,
    LandRevenue,
    SubsidiesPaid,
    LoansIssued,
}

impl TreasuryCounter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaxRevenue => "TAX_REVENUE",
            Self::PermitRevenue => "PERMIT_REVENUE",
            Self::LandRevenue => "LAND_REVENUE",
            Self::SubsidiesPaid => "SUBSIDIES_PAID",
            Self::LoansIssued => "LOANS_ISSUED",
        }
    }

    /// Column holding this counter in the relational schema.
    pub fn column(self) -> &'static str {
        match self {
            Self::TaxRevenue => "tax_revenue_minor",
            Self::PermitRevenue => "permit_revenue_minor",
            Self::LandRevenue => "land_revenue_minor",
            Self::SubsidiesPaid => "subsidies_paid_minor",
            Self::LoansIssued => "loans_issued_minor",
        }
    }
}

impl fmt::Display for TreasuryCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TreasuryCounter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TAX_REVENUE" => Ok(Self::TaxRevenue),
            "PERMIT_REVENUE" => Ok(Self::PermitRevenue),
            "LAND_REVENUE" => Ok(Self::LandRevenue),
            "SUBSIDIES_PAID" => Ok(Self::SubsidiesPaid),
            "LOANS_ISSUED" => Ok(Self::LoansIssued),
            other => Err(ParseEnumError::new("TreasuryCounter", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub world_id: WorldId,
    pub name: String,
    pub mayor: Option<CitizenId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_config_rejects_rates_above_hundred_percent() {
        let mut tax = TaxConfig::default();
        assert!(tax.is_valid());
        tax.property_tax_bps = 10_001;
        assert!(!tax.is_valid());
    }

    #[test]
    fn decay_config_rejects_negative_and_nan() {
        let mut decay = DecayConfig::default();
        assert!(decay.is_valid());
        decay.water_factor = -0.1;
        assert!(!decay.is_valid());
        decay.water_factor = f64::NAN;
        assert!(!decay.is_valid());
    }

    #[test]
    fn treasury_counter_accessors_agree() {
        let mut treasury = Treasury::new(WorldId::generate(), 0);
        *treasury.counter_mut(TreasuryCounter::LandRevenue) += 75;
        assert_eq!(treasury.land_revenue_minor, 75);
        assert_eq!(treasury.counter(TreasuryCounter::LandRevenue), 75);
        assert_eq!(
            "LAND_REVENUE".parse::<TreasuryCounter>().unwrap(),
            TreasuryCounter::LandRevenue
        );
    }
}
