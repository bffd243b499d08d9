//! Tax calculation.
//!
//! Pure and deterministic: `tax + net == gross` for every input.

use serde::{Deserialize, Serialize};
use std::fmt;
use vexium_types::{apply_rate_half_up, TaxConfig, TransactionCategory};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxType {
    Sales,
    Income,
    Property,
    None,
}

impl TaxType {
    pub fn for_category(category: TransactionCategory) -> Self {
        match category {
            TransactionCategory::Payment | TransactionCategory::ResourceSale => Self::Sales,
            TransactionCategory::Wage => Self::Income,
            TransactionCategory::PermitFee | TransactionCategory::LandPurchase => Self::Property,
            _ => Self::None,
        }
    }

    pub fn rate_bps(self, config: &TaxConfig) -> u32 {
        match self {
            Self::Sales => config.sales_tax_bps,
            Self::Income => config.income_tax_bps,
            Self::Property => config.property_tax_bps,
            Self::None => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sales => "SALES",
            Self::Income => "INCOME",
            Self::Property => "PROPERTY",
            Self::None => "NONE",
        }
    }
}

impl fmt::Display for TaxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub gross_minor: i64,
    pub tax_minor: i64,
    pub net_minor: i64,
    pub rate_bps: u32,
    pub tax_type: TaxType,
}

impl TaxBreakdown {
    /// No tax withheld.
    pub fn untaxed(gross_minor: i64) -> Self {
        Self {
            gross_minor,
            tax_minor: 0,
            net_minor: gross_minor,
            rate_bps: 0,
            tax_type: TaxType::None,
        }
    }
}

/// Split `gross_minor` into tax and net for a transfer of `category`.
///
/// Non-positive amounts carry no tax.
pub fn calculate_tax(
    gross_minor: i64,
    config: &TaxConfig,
    category: TransactionCategory,
) -> TaxBreakdown {
    let tax_type = TaxType::for_category(category);
    let rate_bps = tax_type.rate_bps(config);
    let tax_minor = if gross_minor > 0 {
        apply_rate_half_up(gross_minor, rate_bps).clamp(0, gross_minor)
    } else {
        0
    };
    TaxBreakdown {
        gross_minor,
        tax_minor,
        net_minor: gross_minor - tax_minor,
        rate_bps,
        tax_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn five_percent_sales_tax_on_forty() {
        let breakdown = calculate_tax(
            4_000,
            &TaxConfig {
                sales_tax_bps: 500,
                ..TaxConfig::default()
            },
            TransactionCategory::Payment,
        );
        assert_eq!(breakdown.tax_minor, 200);
        assert_eq!(breakdown.net_minor, 3_800);
        assert_eq!(breakdown.tax_type, TaxType::Sales);
    }

    #[test]
    fn categories_map_to_tax_types() {
        assert_eq!(TaxType::for_category(TransactionCategory::Wage), TaxType::Income);
        assert_eq!(
            TaxType::for_category(TransactionCategory::LandPurchase),
            TaxType::Property
        );
        assert_eq!(TaxType::for_category(TransactionCategory::Subsidy), TaxType::None);
        let breakdown = calculate_tax(
            1_000,
            &TaxConfig::default(),
            TransactionCategory::LoanRepayment,
        );
        assert_eq!(breakdown, TaxBreakdown::untaxed(1_000));
    }

    #[test]
    fn half_minor_unit_rounds_up() {
        let config = TaxConfig {
            sales_tax_bps: 500,
            ..TaxConfig::default()
        };
        // 5% of 10 is 0.5
        assert_eq!(calculate_tax(10, &config, TransactionCategory::Payment).tax_minor, 1);
        // 5% of 9 is 0.45
        assert_eq!(calculate_tax(9, &config, TransactionCategory::Payment).tax_minor, 0);
    }

    proptest! {
        #[test]
        fn tax_and_net_sum_to_gross(
            gross in 0i64..1_000_000_000_000,
            rate in 0u32..=10_000,
            index in 0usize..11,
        ) {
            let config = TaxConfig {
                sales_tax_bps: rate,
                income_tax_bps: rate,
                property_tax_bps: rate,
            };
            let category = TransactionCategory::ALL[index];
            let breakdown = calculate_tax(gross, &config, category);
            prop_assert_eq!(breakdown.tax_minor + breakdown.net_minor, gross);
            prop_assert!(breakdown.tax_minor >= 0);
            prop_assert!(breakdown.tax_minor <= gross);
        }

        #[test]
        fn payment_tax_is_rounded_rate_share(gross in 1i64..10_000_000, rate in 0u32..=10_000) {
            let config = TaxConfig { sales_tax_bps: rate, ..TaxConfig::default() };
            let breakdown = calculate_tax(gross, &config, TransactionCategory::Payment);
            let exact = gross as f64 * f64::from(rate) / 10_000.0;
            prop_assert!((breakdown.tax_minor as f64 - exact).abs() <= 0.5 + 1e-9);
        }
    }
}
