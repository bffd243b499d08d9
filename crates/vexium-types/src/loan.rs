use crate::enums::ParseEnumError;
use crate::ids::{CitizenId, LoanId, WorldId};
use crate::money::{apply_rate_half_up, div_ceil};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Active,
    PaidOff,
}

impl LoanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::PaidOff => "PAID_OFF",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "PAID_OFF" => Ok(Self::PaidOff),
            other => Err(ParseEnumError::new("LoanStatus", other)),
        }
    }
}

/// Treasury-issued loan with simple (non-compounding) interest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub world_id: WorldId,
    pub borrower_id: CitizenId,
    pub principal_minor: i64,
    pub interest_rate_bps: u32,
    pub term_months: u32,
    pub amount_paid_minor: i64,
    pub next_payment_due: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub issued_at: DateTime<Utc>,
}

impl Loan {
    /// `principal * (1 + rate)`, interest rounded half-up to minor units.
    pub fn total_owed_minor(&self) -> i64 {
        self.principal_minor + apply_rate_half_up(self.principal_minor, self.interest_rate_bps)
    }

    pub fn outstanding_minor(&self) -> i64 {
        (self.total_owed_minor() - self.amount_paid_minor).max(0)
    }

    /// `min(ceil(total_owed / term), outstanding)`.
    pub fn next_installment_minor(&self) -> i64 {
        let term = i64::from(self.term_months.max(1));
        div_ceil(self.total_owed_minor(), term).min(self.outstanding_minor())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == LoanStatus::Active
            && self.next_payment_due.map(|due| due <= now).unwrap_or(false)
    }
}
