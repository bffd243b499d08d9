use crate::account::AccountRef;
use crate::enums::ParseEnumError;
use crate::ids::{IntentId, TransactionId, UserId, WorldId};
use crate::ledger::TransactionCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a pending transfer.
///
/// `PENDING -> CONFIRMED -> EXECUTED`, `PENDING -> CANCELLED`,
/// `PENDING -> EXPIRED`, and `CONFIRMED -> CANCELLED` on ledger failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    Pending,
    Confirmed,
    Executed,
    Cancelled,
    Expired,
}

impl IntentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Executed => "EXECUTED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Cancelled | Self::Expired)
    }

    pub fn can_transition_to(self, next: IntentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Pending, Self::Expired)
                | (Self::Confirmed, Self::Executed)
                | (Self::Confirmed, Self::Cancelled)
        )
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "EXECUTED" => Ok(Self::Executed),
            "CANCELLED" => Ok(Self::Cancelled),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(ParseEnumError::new("IntentStatus", other)),
        }
    }
}

/// Short-lived, token-addressable pending transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub id: IntentId,
    pub world_id: WorldId,
    pub token: String,
    pub amount_minor: i64,
    pub category: TransactionCategory,
    pub sender: AccountRef,
    pub receiver: AccountRef,
    /// Identity allowed to confirm or cancel.
    pub sender_user: UserId,
    pub apply_tax: bool,
    pub memo: Option<String>,
    pub status: IntentStatus,
    pub expires_at: DateTime<Utc>,
    pub transaction_id: Option<TransactionId>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionIntent {
    /// Pending and past its expiry at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == IntentStatus::Pending && now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_documented_transitions_are_allowed() {
        use IntentStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Expired));
        assert!(Confirmed.can_transition_to(Executed));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Executed.can_transition_to(Cancelled));
        assert!(!Expired.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Executed));
        assert!(Cancelled.is_terminal());
        assert!(!Confirmed.is_terminal());
    }
}
