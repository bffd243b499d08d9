use crate::effect::BalanceSlot;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vexium_types::{
    BusinessId, CitizenId, DepositId, IntentId, IntentStatus, LoanId, NeedKind, ResourceId,
};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-layer errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("guard rejected change set: {0}")]
    Guard(GuardViolation),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Precondition of a guarded effect that did not hold at commit time.
///
/// When a guard fails no effect of the change set is applied.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GuardViolation {
    #[error("{slot} holds {available_minor}, needs {required_minor}")]
    InsufficientBalance {
        slot: BalanceSlot,
        required_minor: i64,
        available_minor: i64,
    },

    #[error("business {business_id} has {available} of resource {resource_id}, needs {required}")]
    InsufficientInventory {
        business_id: BusinessId,
        resource_id: ResourceId,
        required: i64,
        available: i64,
    },

    #[error("deposit {deposit_id} has {remaining} remaining, requested {requested}")]
    DepositDepleted {
        deposit_id: DepositId,
        requested: i64,
        remaining: i64,
    },

    #[error("loan {loan_id} is not active")]
    LoanNotActive { loan_id: LoanId },

    #[error("loan {loan_id} has {actual_paid_minor} repaid, expected {expected_paid_minor}")]
    LoanPaymentStale {
        loan_id: LoanId,
        expected_paid_minor: i64,
        actual_paid_minor: i64,
    },

    #[error("{need} of citizen {citizen_id} has no room for the requested points")]
    NeedSaturated { citizen_id: CitizenId, need: NeedKind },

    #[error("intent {intent_id} is {actual}, expected {expected}")]
    IntentStatus {
        intent_id: IntentId,
        expected: IntentStatus,
        actual: IntentStatus,
    },
}

impl From<GuardViolation> for StoreError {
    fn from(value: GuardViolation) -> Self {
        Self::Guard(value)
    }
}

impl From<vexium_types::ParseEnumError> for StoreError {
    fn from(value: vexium_types::ParseEnumError) -> Self {
        Self::Serialization(value.to_string())
    }
}
