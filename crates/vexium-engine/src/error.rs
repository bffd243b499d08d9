use crate::permissions::{Action, Role};
use chrono::{DateTime, Utc};
use thiserror::Error;
use vexium_store::{BalanceSlot, GuardViolation, StoreError};
use vexium_types::{BusinessId, CitizenId, IntentId, IntentStatus, LoanId, ResourceId, WorldId};

pub type EconomyResult<T> = Result<T, EconomyError>;

/// Errors surfaced by every engine operation.
///
/// Each variant carries a stable reason string via [`EconomyError::code`].
#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("insufficient funds: {account} holds {available_minor}, needs {required_minor}")]
    InsufficientFunds {
        account: String,
        required_minor: i64,
        available_minor: i64,
    },

    #[error("treasury of world {world_id} holds {available_minor}, needs {required_minor}")]
    InsufficientTreasury {
        world_id: WorldId,
        required_minor: i64,
        available_minor: i64,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("missing input: resource {resource_id} needs {required}, {available} available")]
    MissingInput {
        resource_id: ResourceId,
        required: i64,
        available: i64,
    },

    #[error("owner {owner_id} cannot operate a business (lowest need {lowest_need:.1})")]
    OwnerIncapacitated { owner_id: CitizenId, lowest_need: f64 },

    #[error("business {0} is not active and operating")]
    BusinessInactive(BusinessId),

    #[error("world {0} is inactive")]
    WorldInactive(WorldId),

    #[error("intent {intent_id} expired at {expired_at}")]
    Expired {
        intent_id: IntentId,
        expired_at: DateTime<Utc>,
    },

    #[error("intent {intent_id} already processed ({status})")]
    AlreadyProcessed {
        intent_id: IntentId,
        status: IntentStatus,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("permission denied for {action}: requires {required}, has {actual}")]
    PermissionDenied {
        action: Action,
        required: Role,
        actual: Role,
    },

    #[error("loan {0} is not active")]
    LoanNotActive(LoanId),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(String),
}

impl EconomyError {
    /// Stable machine-checkable reason.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::InsufficientTreasury { .. } => "INSUFFICIENT_TREASURY",
            Self::NotFound(_) => "NOT_FOUND",
            Self::MissingInput { .. } => "MISSING_INPUT",
            Self::OwnerIncapacitated { .. } => "OWNER_INCAPACITATED",
            Self::BusinessInactive(_) => "BUSINESS_INACTIVE",
            Self::WorldInactive(_) => "WORLD_INACTIVE",
            Self::Expired { .. } => "EXPIRED",
            Self::AlreadyProcessed { .. } => "ALREADY_PROCESSED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::LoanNotActive(_) => "LOAN_NOT_ACTIVE",
            Self::Conflict(_) => "CONFLICT",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} {id}"))
    }

    pub(crate) fn insufficient(slot: BalanceSlot, required_minor: i64, available_minor: i64) -> Self {
        match slot {
            BalanceSlot::Treasury(world_id) => Self::InsufficientTreasury {
                world_id,
                required_minor,
                available_minor,
            },
            other => Self::InsufficientFunds {
                account: other.to_string(),
                required_minor,
                available_minor,
            },
        }
    }
}

impl From<GuardViolation> for EconomyError {
    fn from(value: GuardViolation) -> Self {
        match value {
            GuardViolation::InsufficientBalance {
                slot,
                required_minor,
                available_minor,
            } => Self::insufficient(slot, required_minor, available_minor),
            GuardViolation::InsufficientInventory {
                resource_id,
                required,
                available,
                ..
            } => Self::MissingInput {
                resource_id,
                required,
                available,
            },
            GuardViolation::LoanNotActive { loan_id } => Self::LoanNotActive(loan_id),
            GuardViolation::IntentStatus {
                intent_id, actual, ..
            } => Self::AlreadyProcessed {
                intent_id,
                status: actual,
            },
            violation @ (GuardViolation::DepositDepleted { .. }
            | GuardViolation::LoanPaymentStale { .. }
            | GuardViolation::NeedSaturated { .. }) => Self::Conflict(violation.to_string()),
        }
    }
}

impl From<StoreError> for EconomyError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Guard(violation) => violation.into(),
            StoreError::NotFound(message) => Self::NotFound(message),
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::InvalidInput(message) => Self::InvalidRequest(message),
            StoreError::Serialization(message) | StoreError::Backend(message) => {
                Self::Store(message)
            }
        }
    }
}
