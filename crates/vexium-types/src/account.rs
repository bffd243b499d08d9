use crate::enums::ParseEnumError;
use crate::ids::{BusinessId, CitizenId, WorldId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Any account that can hold a wallet balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AccountRef {
    Citizen(CitizenId),
    Business(BusinessId),
    Treasury(WorldId),
}

impl AccountRef {
    pub fn kind(&self) -> AccountKind {
        match self {
            Self::Citizen(_) => AccountKind::Citizen,
            Self::Business(_) => AccountKind::Business,
            Self::Treasury(_) => AccountKind::Treasury,
        }
    }

    pub fn is_treasury(&self) -> bool {
        matches!(self, Self::Treasury(_))
    }

    /// The ledger party for this account; the treasury is not a party.
    pub fn party(&self) -> Option<Party> {
        match self {
            Self::Citizen(id) => Some(Party::Citizen(*id)),
            Self::Business(id) => Some(Party::Business(*id)),
            Self::Treasury(_) => None,
        }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Citizen(id) => write!(f, "citizen:{id}"),
            Self::Business(id) => write!(f, "business:{id}"),
            Self::Treasury(id) => write!(f, "treasury:{id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountKind {
    Citizen,
    Business,
    Treasury,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Citizen => "CITIZEN",
            Self::Business => "BUSINESS",
            Self::Treasury => "TREASURY",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CITIZEN" => Ok(Self::Citizen),
            "BUSINESS" => Ok(Self::Business),
            "TREASURY" => Ok(Self::Treasury),
            other => Err(ParseEnumError::new("AccountKind", other)),
        }
    }
}

/// Sender or receiver recorded on a ledger transaction.
///
/// Exactly one of citizen/business is populated per side; a missing party
/// means the treasury (or a system source/sink).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Party {
    Citizen(CitizenId),
    Business(BusinessId),
}

impl Party {
    pub fn citizen(&self) -> Option<CitizenId> {
        match self {
            Self::Citizen(id) => Some(*id),
            Self::Business(_) => None,
        }
    }

    pub fn business(&self) -> Option<BusinessId> {
        match self {
            Self::Business(id) => Some(*id),
            Self::Citizen(_) => None,
        }
    }

    /// Rebuild a party from the two nullable relational columns.
    pub fn from_columns(citizen: Option<CitizenId>, business: Option<BusinessId>) -> Option<Self> {
        match (citizen, business) {
            (Some(id), _) => Some(Self::Citizen(id)),
            (None, Some(id)) => Some(Self::Business(id)),
            (None, None) => None,
        }
    }
}

impl From<Party> for AccountRef {
    fn from(party: Party) -> Self {
        match party {
            Party::Citizen(id) => AccountRef::Citizen(id),
            Party::Business(id) => AccountRef::Business(id),
        }
    }
}

/// Read-side balance view for one account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account: AccountRef,
    pub wallet_minor: i64,
    /// Non-circulating reserve; only citizens have one.
    pub bank_minor: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn treasury_is_not_a_party() {
        let world = WorldId::generate();
        assert_eq!(AccountRef::Treasury(world).party(), None);
        let citizen = CitizenId::generate();
        assert_eq!(
            AccountRef::Citizen(citizen).party(),
            Some(Party::Citizen(citizen))
        );
    }

    #[test]
    fn party_columns_round_trip() {
        let business = BusinessId::generate();
        let party = Party::Business(business);
        assert_eq!(
            Party::from_columns(party.citizen(), party.business()),
            Some(party)
        );
        assert_eq!(Party::from_columns(None, None), None);
    }
}
