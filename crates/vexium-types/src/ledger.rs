use crate::account::Party;
use crate::enums::ParseEnumError;
use crate::ids::{TransactionId, WorldId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionCategory {
    Payment,
    ResourceSale,
    Wage,
    PermitFee,
    LandPurchase,
    Tax,
    Subsidy,
    LoanDisbursement,
    LoanRepayment,
    OperatingCost,
    Transfer,
}

impl TransactionCategory {
    pub const ALL: [TransactionCategory; 11] = [
        Self::Payment,
        Self::ResourceSale,
        Self::Wage,
        Self::PermitFee,
        Self::LandPurchase,
        Self::Tax,
        Self::Subsidy,
        Self::LoanDisbursement,
        Self::LoanRepayment,
        Self::OperatingCost,
        Self::Transfer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Payment => "PAYMENT",
            Self::ResourceSale => "RESOURCE_SALE",
            Self::Wage => "WAGE",
            Self::PermitFee => "PERMIT_FEE",
            Self::LandPurchase => "LAND_PURCHASE",
            Self::Tax => "TAX",
            Self::Subsidy => "SUBSIDY",
            Self::LoanDisbursement => "LOAN_DISBURSEMENT",
            Self::LoanRepayment => "LOAN_REPAYMENT",
            Self::OperatingCost => "OPERATING_COST",
            Self::Transfer => "TRANSFER",
        }
    }

    /// Categories that move value into or out of the treasury.
    pub fn is_treasury_related(self) -> bool {
        matches!(
            self,
            Self::Tax
                | Self::PermitFee
                | Self::LandPurchase
                | Self::Subsidy
                | Self::LoanDisbursement
                | Self::LoanRepayment
        )
    }
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("TransactionCategory", s))
    }
}

/// A completed transfer as built by the engine, before the store places it
/// on the world's hash chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub id: TransactionId,
    pub world_id: WorldId,
    pub category: TransactionCategory,
    pub amount_minor: i64,
    pub tax_minor: i64,
    pub net_minor: i64,
    pub sender: Option<Party>,
    pub receiver: Option<Party>,
    pub reference: Option<String>,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable ledger record. Never updated after insertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub world_id: WorldId,
    pub sequence: u64,
    pub category: TransactionCategory,
    pub amount_minor: i64,
    pub tax_minor: i64,
    pub net_minor: i64,
    pub sender: Option<Party>,
    pub receiver: Option<Party>,
    pub reference: Option<String>,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

impl Transaction {
    /// Chain a new record after `previous` (the world's current head, if any).
    pub fn chain(new: NewTransaction, previous: Option<&Transaction>) -> Self {
        let sequence = previous.map(|tx| tx.sequence + 1).unwrap_or(0);
        let previous_hash = previous.map(|tx| tx.entry_hash.clone());
        Self::chain_at(new, sequence, previous_hash)
    }

    /// Chain with an explicit head, for stores that only keep sequence + hash.
    pub fn chain_at(new: NewTransaction, sequence: u64, previous_hash: Option<String>) -> Self {
        let mut tx = Self {
            id: new.id,
            world_id: new.world_id,
            sequence,
            category: new.category,
            amount_minor: new.amount_minor,
            tax_minor: new.tax_minor,
            net_minor: new.net_minor,
            sender: new.sender,
            receiver: new.receiver,
            reference: new.reference,
            memo: new.memo,
            created_at: new.created_at,
            previous_hash,
            entry_hash: String::new(),
        };
        tx.entry_hash = tx.compute_hash();
        tx
    }

    pub fn compute_hash(&self) -> String {
        let material = serde_json::json!({
            "id": self.id,
            "world_id": self.world_id,
            "sequence": self.sequence,
            "category": self.category,
            "amount_minor": self.amount_minor,
            "tax_minor": self.tax_minor,
            "net_minor": self.net_minor,
            "sender": self.sender,
            "receiver": self.receiver,
            "reference": self.reference,
            "memo": self.memo,
            "created_at": self.created_at,
            "previous_hash": self.previous_hash,
        });

        let bytes = serde_json::to_vec(&material).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

/// Result of replaying one world's chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub world_id: WorldId,
    pub entries: u64,
    pub valid: bool,
    pub first_invalid_sequence: Option<u64>,
    pub head_hash: Option<String>,
}

/// Verify ascending-ordered transactions of one world.
pub fn verify_chain(world_id: WorldId, transactions: &[Transaction]) -> ChainVerification {
    let mut previous_hash: Option<String> = None;
    for (expected_sequence, tx) in transactions.iter().enumerate() {
        let broken = tx.world_id != world_id
            || tx.sequence != expected_sequence as u64
            || tx.previous_hash != previous_hash
            || tx.entry_hash != tx.compute_hash();
        if broken {
            return ChainVerification {
                world_id,
                entries: transactions.len() as u64,
                valid: false,
                first_invalid_sequence: Some(expected_sequence as u64),
                head_hash: transactions.last().map(|tx| tx.entry_hash.clone()),
            };
        }
        previous_hash = Some(tx.entry_hash.clone());
    }

    ChainVerification {
        world_id,
        entries: transactions.len() as u64,
        valid: true,
        first_invalid_sequence: None,
        head_hash: previous_hash,
    }
}
