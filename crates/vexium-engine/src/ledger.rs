//! Value transfers between accounts.
//!
//! A transfer debits the sender by the gross amount, credits the receiver with
//! the net amount and routes withheld tax to the treasury. All of it plus the
//! transaction record lands in one change set.

use crate::engine::{recorded, require_positive, EconomyEngine};
use crate::error::{EconomyError, EconomyResult};
use crate::tax::{calculate_tax, TaxBreakdown};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vexium_store::{BalanceSlot, ChangeSet, Effect, QueryWindow};
use vexium_types::{
    verify_chain, AccountRef, ChainVerification, NewTransaction, Transaction, TransactionCategory,
    TransactionId, TreasuryCounter, WorldId,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub world_id: WorldId,
    pub amount_minor: i64,
    pub category: TransactionCategory,
    pub sender: AccountRef,
    pub receiver: AccountRef,
    pub apply_tax: bool,
    pub memo: Option<String>,
    pub reference: Option<String>,
}

impl TransferRequest {
    pub fn new(
        world_id: WorldId,
        sender: AccountRef,
        receiver: AccountRef,
        amount_minor: i64,
        category: TransactionCategory,
    ) -> Self {
        Self {
            world_id,
            amount_minor,
            category,
            sender,
            receiver,
            apply_tax: true,
            memo: None,
            reference: None,
        }
    }

    pub fn untaxed(mut self) -> Self {
        self.apply_tax = false;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transaction_id: TransactionId,
    pub tax_minor: i64,
    pub net_minor: i64,
    pub transaction: Transaction,
}

/// A validated transfer whose effects have not been committed yet.
#[derive(Clone, Debug)]
pub(crate) struct PreparedTransfer {
    pub changes: ChangeSet,
    pub transaction_id: TransactionId,
    pub tax: TaxBreakdown,
}

/// Blank transaction of `category`; callers fill in parties and references.
pub(crate) fn draft(
    world_id: WorldId,
    category: TransactionCategory,
    amount_minor: i64,
    at: DateTime<Utc>,
) -> NewTransaction {
    NewTransaction {
        id: TransactionId::generate(),
        world_id,
        category,
        amount_minor,
        tax_minor: 0,
        net_minor: amount_minor,
        sender: None,
        receiver: None,
        reference: None,
        memo: None,
        created_at: at,
    }
}

impl EconomyEngine {
    /// Validate a transfer and build its change set without committing.
    pub(crate) async fn prepare_transfer(
        &self,
        request: &TransferRequest,
    ) -> EconomyResult<PreparedTransfer> {
        require_positive(request.amount_minor, "transfer amount")?;
        if request.sender == request.receiver {
            return Err(EconomyError::InvalidRequest(
                "sender and receiver must differ".to_string(),
            ));
        }
        let world = self.load_world(request.world_id).await?;
        self.ensure_account_in_world(request.sender, world.id).await?;
        self.ensure_account_in_world(request.receiver, world.id).await?;

        let sender_slot = BalanceSlot::wallet_of(request.sender);
        self.ensure_funds(sender_slot, request.amount_minor).await?;

        let tax = if request.apply_tax && !request.receiver.is_treasury() {
            calculate_tax(request.amount_minor, &world.tax, request.category)
        } else {
            TaxBreakdown::untaxed(request.amount_minor)
        };
        debug!(
            world_id = %world.id,
            category = %request.category,
            gross_minor = tax.gross_minor,
            tax_minor = tax.tax_minor,
            rate_bps = tax.rate_bps,
            "Computed transfer tax"
        );

        let transaction = NewTransaction {
            tax_minor: tax.tax_minor,
            net_minor: tax.net_minor,
            sender: request.sender.party(),
            receiver: request.receiver.party(),
            reference: request.reference.clone(),
            memo: request.memo.clone(),
            ..draft(world.id, request.category, request.amount_minor, self.now())
        };
        let transaction_id = transaction.id;

        let mut changes = ChangeSet::new();
        changes
            .push(Effect::Debit {
                slot: sender_slot,
                amount_minor: request.amount_minor,
            })
            .push(Effect::Credit {
                slot: BalanceSlot::wallet_of(request.receiver),
                amount_minor: tax.net_minor,
            });
        if tax.tax_minor > 0 {
            changes
                .push(Effect::Credit {
                    slot: BalanceSlot::Treasury(world.id),
                    amount_minor: tax.tax_minor,
                })
                .push(Effect::BumpTreasuryCounter {
                    world_id: world.id,
                    counter: TreasuryCounter::TaxRevenue,
                    amount_minor: tax.tax_minor,
                });
        }
        changes.push(Effect::RecordTransaction(transaction));

        Ok(PreparedTransfer {
            changes,
            transaction_id,
            tax,
        })
    }

    /// Move value between two accounts of one world, withholding tax.
    pub async fn execute_transaction(
        &self,
        request: TransferRequest,
    ) -> EconomyResult<TransferReceipt> {
        let prepared = self.prepare_transfer(&request).await?;
        let transaction = recorded(self.commit(prepared.changes).await?)?;
        info!(
            world_id = %request.world_id,
            transaction_id = %transaction.id,
            sequence = transaction.sequence,
            category = %request.category,
            amount_minor = request.amount_minor,
            tax_minor = prepared.tax.tax_minor,
            "Transfer committed"
        );
        Ok(TransferReceipt {
            transaction_id: prepared.transaction_id,
            tax_minor: prepared.tax.tax_minor,
            net_minor: prepared.tax.net_minor,
            transaction,
        })
    }

    /// Transactions of a world, newest first.
    pub async fn history(
        &self,
        world_id: WorldId,
        window: QueryWindow,
    ) -> EconomyResult<Vec<Transaction>> {
        self.load_world(world_id).await?;
        Ok(self.store().transactions(world_id, window).await?)
    }

    /// Recompute the world's hash chain from genesis.
    pub async fn verify_chain(&self, world_id: WorldId) -> EconomyResult<ChainVerification> {
        self.load_world(world_id).await?;
        let chain = self.store().transaction_chain(world_id).await?;
        let report = verify_chain(world_id, &chain);
        if !report.valid {
            tracing::warn!(
                world_id = %world_id,
                first_invalid_sequence = ?report.first_invalid_sequence,
                "Ledger chain verification failed"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Fixture;

    #[tokio::test]
    async fn sales_tax_scenario_moves_exact_amounts() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 10_000).await;
        let bob = fx.citizen("bob", 0).await;
        let treasury_before = fx.treasury_balance().await;

        let receipt = fx
            .engine
            .execute_transaction(TransferRequest::new(
                fx.world_id,
                AccountRef::Citizen(alice),
                AccountRef::Citizen(bob),
                4_000,
                TransactionCategory::Payment,
            ))
            .await
            .unwrap();

        assert_eq!(receipt.tax_minor, 200);
        assert_eq!(receipt.net_minor, 3_800);
        assert_eq!(fx.wallet(alice).await, 6_000);
        assert_eq!(fx.wallet(bob).await, 3_800);
        assert_eq!(fx.treasury_balance().await, treasury_before + 200);

        let history = fx
            .engine
            .history(fx.world_id, QueryWindow::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].tax_minor, 200);
        assert_eq!(history[0].net_minor, 3_800);
    }

    #[tokio::test]
    async fn overdraft_leaves_no_trace() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 100).await;
        let bob = fx.citizen("bob", 0).await;

        let err = fx
            .engine
            .execute_transaction(TransferRequest::new(
                fx.world_id,
                AccountRef::Citizen(alice),
                AccountRef::Citizen(bob),
                101,
                TransactionCategory::Payment,
            ))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(fx.wallet(alice).await, 100);
        assert_eq!(fx.wallet(bob).await, 0);
        assert!(fx
            .engine
            .history(fx.world_id, QueryWindow::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn rejects_self_transfer_and_foreign_parties() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 100).await;
        let other = Fixture::new().await;
        let stranger = other.citizen("stranger", 0).await;

        let err = fx
            .engine
            .execute_transaction(TransferRequest::new(
                fx.world_id,
                AccountRef::Citizen(alice),
                AccountRef::Citizen(alice),
                10,
                TransactionCategory::Transfer,
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");

        let err = fx
            .engine
            .execute_transaction(TransferRequest::new(
                fx.world_id,
                AccountRef::Citizen(alice),
                AccountRef::Citizen(stranger),
                10,
                TransactionCategory::Transfer,
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn payments_to_the_treasury_are_untaxed() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 1_000).await;

        let receipt = fx
            .engine
            .execute_transaction(TransferRequest::new(
                fx.world_id,
                AccountRef::Citizen(alice),
                AccountRef::Treasury(fx.world_id),
                1_000,
                TransactionCategory::Payment,
            ))
            .await
            .unwrap();
        assert_eq!(receipt.tax_minor, 0);
        assert_eq!(receipt.net_minor, 1_000);
        assert_eq!(receipt.transaction.receiver, None);
    }

    #[tokio::test]
    async fn chain_stays_valid_across_transfers() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 10_000).await;
        let bob = fx.citizen("bob", 0).await;

        for amount in [100, 250, 999] {
            fx.engine
                .execute_transaction(
                    TransferRequest::new(
                        fx.world_id,
                        AccountRef::Citizen(alice),
                        AccountRef::Citizen(bob),
                        amount,
                        TransactionCategory::Wage,
                    )
                    .with_memo("shift"),
                )
                .await
                .unwrap();
        }

        let report = fx.engine.verify_chain(fx.world_id).await.unwrap();
        assert!(report.valid);
        assert_eq!(report.entries, 3);
    }
}
