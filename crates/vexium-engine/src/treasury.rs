//! Treasury revenue, subsidies and loans.

use crate::engine::{recorded, require_positive, BatchFailure, EconomyEngine};
use crate::error::{EconomyError, EconomyResult};
use crate::ledger::draft;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vexium_store::{BalanceSlot, ChangeSet, Effect, QueryWindow};
use vexium_types::{
    AccountRef, CitizenId, Loan, LoanId, LoanStatus, Party, Transaction, TransactionCategory,
    TransactionId, Treasury, TreasuryCounter, WorldId,
};

/// Revenue stream credited by [`EconomyEngine::route_to_treasury`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevenueKind {
    Tax,
    Permit,
    Land,
}

impl RevenueKind {
    fn counter(self) -> TreasuryCounter {
        match self {
            Self::Tax => TreasuryCounter::TaxRevenue,
            Self::Permit => TreasuryCounter::PermitRevenue,
            Self::Land => TreasuryCounter::LandRevenue,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeKind {
    Permit,
    Land,
}

impl FeeKind {
    fn category(self) -> TransactionCategory {
        match self {
            Self::Permit => TransactionCategory::PermitFee,
            Self::Land => TransactionCategory::LandPurchase,
        }
    }

    fn counter(self) -> TreasuryCounter {
        match self {
            Self::Permit => TreasuryCounter::PermitRevenue,
            Self::Land => TreasuryCounter::LandRevenue,
        }
    }
}

/// Requested loan terms. The rate is signed so callers get a clean rejection
/// instead of a wrapped value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub principal_minor: i64,
    pub interest_rate_bps: i64,
    pub term_months: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanIssued {
    pub loan: Loan,
    pub transaction: Transaction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanPayment {
    pub loan_id: LoanId,
    pub transaction_id: TransactionId,
    pub amount_minor: i64,
    pub amount_paid_minor: i64,
    pub outstanding_minor: i64,
    pub status: LoanStatus,
    pub next_payment_due: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanBatchReport {
    pub due: usize,
    pub payments: Vec<LoanPayment>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub loan_id: LoanId,
    pub borrower_id: CitizenId,
    pub principal_minor: i64,
    pub outstanding_minor: i64,
    pub next_payment_due: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryReport {
    pub treasury: Treasury,
    pub active_loans: Vec<LoanSummary>,
    pub outstanding_loans_minor: i64,
    pub recent_transactions: Vec<Transaction>,
}

impl EconomyEngine {
    /// Credit revenue collected elsewhere. The source is recorded but not
    /// debited.
    pub async fn route_to_treasury(
        &self,
        world_id: WorldId,
        amount_minor: i64,
        kind: RevenueKind,
        source: Option<Party>,
        memo: Option<String>,
    ) -> EconomyResult<Transaction> {
        require_positive(amount_minor, "treasury revenue")?;
        self.load_world(world_id).await?;
        if let Some(party) = source {
            self.ensure_account_in_world(party.into(), world_id).await?;
        }

        let transaction = vexium_types::NewTransaction {
            sender: source,
            memo,
            ..draft(world_id, TransactionCategory::Tax, amount_minor, self.now())
        };
        let changes = ChangeSet::new()
            .with(Effect::Credit {
                slot: BalanceSlot::Treasury(world_id),
                amount_minor,
            })
            .with(Effect::BumpTreasuryCounter {
                world_id,
                counter: kind.counter(),
                amount_minor,
            })
            .with(Effect::RecordTransaction(transaction));
        let transaction = recorded(self.commit(changes).await?)?;
        info!(world_id = %world_id, amount_minor, kind = ?kind, "Revenue routed to treasury");
        Ok(transaction)
    }

    pub async fn collect_fee(
        &self,
        world_id: WorldId,
        citizen_id: CitizenId,
        kind: FeeKind,
        amount_minor: i64,
        memo: Option<String>,
    ) -> EconomyResult<Transaction> {
        require_positive(amount_minor, "fee")?;
        self.load_world(world_id).await?;
        let payer = AccountRef::Citizen(citizen_id);
        self.ensure_account_in_world(payer, world_id).await?;
        let slot = BalanceSlot::CitizenWallet(citizen_id);
        self.ensure_funds(slot, amount_minor).await?;

        let transaction = vexium_types::NewTransaction {
            sender: payer.party(),
            memo,
            ..draft(world_id, kind.category(), amount_minor, self.now())
        };
        let changes = ChangeSet::new()
            .with(Effect::Debit { slot, amount_minor })
            .with(Effect::Credit {
                slot: BalanceSlot::Treasury(world_id),
                amount_minor,
            })
            .with(Effect::BumpTreasuryCounter {
                world_id,
                counter: kind.counter(),
                amount_minor,
            })
            .with(Effect::RecordTransaction(transaction));
        let transaction = recorded(self.commit(changes).await?)?;
        info!(
            world_id = %world_id,
            citizen_id = %citizen_id,
            amount_minor,
            category = %transaction.category,
            "Fee collected"
        );
        Ok(transaction)
    }

    pub async fn issue_subsidy(
        &self,
        world_id: WorldId,
        recipient: Party,
        amount_minor: i64,
        memo: Option<String>,
    ) -> EconomyResult<Transaction> {
        require_positive(amount_minor, "subsidy")?;
        self.load_world(world_id).await?;
        let account: AccountRef = recipient.into();
        self.ensure_account_in_world(account, world_id).await?;
        let treasury = BalanceSlot::Treasury(world_id);
        self.ensure_funds(treasury, amount_minor).await?;

        let transaction = vexium_types::NewTransaction {
            receiver: Some(recipient),
            memo,
            ..draft(world_id, TransactionCategory::Subsidy, amount_minor, self.now())
        };
        let changes = ChangeSet::new()
            .with(Effect::Debit {
                slot: treasury,
                amount_minor,
            })
            .with(Effect::Credit {
                slot: BalanceSlot::wallet_of(account),
                amount_minor,
            })
            .with(Effect::BumpTreasuryCounter {
                world_id,
                counter: TreasuryCounter::SubsidiesPaid,
                amount_minor,
            })
            .with(Effect::RecordTransaction(transaction));
        let transaction = recorded(self.commit(changes).await?)?;
        info!(world_id = %world_id, recipient = %account, amount_minor, "Subsidy issued");
        Ok(transaction)
    }

    pub async fn issue_loan(
        &self,
        world_id: WorldId,
        borrower_id: CitizenId,
        terms: LoanTerms,
    ) -> EconomyResult<LoanIssued> {
        require_positive(terms.principal_minor, "loan principal")?;
        let interest_rate_bps = u32::try_from(terms.interest_rate_bps).map_err(|_| {
            EconomyError::InvalidRequest(format!(
                "interest rate must be non-negative, got {} bps",
                terms.interest_rate_bps
            ))
        })?;
        let term_months = u32::try_from(terms.term_months)
            .ok()
            .filter(|months| *months > 0)
            .ok_or_else(|| {
                EconomyError::InvalidRequest(format!(
                    "loan term must be positive, got {} months",
                    terms.term_months
                ))
            })?;

        self.load_world(world_id).await?;
        let borrower = AccountRef::Citizen(borrower_id);
        self.ensure_account_in_world(borrower, world_id).await?;
        let treasury = BalanceSlot::Treasury(world_id);
        if let Err(err) = self.ensure_funds(treasury, terms.principal_minor).await {
            warn!(
                world_id = %world_id,
                principal_minor = terms.principal_minor,
                "Loan rejected by treasury balance"
            );
            return Err(err);
        }

        let now = self.now();
        let loan = Loan {
            id: LoanId::generate(),
            world_id,
            borrower_id,
            principal_minor: terms.principal_minor,
            interest_rate_bps,
            term_months,
            amount_paid_minor: 0,
            next_payment_due: Some(now + self.config().loan_payment_interval),
            status: LoanStatus::Active,
            issued_at: now,
        };
        let transaction = vexium_types::NewTransaction {
            receiver: borrower.party(),
            reference: Some(loan.id.to_string()),
            ..draft(
                world_id,
                TransactionCategory::LoanDisbursement,
                terms.principal_minor,
                now,
            )
        };
        let changes = ChangeSet::new()
            .with(Effect::Debit {
                slot: treasury,
                amount_minor: terms.principal_minor,
            })
            .with(Effect::BumpTreasuryCounter {
                world_id,
                counter: TreasuryCounter::LoansIssued,
                amount_minor: terms.principal_minor,
            })
            .with(Effect::Credit {
                slot: BalanceSlot::CitizenWallet(borrower_id),
                amount_minor: terms.principal_minor,
            })
            .with(Effect::CreateLoan(loan.clone()))
            .with(Effect::RecordTransaction(transaction));
        let transaction = recorded(self.commit(changes).await?)?;
        info!(
            world_id = %world_id,
            loan_id = %loan.id,
            borrower_id = %borrower_id,
            principal_minor = loan.principal_minor,
            total_owed_minor = loan.total_owed_minor(),
            "Loan issued"
        );
        Ok(LoanIssued { loan, transaction })
    }

    /// Collect one installment from the borrower's wallet.
    pub async fn process_loan_payment(&self, loan_id: LoanId) -> EconomyResult<LoanPayment> {
        let loan = self.load_loan(loan_id).await?;
        if loan.status != LoanStatus::Active {
            return Err(EconomyError::LoanNotActive(loan_id));
        }
        let installment = loan.next_installment_minor();
        debug!(
            loan_id = %loan_id,
            installment_minor = installment,
            outstanding_minor = loan.outstanding_minor(),
            "Computed loan installment"
        );
        let slot = BalanceSlot::CitizenWallet(loan.borrower_id);
        self.ensure_funds(slot, installment).await?;

        let now = self.now();
        let amount_paid_minor = loan.amount_paid_minor + installment;
        let paid_off = amount_paid_minor >= loan.total_owed_minor();
        let next_payment_due = if paid_off {
            None
        } else {
            Some(loan.next_payment_due.unwrap_or(now) + self.config().loan_payment_interval)
        };

        let transaction = vexium_types::NewTransaction {
            sender: Some(Party::Citizen(loan.borrower_id)),
            reference: Some(loan_id.to_string()),
            ..draft(
                loan.world_id,
                TransactionCategory::LoanRepayment,
                installment,
                now,
            )
        };
        let changes = ChangeSet::new()
            .with(Effect::Debit {
                slot,
                amount_minor: installment,
            })
            .with(Effect::Credit {
                slot: BalanceSlot::Treasury(loan.world_id),
                amount_minor: installment,
            })
            .with(Effect::ApplyLoanPayment {
                loan_id,
                expected_paid_minor: loan.amount_paid_minor,
                amount_minor: installment,
                next_payment_due,
                paid_off,
            })
            .with(Effect::RecordTransaction(transaction));
        let transaction = recorded(self.commit(changes).await?)?;

        let status = if paid_off {
            LoanStatus::PaidOff
        } else {
            LoanStatus::Active
        };
        info!(
            loan_id = %loan_id,
            amount_minor = installment,
            amount_paid_minor,
            status = %status,
            "Loan payment collected"
        );
        Ok(LoanPayment {
            loan_id,
            transaction_id: transaction.id,
            amount_minor: installment,
            amount_paid_minor,
            outstanding_minor: (loan.total_owed_minor() - amount_paid_minor).max(0),
            status,
            next_payment_due,
        })
    }

    /// Collect every installment that has fallen due.
    pub async fn process_due_loan_payments(
        &self,
        world_id: WorldId,
    ) -> EconomyResult<LoanBatchReport> {
        self.load_world(world_id).await?;
        let now = self.now();
        let due: Vec<Loan> = self
            .store()
            .loans(world_id)
            .await?
            .into_iter()
            .filter(|loan| loan.is_due(now))
            .collect();

        let mut report = LoanBatchReport {
            due: due.len(),
            ..LoanBatchReport::default()
        };
        for loan in due {
            match self.process_loan_payment(loan.id).await {
                Ok(payment) => report.payments.push(payment),
                Err(err) => {
                    warn!(loan_id = %loan.id, code = err.code(), error = %err, "Loan payment failed");
                    report.failures.push(BatchFailure::new(loan.id, &err));
                }
            }
        }
        info!(
            world_id = %world_id,
            due = report.due,
            collected = report.payments.len(),
            failed = report.failures.len(),
            "Loan payment batch finished"
        );
        Ok(report)
    }

    pub async fn treasury_report(&self, world_id: WorldId) -> EconomyResult<TreasuryReport> {
        self.load_world(world_id).await?;
        let treasury = self.load_treasury(world_id).await?;

        let active_loans: Vec<LoanSummary> = self
            .store()
            .loans(world_id)
            .await?
            .into_iter()
            .filter(|loan| loan.status == LoanStatus::Active)
            .map(|loan| LoanSummary {
                loan_id: loan.id,
                borrower_id: loan.borrower_id,
                principal_minor: loan.principal_minor,
                outstanding_minor: loan.outstanding_minor(),
                next_payment_due: loan.next_payment_due,
            })
            .collect();
        let outstanding_loans_minor = active_loans.iter().map(|loan| loan.outstanding_minor).sum();

        let limit = self.config().treasury_report_limit;
        let page = limit.max(1) * 4;
        let mut recent_transactions = Vec::with_capacity(limit);
        let mut offset = 0;
        while recent_transactions.len() < limit {
            let batch = self
                .store()
                .transactions(world_id, QueryWindow::new(page, offset))
                .await?;
            let exhausted = batch.len() < page;
            offset += batch.len();
            recent_transactions.extend(
                batch
                    .into_iter()
                    .filter(|tx| tx.category.is_treasury_related())
                    .take(limit - recent_transactions.len()),
            );
            if exhausted {
                break;
            }
        }

        Ok(TreasuryReport {
            treasury,
            active_loans,
            outstanding_loans_minor,
            recent_transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Fixture;
    use chrono::Duration;

    fn terms(principal_minor: i64, interest_rate_bps: i64, term_months: i64) -> LoanTerms {
        LoanTerms {
            principal_minor,
            interest_rate_bps,
            term_months,
        }
    }

    #[tokio::test]
    async fn fees_credit_treasury_and_counters() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 1_000).await;
        let before = fx.treasury_balance().await;

        let tx = fx
            .engine
            .collect_fee(fx.world_id, alice, FeeKind::Permit, 250, None)
            .await
            .unwrap();
        assert_eq!(tx.category, TransactionCategory::PermitFee);
        assert_eq!(tx.sender, Some(Party::Citizen(alice)));

        let err = fx
            .engine
            .collect_fee(fx.world_id, alice, FeeKind::Land, 751, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");

        let report = fx.engine.treasury_report(fx.world_id).await.unwrap();
        assert_eq!(report.treasury.balance_minor, before + 250);
        assert_eq!(report.treasury.permit_revenue_minor, 250);
        assert_eq!(report.treasury.land_revenue_minor, 0);
        assert_eq!(fx.wallet(alice).await, 750);
    }

    #[tokio::test]
    async fn routed_revenue_is_recorded_as_tax() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 0).await;
        let tx = fx
            .engine
            .route_to_treasury(
                fx.world_id,
                40,
                RevenueKind::Land,
                Some(Party::Citizen(alice)),
                Some("plot 7".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(tx.category, TransactionCategory::Tax);
        assert_eq!(tx.receiver, None);

        let treasury = fx.engine.treasury_report(fx.world_id).await.unwrap().treasury;
        assert_eq!(treasury.land_revenue_minor, 40);
        assert_eq!(fx.wallet(alice).await, 0);
    }

    #[tokio::test]
    async fn subsidy_beyond_treasury_is_rejected() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 0).await;
        let available = fx.treasury_balance().await;

        let err = fx
            .engine
            .issue_subsidy(fx.world_id, Party::Citizen(alice), available + 1, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_TREASURY");

        fx.engine
            .issue_subsidy(fx.world_id, Party::Citizen(alice), 500, None)
            .await
            .unwrap();
        assert_eq!(fx.wallet(alice).await, 500);
        let treasury = fx.engine.treasury_report(fx.world_id).await.unwrap().treasury;
        assert_eq!(treasury.subsidies_paid_minor, 500);
        assert_eq!(treasury.balance_minor, available - 500);
    }

    #[tokio::test]
    async fn loan_terms_are_validated() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 0).await;

        let cases = [
            (terms(0, 100, 12), "INVALID_AMOUNT"),
            (terms(1_000, -1, 12), "INVALID_REQUEST"),
            (terms(1_000, 100, 0), "INVALID_REQUEST"),
            (terms(100_000_000, 100, 12), "INSUFFICIENT_TREASURY"),
        ];
        for (terms, code) in cases {
            let err = fx
                .engine
                .issue_loan(fx.world_id, alice, terms)
                .await
                .unwrap_err();
            assert_eq!(err.code(), code);
        }
    }

    #[tokio::test]
    async fn loan_repays_in_installments_then_closes() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 20_000).await;

        let issued = fx
            .engine
            .issue_loan(fx.world_id, alice, terms(100_000, 1_000, 10))
            .await
            .unwrap();
        assert_eq!(issued.loan.total_owed_minor(), 110_000);
        assert_eq!(issued.transaction.category, TransactionCategory::LoanDisbursement);
        assert_eq!(fx.wallet(alice).await, 120_000);

        let mut paid = 0;
        let mut last = None;
        for _ in 0..10 {
            let payment = fx.engine.process_loan_payment(issued.loan.id).await.unwrap();
            assert_eq!(payment.amount_minor, 11_000);
            paid += payment.amount_minor;
            last = Some(payment);
        }
        let last = last.unwrap();
        assert_eq!(last.status, LoanStatus::PaidOff);
        assert_eq!(last.next_payment_due, None);
        assert_eq!(last.amount_paid_minor, paid);
        assert_eq!(fx.wallet(alice).await, 10_000);

        let err = fx
            .engine
            .process_loan_payment(issued.loan.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LOAN_NOT_ACTIVE");
    }

    #[tokio::test]
    async fn due_batch_isolates_short_borrowers() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 5_000).await;
        let bob = fx.citizen("bob", 0).await;

        let good = fx
            .engine
            .issue_loan(fx.world_id, alice, terms(10_000, 0, 2))
            .await
            .unwrap();
        let bad = fx
            .engine
            .issue_loan(fx.world_id, bob, terms(10_000, 0, 2))
            .await
            .unwrap();
        fx.engine
            .transfer_to_reserve(bob, 10_000)
            .await
            .unwrap();

        let early = fx
            .engine
            .process_due_loan_payments(fx.world_id)
            .await
            .unwrap();
        assert_eq!(early.due, 0);

        fx.clock.advance(Duration::days(31));
        let report = fx
            .engine
            .process_due_loan_payments(fx.world_id)
            .await
            .unwrap();
        assert_eq!(report.due, 2);
        assert_eq!(report.payments.len(), 1);
        assert_eq!(report.payments[0].loan_id, good.loan.id);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].entity_id, bad.loan.id.to_string());
        assert_eq!(report.failures[0].code, "INSUFFICIENT_FUNDS");

        let summary = fx.engine.treasury_report(fx.world_id).await.unwrap();
        assert_eq!(summary.active_loans.len(), 2);
        assert_eq!(summary.outstanding_loans_minor, 15_000);
        assert_eq!(summary.recent_transactions.len(), 3);
        assert_eq!(
            summary.recent_transactions[0].category,
            TransactionCategory::LoanRepayment
        );
    }
}
