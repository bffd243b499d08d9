//! Token-addressable pending transfers.
//!
//! An intent is created by an inbound surface, handed out as an opaque token
//! and later confirmed or cancelled by the declared sender. Expiry is lazy:
//! every operation first moves an overdue `PENDING` intent to `EXPIRED`.

use crate::engine::{require_positive, EconomyEngine};
use crate::error::{EconomyError, EconomyResult};
use crate::ledger::TransferRequest;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use vexium_store::{ChangeSet, Effect};
use vexium_types::{
    AccountRef, IntentId, IntentStatus, TransactionCategory, TransactionId, TransactionIntent,
    UserId, WorldId,
};

const TOKEN_LENGTH: usize = 48;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    pub world_id: WorldId,
    pub amount_minor: i64,
    pub category: TransactionCategory,
    pub sender: AccountRef,
    pub receiver: AccountRef,
    pub apply_tax: bool,
    pub memo: Option<String>,
}

/// Outcome of a successful confirmation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentExecution {
    pub intent_id: IntentId,
    pub transaction_id: TransactionId,
    pub tax_minor: i64,
    pub net_minor: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirySweep {
    pub examined: usize,
    pub expired: Vec<IntentId>,
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

impl EconomyEngine {
    pub async fn create_intent(&self, request: IntentRequest) -> EconomyResult<TransactionIntent> {
        require_positive(request.amount_minor, "intent amount")?;
        if request.sender == request.receiver {
            return Err(EconomyError::InvalidRequest(
                "sender and receiver must differ".to_string(),
            ));
        }
        let world = self.load_world(request.world_id).await?;
        self.ensure_account_in_world(request.sender, world.id).await?;
        self.ensure_account_in_world(request.receiver, world.id).await?;

        let sender_user = match request.sender {
            AccountRef::Citizen(id) => self.load_citizen(id).await?.user_id,
            AccountRef::Business(id) => {
                let business = self.load_business(id).await?;
                self.load_citizen(business.owner_id).await?.user_id
            }
            AccountRef::Treasury(_) => world.owner.clone(),
        };

        let now = self.now();
        let intent = TransactionIntent {
            id: IntentId::generate(),
            world_id: world.id,
            token: generate_token(),
            amount_minor: request.amount_minor,
            category: request.category,
            sender: request.sender,
            receiver: request.receiver,
            sender_user,
            apply_tax: request.apply_tax,
            memo: request.memo,
            status: IntentStatus::Pending,
            expires_at: now + self.config().intent_ttl,
            transaction_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.commit(ChangeSet::new().with(Effect::CreateIntent(intent.clone())))
            .await?;
        info!(
            world_id = %intent.world_id,
            intent_id = %intent.id,
            amount_minor = intent.amount_minor,
            expires_at = %intent.expires_at,
            "Transaction intent created"
        );
        Ok(intent)
    }

    /// Read an intent by token, expiring it first when overdue.
    pub async fn get_intent(&self, token: &str) -> EconomyResult<TransactionIntent> {
        self.load_live_intent(token).await
    }

    pub async fn confirm_intent(
        &self,
        token: &str,
        actor: &UserId,
    ) -> EconomyResult<IntentExecution> {
        let intent = self.load_live_intent(token).await?;
        ensure_sender(&intent, actor)?;
        ensure_pending(&intent)?;

        let claimed_at = self.now();
        self.commit(ChangeSet::new().with(Effect::TransitionIntent {
            intent_id: intent.id,
            from: IntentStatus::Pending,
            to: IntentStatus::Confirmed,
            transaction_id: None,
            failure_reason: None,
            at: claimed_at,
        }))
        .await?;

        let mut request = TransferRequest::new(
            intent.world_id,
            intent.sender,
            intent.receiver,
            intent.amount_minor,
            intent.category,
        )
        .with_reference(intent.id.to_string());
        request.apply_tax = intent.apply_tax;
        request.memo = intent.memo.clone();

        let outcome = match self.prepare_transfer(&request).await {
            Ok(prepared) => {
                let mut changes = prepared.changes;
                changes.push(Effect::TransitionIntent {
                    intent_id: intent.id,
                    from: IntentStatus::Confirmed,
                    to: IntentStatus::Executed,
                    transaction_id: Some(prepared.transaction_id),
                    failure_reason: None,
                    at: self.now(),
                });
                self.commit(changes).await.map(|_| IntentExecution {
                    intent_id: intent.id,
                    transaction_id: prepared.transaction_id,
                    tax_minor: prepared.tax.tax_minor,
                    net_minor: prepared.tax.net_minor,
                })
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(execution) => {
                info!(
                    intent_id = %intent.id,
                    transaction_id = %execution.transaction_id,
                    tax_minor = execution.tax_minor,
                    "Transaction intent executed"
                );
                Ok(execution)
            }
            Err(err) => {
                warn!(intent_id = %intent.id, code = err.code(), error = %err, "Transaction intent failed");
                let cancelled = self
                    .commit(ChangeSet::new().with(Effect::TransitionIntent {
                        intent_id: intent.id,
                        from: IntentStatus::Confirmed,
                        to: IntentStatus::Cancelled,
                        transaction_id: None,
                        failure_reason: Some(format!("{}: {}", err.code(), err)),
                        at: self.now(),
                    }))
                    .await;
                if let Err(cancel_err) = cancelled {
                    error!(
                        intent_id = %intent.id,
                        code = cancel_err.code(),
                        error = %cancel_err,
                        "Failed intent could not be cancelled; left CONFIRMED"
                    );
                }
                Err(err)
            }
        }
    }

    pub async fn cancel_intent(
        &self,
        token: &str,
        actor: &UserId,
    ) -> EconomyResult<TransactionIntent> {
        let intent = self.load_live_intent(token).await?;
        ensure_sender(&intent, actor)?;
        ensure_pending(&intent)?;

        self.commit(ChangeSet::new().with(Effect::TransitionIntent {
            intent_id: intent.id,
            from: IntentStatus::Pending,
            to: IntentStatus::Cancelled,
            transaction_id: None,
            failure_reason: None,
            at: self.now(),
        }))
        .await?;
        info!(intent_id = %intent.id, "Transaction intent cancelled");
        self.intent_record(intent.id).await
    }

    /// Expire every overdue pending intent of a world.
    pub async fn expire_stale_intents(&self, world_id: WorldId) -> EconomyResult<ExpirySweep> {
        self.load_world(world_id).await?;
        let now = self.now();
        let pending = self.store().pending_intents(world_id).await?;
        let mut sweep = ExpirySweep {
            examined: pending.len(),
            expired: Vec::new(),
        };
        for intent in pending.into_iter().filter(|intent| intent.is_overdue(now)) {
            match self.expire(&intent).await {
                Ok(()) => sweep.expired.push(intent.id),
                Err(err) => {
                    warn!(intent_id = %intent.id, error = %err, "Intent expiry skipped")
                }
            }
        }
        info!(
            world_id = %world_id,
            examined = sweep.examined,
            expired = sweep.expired.len(),
            "Intent expiry sweep finished"
        );
        Ok(sweep)
    }

    async fn intent_record(&self, intent_id: IntentId) -> EconomyResult<TransactionIntent> {
        self.store()
            .intent(intent_id)
            .await?
            .ok_or_else(|| EconomyError::not_found("intent", intent_id))
    }

    async fn load_live_intent(&self, token: &str) -> EconomyResult<TransactionIntent> {
        let intent = self
            .store()
            .intent_by_token(token)
            .await?
            .ok_or_else(|| EconomyError::NotFound("intent for token".to_string()))?;
        if !intent.is_overdue(self.now()) {
            return Ok(intent);
        }
        match self.expire(&intent).await {
            // Lost the race to another expiry or confirmation; report expiry
            // only if that is what happened.
            Ok(()) | Err(EconomyError::AlreadyProcessed {
                status: IntentStatus::Expired,
                ..
            }) => Err(EconomyError::Expired {
                intent_id: intent.id,
                expired_at: intent.expires_at,
            }),
            Err(err) => Err(err),
        }
    }

    async fn expire(&self, intent: &TransactionIntent) -> EconomyResult<()> {
        self.commit(ChangeSet::new().with(Effect::TransitionIntent {
            intent_id: intent.id,
            from: IntentStatus::Pending,
            to: IntentStatus::Expired,
            transaction_id: None,
            failure_reason: None,
            at: self.now(),
        }))
        .await?;
        info!(intent_id = %intent.id, expires_at = %intent.expires_at, "Transaction intent expired");
        Ok(())
    }
}

fn ensure_sender(intent: &TransactionIntent, actor: &UserId) -> EconomyResult<()> {
    if &intent.sender_user != actor {
        return Err(EconomyError::Unauthorized(format!(
            "only the sender may act on intent {}",
            intent.id
        )));
    }
    Ok(())
}

fn ensure_pending(intent: &TransactionIntent) -> EconomyResult<()> {
    if intent.status != IntentStatus::Pending {
        return Err(EconomyError::AlreadyProcessed {
            intent_id: intent.id,
            status: intent.status,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::Fixture;
    use chrono::Duration;
    use vexium_types::CitizenId;

    fn payment(fx: &Fixture, from: CitizenId, to: CitizenId, amount_minor: i64) -> IntentRequest {
        IntentRequest {
            world_id: fx.world_id,
            amount_minor,
            category: TransactionCategory::Payment,
            sender: AccountRef::Citizen(from),
            receiver: AccountRef::Citizen(to),
            apply_tax: true,
            memo: Some("bread".to_string()),
        }
    }

    #[tokio::test]
    async fn confirm_executes_once() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 10_000).await;
        let bob = fx.citizen("bob", 0).await;
        let intent = fx
            .engine
            .create_intent(payment(&fx, alice, bob, 4_000))
            .await
            .unwrap();
        assert_eq!(intent.token.len(), 48);
        assert!(intent.token.chars().all(|c| c.is_ascii_alphanumeric()));

        let execution = fx
            .engine
            .confirm_intent(&intent.token, &UserId::new("alice"))
            .await
            .unwrap();
        assert_eq!(execution.tax_minor, 200);
        assert_eq!(execution.net_minor, 3_800);

        let err = fx
            .engine
            .confirm_intent(&intent.token, &UserId::new("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_PROCESSED");

        let stored = fx.engine.get_intent(&intent.token).await.unwrap();
        assert_eq!(stored.status, IntentStatus::Executed);
        assert_eq!(stored.transaction_id, Some(execution.transaction_id));
        assert_eq!(fx.wallet(bob).await, 3_800);
    }

    #[tokio::test]
    async fn only_the_sender_may_confirm_or_cancel() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 10_000).await;
        let bob = fx.citizen("bob", 0).await;
        let intent = fx
            .engine
            .create_intent(payment(&fx, alice, bob, 100))
            .await
            .unwrap();

        let err = fx
            .engine
            .confirm_intent(&intent.token, &UserId::new("bob"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
        let err = fx
            .engine
            .cancel_intent(&intent.token, &UserId::new("bob"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");

        let cancelled = fx
            .engine
            .cancel_intent(&intent.token, &UserId::new("alice"))
            .await
            .unwrap();
        assert_eq!(cancelled.status, IntentStatus::Cancelled);
        assert_eq!(fx.wallet(alice).await, 10_000);
    }

    #[tokio::test]
    async fn overdue_intent_expires_exactly_once() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 10_000).await;
        let bob = fx.citizen("bob", 0).await;
        let intent = fx
            .engine
            .create_intent(payment(&fx, alice, bob, 100))
            .await
            .unwrap();

        fx.clock.advance(Duration::minutes(16));

        let err = fx.engine.get_intent(&intent.token).await.unwrap_err();
        assert_eq!(err.code(), "EXPIRED");

        let stored = fx.engine.get_intent(&intent.token).await.unwrap();
        assert_eq!(stored.status, IntentStatus::Expired);

        let err = fx
            .engine
            .confirm_intent(&intent.token, &UserId::new("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_PROCESSED");
        assert_eq!(fx.wallet(alice).await, 10_000);
    }

    #[tokio::test]
    async fn ledger_failure_cancels_with_reason() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 50).await;
        let bob = fx.citizen("bob", 0).await;
        let intent = fx
            .engine
            .create_intent(payment(&fx, alice, bob, 100))
            .await
            .unwrap();

        let err = fx
            .engine
            .confirm_intent(&intent.token, &UserId::new("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");

        let stored = fx.engine.get_intent(&intent.token).await.unwrap();
        assert_eq!(stored.status, IntentStatus::Cancelled);
        assert!(stored
            .failure_reason
            .as_deref()
            .unwrap_or_default()
            .starts_with("INSUFFICIENT_FUNDS"));
    }

    #[tokio::test]
    async fn sweep_expires_only_overdue_intents() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 10_000).await;
        let bob = fx.citizen("bob", 0).await;
        let stale = fx
            .engine
            .create_intent(payment(&fx, alice, bob, 100))
            .await
            .unwrap();
        fx.clock.advance(Duration::minutes(10));
        let fresh = fx
            .engine
            .create_intent(payment(&fx, alice, bob, 200))
            .await
            .unwrap();
        fx.clock.advance(Duration::minutes(6));

        let sweep = fx.engine.expire_stale_intents(fx.world_id).await.unwrap();
        assert_eq!(sweep.examined, 2);
        assert_eq!(sweep.expired, vec![stale.id]);

        let fresh = fx.engine.get_intent(&fresh.token).await.unwrap();
        assert_eq!(fresh.status, IntentStatus::Pending);
    }
}
