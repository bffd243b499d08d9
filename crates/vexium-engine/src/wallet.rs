//! Raw balance access for citizens, businesses and the treasury.
//!
//! These calls move value without recording a ledger transaction; economic
//! transfers go through [`EconomyEngine::execute_transaction`].

use crate::engine::{require_positive, EconomyEngine};
use crate::error::EconomyResult;
use tracing::info;
use vexium_store::{BalanceSlot, ChangeSet, Effect};
use vexium_types::{AccountRef, Balance, CitizenId};

impl EconomyEngine {
    pub async fn balance(&self, account: AccountRef) -> EconomyResult<Balance> {
        match account {
            AccountRef::Citizen(id) => {
                let citizen = self.load_citizen(id).await?;
                Ok(Balance {
                    account,
                    wallet_minor: citizen.wallet_minor,
                    bank_minor: Some(citizen.bank_minor),
                })
            }
            AccountRef::Business(id) => Ok(Balance {
                account,
                wallet_minor: self.load_business(id).await?.wallet_minor,
                bank_minor: None,
            }),
            AccountRef::Treasury(id) => Ok(Balance {
                account,
                wallet_minor: self.load_treasury(id).await?.balance_minor,
                bank_minor: None,
            }),
        }
    }

    pub async fn deposit(&self, account: AccountRef, amount_minor: i64) -> EconomyResult<Balance> {
        require_positive(amount_minor, "deposit")?;
        self.commit(ChangeSet::new().with(Effect::Credit {
            slot: BalanceSlot::wallet_of(account),
            amount_minor,
        }))
        .await?;
        info!(account = %account, amount_minor, "Wallet deposit");
        self.balance(account).await
    }

    pub async fn withdraw(&self, account: AccountRef, amount_minor: i64) -> EconomyResult<Balance> {
        require_positive(amount_minor, "withdrawal")?;
        let slot = BalanceSlot::wallet_of(account);
        self.ensure_funds(slot, amount_minor).await?;
        self.commit(ChangeSet::new().with(Effect::Debit { slot, amount_minor }))
            .await?;
        info!(account = %account, amount_minor, "Wallet withdrawal");
        self.balance(account).await
    }

    /// Move spendable funds into the citizen's bank reserve.
    pub async fn transfer_to_reserve(
        &self,
        citizen_id: CitizenId,
        amount_minor: i64,
    ) -> EconomyResult<Balance> {
        self.move_between_slots(
            citizen_id,
            BalanceSlot::CitizenWallet(citizen_id),
            BalanceSlot::CitizenBank(citizen_id),
            amount_minor,
        )
        .await
    }

    /// Move reserve funds back into the citizen's wallet.
    pub async fn transfer_from_reserve(
        &self,
        citizen_id: CitizenId,
        amount_minor: i64,
    ) -> EconomyResult<Balance> {
        self.move_between_slots(
            citizen_id,
            BalanceSlot::CitizenBank(citizen_id),
            BalanceSlot::CitizenWallet(citizen_id),
            amount_minor,
        )
        .await
    }

    async fn move_between_slots(
        &self,
        citizen_id: CitizenId,
        from: BalanceSlot,
        to: BalanceSlot,
        amount_minor: i64,
    ) -> EconomyResult<Balance> {
        require_positive(amount_minor, "reserve transfer")?;
        self.ensure_funds(from, amount_minor).await?;
        self.commit(
            ChangeSet::new()
                .with(Effect::Debit {
                    slot: from,
                    amount_minor,
                })
                .with(Effect::Credit {
                    slot: to,
                    amount_minor,
                }),
        )
        .await?;
        info!(from = %from, to = %to, amount_minor, "Reserve transfer");
        self.balance(AccountRef::Citizen(citizen_id)).await
    }
}

#[cfg(test)]
mod tests {
    use crate::testkit::Fixture;
    use vexium_types::AccountRef;

    #[tokio::test]
    async fn withdraw_rejects_overdraft_without_change() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 1_000).await;

        let err = fx
            .engine
            .withdraw(AccountRef::Citizen(alice), 1_001)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(fx.wallet(alice).await, 1_000);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 1_000).await;

        for amount in [0, -5] {
            let err = fx
                .engine
                .deposit(AccountRef::Citizen(alice), amount)
                .await
                .unwrap_err();
            assert_eq!(err.code(), "INVALID_AMOUNT");
        }
    }

    #[tokio::test]
    async fn reserve_round_trip_keeps_total() {
        let fx = Fixture::new().await;
        let alice = fx.citizen("alice", 1_000).await;

        let balance = fx.engine.transfer_to_reserve(alice, 400).await.unwrap();
        assert_eq!(balance.wallet_minor, 600);
        assert_eq!(balance.bank_minor, Some(400));

        let err = fx.engine.transfer_from_reserve(alice, 401).await.unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");

        let balance = fx.engine.transfer_from_reserve(alice, 400).await.unwrap();
        assert_eq!(balance.wallet_minor, 1_000);
        assert_eq!(balance.bank_minor, Some(0));
    }

    #[tokio::test]
    async fn treasury_withdrawal_reports_treasury_shortfall() {
        let fx = Fixture::new().await;
        let err = fx
            .engine
            .withdraw(AccountRef::Treasury(fx.world_id), 10_000_000)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_TREASURY");
    }
}
