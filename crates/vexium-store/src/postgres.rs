//! PostgreSQL adapter for the economy store.
//!
//! This is the transactional source-of-truth backend. One [`ChangeSet`] maps to
//! one database transaction; guarded effects are conditional `UPDATE`s whose
//! zero-row outcome aborts the whole transaction. Appends to a world's hash
//! chain are serialized with a transaction-scoped advisory lock per world.

use crate::effect::{BalanceSlot, ChangeSet, CommitReceipt, Effect, NEED_TOLERANCE};
use crate::error::GuardViolation;
use crate::traits::{EconomyStore, QueryWindow};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;
use vexium_types::{
    AccountRef, Business, BusinessId, Citizen, CitizenId, DecayConfig, DecayEvent, IntentId,
    InventoryItem, Loan, LoanId, NeedKind, Party, ProductionLine, Region, ReplenishPricing,
    Resource, ResourceDeposit, ResourceId, SurvivalNeeds, TaxConfig, Transaction, TransactionId,
    TransactionIntent, Treasury, UserId, World, WorldId, NEED_MAX,
};

const WORLD_COLUMNS: &str = "id, name, owner, currency_name, currency_symbol, tax, decay, pricing, \
     starting_balance_minor, active, created_at";
const TREASURY_COLUMNS: &str = "world_id, balance_minor, tax_revenue_minor, permit_revenue_minor, \
     land_revenue_minor, subsidies_paid_minor, loans_issued_minor";
const CITIZEN_COLUMNS: &str =
    "id, world_id, user_id, display_name, wallet_minor, bank_minor, active, joined_at";
const BUSINESS_COLUMNS: &str = "id, world_id, owner_id, name, wallet_minor, operating_cost_minor, \
     production_capacity, active, operating, inputs, outputs, created_at";
const TRANSACTION_COLUMNS: &str = "id, world_id, sequence, category, amount_minor, tax_minor, \
     net_minor, sender_citizen_id, sender_business_id, receiver_citizen_id, receiver_business_id, \
     reference, memo, created_at, previous_hash, entry_hash";
const LOAN_COLUMNS: &str = "id, world_id, borrower_id, principal_minor, interest_rate_bps, \
     term_months, amount_paid_minor, next_payment_due, status, issued_at";
const INTENT_COLUMNS: &str = "id, world_id, token, amount_minor, category, sender, receiver, \
     sender_user, apply_tax, memo, status, expires_at, transaction_id, failure_reason, \
     created_at, updated_at";

/// PostgreSQL-backed economy store.
#[derive(Clone)]
pub struct PostgresEconomyStore {
    pool: PgPool,
}

impl PostgresEconomyStore {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect postgres: {e}")))?;
        Self::from_pool(pool).await
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Idempotent schema bootstrap.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS vx_worlds (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                owner TEXT NOT NULL,
                currency_name TEXT NOT NULL,
                currency_symbol TEXT NOT NULL,
                tax JSONB NOT NULL,
                decay JSONB NOT NULL,
                pricing JSONB NOT NULL,
                starting_balance_minor BIGINT NOT NULL CHECK (starting_balance_minor >= 0),
                active BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_treasuries (
                world_id UUID PRIMARY KEY REFERENCES vx_worlds(id),
                balance_minor BIGINT NOT NULL CHECK (balance_minor >= 0),
                tax_revenue_minor BIGINT NOT NULL DEFAULT 0,
                permit_revenue_minor BIGINT NOT NULL DEFAULT 0,
                land_revenue_minor BIGINT NOT NULL DEFAULT 0,
                subsidies_paid_minor BIGINT NOT NULL DEFAULT 0,
                loans_issued_minor BIGINT NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_citizens (
                id UUID PRIMARY KEY,
                world_id UUID NOT NULL REFERENCES vx_worlds(id),
                user_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                wallet_minor BIGINT NOT NULL CHECK (wallet_minor >= 0),
                bank_minor BIGINT NOT NULL CHECK (bank_minor >= 0),
                active BOOLEAN NOT NULL,
                joined_at TIMESTAMPTZ NOT NULL,
                UNIQUE (world_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_regions (
                id UUID PRIMARY KEY,
                world_id UUID NOT NULL REFERENCES vx_worlds(id),
                name TEXT NOT NULL,
                mayor UUID REFERENCES vx_citizens(id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_survival_needs (
                citizen_id UUID PRIMARY KEY REFERENCES vx_citizens(id),
                food DOUBLE PRECISION NOT NULL,
                water DOUBLE PRECISION NOT NULL,
                sleep DOUBLE PRECISION NOT NULL,
                last_decay_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_resources (
                id UUID PRIMARY KEY,
                world_id UUID NOT NULL REFERENCES vx_worlds(id),
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                base_value_minor BIGINT NOT NULL,
                UNIQUE (world_id, name)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_businesses (
                id UUID PRIMARY KEY,
                world_id UUID NOT NULL REFERENCES vx_worlds(id),
                owner_id UUID NOT NULL REFERENCES vx_citizens(id),
                name TEXT NOT NULL,
                wallet_minor BIGINT NOT NULL CHECK (wallet_minor >= 0),
                operating_cost_minor BIGINT NOT NULL,
                production_capacity BIGINT NOT NULL,
                active BOOLEAN NOT NULL,
                operating BOOLEAN NOT NULL,
                inputs JSONB NOT NULL,
                outputs JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_deposits (
                id UUID PRIMARY KEY,
                business_id UUID NOT NULL REFERENCES vx_businesses(id),
                resource_id UUID NOT NULL REFERENCES vx_resources(id),
                remaining BIGINT NOT NULL CHECK (remaining >= 0),
                extraction_rate BIGINT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_inventory (
                business_id UUID NOT NULL REFERENCES vx_businesses(id),
                resource_id UUID NOT NULL REFERENCES vx_resources(id),
                quantity BIGINT NOT NULL CHECK (quantity >= 0),
                PRIMARY KEY (business_id, resource_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_transactions (
                id UUID PRIMARY KEY,
                world_id UUID NOT NULL REFERENCES vx_worlds(id),
                sequence BIGINT NOT NULL,
                category TEXT NOT NULL,
                amount_minor BIGINT NOT NULL,
                tax_minor BIGINT NOT NULL,
                net_minor BIGINT NOT NULL,
                sender_citizen_id UUID,
                sender_business_id UUID,
                receiver_citizen_id UUID,
                receiver_business_id UUID,
                reference TEXT,
                memo TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                previous_hash TEXT,
                entry_hash TEXT NOT NULL,
                UNIQUE (world_id, sequence)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_loans (
                id UUID PRIMARY KEY,
                world_id UUID NOT NULL REFERENCES vx_worlds(id),
                borrower_id UUID NOT NULL REFERENCES vx_citizens(id),
                principal_minor BIGINT NOT NULL,
                interest_rate_bps BIGINT NOT NULL,
                term_months BIGINT NOT NULL,
                amount_paid_minor BIGINT NOT NULL,
                next_payment_due TIMESTAMPTZ,
                status TEXT NOT NULL,
                issued_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_intents (
                id UUID PRIMARY KEY,
                world_id UUID NOT NULL REFERENCES vx_worlds(id),
                token TEXT NOT NULL UNIQUE,
                amount_minor BIGINT NOT NULL,
                category TEXT NOT NULL,
                sender JSONB NOT NULL,
                receiver JSONB NOT NULL,
                sender_user TEXT NOT NULL,
                apply_tax BOOLEAN NOT NULL,
                memo TEXT,
                status TEXT NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                transaction_id UUID,
                failure_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS vx_decay_events (
                id UUID PRIMARY KEY,
                world_id UUID NOT NULL REFERENCES vx_worlds(id),
                citizen_id UUID NOT NULL REFERENCES vx_citizens(id),
                need TEXT NOT NULL,
                before_value DOUBLE PRECISION NOT NULL,
                after_value DOUBLE PRECISION NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS vx_transactions_reference_idx ON vx_transactions (world_id, reference)",
            "CREATE INDEX IF NOT EXISTS vx_intents_pending_idx ON vx_intents (world_id, status)",
            "CREATE INDEX IF NOT EXISTS vx_decay_events_citizen_idx ON vx_decay_events (citizen_id, occurred_at)",
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

/// Chain heads read inside the current transaction: next sequence and previous hash.
type ChainHeads = HashMap<WorldId, (u64, Option<String>)>;

#[async_trait]
impl EconomyStore for PostgresEconomyStore {
    async fn world(&self, world_id: WorldId) -> StoreResult<Option<World>> {
        let row = sqlx::query(&format!("SELECT {WORLD_COLUMNS} FROM vx_worlds WHERE id = $1"))
            .bind(world_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(world_from_row).transpose()
    }

    async fn worlds(&self) -> StoreResult<Vec<World>> {
        let rows = sqlx::query(&format!(
            "SELECT {WORLD_COLUMNS} FROM vx_worlds ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(world_from_row).collect()
    }

    async fn treasury(&self, world_id: WorldId) -> StoreResult<Option<Treasury>> {
        let row = sqlx::query(&format!(
            "SELECT {TREASURY_COLUMNS} FROM vx_treasuries WHERE world_id = $1"
        ))
        .bind(world_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(treasury_from_row).transpose()
    }

    async fn regions(&self, world_id: WorldId) -> StoreResult<Vec<Region>> {
        let rows = sqlx::query(
            "SELECT id, world_id, name, mayor FROM vx_regions WHERE world_id = $1 ORDER BY name, id",
        )
        .bind(world_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|row| -> StoreResult<Region> {
                Ok(Region {
                    id: col::<Uuid>(&row, "id")?.into(),
                    world_id: col::<Uuid>(&row, "world_id")?.into(),
                    name: col(&row, "name")?,
                    mayor: col::<Option<Uuid>>(&row, "mayor")?.map(CitizenId::from),
                })
            })
            .collect()
    }

    async fn citizen(&self, citizen_id: CitizenId) -> StoreResult<Option<Citizen>> {
        let row = sqlx::query(&format!(
            "SELECT {CITIZEN_COLUMNS} FROM vx_citizens WHERE id = $1"
        ))
        .bind(citizen_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(citizen_from_row).transpose()
    }

    async fn citizen_by_user(
        &self,
        world_id: WorldId,
        user_id: &UserId,
    ) -> StoreResult<Option<Citizen>> {
        let row = sqlx::query(&format!(
            "SELECT {CITIZEN_COLUMNS} FROM vx_citizens WHERE world_id = $1 AND user_id = $2"
        ))
        .bind(world_id.as_uuid())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(citizen_from_row).transpose()
    }

    async fn citizens(&self, world_id: WorldId) -> StoreResult<Vec<Citizen>> {
        let rows = sqlx::query(&format!(
            "SELECT {CITIZEN_COLUMNS} FROM vx_citizens WHERE world_id = $1 ORDER BY joined_at, id"
        ))
        .bind(world_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(citizen_from_row).collect()
    }

    async fn survival_needs(&self, citizen_id: CitizenId) -> StoreResult<Option<SurvivalNeeds>> {
        let row = sqlx::query(
            "SELECT citizen_id, food, water, sleep, last_decay_at FROM vx_survival_needs WHERE citizen_id = $1",
        )
        .bind(citizen_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(|row| -> StoreResult<SurvivalNeeds> {
            Ok(SurvivalNeeds {
                citizen_id: col::<Uuid>(&row, "citizen_id")?.into(),
                food: col(&row, "food")?,
                water: col(&row, "water")?,
                sleep: col(&row, "sleep")?,
                last_decay_at: col(&row, "last_decay_at")?,
            })
        })
        .transpose()
    }

    async fn business(&self, business_id: BusinessId) -> StoreResult<Option<Business>> {
        let row = sqlx::query(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM vx_businesses WHERE id = $1"
        ))
        .bind(business_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(business_from_row).transpose()
    }

    async fn businesses(&self, world_id: WorldId) -> StoreResult<Vec<Business>> {
        let rows = sqlx::query(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM vx_businesses WHERE world_id = $1 ORDER BY created_at, id"
        ))
        .bind(world_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(business_from_row).collect()
    }

    async fn resource(&self, resource_id: ResourceId) -> StoreResult<Option<Resource>> {
        let row = sqlx::query(
            "SELECT id, world_id, name, category, base_value_minor FROM vx_resources WHERE id = $1",
        )
        .bind(resource_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(resource_from_row).transpose()
    }

    async fn resources(&self, world_id: WorldId) -> StoreResult<Vec<Resource>> {
        let rows = sqlx::query(
            "SELECT id, world_id, name, category, base_value_minor FROM vx_resources WHERE world_id = $1 ORDER BY name",
        )
        .bind(world_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(resource_from_row).collect()
    }

    async fn deposits(&self, business_id: BusinessId) -> StoreResult<Vec<ResourceDeposit>> {
        let rows = sqlx::query(
            "SELECT id, business_id, resource_id, remaining, extraction_rate FROM vx_deposits WHERE business_id = $1 ORDER BY id",
        )
        .bind(business_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|row| -> StoreResult<ResourceDeposit> {
                Ok(ResourceDeposit {
                    id: col::<Uuid>(&row, "id")?.into(),
                    business_id: col::<Uuid>(&row, "business_id")?.into(),
                    resource_id: col::<Uuid>(&row, "resource_id")?.into(),
                    remaining: col(&row, "remaining")?,
                    extraction_rate: col(&row, "extraction_rate")?,
                })
            })
            .collect()
    }

    async fn inventory(&self, business_id: BusinessId) -> StoreResult<Vec<InventoryItem>> {
        let rows = sqlx::query(
            "SELECT business_id, resource_id, quantity FROM vx_inventory WHERE business_id = $1 ORDER BY resource_id",
        )
        .bind(business_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|row| -> StoreResult<InventoryItem> {
                Ok(InventoryItem {
                    business_id: col::<Uuid>(&row, "business_id")?.into(),
                    resource_id: col::<Uuid>(&row, "resource_id")?.into(),
                    quantity: col(&row, "quantity")?,
                })
            })
            .collect()
    }

    async fn loan(&self, loan_id: LoanId) -> StoreResult<Option<Loan>> {
        let row = sqlx::query(&format!("SELECT {LOAN_COLUMNS} FROM vx_loans WHERE id = $1"))
            .bind(loan_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(loan_from_row).transpose()
    }

    async fn loans(&self, world_id: WorldId) -> StoreResult<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM vx_loans WHERE world_id = $1 ORDER BY issued_at, id"
        ))
        .bind(world_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(loan_from_row).collect()
    }

    async fn transaction(&self, transaction_id: TransactionId) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM vx_transactions WHERE id = $1"
        ))
        .bind(transaction_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(transaction_from_row).transpose()
    }

    async fn transactions(
        &self,
        world_id: WorldId,
        window: QueryWindow,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM vx_transactions WHERE world_id = $1 \
             ORDER BY sequence DESC LIMIT $2 OFFSET $3"
        ))
        .bind(world_id.as_uuid())
        .bind(to_i64(window.limit)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(transaction_from_row).collect()
    }

    async fn transaction_chain(&self, world_id: WorldId) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM vx_transactions WHERE world_id = $1 ORDER BY sequence"
        ))
        .bind(world_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(transaction_from_row).collect()
    }

    async fn transactions_by_reference(
        &self,
        world_id: WorldId,
        reference: &str,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM vx_transactions \
             WHERE world_id = $1 AND reference = $2 ORDER BY sequence"
        ))
        .bind(world_id.as_uuid())
        .bind(reference)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(transaction_from_row).collect()
    }

    async fn intent(&self, intent_id: IntentId) -> StoreResult<Option<TransactionIntent>> {
        let row = sqlx::query(&format!("SELECT {INTENT_COLUMNS} FROM vx_intents WHERE id = $1"))
            .bind(intent_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(intent_from_row).transpose()
    }

    async fn intent_by_token(&self, token: &str) -> StoreResult<Option<TransactionIntent>> {
        let row = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM vx_intents WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(intent_from_row).transpose()
    }

    async fn pending_intents(&self, world_id: WorldId) -> StoreResult<Vec<TransactionIntent>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM vx_intents WHERE world_id = $1 AND status = 'PENDING' \
             ORDER BY expires_at, id"
        ))
        .bind(world_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(intent_from_row).collect()
    }

    async fn decay_events(
        &self,
        citizen_id: CitizenId,
        window: QueryWindow,
    ) -> StoreResult<Vec<DecayEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, world_id, citizen_id, need, before_value, after_value, occurred_at
              FROM vx_decay_events
             WHERE citizen_id = $1
             ORDER BY occurred_at DESC, id
             LIMIT $2 OFFSET $3
            "#,
        )
        .bind(citizen_id.as_uuid())
        .bind(to_i64(window.limit)?)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|row| -> StoreResult<DecayEvent> {
                let need: String = col(&row, "need")?;
                Ok(DecayEvent {
                    id: col::<Uuid>(&row, "id")?.into(),
                    world_id: col::<Uuid>(&row, "world_id")?.into(),
                    citizen_id: col::<Uuid>(&row, "citizen_id")?.into(),
                    need: need.parse()?,
                    before: col(&row, "before_value")?,
                    after: col(&row, "after_value")?,
                    occurred_at: col(&row, "occurred_at")?,
                })
            })
            .collect()
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<CommitReceipt> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        for world_id in changes.chained_worlds() {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
                .bind(world_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        let effect_count = changes.len();
        let mut heads = ChainHeads::new();
        let mut receipt = CommitReceipt::default();
        for effect in changes.into_effects() {
            apply_effect(&mut *tx, effect, &mut heads, &mut receipt).await?;
        }

        tx.commit().await.map_err(backend)?;
        debug!(
            effects = effect_count,
            transactions = receipt.transactions.len(),
            "committed change set"
        );
        Ok(receipt)
    }
}

async fn apply_effect(
    conn: &mut PgConnection,
    effect: Effect,
    heads: &mut ChainHeads,
    receipt: &mut CommitReceipt,
) -> StoreResult<()> {
    match effect {
        Effect::CreateWorld { world, treasury } => {
            sqlx::query(
                r#"
                INSERT INTO vx_worlds
                    (id, name, owner, currency_name, currency_symbol, tax, decay, pricing,
                     starting_balance_minor, active, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(world.id.as_uuid())
            .bind(&world.name)
            .bind(world.owner.as_str())
            .bind(&world.currency_name)
            .bind(&world.currency_symbol)
            .bind(Json(&world.tax))
            .bind(Json(&world.decay))
            .bind(Json(&world.pricing))
            .bind(world.starting_balance_minor)
            .bind(world.active)
            .bind(world.created_at)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            sqlx::query(
                r#"
                INSERT INTO vx_treasuries
                    (world_id, balance_minor, tax_revenue_minor, permit_revenue_minor,
                     land_revenue_minor, subsidies_paid_minor, loans_issued_minor)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(treasury.world_id.as_uuid())
            .bind(treasury.balance_minor)
            .bind(treasury.tax_revenue_minor)
            .bind(treasury.permit_revenue_minor)
            .bind(treasury.land_revenue_minor)
            .bind(treasury.subsidies_paid_minor)
            .bind(treasury.loans_issued_minor)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        }
        Effect::UpdateWorldSettings {
            world_id,
            currency_name,
            currency_symbol,
            tax,
            decay,
            pricing,
            starting_balance_minor,
        } => {
            let result = sqlx::query(
                r#"
                UPDATE vx_worlds
                   SET currency_name = COALESCE($2, currency_name),
                       currency_symbol = COALESCE($3, currency_symbol),
                       tax = COALESCE($4, tax),
                       decay = COALESCE($5, decay),
                       pricing = COALESCE($6, pricing),
                       starting_balance_minor = COALESCE($7, starting_balance_minor)
                 WHERE id = $1
                "#,
            )
            .bind(world_id.as_uuid())
            .bind(currency_name)
            .bind(currency_symbol)
            .bind(tax.map(Json))
            .bind(decay.map(Json))
            .bind(pricing.map(Json))
            .bind(starting_balance_minor)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            expect_row(result.rows_affected(), "world", world_id)?;
        }
        Effect::SetWorldActive { world_id, active } => {
            let result = sqlx::query("UPDATE vx_worlds SET active = $2 WHERE id = $1")
                .bind(world_id.as_uuid())
                .bind(active)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            expect_row(result.rows_affected(), "world", world_id)?;
        }
        Effect::CreateRegion(region) => {
            sqlx::query("INSERT INTO vx_regions (id, world_id, name, mayor) VALUES ($1, $2, $3, $4)")
                .bind(region.id.as_uuid())
                .bind(region.world_id.as_uuid())
                .bind(&region.name)
                .bind(region.mayor.map(|id| id.as_uuid()))
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
        }
        Effect::SetRegionMayor { region_id, mayor } => {
            let result = sqlx::query("UPDATE vx_regions SET mayor = $2 WHERE id = $1")
                .bind(region_id.as_uuid())
                .bind(mayor.map(|id| id.as_uuid()))
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            expect_row(result.rows_affected(), "region", region_id)?;
        }
        Effect::CreateCitizen { citizen, needs } => {
            sqlx::query(
                r#"
                INSERT INTO vx_citizens
                    (id, world_id, user_id, display_name, wallet_minor, bank_minor, active, joined_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(citizen.id.as_uuid())
            .bind(citizen.world_id.as_uuid())
            .bind(citizen.user_id.as_str())
            .bind(&citizen.display_name)
            .bind(citizen.wallet_minor)
            .bind(citizen.bank_minor)
            .bind(citizen.active)
            .bind(citizen.joined_at)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            sqlx::query(
                r#"
                INSERT INTO vx_survival_needs (citizen_id, food, water, sleep, last_decay_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(needs.citizen_id.as_uuid())
            .bind(needs.food)
            .bind(needs.water)
            .bind(needs.sleep)
            .bind(needs.last_decay_at)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        }
        Effect::SetCitizenActive { citizen_id, active } => {
            let result = sqlx::query("UPDATE vx_citizens SET active = $2 WHERE id = $1")
                .bind(citizen_id.as_uuid())
                .bind(active)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            expect_row(result.rows_affected(), "citizen", citizen_id)?;
        }
        Effect::CreateResource(resource) => {
            sqlx::query(
                r#"
                INSERT INTO vx_resources (id, world_id, name, category, base_value_minor)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(resource.id.as_uuid())
            .bind(resource.world_id.as_uuid())
            .bind(&resource.name)
            .bind(&resource.category)
            .bind(resource.base_value_minor)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        }
        Effect::CreateBusiness(business) => {
            sqlx::query(
                r#"
                INSERT INTO vx_businesses
                    (id, world_id, owner_id, name, wallet_minor, operating_cost_minor,
                     production_capacity, active, operating, inputs, outputs, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(business.id.as_uuid())
            .bind(business.world_id.as_uuid())
            .bind(business.owner_id.as_uuid())
            .bind(&business.name)
            .bind(business.wallet_minor)
            .bind(business.operating_cost_minor)
            .bind(business.production_capacity)
            .bind(business.active)
            .bind(business.operating)
            .bind(Json(&business.inputs))
            .bind(Json(&business.outputs))
            .bind(business.created_at)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        }
        Effect::SetBusinessOperating {
            business_id,
            operating,
        } => {
            let result = sqlx::query("UPDATE vx_businesses SET operating = $2 WHERE id = $1")
                .bind(business_id.as_uuid())
                .bind(operating)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            expect_row(result.rows_affected(), "business", business_id)?;
        }
        Effect::SetProductionPlan {
            business_id,
            inputs,
            outputs,
        } => {
            let result =
                sqlx::query("UPDATE vx_businesses SET inputs = $2, outputs = $3 WHERE id = $1")
                    .bind(business_id.as_uuid())
                    .bind(Json(&inputs))
                    .bind(Json(&outputs))
                    .execute(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)?;
            expect_row(result.rows_affected(), "business", business_id)?;
        }
        Effect::CreateDeposit(deposit) => {
            sqlx::query(
                r#"
                INSERT INTO vx_deposits (id, business_id, resource_id, remaining, extraction_rate)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(deposit.id.as_uuid())
            .bind(deposit.business_id.as_uuid())
            .bind(deposit.resource_id.as_uuid())
            .bind(deposit.remaining)
            .bind(deposit.extraction_rate)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        }
        Effect::Debit { slot, amount_minor } => {
            non_negative(amount_minor, "debit")?;
            let (table, column, key) = slot_location(slot);
            let result = sqlx::query(&format!(
                "UPDATE {table} SET {column} = {column} - $2 WHERE {key} = $1 AND {column} >= $2"
            ))
            .bind(slot_key(slot))
            .bind(amount_minor)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            if result.rows_affected() == 0 {
                let available: Option<i64> = sqlx::query_scalar(&format!(
                    "SELECT {column} FROM {table} WHERE {key} = $1"
                ))
                .bind(slot_key(slot))
                .fetch_optional(&mut *conn)
                .await
                .map_err(backend)?;
                return match available {
                    Some(available_minor) => Err(GuardViolation::InsufficientBalance {
                        slot,
                        required_minor: amount_minor,
                        available_minor,
                    }
                    .into()),
                    None => Err(StoreError::NotFound(slot.to_string())),
                };
            }
        }
        Effect::Credit { slot, amount_minor } => {
            non_negative(amount_minor, "credit")?;
            let (table, column, key) = slot_location(slot);
            let result = sqlx::query(&format!(
                "UPDATE {table} SET {column} = {column} + $2 WHERE {key} = $1"
            ))
            .bind(slot_key(slot))
            .bind(amount_minor)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(slot.to_string()));
            }
        }
        Effect::BumpTreasuryCounter {
            world_id,
            counter,
            amount_minor,
        } => {
            let column = counter.column();
            let result = sqlx::query(&format!(
                "UPDATE vx_treasuries SET {column} = {column} + $2 WHERE world_id = $1"
            ))
            .bind(world_id.as_uuid())
            .bind(amount_minor)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            expect_row(result.rows_affected(), "treasury of world", world_id)?;
        }
        Effect::AdjustInventory {
            business_id,
            resource_id,
            delta,
        } => {
            if delta >= 0 {
                sqlx::query(
                    r#"
                    INSERT INTO vx_inventory (business_id, resource_id, quantity)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (business_id, resource_id)
                    DO UPDATE SET quantity = vx_inventory.quantity + EXCLUDED.quantity
                    "#,
                )
                .bind(business_id.as_uuid())
                .bind(resource_id.as_uuid())
                .bind(delta)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
            } else {
                let result = sqlx::query(
                    r#"
                    UPDATE vx_inventory SET quantity = quantity + $3
                     WHERE business_id = $1 AND resource_id = $2 AND quantity + $3 >= 0
                    "#,
                )
                .bind(business_id.as_uuid())
                .bind(resource_id.as_uuid())
                .bind(delta)
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;
                if result.rows_affected() == 0 {
                    let available: Option<i64> = sqlx::query_scalar(
                        "SELECT quantity FROM vx_inventory WHERE business_id = $1 AND resource_id = $2",
                    )
                    .bind(business_id.as_uuid())
                    .bind(resource_id.as_uuid())
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(backend)?;
                    return Err(GuardViolation::InsufficientInventory {
                        business_id,
                        resource_id,
                        required: -delta,
                        available: available.unwrap_or(0),
                    }
                    .into());
                }
            }
        }
        Effect::ExtractDeposit {
            deposit_id,
            quantity,
        } => {
            non_negative(quantity, "extraction")?;
            let result = sqlx::query(
                "UPDATE vx_deposits SET remaining = remaining - $2 WHERE id = $1 AND remaining >= $2",
            )
            .bind(deposit_id.as_uuid())
            .bind(quantity)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            if result.rows_affected() == 0 {
                let remaining: Option<i64> =
                    sqlx::query_scalar("SELECT remaining FROM vx_deposits WHERE id = $1")
                        .bind(deposit_id.as_uuid())
                        .fetch_optional(&mut *conn)
                        .await
                        .map_err(backend)?;
                return match remaining {
                    Some(remaining) => Err(GuardViolation::DepositDepleted {
                        deposit_id,
                        requested: quantity,
                        remaining,
                    }
                    .into()),
                    None => Err(StoreError::NotFound(format!("deposit {deposit_id}"))),
                };
            }
        }
        Effect::AdjustNeed {
            citizen_id,
            need,
            delta,
        } => {
            let column = need_column(need);
            let result = sqlx::query(&format!(
                "UPDATE vx_survival_needs SET {column} = LEAST(100.0, GREATEST(0.0, {column} + $2)) \
                 WHERE citizen_id = $1"
            ))
            .bind(citizen_id.as_uuid())
            .bind(delta)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            expect_row(result.rows_affected(), "survival needs of citizen", citizen_id)?;
        }
        Effect::RaiseNeed {
            citizen_id,
            need,
            amount,
        } => {
            let column = need_column(need);
            let result = sqlx::query(&format!(
                "UPDATE vx_survival_needs SET {column} = LEAST(100.0, {column} + $2) \
                 WHERE citizen_id = $1 AND {column} + $2 <= $3"
            ))
            .bind(citizen_id.as_uuid())
            .bind(amount)
            .bind(NEED_MAX + NEED_TOLERANCE)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            if result.rows_affected() == 0 {
                let exists: Option<Uuid> =
                    sqlx::query_scalar("SELECT citizen_id FROM vx_survival_needs WHERE citizen_id = $1")
                        .bind(citizen_id.as_uuid())
                        .fetch_optional(&mut *conn)
                        .await
                        .map_err(backend)?;
                return match exists {
                    Some(_) => Err(GuardViolation::NeedSaturated { citizen_id, need }.into()),
                    None => Err(StoreError::NotFound(format!(
                        "survival needs of citizen {citizen_id}"
                    ))),
                };
            }
        }
        Effect::TouchDecay { citizen_id, at } => {
            let result =
                sqlx::query("UPDATE vx_survival_needs SET last_decay_at = $2 WHERE citizen_id = $1")
                    .bind(citizen_id.as_uuid())
                    .bind(at)
                    .execute(&mut *conn)
                    .await
                    .map_err(map_sqlx_error)?;
            expect_row(result.rows_affected(), "survival needs of citizen", citizen_id)?;
        }
        Effect::RecordDecayEvent(event) => {
            sqlx::query(
                r#"
                INSERT INTO vx_decay_events
                    (id, world_id, citizen_id, need, before_value, after_value, occurred_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(event.id.as_uuid())
            .bind(event.world_id.as_uuid())
            .bind(event.citizen_id.as_uuid())
            .bind(event.need.as_str())
            .bind(event.before)
            .bind(event.after)
            .bind(event.occurred_at)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        }
        Effect::RecordTransaction(new) => {
            let world_id = new.world_id;
            let (sequence, previous_hash) = match heads.get(&world_id) {
                Some(head) => head.clone(),
                None => load_chain_head(conn, world_id).await?,
            };
            let tx = Transaction::chain_at(new, sequence, previous_hash);
            sqlx::query(
                r#"
                INSERT INTO vx_transactions
                    (id, world_id, sequence, category, amount_minor, tax_minor, net_minor,
                     sender_citizen_id, sender_business_id, receiver_citizen_id, receiver_business_id,
                     reference, memo, created_at, previous_hash, entry_hash)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(tx.id.as_uuid())
            .bind(tx.world_id.as_uuid())
            .bind(to_i64_seq(tx.sequence)?)
            .bind(tx.category.as_str())
            .bind(tx.amount_minor)
            .bind(tx.tax_minor)
            .bind(tx.net_minor)
            .bind(tx.sender.and_then(|p| p.citizen()).map(|id| id.as_uuid()))
            .bind(tx.sender.and_then(|p| p.business()).map(|id| id.as_uuid()))
            .bind(tx.receiver.and_then(|p| p.citizen()).map(|id| id.as_uuid()))
            .bind(tx.receiver.and_then(|p| p.business()).map(|id| id.as_uuid()))
            .bind(&tx.reference)
            .bind(&tx.memo)
            .bind(tx.created_at)
            .bind(&tx.previous_hash)
            .bind(&tx.entry_hash)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            heads.insert(world_id, (tx.sequence + 1, Some(tx.entry_hash.clone())));
            receipt.transactions.push(tx);
        }
        Effect::CreateLoan(loan) => {
            sqlx::query(
                r#"
                INSERT INTO vx_loans
                    (id, world_id, borrower_id, principal_minor, interest_rate_bps, term_months,
                     amount_paid_minor, next_payment_due, status, issued_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(loan.id.as_uuid())
            .bind(loan.world_id.as_uuid())
            .bind(loan.borrower_id.as_uuid())
            .bind(loan.principal_minor)
            .bind(i64::from(loan.interest_rate_bps))
            .bind(i64::from(loan.term_months))
            .bind(loan.amount_paid_minor)
            .bind(loan.next_payment_due)
            .bind(loan.status.as_str())
            .bind(loan.issued_at)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        }
        Effect::ApplyLoanPayment {
            loan_id,
            expected_paid_minor,
            amount_minor,
            next_payment_due,
            paid_off,
        } => {
            non_negative(amount_minor, "loan payment")?;
            let result = sqlx::query(
                r#"
                UPDATE vx_loans
                   SET amount_paid_minor = amount_paid_minor + $2,
                       next_payment_due = $3,
                       status = CASE WHEN $4 THEN 'PAID_OFF' ELSE status END
                 WHERE id = $1 AND status = 'ACTIVE' AND amount_paid_minor = $5
                "#,
            )
            .bind(loan_id.as_uuid())
            .bind(amount_minor)
            .bind(next_payment_due)
            .bind(paid_off)
            .bind(expected_paid_minor)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            if result.rows_affected() == 0 {
                let current: Option<(String, i64)> = sqlx::query_as(
                    "SELECT status, amount_paid_minor FROM vx_loans WHERE id = $1",
                )
                .bind(loan_id.as_uuid())
                .fetch_optional(&mut *conn)
                .await
                .map_err(backend)?;
                return match current {
                    Some((status, _)) if status != "ACTIVE" => {
                        Err(GuardViolation::LoanNotActive { loan_id }.into())
                    }
                    Some((_, actual_paid_minor)) => Err(GuardViolation::LoanPaymentStale {
                        loan_id,
                        expected_paid_minor,
                        actual_paid_minor,
                    }
                    .into()),
                    None => Err(StoreError::NotFound(format!("loan {loan_id}"))),
                };
            }
        }
        Effect::CreateIntent(intent) => {
            sqlx::query(
                r#"
                INSERT INTO vx_intents
                    (id, world_id, token, amount_minor, category, sender, receiver, sender_user,
                     apply_tax, memo, status, expires_at, transaction_id, failure_reason,
                     created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                "#,
            )
            .bind(intent.id.as_uuid())
            .bind(intent.world_id.as_uuid())
            .bind(&intent.token)
            .bind(intent.amount_minor)
            .bind(intent.category.as_str())
            .bind(Json(&intent.sender))
            .bind(Json(&intent.receiver))
            .bind(intent.sender_user.as_str())
            .bind(intent.apply_tax)
            .bind(&intent.memo)
            .bind(intent.status.as_str())
            .bind(intent.expires_at)
            .bind(intent.transaction_id.map(|id| id.as_uuid()))
            .bind(&intent.failure_reason)
            .bind(intent.created_at)
            .bind(intent.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        }
        Effect::TransitionIntent {
            intent_id,
            from,
            to,
            transaction_id,
            failure_reason,
            at,
        } => {
            let result = sqlx::query(
                r#"
                UPDATE vx_intents
                   SET status = $3,
                       transaction_id = COALESCE($4, transaction_id),
                       failure_reason = COALESCE($5, failure_reason),
                       updated_at = $6
                 WHERE id = $1 AND status = $2
                "#,
            )
            .bind(intent_id.as_uuid())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(transaction_id.map(|id| id.as_uuid()))
            .bind(&failure_reason)
            .bind(at)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
            if result.rows_affected() == 0 {
                let actual: Option<String> =
                    sqlx::query_scalar("SELECT status FROM vx_intents WHERE id = $1")
                        .bind(intent_id.as_uuid())
                        .fetch_optional(&mut *conn)
                        .await
                        .map_err(backend)?;
                return match actual {
                    Some(actual) => Err(GuardViolation::IntentStatus {
                        intent_id,
                        expected: from,
                        actual: actual.parse()?,
                    }
                    .into()),
                    None => Err(StoreError::NotFound(format!("intent {intent_id}"))),
                };
            }
        }
    }
    Ok(())
}

async fn load_chain_head(
    conn: &mut PgConnection,
    world_id: WorldId,
) -> StoreResult<(u64, Option<String>)> {
    let row = sqlx::query(
        "SELECT sequence, entry_hash FROM vx_transactions WHERE world_id = $1 ORDER BY sequence DESC LIMIT 1",
    )
    .bind(world_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(backend)?;
    match row {
        Some(row) => {
            let sequence: i64 = col(&row, "sequence")?;
            let hash: String = col(&row, "entry_hash")?;
            Ok((sequence as u64 + 1, Some(hash)))
        }
        None => Ok((0, None)),
    }
}

fn slot_location(slot: BalanceSlot) -> (&'static str, &'static str, &'static str) {
    match slot {
        BalanceSlot::CitizenWallet(_) => ("vx_citizens", "wallet_minor", "id"),
        BalanceSlot::CitizenBank(_) => ("vx_citizens", "bank_minor", "id"),
        BalanceSlot::BusinessWallet(_) => ("vx_businesses", "wallet_minor", "id"),
        BalanceSlot::Treasury(_) => ("vx_treasuries", "balance_minor", "world_id"),
    }
}

fn slot_key(slot: BalanceSlot) -> Uuid {
    match slot {
        BalanceSlot::CitizenWallet(id) | BalanceSlot::CitizenBank(id) => id.as_uuid(),
        BalanceSlot::BusinessWallet(id) => id.as_uuid(),
        BalanceSlot::Treasury(id) => id.as_uuid(),
    }
}

fn need_column(need: NeedKind) -> &'static str {
    match need {
        NeedKind::Food => "food",
        NeedKind::Water => "water",
        NeedKind::Sleep => "sleep",
    }
}

fn world_from_row(row: PgRow) -> StoreResult<World> {
    let owner: String = col(&row, "owner")?;
    Ok(World {
        id: col::<Uuid>(&row, "id")?.into(),
        name: col(&row, "name")?,
        owner: UserId::new(owner),
        currency_name: col(&row, "currency_name")?,
        currency_symbol: col(&row, "currency_symbol")?,
        tax: col::<Json<TaxConfig>>(&row, "tax")?.0,
        decay: col::<Json<DecayConfig>>(&row, "decay")?.0,
        pricing: col::<Json<ReplenishPricing>>(&row, "pricing")?.0,
        starting_balance_minor: col(&row, "starting_balance_minor")?,
        active: col(&row, "active")?,
        created_at: col(&row, "created_at")?,
    })
}

fn treasury_from_row(row: PgRow) -> StoreResult<Treasury> {
    Ok(Treasury {
        world_id: col::<Uuid>(&row, "world_id")?.into(),
        balance_minor: col(&row, "balance_minor")?,
        tax_revenue_minor: col(&row, "tax_revenue_minor")?,
        permit_revenue_minor: col(&row, "permit_revenue_minor")?,
        land_revenue_minor: col(&row, "land_revenue_minor")?,
        subsidies_paid_minor: col(&row, "subsidies_paid_minor")?,
        loans_issued_minor: col(&row, "loans_issued_minor")?,
    })
}

fn citizen_from_row(row: PgRow) -> StoreResult<Citizen> {
    let user_id: String = col(&row, "user_id")?;
    Ok(Citizen {
        id: col::<Uuid>(&row, "id")?.into(),
        world_id: col::<Uuid>(&row, "world_id")?.into(),
        user_id: UserId::new(user_id),
        display_name: col(&row, "display_name")?,
        wallet_minor: col(&row, "wallet_minor")?,
        bank_minor: col(&row, "bank_minor")?,
        active: col(&row, "active")?,
        joined_at: col(&row, "joined_at")?,
    })
}

fn business_from_row(row: PgRow) -> StoreResult<Business> {
    Ok(Business {
        id: col::<Uuid>(&row, "id")?.into(),
        world_id: col::<Uuid>(&row, "world_id")?.into(),
        owner_id: col::<Uuid>(&row, "owner_id")?.into(),
        name: col(&row, "name")?,
        wallet_minor: col(&row, "wallet_minor")?,
        operating_cost_minor: col(&row, "operating_cost_minor")?,
        production_capacity: col(&row, "production_capacity")?,
        active: col(&row, "active")?,
        operating: col(&row, "operating")?,
        inputs: col::<Json<Vec<ProductionLine>>>(&row, "inputs")?.0,
        outputs: col::<Json<Vec<ProductionLine>>>(&row, "outputs")?.0,
        created_at: col(&row, "created_at")?,
    })
}

fn resource_from_row(row: PgRow) -> StoreResult<Resource> {
    Ok(Resource {
        id: col::<Uuid>(&row, "id")?.into(),
        world_id: col::<Uuid>(&row, "world_id")?.into(),
        name: col(&row, "name")?,
        category: col(&row, "category")?,
        base_value_minor: col(&row, "base_value_minor")?,
    })
}

fn transaction_from_row(row: PgRow) -> StoreResult<Transaction> {
    let sequence: i64 = col(&row, "sequence")?;
    let category: String = col(&row, "category")?;
    let party = |citizen: &str, business: &str| -> StoreResult<Option<Party>> {
        Ok(Party::from_columns(
            col::<Option<Uuid>>(&row, citizen)?.map(CitizenId::from),
            col::<Option<Uuid>>(&row, business)?.map(BusinessId::from),
        ))
    };
    Ok(Transaction {
        id: col::<Uuid>(&row, "id")?.into(),
        world_id: col::<Uuid>(&row, "world_id")?.into(),
        sequence: u64::try_from(sequence)
            .map_err(|_| StoreError::Serialization(format!("negative sequence {sequence}")))?,
        category: category.parse()?,
        amount_minor: col(&row, "amount_minor")?,
        tax_minor: col(&row, "tax_minor")?,
        net_minor: col(&row, "net_minor")?,
        sender: party("sender_citizen_id", "sender_business_id")?,
        receiver: party("receiver_citizen_id", "receiver_business_id")?,
        reference: col(&row, "reference")?,
        memo: col(&row, "memo")?,
        created_at: col(&row, "created_at")?,
        previous_hash: col(&row, "previous_hash")?,
        entry_hash: col(&row, "entry_hash")?,
    })
}

fn loan_from_row(row: PgRow) -> StoreResult<Loan> {
    let status: String = col(&row, "status")?;
    Ok(Loan {
        id: col::<Uuid>(&row, "id")?.into(),
        world_id: col::<Uuid>(&row, "world_id")?.into(),
        borrower_id: col::<Uuid>(&row, "borrower_id")?.into(),
        principal_minor: col(&row, "principal_minor")?,
        interest_rate_bps: to_u32(col(&row, "interest_rate_bps")?)?,
        term_months: to_u32(col(&row, "term_months")?)?,
        amount_paid_minor: col(&row, "amount_paid_minor")?,
        next_payment_due: col(&row, "next_payment_due")?,
        status: status.parse()?,
        issued_at: col(&row, "issued_at")?,
    })
}

fn intent_from_row(row: PgRow) -> StoreResult<TransactionIntent> {
    let category: String = col(&row, "category")?;
    let status: String = col(&row, "status")?;
    let sender_user: String = col(&row, "sender_user")?;
    Ok(TransactionIntent {
        id: col::<Uuid>(&row, "id")?.into(),
        world_id: col::<Uuid>(&row, "world_id")?.into(),
        token: col(&row, "token")?,
        amount_minor: col(&row, "amount_minor")?,
        category: category.parse()?,
        sender: col::<Json<AccountRef>>(&row, "sender")?.0,
        receiver: col::<Json<AccountRef>>(&row, "receiver")?.0,
        sender_user: UserId::new(sender_user),
        apply_tax: col(&row, "apply_tax")?,
        memo: col(&row, "memo")?,
        status: status.parse()?,
        expires_at: col(&row, "expires_at")?,
        transaction_id: col::<Option<Uuid>>(&row, "transaction_id")?.map(TransactionId::from),
        failure_reason: col(&row, "failure_reason")?,
        created_at: col(&row, "created_at")?,
        updated_at: col(&row, "updated_at")?,
    })
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("column {name}: {e}")))
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => return StoreError::Conflict(db_err.message().to_string()),
            Some("23503") => return StoreError::NotFound(db_err.message().to_string()),
            Some("23514") => return StoreError::InvalidInput(db_err.message().to_string()),
            _ => {}
        }
    }
    StoreError::Backend(err.to_string())
}

fn expect_row(rows_affected: u64, what: &str, id: impl std::fmt::Display) -> StoreResult<()> {
    if rows_affected == 0 {
        return Err(StoreError::NotFound(format!("{what} {id}")));
    }
    Ok(())
}

fn non_negative(amount: i64, what: &str) -> StoreResult<()> {
    if amount < 0 {
        return Err(StoreError::InvalidInput(format!(
            "{what} must be non-negative, got {amount}"
        )));
    }
    Ok(())
}

fn to_i64(value: usize) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("window value too large".to_string()))
}

fn to_i64_seq(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("sequence overflow".to_string()))
}

fn to_u32(value: i64) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Serialization(format!("{value} out of range")))
}
