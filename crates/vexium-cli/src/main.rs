use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use vexium_engine::EconomyEngine;
use vexium_store::{EconomyStore, StorageConfig};
use vexium_types::{BusinessId, WorldId};

#[derive(Debug, Parser)]
#[command(name = "vexium", version, about = "Vexium economy operator CLI")]
struct Cli {
    /// PostgreSQL url of the economy store.
    #[arg(long, global = true, env = "VEXIUM_DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections.
    #[arg(long, global = true, default_value_t = 5, env = "VEXIUM_PG_MAX_CONNECTIONS")]
    max_connections: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or upgrade the database schema.
    Migrate,
    /// Run one survival decay tick.
    Decay {
        #[arg(long)]
        world: WorldId,
    },
    /// Run production for a whole world or a single business.
    Produce {
        #[arg(long)]
        world: WorldId,
        #[arg(long)]
        business: Option<BusinessId>,
    },
    /// Collect every loan installment that has fallen due.
    Loans {
        #[arg(long)]
        world: WorldId,
    },
    /// Expire overdue pending transaction intents.
    ExpireIntents {
        #[arg(long)]
        world: WorldId,
    },
    /// Show membership counts and production readiness.
    Status {
        #[arg(long)]
        world: WorldId,
    },
    /// Show the treasury report.
    Treasury {
        #[arg(long)]
        world: WorldId,
    },
    /// Replay the world's transaction hash chain.
    VerifyLedger {
        #[arg(long)]
        world: WorldId,
    },
}

fn resolve_storage(cli: &Cli) -> anyhow::Result<StorageConfig> {
    let database_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("--database-url, VEXIUM_DATABASE_URL or DATABASE_URL is required"))?;
    Ok(StorageConfig::postgres(database_url, cli.max_connections))
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct WorldStatus {
    world: vexium_types::World,
    citizens: usize,
    active_citizens: usize,
    businesses: usize,
    production: Vec<vexium_engine::ProductionStatus>,
}

async fn world_status(
    store: &Arc<dyn EconomyStore>,
    engine: &EconomyEngine,
    world_id: WorldId,
) -> anyhow::Result<WorldStatus> {
    let world = store
        .world(world_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("world {world_id} not found"))?;
    let citizens = store.citizens(world_id).await?;
    let production = engine.world_production_status(world_id).await?;
    Ok(WorldStatus {
        world,
        citizens: citizens.len(),
        active_citizens: citizens.iter().filter(|citizen| citizen.active).count(),
        businesses: production.len(),
        production,
    })
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let storage = resolve_storage(&cli)?;
    let store = storage.connect().await?;
    info!(backend = storage.label(), "Economy store ready");
    let engine = EconomyEngine::new(store.clone());

    match cli.command {
        Command::Migrate => emit(&serde_json::json!({
            "status": "ok",
            "backend": storage.label(),
        })),
        Command::Decay { world } => emit(&engine.process_decay(world).await?),
        Command::Produce {
            world,
            business: Some(business),
        } => {
            let record = engine.store().business(business).await?;
            if record.map(|b| b.world_id) != Some(world) {
                anyhow::bail!("business {business} not found in world {world}");
            }
            emit(&engine.run_production_cycle(business).await?)
        }
        Command::Produce {
            world,
            business: None,
        } => emit(&engine.run_world_production(world).await?),
        Command::Loans { world } => emit(&engine.process_due_loan_payments(world).await?),
        Command::ExpireIntents { world } => emit(&engine.expire_stale_intents(world).await?),
        Command::Status { world } => emit(&world_status(&store, &engine, world).await?),
        Command::Treasury { world } => emit(&engine.treasury_report(world).await?),
        Command::VerifyLedger { world } => {
            let report = engine.verify_chain(world).await?;
            emit(&report)?;
            if !report.valid {
                anyhow::bail!("ledger chain of world {world} is broken");
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "vexium=info,info".to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_world_scoped_commands() {
        let world = WorldId::generate();
        let cli = Cli::try_parse_from([
            "vexium",
            "--database-url",
            "postgres://localhost/vexium",
            "produce",
            "--world",
            &world.to_string(),
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Produce { world: parsed, business: None } if parsed == world
        ));
        assert_eq!(cli.max_connections, 5);
    }

    #[test]
    fn rejects_malformed_world_ids() {
        assert!(Cli::try_parse_from(["vexium", "decay", "--world", "not-a-uuid"]).is_err());
    }

    #[test]
    fn explicit_url_wins() {
        let cli = Cli::try_parse_from([
            "vexium",
            "--database-url",
            "postgres://db/one",
            "--max-connections",
            "9",
            "migrate",
        ])
        .unwrap();
        match resolve_storage(&cli).unwrap() {
            StorageConfig::Postgres {
                database_url,
                max_connections,
            } => {
                assert_eq!(database_url, "postgres://db/one");
                assert_eq!(max_connections, 9);
            }
            StorageConfig::Memory => panic!("expected postgres"),
        }
    }
}
