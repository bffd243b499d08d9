use crate::memory::InMemoryEconomyStore;
use crate::traits::EconomyStore;
use crate::StoreResult;
use std::sync::Arc;

/// Economy store backend configuration.
#[derive(Debug, Clone, Default)]
pub enum StorageConfig {
    /// Keep all state in process memory only.
    #[default]
    Memory,
    /// Persist all state in PostgreSQL.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }

    /// Open the configured backend.
    pub async fn connect(&self) -> StoreResult<Arc<dyn EconomyStore>> {
        match self {
            Self::Memory => Ok(Arc::new(InMemoryEconomyStore::new())),
            #[cfg(feature = "postgres")]
            Self::Postgres {
                database_url,
                max_connections,
            } => {
                let store =
                    crate::postgres::PostgresEconomyStore::connect(database_url, *max_connections)
                        .await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "postgres"))]
            Self::Postgres { .. } => Err(crate::StoreError::Backend(
                "postgres backend requires the `postgres` feature".to_string(),
            )),
        }
    }
}
