use futures::{future::BoxFuture, FutureExt};
use shared::{validate_table_name, VoteChoice, VoteRecord, VoterId};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::time::Duration;
use tracing::debug;

use crate::{
    config::DbConfig,
    error::{HarnessError, Result},
    waiter::VoteReader,
};

/// Read access to the votes table the worker writes into.
#[derive(Clone)]
pub struct DbConnector {
    pool: PgPool,
    table: String,
}

impl DbConnector {
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        validate_table_name(&config.table)?;

        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user);
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        debug!(host = %config.host, port = config.port, table = %config.table, "Connected to vote store");
        Ok(Self::from_pool(pool, config.table.clone()))
    }

    /// Wraps an existing pool. `table` must already be a valid identifier.
    pub fn from_pool(pool: PgPool, table: String) -> Self {
        Self { pool, table }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn fetch_all_votes(&self) -> Result<Vec<VoteRecord>> {
        let sql = format!("SELECT id, vote FROM {}", self.table);
        let records = sqlx::query_as::<_, VoteRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Vote of `voter_id`, `None` when absent. More than one row is an
    /// integrity fault and is never resolved by picking one.
    pub async fn fetch_vote_by_id(&self, voter_id: &VoterId) -> Result<Option<VoteChoice>> {
        let sql = format!("SELECT vote FROM {} WHERE id = $1", self.table);
        let rows = sqlx::query_scalar::<_, VoteChoice>(&sql)
            .bind(voter_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        debug!(voter_id = %voter_id, rows = rows.len(), "Fetched vote");
        single_vote(voter_id, rows)
    }
}

impl VoteReader for DbConnector {
    fn fetch_vote<'a>(&'a self, voter_id: &'a VoterId) -> BoxFuture<'a, Result<Option<VoteChoice>>> {
        self.fetch_vote_by_id(voter_id).boxed()
    }
}

pub fn single_vote(voter_id: &VoterId, rows: Vec<VoteChoice>) -> Result<Option<VoteChoice>> {
    if rows.len() > 1 {
        return Err(HarnessError::MultipleMatch {
            voter_id: voter_id.clone(),
            count: rows.len(),
        });
    }
    Ok(rows.into_iter().next())
}
