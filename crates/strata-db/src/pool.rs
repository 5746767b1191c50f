//! Connection pool for the category store.
//!
//! A cleanup run is the only heavy client. Its widest fan-out is one batch of
//! concurrent store writes, so the pool is sized from the largest batch the
//! pipeline issues rather than from request traffic. Any extra connections
//! serve status polls and the orphan-repair loop.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use strata_core::defaults::{
    DELETE_BATCH_SIZE, HASHTAG_BATCH_SIZE, MERGE_BATCH_SIZE, RENAME_BATCH_SIZE,
};
use strata_core::{Error, Result};

/// Connections kept on top of the widest write batch.
pub const BATCH_HEADROOM: u32 = 2;

/// Seconds a store call waits for a free connection before failing.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Idle connections are closed after this many seconds between runs.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Widest concurrent batch the pipeline issues with default settings.
pub fn widest_batch() -> usize {
    [
        HASHTAG_BATCH_SIZE,
        DELETE_BATCH_SIZE,
        RENAME_BATCH_SIZE,
        MERGE_BATCH_SIZE,
    ]
    .into_iter()
    .max()
    .unwrap_or(1)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// `None` keeps idle connections open.
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::for_batch_size(widest_batch())
    }
}

impl PoolConfig {
    /// Enough connections for `batch_size` concurrent writes plus headroom.
    pub fn for_batch_size(batch_size: usize) -> Self {
        let batch = u32::try_from(batch_size.max(1)).unwrap_or(u32::MAX);
        Self {
            max_connections: batch.saturating_add(BATCH_HEADROOM),
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
        }
    }

    /// Single connection, so session settings such as `search_path` stick.
    pub fn single_connection() -> Self {
        Self {
            max_connections: 1,
            idle_timeout: None,
            ..Self::default()
        }
    }

    /// Overrides from the environment.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `STRATA_DB_MAX_CONNECTIONS` | widest batch + 2 | Pool size |
    /// | `STRATA_DB_ACQUIRE_TIMEOUT_SECS` | `30` | Wait for a free connection |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse::<u32>("STRATA_DB_MAX_CONNECTIONS") {
            config = config.with_max_connections(n);
        }
        if let Some(secs) = env_parse::<u64>("STRATA_DB_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        config
    }

    /// Zero is treated as one.
    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n.max(1);
        self
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(0)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Open a pool with `config`.
pub async fn connect_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    let pool = config
        .options()
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Category store pool ready"
    );
    Ok(pool)
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: u32,
    pub idle: usize,
}

impl PoolStatus {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
        }
    }

    /// Every open connection is checked out.
    pub fn is_exhausted(&self) -> bool {
        self.size > 0 && self.idle == 0
    }

    pub fn log(&self) {
        debug!(
            subsystem = "db",
            component = "pool",
            pool_size = self.size,
            pool_idle = self.idle,
            "Pool status"
        );
        if self.is_exhausted() {
            warn!(
                subsystem = "db",
                component = "pool",
                pool_size = self.size,
                "All pool connections in use; store calls will queue"
            );
        }
    }
}
