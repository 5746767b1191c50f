//! # strata-db
//!
//! Category store implementations for strata.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgCategoryStore`], the PostgreSQL + pgvector category graph
//! - [`InMemoryCategoryStore`], the same contract over process memory
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_db::{CategoryStore, Database};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/strata").await?;
//!     let categories = db.categories.list_categories().await?;
//!     println!("{} active categories", categories.len());
//!     Ok(())
//! }
//! ```

pub mod categories;
pub mod memory;
pub mod pool;

// Test fixtures for integration tests
// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use strata_core::*;

pub use categories::PgCategoryStore;
pub use memory::InMemoryCategoryStore;
pub use pool::{connect_pool, PoolConfig, PoolStatus};

/// Database handle bundling the pool and the category store.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Category graph store.
    pub categories: PgCategoryStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            categories: PgCategoryStore::new(pool.clone()),
            pool,
        }
    }

    /// Connect with a pool sized for the default batch widths.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, &PoolConfig::default()).await
    }

    /// Connect with an explicit pool configuration.
    pub async fn connect_with_config(url: &str, config: &PoolConfig) -> Result<Self> {
        let pool = connect_pool(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    pub fn pool_status(&self) -> PoolStatus {
        PoolStatus::of(&self.pool)
    }
}
