pub mod message_repo;
pub mod user_repo;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Creates the Postgres connection pool.
///
/// # Errors
/// Returns an error if the database is unreachable.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(10).connect(database_url).await
}

/// Applies pending migrations from the `migrations/` directory.
///
/// # Errors
/// Returns an error if a migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}
