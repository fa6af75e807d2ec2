pub mod pool;
pub mod repo;

pub use pool::{Pool, PoolConfig, PooledConnection};

/// Runs pending `migrations/` against a freshly established connection,
/// bypassing the pool (this happens once at startup, before normal
/// traffic begins).
pub async fn run_migrations(database_url: &str) -> Result<(), sqlx::Error> {
    use sqlx::Connection;
    let mut conn = sqlx::mysql::MySqlConnection::connect(database_url).await?;
    sqlx::migrate!("./migrations").run(&mut conn).await?;
    conn.close().await?;
    Ok(())
}
