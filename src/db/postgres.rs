use sqlx::{postgres::PgPoolOptions, PgPool};

/// Opens the Postgres connection pool the stores share.
///
/// Pool size comes from configuration; the engine's queries are short
/// catalog and profile reads, so a small pool suffices.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}
