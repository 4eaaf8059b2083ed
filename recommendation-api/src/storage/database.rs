use anyhow::{bail, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

/// Created by the migrations, which also install the insert trigger.
pub const RESULTS_TABLE: &str = "soil_results";

/// Channel the insert trigger notifies on.
pub const INSERT_CHANNEL: &str = "soil_results_inserted";

const COLUMNS_QUERY: &str = "SELECT column_name::text FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1";

/// Columns the result sink writes.
pub const REQUIRED_COLUMNS: [&str; 14] = [
    "user_id",
    "pot_name",
    "image_name",
    "image_url",
    "prediction",
    "recommended_crop",
    "confidence",
    "n",
    "p",
    "k",
    "ph_level",
    "companions",
    "avoids",
    "created_at",
];

pub async fn create_db_pool(database_url: &str, max_connections: u32, run_migrations: bool) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    if run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");
    }

    Ok(pool)
}

pub fn missing_columns(present: &[String]) -> Vec<&'static str> {
    REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !present.iter().any(|column| column == required))
        .collect()
}

/// Fails when the results table lacks a column the sink needs. An unreadable schema only
/// produces a warning.
pub async fn verify_schema(pool: &PgPool) -> Result<()> {
    let table = RESULTS_TABLE;
    let rows: Vec<(String,)> = match sqlx::query_as(COLUMNS_QUERY).bind(table).fetch_all(pool).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Could not read the schema of '{}', skipping column check: {}", table, e);
            return Ok(());
        }
    };

    let present: Vec<String> = rows.into_iter().map(|(column,)| column).collect();
    let missing = missing_columns(&present);
    if !missing.is_empty() {
        bail!("Table '{}' is missing required columns: {}", table, missing.join(", "));
    }

    info!("Table '{}' has every required column", table);
    Ok(())
}
