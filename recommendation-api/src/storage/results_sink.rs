use async_trait::async_trait;
use soilsense_common::SoilResultRecord;
use soilsense_inference::{PipelineError, ResultSink, Result};
use sqlx::postgres::PgPool;
use tracing::debug;

use super::database::{REQUIRED_COLUMNS, RESULTS_TABLE};

/// Appends every prediction to a Postgres table.
#[derive(Clone)]
pub struct PgResultSink {
    db_pool: PgPool,
    insert_sql: String,
}

impl PgResultSink {
    pub fn new(db_pool: PgPool) -> Self {
        Self {
            db_pool,
            insert_sql: insert_statement(RESULTS_TABLE),
        }
    }
}

fn insert_statement(table: &str) -> String {
    let placeholders: Vec<String> = (1..=REQUIRED_COLUMNS.len()).map(|i| format!("${}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        REQUIRED_COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

#[async_trait]
impl ResultSink for PgResultSink {
    async fn append(&self, record: &SoilResultRecord) -> Result<()> {
        sqlx::query(&self.insert_sql)
            .bind(&record.user_id)
            .bind(&record.pot_name)
            .bind(&record.image_name)
            .bind(&record.image_url)
            .bind(&record.prediction)
            .bind(&record.recommended_crop)
            .bind(record.confidence)
            .bind(record.n)
            .bind(record.p)
            .bind(record.k)
            .bind(record.ph_level)
            .bind(&record.companions)
            .bind(&record.avoids)
            .bind(record.created_at)
            .execute(&self.db_pool)
            .await
            .map_err(|e| PipelineError::PersistenceError(e.to_string()))?;

        debug!("Stored result for pot '{}'", record.pot_name);
        Ok(())
    }
}
