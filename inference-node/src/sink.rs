use async_trait::async_trait;
use soilsense_common::SoilResultRecord;
use tracing::info;

use crate::error::Result;

/// Append-only destination for finished predictions. The pipeline never lets a sink
/// failure reach the caller.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn append(&self, record: &SoilResultRecord) -> Result<()>;
}

/// Writes each record to the log. Used when no results store is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn append(&self, record: &SoilResultRecord) -> Result<()> {
        info!(
            user_id = %record.user_id,
            pot_name = %record.pot_name,
            prediction = %record.prediction,
            recommended_crop = %record.recommended_crop,
            "Prediction recorded"
        );
        Ok(())
    }
}
