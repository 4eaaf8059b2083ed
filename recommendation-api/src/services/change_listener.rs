use anyhow::Result;
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPool};
use tracing::{info, warn};

use crate::storage::INSERT_CHANNEL;

/// Summary of an inserted row, as sent by the insert trigger.
#[derive(Debug, Deserialize, PartialEq)]
pub struct InsertedRow {
    pub id: Option<i64>,
    pub user_id: String,
    pub pot_name: String,
    pub prediction: String,
    pub recommended_crop: String,
    pub confidence: Option<f32>,
}

impl InsertedRow {
    pub fn parse(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// Logs every row inserted into the results table.
pub struct ChangeListener {
    db_pool: PgPool,
}

impl ChangeListener {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn start(&self) -> Result<()> {
        let mut listener = PgListener::connect_with(&self.db_pool).await?;
        listener.listen(INSERT_CHANNEL).await?;

        info!("Listening for new results on channel '{}'", INSERT_CHANNEL);

        loop {
            let notification = listener.recv().await?;
            match InsertedRow::parse(notification.payload()) {
                Ok(row) => info!(
                    id = ?row.id,
                    user_id = %row.user_id,
                    pot_name = %row.pot_name,
                    "New result: {} soil, crop {}",
                    row.prediction,
                    row.recommended_crop
                ),
                Err(e) => warn!("Unreadable notification on '{}': {}", INSERT_CHANNEL, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trigger_payload() {
        let payload = r#"{"id":12,"user_id":"user-7","pot_name":"bed-3","prediction":"Clay",
            "recommended_crop":"maize","confidence":0.82,"created_at":"2024-05-01T10:00:00+00:00"}"#;

        let row = InsertedRow::parse(payload).unwrap();
        assert_eq!(row.id, Some(12));
        assert_eq!(row.recommended_crop, "maize");
        assert_eq!(row.confidence, Some(0.82));
    }

    #[test]
    fn test_null_confidence_and_garbage() {
        let payload = r#"{"user_id":"u","pot_name":"p","prediction":"No soil detected","recommended_crop":"no_crop","confidence":null}"#;
        assert_eq!(InsertedRow::parse(payload).unwrap().confidence, None);
        assert!(InsertedRow::parse("not json").is_err());
    }
}
