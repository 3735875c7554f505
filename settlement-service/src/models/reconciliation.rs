//! Compensation records for settlements whose order clean-up failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::identifier::MatchPredicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Pending,
    Resolved,
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationStatus::Pending => write!(f, "pending"),
            ReconciliationStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// Written when an invoice was archived but its source orders could not be
/// deleted. Resolving the task deletes the recorded orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationTask {
    pub task_id: String,
    pub restaurant_id: String,
    pub invoice_number: String,
    pub predicate: MatchPredicate,
    pub order_ids: Vec<String>,
    pub error_message: String,
    pub status: ReconciliationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<u64>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_utc: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub resolved_utc: Option<DateTime<Utc>>,
}

// Optional DateTime<Utc> stored as a BSON DateTime
mod opt_chrono_datetime_as_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(dt) => bson::DateTime::from_chrono(*dt).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        Ok(opt.map(|dt| dt.to_chrono()))
    }
}

impl ReconciliationTask {
    pub fn new(
        restaurant_id: &str,
        invoice_number: &str,
        predicate: MatchPredicate,
        order_ids: Vec<String>,
        error_message: String,
    ) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            restaurant_id: restaurant_id.to_string(),
            invoice_number: invoice_number.to_string(),
            predicate,
            order_ids,
            error_message,
            status: ReconciliationStatus::Pending,
            deleted_count: None,
            created_utc: Utc::now(),
            resolved_utc: None,
        }
    }

    pub fn mark_resolved(&mut self, deleted_count: u64) {
        self.status = ReconciliationStatus::Resolved;
        self.deleted_count = Some(deleted_count);
        self.resolved_utc = Some(Utc::now());
    }
}
