//! Errors surfaced by the settlement engine.

use service_core::error::AppError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("settlement already in progress for {0}")]
    Busy(String),

    #[error("settlement did not finish within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{message}")]
    PersistenceFailure {
        message: String,
        /// Set when the invoice is already durable and only clean-up failed.
        invoice_number: Option<String>,
    },
}

impl SettlementError {
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        SettlementError::PersistenceFailure {
            message: err.to_string(),
            invoice_number: None,
        }
    }

    /// Label used for the settlement outcome metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            SettlementError::InvalidInput(_) => "invalid_input",
            SettlementError::NotFound(_) => "not_found",
            SettlementError::Busy(_) => "busy",
            SettlementError::Timeout(_) => "timeout",
            SettlementError::PersistenceFailure { .. } => "persistence_failure",
        }
    }
}

impl From<AppError> for SettlementError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(e) => SettlementError::NotFound(e.to_string()),
            AppError::BadRequest(e) => SettlementError::InvalidInput(e.to_string()),
            other => SettlementError::persistence(other),
        }
    }
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            SettlementError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            SettlementError::Busy(_) => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            SettlementError::Timeout(_) => AppError::GatewayTimeout(err.to_string()),
            SettlementError::PersistenceFailure {
                message,
                invoice_number: Some(number),
            } => AppError::DatabaseError(anyhow::anyhow!(
                "invoice {} was archived but its orders were not cleared: {}",
                number,
                message
            )),
            SettlementError::PersistenceFailure { message, .. } => {
                AppError::DatabaseError(anyhow::anyhow!(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_app_error_kinds() {
        let cases = [
            (SettlementError::InvalidInput("restaurantId".into()), "invalid_input"),
            (SettlementError::NotFound("none".into()), "not_found"),
            (SettlementError::Busy("r1/5".into()), "conflict"),
            (SettlementError::Timeout(Duration::from_secs(1)), "timeout"),
            (SettlementError::persistence("disk"), "persistence_failure"),
        ];
        for (err, kind) in cases {
            assert_eq!(AppError::from(err).kind(), kind);
        }
    }

    #[test]
    fn durable_invoice_number_is_reported() {
        let err = SettlementError::PersistenceFailure {
            message: "delete failed".into(),
            invoice_number: Some("INV-01022026120000".into()),
        };
        let app: AppError = err.into();
        assert!(app.to_string().contains("INV-01022026120000"));
    }

    #[test]
    fn store_errors_become_persistence_failures() {
        let err: SettlementError = AppError::DatabaseError(anyhow::anyhow!("down")).into();
        assert_eq!(err.outcome(), "persistence_failure");
    }
}
