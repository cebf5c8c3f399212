use thiserror::Error;

use crate::application::repos::StoreError;
use crate::config::LoadError;
use crate::domain::entities::RecordId;
use crate::domain::error::DomainError;
use crate::domain::types::Table;
use crate::infra::error::InfraError;

/// Failure surfaced by the data-access layer to its callers.
///
/// `Clone` because one in-flight read may resolve many awaiting callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("{resource} `{id}` not found")]
    NotFound { resource: &'static str, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("malformed {table} record: {reason}")]
    Malformed { table: Table, reason: String },
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl DataError {
    pub fn malformed(table: Table, reason: impl Into<String>) -> Self {
        Self::Malformed {
            table,
            reason: reason.into(),
        }
    }

    pub fn not_found(table: Table, id: impl ToString) -> Self {
        Self::NotFound {
            resource: table.resource(),
            id: id.to_string(),
        }
    }

    /// Translate a store failure for an operation on `table`, optionally
    /// targeting row `id`.
    pub fn from_store(table: Table, id: Option<RecordId>, error: StoreError) -> Self {
        match error {
            StoreError::NotFound => {
                Self::not_found(table, id.map(|id| id.to_string()).unwrap_or_default())
            }
            StoreError::Integrity { message } => Self::Integrity(message),
            StoreError::Decode { message } => Self::Malformed {
                table,
                reason: message,
            },
            StoreError::Persistence(message) => Self::Backend(message),
            StoreError::InvalidInput { message } => Self::Backend(message),
        }
    }

    /// Short machine-readable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DataError::Backend(_) => "backend",
            DataError::NotFound { .. } => "not_found",
            DataError::Validation(_) => "validation",
            DataError::Malformed { .. } => "malformed",
            DataError::Integrity(_) => "integrity",
        }
    }
}

impl From<DomainError> for DataError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => Self::Validation(message),
        }
    }
}

/// Top-level error of the `agenda` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_carries_resource_and_id() {
        let error = DataError::from_store(
            Table::Clients,
            Some(RecordId::new(99)),
            StoreError::NotFound,
        );
        assert_eq!(
            error,
            DataError::NotFound {
                resource: "client",
                id: "99".to_string()
            }
        );
        assert_eq!(error.to_string(), "client `99` not found");
        assert_eq!(error, DataError::not_found(Table::Clients, 99));
    }

    #[test]
    fn store_not_found_without_id_leaves_it_empty() {
        let error = DataError::from_store(Table::Appointments, None, StoreError::NotFound);
        assert_eq!(error, DataError::not_found(Table::Appointments, ""));
        assert_eq!(error.kind(), "not_found");
    }

    #[test]
    fn persistence_messages_surface_verbatim() {
        let error = DataError::from_store(
            Table::Appointments,
            None,
            StoreError::Persistence("connection reset".to_string()),
        );
        assert_eq!(error, DataError::Backend("connection reset".to_string()));
        assert_eq!(error.kind(), "backend");
    }
}
