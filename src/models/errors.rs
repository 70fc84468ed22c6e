use thiserror::Error;

use super::OrderId;

/// Repository-level errors for data access operations. Both backends surface
/// the same kinds so nothing above the repository depends on the active store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("order {id} does not exist")]
    NotFound { id: OrderId },

    #[error("order {id} already exists")]
    Conflict { id: OrderId },

    #[error("stored order could not be decoded: {message}")]
    Corrupt { message: String },

    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("transaction failed: {message}")]
    TransactionFailed { message: String },
}

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Corrupt {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for RepositoryError {
    fn from(err: redis::RedisError) -> Self {
        RepositoryError::StoreUnavailable {
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                RepositoryError::Corrupt {
                    message: err.to_string(),
                }
            }
            other => RepositoryError::StoreUnavailable {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RepositoryError::NotFound { id: 42 };
        assert_eq!(error.to_string(), "order 42 does not exist");

        let error = RepositoryError::Conflict { id: 7 };
        assert_eq!(error.to_string(), "order 7 already exists");
    }

    #[test]
    fn test_serde_error_maps_to_corrupt() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json");
        assert!(json_error.is_err());

        let repo_error: RepositoryError = json_error.unwrap_err().into();
        match repo_error {
            RepositoryError::Corrupt { .. } => {}
            other => panic!("Expected Corrupt error, got {other:?}"),
        }
    }

    #[test]
    fn test_sqlx_row_decode_maps_to_corrupt() {
        let err = sqlx::Error::Decode("bad column".into());
        let repo_error: RepositoryError = err.into();
        match repo_error {
            RepositoryError::Corrupt { .. } => {}
            other => panic!("Expected Corrupt error, got {other:?}"),
        }
    }

    #[test]
    fn test_sqlx_transport_maps_to_store_unavailable() {
        let err = sqlx::Error::PoolTimedOut;
        let repo_error: RepositoryError = err.into();
        match repo_error {
            RepositoryError::StoreUnavailable { .. } => {}
            other => panic!("Expected StoreUnavailable error, got {other:?}"),
        }
    }
}
