use thiserror::Error;

use crate::gateway::GatewayError;
use crate::store::StoreError;

/// Application-level error type.
/// Every AI operation resolves to a value or one of these; callers surface
/// `user_message()` and never have to guess whether the primary record was saved.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The AI answered but no usable payload could be extracted.
    #[error("{0}")]
    Parse(String),

    /// A store sub-step failed. `step` names which one.
    #[error("Failed to {step}: {source}")]
    Persistence {
        step: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn persistence(step: &'static str, source: StoreError) -> Self {
        AppError::Persistence { step, source }
    }

    /// Stable machine-readable code for the variant.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Parse(_) => "PARSE_ERROR",
            AppError::Persistence { .. } => "PERSISTENCE_ERROR",
            AppError::Gateway(GatewayError::NoProviders) => "NO_PROVIDERS",
            AppError::Gateway(GatewayError::Timeout { .. }) => "TIMEOUT",
            AppError::Gateway(_) => "AI_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message fit for showing to the user. Internal details are logged, not shown.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(_)
            | AppError::Validation(_)
            | AppError::Parse(_)
            | AppError::Gateway(_) => self.to_string(),
            AppError::Persistence { step, source } => {
                tracing::error!("Persistence error during '{step}': {source}");
                format!("Could not {step}. Your previous data is unchanged.")
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                "An internal error occurred".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::persistence::StorageError;

    #[test]
    fn test_persistence_error_names_step() {
        let err = AppError::persistence(
            "create resume record",
            StoreError::Storage {
                key: "saved_resumes".to_string(),
                source: StorageError::QuotaExceeded {
                    key: "saved_resumes".to_string(),
                },
            },
        );
        assert_eq!(err.code(), "PERSISTENCE_ERROR");
        assert!(err.to_string().contains("create resume record"));
        assert!(err.user_message().contains("create resume record"));
    }

    #[test]
    fn test_no_providers_code_and_message() {
        let err = AppError::from(GatewayError::NoProviders);
        assert_eq!(err.code(), "NO_PROVIDERS");
        assert!(err.user_message().contains("API providers configured."));
    }

    #[test]
    fn test_internal_error_is_not_leaked() {
        let err = AppError::from(anyhow::anyhow!("secret stack detail"));
        assert_eq!(err.user_message(), "An internal error occurred");
    }
}
