use std::time::Duration;

use thiserror::Error;

use crate::errors::domain::{ConflictKind, DomainError, NotFoundKind, ValidationKind};
use crate::errors::ErrorCode;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {detail}")]
    Validation { code: ErrorCode, detail: String },
    #[error("Not found: {detail}")]
    NotFound { code: ErrorCode, detail: String },
    #[error("Conflict on {key}: gave up after {attempts} attempts")]
    ConflictExhausted { key: String, attempts: u32 },
    #[error("Lock on {key} not acquired within {waited:?}")]
    LockTimeout { key: String, waited: Duration },
    #[error("Conflict: {detail}")]
    Conflict { code: ErrorCode, detail: String },
    #[error("Store unavailable: {detail}")]
    StoreUnavailable {
        detail: String,
        #[source]
        source: Option<BoxedSource>,
    },
    #[error("Data corruption: {detail}")]
    DataCorruption { detail: String },
    #[error("Configuration error: {detail}")]
    Config { detail: String },
    #[error("Internal error: {detail}")]
    Internal { detail: String },
}

impl AppError {
    /// Error code for logs and reports
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { code, .. } => *code,
            AppError::NotFound { code, .. } => *code,
            AppError::ConflictExhausted { .. } => ErrorCode::ConflictExhausted,
            AppError::LockTimeout { .. } => ErrorCode::LockTimeout,
            AppError::Conflict { code, .. } => *code,
            AppError::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            AppError::DataCorruption { .. } => ErrorCode::DataCorruption,
            AppError::Config { .. } => ErrorCode::ConfigError,
            AppError::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Human-readable detail
    pub fn detail(&self) -> String {
        match self {
            AppError::Validation { detail, .. } => detail.clone(),
            AppError::NotFound { detail, .. } => detail.clone(),
            AppError::Conflict { detail, .. } => detail.clone(),
            AppError::StoreUnavailable { detail, .. } => detail.clone(),
            AppError::DataCorruption { detail } => detail.clone(),
            AppError::Config { detail } => detail.clone(),
            AppError::Internal { detail } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// True for failures the caller may simply try again.
    ///
    /// Validation rejections are final: retrying the same submission in the
    /// same phase yields the same answer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ConflictExhausted { .. }
                | AppError::LockTimeout { .. }
                | AppError::StoreUnavailable { .. }
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation { .. })
    }

    pub fn invalid(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Validation {
            code,
            detail: detail.into(),
        }
    }

    pub fn not_found(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            detail: detail.into(),
        }
    }

    pub fn conflict_exhausted(key: impl Into<String>, attempts: u32) -> Self {
        Self::ConflictExhausted {
            key: key.into(),
            attempts,
        }
    }

    pub fn lock_timeout(key: impl Into<String>, waited: Duration) -> Self {
        Self::LockTimeout {
            key: key.into(),
            waited,
        }
    }

    pub fn conflict(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            detail: detail.into(),
        }
    }

    pub fn store_unavailable(detail: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            detail: detail.into(),
            source: None,
        }
    }

    pub fn data_corruption(detail: impl Into<String>) -> Self {
        Self::DataCorruption {
            detail: detail.into(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Validation(kind, detail) => {
                let code = match kind {
                    ValidationKind::PhaseMismatch => ErrorCode::PhaseMismatch,
                    ValidationKind::ActorDead => ErrorCode::ActorDead,
                    ValidationKind::IneligibleRole => ErrorCode::IneligibleRole,
                    ValidationKind::DefendantCannotVote => ErrorCode::DefendantCannotVote,
                    ValidationKind::InvalidTarget => ErrorCode::InvalidTarget,
                    ValidationKind::InvalidChoice => ErrorCode::InvalidChoice,
                    ValidationKind::GameEnded => ErrorCode::GameEnded,
                    ValidationKind::InvalidStatus => ErrorCode::InvalidStatus,
                    ValidationKind::InvalidPlayers => ErrorCode::InvalidPlayers,
                    ValidationKind::ExtensionUsed => ErrorCode::ExtensionUsed,
                    ValidationKind::Other => ErrorCode::ValidationError,
                };
                AppError::invalid(code, detail)
            }
            DomainError::NotFound(kind, detail) => {
                let code = match kind {
                    NotFoundKind::Game => ErrorCode::GameNotFound,
                    NotFoundKind::Player => ErrorCode::PlayerNotFound,
                    NotFoundKind::Other(_) => ErrorCode::GameNotFound,
                };
                AppError::not_found(code, detail)
            }
            DomainError::Conflict(kind, detail) => match kind {
                ConflictKind::OptimisticLock => AppError::ConflictExhausted {
                    key: detail,
                    attempts: 0,
                },
                ConflictKind::GameExists => AppError::conflict(ErrorCode::GameExists, detail),
                ConflictKind::Other(_) => AppError::conflict(ErrorCode::Internal, detail),
            },
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::StoreUnavailable {
            detail: format!("redis: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::data_corruption(format!("json: {e}"))
    }
}

impl From<std::env::VarError> for AppError {
    fn from(e: std::env::VarError) -> Self {
        AppError::config(format!("env var error: {e}"))
    }
}
