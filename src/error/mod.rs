use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the storage collaborators (notification, preference and
/// directory stores).
#[derive(Debug, Error)]
pub enum StoreError {
    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Migration failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be mapped back into a domain value
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A row with the same key already exists
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// Backend is temporarily unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Coarse error classification shared with the request-handling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Authorization,
    Validation,
    Conflict,
    NoRecipients,
    Storage,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification not found: {0}")]
    NotFound(Uuid),

    #[error("Actions can only be executed for approval notifications")]
    InvalidType,

    #[error("User {actor} does not own notification {notification_id}")]
    NotOwner { notification_id: Uuid, actor: String },

    /// Some ids were missing or owned by another user; nothing was changed.
    #[error("Cannot update notifications: {matched} of {requested} are owned by the caller")]
    NotOwned { requested: usize, matched: usize },

    #[error("Action not registered for notification: {0}")]
    ActionNotRegistered(String),

    #[error("Comment is required for action {0}")]
    CommentRequired(String),

    #[error("Notification {0} has already been actioned")]
    AlreadyActioned(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No recipients resolved for notification")]
    NoRecipients,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl NotificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotificationError::NotFound(_) => ErrorKind::NotFound,
            NotificationError::NotOwner { .. } | NotificationError::NotOwned { .. } => {
                ErrorKind::Authorization
            }
            NotificationError::InvalidType
            | NotificationError::ActionNotRegistered(_)
            | NotificationError::CommentRequired(_)
            | NotificationError::Validation(_) => ErrorKind::Validation,
            NotificationError::AlreadyActioned(_)
            | NotificationError::Store(StoreError::Duplicate(_)) => ErrorKind::Conflict,
            NotificationError::NoRecipients => ErrorKind::NoRecipients,
            NotificationError::Store(_) => ErrorKind::Storage,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            NotificationError::NotFound(_) => "NOT_FOUND",
            NotificationError::InvalidType => "INVALID_NOTIFICATION_TYPE",
            NotificationError::NotOwner { .. } => "NOT_OWNER",
            NotificationError::NotOwned { .. } => "FORBIDDEN",
            NotificationError::ActionNotRegistered(_) => "ACTION_NOT_REGISTERED",
            NotificationError::CommentRequired(_) => "COMMENT_REQUIRED",
            NotificationError::AlreadyActioned(_) => "ALREADY_ACTIONED",
            NotificationError::Validation(_) => "VALIDATION_ERROR",
            NotificationError::NoRecipients => "NO_RECIPIENTS",
            NotificationError::Store(StoreError::Duplicate(_)) => "DUPLICATE",
            NotificationError::Store(_) => "STORAGE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, NotificationError>;
