use thiserror::Error;

/// Workspace-wide error taxonomy.
///
/// Every store and service in kodit returns this type (or wraps it) rather
/// than inventing a parallel per-crate error enum, so handlers can `?`
/// across store/service boundaries without manual conversion at each hop.
#[derive(Debug, Error)]
pub enum KoditError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("cancelled")]
    Cancelled,

    #[error("repository already exists")]
    RepoAlreadyExists,

    #[error("repository has no working copy")]
    RepoNotCloned,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl KoditError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }

    pub fn precondition(what: impl Into<String>) -> Self {
        Self::Precondition(what.into())
    }

    /// Storage errors bubble up wrapped with operation context, e.g.
    /// `wrap("find commits", err)` -> "find commits: <cause>".
    pub fn wrap(context: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound(context.to_string()),
            other => Self::Transient(format!("{context}: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, KoditError>;
