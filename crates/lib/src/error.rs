use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error kinds surfaced by the historian core.
///
/// Per-sample and per-tag failures inside batch operations are reported in
/// the per-tag results rather than through this type; only whole-call
/// failures travel as `Error`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("caller `{caller}` is not authorized for `{tag}`")]
    Unauthorized { caller: String, tag: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("unsupported data function `{0}`")]
    Unsupported(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}
