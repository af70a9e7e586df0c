use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckroomError {
    #[error("not a checkroom depot (run `checkroom init` first)")]
    NotInitialized,

    #[error("checkroom depot already initialized in this directory")]
    AlreadyInitialized,

    #[error("data file path is empty")]
    EmptyPath,

    #[error("does not recognize data file path: '{0}'")]
    UnrecognizedPath(String),

    #[error("illegal transition: cannot {0} a {1} data file")]
    IllegalTransition(&'static str, &'static str),

    #[error("state mismatch: expected a {expected} data file, got '{path}'")]
    StateMismatch {
        expected: &'static str,
        path: String,
    },

    #[error("body file not found: {0}")]
    BodyNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ledger error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl CheckroomError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::AlreadyInitialized => "already_initialized",
            Self::EmptyPath => "empty_path",
            Self::UnrecognizedPath(_) => "unrecognized_path",
            Self::IllegalTransition(_, _) => "illegal_transition",
            Self::StateMismatch { .. } => "state_mismatch",
            Self::BodyNotFound(_) => "body_not_found",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Db(_) => "db_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckroomError>;
