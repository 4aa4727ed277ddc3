use thiserror::Error;

/// Errors raised by the bowl pool library
#[derive(Error, Debug)]
pub enum Error {
    /// A query against the pool database failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A unique, foreign key or check constraint rejected a write
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A record failed validation before being saved
    #[error("{0}")]
    Validation(String),

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("export failed: {0}")]
    Export(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound { what: what.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Maps sqlite constraint failures onto [`Error::Constraint`], leaving other errors as-is
    pub fn from_write(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Constraint(message.unwrap_or_else(|| code.to_string()))
            }
            other => Error::Database(other),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Export(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Export(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
