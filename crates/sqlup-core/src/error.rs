use thiserror::Error;

/// Core error type for SQLUP operations.
#[derive(Error, Debug)]
pub enum SqlupError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A script root is missing or a script could not be read.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// The journal table could not be created, read or written.
    #[error("Journal unavailable: {0}")]
    JournalUnavailable(String),

    #[error("Undefined variable '${name}$' in script '{script}'")]
    UndefinedVariable { script: String, name: String },

    #[error("Script '{script}' failed: {message}")]
    Execution { script: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Upgrade cancelled before script '{0}'")]
    Cancelled(String),
}

impl SqlupError {
    /// Name of the script this error is attached to, if any.
    pub fn script(&self) -> Option<&str> {
        match self {
            SqlupError::UndefinedVariable { script, .. } | SqlupError::Execution { script, .. } => {
                Some(script)
            }
            SqlupError::Cancelled(script) => Some(script),
            _ => None,
        }
    }
}

/// Result type alias using SqlupError.
pub type Result<T> = std::result::Result<T, SqlupError>;
