use thiserror::Error;

/// Session layer errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// No backend was registered under the requested name
    #[error("unknown session provider {0:?} (forgotten register call?)")]
    UnknownProvider(String),

    /// The identifier is absent or has expired
    #[error("session not found: {0}")]
    NotFound(String),

    /// A live session already uses the identifier
    #[error("session already exists: {0}")]
    AlreadyExists(String),

    /// The random source could not produce an identifier
    #[error("entropy source failure: {0}")]
    Entropy(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl SessionError {
    /// True when the error only says the session does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_))
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
