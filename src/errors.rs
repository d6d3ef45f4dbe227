/// Errors produced by session stores and the request-scoped session context.
///
/// `NoStoreConfigured` and `PayloadTooLarge` are expected conditions that callers
/// should handle; `StoreInit` is surfaced once at start-up and is not fatal to the
/// application.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no session store was found")]
    NoStoreConfigured,

    #[error("session store could not be initialized: {0}")]
    StoreInit(String),

    #[error("session value type is not registered: {0}")]
    UnregisteredType(String),

    #[error("session value tag {0} is already registered for another type")]
    RegistryConflict(String),

    #[error("session cookie payload is {size} bytes, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("invalid session cookie: {0}")]
    InvalidCookie(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(String),
}

#[cfg(feature = "sqlite_session_store")]
impl From<r2d2::Error> for SessionError {
    fn from(e: r2d2::Error) -> Self {
        SessionError::Database(e.to_string())
    }
}

#[cfg(feature = "sqlite_session_store")]
impl From<r2d2_sqlite::rusqlite::Error> for SessionError {
    fn from(e: r2d2_sqlite::rusqlite::Error) -> Self {
        SessionError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
