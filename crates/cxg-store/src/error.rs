use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// A stored grammar failed to compile or compose.
    Grammar(cxg_core::Error),
    NotFound(String),
    InvalidData(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::Grammar(e) => write!(f, "grammar error: {e}"),
            StoreError::NotFound(name) => write!(f, "pattern '{name}' not found"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            StoreError::Grammar(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<cxg_core::Error> for StoreError {
    fn from(e: cxg_core::Error) -> Self {
        StoreError::Grammar(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
