use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("would create a parent/child cycle: {parent} -> {child}")]
    CycleDetected { parent: String, child: String },
    #[error("decode error: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
