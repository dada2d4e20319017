use thiserror::Error;

/// Failure of a persistence call, independent of the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write. Carries the constraint name.
    #[error("Constraint violated: {0}")]
    Conflict(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// The backend refused the request for a reason other than a conflict.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Malformed record: {0}")]
    Serialization(String),

    /// Storage could not be reached or failed internally. Safe to retry.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict_on(&self, constraint: &str) -> bool {
        matches!(self, StoreError::Conflict(name) if name == constraint)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StoreError::Serialization(e.to_string())
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }
}
