use async_trait::async_trait;
use thiserror::Error;

use crate::dialect::BackendKind;

/// Display text used for SQL `NULL` cells.
pub const NULL_MARKER: &str = "NULL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Opening, pinging or otherwise reaching the server failed.
    Connectivity,
    /// The server rejected or failed a statement.
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    kind: BackendErrorKind,
    message: String,
}

impl BackendError {
    #[must_use]
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Connectivity,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self {
            kind: BackendErrorKind::Query,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Column names plus rows of display text, every row as wide as `columns`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RowSet {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }
}

/// A live connection to one relational backend.
///
/// Implementations must not hold a connection guard across an `.await`; a
/// single handle is shared by every fetch, count, update and probe.
#[async_trait]
pub trait ViewportBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn count_rows(&self, sql: &str) -> Result<u64, BackendError>;

    async fn fetch_rows(&self, sql: &str) -> Result<RowSet, BackendError>;

    /// Runs a parameterized statement and returns the affected row count.
    async fn execute_update(&self, sql: &str, params: &[String]) -> Result<u64, BackendError>;

    async fn ping(&self) -> Result<(), BackendError>;
}


#[cfg(test)]
mod tests {
    use super::{BackendError, BackendErrorKind};

    #[test]
    fn error_kind_and_message_are_preserved() {
        let error = BackendError::connectivity("connection refused");
        assert_eq!(error.kind(), BackendErrorKind::Connectivity);
        assert_eq!(error.to_string(), "connection refused");

        let error = BackendError::query("syntax error");
        assert_eq!(error.kind(), BackendErrorKind::Query);
        assert_eq!(error.message(), "syntax error");
    }
}
