use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rowdeck_core::backend::{BackendError, RowSet, ViewportBackend, NULL_MARKER};
use rowdeck_core::dialect::BackendKind;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

/// SQLite database file (or in-memory database) behind a shared handle.
///
/// Every call runs on the blocking pool; the guard is released before the
/// result is handed back to the async caller.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|error| {
            BackendError::connectivity(format!("cannot open {}: {error}", path.display()))
        })?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory().map_err(to_connection_error)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs a batch of statements with no result, e.g. to seed a scratch database.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        let sql = sql.to_string();
        self.run(move |conn| conn.execute_batch(&sql)).await
    }

    async fn run<T, F>(&self, work: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            work(&guard)
        })
        .await
        .map_err(|error| BackendError::connectivity(format!("sqlite worker failed: {error}")))?
        .map_err(to_query_error)
    }
}

#[async_trait]
impl ViewportBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn count_rows(&self, sql: &str) -> Result<u64, BackendError> {
        tracing::debug!(backend = "sqlite", sql, "counting rows");
        let sql = sql.to_string();
        let count = self
            .run(move |conn| conn.query_row(&sql, [], |row| row.get::<_, i64>(0)))
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn fetch_rows(&self, sql: &str) -> Result<RowSet, BackendError> {
        tracing::debug!(backend = "sqlite", sql, "fetching rows");
        let sql = sql.to_string();
        self.run(move |conn| {
            let mut statement = conn.prepare(&sql)?;
            let columns = statement
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>();
            let width = columns.len();

            let mut rows = Vec::new();
            let mut cursor = statement.query([])?;
            while let Some(row) = cursor.next()? {
                let values = (0..width)
                    .map(|index| row.get_ref(index).map(value_to_string))
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows.push(values);
            }
            Ok(RowSet::new(columns, rows))
        })
        .await
    }

    async fn execute_update(&self, sql: &str, params: &[String]) -> Result<u64, BackendError> {
        tracing::debug!(backend = "sqlite", sql, params = params.len(), "executing update");
        let sql = sql.to_string();
        let params = params.to_vec();
        let affected = self
            .run(move |conn| conn.execute(&sql, rusqlite::params_from_iter(params.iter())))
            .await?;
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.run(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .map(|_| ())
    }
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => NULL_MARKER.to_string(),
        ValueRef::Integer(value) => value.to_string(),
        ValueRef::Real(value) => value.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

fn to_connection_error(error: rusqlite::Error) -> BackendError {
    BackendError::connectivity(error.to_string())
}

fn to_query_error(error: rusqlite::Error) -> BackendError {
    BackendError::query(error.to_string())
}

#[cfg(test)]
mod tests {
    use rusqlite::types::ValueRef;

    use super::value_to_string;

    #[test]
    fn values_render_as_display_text() {
        assert_eq!(value_to_string(ValueRef::Null), "NULL");
        assert_eq!(value_to_string(ValueRef::Integer(-3)), "-3");
        assert_eq!(value_to_string(ValueRef::Real(2.5)), "2.5");
        assert_eq!(value_to_string(ValueRef::Text(b"Ann")), "Ann");
        assert_eq!(value_to_string(ValueRef::Blob(&[b'o', 0xfe, b'k'])), "o\u{fffd}k");
    }
}
