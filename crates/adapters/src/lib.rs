pub mod mysql;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use rowdeck_core::backend::{BackendError, RowSet, ViewportBackend};
use rowdeck_core::config::ConnectionTarget;
use rowdeck_core::dialect::BackendKind;
use thiserror::Error;

use crate::mysql::MysqlBackend;
use crate::postgres::PostgresBackend;
use crate::sqlite::SqliteBackend;

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("{0} connections need a database file path")]
    MissingPath(BackendKind),
    #[error("failed to open {backend} connection: {source}")]
    Backend {
        backend: BackendKind,
        #[source]
        source: BackendError,
    },
}

/// One of the supported backends, chosen at runtime from a [`ConnectionTarget`].
#[derive(Debug, Clone)]
pub enum AnyBackend {
    Postgres(PostgresBackend),
    Mysql(MysqlBackend),
    Sqlite(SqliteBackend),
}

impl AnyBackend {
    fn inner(&self) -> &dyn ViewportBackend {
        match self {
            Self::Postgres(backend) => backend,
            Self::Mysql(backend) => backend,
            Self::Sqlite(backend) => backend,
        }
    }
}

#[async_trait]
impl ViewportBackend for AnyBackend {
    fn kind(&self) -> BackendKind {
        self.inner().kind()
    }

    async fn count_rows(&self, sql: &str) -> Result<u64, BackendError> {
        self.inner().count_rows(sql).await
    }

    async fn fetch_rows(&self, sql: &str) -> Result<RowSet, BackendError> {
        self.inner().fetch_rows(sql).await
    }

    async fn execute_update(&self, sql: &str, params: &[String]) -> Result<u64, BackendError> {
        self.inner().execute_update(sql, params).await
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.inner().ping().await
    }
}

/// Opens the backend described by `target`.
///
/// The MySQL pool connects on first use, so an unreachable server only shows
/// up on the first probe or fetch.
pub async fn open_backend(target: &ConnectionTarget) -> Result<AnyBackend, OpenError> {
    let backend = target.backend;
    let wrap = |source| OpenError::Backend { backend, source };

    let opened = match backend {
        BackendKind::Postgres => {
            AnyBackend::Postgres(PostgresBackend::connect(target).await.map_err(wrap)?)
        }
        BackendKind::Mysql => AnyBackend::Mysql(MysqlBackend::from_target(target)),
        BackendKind::Sqlite => {
            let path = target
                .path
                .as_ref()
                .ok_or(OpenError::MissingPath(backend))?;
            AnyBackend::Sqlite(SqliteBackend::open(path).map_err(wrap)?)
        }
    };

    tracing::info!(backend = %backend, host = %target.host, table = %target.table, "backend opened");
    Ok(opened)
}
