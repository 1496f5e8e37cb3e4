use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Pool, Row, Value};
use rowdeck_core::backend::{BackendError, RowSet, ViewportBackend, NULL_MARKER};
use rowdeck_core::config::ConnectionTarget;
use rowdeck_core::dialect::BackendKind;

/// Pooled MySQL/MariaDB connection serving one viewport.
#[derive(Debug, Clone)]
pub struct MysqlBackend {
    pool: Pool,
}

impl MysqlBackend {
    #[must_use]
    pub fn from_target(target: &ConnectionTarget) -> Self {
        Self {
            pool: Pool::new(opts_from_target(target)),
        }
    }

    pub async fn disconnect(&self) -> Result<(), BackendError> {
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(to_connection_error)
    }

    async fn conn(&self) -> Result<Conn, BackendError> {
        self.pool.get_conn().await.map_err(to_connection_error)
    }
}

#[async_trait]
impl ViewportBackend for MysqlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mysql
    }

    async fn count_rows(&self, sql: &str) -> Result<u64, BackendError> {
        tracing::debug!(backend = "mysql", sql, "counting rows");
        let mut conn = self.conn().await?;
        let count = conn
            .query_first::<i64, _>(sql)
            .await
            .map_err(to_query_error)?
            .unwrap_or_default();
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn fetch_rows(&self, sql: &str) -> Result<RowSet, BackendError> {
        tracing::debug!(backend = "mysql", sql, "fetching rows");
        let mut conn = self.conn().await?;
        let mut result = conn.query_iter(sql).await.map_err(to_query_error)?;
        let columns = result
            .columns_ref()
            .iter()
            .map(|column| column.name_str().into_owned())
            .collect::<Vec<_>>();
        let rows = result
            .collect::<Row>()
            .await
            .map_err(to_query_error)?
            .into_iter()
            .map(row_to_strings)
            .collect();
        result.drop_result().await.map_err(to_query_error)?;

        Ok(RowSet::new(columns, rows))
    }

    async fn execute_update(&self, sql: &str, params: &[String]) -> Result<u64, BackendError> {
        tracing::debug!(backend = "mysql", sql, params = params.len(), "executing update");
        let mut conn = self.conn().await?;
        conn.exec_drop(sql, params.to_vec())
            .await
            .map_err(to_query_error)?;
        Ok(conn.affected_rows())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let mut conn = self.conn().await?;
        conn.ping().await.map_err(to_connection_error)
    }
}

fn opts_from_target(target: &ConnectionTarget) -> OptsBuilder {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(target.host.clone())
        .tcp_port(target.effective_port().unwrap_or(3306))
        .user(target.user.clone())
        .client_found_rows(true);

    if let Some(password) = target.password() {
        builder = builder.pass(Some(password));
    }

    if let Some(database) = &target.database {
        builder = builder.db_name(Some(database.clone()));
    }

    builder
}

fn row_to_strings(row: Row) -> Vec<String> {
    row.unwrap().into_iter().map(mysql_value_to_string).collect()
}

fn mysql_value_to_string(value: Value) -> String {
    match value {
        Value::NULL => NULL_MARKER.to_string(),
        Value::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Value::Int(value) => value.to_string(),
        Value::UInt(value) => value.to_string(),
        Value::Float(value) => value.to_string(),
        Value::Double(value) => value.to_string(),
        Value::Date(year, month, day, hour, minute, second, 0) => {
            format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
        }
        Value::Date(year, month, day, hour, minute, second, micros) => format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
        ),
        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if is_negative { "-" } else { "" };
            let hours = u32::from(hours) + days * 24;
            if micros == 0 {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
            }
        }
    }
}

fn to_connection_error(error: mysql_async::Error) -> BackendError {
    BackendError::connectivity(error.to_string())
}

fn to_query_error(error: mysql_async::Error) -> BackendError {
    match error {
        mysql_async::Error::Io(_) => BackendError::connectivity(error.to_string()),
        _ => BackendError::query(error.to_string()),
    }
}
