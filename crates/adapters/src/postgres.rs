use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rowdeck_core::backend::{BackendError, RowSet, ViewportBackend, NULL_MARKER};
use rowdeck_core::config::ConnectionTarget;
use rowdeck_core::dialect::BackendKind;
use postgres_types::{to_sql_checked, Format, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};

type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// Single PostgreSQL session; the connection future runs on its own task.
#[derive(Clone)]
pub struct PostgresBackend {
    client: Arc<Client>,
}

impl std::fmt::Debug for PostgresBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl PostgresBackend {
    pub async fn connect(target: &ConnectionTarget) -> Result<Self, BackendError> {
        let config = config_from_target(target);
        let (client, connection) = config.connect(NoTls).await.map_err(to_connection_error)?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::warn!(%error, "postgres connection closed");
            }
        });

        Ok(Self {
            client: Arc::new(client),
        })
    }
}

#[async_trait]
impl ViewportBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn count_rows(&self, sql: &str) -> Result<u64, BackendError> {
        tracing::debug!(backend = "postgres", sql, "counting rows");
        let row = self.client.query_one(sql, &[]).await.map_err(to_query_error)?;
        let count = row.try_get::<_, i64>(0).map_err(to_query_error)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn fetch_rows(&self, sql: &str) -> Result<RowSet, BackendError> {
        tracing::debug!(backend = "postgres", sql, "fetching rows");
        let statement = self.client.prepare(sql).await.map_err(to_query_error)?;
        let columns = statement
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect::<Vec<_>>();
        let binary = statement
            .columns()
            .iter()
            .map(|column| *column.type_() == Type::BYTEA)
            .collect::<Vec<_>>();

        let rows = self
            .client
            .simple_query(sql)
            .await
            .map_err(to_query_error)?
            .into_iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(
                    binary
                        .iter()
                        .enumerate()
                        .map(|(index, is_binary)| {
                            render_text(row.try_get(index).ok().flatten(), *is_binary)
                        })
                        .collect(),
                ),
                _ => None,
            })
            .collect();

        Ok(RowSet::new(columns, rows))
    }

    async fn execute_update(&self, sql: &str, params: &[String]) -> Result<u64, BackendError> {
        tracing::debug!(backend = "postgres", sql, params = params.len(), "executing update");
        let statement = self.client.prepare(sql).await.map_err(to_query_error)?;
        let bound = statement
            .params()
            .iter()
            .zip(params)
            .map(|(ty, value)| coerce_param(ty, value))
            .collect::<Result<Vec<_>, _>>()?;
        let refs = bound
            .iter()
            .map(|param| param.as_ref() as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();

        self.client
            .execute(&statement, &refs)
            .await
            .map_err(to_query_error)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        if self.client.is_closed() {
            return Err(BackendError::connectivity("postgres connection is closed"));
        }
        self.client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(to_connection_error)
    }
}

fn config_from_target(target: &ConnectionTarget) -> Config {
    let mut config = Config::new();
    config
        .host(&target.host)
        .port(target.effective_port().unwrap_or(5432))
        .application_name("rowdeck");

    if let Some(user) = &target.user {
        config.user(user);
    }
    if let Some(database) = &target.database {
        config.dbname(database);
    }
    if let Some(password) = target.password() {
        config.password(password);
    }
    config
}

/// Text-protocol value as display text; `bytea` arrives hex-encoded.
fn render_text(value: Option<&str>, binary: bool) -> String {
    let Some(text) = value else {
        return NULL_MARKER.to_string();
    };
    if binary {
        if let Some(decoded) = text.strip_prefix("\\x").and_then(|raw| hex::decode(raw).ok()) {
            return String::from_utf8_lossy(&decoded).into_owned();
        }
    }
    text.to_string()
}

/// Edited value sent in the text wire format; the server parses it as `ty`.
#[derive(Debug)]
struct TextParam(String);

impl ToSql for TextParam {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// Converts an edited value to the declared parameter type.
///
/// Types without a native mapping, and values the typed parsers reject, fall
/// back to [`TextParam`] so the server applies its own input rules.
fn coerce_param(ty: &Type, value: &str) -> Result<BoxedParam, BackendError> {
    let mismatch = || BackendError::query(format!("cannot bind `{value}` as {ty}"));
    let trimmed = value.trim();

    let param: BoxedParam = match *ty {
        Type::BOOL => Box::new(parse_bool(trimmed).ok_or_else(mismatch)?),
        Type::INT2 => Box::new(trimmed.parse::<i16>().map_err(|_| mismatch())?),
        Type::INT4 => Box::new(trimmed.parse::<i32>().map_err(|_| mismatch())?),
        Type::INT8 => Box::new(trimmed.parse::<i64>().map_err(|_| mismatch())?),
        Type::FLOAT4 => Box::new(trimmed.parse::<f32>().map_err(|_| mismatch())?),
        Type::FLOAT8 => Box::new(trimmed.parse::<f64>().map_err(|_| mismatch())?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            Box::new(value.to_string())
        }
        _ => parse_typed(ty, trimmed).unwrap_or_else(|| Box::new(TextParam(value.to_string()))),
    };
    Ok(param)
}

fn parse_typed(ty: &Type, value: &str) -> Option<BoxedParam> {
    let param: BoxedParam = match *ty {
        Type::UUID => Box::new(uuid::Uuid::parse_str(value).ok()?),
        Type::JSON | Type::JSONB => {
            Box::new(serde_json::from_str::<serde_json::Value>(value).ok()?)
        }
        Type::DATE => Box::new(NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?),
        Type::TIME => Box::new(NaiveTime::parse_from_str(value, "%H:%M:%S%.f").ok()?),
        Type::TIMESTAMP => Box::new(parse_naive_timestamp(value)?),
        Type::TIMESTAMPTZ => Box::new(
            DateTime::parse_from_rfc3339(value)
                .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z"))
                .map(|timestamp| timestamp.with_timezone(&Utc))
                .ok()
                .or_else(|| parse_naive_timestamp(value).map(|naive| naive.and_utc()))?,
        ),
        _ => return None,
    };
    Some(param)
}

fn parse_naive_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn to_connection_error(error: tokio_postgres::Error) -> BackendError {
    BackendError::connectivity(error.to_string())
}

fn to_query_error(error: tokio_postgres::Error) -> BackendError {
    if error.is_closed() {
        return BackendError::connectivity(error.to_string());
    }
    let message = match error.as_db_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    };
    BackendError::query(message)
}

#[cfg(test)]
mod tests {
    use rowdeck_core::backend::BackendErrorKind;
    use rowdeck_core::config::ConnectionTarget;
    use rowdeck_core::dialect::BackendKind;
    use bytes::BytesMut;
    use postgres_types::{Format, Type};

    use super::{coerce_param, config_from_target, parse_bool, render_text};

    #[test]
    fn null_and_bytea_values_render_as_text() {
        assert_eq!(render_text(None, false), "NULL");
        assert_eq!(render_text(Some("Ann"), false), "Ann");
        assert_eq!(render_text(Some("\\x68690a"), true), "hi\n");
        assert_eq!(render_text(Some("\\xzz"), true), "\\xzz");
    }

    #[test]
    fn params_are_coerced_to_declared_types() {
        assert!(coerce_param(&Type::INT4, " 42 ").is_ok());
        assert!(coerce_param(&Type::FLOAT8, "1.5").is_ok());
        assert!(coerce_param(&Type::BOOL, "t").is_ok());
        assert!(coerce_param(&Type::TEXT, "anything").is_ok());

        let error = coerce_param(&Type::INT8, "abc").err().expect("not a number");
        assert_eq!(error.kind(), BackendErrorKind::Query);
        assert!(error.message().contains("abc"));
    }

    #[test]
    fn edited_text_binds_to_non_text_column_types() {
        let cases = [
            (Type::UUID, "0b6f1a5e-4e2c-4c3e-9a39-3f1f2c7e8d11"),
            (Type::NUMERIC, "12.50"),
            (Type::DATE, "2024-02-29"),
            (Type::TIME, "13:05:00"),
            (Type::TIMESTAMP, "2024-02-29 13:05:00.25"),
            (Type::TIMESTAMPTZ, "2024-02-29 13:05:00+00"),
            (Type::JSON, "{\"a\": 1}"),
            (Type::JSONB, "[1, 2]"),
            (Type::INET, "10.0.0.1"),
        ];

        for (ty, value) in cases {
            let param = coerce_param(&ty, value).expect("coerced");
            let mut buf = BytesMut::new();
            if let Err(error) = param.to_sql_checked(&ty, &mut buf) {
                panic!("{ty}: {error}");
            }
            assert!(!buf.is_empty(), "{ty} wrote nothing");
        }
    }

    #[test]
    fn unparsed_values_fall_back_to_text_format() {
        let numeric = coerce_param(&Type::NUMERIC, "12.50").expect("coerced");
        assert!(matches!(numeric.encode_format(&Type::NUMERIC), Format::Text));
        let mut buf = BytesMut::new();
        numeric
            .to_sql_checked(&Type::NUMERIC, &mut buf)
            .expect("text numeric");
        assert_eq!(&buf[..], b"12.50");

        let odd_date = coerce_param(&Type::DATE, "epoch").expect("coerced");
        assert!(matches!(odd_date.encode_format(&Type::DATE), Format::Text));

        let parsed = coerce_param(&Type::UUID, "0b6f1a5e-4e2c-4c3e-9a39-3f1f2c7e8d11")
            .expect("coerced");
        assert!(matches!(parsed.encode_format(&Type::UUID), Format::Binary));
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn config_uses_default_port_and_target_fields() {
        let mut target = ConnectionTarget::new(BackendKind::Postgres, "orders");
        target.user = Some("viewer".to_string());
        target.database = Some("shop".to_string());

        let config = config_from_target(&target);
        assert_eq!(config.get_ports(), &[5432]);
        assert_eq!(config.get_user(), Some("viewer"));
        assert_eq!(config.get_dbname(), Some("shop"));
    }
}
