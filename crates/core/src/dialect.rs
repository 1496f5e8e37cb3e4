use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Page size used when a caller asks for a non-positive one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DialectError {
    #[error("unknown backend kind `{0}`")]
    UnknownBackend(String),
    #[error("schema name cannot be empty")]
    EmptySchemaName,
    #[error("table name cannot be empty")]
    EmptyTableName,
    #[error("column name cannot be empty")]
    EmptyColumnName,
}

/// The relational engines a viewport can be opened against.
///
/// Each variant owns its quoting, placeholder and case-insensitive match
/// conventions, so every statement builder below is a `match` over the
/// closed set rather than a lookup with a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(alias = "sqlite3")]
    Sqlite,
}

impl BackendKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    #[must_use]
    pub fn supports_schemas(self) -> bool {
        matches!(self, Self::Postgres)
    }

    #[must_use]
    pub fn default_port(self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::Mysql => Some(3306),
            Self::Sqlite => None,
        }
    }

    #[must_use]
    pub fn quote_identifier(self, identifier: &str) -> String {
        match self {
            Self::Mysql => format!("`{}`", identifier.replace('`', "``")),
            Self::Postgres | Self::Sqlite => format!("\"{}\"", identifier.replace('"', "\"\"")),
        }
    }

    /// Positional placeholder for the 1-based parameter `index`.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::Mysql | Self::Sqlite => "?".to_string(),
        }
    }

    #[must_use]
    pub fn qualified_table(self, table: &TableRef) -> String {
        match (self.supports_schemas(), table.schema()) {
            (true, Some(schema)) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(table.name())
            ),
            _ => self.quote_identifier(table.name()),
        }
    }

    fn quote_string(self, value: &str) -> String {
        let escaped = match self {
            Self::Mysql => value.replace('\\', "\\\\").replace('\'', "''"),
            Self::Postgres | Self::Sqlite => value.replace('\'', "''"),
        };
        format!("'{escaped}'")
    }

    fn contains_predicate(self, column: &str, pattern: &str, escaped: bool) -> String {
        let column = self.quote_identifier(column);
        match self {
            Self::Postgres => format!("{column}::TEXT ILIKE {pattern}"),
            Self::Mysql => format!("CAST({column} AS CHAR) LIKE {pattern}"),
            // SQLite has no default LIKE escape character.
            Self::Sqlite if escaped => {
                format!("CAST({column} AS TEXT) LIKE {pattern} ESCAPE '\\'")
            }
            Self::Sqlite => format!("CAST({column} AS TEXT) LIKE {pattern}"),
        }
    }

    /// `WHERE (...)` matching `filter` anywhere in any of `columns`.
    ///
    /// Returns `None` when there is nothing to filter on: a blank filter or an
    /// unknown column set. `%`, `_` and `\` in the filter match literally.
    #[must_use]
    pub fn filter_clause(self, columns: &[String], filter: Option<&str>) -> Option<String> {
        let needle = filter.map(str::trim).filter(|text| !text.is_empty())?;
        if columns.is_empty() {
            return None;
        }

        let literal = escape_like(needle);
        let escaped = literal.len() != needle.len();
        let pattern = self.quote_string(&format!("%{literal}%"));
        let predicates = columns
            .iter()
            .map(|column| self.contains_predicate(column, &pattern, escaped))
            .collect::<Vec<_>>();
        Some(format!("WHERE ({})", predicates.join(" OR ")))
    }

    #[must_use]
    pub fn order_clause(self, column: Option<&str>, direction: SortDirection) -> Option<String> {
        let column = column.filter(|name| !name.trim().is_empty())?;
        let keyword = direction.keyword()?;
        Some(format!(
            "ORDER BY {} {keyword}",
            self.quote_identifier(column)
        ))
    }

    #[must_use]
    pub fn count_sql(self, table: &TableRef, columns: &[String], filter: Option<&str>) -> String {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.qualified_table(table));
        if let Some(clause) = self.filter_clause(columns, filter) {
            sql.push(' ');
            sql.push_str(&clause);
        }
        sql
    }

    #[must_use]
    pub fn page_sql(self, table: &TableRef, query: &PageQuery) -> String {
        let mut sql = format!("SELECT * FROM {}", self.qualified_table(table));
        if let Some(clause) = self.filter_clause(&query.columns, query.filter.as_deref()) {
            sql.push(' ');
            sql.push_str(&clause);
        }
        if let Some(clause) = self.order_clause(query.sort_column.as_deref(), query.sort_direction)
        {
            sql.push(' ');
            sql.push_str(&clause);
        }
        sql.push_str(&format!(
            " LIMIT {} OFFSET {}",
            normalize_page_size(query.page_size),
            normalize_offset(query.page_offset)
        ));
        sql
    }

    /// Single-column update binding the new value first and the key value second.
    pub fn update_sql(
        self,
        table: &TableRef,
        field: &str,
        key_column: &str,
    ) -> Result<String, DialectError> {
        if field.trim().is_empty() || key_column.trim().is_empty() {
            return Err(DialectError::EmptyColumnName);
        }

        Ok(format!(
            "UPDATE {} SET {} = {} WHERE {} = {}",
            self.qualified_table(table),
            self.quote_identifier(field),
            self.placeholder(1),
            self.quote_identifier(key_column),
            self.placeholder(2)
        ))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = DialectError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            _ => Err(DialectError::UnknownBackend(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Off,
    Ascending,
    Descending,
}

impl SortDirection {
    /// Next state in the `off -> ascending -> descending -> off` cycle.
    #[must_use]
    pub fn cycle(self) -> Self {
        match self {
            Self::Off => Self::Ascending,
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Off,
        }
    }

    #[must_use]
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Self::Off => None,
            Self::Ascending => Some("ASC"),
            Self::Descending => Some("DESC"),
        }
    }

    #[must_use]
    pub fn glyph(self) -> Option<&'static str> {
        match self {
            Self::Off => None,
            Self::Ascending => Some("▲"),
            Self::Descending => Some("▼"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    schema: Option<String>,
    name: String,
}

impl TableRef {
    pub fn new(schema: Option<&str>, name: &str) -> Result<Self, DialectError> {
        if name.trim().is_empty() {
            return Err(DialectError::EmptyTableName);
        }
        if let Some(schema_name) = schema {
            if schema_name.trim().is_empty() {
                return Err(DialectError::EmptySchemaName);
            }
        }
        Ok(Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{schema}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Everything needed to build one page's count and select statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub columns: Vec<String>,
    pub page_size: i64,
    pub page_offset: i64,
    pub sort_column: Option<String>,
    pub sort_direction: SortDirection,
    pub filter: Option<String>,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            page_size: i64::try_from(DEFAULT_PAGE_SIZE).unwrap_or(i64::MAX),
            page_offset: 0,
            sort_column: None,
            sort_direction: SortDirection::Off,
            filter: None,
        }
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[must_use]
pub fn normalize_page_size(page_size: i64) -> usize {
    if page_size <= 0 {
        return DEFAULT_PAGE_SIZE;
    }
    usize::try_from(page_size).unwrap_or(usize::MAX)
}

#[must_use]
pub fn normalize_offset(offset: i64) -> usize {
    usize::try_from(offset.max(0)).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        normalize_offset, normalize_page_size, BackendKind, DialectError, PageQuery,
        SortDirection, TableRef, DEFAULT_PAGE_SIZE,
    };

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    #[test]
    fn quotes_identifiers_per_backend() {
        assert_eq!(BackendKind::Postgres.quote_identifier("users"), "\"users\"");
        assert_eq!(BackendKind::Sqlite.quote_identifier("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(BackendKind::Mysql.quote_identifier("odd`name"), "`odd``name`");
    }

    #[test]
    fn count_statements_match_backend_templates() {
        let table = TableRef::new(Some("public"), "users").expect("valid table");

        assert_eq!(
            BackendKind::Postgres.count_sql(&table, &[], None),
            "SELECT COUNT(*) FROM \"public\".\"users\""
        );
        assert_eq!(
            BackendKind::Mysql.count_sql(&table, &[], None),
            "SELECT COUNT(*) FROM `users`"
        );
        assert_eq!(
            BackendKind::Sqlite.count_sql(&table, &[], None),
            "SELECT COUNT(*) FROM \"users\""
        );
    }

    #[test]
    fn filtered_count_builds_disjunction_over_every_column() {
        let table = TableRef::new(Some("public"), "users").expect("valid table");
        let cols = columns(&["id", "name"]);

        assert_eq!(
            BackendKind::Postgres.count_sql(&table, &cols, Some("ann")),
            "SELECT COUNT(*) FROM \"public\".\"users\" \
             WHERE (\"id\"::TEXT ILIKE '%ann%' OR \"name\"::TEXT ILIKE '%ann%')"
        );
        assert_eq!(
            BackendKind::Mysql.count_sql(&table, &cols, Some("ann")),
            "SELECT COUNT(*) FROM `users` \
             WHERE (CAST(`id` AS CHAR) LIKE '%ann%' OR CAST(`name` AS CHAR) LIKE '%ann%')"
        );
        assert_eq!(
            BackendKind::Sqlite.count_sql(&table, &cols, Some("ann")),
            "SELECT COUNT(*) FROM \"users\" \
             WHERE (CAST(\"id\" AS TEXT) LIKE '%ann%' OR CAST(\"name\" AS TEXT) LIKE '%ann%')"
        );
    }

    #[test]
    fn blank_filter_or_unknown_columns_add_no_where_clause() {
        let cols = columns(&["id"]);
        assert_eq!(BackendKind::Sqlite.filter_clause(&cols, Some("   ")), None);
        assert_eq!(BackendKind::Sqlite.filter_clause(&[], Some("ann")), None);
        assert_eq!(BackendKind::Sqlite.filter_clause(&cols, None), None);
    }

    #[test]
    fn filter_text_is_escaped_as_a_string_literal() {
        let cols = columns(&["name"]);
        assert_eq!(
            BackendKind::Sqlite.filter_clause(&cols, Some("o'brien")),
            Some("WHERE (CAST(\"name\" AS TEXT) LIKE '%o''brien%')".to_string())
        );
        assert_eq!(
            BackendKind::Mysql.filter_clause(&cols, Some("a\\b")),
            Some("WHERE (CAST(`name` AS CHAR) LIKE '%a\\\\\\\\b%')".to_string())
        );
    }

    #[test]
    fn like_wildcards_in_filter_match_literally() {
        let cols = columns(&["code"]);
        assert_eq!(
            BackendKind::Postgres.filter_clause(&cols, Some("50%_a\\b")),
            Some("WHERE (\"code\"::TEXT ILIKE '%50\\%\\_a\\\\b%')".to_string())
        );
        assert_eq!(
            BackendKind::Sqlite.filter_clause(&cols, Some("50%")),
            Some("WHERE (CAST(\"code\" AS TEXT) LIKE '%50\\%%' ESCAPE '\\')".to_string())
        );
        assert_eq!(
            BackendKind::Mysql.filter_clause(&cols, Some("a_b")),
            Some("WHERE (CAST(`code` AS CHAR) LIKE '%a\\\\_b%')".to_string())
        );
    }

    #[test]
    fn page_statement_orders_and_paginates() {
        let table = TableRef::new(Some("app"), "events").expect("valid table");
        let query = PageQuery {
            page_size: 25,
            page_offset: 50,
            sort_column: Some("created_at".to_string()),
            sort_direction: SortDirection::Descending,
            ..PageQuery::default()
        };

        assert_eq!(
            BackendKind::Postgres.page_sql(&table, &query),
            "SELECT * FROM \"app\".\"events\" ORDER BY \"created_at\" DESC LIMIT 25 OFFSET 50"
        );
        assert_eq!(
            BackendKind::Mysql.page_sql(&table, &query),
            "SELECT * FROM `events` ORDER BY `created_at` DESC LIMIT 25 OFFSET 50"
        );
        assert_eq!(
            BackendKind::Sqlite.page_sql(&table, &query),
            "SELECT * FROM \"events\" ORDER BY \"created_at\" DESC LIMIT 25 OFFSET 50"
        );
    }

    #[test]
    fn page_statement_puts_filter_before_order() {
        let table = TableRef::new(None, "users").expect("valid table");
        let query = PageQuery {
            columns: columns(&["name"]),
            page_size: 2,
            page_offset: 0,
            sort_column: Some("name".to_string()),
            sort_direction: SortDirection::Ascending,
            filter: Some("ann".to_string()),
        };

        assert_eq!(
            BackendKind::Sqlite.page_sql(&table, &query),
            "SELECT * FROM \"users\" WHERE (CAST(\"name\" AS TEXT) LIKE '%ann%') \
             ORDER BY \"name\" ASC LIMIT 2 OFFSET 0"
        );
    }

    #[test]
    fn sort_direction_off_omits_order_clause() {
        assert_eq!(
            BackendKind::Postgres.order_clause(Some("name"), SortDirection::Off),
            None
        );
        assert_eq!(
            BackendKind::Postgres.order_clause(None, SortDirection::Ascending),
            None
        );
    }

    #[test]
    fn update_statements_use_backend_placeholders() {
        let table = TableRef::new(Some("public"), "users").expect("valid table");

        assert_eq!(
            BackendKind::Postgres
                .update_sql(&table, "name", "id")
                .expect("update sql"),
            "UPDATE \"public\".\"users\" SET \"name\" = $1 WHERE \"id\" = $2"
        );
        assert_eq!(
            BackendKind::Mysql
                .update_sql(&table, "name", "id")
                .expect("update sql"),
            "UPDATE `users` SET `name` = ? WHERE `id` = ?"
        );
        assert_eq!(
            BackendKind::Sqlite
                .update_sql(&table, "name", "id")
                .expect("update sql"),
            "UPDATE \"users\" SET \"name\" = ? WHERE \"id\" = ?"
        );
    }

    #[test]
    fn update_requires_field_and_key_names() {
        let table = TableRef::new(None, "users").expect("valid table");
        let err = BackendKind::Sqlite
            .update_sql(&table, " ", "id")
            .expect_err("blank field should fail");
        assert_eq!(err, DialectError::EmptyColumnName);
    }

    #[test]
    fn page_size_and_offset_are_normalized() {
        assert_eq!(normalize_page_size(0), DEFAULT_PAGE_SIZE);
        assert_eq!(normalize_page_size(-3), DEFAULT_PAGE_SIZE);
        assert_eq!(normalize_page_size(7), 7);
        assert_eq!(normalize_offset(-10), 0);
        assert_eq!(normalize_offset(40), 40);

        let table = TableRef::new(None, "users").expect("valid table");
        let query = PageQuery {
            page_size: 0,
            page_offset: -5,
            ..PageQuery::default()
        };
        assert_eq!(
            BackendKind::Sqlite.page_sql(&table, &query),
            format!("SELECT * FROM \"users\" LIMIT {DEFAULT_PAGE_SIZE} OFFSET 0")
        );
    }

    #[test]
    fn unknown_backend_kind_is_rejected() {
        assert_eq!("PostgreSQL".parse::<BackendKind>(), Ok(BackendKind::Postgres));
        assert_eq!("mariadb".parse::<BackendKind>(), Ok(BackendKind::Mysql));
        assert_eq!(
            "oracle".parse::<BackendKind>(),
            Err(DialectError::UnknownBackend("oracle".to_string()))
        );
    }

    #[test]
    fn sort_direction_cycles_through_every_state() {
        let mut direction = SortDirection::Off;
        let mut seen = Vec::new();
        for _ in 0..4 {
            direction = direction.cycle();
            seen.push(direction);
        }
        assert_eq!(
            seen,
            vec![
                SortDirection::Ascending,
                SortDirection::Descending,
                SortDirection::Off,
                SortDirection::Ascending,
            ]
        );
    }

    #[test]
    fn table_ref_rejects_blank_names() {
        assert_eq!(
            TableRef::new(None, "  ").expect_err("blank table"),
            DialectError::EmptyTableName
        );
        assert_eq!(
            TableRef::new(Some(""), "users").expect_err("blank schema"),
            DialectError::EmptySchemaName
        );
    }
}
