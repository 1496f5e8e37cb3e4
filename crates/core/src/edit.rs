use std::fmt;

use thiserror::Error;

use crate::backend::{BackendError, ViewportBackend};
use crate::dialect::{BackendKind, DialectError, TableRef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("no primary key found")]
    NoPrimaryKey,
    #[error("no rows were updated; the record may not exist")]
    NoRowsAffected,
    #[error("update touched {0} rows; the inferred key is not unique")]
    MultipleRowsAffected(u64),
    #[error("field index {0} is out of range")]
    FieldOutOfRange(usize),
    #[error("invalid update target: {0}")]
    Dialect(#[from] DialectError),
    #[error("update failed: {0}")]
    Query(#[source] BackendError),
}

impl EditError {
    /// Soft failures leave the edit session open for another attempt.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::NoRowsAffected)
    }
}

/// Column and in-memory value identifying a row in an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub column: String,
    pub value: String,
}

/// Picks the column used to address a row in an update.
pub trait PrimaryKeyStrategy: fmt::Debug + Send + Sync {
    fn infer(&self, columns: &[String], row: &[String]) -> Option<KeyBinding>;
}

/// Name-based guess: a column called `id` (any case), else the first column
/// whose name ends in `id`.
///
/// This does not consult the schema, so tables with composite keys or an
/// unconventional key name cannot be edited.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdNamingHeuristic;

impl PrimaryKeyStrategy for IdNamingHeuristic {
    fn infer(&self, columns: &[String], row: &[String]) -> Option<KeyBinding> {
        let index = columns
            .iter()
            .position(|name| name.eq_ignore_ascii_case("id"))
            .or_else(|| {
                columns
                    .iter()
                    .position(|name| name.to_ascii_lowercase().ends_with("id"))
            })?;

        Some(KeyBinding {
            column: columns[index].clone(),
            value: row.get(index)?.clone(),
        })
    }
}

pub fn infer_primary_key(
    strategy: &dyn PrimaryKeyStrategy,
    columns: &[String],
    row: &[String],
) -> Result<KeyBinding, EditError> {
    strategy.infer(columns, row).ok_or(EditError::NoPrimaryKey)
}

/// Snapshot of a row opened in the detail view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRow {
    pub values: Vec<String>,
    /// Position within the loaded page.
    pub page_row: usize,
    /// Position within the unpaged result set.
    pub absolute_index: usize,
}

impl SelectedRow {
    pub fn patch(&mut self, field_index: usize, value: String) -> Result<(), EditError> {
        let cell = self
            .values
            .get_mut(field_index)
            .ok_or(EditError::FieldOutOfRange(field_index))?;
        *cell = value;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub field_name: String,
    pub field_index: usize,
    pub original_value: String,
    pub pending_value: String,
}

impl EditSession {
    #[must_use]
    pub fn begin(columns: &[String], row: &SelectedRow, field_index: usize) -> Option<Self> {
        let field_name = columns.get(field_index)?.clone();
        let original_value = row.values.get(field_index)?.clone();
        Some(Self {
            field_name,
            field_index,
            pending_value: original_value.clone(),
            original_value,
        })
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.pending_value != self.original_value
    }
}

/// A statement and its bound parameters, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub sql: String,
    pub params: Vec<String>,
    pub key: KeyBinding,
}

/// Builds the update for one field.
///
/// The key value comes from the in-memory snapshot and is not re-read, so a
/// concurrent change to the key column can make the update miss.
pub fn plan_update(
    kind: BackendKind,
    table: &TableRef,
    columns: &[String],
    row: &[String],
    field_index: usize,
    new_value: &str,
    strategy: &dyn PrimaryKeyStrategy,
) -> Result<PlannedUpdate, EditError> {
    let field = columns
        .get(field_index)
        .ok_or(EditError::FieldOutOfRange(field_index))?;
    let key = infer_primary_key(strategy, columns, row)?;
    let sql = kind.update_sql(table, field, &key.column)?;

    Ok(PlannedUpdate {
        sql,
        params: vec![new_value.to_string(), key.value.clone()],
        key,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub row: SelectedRow,
    pub session: EditSession,
}

/// Outcome of an [`UpdateRequest`]; `outcome` carries the saved value on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditResult {
    pub page_row: usize,
    pub field_index: usize,
    pub outcome: Result<String, EditError>,
}

impl EditResult {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Plans, executes and verifies a single-field update.
///
/// The key value is taken from the in-memory snapshot, not re-read from the
/// database, so a concurrent key change surfaces as `NoRowsAffected`.
pub async fn reconcile_edit<B>(
    backend: &B,
    strategy: &dyn PrimaryKeyStrategy,
    request: UpdateRequest,
) -> EditResult
where
    B: ViewportBackend + ?Sized,
{
    let UpdateRequest {
        table,
        columns,
        row,
        session,
    } = request;

    let outcome = save_field(backend, strategy, &table, &columns, &row, &session).await;
    match &outcome {
        Ok(_) => tracing::info!(
            table = %table,
            field = %session.field_name,
            row = row.absolute_index,
            "field updated"
        ),
        Err(error) => tracing::warn!(
            table = %table,
            field = %session.field_name,
            row = row.absolute_index,
            %error,
            "field update rejected"
        ),
    }

    EditResult {
        page_row: row.page_row,
        field_index: session.field_index,
        outcome,
    }
}

async fn save_field<B>(
    backend: &B,
    strategy: &dyn PrimaryKeyStrategy,
    table: &TableRef,
    columns: &[String],
    row: &SelectedRow,
    session: &EditSession,
) -> Result<String, EditError>
where
    B: ViewportBackend + ?Sized,
{
    let planned = plan_update(
        backend.kind(),
        table,
        columns,
        &row.values,
        session.field_index,
        &session.pending_value,
        strategy,
    )?;

    let affected = backend
        .execute_update(&planned.sql, &planned.params)
        .await
        .map_err(EditError::Query)?;

    match affected {
        0 => Err(EditError::NoRowsAffected),
        1 => Ok(session.pending_value.clone()),
        many => Err(EditError::MultipleRowsAffected(many)),
    }
}
