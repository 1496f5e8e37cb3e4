//! State transitions for the table viewer.
//!
//! [`reduce`] applies one [`ViewerEvent`] to a [`ViewerState`] and describes any
//! backend work as [`Effect`]s. It performs no I/O and takes the current time as
//! an argument, so every transition can be driven from a unit test.

use std::time::{Duration, Instant};

use crate::backend::BackendError;
use crate::config::ViewerSettings;
use crate::dialect::TableRef;
use crate::dispatch::GenerationGuard;
use crate::edit::{EditError, EditResult, EditSession, SelectedRow, UpdateRequest};
use crate::fetch::{FetchRequest, FetchResult};
use crate::layout;
use crate::sort_filter::{OverlayMode, OverlayOutcome, SortFilterController};
use crate::viewport::{ViewportState, WindowSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Focus {
    Table,
    Detail {
        row: SelectedRow,
        field_cursor: usize,
    },
    Editing {
        row: SelectedRow,
        session: EditSession,
        saving: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub level: StatusLevel,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    Start,
    CursorUp,
    CursorDown,
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
    ScrollLeft,
    ScrollRight,
    BeginFilter,
    BeginSort,
    BeginEdit,
    Input(char),
    Backspace,
    Confirm,
    Cancel,
    Refresh,
    AcknowledgeError,
    Resize { width: usize },
    Tick,
    FetchCompleted(FetchResult),
    EditCompleted(EditResult),
    ProbeCompleted(Result<Duration, BackendError>),
    Quit,
}

/// Backend work requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch(FetchRequest),
    Update(UpdateRequest),
    Probe,
    Quit,
}

#[derive(Debug, Clone)]
pub struct ViewerState {
    table: TableRef,
    viewport: ViewportState,
    overlay: SortFilterController,
    focus: Focus,
    cursor: usize,
    status: Option<StatusMessage>,
    edit_error: Option<String>,
    loading: bool,
    guard: GenerationGuard,
    committed: WindowSettings,
    available_width: usize,
    status_ttl: Duration,
    should_quit: bool,
}

impl ViewerState {
    #[must_use]
    pub fn new(table: TableRef, settings: &ViewerSettings) -> Self {
        let viewport = ViewportState::new(settings.page_size);
        Self {
            table,
            committed: viewport.window(),
            viewport,
            overlay: SortFilterController::new(),
            focus: Focus::Table,
            cursor: 0,
            status: None,
            edit_error: None,
            loading: false,
            guard: GenerationGuard::new(settings.stale_policy()),
            available_width: 80,
            status_ttl: settings.status_ttl(),
            should_quit: false,
        }
    }

    #[must_use]
    pub fn table(&self) -> &TableRef {
        &self.table
    }

    #[must_use]
    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    #[must_use]
    pub fn overlay(&self) -> &OverlayMode {
        self.overlay.mode()
    }

    #[must_use]
    pub fn focus(&self) -> &Focus {
        &self.focus
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    #[must_use]
    pub fn edit_error(&self) -> Option<&str> {
        self.edit_error.as_deref()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn available_width(&self) -> usize {
        self.available_width
    }

    #[must_use]
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Whether keystrokes should be read as text rather than commands.
    #[must_use]
    pub fn is_text_input(&self) -> bool {
        matches!(self.overlay.mode(), OverlayMode::Filtering { .. })
            || matches!(self.focus, Focus::Editing { .. })
    }

    fn fetch_current(&mut self) -> Effect {
        self.loading = true;
        Effect::Fetch(FetchRequest {
            generation: self.guard.issue(),
            table: self.table.clone(),
            query: self.viewport.page_query(),
        })
    }

    fn set_status(&mut self, level: StatusLevel, text: impl Into<String>, now: Instant) {
        self.status = Some(StatusMessage {
            text: text.into(),
            level,
            expires_at: now + self.status_ttl,
        });
    }

    fn refresh_visible_columns(&mut self) {
        let count = layout::visible_column_count(&self.viewport, self.available_width);
        self.viewport.set_visible_column_count(count);
    }

    fn clamp_cursor(&mut self) {
        self.cursor = self.cursor.min(self.viewport.rows().len().saturating_sub(1));
    }

    fn on_overlay(&mut self, event: ViewerEvent, now: Instant) -> Vec<Effect> {
        let column_count = self.viewport.columns().len();
        let outcome = match event {
            ViewerEvent::Input(ch) => self.overlay.push_char(ch),
            ViewerEvent::Backspace => self.overlay.pop_char(),
            ViewerEvent::CursorUp => self.overlay.move_cursor(-1, column_count),
            ViewerEvent::CursorDown => self.overlay.move_cursor(1, column_count),
            ViewerEvent::Confirm => self.overlay.confirm(&mut self.viewport),
            ViewerEvent::Cancel => self.overlay.cancel(),
            _ => OverlayOutcome::Unchanged,
        };

        if outcome != OverlayOutcome::Refetch {
            return Vec::new();
        }

        self.cursor = 0;
        let summary = match (self.viewport.filter(), self.viewport.sort_column()) {
            (Some(filter), Some(column)) => format!("Filter `{filter}`, sorted by {column}"),
            (Some(filter), None) => format!("Filter `{filter}`"),
            (None, Some(column)) => format!("Sorted by {column}"),
            (None, None) => "Showing all rows".to_string(),
        };
        self.set_status(StatusLevel::Info, summary, now);
        vec![self.fetch_current()]
    }

    fn on_table(&mut self, event: ViewerEvent, now: Instant) -> Vec<Effect> {
        let page_moved = match event {
            ViewerEvent::CursorUp => {
                self.cursor = self.cursor.saturating_sub(1);
                return Vec::new();
            }
            ViewerEvent::CursorDown => {
                self.cursor += 1;
                self.clamp_cursor();
                return Vec::new();
            }
            ViewerEvent::ScrollLeft => {
                if self.viewport.scroll_left() {
                    self.refresh_visible_columns();
                }
                return Vec::new();
            }
            ViewerEvent::ScrollRight => {
                if self.viewport.scroll_right() {
                    self.refresh_visible_columns();
                }
                return Vec::new();
            }
            ViewerEvent::BeginFilter => {
                if !self.overlay.begin_filter(&self.viewport) {
                    self.set_status(StatusLevel::Info, "No columns loaded yet", now);
                }
                return Vec::new();
            }
            ViewerEvent::BeginSort => {
                if !self.overlay.begin_sort(&self.viewport) {
                    self.set_status(StatusLevel::Info, "No columns loaded yet", now);
                }
                return Vec::new();
            }
            ViewerEvent::Confirm => {
                self.open_detail();
                return Vec::new();
            }
            ViewerEvent::Refresh => return vec![self.fetch_current()],
            ViewerEvent::NextPage => self.viewport.next_page(),
            ViewerEvent::PreviousPage => self.viewport.previous_page(),
            ViewerEvent::FirstPage => self.viewport.first_page(),
            ViewerEvent::LastPage => self.viewport.last_page(),
            _ => false,
        };

        if !page_moved {
            return Vec::new();
        }
        self.cursor = 0;
        vec![self.fetch_current()]
    }

    fn open_detail(&mut self) {
        let Some(values) = self.viewport.row(self.cursor) else {
            return;
        };
        let row = SelectedRow {
            values: values.to_vec(),
            page_row: self.cursor,
            absolute_index: self.viewport.absolute_row_index(self.cursor),
        };
        self.focus = Focus::Detail {
            row,
            field_cursor: 0,
        };
    }

    fn on_detail(&mut self, event: ViewerEvent) -> Vec<Effect> {
        let column_count = self.viewport.columns().len();
        let Focus::Detail { row, field_cursor } = &mut self.focus else {
            return Vec::new();
        };

        match event {
            ViewerEvent::CursorUp => *field_cursor = field_cursor.saturating_sub(1),
            ViewerEvent::CursorDown => {
                *field_cursor = (*field_cursor + 1).min(column_count.saturating_sub(1));
            }
            ViewerEvent::BeginEdit | ViewerEvent::Confirm => {
                if let Some(session) = EditSession::begin(self.viewport.columns(), row, *field_cursor)
                {
                    let row = row.clone();
                    self.edit_error = None;
                    self.focus = Focus::Editing {
                        row,
                        session,
                        saving: false,
                    };
                }
            }
            ViewerEvent::Cancel => self.focus = Focus::Table,
            ViewerEvent::Refresh => return vec![self.fetch_current()],
            _ => {}
        }
        Vec::new()
    }

    fn on_editing(&mut self, event: ViewerEvent, now: Instant) -> Vec<Effect> {
        let Focus::Editing {
            row,
            session,
            saving,
        } = &mut self.focus
        else {
            return Vec::new();
        };
        if *saving {
            return Vec::new();
        }

        match event {
            ViewerEvent::Input(ch) => session.pending_value.push(ch),
            ViewerEvent::Backspace => {
                session.pending_value.pop();
            }
            ViewerEvent::Cancel => {
                self.focus = Focus::Detail {
                    row: row.clone(),
                    field_cursor: session.field_index,
                };
            }
            ViewerEvent::Confirm if !session.is_dirty() => {
                self.focus = Focus::Detail {
                    row: row.clone(),
                    field_cursor: session.field_index,
                };
                self.set_status(StatusLevel::Info, "No changes to save", now);
            }
            ViewerEvent::Confirm => {
                *saving = true;
                let request = UpdateRequest {
                    table: self.table.clone(),
                    columns: self.viewport.columns().to_vec(),
                    row: row.clone(),
                    session: session.clone(),
                };
                return vec![Effect::Update(request)];
            }
            _ => {}
        }
        Vec::new()
    }

    fn on_fetch_completed(&mut self, result: FetchResult, now: Instant) -> Vec<Effect> {
        if !self.guard.accepts(result.generation) {
            tracing::debug!(
                generation = result.generation,
                latest = self.guard.latest(),
                "discarding result of superseded fetch"
            );
            return Vec::new();
        }
        if result.generation == self.guard.latest() {
            self.loading = false;
        }

        match result.outcome {
            Ok(page) => {
                let empty_page = page.rows.is_empty();
                self.viewport.apply_page(page);
                if empty_page && self.viewport.clamp_page() {
                    return vec![self.fetch_current()];
                }
                self.committed = self.viewport.window();
                self.clamp_cursor();
                self.refresh_visible_columns();
            }
            Err(error) => {
                self.viewport.restore_window(self.committed.clone());
                self.set_status(StatusLevel::Error, format!("Query failed: {error}"), now);
            }
        }
        Vec::new()
    }

    fn on_edit_completed(&mut self, result: EditResult, now: Instant) -> Vec<Effect> {
        let EditResult {
            page_row,
            field_index,
            outcome,
        } = result;

        match outcome {
            Ok(value) => {
                self.viewport.patch_cell(page_row, field_index, value.clone());
                if let Focus::Editing { row, .. } = &self.focus {
                    let mut row = row.clone();
                    self.focus =
                        if row.page_row == page_row && row.patch(field_index, value).is_ok() {
                            Focus::Detail {
                                row,
                                field_cursor: field_index,
                            }
                        } else {
                            Focus::Table
                        };
                }
                self.edit_error = None;
                self.set_status(StatusLevel::Info, "Saved", now);
                vec![self.fetch_current()]
            }
            Err(error) => {
                if let Focus::Editing { saving, .. } = &mut self.focus {
                    *saving = false;
                }
                let refetch = matches!(error, EditError::MultipleRowsAffected(_));
                self.edit_error = Some(error.to_string());
                if refetch {
                    vec![self.fetch_current()]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// Applies `event` to `state`, returning the backend work it calls for.
pub fn reduce(state: &mut ViewerState, event: ViewerEvent, now: Instant) -> Vec<Effect> {
    match event {
        ViewerEvent::Start => vec![Effect::Probe, state.fetch_current()],
        ViewerEvent::Quit => {
            state.should_quit = true;
            vec![Effect::Quit]
        }
        ViewerEvent::Tick => {
            if state.status.as_ref().is_some_and(|status| now >= status.expires_at) {
                state.status = None;
            }
            Vec::new()
        }
        ViewerEvent::Resize { width } => {
            state.available_width = width;
            state.refresh_visible_columns();
            Vec::new()
        }
        ViewerEvent::AcknowledgeError => {
            state.edit_error = None;
            Vec::new()
        }
        ViewerEvent::FetchCompleted(result) => state.on_fetch_completed(result, now),
        ViewerEvent::EditCompleted(result) => state.on_edit_completed(result, now),
        ViewerEvent::ProbeCompleted(Ok(latency)) => {
            state.set_status(
                StatusLevel::Info,
                format!("Connected ({} ms)", latency.as_millis()),
                now,
            );
            Vec::new()
        }
        ViewerEvent::ProbeCompleted(Err(error)) => {
            state.set_status(
                StatusLevel::Error,
                format!("Connection check failed: {error}"),
                now,
            );
            Vec::new()
        }
        other if state.overlay.is_active() => state.on_overlay(other, now),
        other => match state.focus {
            Focus::Table => state.on_table(other, now),
            Focus::Detail { .. } => state.on_detail(other),
            Focus::Editing { .. } => state.on_editing(other, now),
        },
    }
}
