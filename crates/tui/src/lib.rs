use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Row, Table};
use ratatui::{Frame, Terminal};
use rowdeck_adapters::{open_backend, AnyBackend, OpenError};
use rowdeck_core::config::{ConnectionTarget, ViewerSettings};
use rowdeck_core::connection::probe_connection;
use rowdeck_core::dialect::DialectError;
use rowdeck_core::edit::{reconcile_edit, IdNamingHeuristic, PrimaryKeyStrategy};
use rowdeck_core::fetch::execute_fetch;
use rowdeck_core::layout::{self, COLUMN_SEPARATOR_WIDTH};
use rowdeck_core::reducer::{reduce, Effect, Focus, StatusLevel, ViewerEvent, ViewerState};
use rowdeck_core::sort_filter::OverlayMode;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

const TICK_RATE: Duration = Duration::from_millis(120);
/// Left and right border of the table block.
const TABLE_CHROME_WIDTH: u16 = 2;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid table target: {0}")]
    Target(#[from] DialectError),
    #[error(transparent)]
    Open(#[from] OpenError),
}

/// Whether printable keys are commands or text for a field being typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Command,
    Text,
}

/// Spawns effects onto the runtime and posts their outcomes back as events.
struct EffectRunner {
    handle: Handle,
    backend: Arc<AnyBackend>,
    strategy: Arc<dyn PrimaryKeyStrategy>,
    probe_timeout: Duration,
    events: UnboundedSender<ViewerEvent>,
}

impl EffectRunner {
    fn dispatch(&self, effect: Effect) {
        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();

        match effect {
            Effect::Fetch(request) => {
                self.handle.spawn(async move {
                    let result = execute_fetch(backend.as_ref(), request).await;
                    post(&events, ViewerEvent::FetchCompleted(result));
                });
            }
            Effect::Update(request) => {
                let strategy = Arc::clone(&self.strategy);
                self.handle.spawn(async move {
                    let result = reconcile_edit(backend.as_ref(), strategy.as_ref(), request).await;
                    post(&events, ViewerEvent::EditCompleted(result));
                });
            }
            Effect::Probe => {
                let timeout = self.probe_timeout;
                self.handle.spawn(async move {
                    let result = probe_connection(backend.as_ref(), timeout).await;
                    post(&events, ViewerEvent::ProbeCompleted(result));
                });
            }
            Effect::Quit => {}
        }
    }
}

fn post(events: &UnboundedSender<ViewerEvent>, event: ViewerEvent) {
    if events.send(event).is_err() {
        tracing::debug!("viewer closed before a background result arrived");
    }
}

/// Opens `target` and runs the viewer until the user quits.
pub fn run(settings: &ViewerSettings, target: &ConnectionTarget) -> Result<(), TuiError> {
    let table = target.table_ref()?;
    let runtime = Runtime::new()?;
    let backend = Arc::new(runtime.block_on(open_backend(target))?);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let runner = EffectRunner {
        handle: runtime.handle().clone(),
        backend,
        strategy: Arc::new(IdNamingHeuristic),
        probe_timeout: settings.probe_timeout(),
        events: events_tx,
    };
    let mut app = ViewerState::new(table, settings);

    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &mut app, &runner, &mut events_rx);
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn apply(app: &mut ViewerState, runner: &EffectRunner, event: ViewerEvent) {
    for effect in reduce(app, event, Instant::now()) {
        runner.dispatch(effect);
    }
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut ViewerState,
    runner: &EffectRunner,
    events: &mut UnboundedReceiver<ViewerEvent>,
) -> Result<(), TuiError> {
    let width = table_width(terminal.size()?.width);
    apply(app, runner, ViewerEvent::Resize { width });
    apply(app, runner, ViewerEvent::Start);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|frame| render(frame, app))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if let Some(message) = map_key_event(key, input_mode(app)) {
                        apply(app, runner, message);
                    }
                }
                Event::Resize(width, _) => {
                    let width = table_width(width);
                    apply(app, runner, ViewerEvent::Resize { width });
                }
                _ => {}
            }
        }

        while let Ok(message) = events.try_recv() {
            apply(app, runner, message);
        }

        if last_tick.elapsed() >= TICK_RATE {
            apply(app, runner, ViewerEvent::Tick);
            last_tick = Instant::now();
        }

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}

fn table_width(terminal_width: u16) -> usize {
    usize::from(terminal_width.saturating_sub(TABLE_CHROME_WIDTH))
}

fn render(frame: &mut Frame<'_>, app: &ViewerState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(4)])
        .split(frame.area());

    match app.focus() {
        Focus::Table => render_table(frame, app, chunks[0]),
        Focus::Detail { .. } | Focus::Editing { .. } => render_detail(frame, app, chunks[0]),
    }
    render_footer(frame, app, chunks[1]);

    if let OverlayMode::Sorting { cursor } = app.overlay() {
        render_sort_menu(frame, app, *cursor);
    }
}

fn render_table(frame: &mut Frame<'_>, app: &ViewerState, area: Rect) {
    let layout = layout::layout_viewport(app.viewport(), app.available_width());
    let title = if app.is_loading() {
        format!(" {} (loading) ", app.table())
    } else {
        format!(" {} ", app.table())
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    if layout.headers.is_empty() {
        let message = if app.is_loading() {
            "Loading rows..."
        } else {
            "No columns to show"
        };
        frame.render_widget(Paragraph::new(message).block(block), area);
        return;
    }

    let header = Row::new(layout.headers.iter().map(|header| header.title.clone()))
        .style(Style::default().add_modifier(Modifier::BOLD));
    let widths = layout
        .headers
        .iter()
        .map(|header| Constraint::Length(u16::try_from(header.width).unwrap_or(u16::MAX)))
        .collect::<Vec<_>>();
    let rows = layout.cells.into_iter().enumerate().map(|(index, cells)| {
        let row = Row::new(cells);
        if index == app.cursor() {
            row.style(Style::default().fg(Color::Black).bg(Color::Cyan))
        } else {
            row
        }
    });

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(u16::try_from(COLUMN_SEPARATOR_WIDTH).unwrap_or(1))
        .block(block);
    frame.render_widget(table, area);
}

fn render_detail(frame: &mut Frame<'_>, app: &ViewerState, area: Rect) {
    let columns = app.viewport().columns();
    let mut lines = Vec::new();

    let (values, field_cursor, editing) = match app.focus() {
        Focus::Detail { row, field_cursor } => (&row.values, *field_cursor, None),
        Focus::Editing {
            row,
            session,
            saving,
        } => (&row.values, session.field_index, Some((session, *saving))),
        Focus::Table => return,
    };

    for (index, (name, value)) in columns.iter().zip(values).enumerate() {
        let marker = if index == field_cursor { ">" } else { " " };
        lines.push(Line::from(vec![
            Span::raw(format!("{marker} ")),
            Span::styled(
                format!("{name}: "),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(value.clone()),
        ]));
    }

    if let Some((session, saving)) = editing {
        lines.push(Line::from(""));
        lines.push(Line::from(format!(
            "Editing `{}` (was: {})",
            session.field_name, session.original_value
        )));
        lines.push(Line::from(Span::styled(
            format!("> {}_", session.pending_value),
            Style::default().fg(Color::Yellow),
        )));
        if saving {
            lines.push(Line::from("Saving..."));
        }
    }

    if let Some(error) = app.edit_error() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Edit failed: {error} (Ctrl-X to dismiss)"),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
    }

    let title = match app.focus() {
        Focus::Detail { row, .. } | Focus::Editing { row, .. } => {
            format!(" {} row {} ", app.table(), row.absolute_index + 1)
        }
        Focus::Table => String::new(),
    };
    let detail = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .alignment(Alignment::Left);
    frame.render_widget(detail, area);
}

fn render_footer(frame: &mut Frame<'_>, app: &ViewerState, area: Rect) {
    let status_line = match (app.overlay(), app.status()) {
        (OverlayMode::Filtering { input }, _) => Line::from(format!("Filter: {input}_")),
        (_, Some(status)) => {
            let color = match status.level {
                StatusLevel::Info => Color::Green,
                StatusLevel::Error => Color::Red,
            };
            Line::from(Span::styled(status.text.clone(), Style::default().fg(color)))
        }
        (_, None) => Line::from(key_hints(app)),
    };

    let footer = Paragraph::new(vec![Line::from(footer_summary(app)), status_line])
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, area);
}

fn key_hints(app: &ViewerState) -> &'static str {
    match app.focus() {
        Focus::Table => {
            "j/k row  h/l scroll  n/p page  g/G first/last  / filter  s sort  Enter open  r refresh  q quit"
        }
        Focus::Detail { .. } => "j/k field  e edit  Esc back  q quit",
        Focus::Editing { .. } => "Enter save  Esc cancel  Ctrl-X dismiss error",
    }
}

fn footer_summary(app: &ViewerState) -> String {
    let viewport = app.viewport();
    let column_count = viewport.columns().len();
    let first = viewport.scroll_offset();
    let last = first + viewport.visible_column_count();

    let mut parts = vec![
        format!(
            "Page {}/{}",
            viewport.current_page() + 1,
            viewport.total_pages().max(1)
        ),
        format!("{} rows", viewport.total_rows()),
    ];
    if column_count > 0 {
        parts.push(format!("cols {}-{} of {column_count}", first + 1, last.max(first + 1)));
    }
    if let Some(filter) = viewport.filter() {
        parts.push(format!("filter: {filter}"));
    }
    if let Some(column) = viewport.sort_column() {
        let glyph = viewport.sort_direction().glyph().unwrap_or_default();
        parts.push(format!("sort: {column} {glyph}"));
    }
    parts.join(" | ")
}

fn render_sort_menu(frame: &mut Frame<'_>, app: &ViewerState, cursor: usize) {
    let area = centered_rect(40, 60, frame.area());
    frame.render_widget(Clear, area);

    let viewport = app.viewport();
    let lines = viewport
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let marker = if index == cursor { ">" } else { " " };
            let glyph = viewport.direction_for(column).glyph().unwrap_or_default();
            Line::from(format!("{marker} {column} {glyph}"))
        })
        .collect::<Vec<_>>();

    let menu = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Sort by (Enter cycles, Esc closes) "),
    );
    frame.render_widget(menu, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn input_mode(app: &ViewerState) -> InputMode {
    if app.is_text_input() {
        InputMode::Text
    } else {
        InputMode::Command
    }
}

fn map_key_event(key: KeyEvent, mode: InputMode) -> Option<ViewerEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(ViewerEvent::Quit),
            KeyCode::Char('x') => Some(ViewerEvent::AcknowledgeError),
            _ => None,
        };
    }

    match (mode, key.code) {
        (_, KeyCode::Enter) => Some(ViewerEvent::Confirm),
        (_, KeyCode::Esc) => Some(ViewerEvent::Cancel),
        (InputMode::Text, KeyCode::Backspace) => Some(ViewerEvent::Backspace),
        (InputMode::Text, KeyCode::Char(ch)) => Some(ViewerEvent::Input(ch)),
        (InputMode::Text, _) => None,
        (InputMode::Command, KeyCode::Char('q')) => Some(ViewerEvent::Quit),
        (InputMode::Command, KeyCode::Up | KeyCode::Char('k')) => Some(ViewerEvent::CursorUp),
        (InputMode::Command, KeyCode::Down | KeyCode::Char('j')) => Some(ViewerEvent::CursorDown),
        (InputMode::Command, KeyCode::Left | KeyCode::Char('h')) => Some(ViewerEvent::ScrollLeft),
        (InputMode::Command, KeyCode::Right | KeyCode::Char('l')) => {
            Some(ViewerEvent::ScrollRight)
        }
        (InputMode::Command, KeyCode::PageDown | KeyCode::Char('n')) => {
            Some(ViewerEvent::NextPage)
        }
        (InputMode::Command, KeyCode::PageUp | KeyCode::Char('p')) => {
            Some(ViewerEvent::PreviousPage)
        }
        (InputMode::Command, KeyCode::Home | KeyCode::Char('g')) => Some(ViewerEvent::FirstPage),
        (InputMode::Command, KeyCode::End | KeyCode::Char('G')) => Some(ViewerEvent::LastPage),
        (InputMode::Command, KeyCode::Char('/')) => Some(ViewerEvent::BeginFilter),
        (InputMode::Command, KeyCode::Char('s')) => Some(ViewerEvent::BeginSort),
        (InputMode::Command, KeyCode::Char('e')) => Some(ViewerEvent::BeginEdit),
        (InputMode::Command, KeyCode::Char('r')) => Some(ViewerEvent::Refresh),
        (InputMode::Command, KeyCode::Char('x')) => Some(ViewerEvent::AcknowledgeError),
        (InputMode::Command, _) => None,
    }
}
