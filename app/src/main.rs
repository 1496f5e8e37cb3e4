use std::path::Path;

use rowdeck_core::config::{ConnectionTarget, FileConfigStore, ViewerSettings};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_ENV_VAR: &str = "ROWDECK_LOG";
const LOG_FILE_NAME: &str = "rowdeck.log";

/// Installs a file-backed subscriber; the terminal itself belongs to the viewer.
fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    if std::fs::create_dir_all(log_dir).is_err() {
        return None;
    }

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(log_dir)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .ok()?;
    Some(guard)
}

fn run_app(
    store: &FileConfigStore,
    run_tui: impl FnOnce(&ViewerSettings, &ConnectionTarget) -> Result<(), rowdeck_tui::TuiError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let target = store.connection()?;
    run_tui(&store.config().viewer, target)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = FileConfigStore::load_default()?;
    let _log_guard = store.path().parent().and_then(init_logging);
    tracing::info!(config = %store.path().display(), "starting rowdeck");

    run_app(&store, rowdeck_tui::run)
}
