//! Terminal User Interface for strata
//!
//! Features:
//! - Revision tree with current/applied/pending coloring
//! - Upgrade or downgrade to the selected revision, run off the UI thread
//! - Editor for the `[alembic]` section of the ini file
//! - Output pane with everything alembic printed
//! - Auto-refresh when migration scripts change on disk

pub mod app;
pub mod events;
pub mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use crossterm::{
    event::{poll, read, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use ratatui::prelude::*;

use crate::config::Config;
use crate::runner::{AlembicCli, OutputLog, SharedBuffer};
use app::App;
use events::handle_event;

/// Run the TUI application
pub fn run(config: Config, root: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app_inner(&mut terminal, config, root);

    // Restore terminal even if the app failed
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();

    result
}

fn run_app_inner<B: Backend + std::io::Write>(
    terminal: &mut Terminal<B>,
    config: Config,
    root: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = SharedBuffer::default();
    let cli = AlembicCli::from_config(&config, &root, OutputLog::new(output.clone()));
    let mut app = App::new(config, root, cli, output);

    let (tx, rx) = mpsc::channel();
    // Kept alive for the whole loop; dropping it stops the notifications
    let _watcher = if app.auto_refresh() {
        watch_versions(&app, tx)
    } else {
        None
    };

    app.refresh();
    run_event_loop(terminal, &mut app, rx)
}

/// Watch the versions directory. A missing directory (fresh project) just
/// means no auto-refresh.
fn watch_versions(app: &App, tx: mpsc::Sender<()>) -> Option<RecommendedWatcher> {
    let dir = app.versions_dir();
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "versions directory missing, not watching");
        return None;
    }

    let watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| {
            if let Ok(event) = res {
                if event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove() {
                    let _ = tx.send(());
                }
            }
        },
        notify::Config::default(),
    );

    match watcher {
        Ok(mut watcher) => match watcher.watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                tracing::info!(dir = %dir.display(), "watching migration scripts");
                Some(watcher)
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot watch versions directory");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "file watcher unavailable");
            None
        }
    }
}

fn run_event_loop<B: Backend + std::io::Write>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    file_change_rx: mpsc::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(100);

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if poll(tick_rate)? {
            if let Event::Key(key) = read()? {
                if handle_event(app, key) {
                    return Ok(());
                }
            }
        }

        // Editors emit bursts of events per save; one refresh covers them
        let mut changed = false;
        while file_change_rx.try_recv().is_ok() {
            changed = true;
        }
        if changed {
            app.on_files_changed();
        }

        app.poll_jobs();
    }
}
