//! Application state for the TUI

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::config::Config;
use crate::graph::{self, TreeRow};
use crate::ini;
use crate::revision::{DisplayOptions, Revision};
use crate::runner::{AlembicCli, SharedBuffer};
use crate::source::MigrationState;
use crate::views::{ViewId, ViewRegistry};

/// Work handed to a background thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Refresh,
    Upgrade(String),
    Downgrade(String),
}

impl Job {
    pub fn describe(&self) -> String {
        match self {
            Job::Refresh => "refresh".to_string(),
            Job::Upgrade(target) => format!("upgrade {}", target),
            Job::Downgrade(target) => format!("downgrade {}", target),
        }
    }
}

/// What came back from a background thread
#[derive(Debug)]
pub enum JobOutcome {
    Refreshed(Result<MigrationState, String>),
    Finished { job: Job, result: Result<(), String> },
}

#[derive(Debug, Default)]
pub struct TreePane {
    pub selected: usize,
}

#[derive(Debug, Default)]
pub struct SettingsPane {
    pub section: String,
    pub entries: Vec<(String, String)>,
    pub selected: usize,
    /// Edit buffer while a value is being changed
    pub editing: Option<String>,
}

#[derive(Debug)]
pub enum Pane {
    Tree(TreePane),
    Settings(SettingsPane),
    Output,
}

pub struct App {
    config: Config,
    root: PathBuf,
    cli: AlembicCli,

    pub state: MigrationState,
    pub rows: Vec<TreeRow>,

    pub views: ViewRegistry<Pane>,
    pub active: ViewId,

    pub output: SharedBuffer,
    pub status: Option<String>,
    pub show_help: bool,
    /// Upgrade/downgrade waiting for y/n
    pub confirm: Option<Job>,
    pub busy: usize,
    /// Scripts changed while a job was running
    pub refresh_pending: bool,

    jobs_tx: Sender<JobOutcome>,
    jobs_rx: Receiver<JobOutcome>,
}

impl App {
    pub fn new(config: Config, root: PathBuf, cli: AlembicCli, output: SharedBuffer) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel();
        let mut views = ViewRegistry::new();
        // Fresh registry, so these can't already be open
        let _ = views.open(ViewId::Tree, Pane::Tree(TreePane::default()));
        let _ = views.open(ViewId::Output, Pane::Output);

        Self {
            config,
            root,
            cli,
            state: MigrationState::default(),
            rows: Vec::new(),
            views,
            active: ViewId::Tree,
            output,
            status: None,
            show_help: false,
            confirm: None,
            busy: 0,
            refresh_pending: false,
            jobs_tx,
            jobs_rx,
        }
    }

    pub fn display(&self) -> DisplayOptions {
        self.config.display()
    }

    pub fn auto_refresh(&self) -> bool {
        self.config.auto_refresh
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.config.versions_dir(&self.root)
    }

    pub fn ini_path(&self) -> PathBuf {
        self.root.join(&self.config.config_file)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status = Some(msg.into());
    }

    // === Background work ===

    /// Run `job` on its own thread; the result arrives through `poll_jobs`
    pub fn spawn(&mut self, job: Job) {
        let cli = self.cli.clone();
        let tx = self.jobs_tx.clone();
        self.busy += 1;
        tracing::info!(job = %job.describe(), "starting job");

        std::thread::spawn(move || {
            let outcome = match job {
                Job::Refresh => {
                    JobOutcome::Refreshed(MigrationState::load(&cli).map_err(|e| e.to_string()))
                }
                Job::Upgrade(ref target) => JobOutcome::Finished {
                    result: cli.upgrade(target).map(|_| ()).map_err(|e| e.to_string()),
                    job: job.clone(),
                },
                Job::Downgrade(ref target) => JobOutcome::Finished {
                    result: cli.downgrade(target).map(|_| ()).map_err(|e| e.to_string()),
                    job: job.clone(),
                },
            };
            // Receiver only disappears when the TUI is shutting down
            let _ = tx.send(outcome);
        });
    }

    pub fn refresh(&mut self) {
        self.spawn(Job::Refresh);
    }

    /// Drain finished jobs without blocking. Returns true if anything changed.
    pub fn poll_jobs(&mut self) -> bool {
        let mut changed = false;
        while let Ok(outcome) = self.jobs_rx.try_recv() {
            self.busy = self.busy.saturating_sub(1);
            changed = true;
            self.apply_outcome(outcome);
        }
        if self.busy == 0 && self.refresh_pending {
            self.refresh_pending = false;
            tracing::debug!("running refresh deferred by a busy job");
            self.refresh();
        }
        changed
    }

    pub fn apply_outcome(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Refreshed(Ok(state)) => self.set_state(state),
            JobOutcome::Refreshed(Err(e)) => {
                tracing::error!(error = %e, "refresh failed");
                self.set_status(format!("Refresh failed: {}", first_line(&e)));
            }
            JobOutcome::Finished { job, result: Ok(()) } => {
                self.set_status(format!("{} done", job.describe()));
                self.refresh();
            }
            JobOutcome::Finished { job, result: Err(e) } => {
                tracing::error!(job = %job.describe(), error = %e, "job failed");
                self.set_status(format!("{} failed: {}", job.describe(), first_line(&e)));
            }
        }
    }

    pub fn set_state(&mut self, state: MigrationState) {
        let selected_id = self.selected_revision().map(|r| r.id.clone());
        self.rows = graph::tree_rows(&state.revisions);
        self.state = state;

        // Keep the cursor on the same revision across refreshes
        let index = selected_id
            .and_then(|id| self.row_position(&id))
            .unwrap_or(0);
        if let Some(Pane::Tree(tree)) = self.views.get_mut(ViewId::Tree) {
            tree.selected = index.min(self.rows.len().saturating_sub(1));
        }
    }

    fn row_position(&self, id: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| self.state.revisions[row.index].id == id)
    }

    pub fn on_files_changed(&mut self) {
        if !self.config.auto_refresh {
            return;
        }
        if self.busy == 0 {
            tracing::debug!("migration scripts changed, refreshing");
            self.refresh();
        } else {
            self.refresh_pending = true;
        }
    }

    // === Tree view ===

    pub fn tree_selected(&self) -> usize {
        match self.views.get(ViewId::Tree) {
            Some(Pane::Tree(tree)) => tree.selected,
            _ => 0,
        }
    }

    pub fn selected_revision(&self) -> Option<&Revision> {
        let row = self.rows.get(self.tree_selected())?;
        self.state.revisions.get(row.index)
    }

    // === Navigation ===

    pub fn move_selection(&mut self, delta: isize) {
        let rows = self.rows.len();
        match self.views.get_mut(self.active) {
            Some(Pane::Tree(tree)) => tree.selected = step(tree.selected, delta, rows),
            Some(Pane::Settings(settings)) if settings.editing.is_none() => {
                settings.selected = step(settings.selected, delta, settings.entries.len())
            }
            _ => {}
        }
    }

    pub fn jump(&mut self, to_end: bool) {
        let rows = self.rows.len();
        match self.views.get_mut(self.active) {
            Some(Pane::Tree(tree)) => tree.selected = if to_end { rows.saturating_sub(1) } else { 0 },
            Some(Pane::Settings(settings)) if settings.editing.is_none() => {
                settings.selected = if to_end {
                    settings.entries.len().saturating_sub(1)
                } else {
                    0
                }
            }
            _ => {}
        }
    }

    pub fn next_view(&mut self) {
        if let Some(next) = self.views.next_after(self.active) {
            self.active = next;
        }
    }

    // === Upgrade / downgrade ===

    pub fn request_upgrade(&mut self, to_head: bool) {
        let target = if to_head {
            Some("head".to_string())
        } else {
            self.selected_revision().map(|r| r.id.clone())
        };
        if let Some(target) = target {
            self.confirm = Some(Job::Upgrade(target));
        }
    }

    pub fn request_downgrade(&mut self) {
        if let Some(rev) = self.selected_revision() {
            self.confirm = Some(Job::Downgrade(rev.id.clone()));
        }
    }

    pub fn answer_confirm(&mut self, yes: bool) {
        if let Some(job) = self.confirm.take() {
            if yes {
                self.spawn(job);
            } else {
                self.set_status("Cancelled");
            }
        }
    }

    // === Settings ===

    /// Open (or focus) the settings pane for the `[alembic]` section
    pub fn open_settings(&mut self) {
        if self.views.is_open(ViewId::Settings) {
            self.active = ViewId::Settings;
            return;
        }
        match ini::read_file(&self.ini_path()) {
            Ok(sections) => {
                let section = "alembic".to_string();
                let entries: Vec<(String, String)> = sections
                    .get(&section)
                    .map(|s| s.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                let pane = Pane::Settings(SettingsPane {
                    section,
                    entries,
                    selected: 0,
                    editing: None,
                });
                if self.views.open(ViewId::Settings, pane).is_ok() {
                    self.active = ViewId::Settings;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot open settings");
                self.set_status(e.to_string());
            }
        }
    }

    /// Close the active pane if it is closable (only settings is)
    pub fn close_active(&mut self) {
        if self.active == ViewId::Settings {
            self.views.close(ViewId::Settings);
            self.active = ViewId::Tree;
        }
    }

    pub fn is_editing(&self) -> bool {
        matches!(
            self.views.get(ViewId::Settings),
            Some(Pane::Settings(SettingsPane { editing: Some(_), .. }))
        ) && self.active == ViewId::Settings
    }

    pub fn begin_edit(&mut self) {
        if let Some(Pane::Settings(settings)) = self.views.get_mut(ViewId::Settings) {
            if let Some((_, value)) = settings.entries.get(settings.selected) {
                settings.editing = Some(value.clone());
            }
        }
    }

    pub fn edit_input(&mut self, c: Option<char>) {
        if let Some(Pane::Settings(SettingsPane { editing: Some(buf), .. })) =
            self.views.get_mut(ViewId::Settings)
        {
            match c {
                Some(c) => buf.push(c),
                None => {
                    buf.pop();
                }
            }
        }
    }

    pub fn cancel_edit(&mut self) {
        if let Some(Pane::Settings(settings)) = self.views.get_mut(ViewId::Settings) {
            settings.editing = None;
        }
    }

    /// Write the edited value back into the ini file
    pub fn commit_edit(&mut self) {
        let ini_path = self.ini_path();
        let Some(Pane::Settings(settings)) = self.views.get_mut(ViewId::Settings) else {
            return;
        };
        let Some(value) = settings.editing.take() else {
            return;
        };
        let Some(entry) = settings.entries.get_mut(settings.selected) else {
            return;
        };

        let updates = vec![(entry.0.clone(), value.clone())];
        let key = entry.0.clone();
        match ini::patch_file(&ini_path, &settings.section, &updates) {
            Ok(_) => {
                entry.1 = value;
                self.set_status(format!("Saved {}", key));
            }
            Err(e) => {
                tracing::error!(error = %e, "saving setting failed");
                self.set_status(e.to_string());
            }
        }
    }
}

fn step(current: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let next = current as isize + delta;
    next.clamp(0, len as isize - 1) as usize
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or(s)
}
