//! strata - a workbench for alembic migrations
//!
//! Drives the `alembic` command line, reads its text output back into typed
//! revisions, works out which revisions the database has applied, and shows
//! the result as a tree, a DOT/JSON graph, a web page, or a terminal UI.
//!
//! # Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Run alembic, capture output | [`runner`] |
//! | Parse `history` / `current` / `heads` | [`history`] |
//! | Work out applied revisions | [`resolve`] |
//! | Project to nodes and edges | [`graph`] |
//! | Patch `alembic.ini` in place | [`ini`] |
//!
//! # Quick Start
//!
//! ```no_run
//! use strata::{AlembicCli, Config, MigrationState, OutputLog};
//!
//! let config = Config::load();
//! let cli = AlembicCli::from_config(&config, ".", OutputLog::stderr());
//!
//! let state = MigrationState::load(&cli).unwrap();
//! for rev in state.pending() {
//!     println!("pending: {} {}", rev.id, rev.message);
//! }
//!
//! let graph = state.graph(&config.display());
//! println!("Nodes: {}, Edges: {}", graph.nodes.len(), graph.edges.len());
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod history;
pub mod ini;
pub mod inspect;
pub mod naming;
pub mod resolve;
pub mod revision;
pub mod runner;
pub mod serve;
pub mod source;
pub mod tui;
pub mod views;

pub use config::Config;
pub use error::{Error, ParseError, Result};
pub use graph::{graph_to_dot, project, DotConfig, GraphEdge, GraphNode, RevisionGraph};
pub use history::{parse_current, parse_heads, parse_history, parse_revisions};
pub use ini::IniError;
pub use resolve::{applied_set, CyclicHistoryError};
pub use revision::{DisplayOptions, Revision, RevisionStatus};
pub use runner::{AlembicCli, OutputLog, ProcessRunner, RunnerError};
pub use source::{MigrationSource, MigrationState};
