use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use strata::config::STRATA_DIR;
use strata::graph::{self, DotConfig};
use strata::ini;
use strata::inspect;
use strata::naming;
use strata::revision::{DisplayOptions, Revision, RevisionStatus};
use strata::serve::{self, ServerContext};
use strata::{AlembicCli, Config, MigrationSource, MigrationState, OutputLog};

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about = "Run, inspect and visualize alembic migrations")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Project root (where alembic.ini lives)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    directory: PathBuf,

    /// alembic ini file, relative to the project root
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// alembic executable (default: `<python> -m alembic`)
    #[arg(long, global = true)]
    alembic: Option<String>,

    /// Python interpreter
    #[arg(long, global = true)]
    python: Option<String>,

    /// Debug logging, and echo alembic output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a migration environment
    Init {
        /// Template to initialize from
        #[arg(short, long, default_value = "generic")]
        template: String,

        /// Directory for the environment
        #[arg(default_value = "alembic")]
        directory: String,
    },

    /// List available environment templates
    Templates,

    /// Create a new revision
    Revision {
        /// Revision message
        #[arg(short, long)]
        message: String,

        /// Empty script instead of autogenerating from models
        #[arg(long)]
        empty: bool,

        /// Explicit revision id
        #[arg(long)]
        rev_id: Option<String>,
    },

    /// Upgrade the database
    Upgrade {
        #[arg(default_value = "head")]
        target: String,
    },

    /// Downgrade the database
    Downgrade {
        #[arg(default_value = "-1", allow_hyphen_values = true)]
        target: String,
    },

    /// Show revision history as a tree
    History {
        /// Print revisions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the revision the database is at
    Current,

    /// Show head revisions
    Heads,

    /// Merge two or more revisions into one
    Merge {
        /// Revisions to merge
        #[arg(required = true, num_args = 2..)]
        revisions: Vec<String>,

        #[arg(short, long, default_value = "merge heads")]
        message: String,
    },

    /// Export the revision graph
    Graph {
        #[arg(short, long, value_enum, default_value_t = GraphFormat::Dot)]
        format: GraphFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Graph title (DOT only)
        #[arg(long, default_value = "Migrations")]
        title: String,
    },

    /// Start the graph viewer web server
    Serve {
        #[arg(short, long, default_value = "3010")]
        port: u16,
    },

    /// Interactive terminal UI
    Tui,

    /// Read or change alembic.ini
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Check which models autogenerate can see
    Inspect,

    /// Show strata and alembic versions
    Version,

    /// Generate shell completion script
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print the ini file (or one section)
    Show {
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Set one or more keys, e.g. `script_location=db`
    Set {
        #[arg(short, long, default_value = "alembic")]
        section: String,

        #[arg(required = true, value_parser = parse_key_val)]
        pairs: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GraphFormat {
    Dot,
    Json,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();
    let root = cli.directory.clone();
    let is_tui = matches!(cli.command, Command::Tui);
    init_tracing(cli.verbose, is_tui, &root);

    if let Err(e) = run(cli, &root) {
        tracing::error!(error = ?e, "command failed");
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Logs go to stderr, except under the TUI where they'd corrupt the screen
fn init_tracing(verbose: bool, to_file: bool, root: &Path) {
    let default = if verbose { "strata=debug" } else { "strata=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if to_file {
        let dir = root.join(STRATA_DIR);
        let file = std::fs::create_dir_all(&dir).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join("strata.log"))
        });
        if let Ok(file) = file {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Where alembic's own output goes: the terminal with -v, otherwise a log
/// file under `.strata/`.
fn output_log(verbose: bool, root: &Path) -> OutputLog {
    if verbose {
        return OutputLog::stderr();
    }
    let dir = root.join(STRATA_DIR);
    match std::fs::create_dir_all(&dir).and_then(|_| OutputLog::open(&dir.join("output.log"))) {
        Ok(log) => log,
        Err(e) => {
            tracing::debug!(error = %e, "no output log, discarding alembic output");
            OutputLog::discard()
        }
    }
}

fn load_config(cli: &Cli, root: &Path) -> Config {
    let mut config = Config::load_from(root);
    if let Some(path) = &cli.config {
        config.config_file = path.clone();
    }
    if let Some(alembic) = &cli.alembic {
        config.alembic_path = Some(alembic.clone());
    }
    if let Some(python) = &cli.python {
        config.python_path = python.clone();
    }
    config
}

fn run(cli: Cli, root: &Path) -> CliResult {
    let config = load_config(&cli, root);
    let log = output_log(cli.verbose, root);
    let alembic = AlembicCli::from_config(&config, root, log.clone());
    let display = config.display();

    match cli.command {
        Command::Init { template, directory } => {
            alembic.init(&template, &directory)?;
            println!("{} Created {} environment in {}", "✓".green(), template, directory.cyan());
        }

        Command::Templates => {
            let templates = alembic.list_templates()?;
            for t in templates {
                println!("  {:<16} {}", t.name.cyan(), t.description);
            }
        }

        Command::Revision { message, empty, rev_id } => {
            let rev_id = match rev_id {
                Some(id) => Some(id),
                None if config.naming.sequential_ids => {
                    let revisions = alembic.list_revisions()?;
                    naming::rev_id_for(&config.naming, &revisions)
                }
                None => None,
            };
            let out = alembic.revision(&message, !empty, rev_id.as_deref())?;
            print!("{}", out);
            println!("{} Created revision: {}", "✓".green(), message);
        }

        Command::Upgrade { target } => {
            alembic.upgrade(&target)?;
            println!("{} Upgraded to {}", "✓".green(), target.cyan());
        }

        Command::Downgrade { target } => {
            alembic.downgrade(&target)?;
            println!("{} Downgraded to {}", "✓".green(), target.cyan());
        }

        Command::History { json } => {
            let state = MigrationState::load(&alembic)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state.revisions)?);
            } else if state.is_empty() {
                println!("No revisions yet.");
            } else {
                print_tree(&state.revisions, &display);
            }
        }

        Command::Current => match alembic.current_revision()? {
            Some(id) => println!("{}", id),
            None => println!("{}", "<base> (no revision applied)".dimmed()),
        },

        Command::Heads => {
            for head in alembic.heads()? {
                println!("{}", head);
            }
        }

        Command::Merge { revisions, message } => {
            alembic.merge(&revisions, &message)?;
            println!("{} Merged {}", "✓".green(), revisions.join(", "));
        }

        Command::Graph { format, output, title } => {
            let state = MigrationState::load(&alembic)?;
            let graph = state.graph(&display);
            let text = match format {
                GraphFormat::Json => serde_json::to_string_pretty(&graph)?,
                GraphFormat::Dot => graph::graph_to_dot(
                    &graph,
                    &DotConfig {
                        title: Some(title),
                        ..DotConfig::default()
                    },
                ),
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    eprintln!("Wrote {}", path.display());
                }
                None => println!("{}", text),
            }
        }

        Command::Serve { port } => {
            let ctx = ServerContext {
                config,
                root: root.to_path_buf(),
                log,
            };
            serve::start_graph_server(port, ctx)?;
        }

        Command::Tui => strata::tui::run(config, root.to_path_buf())?,

        Command::Settings { action } => {
            let ini_path = root.join(&config.config_file);
            match action {
                SettingsAction::Show { section } => {
                    let sections = ini::read_file(&ini_path)?;
                    let wanted = |name: &String| match &section {
                        Some(s) => s == name,
                        None => true,
                    };
                    for (name, values) in sections.iter().filter(|(name, _)| wanted(name)) {
                        println!("[{}]", name.cyan());
                        for (key, value) in values {
                            println!("{} = {}", key, value);
                        }
                        println!();
                    }
                }
                SettingsAction::Set { section, pairs } => {
                    ini::patch_file(&ini_path, &section, &pairs)?;
                    for (key, value) in &pairs {
                        println!("{} [{}] {} = {}", "✓".green(), section, key, value);
                    }
                }
            }
        }

        Command::Inspect => {
            let report = inspect::inspect_models(&config, root, log)?;
            for model in &report.visible_models {
                println!("  {} {}", "✓".green(), model);
            }
            for model in &report.hidden_models {
                println!("  {} {} (not in target_metadata)", "✗".red(), model);
            }
            for error in &report.errors {
                eprintln!("  {} {}", "!".yellow(), error);
            }
            if report.is_clean() {
                println!("{}", "All models visible to autogenerate.".green());
            }
        }

        Command::Version => {
            println!("strata {}", env!("CARGO_PKG_VERSION"));
            match alembic.version() {
                Ok(out) => println!("{}", out.trim()),
                Err(e) => println!("alembic: {}", e.to_string().dimmed()),
            }
        }

        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "strata", &mut io::stdout());
        }
    }

    Ok(())
}

fn print_tree(revisions: &[Revision], display: &DisplayOptions) {
    for row in graph::tree_rows(revisions) {
        let rev = &revisions[row.index];
        let id = rev.short_id(display);
        let (bullet, id) = match rev.status() {
            RevisionStatus::Current => ("●".green(), id.green().bold()),
            RevisionStatus::Applied => ("○".blue(), id.blue()),
            RevisionStatus::Pending => ("○".dimmed(), id.dimmed()),
        };
        let mut tags = Vec::new();
        if rev.is_head {
            tags.push("head");
        }
        if rev.is_merge() {
            tags.push("merge");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" ({})", tags.join(", ")).dimmed().to_string()
        };
        println!(
            "{}{} {} {}{}",
            "  ".repeat(row.depth),
            bullet,
            id,
            rev.display_message(display),
            tags
        );
    }
}
