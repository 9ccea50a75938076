//! Alembic CLI runner
//!
//! Wrapper around the `alembic` command line tool. Every call spawns one
//! subprocess, streams its output into the shared [`OutputLog`] as lines
//! arrive, and waits for it to exit. Calls are independent: two threads may
//! run alembic at the same time and only the log is shared.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

use chrono::Local;
use thiserror::Error;

use crate::config::Config;
use crate::history::{self, Template};

/// Error type for subprocess execution
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The executable could not be launched at all
    #[error("failed to launch '{program}': {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited non-zero
    #[error("'{command}' failed{}: {stderr}", .exit_code.map(|c| format!(" (exit code {})", c)).unwrap_or_default())]
    ExternalTool {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Append-only, line-buffered sink for subprocess output.
///
/// Clones share the same sink; each line is written and flushed under the
/// lock so concurrent writers interleave whole lines.
#[derive(Clone)]
pub struct OutputLog {
    sink: Arc<Mutex<dyn Write + Send>>,
}

impl std::fmt::Debug for OutputLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputLog").finish_non_exhaustive()
    }
}

impl OutputLog {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        let sink: Arc<Mutex<dyn Write + Send>> = Arc::new(Mutex::new(writer));
        Self { sink }
    }

    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    pub fn discard() -> Self {
        Self::new(std::io::sink())
    }

    /// Append to `path`, creating parent directories as needed
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(file))
    }

    pub fn line(&self, stream: &str, text: &str) {
        let mut sink = match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Log output is best effort; a full disk must not fail the command
        let _ = writeln!(sink, "[{}] {}: {}", Local::now().format("%H:%M:%S"), stream, text);
        let _ = sink.flush();
    }
}

/// In-memory writer whose contents can be read back, used to show the
/// output log inside the terminal UI.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let mut buf = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs arbitrary programs in a working directory, logging their output
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    working_dir: PathBuf,
    envs: Vec<(String, String)>,
    log: OutputLog,
}

impl ProcessRunner {
    pub fn new(working_dir: impl Into<PathBuf>, log: OutputLog) -> Self {
        Self {
            working_dir: working_dir.into(),
            envs: Vec::new(),
            log,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn log(&self) -> &OutputLog {
        &self.log
    }

    /// Run `argv[0]` with the remaining arguments and return its stdout
    pub fn run(&self, argv: &[String]) -> Result<String> {
        let Some((program, args)) = argv.split_first() else {
            return Err(RunnerError::ProcessSpawn {
                program: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command line"),
            });
        };
        let command_line = argv.join(" ");
        tracing::debug!(command = %command_line, cwd = %self.working_dir.display(), "spawning");
        self.log.line("run", &command_line);

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.working_dir)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunnerError::ProcessSpawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let log = &self.log;
        let (out, err) = std::thread::scope(|s| {
            let out = s.spawn(move || drain(stdout, log, "stdout"));
            let err = s.spawn(move || drain(stderr, log, "stderr"));
            (out.join().unwrap_or_default(), err.join().unwrap_or_default())
        });

        let status = child.wait().map_err(|source| RunnerError::ProcessSpawn {
            program: program.clone(),
            source,
        })?;

        if !status.success() {
            tracing::debug!(command = %command_line, code = ?status.code(), "command failed");
            return Err(RunnerError::ExternalTool {
                command: command_line,
                exit_code: status.code(),
                stderr: err.trim().to_string(),
            });
        }

        Ok(out)
    }
}

/// Read a stream to the end, logging each line as it arrives
fn drain<R: Read>(stream: Option<R>, log: &OutputLog, name: &str) -> String {
    let Some(stream) = stream else {
        return String::new();
    };
    let mut collected = String::new();
    for chunk in BufReader::new(stream).split(b'\n') {
        let Ok(bytes) = chunk else { break };
        let line = String::from_utf8_lossy(&bytes);
        let line = line.trim_end_matches('\r');
        log.line(name, line);
        collected.push_str(line);
        collected.push('\n');
    }
    collected
}

/// Typed front end for the alembic command line
#[derive(Debug, Clone)]
pub struct AlembicCli {
    runner: ProcessRunner,
    program: Vec<String>,
    config_file: PathBuf,
}

impl AlembicCli {
    pub fn new(program: Vec<String>, config_file: impl Into<PathBuf>, runner: ProcessRunner) -> Self {
        Self {
            runner,
            program,
            config_file: config_file.into(),
        }
    }

    pub fn from_config(config: &Config, working_dir: impl Into<PathBuf>, log: OutputLog) -> Self {
        Self::new(
            config.alembic_program(),
            config.config_file.clone(),
            ProcessRunner::new(working_dir, log),
        )
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn working_dir(&self) -> &Path {
        self.runner.working_dir()
    }

    pub fn log(&self) -> &OutputLog {
        self.runner.log()
    }

    /// `[tool, "-c", config, args...]`
    pub fn command_line(&self, args: &[&str]) -> Vec<String> {
        let mut argv = self.program.clone();
        argv.push("-c".to_string());
        argv.push(self.config_file.to_string_lossy().into_owned());
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    pub fn run(&self, args: &[&str]) -> Result<String> {
        self.runner.run(&self.command_line(args))
    }

    /// `alembic --version`, which needs no config file
    pub fn version(&self) -> Result<String> {
        let mut argv = self.program.clone();
        argv.push("--version".to_string());
        Ok(self.runner.run(&argv)?.trim().to_string())
    }

    pub fn init(&self, template: &str, directory: &str) -> Result<String> {
        self.run(&["init", "--template", template, directory])
    }

    pub fn list_templates(&self) -> Result<Vec<Template>> {
        Ok(history::parse_templates(&self.run(&["list_templates"])?))
    }

    pub fn revision(&self, message: &str, autogenerate: bool, rev_id: Option<&str>) -> Result<String> {
        let mut args = vec!["revision"];
        if autogenerate {
            args.push("--autogenerate");
        }
        args.extend(["-m", message]);
        if let Some(id) = rev_id {
            args.extend(["--rev-id", id]);
        }
        self.run(&args)
    }

    pub fn upgrade(&self, target: &str) -> Result<String> {
        self.run(&["upgrade", target])
    }

    pub fn downgrade(&self, target: &str) -> Result<String> {
        self.run(&["downgrade", target])
    }

    pub fn history(&self, verbose: bool) -> Result<String> {
        if verbose {
            self.run(&["history", "--verbose"])
        } else {
            self.run(&["history"])
        }
    }

    pub fn current(&self) -> Result<String> {
        self.run(&["current"])
    }

    pub fn heads(&self) -> Result<Vec<String>> {
        Ok(history::parse_heads(&self.run(&["heads", "-v"])?))
    }

    pub fn merge(&self, revisions: &[String], message: &str) -> Result<String> {
        let mut args = vec!["merge"];
        args.extend(revisions.iter().map(String::as_str));
        args.extend(["-m", message]);
        self.run(&args)
    }
}
