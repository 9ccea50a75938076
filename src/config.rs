//! Configuration file support for strata
//!
//! Reads from .strata/config.toml, with `STRATA_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::revision::{DisplayOptions, DEFAULT_MESSAGE_MAX_LEN};

/// Directory holding strata's own files
pub const STRATA_DIR: &str = ".strata";

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Interpreter used for `python -m alembic` and the model inspector
    #[serde(default = "default_python")]
    pub python_path: String,

    /// Explicit alembic executable. When unset, alembic runs as a module of
    /// `python_path`.
    #[serde(default)]
    pub alembic_path: Option<String>,

    /// alembic.ini location, relative to the project root
    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,

    /// Refresh views when migration scripts change
    #[serde(default = "default_true")]
    pub auto_refresh: bool,

    /// Show full revision ids instead of the 8 character prefix
    #[serde(default)]
    pub show_full_hash: bool,

    /// Messages longer than this are cut with "..."
    #[serde(default = "default_message_max_len")]
    pub message_max_len: usize,

    #[serde(default)]
    pub naming: NamingConfig,
}

/// How new revision ids are chosen
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NamingConfig {
    /// Use 0001, 0002, ... instead of alembic's random hashes
    #[serde(default)]
    pub sequential_ids: bool,

    /// Zero-padding width for sequential ids
    #[serde(default = "default_padding")]
    pub padding: usize,
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_config_file() -> PathBuf {
    PathBuf::from("alembic.ini")
}

fn default_true() -> bool {
    true
}

fn default_message_max_len() -> usize {
    DEFAULT_MESSAGE_MAX_LEN
}

fn default_padding() -> usize {
    4
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            sequential_ids: false,
            padding: default_padding(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            python_path: default_python(),
            alembic_path: None,
            config_file: default_config_file(),
            auto_refresh: true,
            show_full_hash: false,
            message_max_len: default_message_max_len(),
            naming: NamingConfig::default(),
        }
    }
}

impl Config {
    /// Load config for the current directory.
    /// Returns default config if no file is found or it can't be parsed.
    pub fn load() -> Self {
        match std::env::current_dir() {
            Ok(dir) => Self::load_from(&dir),
            Err(_) => Self::default().with_env_overrides(),
        }
    }

    /// Load config by walking up from `start`, then apply env overrides
    pub fn load_from(start: &Path) -> Self {
        let config: Config = Self::find_config_path(start)
            .and_then(|path| {
                let contents = std::fs::read_to_string(&path).ok()?;
                match toml::from_str(&contents) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                        None
                    }
                }
            })
            .unwrap_or_default();
        config.with_env_overrides()
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path(start: &Path) -> Option<PathBuf> {
        let mut dir = start;

        loop {
            let config_path = dir.join(STRATA_DIR).join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(python) = std::env::var("STRATA_PYTHON") {
            self.python_path = python;
        }
        if let Ok(alembic) = std::env::var("STRATA_ALEMBIC") {
            self.alembic_path = Some(alembic);
        }
        if let Ok(config_file) = std::env::var("STRATA_CONFIG_FILE") {
            self.config_file = PathBuf::from(config_file);
        }
        self
    }

    pub fn display(&self) -> DisplayOptions {
        DisplayOptions {
            full_hash: self.show_full_hash,
            message_max_len: self.message_max_len,
        }
    }

    /// Program and leading arguments used to invoke alembic
    pub fn alembic_program(&self) -> Vec<String> {
        match &self.alembic_path {
            Some(path) => vec![path.clone()],
            None => vec![self.python_path.clone(), "-m".into(), "alembic".into()],
        }
    }

    /// Directory holding migration scripts, taken from `script_location`
    /// in the alembic ini file.
    pub fn versions_dir(&self, root: &Path) -> PathBuf {
        let ini_path = root.join(&self.config_file);
        let ini_dir = ini_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());
        let location = crate::ini::read_file(&ini_path)
            .ok()
            .and_then(|sections| sections.get("alembic")?.get("script_location").cloned())
            .unwrap_or_else(|| "alembic".to_string());
        let location = location.replace("%(here)s", &ini_dir.to_string_lossy());
        root.join(location).join("versions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.python_path, "python3");
        assert_eq!(config.config_file, PathBuf::from("alembic.ini"));
        assert!(config.auto_refresh);
        assert!(!config.show_full_hash);
        assert!(!config.naming.sequential_ids);
        assert_eq!(config.naming.padding, 4);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
python_path = ".venv/bin/python"
show_full_hash = true

[naming]
sequential_ids = true
padding = 3
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.python_path, ".venv/bin/python");
        assert!(config.show_full_hash);
        assert!(config.auto_refresh);
        assert!(config.naming.sequential_ids);
        assert_eq!(config.naming.padding, 3);
    }

    #[test]
    fn test_alembic_program() {
        let mut config = Config::default();
        assert_eq!(config.alembic_program(), vec!["python3", "-m", "alembic"]);
        config.alembic_path = Some("/usr/bin/alembic".into());
        assert_eq!(config.alembic_program(), vec!["/usr/bin/alembic"]);
    }

    #[test]
    fn test_find_config_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(dir.path().join(STRATA_DIR)).unwrap();
        std::fs::write(
            dir.path().join(STRATA_DIR).join("config.toml"),
            "message_max_len = 20\n",
        )
        .unwrap();

        let found = Config::find_config_path(&nested).unwrap();
        assert!(found.ends_with(".strata/config.toml"));
        let config: Config = toml::from_str(&std::fs::read_to_string(found).unwrap()).unwrap();
        assert_eq!(config.message_max_len, 20);
    }

    #[test]
    fn test_load_from_reads_file_and_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("pkg");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(dir.path().join(STRATA_DIR)).unwrap();
        let path = dir.path().join(STRATA_DIR).join("config.toml");

        std::fs::write(&path, "message_max_len = 20\nauto_refresh = false\n").unwrap();
        let config = Config::load_from(&nested);
        assert_eq!(config.message_max_len, 20);
        assert!(!config.auto_refresh);

        std::fs::write(&path, "message_max_len = \"many\"\n").unwrap();
        let config = Config::load_from(&nested);
        assert_eq!(config.message_max_len, DEFAULT_MESSAGE_MAX_LEN);
        assert!(config.auto_refresh);
    }

    #[test]
    fn test_versions_dir_from_ini() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("alembic.ini"),
            "[alembic]\nscript_location = %(here)s/migrations\n",
        )
        .unwrap();
        let versions = Config::default().versions_dir(dir.path());
        assert!(versions.ends_with("migrations/versions"));
    }

    #[test]
    fn test_versions_dir_default() {
        let dir = tempfile::tempdir().unwrap();
        let versions = Config::default().versions_dir(dir.path());
        assert_eq!(versions, dir.path().join("alembic").join("versions"));
    }
}
