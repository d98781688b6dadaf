//! CLI configuration handling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_catalog::Dialect;
use strata_migrate::{DEFAULT_HISTORY_TABLE, RunnerConfig};

use crate::error::{CliError, CliResult};

/// Default config file name (lives in the working directory)
pub const CONFIG_FILE_NAME: &str = "strata.toml";

/// Default migrations directory
pub const MIGRATIONS_DIR: &str = "migrations";

/// strata CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Migration configuration
    pub migrations: MigrationsConfig,

    /// Generate defaults
    pub generate: GenerateConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `explicit` when given, otherwise `strata.toml` in `dir` if it
    /// exists, otherwise defaults.
    pub fn discover(dir: &Path, explicit: Option<&Path>) -> CliResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let path = dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> CliResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The configured dialect, if any.
    pub fn dialect(&self) -> CliResult<Option<Dialect>> {
        self.database
            .dialect
            .as_deref()
            .map(|name| {
                name.parse::<Dialect>()
                    .map_err(|e| CliError::Config(e.to_string()))
            })
            .transpose()
    }

    /// Runner settings from the `[migrations]` table.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::new()
            .history_table(&self.migrations.history_table)
            .lock_retries(self.migrations.lock_retries)
            .lock_retry_delay(Duration::from_millis(self.migrations.lock_retry_delay_ms))
    }
}

/// Database configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database DSN
    pub url: Option<String>,

    /// Dialect used when a command cannot infer one
    pub dialect: Option<String>,
}

/// Migration configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Directory holding migration files
    pub directory: PathBuf,

    /// History table name
    pub history_table: String,

    /// Lock attempts before giving up
    pub lock_retries: u32,

    /// Base delay between lock attempts
    pub lock_retry_delay_ms: u64,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(MIGRATIONS_DIR),
            history_table: DEFAULT_HISTORY_TABLE.to_string(),
            lock_retries: 5,
            lock_retry_delay_ms: 200,
        }
    }
}

/// Defaults for `strata generate`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    /// Output directory (defaults to the migrations directory)
    pub output_dir: Option<PathBuf>,

    /// Emit DROP statements
    pub drop_objects: bool,

    /// Write files despite warnings
    pub accept_warnings: bool,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::discover(dir.path(), None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.migrations.directory, PathBuf::from("migrations"));
        assert_eq!(config.runner_config().history_table, "strata_history");
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[database]\nurl = \"sqlite://app.db\"\ndialect = \"sqlite3\"\n\n[migrations]\nlock_retries = 2\n\n[generate]\ndrop_objects = true\n",
        )
        .unwrap();
        let config = Config::discover(dir.path(), None).unwrap();
        assert_eq!(config.database.url.as_deref(), Some("sqlite://app.db"));
        assert_eq!(config.dialect().unwrap(), Some(Dialect::Sqlite));
        assert_eq!(config.migrations.lock_retries, 2);
        assert_eq!(config.migrations.lock_retry_delay_ms, 200);
        assert!(config.generate.drop_objects);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        let mut config = Config::default();
        config.migrations.history_table = "schema_history".to_string();
        config.save(&path).unwrap();
        assert_eq!(Config::discover(dir.path(), Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_bad_input() {
        let dir = TempDir::new().unwrap();
        assert!(Config::discover(dir.path(), Some(&dir.path().join("missing.toml"))).is_err());
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[database]\ndialect = \"oracle\"\n").unwrap();
        assert!(Config::load(&path).unwrap().dialect().is_err());
        std::fs::write(&path, "[migrations\n").unwrap();
        assert!(matches!(Config::load(&path), Err(CliError::Config(_))));
    }
}
