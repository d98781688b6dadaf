//! Migration files on disk.
//!
//! A migration directory holds plain `.sql` files. Files under a
//! `repeatable/` path segment are re-applied whenever their content changes;
//! every other file runs once, in prefix order.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use strata_catalog::Dialect;
use tracing::debug;

use crate::error::{MigrateResult, MigrationError};
use crate::replay::lexer::{split_statements, tokenize};

/// Path segment marking repeatable migrations.
pub const REPEATABLE_DIR: &str = "repeatable";

/// First-line comment that makes a file run outside a transaction.
pub const NO_TRANSACTION_DIRECTIVE: &str = "-- strata:no-transaction";

/// A migration file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationFile {
    /// Path relative to the migration directory, `/`-separated.
    pub filename: String,
    /// Absolute or caller-relative path to the file.
    pub path: PathBuf,
    pub contents: String,
    /// SHA-256 of the file bytes, hex encoded.
    pub checksum: String,
    pub repeatable: bool,
}

impl MigrationFile {
    /// Create a migration file from its relative name and contents.
    pub fn new(filename: impl Into<String>, contents: impl Into<String>) -> Self {
        let filename = filename.into();
        let contents = contents.into();
        Self {
            checksum: compute_checksum(contents.as_bytes()),
            repeatable: is_repeatable(&filename),
            path: PathBuf::from(&filename),
            filename,
            contents,
        }
    }

    /// Set the path for this migration file.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Whether the file can run inside a transaction on `dialect`.
    pub fn is_transactional(&self, dialect: Dialect) -> bool {
        let directive = self
            .contents
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .is_some_and(|line| line.eq_ignore_ascii_case(NO_TRANSACTION_DIRECTIVE));
        if directive {
            return false;
        }
        !split_statements(&self.contents)
            .iter()
            .any(|statement| requires_autocommit(dialect, statement))
    }
}

/// Whether `statement` cannot run inside a transaction on `dialect`.
fn requires_autocommit(dialect: Dialect, statement: &str) -> bool {
    let Ok(tokens) = tokenize(statement) else {
        return false;
    };
    let starts_with = |prefix: &[&str]| {
        prefix.len() <= tokens.len() && prefix.iter().zip(&tokens).all(|(p, t)| t.is_keyword(p))
    };
    match dialect {
        Dialect::Postgres => {
            tokens.iter().any(|t| t.is_keyword("CONCURRENTLY"))
                || starts_with(&["VACUUM"])
                || starts_with(&["ALTER", "SYSTEM"])
        }
        Dialect::Sqlserver => starts_with(&["ALTER", "DATABASE"]),
        Dialect::Sqlite => starts_with(&["VACUUM"]),
        Dialect::Mysql => false,
    }
}

/// SHA-256 of `bytes`, hex encoded.
pub fn compute_checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Whether a relative filename lies under a `repeatable/` directory.
pub fn is_repeatable(filename: &str) -> bool {
    let mut segments: Vec<&str> = filename.split('/').collect();
    segments.pop();
    segments.iter().any(|s| *s == REPEATABLE_DIR)
}

/// Order migration filenames: regular files by numeric prefix then name,
/// repeatable files after them by name.
pub fn compare_filenames(a: &str, b: &str) -> Ordering {
    let rank = |name: &str| is_repeatable(name) as u8;
    rank(a)
        .cmp(&rank(b))
        .then_with(|| compare_prefix(a, b))
        .then_with(|| a.cmp(b))
}

fn compare_prefix(a: &str, b: &str) -> Ordering {
    let prefix = |name: &str| {
        let digits: &str = &name[..name.len() - name.trim_start_matches(|c: char| c.is_ascii_digit()).len()];
        let trimmed = digits.trim_start_matches('0');
        (!digits.is_empty(), trimmed.len(), trimmed.to_string())
    };
    let (has_a, len_a, digits_a) = prefix(a);
    let (has_b, len_b, digits_b) = prefix(b);
    match (has_a, has_b) {
        (true, true) => len_a.cmp(&len_b).then_with(|| digits_a.cmp(&digits_b)),
        // Numbered files come first.
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

/// Translate a shell glob into an anchored regex over relative filenames.
///
/// `*` and `?` stay within one path segment, `**` crosses segments.
pub fn glob_to_regex(pattern: &str) -> MigrateResult<regex_lite::Regex> {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    regex.push_str("(?:.*/)?");
                } else {
                    regex.push_str(".*");
                }
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            c => regex.push_str(&regex_lite::escape(&c.to_string())),
        }
    }
    regex.push('$');
    regex_lite::Regex::new(&regex)
        .map_err(|e| MigrationError::other(format!("invalid glob '{pattern}': {e}")))
}

/// The ordered migration files of one directory.
#[derive(Debug, Clone)]
pub struct MigrationSource {
    dir: PathBuf,
    files: Vec<MigrationFile>,
}

impl MigrationSource {
    /// Build a source from files already in memory.
    pub fn from_files(dir: impl Into<PathBuf>, mut files: Vec<MigrationFile>) -> Self {
        files.sort_by(|a, b| compare_filenames(&a.filename, &b.filename));
        Self {
            dir: dir.into(),
            files,
        }
    }

    /// Read every `.sql` file under `dir`.
    pub async fn load(dir: impl AsRef<Path>) -> MigrateResult<Self> {
        let dir = dir.as_ref();
        if !tokio::fs::try_exists(dir).await? {
            return Err(MigrationError::NotFound(dir.display().to_string()));
        }

        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                    continue;
                }
                let filename = relative_name(dir, &path);
                let bytes = tokio::fs::read(&path).await?;
                let checksum = compute_checksum(&bytes);
                let contents = String::from_utf8(bytes).map_err(|_| {
                    MigrationError::other(format!("migration '{filename}' is not valid UTF-8"))
                })?;
                files.push(MigrationFile {
                    repeatable: is_repeatable(&filename),
                    filename,
                    path,
                    contents,
                    checksum,
                });
            }
        }

        debug!(dir = %dir.display(), files = files.len(), "loaded migration directory");
        Ok(Self::from_files(dir, files))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every file, regular files first.
    pub fn files(&self) -> &[MigrationFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, filename: &str) -> Option<&MigrationFile> {
        self.files.iter().find(|f| f.filename == filename)
    }

    /// Look up a file by relative name or by a path that starts with the
    /// directory.
    pub fn resolve(&self, name: &str) -> Option<&MigrationFile> {
        let name = name.replace('\\', "/");
        if let Some(file) = self.get(&name) {
            return Some(file);
        }
        let dir = self.dir.to_string_lossy().replace('\\', "/");
        let dir = dir.trim_end_matches('/');
        let relative = name
            .strip_prefix(dir)
            .map(|rest| rest.trim_start_matches('/'))
            .or_else(|| name.strip_prefix("./"))?;
        self.get(relative)
    }

    /// Files whose relative name matches a glob.
    pub fn matching(&self, pattern: &str) -> MigrateResult<Vec<&MigrationFile>> {
        let regex = glob_to_regex(pattern)?;
        Ok(self
            .files
            .iter()
            .filter(|f| regex.is_match(&f.filename))
            .collect())
    }
}

fn relative_name(dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(dir).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
