//! Resolving catalog sources.
//!
//! `generate` and `tables` take their inputs as plain strings. A string names
//! a JSON snapshot, a declarative `.ddl` file, a single `.sql` script, a
//! migration directory, or a database DSN.

use std::path::Path;

use strata_catalog::{Catalog, Dialect, from_json, parse_declarative};
use tracing::debug;

use crate::driver::dialect_from_dsn;
use crate::error::{MigrateResult, MigrationError};
use crate::replay::{replay_directory, replay_sql};

/// What a source string refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// No source: an empty catalog.
    Empty,
    Directory,
    Json,
    Declarative,
    Script,
    Dsn,
}

impl SourceKind {
    /// Classify `source`. Paths on disk win over DSN detection so a file
    /// named `app.db` next to a directory is still read as a path when it is
    /// one.
    pub fn detect(source: &str) -> Option<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Some(Self::Empty);
        }
        let path = Path::new(source);
        if path.is_dir() {
            return Some(Self::Directory);
        }
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("json") => return Some(Self::Json),
            Some("ddl") => return Some(Self::Declarative),
            Some("sql") => return Some(Self::Script),
            _ => {}
        }
        if dialect_from_dsn(source).is_some() || source.contains("://") {
            return Some(Self::Dsn);
        }
        None
    }
}

/// Load the catalog `source` describes for `dialect`.
///
/// Directories are replayed in runner order without the history table.
/// DSNs are rejected: reading a live database is left to an external
/// introspection tool that can write a JSON snapshot.
pub async fn load_catalog(
    source: &str,
    dialect: Dialect,
    history_table: &str,
) -> MigrateResult<Catalog> {
    let kind = SourceKind::detect(source)
        .ok_or_else(|| MigrationError::NotFound(source.to_string()))?;
    debug!(source, ?kind, %dialect, "loading catalog source");

    match kind {
        SourceKind::Empty => {
            Ok(Catalog::new(dialect).with_current_schema(dialect.default_schema()))
        }
        SourceKind::Directory => replay_directory(dialect, source, history_table).await,
        SourceKind::Json => {
            let text = read(source).await?;
            let catalog = from_json(&text)?;
            if catalog.dialect != dialect {
                return Err(MigrationError::invalid_catalog(format!(
                    "snapshot {source} is for {}, expected {dialect}",
                    catalog.dialect
                )));
            }
            Ok(catalog)
        }
        SourceKind::Declarative => {
            let text = read(source).await?;
            Ok(parse_declarative(dialect, &text)?)
        }
        SourceKind::Script => {
            let text = read(source).await?;
            let name = Path::new(source)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(source);
            replay_sql(dialect, name, &text)
        }
        SourceKind::Dsn => Err(MigrationError::Unsupported(format!(
            "cannot read a catalog from database {source}: live introspection is not bundled; \
             export a JSON snapshot and pass its path instead"
        ))),
    }
}

async fn read(path: &str) -> MigrateResult<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(MigrationError::NotFound(path.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use strata_catalog::to_json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_detect_kind() {
        assert_eq!(SourceKind::detect(""), Some(SourceKind::Empty));
        assert_eq!(SourceKind::detect("schema.DDL"), Some(SourceKind::Declarative));
        assert_eq!(SourceKind::detect("snap.json"), Some(SourceKind::Json));
        assert_eq!(SourceKind::detect("init.sql"), Some(SourceKind::Script));
        assert_eq!(SourceKind::detect("postgres://localhost/app"), Some(SourceKind::Dsn));
        assert_eq!(SourceKind::detect("app.db"), Some(SourceKind::Dsn));
        assert_eq!(SourceKind::detect("whatever"), None);
    }

    #[tokio::test]
    async fn test_load_each_kind() {
        let dir = TempDir::new().unwrap();
        let ddl = dir.path().join("schema.ddl");
        std::fs::write(&ddl, "table film {\n    film_id number primarykey\n}\n").unwrap();
        let catalog = load_catalog(ddl.to_str().unwrap(), Dialect::Sqlite, "strata_history")
            .await
            .unwrap();
        assert!(catalog.table("", "film").is_some());

        let json = dir.path().join("schema.json");
        std::fs::write(&json, to_json(&catalog).unwrap()).unwrap();
        let loaded = load_catalog(json.to_str().unwrap(), Dialect::Sqlite, "strata_history")
            .await
            .unwrap();
        assert_eq!(loaded, catalog);

        let err = load_catalog(json.to_str().unwrap(), Dialect::Postgres, "strata_history")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidCatalog(_)));

        let migrations = dir.path().join("migrations");
        std::fs::create_dir(&migrations).unwrap();
        std::fs::write(
            migrations.join("1_init.sql"),
            "CREATE TABLE strata_history (filename TEXT PRIMARY KEY);\nCREATE TABLE film (film_id INTEGER PRIMARY KEY);",
        )
        .unwrap();
        let replayed = load_catalog(migrations.to_str().unwrap(), Dialect::Sqlite, "strata_history")
            .await
            .unwrap();
        assert!(replayed.table("", "film").is_some());
        assert!(replayed.table("", "strata_history").is_none());

        let script = migrations.join("1_init.sql");
        let single = load_catalog(script.to_str().unwrap(), Dialect::Sqlite, "strata_history")
            .await
            .unwrap();
        assert!(single.table("", "strata_history").is_some());
    }

    #[tokio::test]
    async fn test_unsupported_and_missing_sources() {
        let err = load_catalog("postgres://localhost/app", Dialect::Postgres, "strata_history")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Unsupported(msg) if msg.contains("postgres://localhost/app")));

        let err = load_catalog("missing.ddl", Dialect::Postgres, "strata_history")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::NotFound(path) if path == "missing.ddl"));

        let empty = load_catalog("", Dialect::Postgres, "strata_history").await.unwrap();
        assert_eq!(empty.current_schema, "public");
        assert_eq!(empty.tables().count(), 0);
    }
}
