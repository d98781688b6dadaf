//! Per-dialect DDL engines.
//!
//! Every engine implements [`DialectEngine`]. The trait carries the shared
//! rendering (constraint clauses, index and view statements, the
//! shadow-table rebuild) and each engine overrides what its database spells
//! differently. [`DialectEngine::diff`] is the single entry point: it runs the
//! structural differ and the planner, then returns ordered statement batches.

mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

pub use mysql::MysqlEngine;
pub use postgres::PostgresEngine;
pub use sqlite::SqliteEngine;
pub use sqlserver::{SqlserverEngine, default_constraint_name};

use strata_catalog::{Catalog, Column, Constraint, ConstraintType, Dialect, Index, Table, View};

use crate::diff::{ColumnChange, TableDiff};
use crate::error::{MigrateResult, MigrationError};
use crate::plan;

/// Name of the batch holding foreign keys deferred to break cycles.
pub const FKEYS_BATCH: &str = "fkeys";

/// Prefix of the shadow table used by whole-table rebuilds.
pub const SHADOW_TABLE_PREFIX: &str = "_strata_new_";

/// An ordered group of statements written to one migration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedSqlBatch {
    /// Empty for the main batch.
    pub name: String,
    /// Statements without a trailing semicolon.
    pub statements: Vec<String>,
}

impl NamedSqlBatch {
    pub fn new(name: impl Into<String>, statements: Vec<String>) -> Self {
        Self {
            name: name.into(),
            statements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// The statements as a script: each terminated by `;` and separated by a
    /// blank line.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        for statement in &self.statements {
            sql.push_str(statement);
            sql.push_str(";\n\n");
        }
        sql
    }
}

/// Statements and warnings produced by a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutput {
    pub batches: Vec<NamedSqlBatch>,
    pub warnings: Vec<String>,
}

impl DiffOutput {
    /// True when there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.batches.iter().all(NamedSqlBatch::is_empty)
    }

    /// Every statement in batch order.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.batches
            .iter()
            .flat_map(|b| b.statements.iter().map(String::as_str))
    }

    pub fn batch(&self, name: &str) -> Option<&NamedSqlBatch> {
        self.batches.iter().find(|b| b.name == name)
    }
}

/// Diffing and DDL rendering for one SQL dialect.
pub trait DialectEngine: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Whether `DEFERRABLE` foreign keys can be expressed.
    fn supports_deferrable(&self) -> bool {
        true
    }

    /// Whether identity columns can be expressed.
    fn supports_identity(&self) -> bool {
        false
    }

    /// Foreign keys can only be declared inside CREATE TABLE.
    fn inlines_foreign_keys(&self) -> bool {
        false
    }

    /// Why `diff` cannot be applied in place, if it cannot.
    fn rebuild_reason(&self, _diff: &TableDiff, _allow_drops: bool) -> Option<String> {
        None
    }

    fn quote(&self, name: &str) -> String {
        self.dialect().quote_identifier(name)
    }

    fn table_name(&self, schema: &str, name: &str) -> String {
        self.dialect().quote_qualified(schema, name)
    }

    fn qualified_table(&self, table: &Table) -> String {
        self.table_name(&table.table_schema, &table.table_name)
    }

    /// Quote column names. Parenthesized expressions pass through.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| {
                if c.starts_with('(') {
                    c.clone()
                } else {
                    self.quote(c)
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render a default expression for a column definition.
    fn default_expression(&self, expr: &str) -> String {
        expr.to_string()
    }

    fn column_definition(&self, table: &Table, column: &Column) -> String;

    fn references_clause(&self, constraint: &Constraint) -> String {
        let mut sql = format!(
            "REFERENCES {} ({})",
            self.table_name(&constraint.references_schema, &constraint.references_table),
            self.column_list(&constraint.references_columns)
        );
        if !constraint.update_rule.is_no_action() {
            sql.push_str(" ON UPDATE ");
            sql.push_str(constraint.update_rule.as_sql());
        }
        if !constraint.delete_rule.is_no_action() {
            sql.push_str(" ON DELETE ");
            sql.push_str(constraint.delete_rule.as_sql());
        }
        if constraint.is_deferrable && self.supports_deferrable() {
            sql.push_str(" DEFERRABLE");
            if constraint.is_initially_deferred {
                sql.push_str(" INITIALLY DEFERRED");
            }
        }
        sql
    }

    fn constraint_definition(&self, _table: &Table, constraint: &Constraint) -> String {
        let body = match constraint.constraint_type {
            ConstraintType::PrimaryKey | ConstraintType::Unique => format!(
                "{} ({})",
                constraint.constraint_type.as_sql(),
                self.column_list(&constraint.columns)
            ),
            ConstraintType::ForeignKey => format!(
                "FOREIGN KEY ({}) {}",
                self.column_list(&constraint.columns),
                self.references_clause(constraint)
            ),
        };
        format!("CONSTRAINT {} {body}", self.quote(&constraint.constraint_name))
    }

    /// CREATE TABLE with every constraint inline except those in `deferred`.
    fn create_table(&self, table: &Table, deferred: &[&Constraint]) -> String {
        let mut elements: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(table, c))
            .collect();
        for constraint in &table.constraints {
            if deferred.iter().any(|d| *d == constraint) {
                continue;
            }
            elements.push(self.constraint_definition(table, constraint));
        }
        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.qualified_table(table),
            elements.join(",\n    ")
        )
    }

    fn drop_table(&self, table: &Table) -> String {
        format!("DROP TABLE {}", self.qualified_table(table))
    }

    fn rename_table(&self, table: &Table, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.qualified_table(table),
            self.quote(new_name)
        )
    }

    fn create_schema(&self, name: &str) -> String {
        format!("CREATE SCHEMA {}", self.quote(name))
    }

    fn drop_schema(&self, name: &str) -> String {
        format!("DROP SCHEMA {}", self.quote(name))
    }

    fn add_column(&self, table: &Table, column: &Column) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.qualified_table(table),
            self.column_definition(table, column)
        )]
    }

    fn drop_column(&self, table: &Table, column: &Column) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.qualified_table(table),
            self.quote(&column.column_name)
        )]
    }

    /// Statements changing a column in place. Unsupported changes push a
    /// warning instead.
    fn alter_column(
        &self,
        table: &Table,
        change: &ColumnChange,
        warnings: &mut Vec<String>,
    ) -> Vec<String>;

    fn add_constraint(&self, table: &Table, constraint: &Constraint) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.qualified_table(table),
            self.constraint_definition(table, constraint)
        )
    }

    fn drop_constraint(&self, table: &Table, constraint: &Constraint) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.qualified_table(table),
            self.quote(&constraint.constraint_name)
        )
    }

    /// Column list, INCLUDE and WHERE parts of an index definition.
    fn index_body(&self, index: &Index) -> String {
        let columns: Vec<String> = index
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut part = if c.starts_with('(') { c.clone() } else { self.quote(c) };
                if let Some(opclass) = index.opclasses.get(i).filter(|o| !o.is_empty()) {
                    part.push(' ');
                    part.push_str(opclass);
                }
                if index.descending.get(i).copied().unwrap_or(false) {
                    part.push_str(" DESC");
                }
                part
            })
            .collect();
        let mut sql = format!("({})", columns.join(", "));
        if !index.include_columns.is_empty() {
            sql.push_str(&format!(" INCLUDE ({})", self.column_list(&index.include_columns)));
        }
        if !index.predicate.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&index.predicate);
        }
        sql
    }

    fn create_index(&self, table: &Table, index: &Index) -> String {
        if let Some(sql) = raw_index_sql(index) {
            return sql;
        }
        format!(
            "CREATE {}INDEX {} ON {} {}",
            if index.is_unique { "UNIQUE " } else { "" },
            self.quote(&index.index_name),
            self.qualified_table(table),
            self.index_body(index)
        )
    }

    fn drop_index(&self, table: &Table, index: &Index) -> String {
        format!("DROP INDEX {}", self.table_name(&table.table_schema, &index.index_name))
    }

    fn create_view(&self, view: &View) -> String {
        format!(
            "CREATE VIEW {} AS {}",
            self.table_name(&view.view_schema, &view.view_name),
            view.sql.trim().trim_end_matches(';').trim_end()
        )
    }

    fn drop_view(&self, view: &View) -> String {
        format!("DROP VIEW {}", self.table_name(&view.view_schema, &view.view_name))
    }

    /// Replace `source` with `target` through a shadow table: create it,
    /// copy the shared columns, drop the original, rename the shadow into
    /// place and recreate every index.
    fn rebuild_table(&self, source: &Table, target: &Table) -> Vec<String> {
        let mut shadow = target.clone();
        shadow.table_name = format!("{SHADOW_TABLE_PREFIX}{}", target.table_name);

        let shared: Vec<String> = target
            .columns
            .iter()
            .filter(|c| !c.is_generated)
            .filter(|c| {
                source
                    .column(self.dialect(), &c.column_name)
                    .is_some_and(|s| !s.is_generated)
            })
            .map(|c| c.column_name.clone())
            .collect();

        let mut statements = vec![self.create_table(&shadow, &[])];
        if !shared.is_empty() {
            let columns = self.column_list(&shared);
            statements.push(format!(
                "INSERT INTO {} ({columns}) SELECT {columns} FROM {}",
                self.qualified_table(&shadow),
                self.qualified_table(source)
            ));
        }
        statements.push(self.drop_table(source));
        statements.push(self.rename_table(&shadow, &target.table_name));
        for index in &target.indexes {
            statements.push(self.create_index(target, index));
        }
        statements
    }

    /// Warnings for a column this dialect cannot express fully.
    fn column_warnings(&self, table: &Table, column: &Column) -> Vec<String> {
        let mut warnings = Vec::new();
        if !column.identity.is_none() && !self.supports_identity() {
            warnings.push(format!(
                "identity on column {}.{} is not supported by {}; created without it",
                table.table_name,
                column.column_name,
                self.dialect()
            ));
        }
        warnings
    }

    /// Warnings for a constraint this dialect cannot express fully.
    fn constraint_warnings(&self, table: &Table, constraint: &Constraint) -> Vec<String> {
        let mut warnings = Vec::new();
        if constraint.is_deferrable && !self.supports_deferrable() {
            warnings.push(format!(
                "deferrable foreign key {} on {} is not supported by {}; created as not deferrable",
                constraint.constraint_name,
                table.table_name,
                self.dialect()
            ));
        }
        warnings
    }

    /// Compute the statements that turn `source` into `destination`.
    ///
    /// With `allow_drops` false, destructive statements are left out and a
    /// warning names each skipped object.
    fn diff(
        &self,
        source: &Catalog,
        destination: &Catalog,
        allow_drops: bool,
    ) -> MigrateResult<DiffOutput> {
        plan::plan(self, source, destination, allow_drops)
    }
}

/// The raw statement of a complex index, if it has one.
pub(crate) fn raw_index_sql(index: &Index) -> Option<String> {
    if index.is_simple() || index.sql.trim().is_empty() {
        return None;
    }
    Some(index.sql.trim().trim_end_matches(';').trim_end().to_string())
}

/// Whether `expr` is a literal a column default can hold without
/// parentheses in every dialect.
pub(crate) fn is_literal_default(expr: &str) -> bool {
    let expr = expr.trim();
    if expr.is_empty() {
        return false;
    }
    if expr.starts_with('\'') && expr.ends_with('\'') && expr.len() >= 2 {
        return true;
    }
    let upper = expr.to_ascii_uppercase();
    if matches!(
        upper.as_str(),
        "NULL" | "TRUE" | "FALSE" | "CURRENT_TIMESTAMP" | "CURRENT_DATE" | "CURRENT_TIME"
    ) {
        return true;
    }
    let digits = expr.strip_prefix(['-', '+']).unwrap_or(expr);
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
}

static SQLITE: SqliteEngine = SqliteEngine;
static POSTGRES: PostgresEngine = PostgresEngine;
static MYSQL: MysqlEngine = MysqlEngine;
static SQLSERVER: SqlserverEngine = SqlserverEngine;

/// The engine for `dialect`.
pub fn engine(dialect: Dialect) -> &'static dyn DialectEngine {
    match dialect {
        Dialect::Sqlite => &SQLITE,
        Dialect::Postgres => &POSTGRES,
        Dialect::Mysql => &MYSQL,
        Dialect::Sqlserver => &SQLSERVER,
    }
}

/// Look up an engine by dialect name or alias.
pub fn engine_for(name: &str) -> MigrateResult<&'static dyn DialectEngine> {
    let dialect: Dialect = name
        .parse()
        .map_err(|_| MigrationError::UnsupportedDialect(name.to_string()))?;
    Ok(engine(dialect))
}
