//! SQLite DDL rendering.
//!
//! SQLite cannot alter columns or constraints in place, so most table
//! changes go through the shadow-table rebuild.

use strata_catalog::{Column, Constraint, Dialect, Table, columns_equal};

use super::{DialectEngine, is_literal_default};
use crate::diff::{ColumnChange, TableDiff};

/// Engine for SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEngine;

impl SqliteEngine {
    /// `INTEGER PRIMARY KEY AUTOINCREMENT` has to be declared on the column.
    fn inline_primary_key<'a>(table: &'a Table) -> Option<&'a Constraint> {
        let pk = table.primary_key()?;
        let [column] = pk.columns.as_slice() else {
            return None;
        };
        table
            .column(Dialect::Sqlite, column)
            .filter(|c| c.is_autoincrement)
            .map(|_| pk)
    }

    /// Whether `ALTER TABLE ADD COLUMN` accepts this column.
    fn can_add_column(table: &Table, column: &Column) -> bool {
        if column.is_generated {
            return false;
        }
        let in_key = table.constraints.iter().any(|c| {
            !c.is_foreign_key()
                && c.columns
                    .iter()
                    .any(|name| Dialect::Sqlite.names_equal(name, &column.column_name))
        });
        if in_key {
            return false;
        }
        match column.column_default.as_deref() {
            Some(default) => {
                let upper = default.trim().to_ascii_uppercase();
                is_literal_default(default) && !upper.starts_with("CURRENT_")
            }
            None => !column.is_not_null,
        }
    }

    fn column_in_use(table: &Table, column: &Column) -> bool {
        let named = |name: &String| Dialect::Sqlite.names_equal(name, &column.column_name);
        table.constraints.iter().any(|c| c.columns.iter().any(named))
            || table.indexes.iter().any(|i| i.columns.iter().any(named))
    }
}

impl DialectEngine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn inlines_foreign_keys(&self) -> bool {
        true
    }

    fn rebuild_reason(&self, diff: &TableDiff, allow_drops: bool) -> Option<String> {
        let table = diff.table_name();
        if let Some(change) = diff.altered_columns.first() {
            return Some(format!("column {table}.{} changed", change.name()));
        }
        if !diff.added_constraints.is_empty() || !diff.changed_constraints.is_empty() {
            return Some(format!("constraints on {table} changed"));
        }
        if allow_drops && !diff.dropped_constraints.is_empty() {
            return Some(format!("constraints on {table} dropped"));
        }
        if let Some(column) = diff
            .added_columns
            .iter()
            .find(|c| !Self::can_add_column(&diff.destination, c))
        {
            return Some(format!("column {table}.{} cannot be added in place", column.column_name));
        }
        if allow_drops {
            if let Some(column) = diff
                .dropped_columns
                .iter()
                .find(|c| Self::column_in_use(&diff.source, c))
            {
                return Some(format!(
                    "column {table}.{} is part of a constraint or index",
                    column.column_name
                ));
            }
        }
        None
    }

    fn default_expression(&self, expr: &str) -> String {
        let trimmed = expr.trim();
        if is_literal_default(trimmed) || trimmed.starts_with('(') {
            trimmed.to_string()
        } else {
            format!("({trimmed})")
        }
    }

    fn column_definition(&self, table: &Table, column: &Column) -> String {
        let mut sql = self.quote(&column.column_name);
        let column_type = column.effective_type();
        if !column_type.is_empty() {
            sql.push(' ');
            sql.push_str(column_type);
        }
        let inline_pk = Self::inline_primary_key(table).is_some_and(|pk| {
            columns_equal(Dialect::Sqlite, &pk.columns, std::slice::from_ref(&column.column_name))
        });
        if inline_pk {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if column.is_not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.column_default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_expression(default));
        }
        if let Some(collation) = &column.collation_name {
            sql.push_str(" COLLATE ");
            sql.push_str(collation);
        }
        if column.is_generated {
            if let Some(expr) = &column.generated_expr {
                sql.push_str(&format!(" GENERATED ALWAYS AS ({expr}) STORED"));
            }
        }
        sql
    }

    fn create_table(&self, table: &Table, _deferred: &[&Constraint]) -> String {
        let inline_pk = Self::inline_primary_key(table);
        let mut elements: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(table, c))
            .collect();
        for constraint in &table.constraints {
            if inline_pk.is_some_and(|pk| pk == constraint) {
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

    fn alter_column(
        &self,
        table: &Table,
        change: &ColumnChange,
        warnings: &mut Vec<String>,
    ) -> Vec<String> {
        warnings.push(format!(
            "column {}.{} cannot be altered in place by sqlite",
            table.table_name,
            change.name()
        ));
        Vec::new()
    }
}
