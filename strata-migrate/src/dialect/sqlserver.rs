//! SQL Server DDL rendering.

use strata_catalog::{Column, Constraint, Dialect, Identity, Index, ReferentialAction, Table};

use super::{DialectEngine, raw_index_sql};
use crate::diff::ColumnChange;

/// Engine for Microsoft SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlserverEngine;

/// Name of the default constraint SQL Server attaches to a column.
pub fn default_constraint_name(table: &str, column: &str) -> String {
    format!("DF_{table}_{column}")
}

impl SqlserverEngine {
    fn drop_default(&self, table: &Table, column: &Column) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.qualified_table(table),
            self.quote(&default_constraint_name(&table.table_name, &column.column_name))
        )
    }
}

impl DialectEngine for SqlserverEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlserver
    }

    fn supports_deferrable(&self) -> bool {
        false
    }

    fn supports_identity(&self) -> bool {
        true
    }

    fn column_definition(&self, table: &Table, column: &Column) -> String {
        let name = self.quote(&column.column_name);
        let mut sql = match (&column.generated_expr, column.is_generated) {
            (Some(expr), true) => format!("{name} AS ({expr}) PERSISTED"),
            _ => format!("{name} {}", column.effective_type()),
        };
        if let Some(collation) = &column.collation_name {
            sql.push_str(" COLLATE ");
            sql.push_str(collation);
        }
        if !column.identity.is_none() {
            sql.push_str(" IDENTITY");
        }
        if column.is_not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.column_default {
            sql.push_str(&format!(
                " CONSTRAINT {} DEFAULT {}",
                self.quote(&default_constraint_name(&table.table_name, &column.column_name)),
                self.default_expression(default)
            ));
        }
        sql
    }

    fn add_column(&self, table: &Table, column: &Column) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ADD {}",
            self.qualified_table(table),
            self.column_definition(table, column)
        )]
    }

    fn drop_column(&self, table: &Table, column: &Column) -> Vec<String> {
        let mut statements = Vec::new();
        if column.column_default.is_some() {
            statements.push(self.drop_default(table, column));
        }
        statements.push(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.qualified_table(table),
            self.quote(&column.column_name)
        ));
        statements
    }

    fn alter_column(
        &self,
        table: &Table,
        change: &ColumnChange,
        warnings: &mut Vec<String>,
    ) -> Vec<String> {
        let column = &change.destination;
        let mut statements = Vec::new();

        if change.identity_changed {
            warnings.push(format!(
                "changing identity on column {}.{} is not supported by sqlserver; recreate the column manually",
                table.table_name, column.column_name
            ));
        }
        if change.type_changed || change.null_changed || change.collation_changed {
            let mut sql = format!(
                "ALTER TABLE {} ALTER COLUMN {} {}",
                self.qualified_table(table),
                self.quote(&column.column_name),
                column.effective_type()
            );
            if let Some(collation) = &column.collation_name {
                sql.push_str(" COLLATE ");
                sql.push_str(collation);
            }
            sql.push_str(if column.is_not_null { " NOT NULL" } else { " NULL" });
            statements.push(sql);
        }
        if change.default_changed {
            if change.source.column_default.is_some() {
                statements.push(self.drop_default(table, &change.source));
            }
            if let Some(default) = &column.column_default {
                statements.push(format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} DEFAULT {} FOR {}",
                    self.qualified_table(table),
                    self.quote(&default_constraint_name(&table.table_name, &column.column_name)),
                    self.default_expression(default),
                    self.quote(&column.column_name)
                ));
            }
        }
        statements
    }

    fn create_index(&self, table: &Table, index: &Index) -> String {
        if let Some(sql) = raw_index_sql(index) {
            return sql;
        }
        let kind = index.index_type.trim().to_ascii_uppercase();
        let kind = match kind.as_str() {
            "CLUSTERED" | "NONCLUSTERED" => format!("{kind} "),
            _ => String::new(),
        };
        format!(
            "CREATE {}{kind}INDEX {} ON {} {}",
            if index.is_unique { "UNIQUE " } else { "" },
            self.quote(&index.index_name),
            self.qualified_table(table),
            self.index_body(index)
        )
    }

    fn drop_index(&self, table: &Table, index: &Index) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote(&index.index_name),
            self.qualified_table(table)
        )
    }

    fn rename_table(&self, table: &Table, new_name: &str) -> String {
        format!(
            "EXEC sp_rename {}, {}",
            self.dialect().quote_string(&self.qualified_table(table)),
            self.dialect().quote_string(new_name)
        )
    }

    fn column_warnings(&self, table: &Table, column: &Column) -> Vec<String> {
        let mut warnings = Vec::new();
        if column.identity == Identity::Always {
            warnings.push(format!(
                "column {}.{} uses GENERATED ALWAYS identity; sqlserver creates a plain IDENTITY",
                table.table_name, column.column_name
            ));
        }
        warnings
    }

    fn constraint_warnings(&self, table: &Table, constraint: &Constraint) -> Vec<String> {
        let mut warnings = Vec::new();
        if constraint.is_deferrable {
            warnings.push(format!(
                "deferrable foreign key {} on {} is not supported by sqlserver; created as not deferrable",
                constraint.constraint_name, table.table_name
            ));
        }
        for rule in [constraint.update_rule, constraint.delete_rule] {
            if rule == ReferentialAction::Restrict {
                warnings.push(format!(
                    "foreign key {} on {} uses RESTRICT, which sqlserver spells NO ACTION",
                    constraint.constraint_name, table.table_name
                ));
            }
        }
        warnings
    }

    fn references_clause(&self, constraint: &Constraint) -> String {
        let mut sql = format!(
            "REFERENCES {} ({})",
            self.table_name(&constraint.references_schema, &constraint.references_table),
            self.column_list(&constraint.references_columns)
        );
        for (keyword, rule) in [("UPDATE", constraint.update_rule), ("DELETE", constraint.delete_rule)] {
            if !matches!(rule, ReferentialAction::NoAction | ReferentialAction::Restrict) {
                sql.push_str(&format!(" ON {keyword} {}", rule.as_sql()));
            }
        }
        sql
    }
}
