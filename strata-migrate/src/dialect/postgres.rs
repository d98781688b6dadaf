//! PostgreSQL DDL rendering.

use strata_catalog::{Column, Dialect, Identity, Index, Table};

use super::{DialectEngine, raw_index_sql};
use crate::diff::ColumnChange;

/// Engine for PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresEngine;

impl PostgresEngine {
    fn identity_clause(identity: Identity) -> Option<&'static str> {
        match identity {
            Identity::None => None,
            Identity::ByDefault => Some("BY DEFAULT"),
            Identity::Always => Some("ALWAYS"),
        }
    }

    fn alter(&self, table: &Table, column: &str, action: String) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {action}",
            self.qualified_table(table),
            self.quote(column)
        )
    }
}

impl DialectEngine for PostgresEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn supports_identity(&self) -> bool {
        true
    }

    fn column_definition(&self, _table: &Table, column: &Column) -> String {
        let mut sql = format!("{} {}", self.quote(&column.column_name), column.effective_type());
        if let Some(collation) = &column.collation_name {
            sql.push_str(&format!(" COLLATE {}", quote_collation(collation)));
        }
        if let Some(clause) = Self::identity_clause(column.identity) {
            sql.push_str(&format!(" GENERATED {clause} AS IDENTITY"));
        }
        if column.is_not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.column_default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_expression(default));
        }
        if column.is_generated {
            if let Some(expr) = &column.generated_expr {
                sql.push_str(&format!(" GENERATED ALWAYS AS ({expr}) STORED"));
            }
        }
        sql
    }

    fn alter_column(
        &self,
        table: &Table,
        change: &ColumnChange,
        _warnings: &mut Vec<String>,
    ) -> Vec<String> {
        let column = &change.destination;
        let name = column.column_name.as_str();
        let mut statements = Vec::new();

        if change.type_changed || change.collation_changed {
            let mut action = format!("TYPE {}", column.effective_type());
            if let Some(collation) = &column.collation_name {
                action.push_str(&format!(" COLLATE {}", quote_collation(collation)));
            }
            statements.push(self.alter(table, name, action));
        }
        if change.null_changed {
            let action = if column.is_not_null { "SET NOT NULL" } else { "DROP NOT NULL" };
            statements.push(self.alter(table, name, action.to_string()));
        }
        if change.default_changed {
            let action = match &column.column_default {
                Some(default) => format!("SET DEFAULT {}", self.default_expression(default)),
                None => "DROP DEFAULT".to_string(),
            };
            statements.push(self.alter(table, name, action));
        }
        if change.identity_changed {
            let action = match (
                Self::identity_clause(change.source.identity),
                Self::identity_clause(column.identity),
            ) {
                (None, Some(clause)) => format!("ADD GENERATED {clause} AS IDENTITY"),
                (Some(_), None) => "DROP IDENTITY IF EXISTS".to_string(),
                (Some(_), Some(clause)) => format!("SET GENERATED {clause}"),
                (None, None) => String::new(),
            };
            if !action.is_empty() {
                statements.push(self.alter(table, name, action));
            }
        }
        statements
    }

    fn create_index(&self, table: &Table, index: &Index) -> String {
        if let Some(sql) = raw_index_sql(index) {
            return sql;
        }
        let method = index.index_type.trim().to_ascii_uppercase();
        let using = if method.is_empty() || method == "BTREE" {
            String::new()
        } else {
            format!("USING {method} ")
        };
        format!(
            "CREATE {}INDEX {} ON {} {using}{}",
            if index.is_unique { "UNIQUE " } else { "" },
            self.quote(&index.index_name),
            self.qualified_table(table),
            self.index_body(index)
        )
    }
}

fn quote_collation(collation: &str) -> String {
    format!("\"{}\"", collation.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use strata_catalog::{Constraint, ConstraintType, ReferentialAction};

    use super::*;

    fn film() -> Table {
        let mut table = Table::new("", "film");
        let mut id = Column::new("film_id", "INT");
        id.identity = Identity::ByDefault;
        id.is_not_null = true;
        table.columns.push(id);
        let mut title = Column::new("title", "TEXT");
        title.column_default = Some("'untitled'".into());
        table.columns.push(title);
        table.constraints.push(Constraint::new(
            "film",
            ConstraintType::PrimaryKey,
            vec!["film_id".into()],
        ));
        table
    }

    #[test]
    fn test_create_table() {
        insta::assert_snapshot!(PostgresEngine.create_table(&film(), &[]), @r"
        CREATE TABLE film (
            film_id INT GENERATED BY DEFAULT AS IDENTITY NOT NULL,
            title TEXT DEFAULT 'untitled',
            CONSTRAINT film_pkey PRIMARY KEY (film_id)
        )
        ");
    }

    #[test]
    fn test_foreign_key_clause() {
        let mut fk = Constraint::foreign_key(
            "film",
            vec!["language_id".into()],
            "",
            "language",
            vec!["language_id".into()],
        );
        fk.delete_rule = ReferentialAction::Cascade;
        fk.is_deferrable = true;
        fk.is_initially_deferred = true;
        assert_eq!(
            PostgresEngine.add_constraint(&film(), &fk),
            "ALTER TABLE film ADD CONSTRAINT film_language_id_fkey FOREIGN KEY (language_id) \
             REFERENCES language (language_id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED"
        );
    }

    #[test]
    fn test_alter_column() {
        let table = film();
        let source = table.columns[1].clone();
        let mut destination = source.clone();
        destination.column_type = "VARCHAR(100)".into();
        destination.is_not_null = true;
        destination.column_default = None;
        let change = ColumnChange {
            source,
            destination,
            type_changed: true,
            null_changed: true,
            default_changed: true,
            collation_changed: false,
            identity_changed: false,
            autoincrement_changed: false,
            generated_changed: false,
            on_update_changed: false,
        };
        let statements = PostgresEngine.alter_column(&table, &change, &mut Vec::new());
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE film ALTER COLUMN title TYPE VARCHAR(100)",
                "ALTER TABLE film ALTER COLUMN title SET NOT NULL",
                "ALTER TABLE film ALTER COLUMN title DROP DEFAULT",
            ]
        );
    }

    #[test]
    fn test_index_with_access_method() {
        let mut index = Index::new("film", vec!["title".into()]);
        index.index_type = "GIN".into();
        assert_eq!(
            PostgresEngine.create_index(&film(), &index),
            "CREATE INDEX film_title_idx ON film USING GIN (title)"
        );
        assert_eq!(PostgresEngine.drop_index(&film(), &index), "DROP INDEX film_title_idx");
    }
}
