//! MySQL DDL rendering.

use strata_catalog::{Column, Constraint, ConstraintType, Dialect, Index, Table};

use super::{DialectEngine, is_literal_default, raw_index_sql};
use crate::diff::ColumnChange;

/// Engine for MySQL and MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlEngine;

impl DialectEngine for MysqlEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn supports_deferrable(&self) -> bool {
        false
    }

    /// Expression defaults must be parenthesized; literals and
    /// `CURRENT_TIMESTAMP` stay bare.
    fn default_expression(&self, expr: &str) -> String {
        let trimmed = expr.trim();
        let upper = trimmed.to_ascii_uppercase();
        if is_literal_default(trimmed)
            || trimmed.starts_with('(')
            || upper.starts_with("CURRENT_TIMESTAMP")
            || upper == "NOW()"
        {
            trimmed.to_string()
        } else {
            format!("({trimmed})")
        }
    }

    fn column_definition(&self, _table: &Table, column: &Column) -> String {
        let mut sql = format!("{} {}", self.quote(&column.column_name), column.effective_type());
        if let Some(collation) = &column.collation_name {
            sql.push_str(" COLLATE ");
            sql.push_str(collation);
        }
        if column.is_generated {
            if let Some(expr) = &column.generated_expr {
                sql.push_str(&format!(" GENERATED ALWAYS AS ({expr}) STORED"));
            }
        }
        if column.is_not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.column_default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_expression(default));
        }
        if column.is_autoincrement {
            sql.push_str(" AUTO_INCREMENT");
        }
        if column.on_update_current_timestamp {
            sql.push_str(" ON UPDATE CURRENT_TIMESTAMP");
        }
        sql
    }

    fn alter_column(
        &self,
        table: &Table,
        change: &ColumnChange,
        _warnings: &mut Vec<String>,
    ) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            self.qualified_table(table),
            self.column_definition(table, &change.destination)
        )]
    }

    fn drop_constraint(&self, table: &Table, constraint: &Constraint) -> String {
        let action = match constraint.constraint_type {
            ConstraintType::PrimaryKey => "DROP PRIMARY KEY".to_string(),
            ConstraintType::Unique => format!("DROP INDEX {}", self.quote(&constraint.constraint_name)),
            ConstraintType::ForeignKey => {
                format!("DROP FOREIGN KEY {}", self.quote(&constraint.constraint_name))
            }
        };
        format!("ALTER TABLE {} {action}", self.qualified_table(table))
    }

    fn create_index(&self, table: &Table, index: &Index) -> String {
        if let Some(sql) = raw_index_sql(index) {
            return sql;
        }
        let method = index.index_type.trim().to_ascii_uppercase();
        let using = if method.is_empty() {
            String::new()
        } else {
            format!(" USING {method}")
        };
        format!(
            "CREATE {}INDEX {} ON {} {}{using}",
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
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn film() -> Table {
        let mut table = Table::new("", "film");
        let mut id = Column::new("film_id", "INT");
        id.is_autoincrement = true;
        id.is_not_null = true;
        table.columns.push(id);
        let mut updated = Column::new("last_update", "TIMESTAMP");
        updated.is_not_null = true;
        updated.column_default = Some("CURRENT_TIMESTAMP".into());
        updated.on_update_current_timestamp = true;
        table.columns.push(updated);
        let mut code = Column::new("code", "VARCHAR(255)");
        code.column_default = Some("uuid()".into());
        table.columns.push(code);
        table
    }

    #[test]
    fn test_column_definitions() {
        let table = film();
        let defs: Vec<String> = table
            .columns
            .iter()
            .map(|c| MysqlEngine.column_definition(&table, c))
            .collect();
        assert_eq!(
            defs,
            vec![
                "film_id INT NOT NULL AUTO_INCREMENT",
                "last_update TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP",
                "code VARCHAR(255) DEFAULT (uuid())",
            ]
        );
    }

    #[test]
    fn test_drop_constraints() {
        let table = film();
        let pk = Constraint::new("film", ConstraintType::PrimaryKey, vec!["film_id".into()]);
        let unique = Constraint::new("film", ConstraintType::Unique, vec!["code".into()]);
        assert_eq!(MysqlEngine.drop_constraint(&table, &pk), "ALTER TABLE film DROP PRIMARY KEY");
        assert_eq!(
            MysqlEngine.drop_constraint(&table, &unique),
            "ALTER TABLE film DROP INDEX film_code_key"
        );
    }

    #[test]
    fn test_deferrable_warns() {
        let mut fk = Constraint::foreign_key("film", vec!["a".into()], "", "b", vec!["id".into()]);
        fk.is_deferrable = true;
        assert_eq!(MysqlEngine.constraint_warnings(&film(), &fk).len(), 1);
        assert!(!MysqlEngine.add_constraint(&film(), &fk).contains("DEFERRABLE"));
    }
}
