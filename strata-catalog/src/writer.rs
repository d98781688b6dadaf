//! Render a catalog as declarative schema source.

use std::collections::HashSet;
use std::fmt::Write;

use crate::dialect::{Dialect, needs_quoting};
use crate::kind::{resolve_column_kind, types_equal};
use crate::model::{Catalog, Column, Constraint, ConstraintType, Identity, Index, Table};
use crate::modifier::{Modifier, Modifiers};

/// Render every table and view in `catalog`.
///
/// Column modifiers are emitted in a fixed order: `type`, `notnull`,
/// `primarykey`, `unique`, `references`, `autoincrement`/`identity`,
/// `default`, `onupdatecurrenttimestamp`, `collate`, `index`, `generated`.
/// Multi-column constraints and indexes go on `_` lines. Complex indexes
/// have no declarative form and are left out.
pub fn write_declarative(catalog: &Catalog) -> String {
    let mut out = String::new();
    for schema in catalog.schemas.iter().filter(|s| !s.ignore) {
        for table in schema.tables.iter().filter(|t| !t.ignore) {
            if !out.is_empty() {
                out.push('\n');
            }
            write_table(&mut out, catalog, table);
        }
    }
    for schema in catalog.schemas.iter().filter(|s| !s.ignore) {
        for view in schema.views.iter().filter(|v| !v.ignore) {
            if !out.is_empty() {
                out.push('\n');
            }
            let name = qualified_name(catalog, &view.view_schema, &view.view_name);
            let _ = writeln!(out, "view {name} `{}`", view.sql.replace('`', "``"));
        }
    }
    out
}

fn ident(name: &str) -> String {
    if needs_quoting(name) {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

fn qualified_name(catalog: &Catalog, schema: &str, name: &str) -> String {
    if catalog.is_current_schema(schema) {
        ident(name)
    } else {
        format!("{}.{}", ident(schema), ident(name))
    }
}

/// A declaration line before alignment.
struct Line {
    name: String,
    kind: String,
    modifiers: Modifiers,
}

fn write_table(out: &mut String, catalog: &Catalog, table: &Table) {
    let dialect = catalog.dialect;
    let constraints: Vec<&Constraint> = table.constraints.iter().filter(|c| !c.ignore).collect();
    let indexes: Vec<&Index> = table
        .indexes
        .iter()
        .filter(|i| !i.ignore && i.is_simple())
        .collect();

    // Constraints and indexes already attached to a column line.
    let mut used_constraints: HashSet<usize> = HashSet::new();
    let mut used_indexes: HashSet<usize> = HashSet::new();

    let single = |columns: &[String], column: &str| {
        columns.len() == 1 && dialect.names_equal(&columns[0], column)
    };

    let mut lines = Vec::new();
    for column in table.columns.iter().filter(|c| !c.ignore) {
        let name = column.column_name.as_str();
        let find_constraint = |kind: ConstraintType| {
            constraints
                .iter()
                .position(|c| c.constraint_type == kind && single(&c.columns, name))
        };
        let pk = find_constraint(ConstraintType::PrimaryKey);
        let unique = find_constraint(ConstraintType::Unique);
        let fk = find_constraint(ConstraintType::ForeignKey);
        let fk_index = fk.and_then(|_| indexes.iter().position(|i| single(&i.columns, name)));
        let index = indexes.iter().position(|i| single(&i.columns, name));

        let kind = resolve_column_kind(dialect, &column.column_type, column.is_enum);
        let is_rowid = dialect == Dialect::Sqlite
            && pk.is_some()
            && column.column_type.eq_ignore_ascii_case("INTEGER");

        let mut modifiers = Modifiers::new();
        if let Some(domain) = &column.domain_name {
            modifiers.push(Modifier::raw("type", domain));
        } else if !column.column_type.is_empty()
            && !is_rowid
            && !types_equal(dialect, &column.column_type, kind.default_type(dialect))
        {
            modifiers.push(Modifier::raw("type", &column.column_type));
        }
        if column.is_not_null && pk.is_none() {
            modifiers.push(Modifier::flag("notnull"));
        }
        if let Some(i) = pk {
            used_constraints.insert(i);
            modifiers.push(Modifier::flag("primarykey"));
        }
        if let Some(i) = unique {
            used_constraints.insert(i);
            modifiers.push(Modifier::flag("unique"));
        }
        if let Some(i) = fk {
            used_constraints.insert(i);
            let mut references = foreign_key_modifier(catalog, constraints[i], "references");
            references.value = references
                .submodifiers
                .first()
                .and_then(|m| m.value.clone());
            references.submodifiers.remove(0);
            if let Some(j) = fk_index {
                used_indexes.insert(j);
                let mut sub = index_modifier(indexes[j]);
                sub.value = None;
                references.submodifiers.push(sub);
            }
            modifiers.push(references);
        }
        push_identity_modifiers(&mut modifiers, dialect, column);
        if let Some(default) = &column.column_default {
            if !default.contains('`') {
                modifiers.push(Modifier::raw("default", unwrap_parens(default)));
            }
        }
        if column.on_update_current_timestamp {
            modifiers.push(Modifier::flag("onupdatecurrenttimestamp"));
        }
        if let Some(collation) = &column.collation_name {
            if collation != &catalog.default_collation {
                modifiers.push(Modifier::raw("collate", collation));
            }
        }
        if let Some(j) = index.filter(|j| !used_indexes.contains(j)) {
            used_indexes.insert(j);
            let mut sub = index_modifier(indexes[j]);
            sub.value = None;
            modifiers.push(sub);
        }
        if column.is_generated || column.generated_expr.is_some() {
            match &column.generated_expr {
                Some(expr) => modifiers.push(Modifier::raw("generated", expr)),
                None => modifiers.push(Modifier::flag("generated")),
            }
        }

        lines.push(Line {
            name: ident(name),
            kind: kind.as_str().to_string(),
            modifiers,
        });
    }

    for (i, constraint) in constraints.iter().enumerate() {
        if used_constraints.contains(&i) {
            continue;
        }
        let value = constraint.columns.join(",");
        let modifier = match constraint.constraint_type {
            ConstraintType::PrimaryKey => Modifier::with_value("primarykey", value),
            ConstraintType::Unique => Modifier::with_value("unique", value),
            ConstraintType::ForeignKey => {
                let mut fk = foreign_key_modifier(catalog, constraint, "foreignkey");
                fk.value = Some(crate::modifier::ModifierValue::new(value));
                if let Some(j) = indexes.iter().position(|idx| {
                    crate::model::columns_equal(dialect, &idx.columns, &constraint.columns)
                }) {
                    if used_indexes.insert(j) {
                        let mut sub = index_modifier(indexes[j]);
                        sub.value = None;
                        fk.submodifiers.push(sub);
                    }
                }
                fk
            }
        };
        lines.push(Line {
            name: "_".to_string(),
            kind: String::new(),
            modifiers: Modifiers::from(vec![modifier]),
        });
    }
    for (j, index) in indexes.iter().enumerate() {
        if used_indexes.contains(&j) {
            continue;
        }
        lines.push(Line {
            name: "_".to_string(),
            kind: String::new(),
            modifiers: Modifiers::from(vec![index_modifier(index)]),
        });
    }

    let name_width = lines.iter().map(|l| l.name.len()).max().unwrap_or(0);
    let kind_width = lines.iter().map(|l| l.kind.len()).max().unwrap_or(0);
    let _ = writeln!(
        out,
        "table {} {{",
        qualified_name(catalog, &table.table_schema, &table.table_name)
    );
    for line in lines {
        let mut text = if line.modifiers.is_empty() {
            format!("    {:<name_width$}  {}", line.name, line.kind)
        } else {
            format!(
                "    {:<name_width$}  {:<kind_width$}  {}",
                line.name, line.kind, line.modifiers
            )
        };
        text.truncate(text.trim_end().len());
        out.push_str(&text);
        out.push('\n');
    }
    out.push_str("}\n");
}

fn push_identity_modifiers(modifiers: &mut Modifiers, dialect: Dialect, column: &Column) {
    if column.is_autoincrement {
        match dialect {
            Dialect::Sqlite => modifiers.push(Modifier::flag("autoincrement")),
            Dialect::Mysql => modifiers.push(Modifier::flag("auto_increment")),
            _ => {}
        }
    }
    match (dialect, column.identity) {
        (Dialect::Postgres | Dialect::Sqlserver, Identity::ByDefault) => {
            modifiers.push(Modifier::flag("identity"))
        }
        (Dialect::Postgres, Identity::Always) => modifiers.push(Modifier::flag("alwaysidentity")),
        _ => {}
    }
}

/// A foreign key modifier whose first submodifier is `references`.
fn foreign_key_modifier(catalog: &Catalog, constraint: &Constraint, name: &str) -> Modifier {
    let mut target = String::new();
    let qualify = !catalog.is_current_schema(&constraint.references_schema);
    if qualify {
        target.push_str(&constraint.references_schema);
        target.push('.');
    }
    target.push_str(&constraint.references_table);
    let same_columns = crate::model::columns_equal(
        catalog.dialect,
        &constraint.columns,
        &constraint.references_columns,
    );
    // A schema qualifier forces the three-part form.
    if qualify || !same_columns {
        target.push('.');
        target.push_str(&constraint.references_columns.join(","));
    }

    let mut modifier = Modifier::flag(name).push(Modifier::with_value("references", target));
    if !constraint.update_rule.is_no_action() {
        modifier = modifier.push(Modifier::with_value(
            "onupdate",
            constraint.update_rule.as_modifier(),
        ));
    }
    if !constraint.delete_rule.is_no_action() {
        modifier = modifier.push(Modifier::with_value(
            "ondelete",
            constraint.delete_rule.as_modifier(),
        ));
    }
    if constraint.is_deferrable {
        modifier = modifier.push(Modifier::flag(if constraint.is_initially_deferred {
            "deferred"
        } else {
            "deferrable"
        }));
    }
    modifier
}

fn index_modifier(index: &Index) -> Modifier {
    let mut modifier = Modifier::with_value("index", index.columns.join(","));
    if index.is_unique {
        modifier = modifier.push(Modifier::flag("unique"));
    }
    if !index.index_type.is_empty() && !index.index_type.eq_ignore_ascii_case("BTREE") {
        modifier = modifier.push(Modifier::with_value("using", index.index_type.to_ascii_lowercase()));
    }
    modifier
}

/// Strip redundant outer parentheses from a default expression, as SQL
/// Server reports `((0))` for `0`.
fn unwrap_parens(expr: &str) -> &str {
    let mut expr = expr.trim();
    while expr.starts_with('(') && expr.ends_with(')') && balanced(&expr[1..expr.len() - 1]) {
        expr = expr[1..expr.len() - 1].trim();
    }
    expr
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for ch in s.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_declarative;
    use pretty_assertions::assert_eq;

    const SRC: &str = r#"table category {
    category_id  number  primarykey identity
    category     string  unique
}

table bar.movie {
    movie_id     number  primarykey identity
    title        string  type=`VARCHAR(100)` notnull
    category     string  references={category.category ondelete=cascade index}
    subcategory  string  references=category.category index={. unique}
    metadata     json
    created_at   time    default=`now()`
    _            unique=title,category
}
"#;

    #[test]
    fn test_write_is_reparsed_to_the_same_catalog() {
        let catalog = parse_declarative(Dialect::Postgres, SRC).unwrap();
        let written = write_declarative(&catalog);
        let reparsed = parse_declarative(Dialect::Postgres, &written).unwrap();
        assert_eq!(reparsed, catalog, "written source:\n{written}");
    }

    #[test]
    fn test_write_output() {
        let catalog = parse_declarative(Dialect::Postgres, SRC).unwrap();
        insta::assert_snapshot!(write_declarative(&catalog).trim_end(), @r###"
        table category {
            category_id  number  primarykey identity
            category     string  unique
        }

        table bar.movie {
            movie_id     number  primarykey identity
            title        string  type=`VARCHAR(100)` notnull
            category     string  references={category ondelete=cascade index}
            subcategory  string  references={category.category index={. unique}}
            metadata     json
            created_at   time    default=`now()`
            _                    unique=title,category
        }
        "###);
    }

    #[test]
    fn test_unwrap_parens() {
        assert_eq!(unwrap_parens("((0))"), "0");
        assert_eq!(unwrap_parens("(a) + (b)"), "(a) + (b)");
    }
}
