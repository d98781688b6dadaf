//! Declarative schema source.
//!
//! A `.ddl` file describes tables one column per line, each column carrying
//! a logical kind and modifier text. Parsing produces a [`DeclarativeSchema`]
//! tree; [`DeclarativeSchema::build`] turns that tree into a [`Catalog`]
//! holding the same entities introspection would produce.

mod grammar;

use std::path::Path;

use pest::Parser;
use pest::iterators::Pair;
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{CatalogError, CatalogResult};
use crate::kind::{ColumnKind, parse_kind};
use crate::model::{
    Catalog, Column, Constraint, ConstraintType, Identity, Index, ReferentialAction, Table, View,
    columns_equal,
};
use crate::modifier::{Modifier, Modifiers, parse_modifiers};

pub use grammar::{DeclarativeParser, Rule};

/// A parsed declarative schema file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarativeSchema {
    pub tables: Vec<TableDecl>,
    pub views: Vec<ViewDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDecl {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDecl>,
    /// Modifiers from `_` lines, in order.
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDecl {
    pub name: String,
    pub kind: ColumnKind,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewDecl {
    pub schema: String,
    pub name: String,
    pub sql: String,
}

/// Parse declarative source text into a catalog for `dialect`.
pub fn parse_declarative(dialect: Dialect, input: &str) -> CatalogResult<Catalog> {
    parse_source(input)?.build(dialect)
}

/// Parse a declarative schema file into a catalog for `dialect`.
pub fn parse_declarative_file(dialect: Dialect, path: impl AsRef<Path>) -> CatalogResult<Catalog> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_declarative(dialect, &content)
}

/// Parse declarative source text into its syntax tree.
pub fn parse_source(input: &str) -> CatalogResult<DeclarativeSchema> {
    let mut pairs = DeclarativeParser::parse(Rule::schema_file, input).map_err(|e| {
        let (offset, len) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, 0),
            pest::error::InputLocation::Span((s, end)) => (s, end - s),
        };
        CatalogError::syntax(input, offset, len, e.variant.message().to_string())
    })?;

    let mut schema = DeclarativeSchema::default();
    let Some(file) = pairs.next() else {
        return Ok(schema);
    };
    for pair in file.into_inner() {
        match pair.as_rule() {
            Rule::table_def => schema.tables.push(parse_table(input, pair)?),
            Rule::view_def => schema.views.push(parse_view(pair)),
            _ => {}
        }
    }
    Ok(schema)
}

fn unquote_ident(text: &str) -> String {
    match text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => text.to_string(),
    }
}

fn parse_qualified_name(pair: Pair<'_, Rule>) -> (String, String) {
    let parts: Vec<String> = pair.into_inner().map(|p| unquote_ident(p.as_str())).collect();
    match parts.as_slice() {
        [schema, name] => (schema.clone(), name.clone()),
        [name] => (String::new(), name.clone()),
        _ => (String::new(), String::new()),
    }
}

/// Parse modifier text, shifting error offsets to the enclosing file.
fn parse_modifier_text(input: &str, pair: Pair<'_, Rule>) -> CatalogResult<Modifiers> {
    let base = pair.as_span().start();
    parse_modifiers(pair.as_str().trim_end()).map_err(|e| match e {
        CatalogError::ModifierSyntax { offset, message, .. } => {
            CatalogError::syntax(input, base + offset, 1, message)
        }
        other => other,
    })
}

fn parse_table(input: &str, pair: Pair<'_, Rule>) -> CatalogResult<TableDecl> {
    let mut table = TableDecl {
        schema: String::new(),
        name: String::new(),
        columns: Vec::new(),
        modifiers: Modifiers::new(),
    };
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::qualified_name => {
                let (schema, name) = parse_qualified_name(inner);
                table.schema = schema;
                table.name = name;
            }
            Rule::table_modifiers => {
                for part in inner.into_inner() {
                    if part.as_rule() == Rule::modifier_text {
                        table.modifiers.0.extend(parse_modifier_text(input, part)?);
                    }
                }
            }
            Rule::column_def => {
                let mut parts = inner.into_inner();
                let name = parts.next().map(|p| unquote_ident(p.as_str())).unwrap_or_default();
                let kind_text = parts.next().map(|p| p.as_str()).unwrap_or_default();
                let kind = parse_kind(&table.name, &name, kind_text)?;
                let modifiers = match parts.next() {
                    Some(text) if text.as_rule() == Rule::modifier_text => {
                        parse_modifier_text(input, text)?
                    }
                    _ => Modifiers::new(),
                };
                table.columns.push(ColumnDecl {
                    name,
                    kind,
                    modifiers,
                });
            }
            _ => {}
        }
    }
    Ok(table)
}

fn parse_view(pair: Pair<'_, Rule>) -> ViewDecl {
    let mut view = ViewDecl {
        schema: String::new(),
        name: String::new(),
        sql: String::new(),
    };
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::qualified_name => {
                let (schema, name) = parse_qualified_name(inner);
                view.schema = schema;
                view.name = name;
            }
            Rule::view_sql => {
                let body = inner.into_inner().next().map(|p| p.as_str()).unwrap_or_default();
                view.sql = body.replace("``", "`").trim().to_string();
            }
            _ => {}
        }
    }
    view
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A parsed `references` value.
struct Reference {
    schema: String,
    table: String,
    columns: Vec<String>,
}

/// `table`, `table.cols` or `schema.table.cols`. A bare table reuses the
/// referencing column names.
fn parse_reference(table: &str, own_columns: &[String], value: &str) -> CatalogResult<Reference> {
    let parts: Vec<&str> = value.split('.').collect();
    let reference = match parts.as_slice() {
        [t] => Reference {
            schema: String::new(),
            table: t.to_string(),
            columns: own_columns.to_vec(),
        },
        [t, cols] => Reference {
            schema: String::new(),
            table: t.to_string(),
            columns: split_list(cols),
        },
        [s, t, cols] => Reference {
            schema: s.to_string(),
            table: t.to_string(),
            columns: split_list(cols),
        },
        _ => {
            return Err(CatalogError::invalid_reference(
                table,
                value,
                "expected `table`, `table.columns` or `schema.table.columns`",
            ));
        }
    };
    if reference.table.is_empty() || reference.columns.is_empty() {
        return Err(CatalogError::invalid_reference(table, value, "empty table or column name"));
    }
    if reference.columns.len() != own_columns.len() {
        return Err(CatalogError::invalid_reference(
            table,
            value,
            format!(
                "{} referencing column(s) but {} referenced column(s)",
                own_columns.len(),
                reference.columns.len()
            ),
        ));
    }
    Ok(reference)
}

fn referential_action(table: &str, modifier: &Modifier) -> CatalogResult<ReferentialAction> {
    let value = modifier.value_str().unwrap_or_default();
    ReferentialAction::parse(value).ok_or_else(|| {
        CatalogError::invalid_table(table, format!("unknown {} action `{value}`", modifier.name))
    })
}

/// Build a foreign key from a `references` (column) or `foreignkey` (table)
/// modifier, plus the index its `index` submodifier asks for.
fn foreign_key(
    table: &str,
    columns: Vec<String>,
    reference: &str,
    submodifiers: &[Modifier],
) -> CatalogResult<(Constraint, Option<Index>)> {
    let target = parse_reference(table, &columns, reference)?;
    let mut constraint =
        Constraint::foreign_key(table, columns.clone(), target.schema, target.table, target.columns);
    let mut index = None;
    for sub in submodifiers {
        match sub.name.as_str() {
            "references" => {}
            "onupdate" => constraint.update_rule = referential_action(table, sub)?,
            "ondelete" => constraint.delete_rule = referential_action(table, sub)?,
            "deferrable" => constraint.is_deferrable = true,
            "deferred" => {
                constraint.is_deferrable = true;
                constraint.is_initially_deferred = true;
            }
            "index" => index = Some(index_from(table, columns.clone(), sub)),
            other => debug!(table, modifier = other, "ignoring unknown foreign key modifier"),
        }
    }
    Ok((constraint, index))
}

fn index_from(table: &str, columns: Vec<String>, modifier: &Modifier) -> Index {
    let mut index = Index::new(table, columns);
    for sub in &modifier.submodifiers {
        match sub.name.as_str() {
            "unique" => index.is_unique = true,
            "using" => index.index_type = sub.value_str().unwrap_or_default().to_ascii_uppercase(),
            other => debug!(table, modifier = other, "ignoring unknown index modifier"),
        }
    }
    index
}

impl DeclarativeSchema {
    /// Build the catalog these declarations describe.
    pub fn build(&self, dialect: Dialect) -> CatalogResult<Catalog> {
        let mut catalog = Catalog::new(dialect);
        for decl in &self.tables {
            let table = build_table(dialect, decl)?;
            let schema = catalog.schema_or_insert(&decl.schema);
            if schema
                .tables
                .iter()
                .any(|t| dialect.names_equal(&t.table_name, &table.table_name))
            {
                return Err(CatalogError::duplicate("table", qualified(&decl.schema, &decl.name)));
            }
            schema.tables.push(table);
        }
        for decl in &self.views {
            let schema = catalog.schema_or_insert(&decl.schema);
            if schema
                .views
                .iter()
                .any(|v| dialect.names_equal(&v.view_name, &decl.name))
            {
                return Err(CatalogError::duplicate("view", qualified(&decl.schema, &decl.name)));
            }
            schema.views.push(View {
                view_schema: decl.schema.clone(),
                view_name: decl.name.clone(),
                sql: decl.sql.clone(),
                ignore: false,
            });
        }
        Ok(catalog)
    }
}

fn qualified(schema: &str, name: &str) -> String {
    if schema.is_empty() {
        name.to_string()
    } else {
        format!("{schema}.{name}")
    }
}

fn build_table(dialect: Dialect, decl: &TableDecl) -> CatalogResult<Table> {
    let name = decl.name.as_str();
    let mut table = Table::new(decl.schema.clone(), name);
    let mut constraints: Vec<Constraint> = Vec::new();
    let mut indexes: Vec<Index> = Vec::new();

    for column_decl in &decl.columns {
        if table.column(dialect, &column_decl.name).is_some() {
            return Err(CatalogError::duplicate(
                "column",
                format!("{name}.{}", column_decl.name),
            ));
        }
        let column = build_column(dialect, name, column_decl, &mut constraints, &mut indexes)?;
        table.columns.push(column);
    }

    for modifier in &decl.modifiers {
        let columns = split_list(modifier.value_str().unwrap_or_default());
        match modifier.name.as_str() {
            "primarykey" => {
                constraints.push(Constraint::new(name, ConstraintType::PrimaryKey, columns))
            }
            "unique" => constraints.push(Constraint::new(name, ConstraintType::Unique, columns)),
            "foreignkey" => {
                let reference = modifier
                    .submodifier("references")
                    .and_then(Modifier::value_str)
                    .ok_or_else(|| {
                        CatalogError::invalid_table(name, "foreignkey is missing `references`")
                    })?;
                let (constraint, index) =
                    foreign_key(name, columns, reference, &modifier.submodifiers)?;
                constraints.push(constraint);
                indexes.extend(index);
            }
            "index" => indexes.push(index_from(name, columns, modifier)),
            "ignore" => table.ignore = true,
            other => debug!(table = name, modifier = other, "ignoring unknown table modifier"),
        }
    }

    validate_constraints(dialect, &table, &constraints, &indexes)?;

    let primary_key: Vec<String> = constraints
        .iter()
        .find(|c| c.is_primary_key())
        .map(|c| c.columns.clone())
        .unwrap_or_default();
    for column in &mut table.columns {
        if primary_key.iter().any(|pk| dialect.names_equal(pk, &column.column_name)) {
            column.is_not_null = true;
        }
    }

    table.constraints = constraints;
    table.indexes = indexes;
    Ok(table)
}

fn build_column(
    dialect: Dialect,
    table: &str,
    decl: &ColumnDecl,
    constraints: &mut Vec<Constraint>,
    indexes: &mut Vec<Index>,
) -> CatalogResult<Column> {
    let own = vec![decl.name.clone()];
    let mut column = Column::new(decl.name.clone(), "");
    column.is_enum = decl.kind == ColumnKind::Enum;
    let mut explicit_type = false;
    let mut is_primary_key = false;

    for modifier in &decl.modifiers {
        match modifier.name.as_str() {
            "type" => {
                column.column_type = modifier.value_str().unwrap_or_default().to_string();
                explicit_type = true;
            }
            "notnull" => column.is_not_null = true,
            "primarykey" => {
                is_primary_key = true;
                constraints.push(Constraint::new(table, ConstraintType::PrimaryKey, own.clone()));
            }
            "unique" => constraints.push(Constraint::new(table, ConstraintType::Unique, own.clone())),
            "references" => {
                let reference = modifier.value_str().ok_or_else(|| {
                    CatalogError::invalid_column(table, &decl.name, "references needs a target")
                })?;
                let (constraint, index) =
                    foreign_key(table, own.clone(), reference, &modifier.submodifiers)?;
                constraints.push(constraint);
                indexes.extend(index);
            }
            "autoincrement" | "auto_increment" => match dialect {
                Dialect::Postgres | Dialect::Sqlserver => column.identity = Identity::ByDefault,
                Dialect::Sqlite | Dialect::Mysql => column.is_autoincrement = true,
            },
            "identity" | "alwaysidentity" => match dialect {
                Dialect::Postgres if modifier.name == "alwaysidentity" => {
                    column.identity = Identity::Always
                }
                Dialect::Postgres | Dialect::Sqlserver => column.identity = Identity::ByDefault,
                Dialect::Mysql => column.is_autoincrement = true,
                // INTEGER PRIMARY KEY already aliases the rowid.
                Dialect::Sqlite => {}
            },
            "default" => column.column_default = modifier.value_str().map(str::to_string),
            "onupdatecurrenttimestamp" => column.on_update_current_timestamp = true,
            "collate" => column.collation_name = modifier.value_str().map(str::to_string),
            "index" => indexes.push(index_from(table, own.clone(), modifier)),
            "generated" => {
                column.is_generated = true;
                column.generated_expr = modifier.value_str().map(str::to_string);
            }
            "ignore" => column.ignore = true,
            other => debug!(table, column = %decl.name, modifier = other, "ignoring unknown column modifier"),
        }
    }

    if !explicit_type {
        column.column_type = if dialect == Dialect::Sqlite
            && is_primary_key
            && decl.kind == ColumnKind::Number
        {
            "INTEGER".to_string()
        } else {
            decl.kind.default_type(dialect).to_string()
        };
    }
    Ok(column)
}

fn validate_constraints(
    dialect: Dialect,
    table: &Table,
    constraints: &[Constraint],
    indexes: &[Index],
) -> CatalogResult<()> {
    let name = table.table_name.as_str();
    if constraints.iter().filter(|c| c.is_primary_key()).count() > 1 {
        return Err(CatalogError::invalid_table(name, "more than one primary key"));
    }
    for constraint in constraints {
        if constraint.columns.is_empty() {
            return Err(CatalogError::invalid_table(
                name,
                format!("{} without columns", constraint.constraint_type.as_sql()),
            ));
        }
        for column in &constraint.columns {
            if table.column(dialect, column).is_none() {
                return Err(CatalogError::invalid_table(
                    name,
                    format!(
                        "{} `{}` names unknown column `{column}`",
                        constraint.constraint_type.as_sql(),
                        constraint.constraint_name
                    ),
                ));
            }
        }
    }
    for (i, constraint) in constraints.iter().enumerate() {
        let duplicate = constraints[..i].iter().any(|other| {
            other.constraint_type == constraint.constraint_type
                && columns_equal(dialect, &other.columns, &constraint.columns)
        });
        if duplicate {
            return Err(CatalogError::duplicate("constraint", &constraint.constraint_name));
        }
    }
    for index in indexes {
        if index.columns.is_empty() {
            return Err(CatalogError::invalid_table(name, "index without columns"));
        }
        for column in index.columns.iter().filter(|c| !c.starts_with('(')) {
            if table.column(dialect, column).is_none() {
                return Err(CatalogError::invalid_table(
                    name,
                    format!("index `{}` names unknown column `{column}`", index.index_name),
                ));
            }
        }
    }
    Ok(())
}
