//! Structural comparison of two catalogs.
//!
//! The differ normalizes both catalogs (current-schema aliases folded to the
//! unqualified schema, ignored objects removed from both sides) and reports
//! what was created, dropped or changed at every level. It renders nothing:
//! ordering and SQL belong to the planner and the dialect engines.

use std::collections::HashSet;

use strata_catalog::{
    Catalog, Column, Constraint, ConstraintType, Dialect, Index, Schema, Table, View,
    columns_equal, types_equal,
};

use crate::error::{MigrateResult, MigrationError};

/// An object present on both sides with different definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Changed<T> {
    pub source: T,
    pub destination: T,
}

/// A column present on both sides whose definition differs.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    pub source: Column,
    pub destination: Column,
    pub type_changed: bool,
    pub null_changed: bool,
    pub default_changed: bool,
    pub collation_changed: bool,
    pub identity_changed: bool,
    pub autoincrement_changed: bool,
    pub generated_changed: bool,
    pub on_update_changed: bool,
}

impl ColumnChange {
    pub fn name(&self) -> &str {
        &self.destination.column_name
    }

    /// Whether anything other than the generated expression changed.
    pub fn has_plain_changes(&self) -> bool {
        self.type_changed
            || self.null_changed
            || self.default_changed
            || self.collation_changed
            || self.identity_changed
            || self.autoincrement_changed
            || self.on_update_changed
    }
}

/// Differences within one table present on both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    pub source: Table,
    pub destination: Table,
    pub added_columns: Vec<Column>,
    pub dropped_columns: Vec<Column>,
    pub altered_columns: Vec<ColumnChange>,
    pub added_constraints: Vec<Constraint>,
    pub dropped_constraints: Vec<Constraint>,
    /// Constraints over the same columns whose definition changed, and
    /// primary keys that moved to other columns.
    pub changed_constraints: Vec<Changed<Constraint>>,
    pub added_indexes: Vec<Index>,
    pub dropped_indexes: Vec<Index>,
    pub changed_indexes: Vec<Changed<Index>>,
}

impl TableDiff {
    fn new(source: &Table, destination: &Table) -> Self {
        Self {
            source: source.clone(),
            destination: destination.clone(),
            added_columns: Vec::new(),
            dropped_columns: Vec::new(),
            altered_columns: Vec::new(),
            added_constraints: Vec::new(),
            dropped_constraints: Vec::new(),
            changed_constraints: Vec::new(),
            added_indexes: Vec::new(),
            dropped_indexes: Vec::new(),
            changed_indexes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.dropped_columns.is_empty()
            && self.altered_columns.is_empty()
            && self.added_constraints.is_empty()
            && self.dropped_constraints.is_empty()
            && self.changed_constraints.is_empty()
            && self.added_indexes.is_empty()
            && self.dropped_indexes.is_empty()
            && self.changed_indexes.is_empty()
    }

    pub fn table_schema(&self) -> &str {
        &self.destination.table_schema
    }

    pub fn table_name(&self) -> &str {
        &self.destination.table_name
    }
}

/// The full difference between a source and a destination catalog.
#[derive(Debug, Clone)]
pub struct CatalogDiff {
    pub dialect: Dialect,
    /// The normalized source catalog.
    pub source: Catalog,
    /// The normalized destination catalog.
    pub destination: Catalog,
    pub created_schemas: Vec<String>,
    pub dropped_schemas: Vec<String>,
    /// New tables in destination declaration order.
    pub created_tables: Vec<Table>,
    pub dropped_tables: Vec<Table>,
    pub altered_tables: Vec<TableDiff>,
    pub created_views: Vec<View>,
    pub dropped_views: Vec<View>,
    pub changed_views: Vec<Changed<View>>,
}

impl CatalogDiff {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.created_schemas.is_empty()
            && self.dropped_schemas.is_empty()
            && self.created_tables.is_empty()
            && self.dropped_tables.is_empty()
            && self.altered_tables.is_empty()
            && self.created_views.is_empty()
            && self.dropped_views.is_empty()
            && self.changed_views.is_empty()
    }

    /// Get a human-readable summary of the diff.
    pub fn summary(&self) -> String {
        let counts = [
            (self.created_schemas.len(), "create", "schemas"),
            (self.dropped_schemas.len(), "drop", "schemas"),
            (self.created_tables.len(), "create", "tables"),
            (self.dropped_tables.len(), "drop", "tables"),
            (self.altered_tables.len(), "alter", "tables"),
            (self.created_views.len(), "create", "views"),
            (self.dropped_views.len(), "drop", "views"),
            (self.changed_views.len(), "replace", "views"),
        ];
        let parts: Vec<String> = counts
            .iter()
            .filter(|(n, _, _)| *n > 0)
            .map(|(n, verb, noun)| format!("{verb} {n} {noun}"))
            .collect();
        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Compare `source` against `destination` under `dialect`'s rules.
///
/// Fails only on malformed input: a foreign key whose column count does not
/// match its referenced columns, or a table with several primary keys.
pub fn diff_catalogs(
    dialect: Dialect,
    source: &Catalog,
    destination: &Catalog,
) -> MigrateResult<CatalogDiff> {
    validate(dialect, source)?;
    validate(dialect, destination)?;

    let current = current_schemas(dialect, source, destination);
    let mut source = rename_schemas(dialect, source, &current);
    let mut destination = rename_schemas(dialect, destination, &current);

    let mut ignored = Ignored::default();
    ignored.collect(dialect, &source);
    ignored.collect(dialect, &destination);
    ignored.apply(dialect, &mut source);
    ignored.apply(dialect, &mut destination);

    let mut diff = CatalogDiff {
        dialect,
        source: Catalog::new(dialect),
        destination: Catalog::new(dialect),
        created_schemas: Vec::new(),
        dropped_schemas: Vec::new(),
        created_tables: Vec::new(),
        dropped_tables: Vec::new(),
        altered_tables: Vec::new(),
        created_views: Vec::new(),
        dropped_views: Vec::new(),
        changed_views: Vec::new(),
    };

    for schema in &destination.schemas {
        if !schema.schema_name.is_empty() && find_schema(dialect, &source, &schema.schema_name).is_none() {
            diff.created_schemas.push(schema.schema_name.clone());
        }
    }
    for schema in &source.schemas {
        if !schema.schema_name.is_empty() && find_schema(dialect, &destination, &schema.schema_name).is_none() {
            diff.dropped_schemas.push(schema.schema_name.clone());
        }
    }

    for table in destination.tables() {
        match find_table(dialect, &source, &table.table_schema, &table.table_name) {
            None => diff.created_tables.push(table.clone()),
            Some(existing) => {
                let table_diff = diff_table(dialect, existing, table);
                if !table_diff.is_empty() {
                    diff.altered_tables.push(table_diff);
                }
            }
        }
    }
    for table in source.tables() {
        if find_table(dialect, &destination, &table.table_schema, &table.table_name).is_none() {
            diff.dropped_tables.push(table.clone());
        }
    }

    for view in destination.views() {
        match find_view(dialect, &source, view) {
            None => diff.created_views.push(view.clone()),
            Some(existing) if collapse_whitespace(&existing.sql) != collapse_whitespace(&view.sql) => {
                diff.changed_views.push(Changed {
                    source: existing.clone(),
                    destination: view.clone(),
                });
            }
            Some(_) => {}
        }
    }
    for view in source.views() {
        if find_view(dialect, &destination, view).is_none() {
            diff.dropped_views.push(view.clone());
        }
    }

    diff.source = source;
    diff.destination = destination;
    Ok(diff)
}

fn validate(dialect: Dialect, catalog: &Catalog) -> MigrateResult<()> {
    for table in catalog.tables() {
        let primary_keys = table.constraints.iter().filter(|c| c.is_primary_key()).count();
        if primary_keys > 1 {
            return Err(MigrationError::invalid_catalog(format!(
                "table `{}` has {primary_keys} primary keys",
                table.table_name
            )));
        }
        for constraint in table.constraints.iter().filter(|c| c.is_foreign_key()) {
            if constraint.columns.len() != constraint.references_columns.len() {
                return Err(MigrationError::invalid_catalog(format!(
                    "foreign key `{}` on table `{}` has {} column(s) but references {}",
                    constraint.constraint_name,
                    table.table_name,
                    constraint.columns.len(),
                    constraint.references_columns.len()
                )));
            }
            if constraint.references_table.is_empty() {
                return Err(MigrationError::invalid_catalog(format!(
                    "foreign key `{}` on table `{}` has no referenced table",
                    constraint.constraint_name, table.table_name
                )));
            }
        }
        let mut seen = HashSet::new();
        for column in &table.columns {
            if !seen.insert(dialect.fold(&column.column_name)) {
                return Err(MigrationError::invalid_catalog(format!(
                    "column `{}.{}` is defined more than once",
                    table.table_name, column.column_name
                )));
            }
        }
    }
    Ok(())
}

/// Schema names that mean "unqualified" for this comparison.
fn current_schemas(dialect: Dialect, source: &Catalog, destination: &Catalog) -> Vec<String> {
    let mut current: Vec<String> = [&source.current_schema, &destination.current_schema]
        .into_iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect();
    if current.is_empty() && !dialect.default_schema().is_empty() {
        current.push(dialect.default_schema().to_string());
    }
    current
}

fn map_schema(dialect: Dialect, name: &str, current: &[String]) -> String {
    if current.iter().any(|c| dialect.names_equal(c, name)) {
        String::new()
    } else {
        name.to_string()
    }
}

fn rename_schemas(dialect: Dialect, catalog: &Catalog, current: &[String]) -> Catalog {
    let mut renamed = Catalog::new(dialect);
    renamed.default_collation = catalog.default_collation.clone();
    for schema in &catalog.schemas {
        let name = map_schema(dialect, &schema.schema_name, current);
        let position = match renamed
            .schemas
            .iter()
            .position(|s| dialect.names_equal(&s.schema_name, &name))
        {
            Some(position) => position,
            None => {
                renamed.schemas.push(Schema {
                    schema_name: name.clone(),
                    ..Default::default()
                });
                renamed.schemas.len() - 1
            }
        };
        let target = &mut renamed.schemas[position];
        target.ignore |= schema.ignore;
        for table in &schema.tables {
            let mut table = table.clone();
            table.table_schema = name.clone();
            for constraint in table.constraints.iter_mut().filter(|c| c.is_foreign_key()) {
                constraint.references_schema =
                    map_schema(dialect, &constraint.references_schema, current);
            }
            target.tables.push(table);
        }
        for view in &schema.views {
            let mut view = view.clone();
            view.view_schema = name.clone();
            target.views.push(view);
        }
    }
    renamed
}

/// Objects flagged `ignore` on either side, removed from both.
#[derive(Default)]
struct Ignored {
    schemas: HashSet<String>,
    tables: HashSet<(String, String)>,
    views: HashSet<(String, String)>,
    columns: HashSet<(String, String, String)>,
    constraints: HashSet<(String, String, String)>,
    indexes: HashSet<(String, String, String)>,
}

fn constraint_key(dialect: Dialect, constraint: &Constraint) -> String {
    let columns: Vec<String> = constraint.columns.iter().map(|c| dialect.fold(c)).collect();
    format!("{}:{}", constraint.constraint_type.as_sql(), columns.join(","))
}

impl Ignored {
    fn collect(&mut self, dialect: Dialect, catalog: &Catalog) {
        for schema in &catalog.schemas {
            let s = dialect.fold(&schema.schema_name);
            if schema.ignore {
                self.schemas.insert(s.clone());
            }
            for table in &schema.tables {
                let t = dialect.fold(&table.table_name);
                if table.ignore {
                    self.tables.insert((s.clone(), t.clone()));
                }
                for column in table.columns.iter().filter(|c| c.ignore) {
                    self.columns
                        .insert((s.clone(), t.clone(), dialect.fold(&column.column_name)));
                }
                for constraint in table.constraints.iter().filter(|c| c.ignore) {
                    self.constraints
                        .insert((s.clone(), t.clone(), constraint_key(dialect, constraint)));
                }
                for index in table.indexes.iter().filter(|i| i.ignore) {
                    self.indexes
                        .insert((s.clone(), t.clone(), dialect.fold(&index.index_name)));
                }
            }
            for view in schema.views.iter().filter(|v| v.ignore) {
                self.views.insert((s.clone(), dialect.fold(&view.view_name)));
            }
        }
    }

    fn apply(&self, dialect: Dialect, catalog: &mut Catalog) {
        catalog
            .schemas
            .retain(|schema| !self.schemas.contains(&dialect.fold(&schema.schema_name)));
        for schema in &mut catalog.schemas {
            let s = dialect.fold(&schema.schema_name);
            schema
                .tables
                .retain(|t| !self.tables.contains(&(s.clone(), dialect.fold(&t.table_name))));
            schema
                .views
                .retain(|v| !self.views.contains(&(s.clone(), dialect.fold(&v.view_name))));
            for table in &mut schema.tables {
                let t = dialect.fold(&table.table_name);
                table.columns.retain(|c| {
                    !self
                        .columns
                        .contains(&(s.clone(), t.clone(), dialect.fold(&c.column_name)))
                });
                table.constraints.retain(|c| {
                    !self
                        .constraints
                        .contains(&(s.clone(), t.clone(), constraint_key(dialect, c)))
                });
                table.indexes.retain(|i| {
                    !self
                        .indexes
                        .contains(&(s.clone(), t.clone(), dialect.fold(&i.index_name)))
                });
            }
        }
    }
}

fn find_schema<'a>(dialect: Dialect, catalog: &'a Catalog, name: &str) -> Option<&'a Schema> {
    catalog
        .schemas
        .iter()
        .find(|s| dialect.names_equal(&s.schema_name, name))
}

pub(crate) fn find_table<'a>(
    dialect: Dialect,
    catalog: &'a Catalog,
    schema: &str,
    name: &str,
) -> Option<&'a Table> {
    find_schema(dialect, catalog, schema)?
        .tables
        .iter()
        .find(|t| dialect.names_equal(&t.table_name, name))
}

fn find_view<'a>(dialect: Dialect, catalog: &'a Catalog, view: &View) -> Option<&'a View> {
    find_schema(dialect, catalog, &view.view_schema)?
        .views
        .iter()
        .find(|v| dialect.names_equal(&v.view_name, &view.view_name))
}

fn diff_table(dialect: Dialect, source: &Table, destination: &Table) -> TableDiff {
    let mut diff = TableDiff::new(source, destination);

    for column in &destination.columns {
        match source.column(dialect, &column.column_name) {
            None => diff.added_columns.push(column.clone()),
            Some(existing) => {
                if let Some(change) = compare_columns(dialect, existing, column) {
                    diff.altered_columns.push(change);
                }
            }
        }
    }
    for column in &source.columns {
        if destination.column(dialect, &column.column_name).is_none() {
            diff.dropped_columns.push(column.clone());
        }
    }

    diff_constraints(dialect, &mut diff);
    diff_indexes(dialect, &mut diff);
    diff
}

fn diff_constraints(dialect: Dialect, diff: &mut TableDiff) {
    let source = &diff.source;
    let destination = &diff.destination;

    // A primary key that moved to other columns is a change, not a drop.
    if let (Some(old), Some(new)) = (source.primary_key(), destination.primary_key()) {
        if !columns_equal(dialect, &old.columns, &new.columns) {
            diff.changed_constraints.push(Changed {
                source: old.clone(),
                destination: new.clone(),
            });
        }
    }

    for constraint in &destination.constraints {
        match source.constraint_on(dialect, constraint.constraint_type, &constraint.columns) {
            None if constraint.is_primary_key() && source.primary_key().is_some() => {}
            None => diff.added_constraints.push(constraint.clone()),
            Some(existing) => {
                if !constraints_equivalent(dialect, existing, constraint) {
                    diff.changed_constraints.push(Changed {
                        source: existing.clone(),
                        destination: constraint.clone(),
                    });
                }
            }
        }
    }
    for constraint in &source.constraints {
        let kept = destination
            .constraint_on(dialect, constraint.constraint_type, &constraint.columns)
            .is_some();
        let moved = constraint.is_primary_key() && destination.primary_key().is_some();
        if !kept && !moved {
            diff.dropped_constraints.push(constraint.clone());
        }
    }
}

fn constraints_equivalent(dialect: Dialect, a: &Constraint, b: &Constraint) -> bool {
    if a.constraint_type != ConstraintType::ForeignKey {
        return true;
    }
    dialect.names_equal(&a.references_schema, &b.references_schema)
        && dialect.names_equal(&a.references_table, &b.references_table)
        && columns_equal(dialect, &a.references_columns, &b.references_columns)
        && a.update_rule == b.update_rule
        && a.delete_rule == b.delete_rule
        && a.is_deferrable == b.is_deferrable
        && a.is_initially_deferred == b.is_initially_deferred
}

fn diff_indexes(dialect: Dialect, diff: &mut TableDiff) {
    let source = &diff.source;
    let destination = &diff.destination;
    let mut matched = vec![false; source.indexes.len()];

    for index in &destination.indexes {
        let found = source.indexes.iter().enumerate().find(|(i, existing)| {
            !matched[*i] && existing.is_simple() == index.is_simple() && {
                if index.is_simple() {
                    columns_equal(dialect, &existing.columns, &index.columns)
                } else {
                    dialect.names_equal(&existing.index_name, &index.index_name)
                }
            }
        });
        match found {
            None => diff.added_indexes.push(index.clone()),
            Some((i, existing)) => {
                matched[i] = true;
                if !indexes_equivalent(dialect, existing, index) {
                    diff.changed_indexes.push(Changed {
                        source: existing.clone(),
                        destination: index.clone(),
                    });
                }
            }
        }
    }
    for (i, index) in source.indexes.iter().enumerate() {
        if !matched[i] {
            diff.dropped_indexes.push(index.clone());
        }
    }
}

fn index_type(index: &Index) -> String {
    let ty = index.index_type.trim().to_ascii_uppercase();
    if ty.is_empty() { "BTREE".to_string() } else { ty }
}

fn indexes_equivalent(dialect: Dialect, a: &Index, b: &Index) -> bool {
    if a.is_simple() {
        let types_match = dialect == Dialect::Sqlite || index_type(a) == index_type(b);
        return a.is_unique == b.is_unique && types_match;
    }
    if !a.sql.is_empty() && !b.sql.is_empty() {
        return collapse_whitespace(&a.sql) == collapse_whitespace(&b.sql);
    }
    a.is_unique == b.is_unique
        && columns_equal(dialect, &a.columns, &b.columns)
        && a.include_columns == b.include_columns
        && a.descending == b.descending
        && a.predicate.trim() == b.predicate.trim()
}

fn compare_columns(dialect: Dialect, source: &Column, destination: &Column) -> Option<ColumnChange> {
    let src_type = source.effective_type();
    let dest_type = destination.effective_type();
    let type_changed = !src_type.is_empty()
        && !dest_type.is_empty()
        && !types_equal(dialect, src_type, dest_type);

    let default_changed = source.column_default.as_deref().map(normalize_default)
        != destination.column_default.as_deref().map(normalize_default);

    let collation_changed = match destination.collation_name.as_deref() {
        Some(wanted) => source
            .collation_name
            .as_deref()
            .is_none_or(|current| !current.eq_ignore_ascii_case(wanted)),
        None => false,
    };

    let identity_changed = match dialect {
        Dialect::Postgres => source.identity != destination.identity,
        // IDENTITY has a single form there.
        Dialect::Sqlserver => source.identity.is_none() != destination.identity.is_none(),
        _ => false,
    };
    let autoincrement_changed = matches!(dialect, Dialect::Sqlite | Dialect::Mysql)
        && source.is_autoincrement != destination.is_autoincrement;
    let generated_changed = source.is_generated != destination.is_generated
        || source.generated_expr.as_deref().map(normalize_default)
            != destination.generated_expr.as_deref().map(normalize_default);
    let on_update_changed = dialect == Dialect::Mysql
        && source.on_update_current_timestamp != destination.on_update_current_timestamp;

    let change = ColumnChange {
        source: source.clone(),
        destination: destination.clone(),
        type_changed,
        null_changed: source.is_not_null != destination.is_not_null,
        default_changed,
        collation_changed,
        identity_changed,
        autoincrement_changed,
        generated_changed,
        on_update_changed,
    };
    (change.has_plain_changes() || change.generated_changed).then_some(change)
}

/// Canonical form of a default or generated expression for comparison.
///
/// Redundant outer parentheses and a trailing `::type` cast are removed and
/// anything outside string literals is upper-cased.
pub fn normalize_default(expr: &str) -> String {
    let mut text = expr.trim();
    loop {
        let unwrapped = strip_outer_parens(text);
        let uncast = strip_trailing_cast(unwrapped);
        if uncast.len() == text.len() {
            break;
        }
        text = uncast;
    }
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    for ch in text.chars() {
        if ch == '\'' {
            in_string = !in_string;
        }
        if in_string || ch == '\'' {
            out.push(ch);
        } else {
            out.push(ch.to_ascii_uppercase());
        }
    }
    collapse_whitespace(&out)
}

fn strip_outer_parens(text: &str) -> &str {
    let text = text.trim();
    if !(text.starts_with('(') && text.ends_with(')')) {
        return text;
    }
    let mut depth = 0i32;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != text.len() - 1 {
                    return text;
                }
            }
            _ => {}
        }
    }
    text[1..text.len() - 1].trim()
}

fn strip_trailing_cast(text: &str) -> &str {
    let Some(pos) = text.rfind("::") else {
        return text;
    };
    let cast = &text[pos + 2..];
    let is_type = !cast.is_empty()
        && cast
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '[' | ']' | '"'));
    let before = &text[..pos];
    if is_type && before.matches('\'').count() % 2 == 0 {
        before.trim_end()
    } else {
        text
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.trim()
        .trim_end_matches(';')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use strata_catalog::{Identity, ReferentialAction, parse_declarative};

    use super::*;

    fn catalog(dialect: Dialect, src: &str) -> Catalog {
        parse_declarative(dialect, src).unwrap()
    }

    #[test]
    fn test_identical_catalogs_are_empty() {
        let c = catalog(
            Dialect::Postgres,
            "table film {\n film_id number primarykey identity\n title string unique index\n}\n",
        );
        let diff = diff_catalogs(Dialect::Postgres, &c, &c).unwrap();
        assert!(diff.is_empty(), "{diff:?}");
        assert_eq!(diff.summary(), "No changes");
    }

    #[test]
    fn test_current_schema_alias() {
        let a = catalog(Dialect::Postgres, "table public.film {\n film_id number\n}\n");
        let b = catalog(Dialect::Postgres, "table film {\n film_id number\n}\n");
        assert!(diff_catalogs(Dialect::Postgres, &a, &b).unwrap().is_empty());

        let c = catalog(Dialect::Postgres, "table other.film {\n film_id number\n}\n");
        let diff = diff_catalogs(Dialect::Postgres, &b, &c).unwrap();
        assert_eq!(diff.created_schemas, vec!["other".to_string()]);
        assert_eq!(diff.created_tables.len(), 1);
        assert_eq!(diff.dropped_tables.len(), 1);
    }

    #[test]
    fn test_column_changes() {
        let a = catalog(
            Dialect::Postgres,
            "table film {\n title string\n rating number default=1\n}\n",
        );
        let b = catalog(
            Dialect::Postgres,
            "table film {\n title string notnull\n rating number type=BIGINT default=(1)\n}\n",
        );
        let diff = diff_catalogs(Dialect::Postgres, &a, &b).unwrap();
        let altered = &diff.altered_tables[0].altered_columns;
        assert_eq!(altered.len(), 2);
        assert!(altered[0].null_changed);
        assert!(!altered[0].type_changed);
        assert!(altered[1].type_changed);
        assert!(!altered[1].default_changed);
    }

    #[test]
    fn test_type_aliases_do_not_alter() {
        let a = catalog(Dialect::Postgres, "table t {\n a number type=int4\n}\n");
        let b = catalog(Dialect::Postgres, "table t {\n a number type=INTEGER\n}\n");
        assert!(diff_catalogs(Dialect::Postgres, &a, &b).unwrap().is_empty());
    }

    #[test]
    fn test_foreign_key_rule_change_is_a_change() {
        let a = catalog(
            Dialect::Postgres,
            "table a {\n id number primarykey\n}\ntable b {\n a_id number references=a.id\n}\n",
        );
        let b = catalog(
            Dialect::Postgres,
            "table a {\n id number primarykey\n}\ntable b {\n a_id number references={a.id ondelete=cascade}\n}\n",
        );
        let diff = diff_catalogs(Dialect::Postgres, &a, &b).unwrap();
        let table = &diff.altered_tables[0];
        assert_eq!(table.changed_constraints.len(), 1);
        assert_eq!(
            table.changed_constraints[0].destination.delete_rule,
            ReferentialAction::Cascade
        );
        assert!(table.added_constraints.is_empty());
        assert!(table.dropped_constraints.is_empty());
    }

    #[test]
    fn test_primary_key_move_is_a_change() {
        let a = catalog(Dialect::Mysql, "table t {\n a number primarykey\n b number notnull\n}\n");
        let b = catalog(Dialect::Mysql, "table t {\n a number notnull\n b number primarykey\n}\n");
        let diff = diff_catalogs(Dialect::Mysql, &a, &b).unwrap();
        let table = &diff.altered_tables[0];
        assert_eq!(table.changed_constraints.len(), 1);
        assert!(table.dropped_constraints.is_empty());
        assert!(table.added_constraints.is_empty());
    }

    #[test]
    fn test_ignored_objects_are_excluded() {
        let a = catalog(Dialect::Sqlite, "table t {\n a number\n b string ignore\n}\n");
        let b = catalog(Dialect::Sqlite, "table t {\n a number\n}\n");
        assert!(diff_catalogs(Dialect::Sqlite, &a, &b).unwrap().is_empty());

        let c = catalog(Dialect::Sqlite, "table t {\n a number\n _ ignore\n}\n");
        let d = Catalog::new(Dialect::Sqlite);
        assert!(diff_catalogs(Dialect::Sqlite, &c, &d).unwrap().is_empty());
    }

    #[test]
    fn test_identity_only_compared_where_supported() {
        let mut a = catalog(Dialect::Sqlite, "table t {\n a number\n}\n");
        let b = a.clone();
        a.schemas[0].tables[0].columns[0].identity = Identity::Always;
        assert!(diff_catalogs(Dialect::Sqlite, &a, &b).unwrap().is_empty());
        assert!(!diff_catalogs(Dialect::Postgres, &a, &b).unwrap().is_empty());
    }

    #[test]
    fn test_foreign_key_column_mismatch_is_fatal() {
        let mut c = catalog(Dialect::Postgres, "table a {\n id number primarykey\n}\ntable b {\n a_id number references=a.id\n}\n");
        c.schemas[0].tables[1].constraints[0].references_columns.push("extra".into());
        let err = diff_catalogs(Dialect::Postgres, &Catalog::new(Dialect::Postgres), &c).unwrap_err();
        assert!(matches!(err, MigrationError::InvalidCatalog(_)));
        assert!(err.to_string().contains("b_a_id_fkey"));
    }

    #[test]
    fn test_complex_indexes_compare_by_sql() {
        let mut a = catalog(Dialect::Postgres, "table t {\n a string\n}\n");
        let mut index = Index::new("t", vec!["(lower(a))".into()]);
        index.sql = "CREATE INDEX t_lower_idx ON t (lower(a))".into();
        index.index_name = "t_lower_idx".into();
        a.schemas[0].tables[0].indexes.push(index.clone());
        let mut b = a.clone();
        assert!(diff_catalogs(Dialect::Postgres, &a, &b).unwrap().is_empty());

        b.schemas[0].tables[0].indexes[0].sql = "CREATE INDEX t_lower_idx ON t (upper(a))".into();
        let diff = diff_catalogs(Dialect::Postgres, &a, &b).unwrap();
        assert_eq!(diff.altered_tables[0].changed_indexes.len(), 1);
    }

    #[test]
    fn test_normalize_default() {
        assert_eq!(normalize_default("((0))"), "0");
        assert_eq!(normalize_default("'G'::mpaa_rating"), "'G'");
        assert_eq!(normalize_default("now()"), "NOW()");
        assert_eq!(normalize_default("'Mixed Case'"), "'Mixed Case'");
        assert_eq!(normalize_default("(a) + (b)"), "(A) + (B)");
    }
}
