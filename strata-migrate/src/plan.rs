//! Statement planning: turns a [`CatalogDiff`] into ordered DDL.
//!
//! Statements are emitted in stages so that every object exists before
//! anything that references it, and every dependent goes away before the
//! object it depends on:
//!
//! 1. create schemas
//! 2. drop views that are removed, changed or depend on changing tables
//! 3. drop foreign keys, then primary/unique keys, then indexes
//! 4. drop columns, then tables (dependents first), then schemas
//! 5. add and alter columns and keys on kept tables
//! 6. create tables in foreign-key order, deferring cycle-closing keys
//! 7. rebuild tables that cannot be altered in place
//! 8. add foreign keys on kept tables, create indexes, create views

use std::collections::HashSet;

use strata_catalog::{Catalog, Constraint, Dialect, Table, View};
use tracing::{debug, warn};

use crate::diff::{CatalogDiff, TableDiff, diff_catalogs};
use crate::dialect::{DialectEngine, DiffOutput, FKEYS_BATCH, NamedSqlBatch};
use crate::error::MigrateResult;

/// Diff two catalogs and plan the statements for `engine`.
pub(crate) fn plan<E: DialectEngine + ?Sized>(
    engine: &E,
    source: &Catalog,
    destination: &Catalog,
    allow_drops: bool,
) -> MigrateResult<DiffOutput> {
    let diff = diff_catalogs(engine.dialect(), source, destination)?;
    debug!(dialect = %engine.dialect(), summary = %diff.summary(), "planning migration");
    let mut planner = Planner::new(engine, &diff, allow_drops);
    planner.run();
    Ok(planner.finish())
}

/// Dependency order over a set of tables.
#[derive(Debug, Default)]
pub(crate) struct TableOrder {
    /// Table positions, referenced tables first.
    pub order: Vec<usize>,
    /// `(table, constraint)` positions of foreign keys closing a cycle.
    pub back_edges: Vec<(usize, usize)>,
}

/// Depth-first walk over foreign keys in declaration order. A foreign key
/// whose target is still on the walk stack closes a cycle and is reported
/// as a back edge. Self-references are never back edges.
pub(crate) fn order_tables(dialect: Dialect, tables: &[Table]) -> TableOrder {
    struct Walk<'a> {
        dialect: Dialect,
        tables: &'a [Table],
        state: Vec<u8>,
        result: TableOrder,
    }

    impl Walk<'_> {
        fn lookup(&self, schema: &str, name: &str) -> Option<usize> {
            self.tables.iter().position(|t| {
                self.dialect.names_equal(&t.table_schema, schema)
                    && self.dialect.names_equal(&t.table_name, name)
            })
        }

        fn visit(&mut self, i: usize) {
            self.state[i] = 1;
            let tables = self.tables;
            for (ci, constraint) in tables[i].constraints.iter().enumerate() {
                if !constraint.is_foreign_key() {
                    continue;
                }
                let Some(j) = self.lookup(&constraint.references_schema, &constraint.references_table)
                else {
                    continue;
                };
                if j == i {
                    continue;
                }
                match self.state[j] {
                    0 => self.visit(j),
                    1 => self.result.back_edges.push((i, ci)),
                    _ => {}
                }
            }
            self.state[i] = 2;
            self.result.order.push(i);
        }
    }

    let mut walk = Walk {
        dialect,
        tables,
        state: vec![0; tables.len()],
        result: TableOrder::default(),
    };
    for i in 0..tables.len() {
        if walk.state[i] == 0 {
            walk.visit(i);
        }
    }
    walk.result
}

/// Whether `sql` mentions `word` as a whole identifier, ignoring case.
pub(crate) fn mentions(sql: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let haystack = sql.to_ascii_lowercase();
    let needle = word.to_ascii_lowercase();
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$';
    let mut start = 0;
    while let Some(found) = haystack[start..].find(&needle) {
        let at = start + found;
        let end = at + needle.len();
        let before = haystack[..at].chars().next_back();
        let after = haystack[end..].chars().next();
        if !before.is_some_and(is_ident) && !after.is_some_and(is_ident) {
            return true;
        }
        start = at + needle.len().max(1);
    }
    false
}

struct Planner<'a, E: ?Sized> {
    engine: &'a E,
    diff: &'a CatalogDiff,
    allow_drops: bool,
    /// Target table per altered table that is rebuilt instead of altered.
    rebuilds: Vec<Option<Table>>,
    main: Vec<String>,
    fkeys: Vec<String>,
    warnings: Vec<String>,
}

impl<'a, E: DialectEngine + ?Sized> Planner<'a, E> {
    fn new(engine: &'a E, diff: &'a CatalogDiff, allow_drops: bool) -> Self {
        Self {
            engine,
            diff,
            allow_drops,
            rebuilds: vec![None; diff.altered_tables.len()],
            main: Vec::new(),
            fkeys: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn dialect(&self) -> Dialect {
        self.engine.dialect()
    }

    fn warn(&mut self, message: String) {
        warn!(dialect = %self.dialect(), "{message}");
        self.warnings.push(message);
    }

    /// Gate a destructive statement, warning when drops are disabled.
    fn allow_drop(&mut self, what: String) -> bool {
        if self.allow_drops {
            return true;
        }
        self.warn(format!("{what} skipped: drop objects not enabled"));
        false
    }

    fn push(&mut self, statement: String) {
        debug!(%statement, "planned statement");
        self.main.push(statement);
    }

    fn push_all(&mut self, statements: Vec<String>) {
        for statement in statements {
            self.push(statement);
        }
    }

    fn run(&mut self) {
        self.plan_rebuilds();
        self.create_schemas();
        let recreate_views = self.drop_views();
        self.drop_foreign_keys();
        self.drop_keys();
        self.drop_indexes();
        self.drop_columns();
        self.drop_tables();
        self.drop_schemas();
        self.alter_tables();
        self.create_tables();
        self.rebuild_tables();
        self.add_foreign_keys();
        self.create_indexes();
        self.create_views(&recreate_views);
    }

    fn finish(self) -> DiffOutput {
        let mut batches = Vec::new();
        if !self.main.is_empty() {
            batches.push(NamedSqlBatch::new("", self.main));
        }
        if !self.fkeys.is_empty() {
            batches.push(NamedSqlBatch::new(FKEYS_BATCH, self.fkeys));
        }
        DiffOutput {
            batches,
            warnings: self.warnings,
        }
    }

    /// Kept tables handled by `rebuild_tables` rather than in place.
    fn kept_tables(&self) -> impl Iterator<Item = &'a TableDiff> + '_ {
        let diff = self.diff;
        diff.altered_tables
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.rebuilds[*i].is_none())
            .map(|(_, t)| t)
    }

    fn plan_rebuilds(&mut self) {
        let diff = self.diff;
        for (i, table) in diff.altered_tables.iter().enumerate() {
            let Some(reason) = self.engine.rebuild_reason(table, self.allow_drops) else {
                continue;
            };
            debug!(table = table.table_name(), %reason, "rebuilding table");
            let mut target = table.destination.clone();
            let name = table.table_name().to_string();
            if !self.allow_drops {
                // Keep what the destination removed rather than lose it silently.
                for column in &table.dropped_columns {
                    self.allow_drop(format!("DROP COLUMN {name}.{}", column.column_name));
                    target.columns.push(column.clone());
                }
                for constraint in &table.dropped_constraints {
                    self.allow_drop(format!(
                        "DROP CONSTRAINT {} on {name}",
                        constraint.constraint_name
                    ));
                    target.constraints.push(constraint.clone());
                }
                for index in &table.dropped_indexes {
                    self.allow_drop(format!("DROP INDEX {} on {name}", index.index_name));
                    target.indexes.push(index.clone());
                }
            }
            self.rebuilds[i] = Some(target);
        }
    }

    fn create_schemas(&mut self) {
        let diff = self.diff;
        for schema in &diff.created_schemas {
            if self.dialect().supports_schemas() {
                let statement = self.engine.create_schema(schema);
                self.push(statement);
            } else {
                self.warn(format!(
                    "CREATE SCHEMA {schema} skipped: {} has no schemas, \
                     tables in {schema} need a database attached as {schema}",
                    self.dialect()
                ));
            }
        }
    }

    /// Tables whose drop or change invalidates views over them.
    fn affected_tables(&self) -> Vec<&'a str> {
        let diff = self.diff;
        let mut affected = Vec::new();
        if self.allow_drops {
            affected.extend(diff.dropped_tables.iter().map(|t| t.table_name.as_str()));
        }
        for (i, table) in diff.altered_tables.iter().enumerate() {
            let rebuilt = self.rebuilds[i].is_some();
            let columns_dropped = self.allow_drops && !table.dropped_columns.is_empty();
            if rebuilt || columns_dropped || !table.altered_columns.is_empty() {
                affected.push(table.table_name());
            }
        }
        affected
    }

    /// Drop views that go away or must be recreated. Returns the names of
    /// unchanged views that are dropped because of their tables.
    fn drop_views(&mut self) -> HashSet<String> {
        let diff = self.diff;
        let dialect = self.dialect();
        let affected = self.affected_tables();
        let mut recreate = HashSet::new();

        for view in diff.source.views() {
            let key = view_key(dialect, view);
            let dropped = diff.dropped_views.iter().any(|v| view_key(dialect, v) == key);
            let changed = diff
                .changed_views
                .iter()
                .any(|v| view_key(dialect, &v.source) == key);
            if dropped {
                if self.allow_drop(format!("DROP VIEW {}", view.view_name)) {
                    let statement = self.engine.drop_view(view);
                    self.push(statement);
                }
            } else if changed {
                let statement = self.engine.drop_view(view);
                self.push(statement);
            } else if affected.iter().any(|t| mentions(&view.sql, t)) {
                let statement = self.engine.drop_view(view);
                self.push(statement);
                recreate.insert(key);
            }
        }
        recreate
    }

    fn drop_foreign_keys(&mut self) {
        for table in self.kept_tables().collect::<Vec<_>>() {
            let name = table.table_name();
            for constraint in table.dropped_constraints.iter().filter(|c| c.is_foreign_key()) {
                if self.allow_drop(format!("DROP CONSTRAINT {} on {name}", constraint.constraint_name)) {
                    let statement = self.engine.drop_constraint(&table.source, constraint);
                    self.push(statement);
                }
            }
            for change in table.changed_constraints.iter().filter(|c| c.source.is_foreign_key()) {
                let statement = self.engine.drop_constraint(&table.source, &change.source);
                self.push(statement);
            }
        }

        // Foreign keys closing a cycle among dropped tables go first.
        if self.allow_drops && !self.engine.inlines_foreign_keys() {
            let diff = self.diff;
            let tables = &diff.dropped_tables;
            let order = order_tables(self.dialect(), tables);
            for (ti, ci) in order.back_edges {
                let statement = self.engine.drop_constraint(&tables[ti], &tables[ti].constraints[ci]);
                self.push(statement);
            }
        }
    }

    fn drop_keys(&mut self) {
        for table in self.kept_tables().collect::<Vec<_>>() {
            let name = table.table_name();
            for constraint in table.dropped_constraints.iter().filter(|c| !c.is_foreign_key()) {
                if self.allow_drop(format!("DROP CONSTRAINT {} on {name}", constraint.constraint_name)) {
                    let statement = self.engine.drop_constraint(&table.source, constraint);
                    self.push(statement);
                }
            }
            for change in table.changed_constraints.iter().filter(|c| !c.source.is_foreign_key()) {
                let statement = self.engine.drop_constraint(&table.source, &change.source);
                self.push(statement);
            }
        }
    }

    fn drop_indexes(&mut self) {
        for table in self.kept_tables().collect::<Vec<_>>() {
            let name = table.table_name();
            for index in &table.dropped_indexes {
                if self.allow_drop(format!("DROP INDEX {} on {name}", index.index_name)) {
                    let statement = self.engine.drop_index(&table.source, index);
                    self.push(statement);
                }
            }
            for change in &table.changed_indexes {
                let statement = self.engine.drop_index(&table.source, &change.source);
                self.push(statement);
            }
        }
    }

    fn drop_columns(&mut self) {
        for table in self.kept_tables().collect::<Vec<_>>() {
            let name = table.table_name();
            for column in &table.dropped_columns {
                if self.allow_drop(format!("DROP COLUMN {name}.{}", column.column_name)) {
                    let statements = self.engine.drop_column(&table.source, column);
                    self.push_all(statements);
                }
            }
            // Generated columns are recomputed, so dropping them loses nothing.
            for change in table.altered_columns.iter().filter(|c| c.generated_changed) {
                let statements = self.engine.drop_column(&table.source, &change.source);
                self.push_all(statements);
            }
        }
    }

    fn drop_tables(&mut self) {
        let diff = self.diff;
        let tables = &diff.dropped_tables;
        let order = order_tables(self.dialect(), tables);
        for i in order.order.into_iter().rev() {
            let table = &tables[i];
            if self.allow_drop(format!("DROP TABLE {}", display_name(&table.table_schema, &table.table_name))) {
                let statement = self.engine.drop_table(table);
                self.push(statement);
            }
        }
    }

    fn drop_schemas(&mut self) {
        let diff = self.diff;
        for schema in &diff.dropped_schemas {
            if !self.allow_drop(format!("DROP SCHEMA {schema}")) {
                continue;
            }
            if self.dialect().supports_schemas() {
                let statement = self.engine.drop_schema(schema);
                self.push(statement);
            } else {
                self.warn(format!(
                    "DROP SCHEMA {schema} skipped: {} has no schemas, detach {schema} instead",
                    self.dialect()
                ));
            }
        }
    }

    fn alter_tables(&mut self) {
        for table in self.kept_tables().collect::<Vec<_>>() {
            let destination = &table.destination;
            for column in &table.added_columns {
                let statements = self.engine.add_column(destination, column);
                self.push_all(statements);
                for warning in self.engine.column_warnings(destination, column) {
                    self.warn(warning);
                }
            }
            for change in &table.altered_columns {
                if change.generated_changed {
                    let statements = self.engine.add_column(destination, &change.destination);
                    self.push_all(statements);
                } else {
                    let mut warnings = Vec::new();
                    let statements = self.engine.alter_column(destination, change, &mut warnings);
                    self.push_all(statements);
                    for warning in warnings {
                        self.warn(warning);
                    }
                }
            }
            let keys = table
                .added_constraints
                .iter()
                .chain(table.changed_constraints.iter().map(|c| &c.destination))
                .filter(|c| !c.is_foreign_key());
            for constraint in keys {
                let statement = self.engine.add_constraint(destination, constraint);
                self.push(statement);
            }
        }
    }

    fn create_tables(&mut self) {
        let diff = self.diff;
        let tables = &diff.created_tables;
        let order = order_tables(self.dialect(), tables);
        let defer = !self.engine.inlines_foreign_keys();

        for i in order.order {
            let table = &tables[i];
            let deferred: Vec<&Constraint> = if defer {
                order
                    .back_edges
                    .iter()
                    .filter(|(ti, _)| *ti == i)
                    .map(|(_, ci)| &table.constraints[*ci])
                    .collect()
            } else {
                Vec::new()
            };
            let statement = self.engine.create_table(table, &deferred);
            self.push(statement);
            for column in &table.columns {
                for warning in self.engine.column_warnings(table, column) {
                    self.warn(warning);
                }
            }
            for constraint in &table.constraints {
                for warning in self.engine.constraint_warnings(table, constraint) {
                    self.warn(warning);
                }
            }
        }

        if defer {
            for (ti, ci) in &order.back_edges {
                let table = &tables[*ti];
                debug!(
                    table = %table.table_name,
                    constraint = %table.constraints[*ci].constraint_name,
                    "deferring foreign key to break a cycle"
                );
                self.fkeys.push(self.engine.add_constraint(table, &table.constraints[*ci]));
            }
        }
    }

    fn rebuild_tables(&mut self) {
        let diff = self.diff;
        for (i, table) in diff.altered_tables.iter().enumerate() {
            let Some(target) = self.rebuilds[i].take() else {
                continue;
            };
            let statements = self.engine.rebuild_table(&table.source, &target);
            self.push_all(statements);
            // Keep the marker so later stages still skip this table.
            self.rebuilds[i] = Some(target);
        }
    }

    fn add_foreign_keys(&mut self) {
        for table in self.kept_tables().collect::<Vec<_>>() {
            let keys = table
                .added_constraints
                .iter()
                .chain(table.changed_constraints.iter().map(|c| &c.destination))
                .filter(|c| c.is_foreign_key());
            for constraint in keys {
                let statement = self.engine.add_constraint(&table.destination, constraint);
                self.push(statement);
                for warning in self.engine.constraint_warnings(&table.destination, constraint) {
                    self.warn(warning);
                }
            }
        }
    }

    fn create_indexes(&mut self) {
        let diff = self.diff;
        let order = order_tables(self.dialect(), &diff.created_tables);
        for i in order.order {
            let table = &diff.created_tables[i];
            for index in &table.indexes {
                let statement = self.engine.create_index(table, index);
                self.push(statement);
            }
        }
        for table in self.kept_tables().collect::<Vec<_>>() {
            let indexes = table
                .added_indexes
                .iter()
                .chain(table.changed_indexes.iter().map(|c| &c.destination));
            for index in indexes {
                let statement = self.engine.create_index(&table.destination, index);
                self.push(statement);
            }
        }
    }

    fn create_views(&mut self, recreate: &HashSet<String>) {
        let diff = self.diff;
        let dialect = self.dialect();
        for view in diff.destination.views() {
            let key = view_key(dialect, view);
            let created = diff.created_views.iter().any(|v| view_key(dialect, v) == key);
            let changed = diff
                .changed_views
                .iter()
                .any(|v| view_key(dialect, &v.destination) == key);
            if created || changed || recreate.contains(&key) {
                let statement = self.engine.create_view(view);
                self.push(statement);
            }
        }
    }
}

fn view_key(dialect: Dialect, view: &View) -> String {
    format!("{}.{}", dialect.fold(&view.view_schema), dialect.fold(&view.view_name))
}

fn display_name(schema: &str, name: &str) -> String {
    if schema.is_empty() {
        name.to_string()
    } else {
        format!("{schema}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use strata_catalog::parse_declarative;

    use super::*;
    use crate::dialect::engine;

    fn catalog(dialect: Dialect, src: &str) -> Catalog {
        parse_declarative(dialect, src).unwrap()
    }

    fn statements(output: &DiffOutput) -> Vec<&str> {
        output.statements().collect()
    }

    const MOVIES: &str = "
table category {
    category_id  number  primarykey identity
    category     string  unique
}

table movie {
    movie_id     number  primarykey identity
    title        string  unique
    category     string  references={category.category index}
    subcategory  string  references={category.category index}
    metadata     json
}
";

    #[test]
    fn test_mentions_whole_words() {
        assert!(mentions("SELECT * FROM film f", "film"));
        assert!(mentions("select * from FILM", "film"));
        assert!(!mentions("SELECT * FROM film_actor", "film"));
        assert!(!mentions("SELECT * FROM my_film", "film"));
        assert!(mentions("SELECT a FROM x JOIN film ON x.id = film.id", "film"));
    }

    #[test]
    fn test_cycle_is_broken_at_back_edge() {
        let c = catalog(
            Dialect::Postgres,
            "table a {\n id number primarykey\n b_id number references=b.id\n}\n\
             table b {\n id number primarykey\n a_id number references=a.id\n}\n",
        );
        let tables = &c.schemas[0].tables;
        let order = order_tables(Dialect::Postgres, tables);
        assert_eq!(order.order, vec![1, 0]);
        assert_eq!(order.back_edges, vec![(1, 1)]);
    }

    #[test]
    fn test_create_order_for_postgres() {
        let dest = catalog(Dialect::Postgres, MOVIES);
        let output = engine(Dialect::Postgres)
            .diff(&Catalog::new(Dialect::Postgres), &dest, true)
            .unwrap();
        assert!(output.warnings.is_empty());
        let stmts = statements(&output);
        assert_eq!(stmts.len(), 4);
        assert!(stmts[0].starts_with("CREATE TABLE category"));
        assert!(stmts[1].starts_with("CREATE TABLE movie"));
        assert!(stmts[1].contains("REFERENCES category (category)"));
        assert_eq!(stmts[2], "CREATE INDEX movie_category_idx ON movie (category)");
        assert_eq!(stmts[3], "CREATE INDEX movie_subcategory_idx ON movie (subcategory)");
    }

    #[test]
    fn test_cycle_defers_foreign_key_to_fkeys_batch() {
        let dest = catalog(
            Dialect::Postgres,
            "table a {\n id number primarykey\n b_id number references=b.id\n}\n\
             table b {\n id number primarykey\n a_id number references=a.id\n}\n",
        );
        let output = engine(Dialect::Postgres)
            .diff(&Catalog::new(Dialect::Postgres), &dest, true)
            .unwrap();
        let main = output.batch("").unwrap();
        assert!(main.statements[0].starts_with("CREATE TABLE b"));
        assert!(!main.statements[0].contains("REFERENCES"));
        assert!(main.statements[1].contains("REFERENCES b (id)"));
        let fkeys = output.batch(FKEYS_BATCH).unwrap();
        assert_eq!(
            fkeys.statements,
            vec!["ALTER TABLE b ADD CONSTRAINT b_a_id_fkey FOREIGN KEY (a_id) REFERENCES a (id)"]
        );
    }

    #[test]
    fn test_sqlite_never_defers() {
        let dest = catalog(
            Dialect::Sqlite,
            "table a {\n id number primarykey\n b_id number references=b.id\n}\n\
             table b {\n id number primarykey\n a_id number references=a.id\n}\n",
        );
        let output = engine(Dialect::Sqlite)
            .diff(&Catalog::new(Dialect::Sqlite), &dest, true)
            .unwrap();
        assert_eq!(output.batches.len(), 1);
        assert!(output.statements().all(|s| !s.starts_with("ALTER")));
    }

    #[test]
    fn test_identical_catalogs_produce_nothing() {
        for dialect in Dialect::ALL {
            let c = catalog(dialect, MOVIES);
            let output = engine(dialect).diff(&c, &c, true).unwrap();
            assert!(output.is_empty(), "{dialect}: {output:?}");
            assert!(output.warnings.is_empty(), "{dialect}: {output:?}");
        }
    }

    #[test]
    fn test_drop_gating() {
        let source = catalog(
            Dialect::Postgres,
            "table film {\n film_id number primarykey\n title string index\n}\ntable actor {\n id number\n}\n",
        );
        let dest = catalog(
            Dialect::Postgres,
            "table film {\n film_id number primarykey\n rating number\n}\n",
        );
        let gated = engine(Dialect::Postgres).diff(&source, &dest, false).unwrap();
        assert_eq!(
            statements(&gated),
            vec!["ALTER TABLE film ADD COLUMN rating INT"]
        );
        assert_eq!(
            gated.warnings,
            vec![
                "DROP INDEX film_title_idx on film skipped: drop objects not enabled",
                "DROP COLUMN film.title skipped: drop objects not enabled",
                "DROP TABLE actor skipped: drop objects not enabled",
            ]
        );

        let full = engine(Dialect::Postgres).diff(&source, &dest, true).unwrap();
        assert!(full.warnings.is_empty());
        assert_eq!(
            statements(&full),
            vec![
                "DROP INDEX film_title_idx",
                "ALTER TABLE film DROP COLUMN title",
                "DROP TABLE actor",
                "ALTER TABLE film ADD COLUMN rating INT",
            ]
        );
    }

    #[test]
    fn test_dependent_view_is_recreated() {
        let source = catalog(
            Dialect::Postgres,
            "table film {\n title string\n}\nview film_titles `SELECT title FROM film`\n",
        );
        let dest = catalog(
            Dialect::Postgres,
            "table film {\n title string type=VARCHAR(200)\n}\nview film_titles `SELECT title FROM film`\n",
        );
        let output = engine(Dialect::Postgres).diff(&source, &dest, true).unwrap();
        assert_eq!(
            statements(&output),
            vec![
                "DROP VIEW film_titles",
                "ALTER TABLE film ALTER COLUMN title TYPE VARCHAR(200)",
                "CREATE VIEW film_titles AS SELECT title FROM film",
            ]
        );
    }

    #[test]
    fn test_sqlite_rebuild() {
        let source = catalog(Dialect::Sqlite, "table film {\n film_id number\n title string\n}\n");
        let dest = catalog(
            Dialect::Sqlite,
            "table film {\n film_id number\n title string notnull index\n}\n",
        );
        let output = engine(Dialect::Sqlite).diff(&source, &dest, true).unwrap();
        assert_eq!(
            statements(&output),
            vec![
                "CREATE TABLE _strata_new_film (\n    film_id INT,\n    title TEXT NOT NULL\n)",
                "INSERT INTO _strata_new_film (film_id, title) SELECT film_id, title FROM film",
                "DROP TABLE film",
                "ALTER TABLE _strata_new_film RENAME TO film",
                "CREATE INDEX film_title_idx ON film (title)",
            ]
        );
    }

    #[test]
    fn test_sqlite_rebuild_keeps_dropped_columns_when_gated() {
        let source = catalog(Dialect::Sqlite, "table film {\n a number\n b string\n}\n");
        let dest = catalog(Dialect::Sqlite, "table film {\n a number notnull\n}\n");
        let output = engine(Dialect::Sqlite).diff(&source, &dest, false).unwrap();
        assert!(output.statements().next().unwrap().contains("b TEXT"));
        assert_eq!(
            output.warnings,
            vec!["DROP COLUMN film.b skipped: drop objects not enabled"]
        );
    }

    #[test]
    fn test_foreign_key_rule_change_recreates_constraint() {
        let source = catalog(
            Dialect::Mysql,
            "table a {\n id number primarykey\n}\ntable b {\n a_id number references=a.id\n}\n",
        );
        let dest = catalog(
            Dialect::Mysql,
            "table a {\n id number primarykey\n}\ntable b {\n a_id number references={a.id ondelete=cascade}\n}\n",
        );
        let output = engine(Dialect::Mysql).diff(&source, &dest, false).unwrap();
        assert!(output.warnings.is_empty());
        assert_eq!(
            statements(&output),
            vec![
                "ALTER TABLE b DROP FOREIGN KEY b_a_id_fkey",
                "ALTER TABLE b ADD CONSTRAINT b_a_id_fkey FOREIGN KEY (a_id) REFERENCES a (id) ON DELETE CASCADE",
            ]
        );
    }

    const BAR: &str = "table bar.x {\n    id number primarykey\n}\n";

    #[test]
    fn test_schema_is_created_before_its_tables() {
        for dialect in [Dialect::Postgres, Dialect::Mysql, Dialect::Sqlserver] {
            let output = engine(dialect)
                .diff(&Catalog::new(dialect), &catalog(dialect, BAR), false)
                .unwrap();
            let stmts = statements(&output);
            assert_eq!(stmts.len(), 2, "{dialect}: {stmts:?}");
            assert_eq!(stmts[0], "CREATE SCHEMA bar", "{dialect}");
            assert!(stmts[1].starts_with("CREATE TABLE bar.x"), "{dialect}: {stmts:?}");
            assert!(output.warnings.is_empty(), "{dialect}: {:?}", output.warnings);
        }
    }

    #[test]
    fn test_schema_is_dropped_after_its_tables() {
        for dialect in [Dialect::Postgres, Dialect::Mysql, Dialect::Sqlserver] {
            let source = catalog(dialect, BAR);
            let output = engine(dialect).diff(&source, &Catalog::new(dialect), true).unwrap();
            assert_eq!(statements(&output), vec!["DROP TABLE bar.x", "DROP SCHEMA bar"], "{dialect}");
            assert!(output.warnings.is_empty());

            let gated = engine(dialect).diff(&source, &Catalog::new(dialect), false).unwrap();
            assert!(gated.is_empty(), "{dialect}: {gated:?}");
            assert_eq!(
                gated.warnings,
                vec![
                    "DROP TABLE bar.x skipped: drop objects not enabled",
                    "DROP SCHEMA bar skipped: drop objects not enabled",
                ]
            );
        }
    }

    #[test]
    fn test_sqlite_schemas_are_attached_databases() {
        let dialect = Dialect::Sqlite;
        let output = engine(dialect)
            .diff(&Catalog::new(dialect), &catalog(dialect, BAR), false)
            .unwrap();
        let stmts = statements(&output);
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].starts_with("CREATE TABLE bar.x"), "{stmts:?}");
        assert_eq!(
            output.warnings,
            vec![
                "CREATE SCHEMA bar skipped: sqlite has no schemas, \
                 tables in bar need a database attached as bar"
            ]
        );

        let output = engine(dialect)
            .diff(&catalog(dialect, BAR), &Catalog::new(dialect), true)
            .unwrap();
        assert_eq!(statements(&output), vec!["DROP TABLE bar.x"]);
        assert_eq!(
            output.warnings,
            vec!["DROP SCHEMA bar skipped: sqlite has no schemas, detach bar instead"]
        );
    }
}
