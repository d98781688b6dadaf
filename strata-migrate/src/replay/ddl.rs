//! Applying DDL statements to the replayed catalog.

use strata_catalog::{
    Column, Constraint, ConstraintType, Dialect, Identity, Index, ReferentialAction, Table, View,
    generated_name,
};
use tracing::debug;

use super::Replayer;
use super::cursor::{Cursor, StepResult};
use crate::dialect::default_constraint_name;

/// Keywords that end a column's type.
const TYPE_STOP: &[&str] = &[
    "CONSTRAINT",
    "NOT",
    "NULL",
    "DEFAULT",
    "PRIMARY",
    "UNIQUE",
    "REFERENCES",
    "CHECK",
    "COLLATE",
    "GENERATED",
    "AS",
    "IDENTITY",
    "AUTO_INCREMENT",
    "AUTOINCREMENT",
    "ON",
    "COMMENT",
    "USING",
];

/// Keywords that end a default expression.
const DEFAULT_STOP: &[&str] = &[
    "NOT",
    "NULL",
    "CONSTRAINT",
    "PRIMARY",
    "UNIQUE",
    "REFERENCES",
    "CHECK",
    "COLLATE",
    "GENERATED",
    "AUTO_INCREMENT",
    "AUTOINCREMENT",
    "ON",
    "COMMENT",
    "IDENTITY",
    "FOR",
];

/// One parsed column definition.
struct ColumnDef {
    column: Column,
    constraints: Vec<Constraint>,
    /// Name of an inline SQL Server default constraint.
    default_constraint: Option<String>,
}

/// A table-level element of CREATE TABLE or ALTER TABLE ADD.
enum Element {
    Constraint(Constraint),
    Index(Index),
    /// `CONSTRAINT name DEFAULT expr FOR column`.
    Default {
        name: Option<String>,
        column: String,
        expr: String,
    },
    Skipped,
}

impl Replayer {
    /// Apply one statement. Statements that do not change structure are
    /// skipped.
    pub(super) fn apply_statement(&mut self, sql: &str) -> StepResult<()> {
        let mut cur = Cursor::new(sql, self.dialect)?;
        if cur.eat_keyword("CREATE") {
            let or_replace = cur.eat_keywords(&["OR", "REPLACE"]) || cur.eat_keywords(&["OR", "ALTER"]);
            for modifier in ["TEMP", "TEMPORARY", "UNLOGGED"] {
                cur.eat_keyword(modifier);
            }
            if cur.eat_keyword("SCHEMA") {
                return self.create_schema(&mut cur);
            }
            if cur.eat_keyword("TABLE") {
                return self.create_table(&mut cur);
            }
            if ["UNIQUE", "INDEX", "CLUSTERED", "NONCLUSTERED"]
                .iter()
                .any(|k| cur.is_keyword(k))
            {
                return self.create_index(&mut cur, sql);
            }
            if cur.eat_keyword("VIEW") {
                return self.create_view(&mut cur, or_replace);
            }
            if cur.eat_keyword("TYPE") {
                return self.create_type(&mut cur);
            }
        } else if cur.eat_keyword("DROP") {
            if cur.eat_keyword("SCHEMA") {
                return self.drop_schema(&mut cur);
            }
            if cur.eat_keyword("TABLE") {
                return self.drop_table(&mut cur);
            }
            if cur.eat_keyword("INDEX") {
                return self.drop_index(&mut cur);
            }
            if cur.eat_keyword("VIEW") {
                return self.drop_view(&mut cur);
            }
            if cur.eat_keyword("TYPE") {
                return self.drop_type(&mut cur);
            }
        } else if cur.eat_keyword("ALTER") {
            if cur.eat_keyword("TABLE") {
                return self.alter_table(&mut cur);
            }
            if cur.eat_keyword("VIEW") {
                return self.create_view(&mut cur, true);
            }
        } else if cur.eat_keyword("EXEC") || cur.eat_keyword("EXECUTE") {
            if let Some(token) = cur.peek() {
                if token.text.eq_ignore_ascii_case("sp_rename") {
                    return self.sp_rename(&mut cur);
                }
            }
        }
        debug!(statement = %summary(sql), "skipping statement");
        Ok(())
    }

    fn schema_name(&self, schema: String) -> String {
        if !schema.is_empty() && self.dialect.names_equal(&schema, self.dialect.default_schema()) {
            String::new()
        } else {
            schema
        }
    }

    fn qualified(&self, cur: &mut Cursor<'_>) -> StepResult<(String, String)> {
        let (schema, name) = cur.qualified_name()?;
        Ok((self.schema_name(schema), name))
    }

    fn table_mut(&mut self, schema: &str, name: &str) -> StepResult<&mut Table> {
        self.catalog
            .table_mut(schema, name)
            .ok_or_else(|| format!("table {} does not exist", object_name(schema, name)))
    }

    fn create_schema(&mut self, cur: &mut Cursor<'_>) -> StepResult<()> {
        let if_not_exists = cur.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let name = cur.identifier()?;
        let name = self.schema_name(name);
        if self.catalog.schema(&name).is_some() {
            if if_not_exists || name.is_empty() {
                return Ok(());
            }
            return Err(format!("schema {name} already exists"));
        }
        self.catalog.schema_or_insert(&name);
        Ok(())
    }

    fn drop_schema(&mut self, cur: &mut Cursor<'_>) -> StepResult<()> {
        let if_exists = cur.eat_keywords(&["IF", "EXISTS"]);
        loop {
            let name = cur.identifier()?;
            let name = self.schema_name(name);
            let dialect = self.dialect;
            let before = self.catalog.schemas.len();
            self.catalog
                .schemas
                .retain(|s| !dialect.names_equal(&s.schema_name, &name));
            if self.catalog.schemas.len() == before && !if_exists {
                return Err(format!("schema {name} does not exist"));
            }
            if !cur.eat_symbol(',') {
                return Ok(());
            }
        }
    }

    fn create_type(&mut self, cur: &mut Cursor<'_>) -> StepResult<()> {
        let (_, name) = self.qualified(cur)?;
        if cur.eat_keywords(&["AS", "ENUM"]) {
            self.enum_types.insert(self.dialect.fold(&name));
        }
        Ok(())
    }

    fn drop_type(&mut self, cur: &mut Cursor<'_>) -> StepResult<()> {
        cur.eat_keywords(&["IF", "EXISTS"]);
        loop {
            let (_, name) = self.qualified(cur)?;
            self.enum_types.remove(&self.dialect.fold(&name));
            if !cur.eat_symbol(',') {
                return Ok(());
            }
        }
    }

    fn create_table(&mut self, cur: &mut Cursor<'_>) -> StepResult<()> {
        let if_not_exists = cur.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let (schema, name) = self.qualified(cur)?;
        if !cur.is_symbol('(') {
            debug!(table = %name, "skipping CREATE TABLE without a column list");
            return Ok(());
        }
        if self.catalog.table(&schema, &name).is_some() {
            if if_not_exists {
                return Ok(());
            }
            return Err(format!("table {} already exists", object_name(&schema, &name)));
        }

        let mut table = Table::new(schema.clone(), name.clone());
        cur.expect_symbol('(')?;
        loop {
            if is_element_start(cur) {
                match self.table_element(cur, &name)? {
                    Element::Constraint(constraint) => table.constraints.push(constraint),
                    Element::Index(index) => table.indexes.push(index),
                    Element::Default { .. } | Element::Skipped => {}
                }
            } else {
                let def = self.column_definition(cur, &name)?;
                if table.column(self.dialect, &def.column.column_name).is_some() {
                    return Err(format!(
                        "column {name}.{} is defined more than once",
                        def.column.column_name
                    ));
                }
                if let Some(constraint_name) = def.default_constraint {
                    self.record_default(&schema, &name, &constraint_name, &def.column.column_name);
                }
                table.columns.push(def.column);
                table.constraints.extend(def.constraints);
            }
            if !cur.eat_symbol(',') {
                break;
            }
        }
        cur.expect_symbol(')')?;
        mark_primary_key_not_null(self.dialect, &mut table);
        debug!(
            table = %object_name(&schema, &name),
            columns = table.columns.len(),
            "replayed CREATE TABLE"
        );
        self.catalog.schema_or_insert(&schema).tables.push(table);
        Ok(())
    }

    fn drop_table(&mut self, cur: &mut Cursor<'_>) -> StepResult<()> {
        let if_exists = cur.eat_keywords(&["IF", "EXISTS"]);
        loop {
            let (schema, name) = self.qualified(cur)?;
            let dialect = self.dialect;
            let removed = match self.catalog.schema_mut(&schema) {
                Some(s) => {
                    let before = s.tables.len();
                    s.tables.retain(|t| !dialect.names_equal(&t.table_name, &name));
                    before != s.tables.len()
                }
                None => false,
            };
            if !removed && !if_exists {
                return Err(format!("table {} does not exist", object_name(&schema, &name)));
            }
            if !cur.eat_symbol(',') {
                return Ok(());
            }
        }
    }

    fn create_view(&mut self, cur: &mut Cursor<'_>, or_replace: bool) -> StepResult<()> {
        if cur.eat_keyword("MATERIALIZED") {
            debug!("skipping materialized view");
            return Ok(());
        }
        let if_not_exists = cur.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let (schema, name) = self.qualified(cur)?;
        if cur.is_symbol('(') {
            cur.skip_group()?;
        }
        if cur.eat_keyword("WITH") {
            while !cur.at_end() && !cur.is_keyword("AS") {
                cur.advance();
            }
        }
        cur.expect_keyword("AS")?;
        let sql = cur.rest();
        let dialect = self.dialect;
        let target = self.catalog.schema_or_insert(&schema);
        match target
            .views
            .iter_mut()
            .find(|v| dialect.names_equal(&v.view_name, &name))
        {
            Some(_) if if_not_exists => {}
            Some(existing) if or_replace => existing.sql = sql,
            Some(_) => return Err(format!("view {} already exists", object_name(&schema, &name))),
            None => target.views.push(View {
                view_schema: schema.clone(),
                view_name: name,
                sql,
                ignore: false,
            }),
        }
        Ok(())
    }

    fn drop_view(&mut self, cur: &mut Cursor<'_>) -> StepResult<()> {
        let if_exists = cur.eat_keywords(&["IF", "EXISTS"]);
        loop {
            let (schema, name) = self.qualified(cur)?;
            let dialect = self.dialect;
            let removed = match self.catalog.schema_mut(&schema) {
                Some(s) => {
                    let before = s.views.len();
                    s.views.retain(|v| !dialect.names_equal(&v.view_name, &name));
                    before != s.views.len()
                }
                None => false,
            };
            if !removed && !if_exists {
                return Err(format!("view {} does not exist", object_name(&schema, &name)));
            }
            if !cur.eat_symbol(',') {
                return Ok(());
            }
        }
    }

    fn create_index(&mut self, cur: &mut Cursor<'_>, statement: &str) -> StepResult<()> {
        let is_unique = cur.eat_keyword("UNIQUE");
        let mut index_type = String::new();
        for kind in ["CLUSTERED", "NONCLUSTERED"] {
            if cur.eat_keyword(kind) {
                index_type = kind.to_string();
            }
        }
        cur.expect_keyword("INDEX")?;
        cur.eat_keyword("CONCURRENTLY");
        let if_not_exists = cur.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let (_, index_name) = cur.qualified_name()?;
        cur.expect_keyword("ON")?;
        cur.eat_keyword("ONLY");
        let (schema, table_name) = self.qualified(cur)?;
        if cur.eat_keyword("USING") {
            index_type = cur.identifier()?.to_ascii_uppercase();
        }

        let mut index = Index {
            index_name,
            index_type,
            is_unique,
            ..Default::default()
        };
        self.index_parts(cur, &mut index)?;
        while !cur.at_end() {
            if cur.eat_keyword("INCLUDE") {
                index.include_columns = cur.identifier_list()?;
            } else if cur.eat_keyword("WHERE") {
                index.predicate = cur.rest();
            } else if cur.eat_keyword("USING") {
                index.index_type = cur.identifier()?.to_ascii_uppercase();
            } else {
                cur.advance();
            }
        }
        if !index.is_simple() {
            index.sql = statement.trim().trim_end_matches(';').trim_end().to_string();
        }

        let dialect = self.dialect;
        let table = self.table_mut(&schema, &table_name)?;
        if table.index(dialect, &index.index_name).is_some() {
            if if_not_exists {
                return Ok(());
            }
            return Err(format!("index {} already exists", index.index_name));
        }
        table.indexes.push(index);
        Ok(())
    }

    /// The parenthesized key list of an index.
    fn index_parts(&self, cur: &mut Cursor<'_>, index: &mut Index) -> StepResult<()> {
        cur.expect_symbol('(')?;
        let mut descending = Vec::new();
        let mut opclasses = Vec::new();
        loop {
            let column = if cur.is_symbol('(') {
                cur.group_with_parens()?
            } else {
                let start = cur.position();
                let name = cur.identifier()?;
                if cur.is_symbol('(') {
                    let args = cur.group_text()?;
                    if self.dialect == Dialect::Mysql && args.chars().all(|c| c.is_ascii_digit()) {
                        // Prefix length.
                        name
                    } else {
                        format!("({})", cur.text(start, cur.position()))
                    }
                } else {
                    name
                }
            };
            let mut desc = false;
            let mut opclass = String::new();
            while !cur.at_end() && !cur.is_symbol(',') && !cur.is_symbol(')') {
                if cur.eat_keyword("DESC") {
                    desc = true;
                } else if cur.eat_keyword("ASC") {
                } else if cur.eat_keyword("NULLS") || cur.eat_keyword("COLLATE") {
                    cur.advance();
                } else if let Some(token) = cur.advance() {
                    opclass = match self.dialect {
                        Dialect::Postgres => token.text.to_lowercase(),
                        _ => token.text,
                    };
                }
            }
            index.columns.push(column);
            descending.push(desc);
            opclasses.push(opclass);
            if !cur.eat_symbol(',') {
                break;
            }
        }
        cur.expect_symbol(')')?;
        if descending.iter().any(|d| *d) {
            index.descending = descending;
        }
        if opclasses.iter().any(|o| !o.is_empty()) {
            index.opclasses = opclasses;
        }
        Ok(())
    }

    fn drop_index(&mut self, cur: &mut Cursor<'_>) -> StepResult<()> {
        cur.eat_keyword("CONCURRENTLY");
        let if_exists = cur.eat_keywords(&["IF", "EXISTS"]);
        let (schema, name) = self.qualified(cur)?;
        let dialect = self.dialect;

        let removed = if cur.eat_keyword("ON") {
            let (table_schema, table_name) = self.qualified(cur)?;
            match self.catalog.table_mut(&table_schema, &table_name) {
                Some(table) => remove_index(dialect, table, &name),
                None if if_exists => false,
                None => {
                    return Err(format!(
                        "table {} does not exist",
                        object_name(&table_schema, &table_name)
                    ));
                }
            }
        } else {
            let in_schema = self
                .catalog
                .schema_mut(&schema)
                .is_some_and(|s| s.tables.iter_mut().any(|t| remove_index(dialect, t, &name)));
            // SQL Server's older `DROP INDEX table.index` form.
            in_schema
                || self
                    .catalog
                    .table_mut("", &schema)
                    .is_some_and(|t| remove_index(dialect, t, &name))
        };
        if !removed && !if_exists {
            return Err(format!("index {name} does not exist"));
        }
        Ok(())
    }

    fn alter_table(&mut self, cur: &mut Cursor<'_>) -> StepResult<()> {
        let if_exists = cur.eat_keywords(&["IF", "EXISTS"]);
        cur.eat_keyword("ONLY");
        let (schema, mut name) = self.qualified(cur)?;
        if self.catalog.table(&schema, &name).is_none() {
            if if_exists {
                return Ok(());
            }
            return Err(format!("table {} does not exist", object_name(&schema, &name)));
        }
        loop {
            if let Some(renamed) = self.alter_action(cur, &schema, &name)? {
                name = renamed;
            }
            if !cur.eat_symbol(',') {
                return Ok(());
            }
        }
    }

    /// One ALTER TABLE action. Returns the new table name after a rename.
    fn alter_action(
        &mut self,
        cur: &mut Cursor<'_>,
        schema: &str,
        table_name: &str,
    ) -> StepResult<Option<String>> {
        let dialect = self.dialect;
        if cur.eat_keyword("ADD") {
            if is_element_start(cur) {
                let element = self.table_element(cur, table_name)?;
                self.add_element(schema, table_name, element)?;
                return Ok(None);
            }
            cur.eat_keyword("COLUMN");
            let if_not_exists = cur.eat_keywords(&["IF", "NOT", "EXISTS"]);
            let def = self.column_definition(cur, table_name)?;
            if let Some(constraint_name) = &def.default_constraint {
                self.record_default(schema, table_name, constraint_name, &def.column.column_name);
            }
            let table = self.table_mut(schema, table_name)?;
            if table.column(dialect, &def.column.column_name).is_some() {
                if if_not_exists {
                    return Ok(None);
                }
                return Err(format!(
                    "column {table_name}.{} already exists",
                    def.column.column_name
                ));
            }
            table.columns.push(def.column);
            table.constraints.extend(def.constraints);
            mark_primary_key_not_null(dialect, table);
            return Ok(None);
        }

        if cur.eat_keyword("DROP") {
            if cur.eat_keyword("CONSTRAINT") {
                let if_exists = cur.eat_keywords(&["IF", "EXISTS"]);
                let name = cur.identifier()?;
                self.drop_constraint(schema, table_name, &name, if_exists)?;
            } else if cur.eat_keywords(&["FOREIGN", "KEY"]) {
                let name = cur.identifier()?;
                self.drop_constraint(schema, table_name, &name, false)?;
            } else if cur.eat_keywords(&["PRIMARY", "KEY"]) {
                let table = self.table_mut(schema, table_name)?;
                let before = table.constraints.len();
                table.constraints.retain(|c| !c.is_primary_key());
                if table.constraints.len() == before {
                    return Err(format!("table {table_name} has no primary key"));
                }
            } else if cur.eat_keyword("INDEX") || cur.eat_keyword("KEY") {
                let name = cur.identifier()?;
                let table = self.table_mut(schema, table_name)?;
                let removed = remove_index(dialect, table, &name) || {
                    let before = table.constraints.len();
                    table.constraints.retain(|c| {
                        !(c.constraint_type == ConstraintType::Unique
                            && dialect.names_equal(&c.constraint_name, &name))
                    });
                    before != table.constraints.len()
                };
                if !removed {
                    return Err(format!("index {name} does not exist on {table_name}"));
                }
            } else {
                cur.eat_keyword("COLUMN");
                let if_exists = cur.eat_keywords(&["IF", "EXISTS"]);
                let name = cur.identifier()?;
                let table = self.table_mut(schema, table_name)?;
                if table.column(dialect, &name).is_none() {
                    if if_exists {
                        return Ok(None);
                    }
                    return Err(format!("column {table_name}.{name} does not exist"));
                }
                drop_column(dialect, table, &name);
            }
            cur.eat_keyword("CASCADE");
            cur.eat_keyword("RESTRICT");
            return Ok(None);
        }

        if cur.eat_keyword("ALTER") {
            cur.eat_keyword("COLUMN");
            let name = cur.identifier()?;
            self.alter_column(cur, schema, table_name, &name)?;
            return Ok(None);
        }

        if cur.eat_keyword("MODIFY") {
            cur.eat_keyword("COLUMN");
            let def = self.column_definition(cur, table_name)?;
            let name = def.column.column_name.clone();
            self.replace_column(schema, table_name, &name, def)?;
            return Ok(None);
        }

        if cur.eat_keyword("CHANGE") {
            cur.eat_keyword("COLUMN");
            let old = cur.identifier()?;
            let def = self.column_definition(cur, table_name)?;
            self.replace_column(schema, table_name, &old, def)?;
            return Ok(None);
        }

        if cur.eat_keyword("RENAME") {
            if cur.eat_keyword("TO") || cur.eat_keyword("AS") {
                let (_, new_name) = cur.qualified_name()?;
                self.rename_table(schema, table_name, &new_name)?;
                return Ok(Some(new_name));
            }
            if cur.eat_keyword("CONSTRAINT") {
                let old = cur.identifier()?;
                cur.expect_keyword("TO")?;
                let new = cur.identifier()?;
                let table = self.table_mut(schema, table_name)?;
                let constraint = table
                    .constraints
                    .iter_mut()
                    .find(|c| dialect.names_equal(&c.constraint_name, &old))
                    .ok_or_else(|| format!("constraint {old} does not exist on {table_name}"))?;
                constraint.constraint_name = new;
                return Ok(None);
            }
            cur.eat_keyword("COLUMN");
            let old = cur.identifier()?;
            cur.expect_keyword("TO")?;
            let new = cur.identifier()?;
            self.rename_column(schema, table_name, &old, &new)?;
            return Ok(None);
        }

        debug!(table = table_name, action = %cur.describe(), "skipping ALTER TABLE action");
        cur.skip_to_comma()?;
        Ok(None)
    }

    fn alter_column(
        &mut self,
        cur: &mut Cursor<'_>,
        schema: &str,
        table_name: &str,
        name: &str,
    ) -> StepResult<()> {
        let dialect = self.dialect;
        let enum_type = |ty: &str| self.enum_types.contains(&dialect.fold(ty));
        let is_typed = cur.eat_keywords(&["SET", "DATA", "TYPE"]) || cur.eat_keyword("TYPE");
        let sqlserver_style = !is_typed
            && !["SET", "DROP", "ADD"].iter().any(|k| cur.is_keyword(k));

        let mut new_type = None;
        let mut collation = None;
        if is_typed || sqlserver_style {
            let ty = type_text(cur);
            if ty.is_empty() {
                return Err(format!("expected a type for column {table_name}.{name}"));
            }
            if cur.eat_keyword("COLLATE") {
                collation = Some(cur.identifier()?);
            }
            if cur.eat_keyword("USING") {
                cur.expression(&[])?;
            }
            new_type = Some((enum_type(&ty), ty));
        }

        let table = self.table_mut(schema, table_name)?;
        let column = table
            .column_mut(dialect, name)
            .ok_or_else(|| format!("column {table_name}.{name} does not exist"))?;

        if let Some((is_enum, ty)) = new_type {
            column.column_type = ty;
            column.is_enum = is_enum;
            column.collation_name = collation;
            if sqlserver_style {
                column.is_not_null = cur.eat_keywords(&["NOT", "NULL"]);
                cur.eat_keyword("NULL");
            }
        } else if cur.eat_keywords(&["SET", "NOT", "NULL"]) {
            column.is_not_null = true;
        } else if cur.eat_keywords(&["DROP", "NOT", "NULL"]) {
            column.is_not_null = false;
        } else if cur.eat_keywords(&["SET", "DEFAULT"]) {
            column.column_default = Some(cur.expression(&[])?);
        } else if cur.eat_keywords(&["DROP", "DEFAULT"]) {
            column.column_default = None;
        } else if cur.eat_keywords(&["ADD", "GENERATED"]) {
            column.identity = identity_kind(cur)?;
            cur.expect_keyword("AS")?;
            cur.expect_keyword("IDENTITY")?;
            if cur.is_symbol('(') {
                cur.skip_group()?;
            }
        } else if cur.eat_keywords(&["DROP", "IDENTITY"]) {
            cur.eat_keywords(&["IF", "EXISTS"]);
            column.identity = Identity::None;
        } else if cur.eat_keywords(&["SET", "GENERATED"]) {
            column.identity = identity_kind(cur)?;
        } else if cur.eat_keywords(&["DROP", "EXPRESSION"]) {
            column.is_generated = false;
            column.generated_expr = None;
        } else {
            debug!(table = table_name, column = name, action = %cur.describe(), "skipping ALTER COLUMN action");
            cur.skip_to_comma()?;
        }
        Ok(())
    }

    fn replace_column(
        &mut self,
        schema: &str,
        table_name: &str,
        old: &str,
        def: ColumnDef,
    ) -> StepResult<()> {
        let dialect = self.dialect;
        if !dialect.names_equal(old, &def.column.column_name) {
            self.rename_column(schema, table_name, old, &def.column.column_name)?;
        }
        let table = self.table_mut(schema, table_name)?;
        let column = table
            .column_mut(dialect, &def.column.column_name)
            .ok_or_else(|| format!("column {table_name}.{old} does not exist"))?;
        *column = def.column;
        for constraint in def.constraints {
            if table
                .constraint_on(dialect, constraint.constraint_type, &constraint.columns)
                .is_none()
            {
                table.constraints.push(constraint);
            }
        }
        mark_primary_key_not_null(dialect, table);
        Ok(())
    }

    fn rename_column(&mut self, schema: &str, table_name: &str, old: &str, new: &str) -> StepResult<()> {
        let dialect = self.dialect;
        let table = self.table_mut(schema, table_name)?;
        let column = table
            .column_mut(dialect, old)
            .ok_or_else(|| format!("column {table_name}.{old} does not exist"))?;
        column.column_name = new.to_string();
        let rename = |names: &mut Vec<String>| {
            for name in names.iter_mut().filter(|n| dialect.names_equal(n, old)) {
                *name = new.to_string();
            }
        };
        for constraint in &mut table.constraints {
            rename(&mut constraint.columns);
        }
        for index in &mut table.indexes {
            rename(&mut index.columns);
            rename(&mut index.include_columns);
        }
        // Foreign keys elsewhere follow the renamed column.
        for other in self.catalog.schemas.iter_mut().flat_map(|s| s.tables.iter_mut()) {
            for constraint in other.constraints.iter_mut().filter(|c| {
                c.is_foreign_key()
                    && dialect.names_equal(&c.references_table, table_name)
                    && dialect.names_equal(&c.references_schema, schema)
            }) {
                rename(&mut constraint.references_columns);
            }
        }
        Ok(())
    }

    fn rename_table(&mut self, schema: &str, old: &str, new: &str) -> StepResult<()> {
        let dialect = self.dialect;
        if self.catalog.table(schema, new).is_some() {
            return Err(format!("table {} already exists", object_name(schema, new)));
        }
        let table = self.table_mut(schema, old)?;
        table.table_name = new.to_string();
        if dialect == Dialect::Sqlite {
            // Inline constraints are unnamed in SQLite and follow the table.
            for constraint in &mut table.constraints {
                let suffix = constraint.constraint_type.name_suffix();
                if constraint.constraint_name == generated_name(old, &constraint.columns, suffix) {
                    constraint.constraint_name = generated_name(new, &constraint.columns, suffix);
                }
            }
        }
        for table in self.catalog.schemas.iter_mut().flat_map(|s| s.tables.iter_mut()) {
            for constraint in table.constraints.iter_mut().filter(|c| {
                c.is_foreign_key()
                    && dialect.names_equal(&c.references_table, old)
                    && dialect.names_equal(&c.references_schema, schema)
            }) {
                constraint.references_table = new.to_string();
            }
        }
        debug!(from = old, to = new, "replayed table rename");
        Ok(())
    }

    fn drop_constraint(
        &mut self,
        schema: &str,
        table_name: &str,
        name: &str,
        if_exists: bool,
    ) -> StepResult<()> {
        let dialect = self.dialect;
        let key = self.default_key(schema, table_name, name);
        let recorded = self.default_constraints.remove(&key);
        let table = self.table_mut(schema, table_name)?;

        let before = table.constraints.len();
        table
            .constraints
            .retain(|c| !dialect.names_equal(&c.constraint_name, name));
        if table.constraints.len() != before {
            return Ok(());
        }

        let column = match recorded {
            Some(column) => table.column_mut(dialect, &column),
            None => table.columns.iter_mut().find(|c| {
                c.column_default.is_some()
                    && dialect.names_equal(
                        &default_constraint_name(table_name, &c.column_name),
                        name,
                    )
            }),
        };
        match column {
            Some(column) => {
                column.column_default = None;
                Ok(())
            }
            None if if_exists => Ok(()),
            None => Err(format!("constraint {name} does not exist on {table_name}")),
        }
    }

    fn add_element(&mut self, schema: &str, table_name: &str, element: Element) -> StepResult<()> {
        let dialect = self.dialect;
        match element {
            Element::Constraint(constraint) => {
                let table = self.table_mut(schema, table_name)?;
                if constraint.is_primary_key() && table.primary_key().is_some() {
                    return Err(format!("table {table_name} already has a primary key"));
                }
                for column in &constraint.columns {
                    if table.column(dialect, column).is_none() {
                        return Err(format!(
                            "constraint {} names unknown column {table_name}.{column}",
                            constraint.constraint_name
                        ));
                    }
                }
                table.constraints.push(constraint);
                mark_primary_key_not_null(dialect, table);
            }
            Element::Index(index) => self.table_mut(schema, table_name)?.indexes.push(index),
            Element::Default { name, column, expr } => {
                if let Some(name) = &name {
                    self.record_default(schema, table_name, name, &column);
                }
                let table = self.table_mut(schema, table_name)?;
                let target = table
                    .column_mut(dialect, &column)
                    .ok_or_else(|| format!("column {table_name}.{column} does not exist"))?;
                target.column_default = Some(expr);
            }
            Element::Skipped => {}
        }
        Ok(())
    }

    /// `EXEC sp_rename 'schema.table', 'new'` and the `'COLUMN'` form.
    fn sp_rename(&mut self, cur: &mut Cursor<'_>) -> StepResult<()> {
        cur.advance();
        let mut args = Vec::new();
        while let Some(token) = cur.advance() {
            if token.kind == super::lexer::TokenKind::Str {
                args.push(unquote_string(&token.text));
            }
        }
        let [object, new_name, rest @ ..] = args.as_slice() else {
            return Err("sp_rename needs an object and a new name".to_string());
        };
        let mut parts: Vec<String> = object
            .split('.')
            .map(|p| p.trim_matches(|c| c == '[' || c == ']').to_string())
            .collect();
        let is_column = rest.first().is_some_and(|kind| kind.eq_ignore_ascii_case("COLUMN"));
        if is_column {
            let column = parts.pop().unwrap_or_default();
            let table = parts.pop().unwrap_or_default();
            let schema = self.schema_name(parts.pop().unwrap_or_default());
            return self.rename_column(&schema, &table, &column, new_name);
        }
        let table = parts.pop().unwrap_or_default();
        let schema = self.schema_name(parts.pop().unwrap_or_default());
        self.rename_table(&schema, &table, new_name)
    }

    fn default_key(&self, schema: &str, table: &str, name: &str) -> String {
        format!(
            "{}.{}.{}",
            self.dialect.fold(schema),
            self.dialect.fold(table),
            self.dialect.fold(name)
        )
    }

    fn record_default(&mut self, schema: &str, table: &str, name: &str, column: &str) {
        let key = self.default_key(schema, table, name);
        self.default_constraints.insert(key, column.to_string());
    }

    fn column_definition(&self, cur: &mut Cursor<'_>, table: &str) -> StepResult<ColumnDef> {
        let name = cur.identifier()?;
        let mut column = Column::new(name.clone(), type_text(cur));
        column.is_enum = self.enum_types.contains(&self.dialect.fold(&column.column_type));
        let mut def = ColumnDef {
            column,
            constraints: Vec::new(),
            default_constraint: None,
        };
        let own = vec![name];
        let mut constraint_name: Option<String> = None;
        let column = &mut def.column;

        loop {
            if cur.eat_keyword("CONSTRAINT") {
                constraint_name = Some(cur.identifier()?);
                continue;
            }
            if cur.eat_keywords(&["NOT", "NULL"]) {
                column.is_not_null = true;
            } else if cur.eat_keyword("NULL") {
                column.is_not_null = false;
            } else if cur.eat_keyword("DEFAULT") {
                column.column_default = Some(cur.expression(DEFAULT_STOP)?);
                def.default_constraint = constraint_name.take();
            } else if cur.eat_keywords(&["PRIMARY", "KEY"]) {
                for word in ["ASC", "DESC", "CLUSTERED", "NONCLUSTERED"] {
                    cur.eat_keyword(word);
                }
                if cur.eat_keyword("AUTOINCREMENT") {
                    column.is_autoincrement = true;
                }
                let mut pk = Constraint::new(table, ConstraintType::PrimaryKey, own.clone());
                if let Some(name) = constraint_name.take() {
                    pk.constraint_name = name;
                }
                def.constraints.push(pk);
            } else if cur.eat_keyword("UNIQUE") {
                cur.eat_keyword("KEY");
                let mut unique = Constraint::new(table, ConstraintType::Unique, own.clone());
                if let Some(name) = constraint_name.take() {
                    unique.constraint_name = name;
                }
                def.constraints.push(unique);
            } else if cur.is_keyword("REFERENCES") {
                let mut fk = self.references(cur, table, own.clone())?;
                if let Some(name) = constraint_name.take() {
                    fk.constraint_name = name;
                }
                def.constraints.push(fk);
            } else if cur.eat_keyword("CHECK") {
                cur.skip_group()?;
                constraint_name = None;
            } else if cur.eat_keyword("COLLATE") {
                column.collation_name = Some(cur.identifier()?);
            } else if cur.eat_keyword("GENERATED") {
                let identity = identity_kind(cur)?;
                cur.expect_keyword("AS")?;
                if cur.eat_keyword("IDENTITY") {
                    column.identity = identity;
                    if cur.is_symbol('(') {
                        cur.skip_group()?;
                    }
                } else {
                    column.is_generated = true;
                    column.generated_expr = Some(cur.group_text()?);
                    let _ = cur.eat_keyword("STORED") || cur.eat_keyword("VIRTUAL");
                }
            } else if cur.eat_keyword("AS") {
                column.is_generated = true;
                column.generated_expr = Some(cur.group_text()?);
                for word in ["PERSISTED", "STORED", "VIRTUAL"] {
                    cur.eat_keyword(word);
                }
            } else if cur.eat_keyword("IDENTITY") {
                column.identity = Identity::ByDefault;
                if cur.is_symbol('(') {
                    cur.skip_group()?;
                }
            } else if cur.eat_keyword("AUTO_INCREMENT") || cur.eat_keyword("AUTOINCREMENT") {
                column.is_autoincrement = true;
            } else if cur.eat_keywords(&["ON", "UPDATE"]) {
                let expr = cur.expression(DEFAULT_STOP)?.to_ascii_uppercase();
                column.on_update_current_timestamp =
                    expr.starts_with("CURRENT_TIMESTAMP") || expr.starts_with("NOW");
            } else if cur.eat_keyword("COMMENT") {
                cur.advance();
            } else {
                break;
            }
        }
        Ok(def)
    }

    /// `REFERENCES table [(columns)] [ON DELETE ..] [ON UPDATE ..] [DEFERRABLE ..]`.
    fn references(
        &self,
        cur: &mut Cursor<'_>,
        table: &str,
        columns: Vec<String>,
    ) -> StepResult<Constraint> {
        cur.expect_keyword("REFERENCES")?;
        let (schema, target) = self.qualified(cur)?;
        let references_columns = if cur.is_symbol('(') {
            cur.identifier_list()?
        } else {
            // Without a list the target's primary key is referenced.
            self.catalog
                .table(&schema, &target)
                .and_then(Table::primary_key)
                .map(|pk| pk.columns.clone())
                .unwrap_or_else(|| columns.clone())
        };
        let mut fk = Constraint::foreign_key(table, columns, schema, target, references_columns);
        loop {
            if cur.eat_keywords(&["ON", "DELETE"]) {
                fk.delete_rule = referential_action(cur)?;
            } else if cur.eat_keywords(&["ON", "UPDATE"]) {
                fk.update_rule = referential_action(cur)?;
            } else if cur.eat_keywords(&["NOT", "DEFERRABLE"]) {
                fk.is_deferrable = false;
            } else if cur.eat_keyword("DEFERRABLE") {
                fk.is_deferrable = true;
            } else if cur.eat_keywords(&["INITIALLY", "DEFERRED"]) {
                fk.is_initially_deferred = true;
            } else if cur.eat_keywords(&["INITIALLY", "IMMEDIATE"]) {
                fk.is_initially_deferred = false;
            } else if cur.eat_keyword("MATCH") {
                cur.advance();
            } else {
                return Ok(fk);
            }
        }
    }

    fn table_element(&self, cur: &mut Cursor<'_>, table: &str) -> StepResult<Element> {
        let mut name = if cur.eat_keyword("CONSTRAINT") {
            Some(cur.identifier()?)
        } else {
            None
        };
        let named = |mut constraint: Constraint, name: Option<String>| {
            if let Some(name) = name {
                constraint.constraint_name = name;
            }
            Element::Constraint(constraint)
        };

        if cur.eat_keywords(&["PRIMARY", "KEY"]) {
            for word in ["CLUSTERED", "NONCLUSTERED"] {
                cur.eat_keyword(word);
            }
            let columns = cur.identifier_list()?;
            return Ok(named(Constraint::new(table, ConstraintType::PrimaryKey, columns), name));
        }
        if cur.eat_keyword("UNIQUE") {
            let _ = cur.eat_keyword("KEY") || cur.eat_keyword("INDEX");
            for word in ["CLUSTERED", "NONCLUSTERED"] {
                cur.eat_keyword(word);
            }
            if !cur.is_symbol('(') {
                let index_name = cur.identifier()?;
                name.get_or_insert(index_name);
            }
            let columns = cur.identifier_list()?;
            return Ok(named(Constraint::new(table, ConstraintType::Unique, columns), name));
        }
        if cur.eat_keywords(&["FOREIGN", "KEY"]) {
            if !cur.is_symbol('(') {
                cur.identifier()?;
            }
            let columns = cur.identifier_list()?;
            let fk = self.references(cur, table, columns)?;
            return Ok(named(fk, name));
        }
        if cur.eat_keyword("CHECK") {
            cur.skip_group()?;
            return Ok(Element::Skipped);
        }
        if cur.eat_keyword("DEFAULT") {
            let expr = cur.expression(&["FOR"])?;
            cur.expect_keyword("FOR")?;
            let column = cur.identifier()?;
            return Ok(Element::Default { name, column, expr });
        }
        if cur.eat_keyword("INDEX") || cur.eat_keyword("KEY") {
            let mut index = Index::default();
            if !cur.is_symbol('(') {
                index.index_name = cur.identifier()?;
            }
            self.index_parts(cur, &mut index)?;
            if index.index_name.is_empty() {
                index.index_name = generated_name(table, &index.columns, "idx");
            }
            if cur.eat_keyword("USING") {
                index.index_type = cur.identifier()?.to_ascii_uppercase();
            }
            return Ok(Element::Index(index));
        }
        debug!(table, element = %cur.describe(), "skipping table element");
        cur.skip_to_comma()?;
        Ok(Element::Skipped)
    }
}

/// Whether the cursor is at a table-level element rather than a column.
fn is_element_start(cur: &Cursor<'_>) -> bool {
    ["CONSTRAINT", "UNIQUE", "CHECK", "INDEX", "KEY", "FULLTEXT", "SPATIAL"]
        .iter()
        .any(|k| cur.is_keyword(k))
        || (cur.is_keyword("PRIMARY") && cur.is_keyword_at(1, "KEY"))
        || (cur.is_keyword("FOREIGN") && cur.is_keyword_at(1, "KEY"))
}

/// The raw type text up to the first column attribute.
fn type_text(cur: &mut Cursor<'_>) -> String {
    let start = cur.position();
    while let Some(token) = cur.peek() {
        if token.is_symbol(',') || token.is_symbol(')') || token.is_symbol(';') {
            break;
        }
        if TYPE_STOP.iter().any(|k| token.is_keyword(k)) {
            break;
        }
        if token.is_symbol('(') {
            if cur.skip_group().is_err() {
                break;
            }
        } else {
            cur.advance();
        }
    }
    cur.text(start, cur.position())
}

/// `ALWAYS` or `BY DEFAULT`.
fn identity_kind(cur: &mut Cursor<'_>) -> StepResult<Identity> {
    if cur.eat_keyword("ALWAYS") {
        Ok(Identity::Always)
    } else if cur.eat_keywords(&["BY", "DEFAULT"]) {
        Ok(Identity::ByDefault)
    } else {
        Err(format!("expected ALWAYS or BY DEFAULT, found {}", cur.describe()))
    }
}

fn referential_action(cur: &mut Cursor<'_>) -> StepResult<ReferentialAction> {
    if cur.eat_keyword("CASCADE") {
        Ok(ReferentialAction::Cascade)
    } else if cur.eat_keyword("RESTRICT") {
        Ok(ReferentialAction::Restrict)
    } else if cur.eat_keywords(&["NO", "ACTION"]) {
        Ok(ReferentialAction::NoAction)
    } else if cur.eat_keywords(&["SET", "NULL"]) {
        Ok(ReferentialAction::SetNull)
    } else if cur.eat_keywords(&["SET", "DEFAULT"]) {
        Ok(ReferentialAction::SetDefault)
    } else {
        Err(format!("unknown referential action {}", cur.describe()))
    }
}

fn mark_primary_key_not_null(dialect: Dialect, table: &mut Table) {
    let Some(pk) = table.primary_key().map(|pk| pk.columns.clone()) else {
        return;
    };
    for column in &mut table.columns {
        if pk.iter().any(|name| dialect.names_equal(name, &column.column_name)) {
            column.is_not_null = true;
        }
    }
}

fn remove_index(dialect: Dialect, table: &mut Table, name: &str) -> bool {
    let before = table.indexes.len();
    table
        .indexes
        .retain(|i| !dialect.names_equal(&i.index_name, name));
    before != table.indexes.len()
}

/// Remove a column along with the constraints and indexes that use it.
fn drop_column(dialect: Dialect, table: &mut Table, name: &str) {
    let uses = |columns: &[String]| columns.iter().any(|c| dialect.names_equal(c, name));
    table
        .columns
        .retain(|c| !dialect.names_equal(&c.column_name, name));
    table.constraints.retain(|c| !uses(&c.columns));
    table
        .indexes
        .retain(|i| !uses(&i.columns) && !uses(&i.include_columns));
}

fn unquote_string(text: &str) -> String {
    let text = text.strip_prefix(['N', 'n']).unwrap_or(text);
    text.strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(text)
        .replace("''", "'")
}

fn object_name(schema: &str, name: &str) -> String {
    if schema.is_empty() {
        name.to_string()
    } else {
        format!("{schema}.{name}")
    }
}

/// The first few words of a statement, for logging.
fn summary(sql: &str) -> String {
    sql.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}
