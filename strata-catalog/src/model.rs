//! The catalog: an in-memory snapshot of a database's structure.
//!
//! Catalogs are plain values. Builders populate them, engines read them, and
//! nothing mutates a catalog once it has been handed to a diff.

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Root container for a database's structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub dialect: Dialect,
    /// Schema used when an object name carries no qualifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub current_schema: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_collation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<Schema>,
}

/// A named group of tables and views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub schema_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<Table>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<View>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore: bool,
}

/// A view, compared by its body text only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub view_schema: String,
    pub view_name: String,
    /// The SELECT statement defining the view.
    pub sql: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub table_schema: String,
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore: bool,
}

/// How a column generates its own values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    #[default]
    None,
    /// `GENERATED BY DEFAULT AS IDENTITY` (or `IDENTITY` on SQL Server).
    ByDefault,
    /// `GENERATED ALWAYS AS IDENTITY`.
    Always,
}

impl Identity {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub column_name: String,
    /// Raw, dialect-native type text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub column_type: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_not_null: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_autoincrement: bool,
    #[serde(default, skip_serializing_if = "Identity::is_none")]
    pub identity: Identity,
    /// Raw default expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_default: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_expr: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub on_update_current_timestamp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_enum: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore: bool,
}

impl Column {
    /// Create a column with the given name and raw type.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            column_name: name.into(),
            column_type: column_type.into(),
            ..Default::default()
        }
    }

    /// The type as written in DDL: the domain if one is named, else the raw type.
    pub fn effective_type(&self) -> &str {
        self.domain_name.as_deref().unwrap_or(&self.column_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintType {
    PrimaryKey,
    Unique,
    ForeignKey,
}

impl ConstraintType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "PRIMARY KEY",
            Self::Unique => "UNIQUE",
            Self::ForeignKey => "FOREIGN KEY",
        }
    }

    /// Suffix used for generated constraint names.
    pub fn name_suffix(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "pkey",
            Self::Unique => "key",
            Self::ForeignKey => "fkey",
        }
    }
}

/// The action taken on referencing rows when a referenced row changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// The modifier spelling: lowercase with spaces removed.
    pub fn as_modifier(&self) -> &'static str {
        match self {
            Self::NoAction => "noaction",
            Self::Restrict => "restrict",
            Self::Cascade => "cascade",
            Self::SetNull => "setnull",
            Self::SetDefault => "setdefault",
        }
    }

    /// Parse either the SQL or the modifier spelling.
    pub fn parse(text: &str) -> Option<Self> {
        let folded: String = text
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "noaction" => Some(Self::NoAction),
            "restrict" => Some(Self::Restrict),
            "cascade" => Some(Self::Cascade),
            "setnull" => Some(Self::SetNull),
            "setdefault" => Some(Self::SetDefault),
            _ => None,
        }
    }

    pub fn is_no_action(&self) -> bool {
        matches!(self, Self::NoAction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub constraint_name: String,
    pub constraint_type: ConstraintType,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub references_schema: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub references_table: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "ReferentialAction::is_no_action")]
    pub update_rule: ReferentialAction,
    #[serde(default, skip_serializing_if = "ReferentialAction::is_no_action")]
    pub delete_rule: ReferentialAction,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_deferrable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_initially_deferred: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore: bool,
}

impl Constraint {
    /// A primary key, unique or foreign key constraint over `columns` with a
    /// name derived from the table and column names.
    pub fn new(table: &str, constraint_type: ConstraintType, columns: Vec<String>) -> Self {
        Self {
            constraint_name: generated_name(table, &columns, constraint_type.name_suffix()),
            constraint_type,
            columns,
            references_schema: String::new(),
            references_table: String::new(),
            references_columns: Vec::new(),
            update_rule: ReferentialAction::NoAction,
            delete_rule: ReferentialAction::NoAction,
            is_deferrable: false,
            is_initially_deferred: false,
            ignore: false,
        }
    }

    /// A foreign key from `columns` to `references_table(references_columns)`.
    pub fn foreign_key(
        table: &str,
        columns: Vec<String>,
        references_schema: impl Into<String>,
        references_table: impl Into<String>,
        references_columns: Vec<String>,
    ) -> Self {
        Self {
            references_schema: references_schema.into(),
            references_table: references_table.into(),
            references_columns,
            ..Self::new(table, ConstraintType::ForeignKey, columns)
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraint_type == ConstraintType::PrimaryKey
    }

    pub fn is_foreign_key(&self) -> bool {
        self.constraint_type == ConstraintType::ForeignKey
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub index_name: String,
    /// Access method, e.g. `BTREE` or `GIN`. Empty means the dialect default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub index_type: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_unique: bool,
    /// Column names or parenthesized expressions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descending: Vec<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opclasses: Vec<String>,
    /// Partial-index filter.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub predicate: String,
    /// Raw defining statement.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sql: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore: bool,
}

impl Index {
    /// A plain index over `columns` named after the table and columns.
    pub fn new(table: &str, columns: Vec<String>) -> Self {
        Self {
            index_name: generated_name(table, &columns, "idx"),
            columns,
            ..Default::default()
        }
    }

    /// Whether the index can be compared structurally.
    ///
    /// Anything with included columns, a predicate, descending or expression
    /// columns, or multi-part operator classes is compared by raw SQL only.
    pub fn is_simple(&self) -> bool {
        if self.columns.is_empty() || !self.include_columns.is_empty() {
            return false;
        }
        if !self.predicate.is_empty() || self.descending.iter().any(|d| *d) {
            return false;
        }
        if self.opclasses.iter().any(|op| op.matches('_').count() > 1) {
            return false;
        }
        if self.columns.iter().any(|c| c.starts_with('(')) {
            return false;
        }
        let upper = self.sql.to_ascii_uppercase();
        !(upper.contains(" WHERE ") || upper.contains(" DESC") || upper.contains(" INCLUDE"))
    }
}

/// `{table}_{col1}_{col2}_{suffix}`, with spaces folded to underscores.
pub fn generated_name(table: &str, columns: &[String], suffix: &str) -> String {
    let mut name = table.replace(' ', "_");
    if suffix != "pkey" {
        for column in columns {
            name.push('_');
            name.push_str(&column.replace(' ', "_"));
        }
    }
    name.push('_');
    name.push_str(suffix);
    name
}

impl Catalog {
    /// An empty catalog for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            current_schema: String::new(),
            default_collation: String::new(),
            schemas: Vec::new(),
        }
    }

    /// Set the current schema.
    pub fn with_current_schema(mut self, schema: impl Into<String>) -> Self {
        self.current_schema = schema.into();
        self
    }

    /// Whether `name` refers to the unqualified schema.
    pub fn is_current_schema(&self, name: &str) -> bool {
        name.is_empty() || self.dialect.names_equal(name, &self.current_schema)
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|s| self.same_schema(&s.schema_name, name))
    }

    pub fn schema_mut(&mut self, name: &str) -> Option<&mut Schema> {
        let position = self
            .schemas
            .iter()
            .position(|s| self.same_schema(&s.schema_name, name))?;
        self.schemas.get_mut(position)
    }

    /// Look up a schema, appending an empty one if it does not exist yet.
    pub fn schema_or_insert(&mut self, name: &str) -> &mut Schema {
        let position = match self
            .schemas
            .iter()
            .position(|s| self.same_schema(&s.schema_name, name))
        {
            Some(position) => position,
            None => {
                self.schemas.push(Schema {
                    schema_name: name.to_string(),
                    ..Default::default()
                });
                self.schemas.len() - 1
            }
        };
        &mut self.schemas[position]
    }

    pub fn table(&self, schema: &str, name: &str) -> Option<&Table> {
        let dialect = self.dialect;
        self.schema(schema)?
            .tables
            .iter()
            .find(|t| dialect.names_equal(&t.table_name, name))
    }

    pub fn table_mut(&mut self, schema: &str, name: &str) -> Option<&mut Table> {
        let dialect = self.dialect;
        self.schema_mut(schema)?
            .tables
            .iter_mut()
            .find(|t| dialect.names_equal(&t.table_name, name))
    }

    /// Iterate over every table in every schema.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.schemas.iter().flat_map(|s| s.tables.iter())
    }

    /// Iterate over every view in every schema.
    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.schemas.iter().flat_map(|s| s.views.iter())
    }

    fn same_schema(&self, a: &str, b: &str) -> bool {
        if self.is_current_schema(a) && self.is_current_schema(b) {
            return true;
        }
        self.dialect.names_equal(a, b)
    }
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table_schema: schema.into(),
            table_name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(&self, dialect: Dialect, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| dialect.names_equal(&c.column_name, name))
    }

    pub fn column_mut(&mut self, dialect: Dialect, name: &str) -> Option<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| dialect.names_equal(&c.column_name, name))
    }

    pub fn primary_key(&self) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.is_primary_key())
    }

    /// Find a constraint of `kind` over exactly `columns`.
    pub fn constraint_on(
        &self,
        dialect: Dialect,
        kind: ConstraintType,
        columns: &[String],
    ) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find(|c| c.constraint_type == kind && columns_equal(dialect, &c.columns, columns))
    }

    pub fn index(&self, dialect: Dialect, name: &str) -> Option<&Index> {
        self.indexes
            .iter()
            .find(|i| dialect.names_equal(&i.index_name, name))
    }
}

/// Positional, case-rule-aware comparison of two column lists.
pub fn columns_equal(dialect: Dialect, a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| dialect.names_equal(x, y))
}
