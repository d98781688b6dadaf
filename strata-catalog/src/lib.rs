//! # strata-catalog
//!
//! The structural model strata diffs, and the text formats that produce it.
//!
//! - [`Catalog`] and friends: schemas, tables, columns, constraints, indexes
//!   and views, as plain values.
//! - [`modifier`]: the compact `name=value` / `name={value sub...}` language
//!   used to attach facts to tables and columns.
//! - [`parser`]: the declarative `.ddl` format, one column per line with a
//!   logical kind and modifiers.
//! - [`writer`]: renders a catalog back into declarative source.
//! - [`snapshot`]: JSON snapshots.
//!
//! ## Example
//!
//! ```rust
//! use strata_catalog::{Dialect, parse_declarative};
//!
//! let catalog = parse_declarative(Dialect::Postgres, r#"
//! table film {
//!     film_id  number  primarykey identity
//!     title    string  notnull
//! }
//! "#).unwrap();
//!
//! let film = catalog.table("", "film").unwrap();
//! assert_eq!(film.columns[1].column_type, "TEXT");
//! ```

pub mod dialect;
pub mod error;
pub mod kind;
pub mod model;
pub mod modifier;
pub mod parser;
pub mod snapshot;
pub mod writer;

pub use dialect::{Dialect, needs_quoting};
pub use error::{CatalogError, CatalogResult};
pub use kind::{ColumnKind, NormalizedType, normalize_column_type, resolve_column_kind, types_equal};
pub use model::{
    Catalog, Column, Constraint, ConstraintType, Identity, Index, ReferentialAction, Schema,
    Table, View, columns_equal, generated_name,
};
pub use modifier::{Modifier, ModifierValue, Modifiers, parse_modifiers};
pub use parser::{DeclarativeSchema, parse_declarative, parse_declarative_file, parse_source};
pub use snapshot::{from_json, load_json_file, save_json_file, to_json};
pub use writer::write_declarative;
