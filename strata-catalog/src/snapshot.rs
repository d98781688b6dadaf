//! JSON catalog snapshots.

use std::path::Path;

use crate::error::{CatalogError, CatalogResult};
use crate::model::Catalog;

/// Parse a catalog from JSON text.
pub fn from_json(json: &str) -> CatalogResult<Catalog> {
    serde_json::from_str(json).map_err(|source| CatalogError::Json { source })
}

/// Serialize a catalog as pretty-printed JSON.
pub fn to_json(catalog: &Catalog) -> CatalogResult<String> {
    serde_json::to_string_pretty(catalog).map_err(|source| CatalogError::Json { source })
}

/// Load a catalog snapshot from a file.
pub fn load_json_file(path: impl AsRef<Path>) -> CatalogResult<Catalog> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_json(&content)
}

/// Write a catalog snapshot to a file.
pub fn save_json_file(catalog: &Catalog, path: impl AsRef<Path>) -> CatalogResult<()> {
    let path = path.as_ref();
    let json = to_json(catalog)?;
    std::fs::write(path, json).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::parser::parse_declarative;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_round_trip_through_file() {
        let src = "table film {\n    film_id number primarykey identity\n    title string notnull\n}\n";
        let catalog = parse_declarative(Dialect::Postgres, src).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        save_json_file(&catalog, &path).unwrap();
        assert_eq!(load_json_file(&path).unwrap(), catalog);
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let catalog = Catalog::new(Dialect::Sqlite);
        insta::assert_snapshot!(to_json(&catalog).unwrap(), @r###"
        {
          "dialect": "sqlite"
        }
        "###);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            from_json("{\"dialect\": \"oracle\"}"),
            Err(CatalogError::Json { .. })
        ));
    }
}
