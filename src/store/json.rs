//! Metadata export documents
//!
//! Loads `{ "dataElements": [...], "programs": [...], ... }` documents into an
//! [`InMemoryObjectStore`]. A directory is walked recursively and every
//! `.json` file is read as one document.

use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{PreheatError, Result};
use crate::object::IdentifiableObject;
use crate::schema::ObjectType;

use super::InMemoryObjectStore;

/// Add every object of a metadata export document to `store`
pub fn load_document(store: &mut InMemoryObjectStore, document: &Value) -> Result<usize> {
    let collections = document.as_object().ok_or_else(|| {
        PreheatError::invalid_object("document", "expected a JSON object at the top level")
    })?;

    let mut loaded = 0;
    for (key, items) in collections {
        let Some(object_type) = ObjectType::from_plural(key) else {
            debug!(collection = %key, "skipping unknown metadata collection");
            continue;
        };
        let Some(items) = items.as_array() else {
            return Err(PreheatError::invalid_object(
                object_type.name(),
                format!("collection '{}' must be an array", key),
            ));
        };
        for item in items {
            store.insert(IdentifiableObject::from_json(object_type, item)?);
            loaded += 1;
        }
    }
    Ok(loaded)
}

/// Load all metadata documents below `dir`
pub fn load_directory(dir: &Path) -> Result<InMemoryObjectStore> {
    let mut store = InMemoryObjectStore::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }

        let content = fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&content).map_err(|e| {
            warn!(path = %path.display(), "failed to parse metadata document");
            PreheatError::Json(e)
        })?;
        let loaded = load_document(&mut store, &document)?;
        debug!(path = %path.display(), loaded, "loaded metadata document");
    }

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectStore;
    use serde_json::json;

    #[test]
    fn test_load_document() {
        let mut store = InMemoryObjectStore::new();
        let loaded = load_document(
            &mut store,
            &json!({
                "dataElements": [{ "id": "deabcdefghA", "name": "Weight" }],
                "programs": [{ "id": "programAAAA", "programType": "WITH_REGISTRATION" }],
                "system": { "version": "2.40" }
            }),
        )
        .unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(store.fetch_all(ObjectType::Program).unwrap().len(), 1);
    }

    #[test]
    fn test_load_directory_walks_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("programs");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            dir.path().join("elements.json"),
            r#"{ "dataElements": [{ "id": "deabcdefghA" }, { "id": "deabcdefghB" }] }"#,
        )
        .unwrap();
        fs::write(
            nested.join("programs.json"),
            r#"{ "programs": [{ "id": "programAAAA" }] }"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = load_directory(dir.path()).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_rejects_non_array_collection() {
        let mut store = InMemoryObjectStore::new();
        let result = load_document(&mut store, &json!({ "dataElements": { "id": "x" } }));
        assert!(result.is_err());
    }
}
