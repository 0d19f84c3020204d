//! Schema Registry Store
//!
//! Versioned schema storage. Updates only ever append a version with the next
//! number, so concurrent writers never need compare-and-swap: the store's
//! lock serialises appends and every caller gets a distinct version back.

mod file;
mod memory;

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{Result, SchemaError};
use crate::schema::{InsertInfo, NewSchema, Schema, SchemaMetadataUpdate};
use crate::version::SchemaVersion;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage contract required by the registry service.
///
/// Lookups of absent ids or versions return `Ok(None)` / empty lists; errors
/// are reserved for backend failures and for mutating a schema that does not
/// exist.
pub trait SchemaStore: Send + Sync {
    /// Register a new schema; its first version is 1
    fn create(&self, request: NewSchema) -> Result<InsertInfo>;

    /// Fetch a schema carrying only the requested version
    fn get_by_id_and_version(&self, id: &str, version: u32) -> Result<Option<Schema>>;

    /// Append a new version with number `max + 1`
    fn update(&self, id: &str, specification: String, autogenerated: bool) -> Result<InsertInfo>;

    /// All versions of a schema in version order
    fn list_versions(&self, id: &str) -> Result<Vec<SchemaVersion>>;

    /// Change name, description or type without touching versions
    fn update_metadata(&self, id: &str, update: SchemaMetadataUpdate) -> Result<()>;

    /// Remove a schema with all of its versions
    fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory table shared by the store backends
#[derive(Debug, Default)]
pub(crate) struct SchemaTable {
    schemas: HashMap<String, Schema>,
}

impl SchemaTable {
    pub(crate) fn insert_loaded(&mut self, schema: Schema) {
        self.schemas.insert(schema.id.clone(), schema);
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Schema> {
        self.schemas.get(id)
    }

    pub(crate) fn create(&mut self, request: NewSchema) -> (InsertInfo, &Schema) {
        let mut id = Uuid::new_v4().to_string();
        while self.schemas.contains_key(&id) {
            id = Uuid::new_v4().to_string();
        }
        let schema = Schema::new(id.clone(), request);
        let info = InsertInfo::new(id.clone(), 1, "Schema successfully created.");
        let stored = self.schemas.entry(id).or_insert(schema);
        (info, stored)
    }

    pub(crate) fn get_version(&self, id: &str, version: u32) -> Option<Schema> {
        self.schemas.get(id).and_then(|s| s.at_version(version))
    }

    pub(crate) fn update(
        &mut self,
        id: &str,
        specification: String,
        autogenerated: bool,
    ) -> Result<(InsertInfo, &Schema)> {
        let schema = self
            .schemas
            .get_mut(id)
            .ok_or_else(|| SchemaError::NotFound { id: id.to_string() })?;
        let version = schema.append_version(specification);
        schema.autogenerated |= autogenerated;
        let info = InsertInfo::new(id, version, "Schema successfully updated.");
        Ok((info, schema))
    }

    pub(crate) fn list_versions(&self, id: &str) -> Vec<SchemaVersion> {
        self.schemas
            .get(id)
            .map(|s| s.versions.clone())
            .unwrap_or_default()
    }

    pub(crate) fn update_metadata(&mut self, id: &str, update: SchemaMetadataUpdate) -> Result<&Schema> {
        let schema = self
            .schemas
            .get_mut(id)
            .ok_or_else(|| SchemaError::NotFound { id: id.to_string() })?;
        if let Some(name) = update.name {
            schema.name = name;
        }
        if let Some(description) = update.description {
            schema.description = description;
        }
        if let Some(schema_type) = update.schema_type {
            schema.schema_type = schema_type;
        }
        Ok(schema)
    }

    pub(crate) fn delete(&mut self, id: &str) -> Result<Schema> {
        self.schemas
            .remove(id)
            .ok_or_else(|| SchemaError::NotFound { id: id.to_string() })
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share

    use super::*;

    pub fn new_schema(spec: &str) -> NewSchema {
        NewSchema {
            description: "test schema".to_string(),
            specification: spec.to_string(),
            name: "Test".to_string(),
            schema_type: "json".to_string(),
        }
    }

    pub fn version_monotonicity(store: &dyn SchemaStore) {
        let info = store.create(new_schema("djE=")).unwrap();
        assert_eq!(info.version, 1);

        for n in 0..5u32 {
            let updated = store.update(&info.identification, format!("spec-{n}"), false).unwrap();
            assert_eq!(updated.version, n + 2);
        }

        let versions: Vec<u32> = store
            .list_versions(&info.identification)
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5, 6]);
    }

    pub fn lookup_is_total(store: &dyn SchemaStore) {
        let info = store.create(new_schema("c3BlYw==")).unwrap();
        let found = store.get_by_id_and_version(&info.identification, 1).unwrap().unwrap();
        assert_eq!(found.versions.len(), 1);
        assert_eq!(found.versions[0].specification, "c3BlYw==");

        assert!(store.get_by_id_and_version(&info.identification, 2).unwrap().is_none());
        assert!(store.get_by_id_and_version("missing", 1).unwrap().is_none());
        assert!(store.list_versions("missing").unwrap().is_empty());
    }

    pub fn update_keeps_old_versions(store: &dyn SchemaStore) {
        let info = store.create(new_schema("b2xk")).unwrap();
        store.update(&info.identification, "bmV3".to_string(), true).unwrap();

        let v1 = store.get_by_id_and_version(&info.identification, 1).unwrap().unwrap();
        assert_eq!(v1.versions[0].specification, "b2xk");
        assert!(v1.autogenerated);

        let v2 = store.get_by_id_and_version(&info.identification, 2).unwrap().unwrap();
        assert_eq!(v2.versions[0].specification, "bmV3");
        assert!(v2.versions[0].verify_hash());
    }

    pub fn mutations_of_unknown_ids_fail(store: &dyn SchemaStore) {
        assert!(matches!(
            store.update("missing", "x".to_string(), false),
            Err(SchemaError::NotFound { .. })
        ));
        assert!(matches!(store.delete("missing"), Err(SchemaError::NotFound { .. })));
    }

    pub fn delete_removes_all_versions(store: &dyn SchemaStore) {
        let info = store.create(new_schema("YQ==")).unwrap();
        store.update(&info.identification, "Yg==".to_string(), false).unwrap();
        store.delete(&info.identification).unwrap();
        assert!(store.get_by_id_and_version(&info.identification, 1).unwrap().is_none());
        assert!(store.list_versions(&info.identification).unwrap().is_empty());
    }

    pub fn metadata_update(store: &dyn SchemaStore) {
        let info = store.create(new_schema("YQ==")).unwrap();
        store
            .update_metadata(
                &info.identification,
                SchemaMetadataUpdate {
                    description: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let schema = store.get_by_id_and_version(&info.identification, 1).unwrap().unwrap();
        assert_eq!(schema.description, "renamed");
        assert_eq!(schema.name, "Test");
        assert_eq!(schema.versions.len(), 1);
    }
}
