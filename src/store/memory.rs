//! In-memory schema store

use parking_lot::RwLock;
use tracing::debug;

use super::{SchemaStore, SchemaTable};
use crate::error::Result;
use crate::schema::{InsertInfo, NewSchema, Schema, SchemaMetadataUpdate};
use crate::version::SchemaVersion;

/// Schema store kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<SchemaTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaStore for MemoryStore {
    fn create(&self, request: NewSchema) -> Result<InsertInfo> {
        let mut table = self.table.write();
        let (info, _) = table.create(request);
        debug!(schema_id = %info.identification, "created schema");
        Ok(info)
    }

    fn get_by_id_and_version(&self, id: &str, version: u32) -> Result<Option<Schema>> {
        Ok(self.table.read().get_version(id, version))
    }

    fn update(&self, id: &str, specification: String, autogenerated: bool) -> Result<InsertInfo> {
        let mut table = self.table.write();
        let (info, _) = table.update(id, specification, autogenerated)?;
        debug!(schema_id = %id, version = info.version, autogenerated, "appended schema version");
        Ok(info)
    }

    fn list_versions(&self, id: &str) -> Result<Vec<SchemaVersion>> {
        Ok(self.table.read().list_versions(id))
    }

    fn update_metadata(&self, id: &str, update: SchemaMetadataUpdate) -> Result<()> {
        self.table.write().update_metadata(id, update)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.table.write().delete(id)?;
        Ok(())
    }
}
