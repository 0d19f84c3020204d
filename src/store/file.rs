//! File-backed schema store
//!
//! Every schema is one JSON document holding all of its versions:
//!
//! ```text
//! schemas/
//! ├── 0b6a1c2e-....json
//! └── 7f3d9e41-....json
//! ```
//!
//! Documents are loaded and hash-checked on open, and rewritten whole after
//! every change through a temporary file and a rename.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{SchemaStore, SchemaTable};
use crate::error::{Result, SchemaError};
use crate::schema::{InsertInfo, NewSchema, Schema, SchemaMetadataUpdate};
use crate::version::SchemaVersion;

/// Schema store persisted as JSON documents in a directory
#[derive(Debug)]
pub struct FileStore {
    /// Path to the store root
    root: PathBuf,
    table: RwLock<SchemaTable>,
}

impl FileStore {
    /// Open an existing store or create a new one
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(root.join("schemas"))?;

        let mut table = SchemaTable::default();
        let loaded = Self::load_documents(&root, &mut table)?;
        info!(root = %root.display(), schemas = loaded, "opened schema store");

        Ok(Self {
            root,
            table: RwLock::new(table),
        })
    }

    /// Get the root path of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.root.join("schemas").join(format!("{id}.json"))
    }

    fn load_documents(root: &Path, table: &mut SchemaTable) -> Result<usize> {
        let mut loaded = 0;
        for entry in fs::read_dir(root.join("schemas"))? {
            let path = entry?.path();
            if !path.is_file() || path.extension().map_or(true, |e| e != "json") {
                continue;
            }

            let content = fs::read_to_string(&path)?;
            let schema: Schema = serde_json::from_str(&content)?;
            Self::verify(&schema)?;
            table.insert_loaded(schema);
            loaded += 1;
        }
        Ok(loaded)
    }

    fn verify(schema: &Schema) -> Result<()> {
        if schema.versions.is_empty() {
            return Err(SchemaError::InvalidVersion(format!(
                "schema {} has no versions",
                schema.id
            )));
        }
        for (i, version) in schema.versions.iter().enumerate() {
            if version.version as usize != i + 1 {
                return Err(SchemaError::InvalidVersion(format!(
                    "schema {} has version {} at position {}",
                    schema.id,
                    version.version,
                    i + 1
                )));
            }
            if !version.verify_hash() {
                return Err(SchemaError::ChecksumMismatch {
                    id: schema.id.clone(),
                    version: version.version,
                    expected: version.hash.to_string(),
                    actual: crate::checksum::Checksum::of(&version.specification).to_string(),
                });
            }
        }
        Ok(())
    }

    fn persist(&self, schema: &Schema) -> Result<()> {
        let path = self.document_path(&schema.id);
        let staging = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(schema)?;
        fs::write(&staging, content)?;
        if let Err(e) = fs::rename(&staging, &path) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        debug!(schema_id = %schema.id, path = %path.display(), "persisted schema");
        Ok(())
    }
}

impl SchemaStore for FileStore {
    fn create(&self, request: NewSchema) -> Result<InsertInfo> {
        let mut table = self.table.write();
        let (info, schema) = table.create(request);
        if let Err(e) = self.persist(schema) {
            table.delete(&info.identification)?;
            return Err(e);
        }
        Ok(info)
    }

    fn get_by_id_and_version(&self, id: &str, version: u32) -> Result<Option<Schema>> {
        Ok(self.table.read().get_version(id, version))
    }

    fn update(&self, id: &str, specification: String, autogenerated: bool) -> Result<InsertInfo> {
        let mut table = self.table.write();
        let previous = table
            .get(id)
            .cloned()
            .ok_or_else(|| SchemaError::NotFound { id: id.to_string() })?;
        let (info, schema) = table.update(id, specification, autogenerated)?;
        if let Err(e) = self.persist(schema) {
            table.insert_loaded(previous);
            return Err(e);
        }
        Ok(info)
    }

    fn list_versions(&self, id: &str) -> Result<Vec<SchemaVersion>> {
        Ok(self.table.read().list_versions(id))
    }

    fn update_metadata(&self, id: &str, update: SchemaMetadataUpdate) -> Result<()> {
        let mut table = self.table.write();
        let previous = table
            .get(id)
            .cloned()
            .ok_or_else(|| SchemaError::NotFound { id: id.to_string() })?;
        let schema = table.update_metadata(id, update)?;
        if let Err(e) = self.persist(schema) {
            table.insert_loaded(previous);
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut table = self.table.write();
        if table.get(id).is_none() {
            return Err(SchemaError::NotFound { id: id.to_string() });
        }
        match fs::remove_file(self.document_path(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        table.delete(id)?;
        Ok(())
    }
}
