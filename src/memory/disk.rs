// src/memory/disk.rs - Unbounded disk tier with an optional file mirror
use std::path::{Path, PathBuf};

use procsim_shared::{SimError, SimTime};
use tokio::fs;

use super::MemoryRecord;

/// Ordered list of records that overflowed main memory.
///
/// When a mirror path is set every mutation rewrites the whole file as
/// `id\tvalue\tlastAccess` lines, in list order.
#[derive(Debug, Default)]
pub struct DiskStore {
    records: Vec<MemoryRecord>,
    mirror: Option<PathBuf>,
}

impl DiskStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a mirrored store, truncating whatever a previous run left behind.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref().to_path_buf();
        fs::write(&path, "").await?;
        tracing::info!("Disk tier mirrored to {}", path.display());
        Ok(Self {
            records: Vec::new(),
            mirror: Some(path),
        })
    }

    pub fn mirror_path(&self) -> Option<&Path> {
        self.mirror.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MemoryRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    pub async fn append(&mut self, record: MemoryRecord) -> Result<(), SimError> {
        self.records.push(record);
        self.sync().await
    }

    /// Updates a record in place. Returns false, touching nothing, when the id is absent.
    pub async fn update(&mut self, id: &str, value: &str, last_access: SimTime) -> Result<bool, SimError> {
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        record.value = value.to_string();
        record.last_access = last_access;
        self.sync().await?;
        Ok(true)
    }

    pub async fn remove(&mut self, id: &str) -> Result<Option<MemoryRecord>, SimError> {
        let Some(index) = self.records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let record = self.records.remove(index);
        self.sync().await?;
        Ok(Some(record))
    }

    pub fn render(&self) -> String {
        self.records
            .iter()
            .map(|r| format!("{}\t{}\t{}\n", r.id, r.value, r.last_access))
            .collect()
    }

    async fn sync(&self) -> Result<(), SimError> {
        if let Some(path) = &self.mirror {
            fs::write(path, self.render()).await?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn push_unsynced(&mut self, record: MemoryRecord) {
        self.records.push(record);
    }
}
