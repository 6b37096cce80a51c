// src/memory/mod.rs - Two-tier variable storage: bounded main memory plus disk
pub mod disk;

pub use disk::DiskStore;

use procsim_shared::SimTime;
use serde::Serialize;

/// A variable and the last simulated time it was touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryRecord {
    pub id: String,
    pub value: String,
    pub last_access: SimTime,
}

impl MemoryRecord {
    pub fn new(id: impl Into<String>, value: impl Into<String>, last_access: SimTime) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            last_access,
        }
    }
}

/// Where a variable currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Main,
    Disk,
}

/// Main-memory table, bounded by `capacity`. Records keep insertion order,
/// which is also the enumeration order used to break LRU ties.
#[derive(Debug, Clone)]
pub struct MainMemory {
    capacity: usize,
    records: Vec<MemoryRecord>,
}

impl MainMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn get(&self, id: &str) -> Option<&MemoryRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut MemoryRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// Inserts into a free slot. A full table hands the record back.
    pub fn insert(&mut self, record: MemoryRecord) -> Result<(), MemoryRecord> {
        if self.is_full() {
            return Err(record);
        }
        self.records.push(record);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<MemoryRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(index))
    }

    /// Index of the least recently used record; the first one wins a tie.
    pub fn lru_index(&self) -> Option<usize> {
        let mut oldest: Option<usize> = None;
        for (i, record) in self.records.iter().enumerate() {
            match oldest {
                Some(o) if record.last_access >= self.records[o].last_access => {}
                _ => oldest = Some(i),
            }
        }
        oldest
    }

    pub fn evict_lru(&mut self) -> Option<MemoryRecord> {
        let index = self.lru_index()?;
        Some(self.records.remove(index))
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }
}

/// Main memory plus the unbounded disk overflow.
#[derive(Debug)]
pub struct MemoryStore {
    pub main: MainMemory,
    pub disk: DiskStore,
}

impl MemoryStore {
    pub fn new(capacity: usize, disk: DiskStore) -> Self {
        Self {
            main: MainMemory::new(capacity),
            disk,
        }
    }

    pub fn locate(&self, id: &str) -> Option<Tier> {
        if self.main.get(id).is_some() {
            Some(Tier::Main)
        } else if self.disk.get(id).is_some() {
            Some(Tier::Disk)
        } else {
            None
        }
    }

    /// Checks that main memory is within capacity and no id is stored twice.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.main.len() > self.main.capacity() {
            return Err(format!(
                "main memory holds {} records but capacity is {}",
                self.main.len(),
                self.main.capacity()
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for record in self.main.records().iter().chain(self.disk.records()) {
            if !seen.insert(record.id.as_str()) {
                return Err(format!("variable {} is stored more than once", record.id));
            }
        }
        Ok(())
    }
}
