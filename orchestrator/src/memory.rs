use async_trait::async_trait;
use parking_lot::RwLock;

use crate::errors::{OrchestratorError, Result};
use crate::records::{newest_first, FlightRecord, RecordStore, SearchQuery};

/// In-process record store applying the same predicates as the SQL store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<FlightRecord>>,
    outage: RwLock<Option<String>>,
}

impl MemoryRecordStore {
    pub fn new(records: Vec<FlightRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            outage: RwLock::new(None),
        }
    }

    pub fn insert(&self, record: FlightRecord) {
        let mut records = self.records.write();
        records.retain(|existing| existing.id != record.id);
        records.push(record);
    }

    /// Makes every subsequent query fail with `reason` until cleared.
    pub fn set_outage(&self, reason: Option<String>) {
        *self.outage.write() = reason;
    }

    fn available(&self) -> Result<()> {
        match self.outage.read().as_ref() {
            Some(reason) => Err(OrchestratorError::Store(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<FlightRecord>> {
        self.available()?;
        Ok(self
            .records
            .read()
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<FlightRecord>> {
        self.available()?;
        let mut records = self.records.read().clone();
        records.sort_by(newest_first);
        records.truncate(limit);
        Ok(records)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<FlightRecord>> {
        self.available()?;
        let mut records: Vec<FlightRecord> = self
            .records
            .read()
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        records.sort_by(newest_first);
        records.truncate(query.limit);
        Ok(records)
    }
}
