use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::error::StoreError;
use crate::models::{Field, Prospect, ProspectDraft};
use crate::store::{RecordSource, RecordStore};

pub fn prospect(id: &str, company: &str) -> Prospect {
    Prospect::from_draft(
        id.to_string(),
        ProspectDraft {
            company_name: company.to_string(),
            ..ProspectDraft::default()
        },
        Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
    )
}

/// In-memory [`RecordStore`] that can be switched into a failing mode.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Prospect>>,
    updates: Mutex<Vec<(String, Vec<Field>)>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn with_records(records: Vec<Prospect>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Vec<Prospect> {
        self.records.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, Vec<Field>)> {
        self.updates.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory store offline",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSource for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_all(&self) -> Result<Vec<Prospect>, StoreError> {
        self.check()?;
        Ok(self.snapshot())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, prospect: &Prospect) -> Result<(), StoreError> {
        self.check()?;
        self.records.lock().unwrap().insert(0, prospect.clone());
        Ok(())
    }

    async fn update(&self, prospect: &Prospect, changed: &[Field]) -> Result<(), StoreError> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.iter_mut().find(|p| p.id == prospect.id) {
            *existing = prospect.clone();
        }
        self.updates
            .lock()
            .unwrap()
            .push((prospect.id.clone(), changed.to_vec()));
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.records.lock().unwrap().retain(|p| p.id != id);
        Ok(())
    }
}
