//! Single entry point for reading and writing prospects.
//!
//! The in-memory collection and the local cache are always updated together
//! before a call returns. The remote store, when configured, is mirrored in
//! the background by one worker task that applies operations in order and
//! only logs failures.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::DurableCache;
use crate::error::SyncError;
use crate::models::{generate_id, Field, Prospect, ProspectDraft, ProspectPatch, ProspectStatus};
use crate::store::{FallbackStore, RecordSource, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Loading,
    Ready,
}

enum MirrorOp {
    Insert(Prospect),
    Update(Prospect, Vec<Field>),
    Delete(String),
    Flush(oneshot::Sender<()>),
}

struct Mirror {
    tx: mpsc::UnboundedSender<MirrorOp>,
    worker: JoinHandle<()>,
}

impl Mirror {
    fn spawn(store: Arc<dyn RecordStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_mirror(store, rx));
        Self { tx, worker }
    }

    fn send(&self, op: MirrorOp) {
        if self.tx.send(op).is_err() {
            warn!("Remote mirror worker has stopped, change kept locally only");
        }
    }
}

async fn run_mirror(store: Arc<dyn RecordStore>, mut rx: mpsc::UnboundedReceiver<MirrorOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            MirrorOp::Insert(prospect) => {
                if let Err(err) = store.insert(&prospect).await {
                    warn!("Remote insert failed for {}: {}", prospect.id, err);
                }
            }
            MirrorOp::Update(prospect, changed) => {
                if let Err(err) = store.update(&prospect, &changed).await {
                    warn!("Remote update failed for {}: {}", prospect.id, err);
                }
            }
            MirrorOp::Delete(id) => {
                if let Err(err) = store.delete(&id).await {
                    warn!("Remote delete failed for {}: {}", id, err);
                }
            }
            MirrorOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Remote mirror worker finished");
}

pub struct ProspectController {
    cache: Arc<DurableCache>,
    remote: Option<Arc<dyn RecordStore>>,
    mirror: Option<Mirror>,
    records: Vec<Prospect>,
    state: SyncState,
}

impl ProspectController {
    pub fn new(cache: DurableCache, remote: Option<Arc<dyn RecordStore>>) -> Self {
        Self {
            cache: Arc::new(cache),
            remote,
            mirror: None,
            records: Vec::new(),
            state: SyncState::Uninitialized,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Loads the collection, remote first, and becomes `Ready`.
    ///
    /// Never fails: a remote error falls back to the cache, and an unreadable
    /// cache is an empty collection.
    pub async fn load(&mut self) {
        self.state = SyncState::Loading;

        let fallback: Arc<dyn RecordSource> = self.cache.clone();
        let store = FallbackStore::new(self.remote.clone(), fallback);
        let (records, source) = match store.fetch_with_source().await {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!("Failed to load prospects, starting empty: {}", err);
                (Vec::new(), self.cache.name())
            }
        };

        if source != self.cache.name() {
            if let Err(err) = self.cache.save(&records) {
                warn!("Failed to refresh local cache from {}: {}", source, err);
            }
        }

        self.records = records;
        if self.mirror.is_none() {
            self.mirror = self.remote.clone().map(Mirror::spawn);
        }
        self.state = SyncState::Ready;
        info!("Prospect collection ready with {} records", self.records.len());
    }

    pub fn records(&self) -> &[Prospect] {
        &self.records
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Prospect> {
        self.records.iter().find(|p| p.id == id)
    }

    pub fn create(&mut self, draft: ProspectDraft) -> Result<Prospect, SyncError> {
        self.ensure_ready()?;
        if draft.company_name.trim().is_empty() {
            return Err(SyncError::MissingCompanyName);
        }

        let mut id = generate_id();
        while self.find_by_id(&id).is_some() {
            id = generate_id();
        }
        let prospect = Prospect::from_draft(id, draft, Utc::now());

        let mut next = Vec::with_capacity(self.records.len() + 1);
        next.push(prospect.clone());
        next.extend(self.records.iter().cloned());
        self.commit(next)?;

        info!("Created prospect {} ({})", prospect.id, prospect.company_name);
        self.enqueue(MirrorOp::Insert(prospect.clone()));
        Ok(prospect)
    }

    /// Merges `patch` into the prospect with `id`. Unknown ids are ignored
    /// and yield `Ok(None)`.
    pub fn update(
        &mut self,
        id: &str,
        patch: &ProspectPatch,
    ) -> Result<Option<Prospect>, SyncError> {
        self.ensure_ready()?;
        let Some(index) = self.records.iter().position(|p| p.id == id) else {
            debug!("Update ignored, no prospect {}", id);
            return Ok(None);
        };
        if patch
            .company_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(SyncError::MissingCompanyName);
        }

        let mut next = self.records.clone();
        let changed = next[index].apply(patch, Utc::now());
        let updated = next[index].clone();
        self.commit(next)?;

        debug!("Updated prospect {} ({} fields)", id, changed.len());
        self.enqueue(MirrorOp::Update(updated.clone(), changed));
        Ok(Some(updated))
    }

    pub fn update_status(
        &mut self,
        id: &str,
        status: ProspectStatus,
    ) -> Result<Option<Prospect>, SyncError> {
        self.update(id, &ProspectPatch::status(status))
    }

    /// Sets a new monthly cost; the previous one stays in the cost ledger.
    pub fn change_cost(&mut self, id: &str, amount: f64) -> Result<Option<Prospect>, SyncError> {
        let patch = ProspectPatch {
            monthly_cost: Some(amount),
            ..ProspectPatch::default()
        };
        self.update(id, &patch)
    }

    pub fn change_fee(&mut self, id: &str, amount: f64) -> Result<Option<Prospect>, SyncError> {
        let patch = ProspectPatch {
            monthly_fee: Some(amount),
            ..ProspectPatch::default()
        };
        self.update(id, &patch)
    }

    /// Removes the prospect with `id`. Returns whether anything was removed.
    pub fn delete(&mut self, id: &str) -> Result<bool, SyncError> {
        self.ensure_ready()?;
        if self.find_by_id(id).is_none() {
            debug!("Delete ignored, no prospect {}", id);
            return Ok(false);
        }

        let next: Vec<Prospect> = self.records.iter().filter(|p| p.id != id).cloned().collect();
        self.commit(next)?;

        info!("Deleted prospect {}", id);
        self.enqueue(MirrorOp::Delete(id.to_string()));
        Ok(true)
    }

    /// Waits until every mirror operation queued so far has been attempted.
    pub async fn flush(&self) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        let (done, wait) = oneshot::channel();
        mirror.send(MirrorOp::Flush(done));
        let _ = wait.await;
    }

    /// Stops the mirror worker after it drains its queue.
    pub async fn shutdown(mut self) {
        if let Some(Mirror { tx, worker }) = self.mirror.take() {
            drop(tx);
            if let Err(err) = worker.await {
                warn!("Remote mirror worker ended abnormally: {}", err);
            }
        }
    }

    fn ensure_ready(&self) -> Result<(), SyncError> {
        if self.state == SyncState::Ready {
            Ok(())
        } else {
            Err(SyncError::NotReady)
        }
    }

    /// Saves `next` to the cache, then makes it the live collection.
    fn commit(&mut self, next: Vec<Prospect>) -> Result<(), SyncError> {
        self.cache.save(&next)?;
        self.records = next;
        Ok(())
    }

    fn enqueue(&self, op: MirrorOp) {
        if let Some(mirror) = &self.mirror {
            mirror.send(op);
        }
    }
}
