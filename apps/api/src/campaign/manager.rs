//! Campaign state — one `Campaign` per job holding the active queue and the
//! conducted-interview collection, plus the `CampaignManager` registry that
//! opens, looks up and stops campaigns.
//!
//! All queue mutations go through `Campaign` methods that persist the
//! snapshot before releasing the lock, so a stale read can never overwrite a
//! concurrently applied change. The lock is a plain `std::sync::Mutex` and
//! is never held across an await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::campaign::models::{
    CallStatus, CampaignSpec, Candidate, CompletedInterview, QueueEntry,
};
use crate::campaign::phone::normalize_phone;
use crate::campaign::store::{SnapshotStore, StoreError};

/// Per-status tallies for the operator dashboard.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub calling: usize,
    pub in_call: usize,
    pub completed: usize,
    pub no_answer: usize,
    pub declined: usize,
    pub failed: usize,
}

struct CampaignInner {
    entries: Vec<QueueEntry>,
    conducted: Vec<CompletedInterview>,
}

/// One job's call campaign.
pub struct Campaign {
    pub job_id: Uuid,
    pub spec: CampaignSpec,
    pub assistant_id: String,
    pub max_parallel_calls: usize,
    store: SnapshotStore,
    inner: Mutex<CampaignInner>,
    /// Reentrancy guard: set while a driver task is live.
    driver_running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Campaign {
    fn lock(&self) -> MutexGuard<'_, CampaignInner> {
        // Lock poisoning would mean a panic while persisting; the snapshot on
        // disk is still the last consistent one, so continue with the data.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist_queue(&self, inner: &CampaignInner) -> Result<(), StoreError> {
        self.store.save_queue(self.job_id, &inner.entries)
    }

    /// Claims the driver slot. Returns false if a driver task is already
    /// live; the caller must clear the flag with `release_driver` when done.
    pub fn claim_driver(&self) -> bool {
        !self.driver_running.swap(true, Ordering::SeqCst)
    }

    pub fn release_driver(&self) {
        self.driver_running.store(false, Ordering::SeqCst);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Tears the campaign down: the driver and every poller observe the
    /// shutdown channel and exit at their next suspension point.
    pub fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    // ── Queue operations ────────────────────────────────────────────────

    /// Appends candidates as `queued` entries. A candidate whose phone
    /// number matches an existing non-terminal entry is skipped, so a
    /// candidate can never be double-booked while a call is pending.
    /// Returns (added, skipped).
    pub fn enqueue(&self, candidates: Vec<Candidate>) -> Result<(usize, usize), StoreError> {
        let mut inner = self.lock();
        let mut added = 0;
        let mut skipped = 0;

        for candidate in candidates {
            let key = dedup_key(&candidate.phone);
            let pending = inner.entries.iter().any(|e| {
                !e.status.is_terminal() && dedup_key(&e.candidate.phone) == key
            });
            if pending {
                skipped += 1;
                continue;
            }
            inner.entries.push(QueueEntry::new(candidate));
            added += 1;
        }

        if added > 0 {
            self.persist_queue(&inner)?;
        }
        Ok((added, skipped))
    }

    /// Claims up to `capacity` queued entries FIFO for launching, marking
    /// them `calling` with `started_at` set before any network traffic so a
    /// crash mid-launch is still observable as "was attempting to call".
    ///
    /// A snapshot write failure is logged rather than returned: the claimed
    /// entries are already transitioned in memory and must reach the
    /// launcher either way.
    pub fn claim_for_launch(&self, capacity: usize) -> Vec<(Uuid, Candidate)> {
        let mut inner = self.lock();
        let mut claimed = Vec::new();

        for entry in inner.entries.iter_mut() {
            if claimed.len() >= capacity {
                break;
            }
            if entry.status == CallStatus::Queued {
                entry.status = CallStatus::Calling;
                entry.started_at = Some(Utc::now());
                claimed.push((entry.id, entry.candidate.clone()));
            }
        }

        if !claimed.is_empty() {
            if let Err(e) = self.persist_queue(&inner) {
                tracing::error!("Failed to persist queue snapshot after claim: {e}");
            }
        }
        claimed
    }

    /// Applies a patch to one entry by identity and re-persists the
    /// snapshot. Returns false if the entry no longer exists.
    pub fn patch(
        &self,
        entry_id: Uuid,
        patch: impl FnOnce(&mut QueueEntry),
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.iter_mut().find(|e| e.id == entry_id) else {
            return Ok(false);
        };
        patch(entry);
        self.persist_queue(&inner)?;
        Ok(true)
    }

    /// Moves a completed entry out of the active queue and into the
    /// conducted-interview collection.
    pub fn complete(
        &self,
        entry_id: Uuid,
        interview: CompletedInterview,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.entries.retain(|e| e.id != entry_id);
        inner.conducted.push(interview);
        self.persist_queue(&inner)?;
        self.store.save_interviews(self.job_id, &inner.conducted)?;
        Ok(())
    }

    /// Operator retry: only terminal, non-completed entries are eligible.
    /// Returns false if the entry is missing or not in a terminal state.
    pub fn retry(&self, entry_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.iter_mut().find(|e| e.id == entry_id) else {
            return Ok(false);
        };
        if !entry.status.is_terminal() {
            return Ok(false);
        }
        entry.reset_for_retry();
        self.persist_queue(&inner)?;
        Ok(true)
    }

    pub fn remove(&self, entry_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|e| e.id != entry_id);
        if inner.entries.len() == before {
            return Ok(false);
        }
        self.persist_queue(&inner)?;
        Ok(true)
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn get_entry(&self, entry_id: Uuid) -> Option<QueueEntry> {
        self.lock().entries.iter().find(|e| e.id == entry_id).cloned()
    }

    pub fn entries(&self) -> Vec<QueueEntry> {
        self.lock().entries.clone()
    }

    pub fn conducted(&self) -> Vec<CompletedInterview> {
        self.lock().conducted.clone()
    }

    pub fn queued_count(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.status == CallStatus::Queued)
            .count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.status.is_in_flight())
            .count()
    }

    pub fn counts(&self) -> StatusCounts {
        let inner = self.lock();
        let mut counts = StatusCounts::default();
        for entry in &inner.entries {
            match entry.status {
                CallStatus::Queued => counts.queued += 1,
                CallStatus::Calling => counts.calling += 1,
                CallStatus::InCall => counts.in_call += 1,
                CallStatus::Completed => counts.completed += 1,
                CallStatus::NoAnswer => counts.no_answer += 1,
                CallStatus::Declined => counts.declined += 1,
                CallStatus::Failed => counts.failed += 1,
            }
        }
        counts.completed += inner.conducted.len();
        counts
    }
}

/// Dedup identity for a candidate: the normalized phone number when the raw
/// form parses, otherwise the raw string.
fn dedup_key(phone: &str) -> String {
    normalize_phone(phone).unwrap_or_else(|_| phone.trim().to_string())
}

/// Registry of open campaigns, one per job id.
pub struct CampaignManager {
    store: SnapshotStore,
    assistant_id: String,
    max_parallel_calls: usize,
    campaigns: Mutex<HashMap<Uuid, std::sync::Arc<Campaign>>>,
}

impl CampaignManager {
    pub fn new(store: SnapshotStore, assistant_id: String, max_parallel_calls: usize) -> Self {
        Self {
            store,
            assistant_id,
            max_parallel_calls,
            campaigns: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Uuid, std::sync::Arc<Campaign>>> {
        match self.campaigns.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Opens the campaign for a job, rehydrating persisted snapshots.
    /// Opening an already-open campaign returns the existing one unchanged.
    ///
    /// Entries left `calling` with no call id by an earlier crash have an
    /// unknowable launch outcome and are marked `failed` for operator
    /// review; entries with a call id are returned for the caller to resume
    /// polling.
    pub fn open(
        &self,
        job_id: Uuid,
        spec: CampaignSpec,
    ) -> Result<(std::sync::Arc<Campaign>, Vec<(Uuid, String)>), StoreError> {
        let mut registry = self.registry();
        if let Some(existing) = registry.get(&job_id) {
            return Ok((existing.clone(), Vec::new()));
        }

        let mut entries = self.store.load_queue(job_id)?;
        let conducted = self.store.load_interviews(job_id)?;

        let mut resumable = Vec::new();
        for entry in entries.iter_mut() {
            if !entry.status.is_in_flight() {
                continue;
            }
            match &entry.call_id {
                Some(call_id) => resumable.push((entry.id, call_id.clone())),
                None => {
                    warn!(
                        "Entry {} for {} was interrupted before launch; marking failed",
                        entry.id, entry.candidate.name
                    );
                    entry.status = CallStatus::Failed;
                    entry.ended_at = Some(Utc::now());
                    entry.last_error = Some("call interrupted before launch".to_string());
                }
            }
        }
        self.store.save_queue(job_id, &entries)?;

        let (shutdown, _) = watch::channel(false);
        let campaign = std::sync::Arc::new(Campaign {
            job_id,
            spec,
            assistant_id: self.assistant_id.clone(),
            max_parallel_calls: self.max_parallel_calls,
            store: self.store.clone(),
            inner: Mutex::new(CampaignInner { entries, conducted }),
            driver_running: AtomicBool::new(false),
            shutdown,
        });
        registry.insert(job_id, campaign.clone());
        info!(
            "Opened campaign for job {job_id} ({} queued, {} resumable)",
            campaign.queued_count(),
            resumable.len()
        );
        Ok((campaign, resumable))
    }

    pub fn get(&self, job_id: Uuid) -> Option<std::sync::Arc<Campaign>> {
        self.registry().get(&job_id).cloned()
    }

    /// Stops a campaign: cancels its driver and pollers and drops it from
    /// the registry. Persisted snapshots survive for a later `open`.
    pub fn stop(&self, job_id: Uuid) -> bool {
        let removed = self.registry().remove(&job_id);
        match removed {
            Some(campaign) => {
                campaign.cancel();
                info!("Stopped campaign for job {job_id}");
                true
            }
            None => false,
        }
    }
}
