//! Process-wide ledger of in-flight copy jobs.

use crate::ChannelId;
use crate::error::RelayError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One registered copy, keyed by its destination channel.
#[derive(Debug, Clone, Copy)]
struct ActiveCopy {
    source: ChannelId,
    job: u64,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<ChannelId, ActiveCopy>,
    next_job: u64,
}

/// Shared map from destination channel to the copy currently allowed to
/// write there.
///
/// Presence of an entry is the job's authorization to keep going:
/// removing it is how a job gets cancelled, from any task, without
/// signalling the job directly. Entries carry a per-job number so a
/// stopped-and-restarted destination cannot be torn down by the old
/// job's cleanup.
#[derive(Clone, Debug, Default)]
pub struct CopyRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl CopyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a copy into `dest` from `source`, returning the ticket the
    /// engine polls at its cancellation checkpoints.
    ///
    /// Rejected when `dest` already has an active job, or when `source` is
    /// itself being written by another job. Reading a channel while it is
    /// being rewritten would replay a torn history.
    pub fn begin(&self, dest: ChannelId, source: ChannelId) -> Result<CopyTicket, RelayError> {
        let mut inner = self.inner.lock().expect("copy registry lock poisoned");
        if let Some(existing) = inner.jobs.get(&dest) {
            return Err(RelayError::AlreadyActive {
                dest,
                source: existing.source,
            });
        }
        if inner.jobs.contains_key(&source) {
            return Err(RelayError::SourceBusy(source));
        }
        let job = inner.next_job;
        inner.next_job += 1;
        inner.jobs.insert(dest, ActiveCopy { source, job });
        Ok(CopyTicket {
            registry: self.clone(),
            dest,
            job,
        })
    }

    /// Remove the entry for `dest`, cancelling whatever job holds it.
    /// Idempotent; returns whether an entry was removed.
    pub fn stop(&self, dest: ChannelId) -> bool {
        let mut inner = self.inner.lock().expect("copy registry lock poisoned");
        inner.jobs.remove(&dest).is_some()
    }

    /// Source channel of the job currently writing into `dest`, if any.
    pub fn source_of(&self, dest: ChannelId) -> Option<ChannelId> {
        let inner = self.inner.lock().expect("copy registry lock poisoned");
        inner.jobs.get(&dest).map(|copy| copy.source)
    }

    fn still_holds(&self, dest: ChannelId, job: u64) -> bool {
        let inner = self.inner.lock().expect("copy registry lock poisoned");
        inner.jobs.get(&dest).is_some_and(|copy| copy.job == job)
    }

    fn release(&self, dest: ChannelId, job: u64) {
        let mut inner = self.inner.lock().expect("copy registry lock poisoned");
        if inner.jobs.get(&dest).is_some_and(|copy| copy.job == job) {
            inner.jobs.remove(&dest);
        }
    }
}

/// Marker for a job that found its registry entry gone at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Authorization token for one copy job.
///
/// Dropping the ticket releases the registry entry, so a job can never
/// outlive its registration no matter how it unwinds. The release is
/// keyed on the job number: a ticket from a superseded job leaves a
/// successor's entry alone.
#[derive(Debug)]
pub struct CopyTicket {
    registry: CopyRegistry,
    dest: ChannelId,
    job: u64,
}

impl CopyTicket {
    /// True once the destination's entry is gone or owned by another job.
    pub fn is_cancelled(&self) -> bool {
        !self.registry.still_holds(self.dest, self.job)
    }

    /// Checkpoint form of `is_cancelled` for `?`-style early exit.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
    }

    pub fn dest(&self) -> ChannelId {
        self.dest
    }
}

impl Drop for CopyTicket {
    fn drop(&mut self) {
        self.registry.release(self.dest, self.job);
    }
}
