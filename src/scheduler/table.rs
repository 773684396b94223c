//! Time-ordered job table.
//!
//! Jobs are keyed by id for upsert/cancel and ordered by `(run_at, seq)` for
//! evaluation, where `seq` is a monotonically increasing insertion counter
//! that breaks ties between equal due times.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::scheduler::job::{Job, JobId};

struct Entry<P> {
    run_at: DateTime<Utc>,
    seq: u64,
    payload: P,
}

pub(crate) struct JobTable<P> {
    entries: HashMap<JobId, Entry<P>>,
    queue: BTreeSet<(DateTime<Utc>, u64, JobId)>,
    next_seq: u64,
}

impl<P> JobTable<P> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            queue: BTreeSet::new(),
            next_seq: 0,
        }
    }

    /// Insert or replace a job. Returns `true` if an existing job was replaced.
    pub(crate) fn upsert(&mut self, id: JobId, run_at: DateTime<Utc>, payload: P) -> bool {
        let replaced = self.remove(&id).is_some();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert((run_at, seq, id.clone()));
        self.entries.insert(
            id,
            Entry {
                run_at,
                seq,
                payload,
            },
        );
        replaced
    }

    pub(crate) fn remove(&mut self, id: &JobId) -> Option<Job<P>> {
        let entry = self.entries.remove(id)?;
        self.queue.remove(&(entry.run_at, entry.seq, id.clone()));
        Some(Job {
            id: id.clone(),
            run_at: entry.run_at,
            payload: entry.payload,
        })
    }

    pub(crate) fn contains(&self, id: &JobId) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn run_at(&self, id: &JobId) -> Option<DateTime<Utc>> {
        self.entries.get(id).map(|e| e.run_at)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Due time of the earliest job.
    pub(crate) fn next_due(&self) -> Option<DateTime<Utc>> {
        self.queue.first().map(|(run_at, _, _)| *run_at)
    }

    /// Remove and return the earliest job if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: DateTime<Utc>) -> Option<Job<P>> {
        let (run_at, _, id) = self.queue.first()?;
        if *run_at > now {
            return None;
        }
        let id = id.clone();
        self.remove(&id)
    }
}
