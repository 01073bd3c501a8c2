use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{fingerprint::Fingerprint, types::JobState};

use super::JobOutcome;

struct InFlightJob {
    job_id: Uuid,
    state: JobState,
    outcome: broadcast::Sender<JobOutcome>,
}

/// Jobs currently pending or running, keyed by fingerprint.
#[derive(Default, Clone)]
pub(super) struct InFlightJobs {
    jobs: Arc<DashMap<Fingerprint, InFlightJob>>,
}

pub(super) enum Registration {
    /// A new job was registered; the caller must start it.
    Started {
        guard: InFlightGuard,
        receiver: broadcast::Receiver<JobOutcome>,
    },
    /// A job for the fingerprint already exists.
    Joined {
        job_id: Uuid,
        receiver: broadcast::Receiver<JobOutcome>,
    },
}

impl InFlightJobs {
    pub(super) fn new() -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
        }
    }

    /// Register `job_id` for `fingerprint`, or subscribe to the job already
    /// registered for it. Subscription happens under the entry lock, so a
    /// joined receiver always observes the outcome.
    pub(super) fn register(&self, fingerprint: &Fingerprint, job_id: Uuid) -> Registration {
        match self.jobs.entry(fingerprint.clone()) {
            Entry::Occupied(occupied) => {
                let existing = occupied.get();
                Registration::Joined {
                    job_id: existing.job_id,
                    receiver: existing.outcome.subscribe(),
                }
            }
            Entry::Vacant(vacant) => {
                let (outcome, receiver) = broadcast::channel(1);
                vacant.insert(InFlightJob {
                    job_id,
                    state: JobState::Pending,
                    outcome,
                });
                Registration::Started {
                    guard: InFlightGuard {
                        fingerprint: fingerprint.clone(),
                        job_id,
                        jobs: Arc::clone(&self.jobs),
                    },
                    receiver,
                }
            }
        }
    }

    pub(super) fn state(&self, fingerprint: &Fingerprint) -> Option<JobState> {
        self.jobs.get(fingerprint).map(|job| job.state)
    }

    pub(super) fn len(&self) -> usize {
        self.jobs.len()
    }
}

/// Owned by the task running a registered job. Removes the registration when
/// the job finishes or the task is dropped.
pub(super) struct InFlightGuard {
    fingerprint: Fingerprint,
    job_id: Uuid,
    jobs: Arc<DashMap<Fingerprint, InFlightJob>>,
}

impl InFlightGuard {
    pub(super) fn set_state(&self, state: JobState) {
        if let Some(mut job) = self.jobs.get_mut(&self.fingerprint) {
            if job.job_id == self.job_id {
                job.state = state;
            }
        }
    }

    /// Deregister, then publish the outcome to every subscriber.
    pub(super) fn finish(self, outcome: JobOutcome) {
        let removed = self
            .jobs
            .remove_if(&self.fingerprint, |_, job| job.job_id == self.job_id);
        if let Some((_, job)) = removed {
            // No receivers left means every caller gave up waiting.
            let _ = job.outcome.send(outcome);
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.jobs
            .remove_if(&self.fingerprint, |_, job| job.job_id == self.job_id);
    }
}
