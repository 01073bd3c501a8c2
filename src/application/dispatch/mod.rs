//! Bounded worker pool with per-fingerprint coalescing.

mod registry;
mod worker;

use std::{path::PathBuf, sync::Arc};

use metrics::{counter, gauge};
use tokio::sync::{Semaphore, broadcast};
use tracing::debug;
use uuid::Uuid;

use crate::{
    application::{
        render::Renderer,
        watcher::{FileInspector, FsInspector, WatchLimits},
    },
    domain::{canonical::CanonicalRequest, fingerprint::Fingerprint, types::JobState},
    infra::{
        store::{ArtifactStore, StoredArtifact},
        telemetry::{JOBS_COALESCED_TOTAL, JOBS_IN_FLIGHT},
    },
};

use registry::{InFlightJobs, Registration};
use worker::WorkerContext;

/// One render attempt for one fingerprint.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub request: Arc<CanonicalRequest>,
    /// 1-based attempt number within a generation.
    pub attempt: u32,
}

impl Job {
    pub fn new(fingerprint: Fingerprint, request: Arc<CanonicalRequest>, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint,
            request,
            attempt,
        }
    }
}

#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded(StoredArtifact),
    FailedTransient { reason: String },
    FailedPermanent { reason: String },
}

impl JobOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::FailedTransient {
            reason: reason.into(),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::FailedPermanent {
            reason: reason.into(),
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Succeeded(_) => JobState::Succeeded,
            JobOutcome::FailedTransient { .. } => JobState::FailedTransient,
            JobOutcome::FailedPermanent { .. } => JobState::FailedPermanent,
        }
    }
}

/// Subscription to the job serving a submission.
#[derive(Debug)]
pub struct JobHandle {
    job_id: Uuid,
    coalesced: bool,
    receiver: broadcast::Receiver<JobOutcome>,
}

impl JobHandle {
    /// Id of the job doing the work, which differs from the submitted job
    /// when the submission was coalesced.
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn coalesced(&self) -> bool {
        self.coalesced
    }

    pub async fn outcome(mut self) -> JobOutcome {
        match self.receiver.recv().await {
            Ok(outcome) => outcome,
            Err(_) => JobOutcome::transient("job ended without reporting an outcome"),
        }
    }
}

#[derive(Clone)]
pub struct JobDispatcher {
    context: WorkerContext,
    permits: Arc<Semaphore>,
    jobs: InFlightJobs,
}

impl JobDispatcher {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        store: ArtifactStore,
        worker_concurrency: usize,
        limits: WatchLimits,
    ) -> Self {
        Self {
            context: WorkerContext {
                renderer,
                store,
                inspector: Arc::new(FsInspector),
                limits,
                cci_coordinates_path: None,
            },
            permits: Arc::new(Semaphore::new(worker_concurrency.max(1))),
            jobs: InFlightJobs::new(),
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn FileInspector>) -> Self {
        self.context.inspector = inspector;
        self
    }

    pub fn with_cci_coordinates_path(mut self, path: Option<PathBuf>) -> Self {
        self.context.cci_coordinates_path = path;
        self
    }

    /// Start `job`, or join the job already running for its fingerprint.
    pub fn submit(&self, job: Job) -> JobHandle {
        match self.jobs.register(&job.fingerprint, job.id) {
            Registration::Joined { job_id, receiver } => {
                counter!(JOBS_COALESCED_TOTAL).increment(1);
                debug!(
                    target = "application::dispatch",
                    fingerprint = %job.fingerprint,
                    job_id = %job_id,
                    "Joined in-flight job"
                );
                JobHandle {
                    job_id,
                    coalesced: true,
                    receiver,
                }
            }
            Registration::Started { guard, receiver } => {
                let job_id = job.id;
                let context = self.context.clone();
                let permits = Arc::clone(&self.permits);
                gauge!(JOBS_IN_FLIGHT).increment(1.0);

                tokio::spawn(async move {
                    let outcome = match permits.acquire_owned().await {
                        Ok(_permit) => {
                            guard.set_state(JobState::Running);
                            worker::run(&context, &job).await
                        }
                        Err(_) => JobOutcome::transient("worker pool is shut down"),
                    };
                    guard.finish(outcome);
                    gauge!(JOBS_IN_FLIGHT).decrement(1.0);
                });

                JobHandle {
                    job_id,
                    coalesced: false,
                    receiver,
                }
            }
        }
    }

    pub fn state(&self, fingerprint: &Fingerprint) -> Option<JobState> {
        self.jobs.state(fingerprint)
    }

    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.context.store
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        application::render::{RenderError, RenderInvocation},
        domain::{
            canonical::Canonicalizer, entities::GenerationRequest, schema::ShapeSchema,
            types::OperationKind,
        },
    };

    struct NoShapes;

    impl ShapeSchema for NoShapes {
        fn dimension_keys(
            &self,
            _family: &str,
            _subtype: &str,
        ) -> Option<&std::collections::BTreeSet<String>> {
            None
        }
    }

    struct SlowWriter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for SlowWriter {
        async fn render(&self, invocation: &RenderInvocation) -> Result<(), RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::write(invocation.output_path(), b"<svg/>")
                .await
                .map_err(|err| RenderError::io(err.to_string()))
        }
    }

    /// Never sees the output appear.
    struct BlindInspector;

    #[async_trait]
    impl FileInspector for BlindInspector {
        async fn size(&self, _path: &Path) -> io::Result<Option<u64>> {
            Ok(None)
        }

        async fn read(&self, _path: &Path) -> io::Result<Bytes> {
            Err(io::Error::new(io::ErrorKind::NotFound, "blind"))
        }
    }

    fn wire_job() -> Job {
        let request = Canonicalizer::new(Arc::new(NoShapes))
            .canonicalize(&GenerationRequest::new(
                OperationKind::WirePlot,
                json!({"wire": {"type": "litz", "material": "copper"}}),
            ))
            .expect("canonical");
        let fingerprint = Fingerprint::of(&request);
        Job::new(fingerprint, Arc::new(request), 1)
    }

    fn limits() -> WatchLimits {
        WatchLimits {
            existence_max_polls: 5,
            stability_max_polls: 20,
            poll_interval: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn second_submission_joins_the_running_job() {
        let dir = TempDir::new().expect("temp dir");
        let renderer = Arc::new(SlowWriter {
            calls: AtomicUsize::new(0),
        });
        let store = ArtifactStore::new(dir.path().to_path_buf()).expect("store");
        let dispatcher = JobDispatcher::new(renderer.clone(), store, 2, limits());

        let first_job = wire_job();
        let first_id = first_job.id;
        let first = dispatcher.submit(first_job);
        let second = dispatcher.submit(wire_job());

        assert!(!first.coalesced());
        assert!(second.coalesced());
        assert_eq!(first.job_id(), first_id);
        assert_eq!(second.job_id(), first_id);
        assert_eq!(dispatcher.in_flight(), 1);

        let (a, b) = tokio::join!(first.outcome(), second.outcome());
        assert_eq!(a.state(), JobState::Succeeded);
        assert_eq!(b.state(), JobState::Succeeded);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn output_that_never_appears_is_transient() {
        let dir = TempDir::new().expect("temp dir");
        let renderer = Arc::new(SlowWriter {
            calls: AtomicUsize::new(0),
        });
        let store = ArtifactStore::new(dir.path().to_path_buf()).expect("store");
        let dispatcher = JobDispatcher::new(renderer, store, 1, limits())
            .with_inspector(Arc::new(BlindInspector));

        let job = wire_job();
        let fingerprint = job.fingerprint.clone();
        let outcome = dispatcher.submit(job).outcome().await;

        assert!(matches!(outcome, JobOutcome::FailedTransient { .. }));
        assert!(
            !dispatcher
                .store()
                .exists(&fingerprint, OperationKind::WirePlot.artifact_kind(None))
                .await
        );
    }
}
