//! The `generate` operation: canonicalize, look up, render on a miss.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use metrics::counter;
use tracing::{info, warn};

use crate::{
    domain::{
        canonical::{CanonicalRequest, Canonicalizer},
        entities::GenerationRequest,
        error::CanonicalizationError,
        fingerprint::Fingerprint,
    },
    infra::{
        store::{ArtifactStore, StoreError},
        telemetry::{
            CACHE_CORRUPT_TOTAL, CACHE_HIT_TOTAL, CACHE_MISS_TOTAL, FAILURE_TOTAL, RETRY_TOTAL,
        },
    },
};

use super::{
    assemble::{self, GeneratedArtifact},
    dispatch::{Job, JobDispatcher, JobOutcome},
    error::GenerationError,
    retry::{RetryDecision, RetryPolicy},
};

/// A canonicalized request and its cache key.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub request: Arc<CanonicalRequest>,
    pub fingerprint: Fingerprint,
}

#[derive(Clone)]
pub struct GenerationService {
    canonicalizer: Canonicalizer,
    dispatcher: JobDispatcher,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl GenerationService {
    pub fn new(
        canonicalizer: Canonicalizer,
        dispatcher: JobDispatcher,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            canonicalizer,
            dispatcher,
            retry,
            request_timeout,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        self.dispatcher.store()
    }

    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    pub fn prepare(
        &self,
        request: &GenerationRequest,
    ) -> Result<PreparedRequest, CanonicalizationError> {
        let canonical = self.canonicalizer.canonicalize(request)?;
        let fingerprint = Fingerprint::of(&canonical);
        Ok(PreparedRequest {
            request: Arc::new(canonical),
            fingerprint,
        })
    }

    pub async fn is_cached(&self, prepared: &PreparedRequest) -> bool {
        self.store()
            .exists(&prepared.fingerprint, prepared.request.artifact_kind())
            .await
    }

    /// Return the artifact for `request`, rendering it when it is not cached.
    ///
    /// The whole call is bounded by the request timeout. Hitting it abandons
    /// the wait only; a running job still completes and fills the cache.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let started_at = Instant::now();
        let deadline = tokio::time::Instant::now() + self.request_timeout;
        let prepared = self.prepare(request)?;
        let kind = prepared.request.artifact_kind();
        let kind_label = kind.operation.as_str();

        match self.store().load(&prepared.fingerprint, kind).await {
            Ok(stored) => {
                counter!(CACHE_HIT_TOTAL, "kind" => kind_label).increment(1);
                info!(
                    target = "application::generate",
                    op = "generate",
                    result = "hit",
                    fingerprint = %prepared.fingerprint,
                    kind = kind_label,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Served artifact from cache"
                );
                return Ok(assemble::hit(stored));
            }
            Err(StoreError::NotFound { .. }) => {
                counter!(CACHE_MISS_TOTAL, "kind" => kind_label).increment(1);
            }
            Err(StoreError::Corrupt { path, reason }) => {
                counter!(CACHE_CORRUPT_TOTAL, "kind" => kind_label).increment(1);
                counter!(CACHE_MISS_TOTAL, "kind" => kind_label).increment(1);
                warn!(
                    target = "application::generate",
                    op = "generate",
                    fingerprint = %prepared.fingerprint,
                    kind = kind_label,
                    path = %path.display(),
                    reason = %reason,
                    "Cached artifact unreadable, regenerating"
                );
            }
            Err(err) => return Err(err.into()),
        }

        let attempts = AtomicU32::new(0);
        let result = match tokio::time::timeout_at(deadline, self.render(&prepared, &attempts)).await
        {
            Ok(result) => result,
            Err(_) => {
                counter!(FAILURE_TOTAL, "kind" => kind_label, "reason" => "deadline").increment(1);
                Err(GenerationError::Timeout {
                    fingerprint: prepared.fingerprint.clone(),
                    attempts: attempts.load(Ordering::Relaxed),
                })
            }
        };

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        match &result {
            Ok(artifact) => info!(
                target = "application::generate",
                op = "generate",
                result = "miss",
                fingerprint = %prepared.fingerprint,
                kind = kind_label,
                attempts = artifact.attempts,
                elapsed_ms,
                "Generated artifact"
            ),
            Err(err) => warn!(
                target = "application::generate",
                op = "generate",
                result = "error",
                fingerprint = %prepared.fingerprint,
                kind = kind_label,
                error_code = err.code(),
                elapsed_ms,
                error = %err,
                "Generation failed"
            ),
        }
        result
    }

    async fn render(
        &self,
        prepared: &PreparedRequest,
        attempts: &AtomicU32,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let kind_label = prepared.request.kind().as_str();
        let mut attempt = 1;
        loop {
            attempts.store(attempt, Ordering::Relaxed);
            let job = Job::new(
                prepared.fingerprint.clone(),
                Arc::clone(&prepared.request),
                attempt,
            );
            let outcome = self.dispatcher.submit(job).outcome().await;
            let decision = self.retry.decide(attempt, &outcome);

            match (outcome, decision) {
                (JobOutcome::Succeeded(stored), _) => {
                    return Ok(assemble::generated(stored, attempt));
                }
                (JobOutcome::FailedPermanent { reason }, _) => {
                    counter!(FAILURE_TOTAL, "kind" => kind_label, "reason" => "invalid_geometry")
                        .increment(1);
                    return Err(GenerationError::InvalidGeometry {
                        fingerprint: prepared.fingerprint.clone(),
                        reason,
                    });
                }
                (JobOutcome::FailedTransient { reason }, RetryDecision::Retry { delay }) => {
                    counter!(RETRY_TOTAL, "kind" => kind_label).increment(1);
                    warn!(
                        target = "application::generate",
                        op = "generate::retry",
                        fingerprint = %prepared.fingerprint,
                        kind = kind_label,
                        attempt,
                        max_attempts = self.retry.max_attempts(),
                        reason = %reason,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                (JobOutcome::FailedTransient { .. }, _) => {
                    counter!(FAILURE_TOTAL, "kind" => kind_label, "reason" => "exhausted")
                        .increment(1);
                    return Err(GenerationError::Timeout {
                        fingerprint: prepared.fingerprint.clone(),
                        attempts: attempt,
                    });
                }
            }
        }
    }
}
