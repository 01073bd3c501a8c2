use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use bytes::Bytes;
use metrics::histogram;
use serde_json::Value;
use tokio::fs;
use tracing::{info, warn};

use crate::{
    application::{
        render::{RenderInvocation, RenderProfile, Renderer},
        watcher::{FileInspector, WatchLimits, WatchOutcome, await_completion},
    },
    domain::types::ArtifactFormat,
    infra::{store::ArtifactStore, telemetry::RENDER_MS},
};

use super::{Job, JobOutcome};

const VIEW_KEYS: [&str; 2] = ["top_view", "front_view"];

/// Everything a worker needs to run one attempt.
#[derive(Clone)]
pub(super) struct WorkerContext {
    pub renderer: Arc<dyn Renderer>,
    pub store: ArtifactStore,
    pub inspector: Arc<dyn FileInspector>,
    pub limits: WatchLimits,
    pub cci_coordinates_path: Option<PathBuf>,
}

/// Run a single attempt. The staging directory is removed afterwards
/// regardless of the outcome.
pub(super) async fn run(ctx: &WorkerContext, job: &Job) -> JobOutcome {
    let started_at = Instant::now();
    let staging = ctx.store.staging_dir(job.id);
    let kind = job.request.kind();

    let outcome = attempt(ctx, job, &staging).await;

    match fs::remove_dir_all(&staging).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(
            target = "application::dispatch::worker",
            job_id = %job.id,
            path = %staging.display(),
            error = %err,
            "Failed to remove staging directory"
        ),
    }

    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    histogram!(RENDER_MS, "kind" => kind.as_str(), "result" => outcome.state().as_str())
        .record(elapsed_ms as f64);

    match &outcome {
        JobOutcome::Succeeded(stored) => info!(
            target = "application::dispatch::worker",
            op = "worker::run",
            result = "ok",
            job_id = %job.id,
            fingerprint = %job.fingerprint,
            kind = kind.as_str(),
            attempt = job.attempt,
            size_bytes = stored.record.size_bytes,
            elapsed_ms,
            "Artifact generated"
        ),
        JobOutcome::FailedTransient { reason } | JobOutcome::FailedPermanent { reason } => warn!(
            target = "application::dispatch::worker",
            op = "worker::run",
            result = outcome.state().as_str(),
            job_id = %job.id,
            fingerprint = %job.fingerprint,
            kind = kind.as_str(),
            attempt = job.attempt,
            elapsed_ms,
            reason = %reason,
            "Render attempt failed"
        ),
    }

    outcome
}

async fn attempt(ctx: &WorkerContext, job: &Job, staging: &Path) -> JobOutcome {
    if let Err(err) = fs::create_dir_all(staging).await {
        return JobOutcome::transient(format!("failed to create staging directory: {err}"));
    }

    let invocation = RenderInvocation {
        job_id: job.id,
        request: Arc::clone(&job.request),
        profile: RenderProfile::for_request(&job.request, ctx.cci_coordinates_path.as_deref()),
        output_dir: staging.to_path_buf(),
    };

    match ctx.renderer.render(&invocation).await {
        Ok(()) => {}
        Err(err) if err.is_permanent() => return JobOutcome::permanent(err.to_string()),
        Err(err) => return JobOutcome::transient(err.to_string()),
    }

    let output_path = invocation.output_path();
    let bytes = match await_completion(ctx.inspector.as_ref(), &output_path, ctx.limits).await {
        Ok(WatchOutcome::Ready(bytes)) => bytes,
        Ok(WatchOutcome::TimedOut { deadline, polls }) => {
            return JobOutcome::transient(format!(
                "output `{}` hit the {} deadline after {polls} polls",
                output_path.display(),
                deadline.as_str()
            ));
        }
        Err(err) => {
            return JobOutcome::transient(format!(
                "failed to observe `{}`: {err}",
                output_path.display()
            ));
        }
    };

    let kind = invocation.artifact_kind();
    if kind.format == ArtifactFormat::Json {
        if let Err(outcome) = check_view_bundle(&bytes) {
            return outcome;
        }
    }

    match ctx.store.write(&job.fingerprint, kind, bytes).await {
        Ok(stored) => JobOutcome::Succeeded(stored),
        Err(err) => JobOutcome::transient(err.to_string()),
    }
}

/// Drawings must carry both projections. A null view means the renderer could
/// not project the geometry; anything unreadable may be a bad write.
fn check_view_bundle(bytes: &Bytes) -> Result<(), JobOutcome> {
    let bundle: Value = serde_json::from_slice(bytes)
        .map_err(|err| JobOutcome::transient(format!("view bundle is not JSON: {err}")))?;
    for key in VIEW_KEYS {
        match bundle.get(key) {
            Some(Value::String(_)) => {}
            Some(Value::Null) => {
                return Err(JobOutcome::permanent(format!("renderer produced no {key}")));
            }
            Some(_) | None => {
                return Err(JobOutcome::transient(format!(
                    "view bundle is missing `{key}`"
                )));
            }
        }
    }
    Ok(())
}
