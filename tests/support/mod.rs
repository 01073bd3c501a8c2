#![allow(dead_code)]

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use magforge::application::dispatch::JobDispatcher;
use magforge::application::generate::GenerationService;
use magforge::application::render::{RenderError, RenderInvocation, Renderer};
use magforge::application::retry::RetryPolicy;
use magforge::application::watcher::WatchLimits;
use magforge::domain::canonical::Canonicalizer;
use magforge::infra::schema::FileShapeSchema;
use magforge::infra::store::ArtifactStore;
use serde_json::{Value, json};
use tokio::sync::Mutex;

/// What the stub does on one call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Write these bytes to the expected output path.
    Write(Vec<u8>),
    /// Return this error without writing anything.
    Fail(RenderError),
    /// Report success but never write the output.
    Silent,
}

/// Renderer that replays scripted steps; the last step repeats.
pub struct ScriptedRenderer {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedRenderer {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Self::with_delay(steps, Duration::ZERO)
    }

    pub fn with_delay(steps: Vec<Step>, delay: Duration) -> Arc<Self> {
        let last = steps.last().cloned().unwrap_or(Step::Silent);
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(last),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn always(step: Step) -> Arc<Self> {
        Self::new(vec![step])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn render(&self, invocation: &RenderInvocation) -> Result<(), RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = match self.steps.lock().await.pop_front() {
            Some(step) => step,
            None => self.last.lock().await.clone(),
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match step {
            Step::Write(bytes) => {
                tokio::fs::write(invocation.output_path(), bytes)
                    .await
                    .map_err(|err| RenderError::io(err.to_string()))?;
                Ok(())
            }
            Step::Fail(err) => Err(err),
            Step::Silent => Ok(()),
        }
    }
}

pub fn fast_limits() -> WatchLimits {
    WatchLimits {
        existence_max_polls: 20,
        stability_max_polls: 50,
        poll_interval: Duration::from_millis(2),
    }
}

pub fn service_with_timeout(
    root: &Path,
    renderer: Arc<ScriptedRenderer>,
    request_timeout: Duration,
) -> GenerationService {
    let schema = FileShapeSchema::bundled().expect("bundled schema");
    let store = ArtifactStore::new(root.to_path_buf()).expect("store");
    let dispatcher = JobDispatcher::new(renderer, store, 4, fast_limits());
    GenerationService::new(
        Canonicalizer::new(Arc::new(schema)),
        dispatcher,
        RetryPolicy::new(NonZeroU32::new(3).expect("non-zero"), Duration::ZERO),
        request_timeout,
    )
}

pub fn service(root: &Path, renderer: Arc<ScriptedRenderer>) -> GenerationService {
    service_with_timeout(root, renderer, Duration::from_secs(10))
}

/// Core whose shape carries `A` as a tolerance or a nominal value.
pub fn core_payload(dimension_a: Value) -> Value {
    json!({
        "name": "E 10/5/3",
        "functionalDescription": {
            "type": "two-piece set",
            "material": {"name": "N87", "permeability": 2200},
            "shape": {"family": "e", "dims": {"A": dimension_a}},
            "gapping": [],
            "numberStacks": 1
        }
    })
}

pub fn shape_payload(dimensions: Value) -> Value {
    json!({"family": "e", "familySubtype": 1, "dimensions": dimensions})
}
