use std::sync::Arc;

use crate::application::generate::GenerationService;

#[derive(Clone)]
pub struct ApiState {
    pub generation: Arc<GenerationService>,
    /// Seconds advertised in `Retry-After` when a generation times out.
    pub retry_after_seconds: u64,
}

impl ApiState {
    pub fn new(generation: Arc<GenerationService>, retry_after_seconds: u64) -> Self {
        Self {
            generation,
            retry_after_seconds: retry_after_seconds.max(1),
        }
    }
}
