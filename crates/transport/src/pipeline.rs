//! Ordered request middleware
//!
//! A `Pipeline` is an explicit, ordered list of `RequestStage`s. Each stage
//! takes a request value and returns a (possibly) decorated copy. Stages are
//! pure functions of their own state: they cannot fail and they never perform
//! I/O, so the pipeline can be re-run on a replay to pick up a fresh
//! credential.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::ApiRequest;

/// One request transformer in the outbound pipeline.
pub trait RequestStage: Send + Sync {
    /// Identifier for logging (e.g. "default-headers", "bearer")
    fn name(&self) -> &str;

    /// Produce the decorated request.
    fn apply(&self, request: ApiRequest) -> ApiRequest;
}

/// Ordered list of request stages, applied first to last.
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn RequestStage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; it runs after every stage already present.
    pub fn with_stage(mut self, stage: Arc<dyn RequestStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn apply(&self, request: ApiRequest) -> ApiRequest {
        self.stages.iter().fold(request, |request, stage| {
            trace!(stage = stage.name(), path = request.path(), "applying request stage");
            stage.apply(request)
        })
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}
