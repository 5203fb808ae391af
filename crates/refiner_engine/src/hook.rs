use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// Best-effort analysis that runs before each refinement. Failures are logged, never propagated.
#[async_trait::async_trait]
pub trait AnalysisHook: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self) -> Result<(), HookError>;
}
