//! Shared run context.

use tokio_util::sync::CancellationToken;

/// Context shared by every stage of one run.
///
/// Every stage of a run holds the same context. A failing stage cancels the
/// token so that its neighbours stop instead of finalizing partial output.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Input name, used in log fields.
    pub name: String,
    /// Cancelled when any stage of the run fails or the run is dropped.
    pub token: CancellationToken,
}

impl PipelineContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            name: "unnamed".to_string(),
            token,
        }
    }

    pub fn with_name(name: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            name: name.into(),
            ..Self::new(token)
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
