//! # Pipeline Common
//!
//! Building blocks for streaming media pipelines whose stages are
//! synchronous state machines.
//!
//! ## Features
//!
//! - [`Stage`]: a one-in, many-out transform with an explicit drain step
//! - [`Sink`]: the terminal consumer of a pipeline, handed back on success
//! - [`spawn_stage`] / [`spawn_sink`]: run a stage on the blocking pool,
//!   connected to its neighbours by bounded channels (backpressure)
//! - [`PipelineContext`]: run name plus a cancellation token shared by all stages
//! - [`settle_run`]: join every task and resolve the root-cause error
//!
//! ## Authors
//!
//! - hua0512
//!

use thiserror::Error;

pub mod channel_pipeline;
mod context;
mod run_completion;
pub mod stage;

#[cfg(test)]
mod test_utils;

pub use channel_pipeline::{spawn_sink, spawn_stage};
pub use context::PipelineContext;
pub use run_completion::{RunCompletionError, settle_run};
pub use stage::{Sink, Stage};
pub use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Common error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{0}")]
    Strategy(#[source] BoxError),

    #[error("Stage process failed ({stage}): {source}")]
    StageProcess {
        stage: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Stage finish failed ({stage}): {source}")]
    StageFinish {
        stage: &'static str,
        #[source]
        source: BoxError,
    },
}

impl PipelineError {
    /// Wrap a domain error raised inside a stage.
    pub fn strategy(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        PipelineError::Strategy(Box::new(source))
    }

    /// True for errors that only report another task's failure.
    pub fn is_consequence(&self) -> bool {
        matches!(self, PipelineError::Cancelled | PipelineError::ChannelClosed(_))
    }

    /// The domain error carried by this pipeline error, if it has type `E`.
    pub fn downcast_source<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            PipelineError::Strategy(source)
            | PipelineError::StageProcess { source, .. }
            | PipelineError::StageFinish { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Take ownership of the domain error carried by this pipeline error.
    ///
    /// Returns `self` unchanged when the source is not an `E`.
    pub fn into_source<E>(self) -> Result<E, PipelineError>
    where
        E: std::error::Error + 'static,
    {
        match self {
            PipelineError::Strategy(source) => source
                .downcast::<E>()
                .map(|e| *e)
                .map_err(PipelineError::Strategy),
            PipelineError::StageProcess { stage, source } => source
                .downcast::<E>()
                .map(|e| *e)
                .map_err(|source| PipelineError::StageProcess { stage, source }),
            PipelineError::StageFinish { stage, source } => source
                .downcast::<E>()
                .map(|e| *e)
                .map_err(|source| PipelineError::StageFinish { stage, source }),
            other => Err(other),
        }
    }
}
