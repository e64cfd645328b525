use tokio::task::JoinHandle;

use crate::PipelineError;

/// Unified completion error for a sink + stage-task run.
#[derive(Debug)]
pub enum RunCompletionError {
    Writer(PipelineError),
    Pipeline(PipelineError),
}

impl RunCompletionError {
    pub fn into_inner(self) -> PipelineError {
        match self {
            RunCompletionError::Writer(err) | RunCompletionError::Pipeline(err) => err,
        }
    }
}

impl std::fmt::Display for RunCompletionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunCompletionError::Writer(err) => write!(f, "writer failed: {err}"),
            RunCompletionError::Pipeline(err) => write!(f, "pipeline failed: {err}"),
        }
    }
}

/// Wait for all processing tasks and resolve the run outcome deterministically.
///
/// Semantics:
/// - Every task is awaited, even after a failure has been seen.
/// - The reported error is the root cause: the first error, in task order
///   followed by the writer, that is not merely a consequence of another
///   task's failure (`Cancelled`, `ChannelClosed`).
/// - When every error is a consequence, the writer error wins, then the first
///   task error.
/// - If everything succeeded, return the writer output.
pub async fn settle_run<WriterOut>(
    writer_result: Result<WriterOut, PipelineError>,
    processing_tasks: Vec<JoinHandle<Result<(), PipelineError>>>,
) -> Result<WriterOut, RunCompletionError> {
    let mut first_root: Option<PipelineError> = None;
    let mut first_consequence: Option<PipelineError> = None;

    for task in processing_tasks {
        let task_result = match task.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_cancelled() => Err(PipelineError::Cancelled),
            Err(join_error) => Err(PipelineError::Strategy(Box::new(std::io::Error::other(
                format!("Pipeline task panicked: {join_error}"),
            )))),
        };

        if let Err(err) = task_result {
            if !err.is_consequence() {
                if first_root.is_none() {
                    first_root = Some(err);
                }
            } else if first_consequence.is_none() {
                first_consequence = Some(err);
            }
        }
    }

    match (writer_result, first_root, first_consequence) {
        (Ok(output), None, None) => Ok(output),
        (_, Some(root), _) => Err(RunCompletionError::Pipeline(root)),
        (Err(err), None, _) => Err(RunCompletionError::Writer(err)),
        (Ok(_), None, Some(err)) => Err(RunCompletionError::Pipeline(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::{RunCompletionError, settle_run};
    use crate::PipelineError;

    fn failed(msg: &str) -> PipelineError {
        PipelineError::strategy(std::io::Error::other(msg.to_string()))
    }

    #[tokio::test]
    async fn settle_run_returns_pipeline_error_when_writer_succeeds() {
        let tasks = vec![tokio::spawn(async { Err(failed("pipeline failed")) })];

        let result = settle_run::<usize>(Ok(1), tasks).await;
        match result {
            Err(RunCompletionError::Pipeline(err)) => {
                assert_eq!(err.to_string(), "pipeline failed");
            }
            other => panic!("expected pipeline error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn settle_run_prefers_root_cause_over_writer_cancellation() {
        let tasks = vec![
            tokio::spawn(async { Err(PipelineError::ChannelClosed("downstream")) }),
            tokio::spawn(async { Err(failed("decode failed")) }),
        ];

        let result = settle_run::<usize>(Err(PipelineError::Cancelled), tasks).await;
        match result {
            Err(RunCompletionError::Pipeline(err)) => {
                assert_eq!(err.to_string(), "decode failed");
            }
            other => panic!("expected root cause, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn settle_run_reports_writer_error() {
        let tasks = vec![tokio::spawn(async { Err(PipelineError::Cancelled) })];

        let result = settle_run::<usize>(Err(failed("writer failed")), tasks).await;
        match result {
            Err(RunCompletionError::Writer(err)) => {
                assert_eq!(err.to_string(), "writer failed");
            }
            other => panic!("expected writer error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn settle_run_returns_output_on_success() {
        let tasks = vec![tokio::spawn(async { Ok(()) })];
        assert_eq!(settle_run(Ok(7usize), tasks).await.unwrap(), 7);
    }
}
