//! # Channel-Based Stage Runner
//!
//! Runs each stage in its own blocking task, connected to its neighbours by
//! bounded MPSC channels. With a capacity of one, a stage can only run one item
//! ahead of its consumer, which bounds the memory held by the whole pipeline.
//!
//! Runtime model:
//! - Each stage runs in `tokio::task::spawn_blocking`.
//! - A failing stage cancels the shared token before its output channel
//!   closes, so downstream stages report `Cancelled` instead of draining
//!   and finalizing a partial stream.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::{PipelineContext, PipelineError, Sink, Stage};

/// Log stage progress every this many input items.
const PROGRESS_LOG_INTERVAL: usize = 1_000;

fn stage_process_error(stage: &'static str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::Strategy(source) => PipelineError::StageProcess { stage, source },
        PipelineError::Io(source) => PipelineError::StageProcess {
            stage,
            source: Box::new(source),
        },
        other => other,
    }
}

fn stage_finish_error(stage: &'static str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::Strategy(source) => PipelineError::StageFinish { stage, source },
        PipelineError::Io(source) => PipelineError::StageFinish {
            stage,
            source: Box::new(source),
        },
        other => other,
    }
}

fn report_failure(context: &PipelineContext, stage: &'static str, err: &PipelineError) {
    if err.is_consequence() {
        debug!(stage, error = %err, "Stage stopped");
    } else {
        error!(stage, error = %err, "Stage failed");
        context.token.cancel();
    }
}

/// Spawn `stage` reading from `input`.
///
/// Returns the receiving end of the stage's output channel and the stage task.
pub fn spawn_stage<S: Stage>(
    mut stage: S,
    context: Arc<PipelineContext>,
    mut input: mpsc::Receiver<S::Input>,
    capacity: usize,
) -> (
    mpsc::Receiver<S::Output>,
    JoinHandle<Result<(), PipelineError>>,
) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let task = tokio::task::spawn_blocking(move || {
        let stage_name = stage.name();
        let result = run_stage(&mut stage, &context, &mut input, &tx);
        if let Err(err) = &result {
            report_failure(&context, stage_name, err);
        }
        // `tx` drops here, after the token has been cancelled.
        result
    });

    (rx, task)
}

fn run_stage<S: Stage>(
    stage: &mut S,
    context: &PipelineContext,
    input: &mut mpsc::Receiver<S::Input>,
    tx: &mpsc::Sender<S::Output>,
) -> Result<(), PipelineError> {
    let stage_name = stage.name();
    let mut processed_items: usize = 0;
    let mut emitted_items: usize = 0;
    let mut next_progress_log_at = PROGRESS_LOG_INTERVAL;

    while let Some(item) = input.blocking_recv() {
        if context.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let mut output_fn = |processed: S::Output| {
            if tx.blocking_send(processed).is_err() {
                return Err(PipelineError::ChannelClosed("downstream"));
            }
            emitted_items = emitted_items.saturating_add(1);
            Ok(())
        };
        stage
            .process(context, item, &mut output_fn)
            .map_err(|e| stage_process_error(stage_name, e))?;

        processed_items = processed_items.saturating_add(1);
        if processed_items >= next_progress_log_at {
            debug!(
                stage = stage_name,
                processed_items, emitted_items, "Stage progress"
            );
            next_progress_log_at = next_progress_log_at.saturating_add(PROGRESS_LOG_INTERVAL);
        }
    }

    // Upstream closed its channel. Only drain when it did so cleanly.
    if context.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let mut output_fn = |processed: S::Output| {
        if tx.blocking_send(processed).is_err() {
            return Err(PipelineError::ChannelClosed("downstream during finish"));
        }
        emitted_items = emitted_items.saturating_add(1);
        Ok(())
    };
    stage
        .finish(context, &mut output_fn)
        .map_err(|e| stage_finish_error(stage_name, e))?;

    debug!(
        stage = stage_name,
        processed_items, emitted_items, "Stage drained"
    );
    Ok(())
}

/// Spawn the terminal `sink` reading from `input`.
///
/// The sink is handed back once its input has closed cleanly.
pub fn spawn_sink<K: Sink>(
    mut sink: K,
    context: Arc<PipelineContext>,
    mut input: mpsc::Receiver<K::Item>,
) -> JoinHandle<Result<K, PipelineError>> {
    tokio::task::spawn_blocking(move || {
        let sink_name = sink.name();
        let mut accepted_items: usize = 0;

        while let Some(item) = input.blocking_recv() {
            if context.is_cancelled() {
                let err = PipelineError::Cancelled;
                report_failure(&context, sink_name, &err);
                return Err(err);
            }
            if let Err(err) = sink.accept(&context, item) {
                let err = stage_process_error(sink_name, err);
                report_failure(&context, sink_name, &err);
                return Err(err);
            }
            accepted_items = accepted_items.saturating_add(1);
        }

        if context.is_cancelled() {
            let err = PipelineError::Cancelled;
            report_failure(&context, sink_name, &err);
            return Err(err);
        }

        debug!(sink = sink_name, accepted_items, "Sink drained");
        Ok(sink)
    })
}
