//! Isolation boundary around a run.
//!
//! A job moves its input and render target into a dedicated task. The caller
//! only observes status messages: `started`, then exactly one of `done` or
//! `error`. The upload of a finished file happens after `done` has been sent
//! and is reported through the notification channel.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, TranscodeError};
use crate::notification::{Notification, Notifier};
use crate::orchestrator::Transcoder;
use crate::render::RenderTarget;
use crate::source::SourceFile;
use crate::upload::{UploadRequest, UploadService};

/// Status message sent from a job to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Started {
        #[serde(rename = "startedAt")]
        started_at: DateTime<Utc>,
    },
    Done {
        buffers: Vec<Bytes>,
        filename: String,
    },
    Error {
        error: String,
        kind: ErrorKind,
    },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Started { .. })
    }
}

/// Everything a job takes ownership of.
pub struct TranscodeJob {
    pub file: SourceFile,
    pub render_target: Box<dyn RenderTarget>,
}

impl TranscodeJob {
    pub fn new(file: SourceFile, render_target: impl RenderTarget + 'static) -> Self {
        Self {
            file,
            render_target: Box::new(render_target),
        }
    }
}

/// Spawns one isolated task per job.
#[derive(Clone)]
pub struct TranscodeWorker {
    transcoder: Arc<Transcoder>,
    uploader: Option<Arc<dyn UploadService>>,
}

impl TranscodeWorker {
    pub fn new(transcoder: Arc<Transcoder>) -> Self {
        Self {
            transcoder,
            uploader: None,
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn UploadService>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn spawn(&self, job: TranscodeJob) -> JobHandle {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (notifier, notifications) = Notifier::channel();
        let transcoder = Arc::clone(&self.transcoder);
        let uploader = self.uploader.clone();

        let task = tokio::spawn(async move {
            let source = job.file.name.clone();
            send_status(
                &status_tx,
                JobStatus::Started {
                    started_at: Utc::now(),
                },
            );

            let output = match transcoder.run(job.file, job.render_target, &notifier).await {
                Ok(output) => output,
                Err(err) => {
                    send_status(
                        &status_tx,
                        JobStatus::Error {
                            error: err.to_string(),
                            kind: err.kind(),
                        },
                    );
                    return;
                }
            };

            let filename = output.filename;
            send_status(
                &status_tx,
                JobStatus::Done {
                    buffers: vec![output.bytes.clone()],
                    filename: filename.clone(),
                },
            );
            drop(status_tx);

            let Some(uploader) = uploader else {
                debug!(source = %source, "No upload service configured");
                return;
            };
            let request = UploadRequest {
                filename: filename.clone(),
                content: output.bytes,
            };
            match uploader.upload(request).await {
                Ok(()) => {
                    info!(filename = %filename, "Upload succeeded");
                    notifier.send(Notification::UploadSucceeded { filename });
                }
                Err(err) => {
                    let err = TranscodeError::from(err);
                    warn!(
                        filename = %filename,
                        kind = ?err.kind(),
                        error = %err,
                        "Upload failed"
                    );
                    notifier.send(Notification::UploadFailed {
                        filename,
                        error: err.to_string(),
                    });
                }
            }
        });

        JobHandle {
            status: status_rx,
            notifications,
            task,
        }
    }
}

fn send_status(tx: &mpsc::UnboundedSender<JobStatus>, status: JobStatus) {
    if tx.send(status).is_err() {
        debug!("Job status receiver dropped");
    }
}

/// Caller side of a spawned job.
pub struct JobHandle {
    status: mpsc::UnboundedReceiver<JobStatus>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    task: JoinHandle<()>,
}

/// Everything a job reported.
#[derive(Debug, Default)]
pub struct JobReport {
    pub statuses: Vec<JobStatus>,
    pub notifications: Vec<Notification>,
}

impl JobReport {
    pub fn terminal(&self) -> Option<&JobStatus> {
        self.statuses.iter().find(|status| status.is_terminal())
    }
}

impl JobHandle {
    pub async fn next_status(&mut self) -> Option<JobStatus> {
        self.status.recv().await
    }

    /// Wait for `done` or `error`. `None` if the job ended without one.
    pub async fn terminal_status(&mut self) -> Option<JobStatus> {
        while let Some(status) = self.status.recv().await {
            if status.is_terminal() {
                return Some(status);
            }
        }
        None
    }

    pub fn notifications(&mut self) -> &mut mpsc::UnboundedReceiver<Notification> {
        &mut self.notifications
    }

    /// Abort the job. No terminal status is sent afterwards, and engine
    /// resources of the aborted run are only released as its tasks unwind.
    pub fn terminate(&self) {
        self.task.abort();
    }

    /// Wait for the job, including its upload, and collect what it reported.
    pub async fn join(mut self) -> JobReport {
        if let Err(err) = (&mut self.task).await
            && !err.is_cancelled()
        {
            warn!(error = %err, "Job task panicked");
        }

        let mut report = JobReport::default();
        while let Ok(status) = self.status.try_recv() {
            report.statuses.push(status);
        }
        while let Ok(notification) = self.notifications.try_recv() {
            report.notifications.push(notification);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EncoderConfig, TranscodeConfig};
    use crate::notification::RunState;
    use crate::render::DiscardTarget;
    use crate::test_support::{FakeEngine, FakeEngineOptions, RecordingUploader, init_tracing};
    use mp4::test_support::SyntheticVideo;
    use tokio::io::AsyncWriteExt;

    fn worker(engine: FakeEngine) -> TranscodeWorker {
        let config = TranscodeConfig::builder()
            .target(EncoderConfig::new("vp8", 320, 240, 1_000_000))
            .build();
        TranscodeWorker::new(Arc::new(Transcoder::new(Arc::new(engine), config)))
    }

    fn job() -> TranscodeJob {
        let video = SyntheticVideo::new().frame_count(20);
        TranscodeJob::new(
            SourceFile::from_bytes("videos/clip.mp4", video.build()),
            DiscardTarget,
        )
    }

    #[tokio::test]
    async fn test_started_then_done() {
        init_tracing();
        let mut handle = worker(FakeEngine::new()).spawn(job());

        assert!(matches!(
            handle.next_status().await,
            Some(JobStatus::Started { .. })
        ));
        match handle.next_status().await {
            Some(JobStatus::Done { buffers, filename }) => {
                assert_eq!(filename, "clip-240p.webm");
                assert_eq!(buffers.len(), 1);
                let info = webm::probe(&buffers[0]).unwrap();
                assert_eq!((info.width, info.height), (320, 240));
            }
            other => panic!("expected done, got {other:?}"),
        }
        assert!(handle.next_status().await.is_none());
    }

    #[tokio::test]
    async fn test_error_status() {
        let engine = FakeEngine::with_options(FakeEngineOptions {
            reject_encoder: true,
            ..Default::default()
        });
        let report = worker(engine).spawn(job()).join().await;

        assert_eq!(report.statuses.len(), 2);
        match report.terminal() {
            Some(JobStatus::Error { error, kind }) => {
                assert_eq!(*kind, ErrorKind::EncoderConfigUnsupported);
                assert!(error.starts_with("transcode stage: "));
            }
            other => panic!("expected error, got {other:?}"),
        }
        let terminal = report
            .statuses
            .iter()
            .filter(|status| status.is_terminal())
            .count();
        assert_eq!(terminal, 1);
    }

    #[tokio::test]
    async fn test_oversized_sample_table_reports_error() {
        let mut file = SyntheticVideo::new().frame_count(20).build().to_vec();
        let body = file.windows(4).position(|w| w == b"stsz").unwrap() + 4;
        // Uniform size of one byte for 0xFFFF_FFF0 samples.
        file[body + 4..body + 8].copy_from_slice(&1u32.to_be_bytes());
        file[body + 8..body + 12].copy_from_slice(&0xFFFF_FFF0u32.to_be_bytes());

        let job = TranscodeJob::new(
            SourceFile::from_bytes("oversized.mp4", Bytes::from(file)),
            DiscardTarget,
        );
        let report = worker(FakeEngine::new()).spawn(job).join().await;

        assert_eq!(report.statuses.len(), 2);
        match report.terminal() {
            Some(JobStatus::Error { error, kind }) => {
                assert_eq!(*kind, ErrorKind::MalformedContainer);
                assert!(error.starts_with("container reader: "));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_success_is_notified() {
        let uploader = Arc::new(RecordingUploader::default());
        let report = worker(FakeEngine::new())
            .with_uploader(uploader.clone())
            .spawn(job())
            .join()
            .await;

        assert!(matches!(report.terminal(), Some(JobStatus::Done { .. })));
        let requests = uploader.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "clip-240p.webm");
        assert!(requests[0].1 > 0);
        assert!(report.notifications.contains(&Notification::UploadSucceeded {
            filename: "clip-240p.webm".to_string()
        }));
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_done() {
        let uploader = Arc::new(RecordingUploader::failing());
        let report = worker(FakeEngine::new())
            .with_uploader(uploader)
            .spawn(job())
            .join()
            .await;

        assert!(matches!(report.terminal(), Some(JobStatus::Done { .. })));
        assert!(!report
            .statuses
            .iter()
            .any(|status| matches!(status, JobStatus::Error { .. })));
        let failure = report.notifications.iter().find_map(|n| match n {
            Notification::UploadFailed { filename, error } => Some((filename, error)),
            _ => None,
        });
        let (filename, error) = failure.unwrap();
        assert_eq!(filename, "clip-240p.webm");
        assert_eq!(error, "upload: upload rejected: 503 - storage unavailable");
        assert!(report.notifications.contains(&Notification::StateChanged {
            state: RunState::Done
        }));
    }

    #[tokio::test]
    async fn test_terminate_stops_without_terminal_status() {
        // The source never ends, so the run waits for more input.
        let (mut writer, reader) = tokio::io::duplex(1024);
        let header = SyntheticVideo::new().build().slice(..16);
        writer.write_all(&header).await.unwrap();

        let job = TranscodeJob::new(
            SourceFile::from_reader("stalled.mp4", 1 << 20, reader),
            DiscardTarget,
        );
        let mut handle = worker(FakeEngine::new()).spawn(job);
        assert!(matches!(
            handle.next_status().await,
            Some(JobStatus::Started { .. })
        ));

        handle.terminate();
        let report = handle.join().await;
        assert!(report.terminal().is_none());
        drop(writer);
    }

    #[test]
    fn test_status_wire_format() {
        let started = JobStatus::Started {
            started_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value(&started).unwrap();
        assert_eq!(json["status"], "started");
        assert_eq!(json["startedAt"], "2024-05-01T12:00:00Z");

        let done = JobStatus::Done {
            buffers: vec![Bytes::from_static(&[1, 2])],
            filename: "a-240p.webm".to_string(),
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "done", "buffers": [[1, 2]], "filename": "a-240p.webm"})
        );

        let error = JobStatus::Error {
            error: "decode stage: corrupt sample 3".to_string(),
            kind: ErrorKind::DecodeFailure,
        };
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "decode_failure");

        let parsed: JobStatus = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, error);
    }
}
