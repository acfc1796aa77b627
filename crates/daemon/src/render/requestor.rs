use std::sync::Arc;
use std::time::Duration;

use engine::composition::{CompositionPayload, RenderState, RenderStatus};
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::RenderBackend;
use crate::config::ComposeConfig;
use crate::error::{PrepError, PrepResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositionResult {
    pub task_id: String,
    pub result_urls: Vec<String>,
}

/// Submits a composition and polls it to a terminal state.
#[derive(Clone)]
pub struct CompositionRequestor {
    backend: Arc<dyn RenderBackend>,
    poll_interval: Duration,
    timeout: Duration,
}

impl CompositionRequestor {
    pub fn new(backend: Arc<dyn RenderBackend>, config: &ComposeConfig) -> Self {
        CompositionRequestor {
            backend,
            poll_interval: config.poll_interval,
            timeout: config.timeout,
        }
    }

    /// Submit `payload` and wait for the render to finish.
    ///
    /// `on_status` sees a synthetic `queued` status right after submission and
    /// then every status the backend reports. Polling stops on completion,
    /// failure, timeout or cancellation; poll errors are logged and polling
    /// continues until the deadline.
    pub async fn compose<F>(
        &self,
        payload: &CompositionPayload,
        cancel: &CancellationToken,
        mut on_status: F,
    ) -> PrepResult<CompositionResult>
    where
        F: FnMut(&str, &RenderStatus) + Send,
    {
        let task_id = tokio::select! {
            _ = cancel.cancelled() => return Err(PrepError::Cancelled { task_id: None }),
            submitted = self.backend.submit(payload) => submitted?,
        };
        info!(task_id = %task_id, "Composition submitted");
        on_status(
            &task_id,
            &RenderStatus {
                status: RenderState::Queued,
                progress: 0.0,
                current_step: None,
                result_urls: Vec::new(),
                error: None,
            },
        );

        let deadline = Instant::now() + self.timeout;
        let mut polls = 0u32;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(task_id = %task_id, polls, "Composition polling cancelled");
                    return Err(PrepError::Cancelled { task_id: Some(task_id) });
                }
                _ = sleep(self.poll_interval) => {}
            }

            polls += 1;
            let polled = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(task_id = %task_id, polls, "Composition polling cancelled");
                    return Err(PrepError::Cancelled { task_id: Some(task_id) });
                }
                polled = self.backend.status(&task_id) => polled,
            };

            match polled {
                Ok(status) => {
                    on_status(&task_id, &status);
                    match status.status {
                        RenderState::Completed => {
                            info!(task_id = %task_id, polls, "Composition completed");
                            return Ok(CompositionResult {
                                task_id,
                                result_urls: status.result_urls,
                            });
                        }
                        RenderState::Failed => {
                            let message = status.error.unwrap_or_else(|| "Unknown error".to_string());
                            warn!(task_id = %task_id, error = %message, "Composition failed");
                            return Err(PrepError::Composition { task_id, message });
                        }
                        RenderState::Queued | RenderState::Processing => {}
                    }
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, polls, "Composition status poll failed");
                }
            }

            if Instant::now() >= deadline {
                warn!(task_id = %task_id, polls, "Composition timed out");
                return Err(PrepError::CompositionTimeout {
                    task_id,
                    waited: self.timeout,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine::composition::{BgmSettings, SubtitleStyle};
    use engine::script::{AudioFormat, AudioRef};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedBackend {
        polls: AtomicUsize,
        /// Status returned from the nth poll on; before that, `processing`.
        finish_after: Option<(usize, RenderState)>,
        poll_error: bool,
    }

    impl ScriptedBackend {
        fn new(finish_after: Option<(usize, RenderState)>) -> Self {
            ScriptedBackend {
                polls: AtomicUsize::new(0),
                finish_after,
                poll_error: false,
            }
        }
    }

    #[async_trait]
    impl RenderBackend for ScriptedBackend {
        async fn submit(&self, _payload: &CompositionPayload) -> PrepResult<String> {
            Ok("task-1".to_string())
        }

        async fn status(&self, _task_id: &str) -> PrepResult<RenderStatus> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.poll_error {
                return Err(PrepError::provider("render", "connection reset"));
            }
            let state = match self.finish_after {
                Some((at, state)) if n >= at => state,
                _ => RenderState::Processing,
            };
            Ok(RenderStatus {
                status: state,
                progress: n as f32,
                current_step: None,
                result_urls: if state == RenderState::Completed {
                    vec!["https://cdn.test/out.mp4".to_string()]
                } else {
                    Vec::new()
                },
                error: (state == RenderState::Failed).then(|| "encoder crashed".to_string()),
            })
        }
    }

    fn payload() -> CompositionPayload {
        CompositionPayload {
            script: "hello".into(),
            audio: AudioRef {
                url: Some("https://cdn.test/a.mp3".into()),
                inline_data: None,
                duration_seconds: 3.0,
                format: AudioFormat::Mp3,
            },
            video_clips: Vec::new(),
            images: Vec::new(),
            subtitle: SubtitleStyle::default(),
            bgm: BgmSettings::default(),
        }
    }

    fn requestor(backend: Arc<ScriptedBackend>) -> CompositionRequestor {
        CompositionRequestor::new(backend, &ComposeConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_sixty_polls() {
        let backend = Arc::new(ScriptedBackend::new(None));
        let err = requestor(backend.clone())
            .compose(&payload(), &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, PrepError::CompositionTimeout { ref task_id, .. } if task_id == "task-1"));
        assert_eq!(backend.polls.load(Ordering::SeqCst), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn completes_with_result_urls() {
        let backend = Arc::new(ScriptedBackend::new(Some((3, RenderState::Completed))));
        let seen = Mutex::new(Vec::new());
        let result = requestor(backend.clone())
            .compose(&payload(), &CancellationToken::new(), |_, status| {
                seen.lock().unwrap().push(status.status)
            })
            .await
            .unwrap();

        assert_eq!(result.result_urls, vec!["https://cdn.test/out.mp4"]);
        assert_eq!(backend.polls.load(Ordering::SeqCst), 3);
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![
                RenderState::Queued,
                RenderState::Processing,
                RenderState::Processing,
                RenderState::Completed
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_stops_polling() {
        let backend = Arc::new(ScriptedBackend::new(Some((2, RenderState::Failed))));
        let err = requestor(backend.clone())
            .compose(&payload(), &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, PrepError::Composition { ref message, .. } if message == "encoder crashed"));
        assert_eq!(backend.polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_keep_polling_until_deadline() {
        let mut backend = ScriptedBackend::new(None);
        backend.poll_error = true;
        let backend = Arc::new(backend);
        let err = requestor(backend.clone())
            .compose(&payload(), &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, PrepError::CompositionTimeout { .. }));
        assert_eq!(backend.polls.load(Ordering::SeqCst), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let backend = Arc::new(ScriptedBackend::new(None));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let err = requestor(backend.clone())
            .compose(&payload(), &cancel, |_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, PrepError::Cancelled { task_id: Some(ref id) } if id == "task-1"));
        let polls = backend.polls.load(Ordering::SeqCst);
        assert!(polls <= 3, "polled {} times after cancel", polls);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.polls.load(Ordering::SeqCst), polls);
    }
}
