//! Poll sessions for submitted try-on jobs.
//!
//! A session is a spawned task that waits one interval, asks the service
//! for the job's status, and repeats until the job is terminal or the
//! session is cancelled. Polls never overlap: the next wait starts only
//! after the previous response has been handled.
//!
//! The terminal transition and cancellation race through a single
//! compare-and-set on the session's [`watch`] channel. Whichever lands
//! first wins, so a response that arrives after [`CancelHandle::cancel`]
//! is dropped and the update callback never runs for a cancelled session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tryon_core::job::{FailureKind, Job, JobFailure, JobStatus};
use uuid::Uuid;

use crate::api::{TaskStatusData, TryOnApiError, TryOnBackend};
use crate::error::TryOnError;

/// Default delay between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Lifecycle of a poll session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, task not yet running.
    Pending,
    /// Waiting for the next tick or for a status response.
    Polling,
    Succeeded,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// State shared between a session task and its handles.
#[derive(Debug, Clone)]
struct Snapshot {
    state: SessionState,
    /// Final job, recorded together with a `Succeeded`/`Failed` state.
    job: Option<Job>,
}

/// Owner-side handle to a running poll session.
///
/// Clones refer to the same session.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    session_id: Uuid,
    job_id: Arc<str>,
    cancel: CancellationToken,
    snapshot: Arc<watch::Sender<Snapshot>>,
}

impl CancelHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Stop polling.
    ///
    /// Idempotent. A session that already finished keeps its terminal
    /// state; otherwise it becomes `Cancelled` and no further status
    /// queries are issued.
    pub fn cancel(&self) {
        let cancelled = self.snapshot.send_if_modified(|snap| {
            if snap.state.is_terminal() {
                false
            } else {
                snap.state = SessionState::Cancelled;
                true
            }
        });
        self.cancel.cancel();

        if cancelled {
            tracing::info!(
                session_id = %self.session_id,
                job_id = %self.job_id,
                "Poll session cancelled",
            );
        }
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    pub fn is_active(&self) -> bool {
        !self.state().is_terminal()
    }

    /// The job as it stood when the session succeeded or failed.
    pub fn final_job(&self) -> Option<Job> {
        self.snapshot.borrow().job.clone()
    }

    /// Wait until the session reaches a terminal state and return it.
    pub async fn wait(&self) -> SessionState {
        let mut rx = self.snapshot.subscribe();
        let result = rx.wait_for(|snap| snap.state.is_terminal()).await;
        match result {
            Ok(snap) => snap.state,
            // The sender lives as long as `self`, so this is unreachable.
            Err(_) => self.state(),
        }
    }

    /// Result URL of a finished session, or the error it ended with.
    ///
    /// Returns `None` while the session is still active.
    pub fn outcome(&self) -> Option<Result<String, TryOnError>> {
        let snap = self.snapshot.borrow();
        match snap.state {
            SessionState::Pending | SessionState::Polling => None,
            SessionState::Cancelled => Some(Err(TryOnError::Cancelled)),
            SessionState::Succeeded | SessionState::Failed => {
                let job = snap.job.as_ref()?;
                Some(match (job.result_reference(), job.error()) {
                    (Some(url), _) => Ok(url.to_string()),
                    (None, Some(failure)) => Err(failure.clone().into()),
                    (None, None) => Err(TryOnError::Remote {
                        message: format!("job {} finished without a result", job.id()),
                    }),
                })
            }
        }
    }
}

/// Spawn a poll session for `job`.
///
/// `on_update` runs once, on the session task, with the final job snapshot
/// when the job succeeds or fails.
pub(crate) fn spawn<F>(
    backend: Arc<dyn TryOnBackend>,
    job: Job,
    poll_interval: Duration,
    on_update: F,
) -> CancelHandle
where
    F: FnOnce(Job) + Send + 'static,
{
    let (snapshot, _) = watch::channel(Snapshot {
        state: SessionState::Pending,
        job: None,
    });

    let handle = CancelHandle {
        session_id: Uuid::new_v4(),
        job_id: Arc::from(job.id()),
        cancel: CancellationToken::new(),
        snapshot: Arc::new(snapshot),
    };

    let session = PollSession {
        backend,
        job,
        poll_interval,
        handle: handle.clone(),
    };
    tokio::spawn(session.run(on_update));

    handle
}

/// Task-side state of one poll session.
struct PollSession {
    backend: Arc<dyn TryOnBackend>,
    job: Job,
    poll_interval: Duration,
    handle: CancelHandle,
}

impl PollSession {
    async fn run<F>(mut self, on_update: F)
    where
        F: FnOnce(Job) + Send + 'static,
    {
        let session_id = self.handle.session_id;
        let started = self.handle.snapshot.send_if_modified(|snap| {
            if snap.state == SessionState::Pending {
                snap.state = SessionState::Polling;
                true
            } else {
                false
            }
        });
        if !started {
            return;
        }

        tracing::debug!(
            %session_id,
            job_id = %self.job.id(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Poll session started",
        );

        let mut attempt = 0u32;
        loop {
            tokio::select! {
                biased;
                _ = self.handle.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if self.handle.cancel.is_cancelled() {
                return;
            }

            attempt += 1;
            tracing::debug!(%session_id, job_id = %self.job.id(), attempt, "Polling task status");

            // An in-flight query is allowed to finish; its result is
            // dropped if the session was cancelled meanwhile.
            let response = self.backend.task_status(self.job.id()).await;
            if self.handle.cancel.is_cancelled() {
                tracing::debug!(%session_id, "Discarding status response for cancelled session");
                return;
            }

            let Some(final_state) = self.apply(response) else {
                continue;
            };

            let job = self.job.clone();
            let finished = self.handle.snapshot.send_if_modified(|snap| {
                if snap.state == SessionState::Polling {
                    snap.state = final_state;
                    snap.job = Some(job.clone());
                    true
                } else {
                    false
                }
            });

            if finished {
                tracing::info!(
                    %session_id,
                    job_id = %job.id(),
                    status = %job.status(),
                    attempts = attempt,
                    "Poll session finished",
                );
                on_update(job);
            } else {
                tracing::debug!(%session_id, "Session cancelled before terminal update");
            }
            return;
        }
    }

    /// Fold one status response into the job.
    ///
    /// Returns the terminal session state when polling should stop.
    fn apply(
        &mut self,
        response: Result<TaskStatusData, TryOnApiError>,
    ) -> Option<SessionState> {
        let data = match response {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(job_id = %self.job.id(), error = %e, "Status query failed");
                let failure = JobFailure::new(FailureKind::Poll, e.to_string());
                return Some(self.finish_failed(failure));
            }
        };

        match JobStatus::from_remote(&data.task_status) {
            JobStatus::Succeeded => match data.first_image_url() {
                Some(url) => {
                    if let Err(e) = self.job.succeed(url) {
                        tracing::error!(
                            job_id = %self.job.id(),
                            error = %e,
                            "Rejected success update",
                        );
                    }
                    Some(self.settled_state())
                }
                None => Some(self.finish_failed(JobFailure::new(
                    FailureKind::MissingResult,
                    "task succeeded but returned no image",
                ))),
            },
            JobStatus::Failed => {
                let message = data
                    .task_status_msg
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "remote task failed".to_string());
                Some(self.finish_failed(JobFailure::new(FailureKind::Remote, message)))
            }
            status => {
                match self.job.observe(status) {
                    Ok(true) => tracing::info!(
                        job_id = %self.job.id(),
                        status = %status,
                        remote_status = %data.task_status,
                        "Job status changed",
                    ),
                    Ok(false) => {}
                    Err(e) => tracing::debug!(
                        job_id = %self.job.id(),
                        error = %e,
                        "Ignoring status regression",
                    ),
                }
                None
            }
        }
    }

    fn finish_failed(&mut self, failure: JobFailure) -> SessionState {
        if let Err(e) = self.job.fail(failure) {
            tracing::error!(job_id = %self.job.id(), error = %e, "Rejected failure update");
        }
        self.settled_state()
    }

    /// Session state matching the job's terminal status.
    ///
    /// A rejected transition leaves the job as it was, so the session
    /// reports whatever the job already settled on.
    fn settled_state(&self) -> SessionState {
        match self.job.status() {
            JobStatus::Succeeded => SessionState::Succeeded,
            JobStatus::Failed | JobStatus::Pending | JobStatus::Running => SessionState::Failed,
        }
    }
}
