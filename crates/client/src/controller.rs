//! Single-context try-on controller.
//!
//! [`TryOnController`] holds what a try-on screen shows: the two selected
//! images, the loading indicator, and the latest result or error. It
//! publishes a [`ViewState`] snapshot on a [`watch`] channel and keeps at
//! most one poll session armed. Starting a new run cancels the previous
//! session first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tryon_core::job::{Job, JobStatus};
use tryon_core::media::{EncodedMedia, SourceFile};
use tryon_core::types::MediaRole;

use crate::client::JobClient;
use crate::error::TryOnError;
use crate::session::{CancelHandle, SessionState};

/// What the UI renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// A job is being submitted or polled.
    pub loading: bool,
    /// `data:` URI of the selected subject photo.
    pub subject_preview: Option<String>,
    /// `data:` URI of the selected garment photo.
    pub garment_preview: Option<String>,
    /// Latest job snapshot of the current run.
    pub job: Option<Job>,
    pub result_url: Option<String>,
    pub error: Option<String>,
}

pub struct TryOnController {
    client: JobClient,
    subject: Option<EncodedMedia>,
    garment: Option<EncodedMedia>,
    active: Option<CancelHandle>,
    /// Bumped on every start and cancel. Session callbacks carrying an
    /// older value are ignored.
    generation: Arc<AtomicU64>,
    view_tx: Arc<watch::Sender<ViewState>>,
}

impl TryOnController {
    pub fn new(client: JobClient) -> Self {
        let (view_tx, _) = watch::channel(ViewState::default());
        Self {
            client,
            subject: None,
            garment: None,
            active: None,
            generation: Arc::new(AtomicU64::new(0)),
            view_tx: Arc::new(view_tx),
        }
    }

    /// Receive every published [`ViewState`].
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view_tx.subscribe()
    }

    /// Current view snapshot.
    pub fn view(&self) -> ViewState {
        self.view_tx.borrow().clone()
    }

    pub fn media(&self, role: MediaRole) -> Option<&EncodedMedia> {
        match role {
            MediaRole::Subject => self.subject.as_ref(),
            MediaRole::Garment => self.garment.as_ref(),
        }
    }

    /// The armed poll session, if one is still running.
    pub fn active_session(&self) -> Option<&CancelHandle> {
        self.active.as_ref().filter(|h| h.is_active())
    }

    /// Encode `file` into the slot for `role`.
    ///
    /// The slot and its preview are replaced together. On failure the
    /// previous selection is kept and the error is shown.
    pub async fn select_media(
        &mut self,
        role: MediaRole,
        file: SourceFile,
    ) -> Result<(), TryOnError> {
        let name = file.name.clone();
        let encoded = match self.client.encode(role, file).await {
            Ok(encoded) => encoded,
            Err(e) => {
                let err = TryOnError::from(e);
                tracing::warn!(%role, file = %name, error = %err, "Rejected media selection");
                self.view_tx.send_modify(|v| v.error = Some(err.to_string()));
                return Err(err);
            }
        };

        let preview = encoded.preview().data_uri();
        *self.slot_mut(role) = Some(encoded);
        self.view_tx.send_modify(|v| {
            *preview_mut(v, role) = Some(preview);
            v.error = None;
        });

        tracing::debug!(%role, file = %name, "Media selected");
        Ok(())
    }

    /// Empty the slot for `role`.
    pub fn clear_media(&mut self, role: MediaRole) {
        *self.slot_mut(role) = None;
        self.view_tx.send_modify(|v| *preview_mut(v, role) = None);
    }

    /// Submit the selected images and start polling.
    ///
    /// Missing images fail before any request is made and leave a running
    /// session untouched. Otherwise the previous session is cancelled,
    /// the job submitted, and a new session armed.
    pub async fn start(&mut self) -> Result<CancelHandle, TryOnError> {
        let checked = JobClient::check_payloads(
            self.subject.as_ref().map(EncodedMedia::payload),
            self.garment.as_ref().map(EncodedMedia::payload),
        );
        if let Err(e) = checked {
            self.view_tx.send_modify(|v| v.error = Some(e.to_string()));
            return Err(e.into());
        }

        self.cancel_active();
        let run = RunView {
            view_tx: Arc::clone(&self.view_tx),
            current: Arc::clone(&self.generation),
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        };
        run.update(|v| {
            v.loading = true;
            v.job = None;
            v.result_url = None;
            v.error = None;
        });

        // Clears `loading` if submission fails or this future is dropped
        // before a session is armed.
        let mut guard = LoadingGuard {
            run: run.clone(),
            armed: true,
        };

        let submitted = self
            .client
            .submit(
                self.subject.as_ref().map(EncodedMedia::payload),
                self.garment.as_ref().map(EncodedMedia::payload),
            )
            .await;

        let job = match submitted {
            Ok(job) => job,
            Err(e) => {
                run.update(|v| v.error = Some(e.to_string()));
                return Err(e);
            }
        };

        run.update(|v| v.job = Some(job.clone()));

        let on_final = run.clone();
        let handle = self
            .client
            .watch_job(job, self.client.poll_interval(), move |job| {
                on_final.update(|v| apply_final_job(v, job));
            });
        guard.armed = false;

        // A session cancelled through its own handle never reports a
        // final job, so the loading indicator is cleared here instead.
        let session = handle.clone();
        tokio::spawn(async move {
            if session.wait().await == SessionState::Cancelled {
                run.update(|v| v.loading = false);
            }
        });

        self.active = Some(handle.clone());
        Ok(handle)
    }

    /// Start a run and wait for it to finish.
    pub async fn run_to_completion(&mut self) -> Result<String, TryOnError> {
        let handle = self.start().await?;
        handle.wait().await;
        handle.outcome().unwrap_or(Err(TryOnError::Cancelled))
    }

    /// Cancel the armed session, if any, and clear the loading indicator.
    pub fn cancel(&mut self) {
        self.cancel_active();
        self.view_tx.send_modify(|v| v.loading = false);
    }

    // ---- private helpers ----

    fn cancel_active(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.active.take() {
            handle.cancel();
        }
    }

    fn slot_mut(&mut self, role: MediaRole) -> &mut Option<EncodedMedia> {
        match role {
            MediaRole::Subject => &mut self.subject,
            MediaRole::Garment => &mut self.garment,
        }
    }
}

impl Drop for TryOnController {
    fn drop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.cancel();
        }
    }
}

/// View updates scoped to one run.
///
/// Updates are dropped once a later start or cancel has bumped the
/// controller's generation.
#[derive(Clone)]
struct RunView {
    view_tx: Arc<watch::Sender<ViewState>>,
    current: Arc<AtomicU64>,
    generation: u64,
}

impl RunView {
    fn update(&self, f: impl FnOnce(&mut ViewState)) {
        self.view_tx.send_if_modified(|v| {
            if self.current.load(Ordering::SeqCst) != self.generation {
                return false;
            }
            f(v);
            true
        });
    }
}

struct LoadingGuard {
    run: RunView,
    armed: bool,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if self.armed {
            self.run.update(|v| v.loading = false);
        }
    }
}

fn preview_mut(view: &mut ViewState, role: MediaRole) -> &mut Option<String> {
    match role {
        MediaRole::Subject => &mut view.subject_preview,
        MediaRole::Garment => &mut view.garment_preview,
    }
}

fn apply_final_job(view: &mut ViewState, job: Job) {
    view.loading = false;
    match job.status() {
        JobStatus::Succeeded => {
            view.result_url = job.result_reference().map(str::to_string);
            view.error = None;
        }
        JobStatus::Failed => {
            view.result_url = None;
            view.error = job.error().map(|e| TryOnError::from(e.clone()).to_string());
        }
        JobStatus::Pending | JobStatus::Running => {}
    }
    view.job = Some(job);
}
