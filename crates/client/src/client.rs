//! Job client: encode, submit, and watch try-on jobs.
//!
//! [`JobClient`] is the single entry point for running a try-on against a
//! [`TryOnBackend`]. Validation strictness, the model name and the poll
//! interval all come from [`ClientConfig`].

use std::sync::Arc;
use std::time::Duration;

use tryon_core::error::{MediaError, ValidationError};
use tryon_core::job::Job;
use tryon_core::media::{EncodedMedia, MediaEncoder, MediaPayload, SourceFile};
use tryon_core::types::MediaRole;

use crate::api::{CreateTaskRequest, TryOnBackend};
use crate::config::ClientConfig;
use crate::error::TryOnError;
use crate::session::{self, CancelHandle};

/// Submits try-on jobs and spawns poll sessions for them.
#[derive(Clone)]
pub struct JobClient {
    backend: Arc<dyn TryOnBackend>,
    encoder: MediaEncoder,
    model_name: String,
    poll_interval: Duration,
}

impl JobClient {
    pub fn new(backend: Arc<dyn TryOnBackend>, config: &ClientConfig) -> Self {
        Self {
            backend,
            encoder: MediaEncoder::new(config.strict_validation),
            model_name: config.model_name.clone(),
            poll_interval: config.poll_interval,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_strict(&self) -> bool {
        self.encoder.is_strict()
    }

    /// Validate and encode a file for the given slot.
    pub async fn encode(
        &self,
        role: MediaRole,
        file: SourceFile,
    ) -> Result<EncodedMedia, MediaError> {
        self.encoder.encode(role, file).await
    }

    /// Check that both slots are filled with payloads encoded for them.
    pub fn check_payloads<'a>(
        subject: Option<&'a MediaPayload>,
        garment: Option<&'a MediaPayload>,
    ) -> Result<(&'a MediaPayload, &'a MediaPayload), ValidationError> {
        Ok((
            require(subject, MediaRole::Subject)?,
            require(garment, MediaRole::Garment)?,
        ))
    }

    /// Create a remote task for the two images.
    ///
    /// Both payloads are mandatory; a missing or misplaced payload fails
    /// before any request is sent.
    pub async fn submit(
        &self,
        subject: Option<&MediaPayload>,
        garment: Option<&MediaPayload>,
    ) -> Result<Job, TryOnError> {
        let (subject, garment) = Self::check_payloads(subject, garment)?;

        let request = CreateTaskRequest {
            model_name: &self.model_name,
            human_image: subject.data(),
            cloth_image: garment.data(),
        };

        let task_id = self.backend.create_task(&request).await.map_err(|cause| {
            tracing::warn!(model = %self.model_name, error = %cause, "Try-on submission failed");
            TryOnError::Submission { cause }
        })?;

        tracing::info!(job_id = %task_id, model = %self.model_name, "Try-on task submitted");

        Ok(Job::submitted(task_id))
    }

    /// Poll `job_id` at the configured interval until it finishes.
    ///
    /// `on_update` receives the final job snapshot once the job succeeds
    /// or fails.
    pub fn watch<F>(&self, job_id: &str, on_update: F) -> CancelHandle
    where
        F: FnOnce(Job) + Send + 'static,
    {
        self.watch_with_interval(job_id, self.poll_interval, on_update)
    }

    pub fn watch_with_interval<F>(
        &self,
        job_id: &str,
        poll_interval: Duration,
        on_update: F,
    ) -> CancelHandle
    where
        F: FnOnce(Job) + Send + 'static,
    {
        self.watch_job(Job::submitted(job_id), poll_interval, on_update)
    }

    /// Poll an already-submitted job, keeping its timestamps.
    pub fn watch_job<F>(&self, job: Job, poll_interval: Duration, on_update: F) -> CancelHandle
    where
        F: FnOnce(Job) + Send + 'static,
    {
        session::spawn(Arc::clone(&self.backend), job, poll_interval, on_update)
    }
}

fn require(
    payload: Option<&MediaPayload>,
    role: MediaRole,
) -> Result<&MediaPayload, ValidationError> {
    let payload = payload.ok_or(ValidationError::MissingPayload(role))?;
    if payload.role() != role {
        return Err(ValidationError::RoleMismatch {
            expected: role,
            actual: payload.role(),
        });
    }
    Ok(payload)
}
