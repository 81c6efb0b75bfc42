#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tryon_client::api::{
    CreateTaskRequest, TaskImage, TaskResult, TaskStatusData, TryOnApiError, TryOnBackend,
};
use tryon_client::client::JobClient;
use tryon_client::config::ClientConfig;

/// Poll interval used by every test session.
pub const TEST_INTERVAL: Duration = Duration::from_millis(10);

/// One scripted reply to a status query.
#[derive(Debug, Clone)]
pub enum Step {
    Status(&'static str),
    Succeed(Vec<&'static str>),
    Failed(Option<&'static str>),
    HttpError(u16),
}

/// Captured body of a create-task call.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model_name: String,
    pub human_image: String,
    pub cloth_image: String,
}

/// In-process stand-in for the try-on service.
///
/// Task ids are `task-1`, `task-2`, ... unless queued with
/// [`FakeBackend::queue_create`]. Status replies are taken from the script
/// in order; once it runs out every query answers `running`.
#[derive(Default)]
pub struct FakeBackend {
    create_replies: Mutex<VecDeque<Result<String, TryOnApiError>>>,
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RecordedRequest>>,
    status_calls: Mutex<Vec<String>>,
    created: AtomicUsize,
    gate: Mutex<Option<Gate>>,
    create_gate: Mutex<Option<Gate>>,
}

/// Holds calls open until released.
#[derive(Clone, Default)]
pub struct Gate {
    /// Signalled when a query is waiting at the gate.
    pub entered: Arc<Notify>,
    /// Signal to let the waiting query return.
    pub release: Arc<Notify>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(steps: Vec<Step>) -> Arc<Self> {
        let backend = Self::default();
        *backend.script.lock().unwrap() = steps.into();
        Arc::new(backend)
    }

    pub fn queue_create(&self, reply: Result<String, TryOnApiError>) {
        self.create_replies.lock().unwrap().push_back(reply);
    }

    /// Make every following status query wait at a gate.
    pub fn hold_status_queries(&self) -> Gate {
        let gate = Gate::default();
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Make every following create-task call wait at a gate.
    pub fn hold_create_calls(&self) -> Gate {
        let gate = Gate::default();
        *self.create_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn create_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.lock().unwrap().len()
    }

    pub fn status_calls_for(&self, task_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == task_id)
            .count()
    }
}

#[async_trait]
impl TryOnBackend for FakeBackend {
    async fn create_task(
        &self,
        request: &CreateTaskRequest<'_>,
    ) -> Result<String, TryOnApiError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            model_name: request.model_name.to_string(),
            human_image: request.human_image.to_string(),
            cloth_image: request.cloth_image.to_string(),
        });

        let gate = self.create_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let queued = self.create_replies.lock().unwrap().pop_front();
        match queued {
            Some(reply) => reply,
            None => {
                let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("task-{n}"))
            }
        }
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatusData, TryOnApiError> {
        self.status_calls.lock().unwrap().push(task_id.to_string());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Status("running"));

        match step {
            Step::Status(status) => Ok(status_data(status, None, None)),
            Step::Succeed(urls) => Ok(status_data("succeed", None, Some(urls))),
            Step::Failed(msg) => Ok(status_data("failed", msg, None)),
            Step::HttpError(status) => Err(TryOnApiError::ApiError {
                status,
                body: "upstream unavailable".into(),
            }),
        }
    }
}

fn status_data(
    status: &str,
    msg: Option<&str>,
    urls: Option<Vec<&'static str>>,
) -> TaskStatusData {
    TaskStatusData {
        task_status: status.to_string(),
        task_status_msg: msg.map(str::to_string),
        task_result: urls.map(|urls| TaskResult {
            images: urls
                .into_iter()
                .map(|url| TaskImage {
                    url: url.to_string(),
                })
                .collect(),
        }),
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        poll_interval: TEST_INTERVAL,
        ..ClientConfig::default()
    }
}

pub fn job_client(backend: &Arc<FakeBackend>) -> JobClient {
    JobClient::new(backend.clone(), &test_config())
}

/// Wait several poll intervals so any stray tick would have fired.
pub async fn settle() {
    tokio::time::sleep(TEST_INTERVAL * 8).await;
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_image(width, height, image::ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_image(width, height, image::ImageFormat::Jpeg)
}

fn encode_image(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image::GrayImage::new(width, height)
        .write_to(&mut buf, format)
        .unwrap();
    buf.into_inner()
}
