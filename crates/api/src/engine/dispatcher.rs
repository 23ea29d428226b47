//! Background job dispatcher: a bounded worker pool over a task queue.
//!
//! Image and edit tasks are persisted in `running` on the request path and
//! handed here; the caller already holds the task id when the provider
//! call starts. A fixed number of workers drain a bounded queue, which
//! gives backpressure instead of an unbounded spawn per request.
//!
//! Every job that enters a worker produces exactly one terminal-state
//! write, including on panics. The write itself is a guarded update, so a
//! task deleted mid-flight is a logged no-op, and nothing can pull a task
//! back out of a terminal state.

use std::sync::Arc;

use atelier_core::capability::Capability;
use atelier_core::quota;
use atelier_core::task::{FailureKind, ImageArtifact, TaskResult};
use atelier_core::types::DbId;
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use atelier_db::repositories::{TaskRepo, UsageRepo};
use atelier_db::DbPool;

use atelier_provider::edit::{EditClient, EditGenerationRequest};
use atelier_provider::image::{ImageClient, ImageGenerationRequest};
use atelier_provider::ProviderError;

use crate::artifacts::ArtifactStore;
use crate::config::{DispatcherConfig, QuotaConfig};

/// The provider call a job will make, with its prepared client.
pub enum ProviderCall {
    Image {
        client: ImageClient,
        request: ImageGenerationRequest,
    },
    Edit {
        client: EditClient,
        request: EditGenerationRequest,
    },
}

/// One unit of background work: a persisted task plus its provider call.
pub struct DispatchJob {
    pub task_id: DbId,
    pub public_id: String,
    pub account_id: DbId,
    pub capability: Capability,
    pub call: ProviderCall,
}

/// What a successful provider call produced.
struct CallOutcome {
    result: TaskResult,
    consumed: i64,
}

/// Bounded worker pool executing provider calls off the request path.
pub struct Dispatcher {
    tx: mpsc::Sender<DispatchJob>,
    rx: Arc<Mutex<mpsc::Receiver<DispatchJob>>>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pool: DbPool,
}

impl Dispatcher {
    /// Spawn the worker pool and return the shared dispatcher handle.
    pub fn start(
        pool: DbPool,
        artifacts: Arc<ArtifactStore>,
        quota: QuotaConfig,
        config: DispatcherConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let workers = config.workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            handles.push(tokio::spawn(run_worker(
                worker_id,
                pool.clone(),
                Arc::clone(&artifacts),
                quota,
                Arc::clone(&rx),
                cancel.clone(),
            )));
        }

        tracing::info!(workers, queue_depth = config.queue_depth, "Dispatcher started");
        Arc::new(Self {
            tx,
            rx,
            cancel,
            handles: Mutex::new(handles),
            pool,
        })
    }

    /// Hand a task to background execution. Returns once the job is
    /// queued; backpressures when the queue is full.
    ///
    /// Must be called at most once per task id — the worker performing the
    /// job is the only writer of that task's terminal state.
    pub async fn dispatch(&self, job: DispatchJob) -> Result<(), String> {
        self.tx
            .send(job)
            .await
            .map_err(|_| "dispatcher is shut down".to_string())
    }

    /// Stop the pool: workers finish their in-flight call, then exit.
    /// Jobs still sitting in the queue are failed so no task stays
    /// `running` forever across a restart.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        for handle in self.handles.lock().await.drain(..) {
            let _ = handle.await;
        }

        let mut rx = self.rx.lock().await;
        while let Ok(job) = rx.try_recv() {
            let applied = TaskRepo::mark_failed(
                &self.pool,
                job.task_id,
                FailureKind::Internal,
                "Dispatcher stopped before the job ran",
            )
            .await
            .unwrap_or(false);
            tracing::warn!(
                task = %job.public_id,
                applied,
                "Failed queued job during shutdown",
            );
        }
        tracing::info!("Dispatcher stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    pool: DbPool,
    artifacts: Arc<ArtifactStore>,
    quota: QuotaConfig,
    rx: Arc<Mutex<mpsc::Receiver<DispatchJob>>>,
    cancel: CancellationToken,
) {
    tracing::debug!(worker_id, "Dispatch worker started");
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = async { rx.lock().await.recv().await } => match job {
                Some(job) => job,
                None => break,
            },
        };

        execute(&pool, &artifacts, &quota, job).await;
    }
    tracing::debug!(worker_id, "Dispatch worker stopped");
}

/// Run one job and write its terminal state exactly once.
async fn execute(pool: &DbPool, artifacts: &ArtifactStore, quota: &QuotaConfig, job: DispatchJob) {
    let public_id = job.public_id.clone();
    tracing::info!(task = %public_id, capability = %job.capability, "Job started");

    let task_id = job.task_id;
    let account_id = job.account_id;
    let capability = job.capability;

    // The provider call must not take a worker down: panics are caught at
    // this boundary and downgraded to a terminal `failed`.
    let outcome = std::panic::AssertUnwindSafe(run_call(artifacts, job))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(CallOutcome { result, consumed })) => {
            let applied = match TaskRepo::mark_succeeded(pool, task_id, &result, consumed).await {
                Ok(applied) => applied,
                Err(err) => {
                    tracing::error!(task = %public_id, error = %err, "Failed to persist result");
                    return;
                }
            };

            if !applied {
                // Deleted (or otherwise already terminal) mid-flight.
                tracing::warn!(task = %public_id, "Task vanished before its result landed");
                return;
            }

            let day = quota::usage_day(Utc::now(), quota.utc_offset_hours);
            if let Err(err) = UsageRepo::charge(pool, account_id, day, capability, consumed).await {
                tracing::error!(task = %public_id, error = %err, "Failed to charge quota");
            }
            tracing::info!(task = %public_id, consumed, "Job succeeded");
        }
        Ok(Err(err)) => {
            let kind = match &err {
                ProviderError::Api { .. } => FailureKind::ProviderRejected,
                ProviderError::Unreachable(_) => FailureKind::ProviderUnreachable,
            };
            fail_task(pool, task_id, &public_id, kind, &err.to_string()).await;
        }
        Err(_panic) => {
            fail_task(
                pool,
                task_id,
                &public_id,
                FailureKind::Internal,
                "Job processing panicked",
            )
            .await;
        }
    }
}

async fn fail_task(pool: &DbPool, task_id: DbId, public_id: &str, kind: FailureKind, detail: &str) {
    tracing::error!(task = %public_id, kind = kind.as_str(), detail, "Job failed");
    match TaskRepo::mark_failed(pool, task_id, kind, detail).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(task = %public_id, "Task vanished before its failure landed");
        }
        Err(err) => {
            tracing::error!(task = %public_id, error = %err, "Failed to persist failure");
        }
    }
}

/// Execute the provider call and shape its outcome into a task result.
async fn run_call(artifacts: &ArtifactStore, job: DispatchJob) -> Result<CallOutcome, ProviderError> {
    match job.call {
        ProviderCall::Image { client, request } => {
            let outcome = client.generate(&request).await?;
            for error in &outcome.item_errors {
                tracing::warn!(task = %job.public_id, error, "Vendor skipped one image");
            }
            let artifacts = outcome
                .images
                .iter()
                .enumerate()
                .map(|(index, image)| ImageArtifact {
                    location: image.location.clone(),
                    index: index as u32,
                })
                .collect();
            Ok(CallOutcome {
                result: TaskResult::Images { artifacts },
                consumed: outcome.generated_images,
            })
        }
        ProviderCall::Edit { client, request } => {
            let outcome = client.generate(&request).await?;
            let mut saved = Vec::with_capacity(outcome.images.len());
            for (index, bytes) in outcome.images.iter().enumerate() {
                match artifacts.save_image(&job.public_id, index, bytes).await {
                    Ok(path) => saved.push(ImageArtifact {
                        location: path.to_string_lossy().into_owned(),
                        index: index as u32,
                    }),
                    Err(err) => {
                        tracing::error!(
                            task = %job.public_id,
                            index,
                            error = %err,
                            "Failed to save generated image",
                        );
                    }
                }
            }
            let consumed = saved.len() as i64;
            Ok(CallOutcome {
                result: TaskResult::Images { artifacts: saved },
                consumed,
            })
        }
    }
}
