use crate::{
    models::{DiversitySeed, GeneratedCopy, ProductInfo, RegionBatch, RunSnapshot, StartRunResponse},
    orchestrator::{CopySink, Orchestrator, PipelineError},
    policy::PolicyReport,
    security::AuthContext,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::{any::Any, collections::HashMap, panic::AssertUnwindSafe, sync::Arc};
use tokio::{sync::Mutex, task::AbortHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Identifies the run that may still write to a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket {
    pub generation: u64,
}

#[derive(Default)]
struct BoardState {
    generation: u64,
    run_id: Option<Uuid>,
    in_progress: bool,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    copies: Vec<GeneratedCopy>,
    policy: Option<PolicyReport>,
    task: Option<AbortHandle>,
}

/// Append-only result list for one client. Only the run holding the current
/// ticket may write to it.
#[derive(Clone, Default)]
pub struct CopyBoard {
    state: Arc<Mutex<BoardState>>,
}

impl CopyBoard {
    /// Starts a new generation: clears copies and aborts the previous run task.
    pub async fn begin(&self, run_id: Uuid, policy: PolicyReport) -> RunTicket {
        let mut guard = self.state.lock().await;
        if let Some(previous) = guard.task.take() {
            previous.abort();
        }
        guard.generation += 1;
        guard.run_id = Some(run_id);
        guard.in_progress = true;
        guard.error = None;
        guard.started_at = Some(Utc::now());
        guard.finished_at = None;
        guard.copies.clear();
        guard.policy = Some(policy);
        RunTicket {
            generation: guard.generation,
        }
    }

    async fn attach(&self, ticket: RunTicket, task: AbortHandle) {
        let mut guard = self.state.lock().await;
        if guard.generation == ticket.generation {
            guard.task = Some(task);
        } else {
            task.abort();
        }
    }

    /// Returns false when the ticket is stale and the batch was dropped.
    pub async fn append(&self, ticket: RunTicket, batch: RegionBatch) -> bool {
        let mut guard = self.state.lock().await;
        if guard.generation != ticket.generation {
            return false;
        }
        guard.copies.extend(batch.copies);
        true
    }

    pub async fn finish(&self, ticket: RunTicket, error: Option<String>) -> bool {
        let mut guard = self.state.lock().await;
        if guard.generation != ticket.generation {
            return false;
        }
        guard.in_progress = false;
        guard.error = error;
        guard.finished_at = Some(Utc::now());
        guard.task = None;
        true
    }

    /// Current state with copies from offset `since` onward.
    pub async fn snapshot(&self, since: usize) -> RunSnapshot {
        let guard = self.state.lock().await;
        RunSnapshot {
            run_id: guard.run_id,
            generation: guard.generation,
            in_progress: guard.in_progress,
            error: guard.error.clone(),
            started_at: guard.started_at,
            finished_at: guard.finished_at,
            total: guard.copies.len(),
            copies: guard.copies.iter().skip(since).cloned().collect(),
            policy: guard.policy.clone(),
        }
    }
}

struct BoardSink {
    board: CopyBoard,
    ticket: RunTicket,
}

#[async_trait]
impl CopySink for BoardSink {
    async fn emit(&self, batch: RegionBatch) {
        let region = batch.region.clone();
        if !self.board.append(self.ticket, batch).await {
            warn!(target = "adcopy.orchestrator", region = %region, generation = self.ticket.generation, "stale_batch_dropped");
        }
    }
}

/// Per-client boards plus the orchestrator that fills them.
#[derive(Clone)]
pub struct Sessions {
    orchestrator: Orchestrator,
    boards: Arc<Mutex<HashMap<String, CopyBoard>>>,
}

impl Sessions {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            boards: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn board(&self, client_id: &str) -> CopyBoard {
        let mut guard = self.boards.lock().await;
        guard.entry(client_id.to_string()).or_default().clone()
    }

    /// Validates the product, records the policy check and spawns the run.
    /// Any run the client still has in flight is cancelled.
    pub async fn start_run(
        &self,
        context: &AuthContext,
        product: ProductInfo,
    ) -> Result<StartRunResponse, PipelineError> {
        let product = product.validate()?;
        let policy = self
            .orchestrator
            .catalog()
            .lexicon
            .review(&product.policy_text());
        if policy.forbidden_category {
            warn!(target = "adcopy.api", client_id = %context.client_id, "product_in_forbidden_category");
        }

        let board = self.board(&context.client_id).await;
        let run_id = Uuid::new_v4();
        let ticket = board.begin(run_id, policy.clone()).await;
        info!(
            target = "adcopy.api",
            client_id = %context.client_id,
            run_id = %run_id,
            generation = ticket.generation,
            regions = product.regions.len(),
            risk = policy.result.risk_level.as_str(),
            "run_started"
        );

        let regions = product.regions.clone();
        let orchestrator = self.orchestrator.clone();
        let task_board = board.clone();
        let handle = tokio::spawn(async move {
            let seed = DiversitySeed::generate();
            let sink = BoardSink {
                board: task_board.clone(),
                ticket,
            };
            let outcome = AssertUnwindSafe(orchestrator.run(product, &seed, &sink))
                .catch_unwind()
                .await;
            let error = match outcome {
                Ok(Ok(_)) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(target = "adcopy.orchestrator", run_id = %run_id, "run panicked: {message}");
                    Some(PipelineError::internal("run", format!("panicked: {message}")).to_string())
                }
            };
            task_board.finish(ticket, error).await;
        });
        board.attach(ticket, handle.abort_handle()).await;

        Ok(StartRunResponse {
            run_id,
            generation: ticket.generation,
            regions,
            policy,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
