//! The SSE driving loop: pulls events off an orchestrator run, feeds each
//! one through the [`RunSupervisor`], persists it to the [`HistoryStore`],
//! and forwards it to the consumer as an SSE record.
//!
//! Built the way a streaming compiler drives a compiled graph — an
//! `async_stream::stream!` wrapping a background task and an internal
//! channel — but the loop body here is driven by budget/policy state
//! instead of graph superstep scheduling.

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::Event;
use chrono::Utc;
use futures::Stream;
use mesh_checkpoint::{CheckpointSerializer, Checkpointer, JsonCheckpointSerializer};
use mesh_core::orchestrator::Orchestrator;
use mesh_events::{MultiAgentEvent, RunMetrics, RunResult, RunStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::error::{RunError, RunErrorCode};
use crate::history::{finalize_failure, finalize_success, HistoryStore};
use crate::run_request::{PreparedRun, RunRequestBody};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The wrapper persisted by [`Checkpointer`] on interrupt: the original
/// request body (to rebuild the orchestrator structurally) alongside the
/// orchestrator's own dynamic-state checkpoint. Loaded back by the resume
/// handler to reconstruct and restore an orchestrator before re-entering it.
#[derive(Serialize, Deserialize)]
pub struct ResumeCheckpoint {
    #[serde(rename = "requestBody")]
    pub request_body: RunRequestBody,
    pub checkpoint: mesh_core::interrupt::OrchestratorCheckpoint,
}

/// Drives `prepared` to completion. The returned stream yields every
/// non-suppressed event as an SSE record, ending with exactly one terminal
/// `done` or `error` record, then closes.
///
/// The drive loop runs in a background task decoupled from the returned
/// stream: when the SSE consumer disconnects, axum drops its half of the
/// outbound channel, the next attempted write to it fails, and that write
/// failure is what trips the disconnect path below — there is no separate
/// transport-level callback to hook into the response body.
pub fn drive_run(
    prepared: PreparedRun,
    history: Arc<dyn HistoryStore>,
    checkpointer: Arc<dyn Checkpointer>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let (out_tx, out_rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(drive_run_inner(prepared, history, checkpointer, out_tx));
    ReceiverStream::new(out_rx).map(Ok)
}

async fn drive_run_inner(
    prepared: PreparedRun,
    history: Arc<dyn HistoryStore>,
    checkpointer: Arc<dyn Checkpointer>,
    out_tx: mpsc::Sender<Event>,
) {
    let PreparedRun { run_id, mode, mut orchestrator, task, mut supervisor, request_body } = prepared;
    let started_at = Utc::now();

    if let Err(err) = history.start_run(run_id, mode, started_at).await {
        tracing::error!(%run_id, %err, "failed to persist run start");
    }

    let (tx, mut rx) = mpsc::channel::<MultiAgentEvent>(EVENT_CHANNEL_CAPACITY);
    let run_task = task.clone();
    let orchestrator_task = tokio::spawn(async move {
        let result = orchestrator.stream(run_task, tx).await;
        (orchestrator, result)
    });

    let mut sequence: u64 = 0;
    let mut terminate: Option<RunError> = None;
    let mut final_result: Option<RunResult> = None;

    'drive: loop {
        let idle_budget_ms = supervisor.budget().remaining_idle_budget_ms();
        let wait = Duration::from_millis(idle_budget_ms.max(1));

        let pulled = tokio::time::timeout(wait, rx.recv()).await;
        let event = match pulled {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                terminate = Some(RunError::run_idle_timeout_exceeded(idle_budget_ms));
                break;
            }
        };

        let outcome = supervisor.on_event(&event);

        if outcome.persist {
            sequence += 1;
            if let Err(err) = history.append_event(run_id, sequence, &event).await {
                tracing::error!(%run_id, %err, "failed to persist run event");
            }
        }
        if let Some(synthetic) = &outcome.synthetic_capped_record {
            sequence += 1;
            if let Err(err) = history.append_event(run_id, sequence, synthetic).await {
                tracing::error!(%run_id, %err, "failed to persist capped-stream record");
            }
        }
        if let MultiAgentEvent::NodeStop { node_id, node_result } = &event {
            if let Err(err) = history.record_node_metric(run_id, node_id, node_result).await {
                tracing::error!(%run_id, %err, "failed to persist node metric");
            }
        }

        // NodeStreamCapped is history-only, never sent to the consumer.
        if !matches!(event, MultiAgentEvent::NodeStreamCapped { .. }) {
            if let Some(sse_event) = to_sse_event(&event) {
                if out_tx.send(sse_event).await.is_err() {
                    terminate = Some(RunError::Disconnected);
                    break 'drive;
                }
            }
        }

        if let Some(err) = outcome.terminate {
            terminate = Some(err);
            break;
        }
    }

    // The orchestrator task is the sole producer for `rx`; a normal loop
    // exit (`rx.recv()` returning `None`) means it already finished and
    // this join is immediate. A `terminate`d exit may still have it
    // running, so abort it first — aborting an already-finished task is a
    // no-op and does not disturb the `Ok` below.
    orchestrator_task.abort();
    let mut finished_orchestrator: Option<Orchestrator> = None;
    if terminate.is_none() {
        match orchestrator_task.await {
            Ok((orchestrator, Ok(result))) => {
                finished_orchestrator = Some(orchestrator);
                final_result = Some(result);
            }
            Ok((_, Err(err))) => terminate = Some(RunError::from(err)),
            Err(_) => {}
        }
    }

    if terminate.is_none() {
        if let Some(err) = supervisor.check_agent_review_contract() {
            terminate = Some(err);
        }
    }

    let completed_at = Utc::now();

    match (terminate, final_result) {
        (Some(RunError::Disconnected), _) => {
            // Never surfaced to a consumer that is already gone.
            finalize_failure(history.as_ref(), run_id, completed_at, RunStatus::Interrupted, None, None).await;
        }
        (Some(err), _) => {
            let code = err.code().map(|c| c.as_str().to_string());
            finalize_failure(history.as_ref(), run_id, completed_at, RunStatus::Failed, code.clone(), Some(err.to_string())).await;
            let payload = json!({"runId": run_id, "message": err.to_string(), "code": code});
            let _ = out_tx.send(Event::default().event("error").data(payload.to_string())).await;
        }
        (None, Some(result)) if result.status == RunStatus::Interrupted => {
            finalize_failure(history.as_ref(), run_id, completed_at, RunStatus::Interrupted, None, None).await;
            if let Some(orchestrator) = finished_orchestrator {
                persist_resume_checkpoint(checkpointer.as_ref(), run_id, &request_body, &orchestrator, &task).await;
            }
            let payload = serde_json::to_string(&result).unwrap_or_default();
            let _ = out_tx.send(Event::default().event("done").data(payload)).await;
        }
        (None, Some(result)) => {
            let metrics = RunMetrics {
                duration_ms: result.execution_time_ms,
                node_count: result.per_node.len() as u32,
                tool_use_count: supervisor.budget().total_tool_uses() as u32,
            };
            finalize_success(history.as_ref(), run_id, completed_at, result.usage, metrics, result.estimated_cost_usd).await;
            let payload = serde_json::to_string(&result).unwrap_or_default();
            let _ = out_tx.send(Event::default().event("done").data(payload)).await;
        }
        (None, None) => {
            let message = "model stream ended before an aggregated result arrived";
            finalize_failure(history.as_ref(), run_id, completed_at, RunStatus::Failed, Some(RunErrorCode::ModelStreamIncomplete.as_str().to_string()), Some(message.to_string())).await;
            let payload = json!({"runId": run_id, "message": message, "code": RunErrorCode::ModelStreamIncomplete.as_str()});
            let _ = out_tx.send(Event::default().event("error").data(payload.to_string())).await;
        }
    }
}

/// Saves a resume blob — the request body plus the orchestrator's dynamic
/// state — keyed by `run_id`. A failure here only means the run can't later
/// be resumed; it does not change the run's own persisted status, so it is
/// logged rather than propagated.
async fn persist_resume_checkpoint(
    checkpointer: &dyn Checkpointer,
    run_id: uuid::Uuid,
    request_body: &RunRequestBody,
    orchestrator: &Orchestrator,
    current_task: &serde_json::Value,
) {
    let checkpoint = orchestrator.to_checkpoint(current_task.clone());
    let blob = ResumeCheckpoint { request_body: request_body.clone(), checkpoint };
    match JsonCheckpointSerializer.to_value(&blob) {
        Ok(value) => {
            if let Err(err) = checkpointer.save(&run_id.to_string(), value).await {
                tracing::error!(%run_id, %err, "failed to persist resume checkpoint");
            }
        }
        Err(err) => tracing::error!(%run_id, %err, "failed to serialize resume checkpoint"),
    }
}

fn to_sse_event(event: &MultiAgentEvent) -> Option<Event> {
    let data = serde_json::to_string(event).ok()?;
    Some(Event::default().event(event.type_tag()).data(data))
}
