// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner pool: dispatch job instances to handlers and apply retry/backoff.

use super::{DispatchError, Engine, RunOutcome, RunnerJob};
use cw_core::{Clock, JobState, SchedulerEvent};
use cw_wire::WireError;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Consume the job queue with bounded concurrency. Each attempt runs in its
/// own tracked task; retry timers are tracked too, so shutdown can drain
/// everything behind one deadline.
pub(crate) async fn runner_loop<C: Clock>(
    engine: Arc<Engine<C>>,
    mut queue_rx: mpsc::Receiver<RunnerJob>,
) {
    let semaphore = Arc::new(Semaphore::new(engine.config.runner_pool));
    while let Some(runner_job) = queue_rx.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            return;
        };
        let engine = Arc::clone(&engine);
        engine.tracker.clone().spawn(async move {
            execute(engine, runner_job).await;
            drop(permit);
        });
    }
}

/// Run one attempt of a job and route its outcome.
async fn execute<C: Clock>(engine: Arc<Engine<C>>, runner_job: RunnerJob) {
    let RunnerJob { mut job, reply } = runner_job;
    job.start_attempt();
    let handle = engine.exec_log.record_start(
        &job.id,
        &job.handler_id,
        &job.method_name,
        job.attempt_number,
        job.max_attempts,
        &job.params,
    );

    match attempt(&engine, &job).await {
        Ok(result) => {
            engine.registry.note_call_result(&job.handler_id, true);
            engine.exec_log.record_success(handle, result.clone());
            job.state = JobState::Succeeded;
            finish(&engine, &job, reply, Ok(result));
        }
        Err(error) => {
            if !matches!(error, DispatchError::Handler(_)) {
                engine.registry.note_call_result(&job.handler_id, false);
            }
            let final_attempt = !job.has_attempts_left();
            engine.exec_log.record_error(handle, error.to_string(), final_attempt);
            if final_attempt {
                warn!(job_id = %job.id, attempts = job.attempt_number, error = %error, "job failed");
                job.state = JobState::Failed;
                finish(&engine, &job, reply, Err(error));
            } else {
                job.state = JobState::RetryPending;
                let roll = rand::thread_rng().gen_range(-1.0..=1.0);
                let delay = engine.config.retry.delay_after(job.attempt_number, roll);
                debug!(job_id = %job.id, attempt = job.attempt_number, delay_ms = delay.as_millis() as u64, error = %error, "retry scheduled");
                let engine_for_timer = Arc::clone(&engine);
                engine.tracker.clone().spawn(async move {
                    retry_timer(engine_for_timer, job, reply, delay, error).await;
                });
            }
        }
    }
}

/// In-memory retry timer. Deliberately not persisted: a restart loses the
/// pending retry and the next schedule fire re-triggers the work; run-now
/// callers see the error instead.
async fn retry_timer<C: Clock>(
    engine: Arc<Engine<C>>,
    mut job: cw_core::JobInstance,
    reply: Option<tokio::sync::oneshot::Sender<RunOutcome>>,
    delay: std::time::Duration,
    last_error: DispatchError,
) {
    tokio::select! {
        _ = engine.cancel.cancelled() => {
            // Draining: the retry is abandoned.
            if let Some(tx) = reply {
                let _ = tx.send(Err(last_error));
            }
        }
        _ = tokio::time::sleep(delay) => {
            job.next_attempt();
            match engine.queue_sender() {
                Some(sender) => {
                    if let Err(send_error) = sender.send(RunnerJob { job, reply }).await {
                        if let Some(tx) = send_error.0.reply {
                            let _ = tx.send(Err(last_error));
                        }
                    }
                }
                None => {
                    if let Some(tx) = reply {
                        let _ = tx.send(Err(last_error));
                    }
                }
            }
        }
    }
}

/// One transport call to the job's handler.
///
/// Requests to a single handler serialize on its client lock; different
/// handlers dispatch fully in parallel, bounded by the pool.
async fn attempt<C: Clock>(
    engine: &Arc<Engine<C>>,
    job: &cw_core::JobInstance,
) -> Result<Option<serde_json::Value>, DispatchError> {
    let client = engine.registry.get_client(&job.handler_id).await.map_err(|e| {
        DispatchError::HandlerUnavailable(job.handler_id.clone(), e.to_string())
    })?;
    let timeout = job.call_timeout.unwrap_or(engine.config.call_timeout);

    let mut guard = client.lock().await;
    let reply = guard
        .call_with_timeout(&job.method_name, job.params.clone(), timeout)
        .await
        .map_err(|e| match e {
            WireError::Timeout => DispatchError::Timeout,
            WireError::Malformed(err) => DispatchError::Protocol(err.to_string()),
            WireError::FrameTooLarge(n) => {
                DispatchError::Protocol(format!("frame too large: {n} bytes"))
            }
            WireError::UnexpectedReply(s) => DispatchError::Protocol(s),
            other => DispatchError::Network(other.to_string()),
        })?;
    drop(guard);

    if reply.success {
        Ok(reply.result)
    } else {
        // Includes the authoritative call-time method check: a method the
        // handler no longer exposes comes back as a handler error.
        Err(DispatchError::Handler(reply.error_message().to_string()))
    }
}

fn finish<C: Clock>(
    engine: &Arc<Engine<C>>,
    job: &cw_core::JobInstance,
    reply: Option<tokio::sync::oneshot::Sender<RunOutcome>>,
    outcome: RunOutcome,
) {
    engine.bus.publish_local(SchedulerEvent::JobFinished {
        job_id: job.id.clone(),
        state: job.state,
        attempts: job.attempt_number,
    });
    if let Some(tx) = reply {
        let _ = tx.send(outcome);
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
