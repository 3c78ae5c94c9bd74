// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch engine: planner, runner pool, retry timers, and the operation
//! set exposed to the front-end.
//!
//! Two loops share one in-flight job set. The planner claims due schedules
//! and materializes job instances; the runner pool dispatches them to
//! handlers over wire clients and feeds failures into retry/backoff.
//! Shutdown is a single state machine: Running → Draining → Stopped.

mod planner;
mod runner;

#[cfg(test)]
pub(crate) mod test_support;

use crate::bus::Bus;
use crate::registry::{HandlerRegistry, HandlerSummary, RegistryError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cw_core::{
    Clock, Coalesce, ExecutionLog, JobId, JobInstance, JobState, RetryPolicy, Schedule,
    ScheduleId, SchedulerEvent, Trigger, TriggerError, COALESCE_ALL_CAP,
};
use cw_store::{ListFilter, Page, ScheduleStore, StoreError};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Transient dispatch failures; all feed the retry policy.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("handler '{0}' unavailable: {1}")]
    HandlerUnavailable(String, String),

    #[error("call timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("handler error: {0}")]
    Handler(String),
}

/// Errors surfaced through the API operation set.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("method '{method}' not exposed by handler '{handler_id}'")]
    MethodNotExposed { handler_id: String, method: String },

    #[error("schedule id '{0}' already exists")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status matching the stable `error.code`.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) | ApiError::MethodNotExposed { .. } => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::Unavailable(_) => 503,
            ApiError::Dispatch(_) | ApiError::Internal(_) => 500,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(id) => ApiError::Conflict(id),
            StoreError::NotFound(id) => ApiError::NotFound(format!("schedule '{id}' not found")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<TriggerError> for ApiError {
    fn from(e: TriggerError) -> Self {
        ApiError::Validation(format!("Invalid trigger configuration: {e}"))
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => {
                ApiError::NotFound(format!("Handler '{id}' not registered."))
            }
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Running,
    Draining,
    Stopped,
}

cw_core::wire_name! {
    EnginePhase {
        EnginePhase::Running => "running",
        EnginePhase::Draining => "draining",
        EnginePhase::Stopped => "stopped",
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Planner tick; also bounds shutdown latency of the loop.
    pub planner_tick: Duration,
    /// Max schedules claimed per tick.
    pub planner_batch: usize,
    /// Concurrent dispatch attempts.
    pub runner_pool: usize,
    pub queue_capacity: usize,
    /// Default per-call transport timeout (schedule-overridable).
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
    /// Per-acquire cap for `coalesce = all` and misfire accounting.
    pub coalesce_cap: usize,
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            planner_tick: Duration::from_millis(500),
            planner_batch: 100,
            runner_pool: 8,
            queue_capacity: 1024,
            call_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            coalesce_cap: COALESCE_ALL_CAP,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of one job instance reaching a terminal state.
pub type RunOutcome = Result<Option<serde_json::Value>, DispatchError>;

/// A materialized job plus the optional caller waiting on its outcome
/// (run-now requests).
pub(crate) struct RunnerJob {
    pub job: JobInstance,
    pub reply: Option<oneshot::Sender<RunOutcome>>,
}

/// Everything `add_schedule` accepts; the HTTP layer translates its JSON
/// body into this.
#[derive(Debug, Clone)]
pub struct AddScheduleRequest {
    pub handler_id: String,
    pub method_name: String,
    pub params: serde_json::Value,
    pub trigger: Trigger,
    pub schedule_id: Option<String>,
    pub misfire_grace_time: Option<Duration>,
    pub coalesce: Option<Coalesce>,
    pub max_jitter: Option<Duration>,
    pub max_attempts: Option<u32>,
    pub call_timeout: Option<Duration>,
    pub paused_until: Option<DateTime<Utc>>,
    pub replace_existing: bool,
}

/// Handler listing row with live connectivity.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerView {
    #[serde(flatten)]
    pub summary: HandlerSummary,
    /// Result of a synchronous short-timeout ping.
    pub alive: bool,
}

pub struct Engine<C: Clock> {
    pub(crate) store: Arc<ScheduleStore>,
    pub(crate) registry: Arc<HandlerRegistry<C>>,
    pub(crate) exec_log: Arc<ExecutionLog<C>>,
    pub(crate) bus: Bus,
    pub(crate) clock: C,
    pub(crate) config: EngineConfig,
    queue_tx: Mutex<Option<mpsc::Sender<RunnerJob>>>,
    queue_rx: Mutex<Option<mpsc::Receiver<RunnerJob>>>,
    phase_tx: watch::Sender<EnginePhase>,
    pub(crate) cancel: CancellationToken,
    pub(crate) tracker: TaskTracker,
    leader_rx: watch::Receiver<bool>,
    started_at: std::time::Instant,
}

impl<C: Clock> Engine<C> {
    pub fn new(
        store: Arc<ScheduleStore>,
        registry: Arc<HandlerRegistry<C>>,
        exec_log: Arc<ExecutionLog<C>>,
        bus: Bus,
        clock: C,
        config: EngineConfig,
        leader_rx: watch::Receiver<bool>,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);
        let (phase_tx, _) = watch::channel(EnginePhase::Running);
        Arc::new(Self {
            store,
            registry,
            exec_log,
            bus,
            clock,
            config,
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx: Mutex::new(Some(queue_rx)),
            phase_tx,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            leader_rx,
            started_at: std::time::Instant::now(),
        })
    }

    /// Spawn the planner loop and the runner pool.
    pub fn spawn_loops(self: &Arc<Self>) {
        let Some(queue_rx) = self.queue_rx.lock().take() else {
            return; // already spawned
        };
        let planner = Arc::clone(self);
        self.tracker.spawn(async move { planner::planner_loop(planner).await });
        let runner = Arc::clone(self);
        self.tracker.spawn(async move { runner::runner_loop(runner, queue_rx).await });
    }

    pub fn phase(&self) -> EnginePhase {
        *self.phase_tx.borrow()
    }

    pub fn phase_watch(&self) -> watch::Receiver<EnginePhase> {
        self.phase_tx.subscribe()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn exec_log(&self) -> &ExecutionLog<C> {
        &self.exec_log
    }

    pub(crate) fn is_leader(&self) -> bool {
        *self.leader_rx.borrow()
    }

    fn ensure_accepting(&self) -> Result<(), ApiError> {
        match self.phase() {
            EnginePhase::Running => Ok(()),
            _ => Err(ApiError::Unavailable("coordinator is shutting down".to_string())),
        }
    }

    pub(crate) fn queue_sender(&self) -> Option<mpsc::Sender<RunnerJob>> {
        self.queue_tx.lock().clone()
    }

    /// Add (or replace) a schedule.
    ///
    /// The method check here is best-effort; handlers can re-register with
    /// a different method set, so the authoritative check happens at call time.
    pub fn add_schedule(&self, request: AddScheduleRequest) -> Result<String, ApiError> {
        self.ensure_accepting()?;

        let entry = self
            .registry
            .get_entry(&request.handler_id)
            .ok_or_else(|| ApiError::NotFound(format!(
                "Handler '{}' not registered.",
                request.handler_id
            )))?;
        if !entry.exposes(&request.method_name) {
            return Err(ApiError::MethodNotExposed {
                handler_id: request.handler_id,
                method: request.method_name,
            });
        }
        if !request.params.is_object() {
            return Err(ApiError::Validation("job_params must be an object".to_string()));
        }

        let now = self.clock.now_utc();
        let mut trigger = request.trigger;
        trigger.validate()?;
        trigger.anchor(now);
        let first_fire = trigger
            .next_fire_after(now)?
            .ok_or_else(|| ApiError::Validation("trigger never fires".to_string()))?;
        let first_fire = apply_jitter(first_fire, request.max_jitter);

        let id = request
            .schedule_id
            .unwrap_or_else(|| ScheduleId::new().to_string());
        let schedule = Schedule {
            id: id.clone(),
            handler_id: request.handler_id,
            method_name: request.method_name,
            params: request.params,
            trigger,
            next_fire_time: Some(first_fire),
            misfire_grace_time: request.misfire_grace_time,
            coalesce: request.coalesce.unwrap_or_default(),
            max_jitter: request.max_jitter,
            paused_until: request.paused_until,
            max_attempts: request.max_attempts.unwrap_or(self.config.retry.max_attempts),
            call_timeout: request.call_timeout,
            created_at: now,
        };
        self.store.put(schedule.clone(), request.replace_existing)?;
        self.bus
            .publish_local(SchedulerEvent::ScheduleAdded { schedule: Box::new(schedule) });
        info!(schedule_id = %id, "schedule added");
        Ok(id)
    }

    pub fn remove_schedule(&self, schedule_id: &str) -> Result<(), ApiError> {
        self.ensure_accepting()?;
        if !self.store.remove(schedule_id)? {
            return Err(ApiError::NotFound(format!("schedule '{schedule_id}' not found")));
        }
        self.bus.publish_local(SchedulerEvent::ScheduleRemoved {
            schedule_id: schedule_id.to_string(),
        });
        info!(schedule_id, "schedule removed");
        Ok(())
    }

    pub fn list_schedules(&self, filter: &ListFilter) -> Page {
        self.store.list(filter)
    }

    /// Enqueue a job bypassing the schedule store and wait for its terminal
    /// outcome (through retries).
    pub async fn run_now(
        &self,
        handler_id: &str,
        method_name: &str,
        params: serde_json::Value,
    ) -> Result<(JobId, Option<serde_json::Value>), ApiError> {
        self.ensure_accepting()?;

        let entry = self
            .registry
            .get_entry(handler_id)
            .ok_or_else(|| ApiError::NotFound(format!("Handler '{handler_id}' not registered.")))?;
        if !entry.exposes(method_name) {
            return Err(ApiError::MethodNotExposed {
                handler_id: handler_id.to_string(),
                method: method_name.to_string(),
            });
        }
        if !params.is_object() {
            return Err(ApiError::Validation("job_params must be an object".to_string()));
        }

        let now = self.clock.now_utc();
        let job = JobInstance {
            id: JobId::new(),
            schedule_id: None,
            handler_id: handler_id.to_string(),
            method_name: method_name.to_string(),
            params,
            scheduled_for: now,
            created_at: now,
            attempt_number: 1,
            max_attempts: self.config.retry.max_attempts,
            state: JobState::Queued,
            call_timeout: None,
        };
        let job_id = job.id.clone();

        let (reply_tx, reply_rx) = oneshot::channel();
        let sender = self
            .queue_sender()
            .ok_or_else(|| ApiError::Unavailable("coordinator is shutting down".to_string()))?;
        sender
            .send(RunnerJob { job, reply: Some(reply_tx) })
            .await
            .map_err(|_| ApiError::Unavailable("job queue closed".to_string()))?;

        match reply_rx.await {
            Ok(Ok(result)) => Ok((job_id, result)),
            Ok(Err(e)) => Err(ApiError::Dispatch(e)),
            Err(_) => Err(ApiError::Internal("runner dropped the job".to_string())),
        }
    }

    /// All handlers with live connectivity (synchronous short-timeout ping).
    pub async fn list_handlers(&self) -> Vec<HandlerView> {
        let summaries = self.registry.list();
        let mut join_set = tokio::task::JoinSet::new();
        for summary in &summaries {
            let registry = Arc::clone(&self.registry);
            let handler_id = summary.handler_id.clone();
            join_set.spawn(async move {
                let alive = registry.check_liveness(&handler_id).await;
                (handler_id, alive)
            });
        }
        let mut liveness = std::collections::HashMap::new();
        while let Some(result) = join_set.join_next().await {
            if let Ok((handler_id, alive)) = result {
                liveness.insert(handler_id, alive);
            }
        }
        // Re-list to pick up the statuses the probes just wrote.
        self.registry
            .list()
            .into_iter()
            .map(|summary| {
                let alive = liveness.get(&summary.handler_id).copied().unwrap_or(false);
                HandlerView { summary, alive }
            })
            .collect()
    }

    /// Drain and stop: planner claims stop immediately, in-flight attempts
    /// run to their own timeouts, pending retries are abandoned.
    pub async fn shutdown(&self) {
        if self.phase() != EnginePhase::Running {
            return;
        }
        info!("engine draining");
        // send_replace updates the phase even with no subscribers watching.
        self.phase_tx.send_replace(EnginePhase::Draining);
        self.cancel.cancel();
        self.queue_tx.lock().take();
        self.tracker.close();
        if tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!("shutdown deadline elapsed with work still in flight");
        }
        self.phase_tx.send_replace(EnginePhase::Stopped);
        info!("engine stopped");
    }
}

/// Add a uniform random delay in `[0, max_jitter]` to a computed fire time.
pub(crate) fn apply_jitter(
    base: DateTime<Utc>,
    max_jitter: Option<Duration>,
) -> DateTime<Utc> {
    match max_jitter {
        Some(max) if !max.is_zero() => {
            let jitter_ms = rand::thread_rng().gen_range(0..=max.as_millis() as i64);
            base + ChronoDuration::milliseconds(jitter_ms)
        }
        _ => base,
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
