// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Planner loop: claim due schedules, materialize job instances, advance
//! fire times.

use super::{apply_jitter, Engine, RunnerJob};
use cw_core::{Clock, JobId, JobInstance, JobState, Schedule, SchedulerEvent, TriggerError};
use cw_store::StoreError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub(crate) enum PlanError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),
}

/// Periodic claim-and-materialize loop. Only the leader plans; followers
/// keep ticking so they take over without restart when leadership moves.
pub(crate) async fn planner_loop<C: Clock>(engine: Arc<Engine<C>>) {
    let mut tick = tokio::time::interval(engine.config.planner_tick);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = engine.cancel.cancelled() => return,
            _ = tick.tick() => {}
        }
        if !engine.is_leader() {
            continue;
        }
        if let Err(e) = plan_once(&engine).await {
            // Background loops log their own errors and continue.
            warn!(error = %e, "planner tick failed");
        }
    }
}

/// One planner pass over the due set.
pub(crate) async fn plan_once<C: Clock>(engine: &Arc<Engine<C>>) -> Result<(), PlanError> {
    let now = engine.clock.now_utc();
    let due = engine.store.acquire_due(now, engine.config.planner_batch);
    for schedule in due {
        plan_schedule(engine, &schedule).await?;
    }
    Ok(())
}

async fn plan_schedule<C: Clock>(
    engine: &Arc<Engine<C>>,
    schedule: &Schedule,
) -> Result<(), PlanError> {
    let now = engine.clock.now_utc();
    let plan = schedule.plan_fires(now, engine.config.coalesce_cap)?;

    for missed in &plan.misfires {
        engine.exec_log.record_misfire(
            &schedule.id,
            &schedule.handler_id,
            &schedule.method_name,
            *missed,
        );
    }
    if plan.truncated {
        warn!(schedule_id = %schedule.id, "overdue fires truncated at the safety cap");
    }

    for fire_time in &plan.fires {
        let job = JobInstance {
            id: JobId::new(),
            schedule_id: Some(schedule.id.clone()),
            handler_id: schedule.handler_id.clone(),
            method_name: schedule.method_name.clone(),
            params: schedule.params.clone(),
            scheduled_for: *fire_time,
            created_at: now,
            attempt_number: 1,
            max_attempts: schedule.max_attempts,
            state: JobState::Queued,
            call_timeout: schedule.call_timeout,
        };
        engine.bus.publish_local(SchedulerEvent::JobQueued {
            job_id: job.id.clone(),
            schedule_id: job.schedule_id.clone(),
            handler_id: job.handler_id.clone(),
            method_name: job.method_name.clone(),
            scheduled_for: job.scheduled_for,
        });
        let Some(sender) = engine.queue_sender() else {
            // Draining: stop materializing; the claim lease will lapse.
            return Ok(());
        };
        if sender.send(RunnerJob { job, reply: None }).await.is_err() {
            return Ok(());
        }
    }

    match plan.next_fire_time {
        Some(next) => {
            let next = apply_jitter(next, schedule.max_jitter);
            debug!(schedule_id = %schedule.id, next = %next, "schedule released");
            engine.store.release(&schedule.id, Some(next))?;
            engine.bus.publish_local(SchedulerEvent::ScheduleReleased {
                schedule_id: schedule.id.clone(),
                next_fire_time: Some(next),
            });
        }
        None => {
            // Natural exhaustion: date triggers after firing, bounded
            // intervals after their end.
            debug!(schedule_id = %schedule.id, "schedule exhausted");
            engine.store.remove(&schedule.id)?;
            engine.bus.publish_local(SchedulerEvent::ScheduleRemoved {
                schedule_id: schedule.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
