// src/digest/scheduler.rs
// Weekly schedule computation and the per-pipeline scheduler loop. One loop
// per pipeline; loops share nothing but the delivery channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDateTime, Timelike};
use metrics::counter;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::deliver::DeliveryChannel;
use crate::digest::DigestPipeline;
use crate::error::DigestError;

/// Fixed wait after a failed run before recomputing the next slot.
const ERROR_BACKOFF: Duration = Duration::from_secs(3600);

/// Random 0..=5min spread on top of the backoff so several pipelines hitting
/// the same outage do not retry in lockstep.
const MAX_BACKOFF_JITTER_SECS: u64 = 300;

/// Weekly slot: weekday 0 = Monday .. 6 = Sunday, plus hour and minute.
/// Immutable after construction; ranges are validated up front.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    weekday: u8,
    hour: u8,
    minute: u8,
}

impl ScheduleConfig {
    pub fn new(weekday: u8, hour: u8, minute: u8) -> Result<Self, DigestError> {
        if weekday > 6 || hour > 23 || minute > 59 {
            return Err(DigestError::Configuration(format!(
                "invalid schedule: weekday={weekday} hour={hour} minute={minute}"
            )));
        }
        Ok(Self {
            weekday,
            hour,
            minute,
        })
    }

    /// Next fire time strictly after `now`'s slot. When `now` is exactly on
    /// the configured weekday and minute, the slot counts as already passed
    /// and the result is one week out. That boundary is deliberate.
    pub fn next_run(&self, now: NaiveDateTime) -> NaiveDateTime {
        let current_weekday = now.weekday().num_days_from_monday() as i64;
        let mut days_ahead = self.weekday as i64 - current_weekday;

        if days_ahead == 0 && (now.hour(), now.minute()) >= (self.hour as u32, self.minute as u32)
        {
            days_ahead = 7;
        } else if days_ahead < 0 {
            days_ahead += 7;
        }

        (now + ChronoDuration::days(days_ahead))
            .date()
            .and_hms_opt(self.hour as u32, self.minute as u32, 0)
            .expect("hour/minute validated at construction")
    }
}

pub struct DigestScheduler {
    schedule: ScheduleConfig,
    pipeline: DigestPipeline,
    channel: Arc<dyn DeliveryChannel>,
    chat_id: i64,
}

impl DigestScheduler {
    pub fn new(
        schedule: ScheduleConfig,
        pipeline: DigestPipeline,
        channel: Arc<dyn DeliveryChannel>,
        chat_id: i64,
    ) -> Self {
        Self {
            schedule,
            pipeline,
            channel,
            chat_id,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_loop(cancel).await })
    }

    /// Compute next slot, sleep until it, run once, repeat. Cancellation is
    /// observed only while sleeping; a run in flight always completes. A
    /// failed run backs off (with jitter) instead of killing the loop.
    pub async fn run_loop(&self, cancel: CancellationToken) {
        info!(
            pipeline = %self.pipeline.name(),
            schedule = ?self.schedule,
            "scheduler started"
        );

        loop {
            let now = Local::now().naive_local();
            let next = self.schedule.next_run(now);
            let wait = (next - now).to_std().unwrap_or_default();

            info!(
                pipeline = %self.pipeline.name(),
                next = %next,
                hours = format!("{:.1}", wait.as_secs_f64() / 3600.0),
                "next digest run scheduled"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(pipeline = %self.pipeline.name(), "scheduler cancelled");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match self
                .pipeline
                .run_and_deliver(self.channel.as_ref(), self.chat_id)
                .await
            {
                Ok(state) => {
                    info!(pipeline = %self.pipeline.name(), state = ?state, "digest run finished");
                }
                Err(e) => {
                    error!(pipeline = %self.pipeline.name(), error = %e, "digest run failed");
                    counter!("digest_scheduler_backoffs_total").increment(1);
                    let jitter = rand::rng().random_range(0..=MAX_BACKOFF_JITTER_SECS);
                    let backoff = ERROR_BACKOFF + Duration::from_secs(jitter);
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(pipeline = %self.pipeline.name(), "scheduler cancelled during backoff");
                            break;
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }
}
