// src/pipeline/monitor.rs

//! Polling loop shared by the long-running monitors.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{AppError, Result};

/// One monitor's unit of work.
#[async_trait]
pub trait PollCycle: Send {
    /// Name used in log lines.
    fn name(&self) -> &str;

    async fn run_cycle(&mut self) -> Result<()>;

    /// Called after a non-fatal failure, before the next cycle.
    async fn recover(&mut self, error: &AppError);
}

/// When and how long to poll.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Time between cycle starts
    pub interval: Duration,
    /// Run a single cycle and return
    pub once: bool,
    /// Consecutive parse failures tolerated before stopping
    pub parse_failure_limit: u32,
}

/// Poll until Ctrl-C, a fatal error or too many parse failures in a row.
pub async fn run_monitor<C>(cycle: &mut C, schedule: &Schedule) -> Result<()>
where
    C: PollCycle + ?Sized,
{
    run_monitor_until(cycle, schedule, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Unable to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Like `run_monitor`, stopping cleanly when `shutdown` completes.
pub async fn run_monitor_until<C, F>(cycle: &mut C, schedule: &Schedule, shutdown: F) -> Result<()>
where
    C: PollCycle + ?Sized,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut parse_failures = 0u32;

    loop {
        let started = Instant::now();
        log::debug!("{}: starting cycle", cycle.name());

        let outcome = tokio::select! {
            result = cycle.run_cycle() => result,
            _ = &mut shutdown => {
                log::info!("{}: interrupted, exiting", cycle.name());
                return Ok(());
            }
        };

        match outcome {
            Ok(()) => {
                parse_failures = 0;
                log::debug!("{}: cycle finished in {:?}", cycle.name(), started.elapsed());
            }
            Err(e) if e.is_fatal() => {
                log::error!("{}: {}", cycle.name(), e);
                return Err(e);
            }
            Err(e) => {
                if e.is_parse() {
                    parse_failures += 1;
                } else {
                    parse_failures = 0;
                }
                log::error!("{}: cycle failed: {}", cycle.name(), e);
                cycle.recover(&e).await;

                if parse_failures >= schedule.parse_failure_limit {
                    log::error!(
                        "{}: {} consecutive parse failures, giving up",
                        cycle.name(),
                        parse_failures
                    );
                    return Err(e);
                }
                if schedule.once {
                    return Err(e);
                }
            }
        }

        if schedule.once {
            return Ok(());
        }

        let remaining = schedule.interval.saturating_sub(started.elapsed());
        log::debug!("{}: sleeping {:?}", cycle.name(), remaining);
        tokio::select! {
            _ = tokio::time::sleep(remaining) => {}
            _ = &mut shutdown => {
                log::info!("{}: interrupted, exiting", cycle.name());
                return Ok(());
            }
        }
    }
}
