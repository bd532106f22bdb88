//! # Block-driven scheduler
//!
//! Runs one search-and-submit cycle per new block, never two at once.
//!
//! While a cycle for block `N` is in flight:
//! * a notification for `N + 1` is dropped, since its cycle would target the
//!   same block the pending bundle is waiting on;
//! * a notification for `N + 2` or later cancels the in-flight cycle (its
//!   target block has passed) and the newer block is processed immediately;
//! * stale or repeated block numbers are ignored.
//!
//! Each cycle runs on its own task, so an error, a timeout or a panic inside
//! it is logged and counted. The scheduler only stops when its block stream
//! ends.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};
use tokio::task::JoinError;
use tokio::time::{error::Elapsed, timeout};

use crate::bot::CycleReport;

/// The part of a new block header a cycle needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block number
    pub number: u64,
    /// Base fee per gas; absent before EIP-1559
    pub base_fee: Option<u128>,
}

/// One block's unit of work.
pub trait CycleRunner: Send + Sync {
    /// Runs the cycle for `block`.
    ///
    /// # Errors
    /// * Any failure; the scheduler logs it and waits for the next block
    fn run_cycle(&self, block: BlockInfo) -> impl Future<Output = Result<CycleReport>> + Send;
}

/// Counters returned when the block stream ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Cycles started
    pub cycles_started: u64,
    /// Cycles that returned a report
    pub cycles_completed: u64,
    /// Cycles that returned an error, timed out or panicked
    pub cycles_failed: u64,
    /// Notifications dropped because a cycle was in flight
    pub notifications_dropped: u64,
    /// In-flight cycles cancelled by a newer block
    pub cycles_superseded: u64,
}

/// Drives a [`CycleRunner`] from a stream of new blocks.
#[derive(Debug)]
pub struct BlockDrivenScheduler<R> {
    /// Per-block work, shared with the in-flight cycle task
    runner: Arc<R>,
    /// Upper bound on one cycle
    cycle_timeout: Duration,
}

impl<R: CycleRunner + 'static> BlockDrivenScheduler<R> {
    /// Schedules `runner`, bounding each cycle by `cycle_timeout`
    #[must_use]
    pub fn new(runner: R, cycle_timeout: Duration) -> Self {
        Self {
            runner: Arc::new(runner),
            cycle_timeout,
        }
    }

    /// Cycle runner
    #[must_use]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Processes `blocks` until the stream ends. An in-flight cycle is
    /// allowed to finish when the stream ends.
    pub async fn run<S>(&self, mut blocks: S) -> SchedulerStats
    where
        S: Stream<Item = BlockInfo> + Unpin,
    {
        let mut stats = SchedulerStats::default();
        let mut highest_seen: Option<u64> = None;
        let mut next = blocks.next().await;

        while let Some(block) = next.take() {
            if highest_seen.is_some_and(|highest| block.number <= highest) {
                debug!("scheduler: ignoring stale block {}", block.number);
                next = blocks.next().await;
                continue;
            }
            highest_seen = Some(block.number);
            stats.cycles_started += 1;
            debug!("scheduler: processing block {}", block.number);

            let in_flight = block.number;
            let runner = Arc::clone(&self.runner);
            let cycle_timeout = self.cycle_timeout;
            let mut cycle =
                tokio::spawn(async move { timeout(cycle_timeout, runner.run_cycle(block)).await });

            next = loop {
                tokio::select! {
                    result = &mut cycle => {
                        Self::record(&mut stats, in_flight, result);
                        break blocks.next().await;
                    }
                    notification = blocks.next() => match notification {
                        None => {
                            let result = (&mut cycle).await;
                            Self::record(&mut stats, in_flight, result);
                            break None;
                        }
                        Some(newer) if highest_seen.is_some_and(|highest| newer.number <= highest) => {
                            debug!("scheduler: ignoring stale block {}", newer.number);
                        }
                        Some(newer) if newer.number == in_flight + 1 => {
                            highest_seen = Some(newer.number);
                            stats.notifications_dropped += 1;
                            debug!(
                                "scheduler: dropping block {} while block {in_flight} is in flight",
                                newer.number
                            );
                        }
                        Some(newer) => {
                            stats.cycles_superseded += 1;
                            warn!(
                                "scheduler: block {} supersedes in-flight block {in_flight}",
                                newer.number
                            );
                            cycle.abort();
                            break Some(newer);
                        }
                    }
                }
            };
        }

        info!("scheduler: block stream ended: {stats:?}");
        stats
    }

    /// Logs and counts a finished cycle
    fn record(
        stats: &mut SchedulerStats,
        block: u64,
        result: Result<Result<Result<CycleReport>, Elapsed>, JoinError>,
    ) {
        match result {
            Ok(Ok(Ok(report))) => {
                stats.cycles_completed += 1;
                info!("scheduler: {report}");
            }
            Ok(Ok(Err(e))) => {
                stats.cycles_failed += 1;
                error!("scheduler: cycle for block {block} failed: {e:?}");
            }
            Ok(Err(_)) => {
                stats.cycles_failed += 1;
                error!("scheduler: cycle for block {block} timed out");
            }
            Err(e) => {
                stats.cycles_failed += 1;
                error!("scheduler: cycle for block {block} did not finish: {e}");
            }
        }
    }
}
