//! Fixed-rate tick scheduler for the relay's processing loop.
//!
//! Each tick the relay drains its transport and sweeps stale rooms. The
//! scheduler decides when the next tick is due, what to do when one runs
//! late, and how much of the tick budget the work consumed.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = &mut shutdown => break,
//!         _ = scheduler.wait_for_tick() => {
//!             engine.tick(transport.poll_events(), Instant::now());
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a tick fires late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Forget the missed ticks and schedule the next one from now.
    #[default]
    Skip,
    /// Fire missed ticks back to back, up to `max_catchup` of them.
    /// Beyond that, behave like `Skip`.
    CatchUp { max_catchup: u32 },
    /// Keep the original cadence; the next tick is due one period after
    /// the one that was late.
    Drop,
}

#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Ticks per second, `1..=MAX_TICK_RATE_HZ`.
    pub tick_rate_hz: u32,
    pub policy: TickPolicy,
    /// Fraction of the tick period (0.0–1.0) above which
    /// [`TickScheduler::record_tick_end`] warns.
    pub budget_warn_threshold: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30,
            policy: TickPolicy::default(),
            budget_warn_threshold: 0.80,
        }
    }
}

impl TickConfig {
    pub const MIN_TICK_RATE_HZ: u32 = 1;
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values, warning about each one.
    pub fn validated(mut self) -> Self {
        let rate = self
            .tick_rate_hz
            .clamp(Self::MIN_TICK_RATE_HZ, Self::MAX_TICK_RATE_HZ);
        if rate != self.tick_rate_hz {
            warn!(requested = self.tick_rate_hz, using = rate, "tick rate out of range, clamping");
            self.tick_rate_hz = rate;
        }
        if !(0.0..=1.0).contains(&self.budget_warn_threshold) {
            let threshold = if self.budget_warn_threshold.is_nan() {
                TickConfig::default().budget_warn_threshold
            } else {
                self.budget_warn_threshold.clamp(0.0, 1.0)
            };
            warn!(
                requested = self.budget_warn_threshold,
                using = threshold,
                "budget warn threshold out of range, clamping"
            );
            self.budget_warn_threshold = threshold;
        }
        self
    }

    /// Length of one tick. Assumes a validated (non-zero) rate.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz.max(1) as f64)
    }
}

// ---------------------------------------------------------------------------
// Tick info and metrics
// ---------------------------------------------------------------------------

/// Returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// The fixed tick period.
    pub dt: Duration,
    /// The tick fired more than a tenth of a period late.
    pub overrun: bool,
    /// Ticks that will never fire because of the overrun.
    pub ticks_skipped: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of work time per tick (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Work time of the last tick over the tick period.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Where the next deadline goes after a tick that was due at `due` fired
/// at `now`. Returns the deadline and the number of ticks given up.
fn next_deadline(
    policy: TickPolicy,
    due: TokioInstant,
    now: TokioInstant,
    period: Duration,
) -> (TokioInstant, u64) {
    let late_by = now.saturating_duration_since(due);
    let behind = (late_by.as_nanos() / period.as_nanos().max(1)) as u64;
    match policy {
        TickPolicy::Skip => (now + period, behind),
        TickPolicy::CatchUp { max_catchup } if behind <= u64::from(max_catchup) => {
            (due + period, 0)
        }
        TickPolicy::CatchUp { max_catchup } => (now + period, behind - u64::from(max_catchup)),
        TickPolicy::Drop => (due + period, 0),
    }
}

/// Paces the relay loop at a fixed rate.
#[derive(Debug)]
pub struct TickScheduler {
    config: TickConfig,
    period: Duration,
    tick_count: u64,
    next_tick: TokioInstant,
    /// Set when a tick fires, taken by `record_tick_end`.
    work_started: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// The first tick is due one period from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.tick_duration();
        debug!(
            rate_hz = config.tick_rate_hz,
            period_ms = period.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "tick scheduler created"
        );
        Self {
            config,
            period,
            tick_count: 0,
            next_tick: TokioInstant::now() + period,
            work_started: None,
            metrics: TickMetrics::default(),
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Sleeps until the next tick is due.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the
    /// schedule untouched.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let due = self.next_tick;
        time::sleep_until(due).await;

        let now = TokioInstant::now();
        self.tick_count += 1;
        self.work_started = Some(Instant::now());

        let overrun = now.saturating_duration_since(due) > self.period / 10;
        let (next, ticks_skipped) = if overrun {
            next_deadline(self.config.policy, due, now, self.period)
        } else {
            (due + self.period, 0)
        };
        self.next_tick = next;

        if overrun {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = now.saturating_duration_since(due).as_secs_f64() * 1000.0,
                policy = ?self.config.policy,
                "tick overrun"
            );
        }

        self.metrics.total_ticks += 1;
        self.metrics.total_skipped += ticks_skipped;
        if overrun {
            self.metrics.total_overruns += 1;
        }
        trace!(tick = self.tick_count, overrun, "tick");

        TickInfo {
            tick: self.tick_count,
            dt: self.period,
            overrun,
            ticks_skipped,
        }
    }

    /// Marks the end of this tick's work and updates the budget metrics.
    /// Does nothing unless a tick fired since the last call.
    pub fn record_tick_end(&mut self) {
        let Some(started) = self.work_started.take() else {
            return;
        };
        let elapsed = started.elapsed();
        let utilization = elapsed.as_secs_f64() / self.period.as_secs_f64();
        self.metrics.budget_utilization = utilization;

        if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                budget_ms = self.period.as_secs_f64() * 1000.0,
                "tick work near or over budget"
            );
        }

        self.metrics.max_tick_time = self.metrics.max_tick_time.max(elapsed);
        let avg = self.metrics.avg_tick_time.as_secs_f64();
        self.metrics.avg_tick_time =
            Duration::from_secs_f64(avg * 0.9 + elapsed.as_secs_f64() * 0.1);
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn tick_duration(&self) -> Duration {
        self.period
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
