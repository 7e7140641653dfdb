//! Fixed-cycle tick loop.
//!
//! The [`SimRunner`] advances a shared [`Plant`] once per cycle, either on the
//! calling thread ([`run`](SimRunner::run)) or on a background thread
//! ([`start`](SimRunner::start) / [`stop`](SimRunner::stop)). External
//! commands take the same lock as the loop, so they land between ticks.

use crate::error::SimError;
use crate::plant::Plant;
use flowsim_common::consts::STATS_LOG_INTERVAL;
use flowsim_common::line::config::RunnerConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Timing statistics of the tick loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimingStats {
    /// Number of cycles executed
    pub cycle_count: u64,
    /// Number of cycles that exceeded the cycle time
    pub timing_violations: u64,
    /// Maximum observed cycle time
    pub max_cycle_time_us: u64,
    /// Sum of cycle times for average calculation
    pub total_cycle_time_us: u64,
}

impl TimingStats {
    pub fn average_cycle_time_us(&self) -> u64 {
        self.total_cycle_time_us
            .checked_div(self.cycle_count)
            .unwrap_or(0)
    }

    fn record(&mut self, cycle_time_us: u64, budget_us: u64) {
        self.cycle_count += 1;
        self.total_cycle_time_us += cycle_time_us;
        self.max_cycle_time_us = self.max_cycle_time_us.max(cycle_time_us);

        if cycle_time_us > budget_us {
            self.timing_violations += 1;
            if self.timing_violations <= 10 || self.timing_violations % 1000 == 0 {
                warn!(
                    "Timing violation #{}: tick took {}us (target {}us)",
                    self.timing_violations, cycle_time_us, budget_us
                );
            }
        }

        if self.cycle_count % STATS_LOG_INTERVAL == 0 {
            debug!(
                "Tick loop: {} cycles, avg={}us, max={}us, violations={}",
                self.cycle_count,
                self.average_cycle_time_us(),
                self.max_cycle_time_us,
                self.timing_violations
            );
        }
    }
}

/// Loop state shared with the background thread.
#[derive(Clone)]
struct LoopCtx {
    plant: Arc<Mutex<Plant>>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<TimingStats>>,
    cycle_time: Duration,
    tick_seconds: f64,
}

impl LoopCtx {
    fn budget_us(&self) -> u64 {
        u64::try_from(self.cycle_time.as_micros()).unwrap_or(u64::MAX)
    }

    /// One tick; returns the time spent holding the plant.
    fn tick(&self) -> Result<Duration, SimError> {
        let start = Instant::now();
        self.plant.lock().advance(self.tick_seconds)?;
        let elapsed = start.elapsed();
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.stats.lock().record(us, self.budget_us());
        Ok(elapsed)
    }

    fn run(&self) -> Result<(), SimError> {
        info!(
            "Tick loop started (cycle_time={}ms, dt={}s)",
            self.cycle_time.as_millis(),
            self.tick_seconds
        );
        while self.running.load(Ordering::SeqCst) {
            let elapsed = match self.tick() {
                Ok(elapsed) => elapsed,
                Err(e) => {
                    error!("Tick failed: {}", e);
                    self.running.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            };
            if elapsed < self.cycle_time {
                std::thread::sleep(self.cycle_time - elapsed);
            }
        }
        let stats = *self.stats.lock();
        info!(
            "Tick loop stopped after {} cycles (violations: {})",
            stats.cycle_count, stats.timing_violations
        );
        Ok(())
    }
}

/// Drives a shared plant at a fixed cycle.
pub struct SimRunner {
    ctx: LoopCtx,
    handle: Option<JoinHandle<Result<(), SimError>>>,
}

impl SimRunner {
    pub fn new(plant: Plant, config: &RunnerConfig) -> Self {
        Self::shared(Arc::new(Mutex::new(plant)), config)
    }

    /// Runner over a plant that other threads also hold.
    pub fn shared(plant: Arc<Mutex<Plant>>, config: &RunnerConfig) -> Self {
        Self {
            ctx: LoopCtx {
                plant,
                running: Arc::new(AtomicBool::new(false)),
                stats: Arc::new(Mutex::new(TimingStats::default())),
                cycle_time: Duration::from_millis(config.cycle_time_ms),
                tick_seconds: config.tick_seconds(),
            },
            handle: None,
        }
    }

    pub fn plant(&self) -> Arc<Mutex<Plant>> {
        Arc::clone(&self.ctx.plant)
    }

    /// Flag that stops the loop when cleared, e.g. from a signal handler.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ctx.running)
    }

    pub fn is_running(&self) -> bool {
        self.ctx.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> TimingStats {
        *self.ctx.stats.lock()
    }

    /// Simulated seconds per tick.
    pub fn tick_seconds(&self) -> f64 {
        self.ctx.tick_seconds
    }

    /// Run on the calling thread until the running flag is cleared.
    ///
    /// # Errors
    /// `Runner` if a background loop is active, or the first tick error.
    pub fn run(&mut self) -> Result<(), SimError> {
        if self.handle.is_some() {
            return Err(SimError::Runner("already running in background".to_string()));
        }
        self.ctx.running.store(true, Ordering::SeqCst);
        self.ctx.run()
    }

    /// Run on a background thread.
    ///
    /// # Errors
    /// `Runner` if already started or the thread cannot be spawned.
    pub fn start(&mut self) -> Result<(), SimError> {
        if self.handle.is_some() {
            return Err(SimError::Runner("already started".to_string()));
        }
        self.ctx.running.store(true, Ordering::SeqCst);
        let ctx = self.ctx.clone();
        let handle = std::thread::Builder::new()
            .name("flowsim-tick".to_string())
            .spawn(move || ctx.run())
            .map_err(|e| {
                self.ctx.running.store(false, Ordering::SeqCst);
                SimError::Runner(format!("failed to spawn tick thread: {e}"))
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop and join the background thread.
    ///
    /// # Errors
    /// `Runner` if not started or the thread panicked, or the loop's own error.
    pub fn stop(&mut self) -> Result<(), SimError> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| SimError::Runner("not started".to_string()))?;
        self.ctx.running.store(false, Ordering::SeqCst);
        handle
            .join()
            .map_err(|_| SimError::Runner("tick thread panicked".to_string()))?
    }

    /// Advance `n` ticks without sleeping.
    pub fn run_ticks(&mut self, n: u64) -> Result<(), SimError> {
        if self.handle.is_some() {
            return Err(SimError::Runner("already running in background".to_string()));
        }
        for _ in 0..n {
            self.ctx.tick()?;
        }
        Ok(())
    }
}

impl Drop for SimRunner {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.stop() {
                warn!("Tick loop ended with error: {}", e);
            }
        }
    }
}
