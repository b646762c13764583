// =============================================================================
// Scheduler — one periodic trading tick per user, one tick in flight
// =============================================================================
//
// Each user gets a single spawned task that owns their BotState and runs the
// engine tick at `scanner.refresh_ms`. Invariants:
//
//   - At most one tick is in flight per user: the loop awaits the tick before
//     asking the interval for another; intervals that fire while a tick is
//     running are skipped and the overrun is logged.
//   - A stop request prevents future ticks; an in-flight tick always runs to
//     completion (the stop signal is only observed between ticks).
//   - Start is idempotent: starting a running user is a no-op.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::engine::Engine;

struct UserTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the per-user tick loops.
pub struct Scheduler {
    engine: Arc<Engine>,
    tasks: Mutex<HashMap<String, UserTask>>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start the tick loop for a user. Returns false when already running.
    pub fn start(&self, user_id: &str) -> Result<bool> {
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks.get(user_id) {
            if !task.handle.is_finished() {
                info!(user_id, "engine already running — start is a no-op");
                return Ok(false);
            }
        }

        let today = Local::now().date_naive();
        let state = self.engine.state_handle(user_id, today)?;
        state.write().is_running = true;

        let (stop_tx, stop_rx) = watch::channel(false);
        let engine = self.engine.clone();
        let user = user_id.to_string();

        let handle = tokio::spawn(run_user_loop(engine, user, state, stop_rx));

        tasks.insert(user_id.to_string(), UserTask { stop_tx, handle });
        info!(user_id, "engine started");
        Ok(true)
    }

    /// Request a stop. The in-flight tick (if any) finishes first.
    pub fn stop(&self, user_id: &str) -> bool {
        let mut tasks = self.tasks.lock();
        match tasks.remove(user_id) {
            Some(task) => {
                let _ = task.stop_tx.send(true);
                info!(user_id, "engine stop requested");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, user_id: &str) -> bool {
        self.tasks
            .lock()
            .get(user_id)
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop every running user (graceful shutdown).
    pub fn stop_all(&self) {
        let mut tasks = self.tasks.lock();
        for (user_id, task) in tasks.drain() {
            let _ = task.stop_tx.send(true);
            info!(user_id = %user_id, "engine stop requested (shutdown)");
        }
    }
}

async fn run_user_loop(
    engine: Arc<Engine>,
    user_id: String,
    state: crate::engine::SharedState,
    mut stop_rx: watch::Receiver<bool>,
) {
    let refresh_ms = engine
        .load_config(&user_id)
        .map(|cfg| cfg.scanner.refresh_ms)
        .unwrap_or(15_000);
    let period = Duration::from_millis(refresh_ms.max(100));

    let mut ticker = interval(period);
    // A tick that fires while the previous one is still running is dropped.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut tick_id: u64 = 0;
    info!(user_id = %user_id, period_ms = period.as_millis() as u64, "tick loop running");

    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                tick_id += 1;
                let started = Instant::now();

                let mut working = state.read().clone();
                let now = Utc::now();
                let today = Local::now().date_naive();

                if let Err(e) = engine
                    .run_tick(&user_id, &mut working, tick_id, now, today)
                    .await
                {
                    error!(user_id = %user_id, tick_id, error = %e, "tick failed");
                }
                *state.write() = working;

                let elapsed = started.elapsed();
                if elapsed > period {
                    warn!(
                        user_id = %user_id,
                        tick_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        period_ms = period.as_millis() as u64,
                        "tick overran its period — intervening ticks dropped"
                    );
                }
            }
        }
    }

    state.write().is_running = false;
    info!(user_id = %user_id, ticks = tick_id, "tick loop exited");
}
