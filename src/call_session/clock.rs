//! Session Clock
//!
//! Genau eine wiederkehrende Tick-Quelle pro Session. Der Tick-Callback
//! entscheidet per `ControlFlow`, ob die Uhr weiterläuft.

use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Standard-Tick: eine Sekunde
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Laufende Uhr; Drop bricht den Tick ab
#[derive(Debug)]
pub struct SessionClock {
    task: JoinHandle<()>,
}

impl SessionClock {
    /// Startet die Uhr. Der erste Tick erfolgt nach `period`.
    pub fn start<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if on_tick().is_break() {
                    break;
                }
            }
        });

        Self { task }
    }

    /// Bricht den Tick sofort ab
    pub fn cancel(self) {
        // Drop erledigt den Abbruch
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// TESTS
// ============================================================================
