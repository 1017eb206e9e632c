//! Periodic world maintenance.
//!
//! One background task per world, started explicitly and stopped by
//! [`SharedWorld::shutdown`]. Each tick runs the registered triggers in
//! order (borrow-lease sweep, random spawner, ...). Triggers are advisory
//! housekeeping; correctness never depends on the tick having fired.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::world::SharedWorld;

/// One maintenance action, invoked with the world and the tick counter.
pub type TickTrigger = Box<dyn Fn(&SharedWorld, u64) + Send + Sync>;

/// Handle to the running maintenance task.
#[derive(Debug)]
pub struct MaintenanceHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal the task to finish. Safe to call more than once.
    pub fn stop(self) {
        let _ = self.stop.send(true);
        self.task.abort();
    }
}

/// Spawn the maintenance loop for `world`, ticking every `interval`.
///
/// The handle is stored on the world, so [`SharedWorld::shutdown`] stops
/// the loop; starting again replaces (and stops) a previous loop.
pub fn start_maintenance(
    world: &Arc<SharedWorld>,
    interval: Duration,
    triggers: Vec<TickTrigger>,
) {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let world_ref = Arc::clone(world);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first interval tick fires immediately; skip it so triggers
        // only run after a full period.
        ticker.tick().await;
        let mut tick: u64 = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tick += 1;
                    if !world_ref.is_running() {
                        break;
                    }
                    for trigger in &triggers {
                        trigger(&world_ref, tick);
                    }
                }
                _ = stop_rx.changed() => break,
            }
        }
        tracing::debug!(ticks = tick, "world maintenance loop stopped");
    });

    world.store_maintenance(MaintenanceHandle {
        stop: stop_tx,
        task,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn triggers_run_each_tick_until_stop() {
        let world = SharedWorld::new();
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = ticks.clone();

        start_maintenance(
            &world,
            Duration::from_millis(10),
            vec![Box::new(move |_, tick| {
                ticks_clone.store(tick, Ordering::SeqCst);
            })],
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        world.shutdown();
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several ticks, saw {seen}");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen, "ticks after stop");
    }

    #[tokio::test]
    async fn restart_replaces_the_previous_loop() {
        let world = SharedWorld::new();
        let first = Arc::new(AtomicU64::new(0));
        let first_clone = first.clone();
        start_maintenance(
            &world,
            Duration::from_millis(10),
            vec![Box::new(move |_, _| {
                first_clone.fetch_add(1, Ordering::SeqCst);
            })],
        );

        // Replacing the handle stops the first loop.
        start_maintenance(&world, Duration::from_millis(10), vec![]);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let frozen = first.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(first.load(Ordering::SeqCst), frozen);

        world.shutdown();
    }
}
