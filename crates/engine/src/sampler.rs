//! Periodic progress and speed sampling.

use std::sync::Weak;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::manager::Shared;

/// Spawns the sampling loop for a manager.
///
/// Progress ticks publish the aggregate; speed ticks refresh per-task speed
/// and ETA. The loop exits once nothing is pending or active, or when the
/// manager is gone.
pub(crate) fn spawn(shared: Weak<Shared>, progress_every: Duration, speed_every: Duration) {
    tokio::spawn(async move {
        let start = Instant::now();
        let mut progress = tokio::time::interval_at(start + progress_every, progress_every);
        let mut speed = tokio::time::interval_at(start + speed_every, speed_every);
        progress.set_missed_tick_behavior(MissedTickBehavior::Delay);
        speed.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = progress.tick() => {
                    let Some(shared) = shared.upgrade() else { break };
                    if !shared.progress_tick() {
                        break;
                    }
                }
                tick = speed.tick() => {
                    let Some(shared) = shared.upgrade() else { break };
                    shared.speed_tick(tick.into_std());
                }
            }
        }
        debug!("sampler stopped");
    });
}
