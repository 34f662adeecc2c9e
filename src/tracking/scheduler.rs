use crate::broadcast::BroadcastRegistry;
use crate::tracking::motion::{MotionModel, VehicleState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Event name of the global position feed
pub const POSITION_EVENT: &str = "position";

/// Shortest tick interval the scheduler runs at
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Drives the motion model at a fixed cadence and fans positions out to every connection
pub struct TickScheduler {
    model: MotionModel,
    registry: Arc<BroadcastRegistry>,
    tick_interval: Duration,
}

impl TickScheduler {
    /// A zero interval is raised to `MIN_TICK_INTERVAL`; `tokio::time::interval` rejects zero
    pub fn new(model: MotionModel, registry: Arc<BroadcastRegistry>, tick_interval: Duration) -> Self {
        let tick_interval = if tick_interval.is_zero() {
            warn!(
                min_ms = MIN_TICK_INTERVAL.as_millis() as u64,
                "Zero tick interval, using minimum"
            );
            MIN_TICK_INTERVAL
        } else {
            tick_interval
        };
        Self {
            model,
            registry,
            tick_interval,
        }
    }

    /// Spawn the tick loop; it runs until `shutdown` flips to true or its sender is dropped
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run the tick loop on the current task
    ///
    /// The vehicle state lives in this function only: each tick hands it to
    /// the model by value and takes the advanced state back.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let route = self.model.route();
        info!(
            waypoints = route.len(),
            stops = route.stops().count(),
            lap_length = route.total_length(),
            interval_ms = self.tick_interval.as_millis() as u64,
            "Vehicle tracking started"
        );

        let mut ticker = interval(self.tick_interval);
        // Skip missed ticks to prevent backlog under load
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut rng = StdRng::from_entropy();
        let mut state = VehicleState::default();
        let mut ticks: u64 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    // Sender dropped counts as shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let (event, next) = self.model.advance(state, Instant::now(), &mut rng);
            state = next;
            ticks += 1;

            match self.registry.publish_all(POSITION_EVENT, &event) {
                Ok(report) => {
                    debug!(
                        tick = ticks,
                        delivered = report.delivered,
                        failed = report.failed,
                        "Position published"
                    );
                }
                Err(e) => {
                    error!(tick = ticks, error = %e, "Failed to publish vehicle position");
                }
            }
        }

        info!(ticks = ticks, "Vehicle tracking stopped");
    }
}
