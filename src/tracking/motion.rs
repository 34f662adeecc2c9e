use crate::config::TrackingConfig;
use crate::tracking::route::Route;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

/// Speed under which the vehicle reports "Stopped"
const STOPPED_SPEED_THRESHOLD: f64 = 1.0;

/// Mutable simulation state of the single tracked vehicle
///
/// Owned by the tick loop and passed through `MotionModel::advance` by value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VehicleState {
    pub waypoint_index: usize,
    /// Fraction of the current segment covered, in [0, 1)
    pub progress: f64,
    /// km/h
    pub speed: f64,
    /// Parked until this instant (dwell at a named stop)
    pub stopped_until: Option<Instant>,
}

impl VehicleState {
    pub fn is_parked(&self) -> bool {
        self.stopped_until.is_some()
    }
}

/// Status label carried in position events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VehicleStatus {
    Stopped,
    Braking,
    Accelerating,
    Moving,
}

/// Payload of the `position` event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePositionEvent {
    pub x: f64,
    pub y: f64,
    /// km/h, one decimal
    pub speed: f64,
    /// Degrees in [0, 360)
    pub heading: f64,
    pub status: VehicleStatus,
    /// Whole-lap completion, 0-100
    pub route_progress: u32,
    pub timestamp: DateTime<Utc>,
}

/// Motion rules for one vehicle on a fixed route
pub struct MotionModel {
    route: Route,
    params: TrackingConfig,
}

impl MotionModel {
    pub fn new(route: Route, params: TrackingConfig) -> Self {
        Self { route, params }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Advance one tick and return the resulting position event with the new state
    pub fn advance<R: Rng + ?Sized>(
        &self,
        state: VehicleState,
        now: Instant,
        rng: &mut R,
    ) -> (VehiclePositionEvent, VehicleState) {
        self.advance_by(state, 1, now, rng)
    }

    /// Advance `ticks` ticks at the same wall-clock instant
    pub fn advance_by<R: Rng + ?Sized>(
        &self,
        mut state: VehicleState,
        ticks: u32,
        now: Instant,
        rng: &mut R,
    ) -> (VehiclePositionEvent, VehicleState) {
        for _ in 0..ticks {
            state = self.step(state, now, rng);
        }
        (self.snapshot(&state), state)
    }

    /// Build the outgoing event for a state without changing it
    pub fn snapshot(&self, state: &VehicleState) -> VehiclePositionEvent {
        let current = self.route.get(state.waypoint_index);
        let next = self.route.next(state.waypoint_index);

        VehiclePositionEvent {
            x: lerp(current.x, next.x, state.progress),
            y: lerp(current.y, next.y, state.progress),
            speed: (state.speed * 10.0).round() / 10.0,
            heading: heading(current.x, current.y, next.x, next.y),
            status: self.status(state),
            route_progress: self.route_progress(state),
            timestamp: Utc::now(),
        }
    }

    pub fn status(&self, state: &VehicleState) -> VehicleStatus {
        if state.speed < STOPPED_SPEED_THRESHOLD {
            return VehicleStatus::Stopped;
        }

        let approaching_stop = self.route.next(state.waypoint_index).is_stop();
        if approaching_stop && 1.0 - state.progress < self.params.braking_status_window {
            return VehicleStatus::Braking;
        }

        if state.speed < self.params.max_speed * 0.5 {
            return VehicleStatus::Accelerating;
        }

        VehicleStatus::Moving
    }

    /// Lap completion percentage, truncated
    pub fn route_progress(&self, state: &VehicleState) -> u32 {
        let done = (state.waypoint_index as f64 + state.progress) / self.route.len() as f64;
        ((done * 100.0) as u32).min(100)
    }

    fn step<R: Rng + ?Sized>(&self, mut state: VehicleState, now: Instant, rng: &mut R) -> VehicleState {
        let p = &self.params;

        if let Some(until) = state.stopped_until {
            if now < until {
                state.speed = 0.0;
                return state;
            }
            state.stopped_until = None;
            info!(waypoint_index = state.waypoint_index, "Vehicle resuming movement");
        }

        let approaching_stop = self.route.next(state.waypoint_index).is_stop();
        let distance_to_next = 1.0 - state.progress;

        if approaching_stop && distance_to_next < p.braking_window {
            state.speed = (state.speed - p.deceleration).max(p.approach_floor_speed);
        } else if state.speed < p.max_speed {
            let target = if approaching_stop {
                p.max_speed * p.approach_speed_ratio
            } else {
                p.max_speed
            };
            state.speed = (state.speed + p.acceleration).min(target);
        }

        // Traffic noise
        if p.traffic_probability > 0.0 && rng.gen_bool(p.traffic_probability.min(1.0)) {
            state.speed *= p.traffic_damping;
        }

        // Never stall outside a dwell
        state.speed = state.speed.max(p.min_moving_speed);

        state.progress += (state.speed / p.max_speed) * p.progress_factor;

        if state.progress >= 1.0 {
            state.progress = 0.0;
            state.waypoint_index = self.route.next_index(state.waypoint_index);

            let arrived = self.route.get(state.waypoint_index);
            if arrived.is_stop() {
                let dwell: Duration = p.dwell();
                state.speed = 0.0;
                state.stopped_until = Some(now + dwell);
                info!(
                    location = %arrived.name.as_deref().unwrap_or_default(),
                    dwell_secs = dwell.as_secs(),
                    "Vehicle arrived at stop"
                );
            }
        }

        state
    }
}

fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}

/// Direction of travel in degrees, normalized to [0, 360)
fn heading(from_x: f64, from_y: f64, to_x: f64, to_y: f64) -> f64 {
    let degrees = (to_y - from_y).atan2(to_x - from_x).to_degrees();
    let normalized = degrees.rem_euclid(360.0);
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}
