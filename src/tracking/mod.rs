// Vehicle simulation: route, motion model, tick scheduler

mod motion;
mod route;
mod scheduler;

pub use motion::{MotionModel, VehiclePositionEvent, VehicleState, VehicleStatus};
pub use route::{Route, RouteError, Waypoint};
pub use scheduler::{TickScheduler, MIN_TICK_INTERVAL, POSITION_EVENT};
