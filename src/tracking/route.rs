/// A point on the route; named waypoints are delivery stops
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub name: Option<String>,
}

impl Waypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, name: None }
    }

    pub fn stop(x: f64, y: f64, name: &str) -> Self {
        Self {
            x,
            y,
            name: Some(name.to_string()),
        }
    }

    /// Named waypoints trigger braking and a dwell on arrival
    pub fn is_stop(&self) -> bool {
        self.name.as_deref().map(|n| !n.is_empty()).unwrap_or(false)
    }

    pub fn distance_to(&self, other: &Waypoint) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Fixed cyclic sequence of waypoints
///
/// Indices wrap: the waypoint after the last one is the first.
#[derive(Debug, Clone)]
pub struct Route {
    waypoints: Vec<Waypoint>,
}

impl Route {
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, RouteError> {
        if waypoints.len() < 2 {
            return Err(RouteError::TooFewWaypoints(waypoints.len()));
        }
        Ok(Self { waypoints })
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always false: `Route::new` requires at least two waypoints
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Waypoint at `index`, wrapping around the route
    pub fn get(&self, index: usize) -> &Waypoint {
        &self.waypoints[index % self.waypoints.len()]
    }

    /// Waypoint following `index`
    pub fn next(&self, index: usize) -> &Waypoint {
        self.get(index + 1)
    }

    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.waypoints.len()
    }

    /// Length of one full lap, in map units
    pub fn total_length(&self) -> f64 {
        (0..self.waypoints.len())
            .map(|i| self.get(i).distance_to(self.next(i)))
            .sum()
    }

    pub fn stops(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.iter().filter(|w| w.is_stop())
    }

    /// Urban delivery loop on an 800x600 map: depot, three stores, back to the depot
    pub fn delivery_loop() -> Self {
        let waypoints = vec![
            Waypoint::stop(50.0, 550.0, "Central Depot"),
            // Main street heading north
            Waypoint::new(50.0, 450.0),
            Waypoint::new(50.0, 350.0),
            Waypoint::new(50.0, 250.0),
            Waypoint::new(100.0, 200.0),
            Waypoint::new(150.0, 180.0),
            Waypoint::stop(250.0, 180.0, "Store A - North Street"),
            Waypoint::new(350.0, 180.0),
            Waypoint::new(450.0, 180.0),
            Waypoint::new(500.0, 200.0),
            Waypoint::new(550.0, 250.0),
            Waypoint::stop(550.0, 350.0, "Store B - Residential Zone"),
            Waypoint::new(550.0, 450.0),
            Waypoint::new(520.0, 500.0),
            Waypoint::new(450.0, 520.0),
            Waypoint::stop(350.0, 520.0, "Store C - South Mall"),
            // Return leg
            Waypoint::new(250.0, 520.0),
            Waypoint::new(150.0, 520.0),
            Waypoint::new(100.0, 540.0),
            Waypoint::stop(50.0, 550.0, "Back at Depot"),
        ];

        Self { waypoints }
    }
}

/// Route construction errors
#[derive(Debug, PartialEq, Clone)]
pub enum RouteError {
    TooFewWaypoints(usize),
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::TooFewWaypoints(n) => {
                write!(f, "Route needs at least 2 waypoints, got {}", n)
            }
        }
    }
}

impl std::error::Error for RouteError {}
