use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Complete Fleetcast configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetcastConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Browser origin allowed by CORS (None disables the layer)
    #[serde(default = "default_cors_allowed_origin")]
    pub cors_allowed_origin: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_allowed_origin() -> Option<String> {
    Some("http://localhost:3000".to_string())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allowed_origin: default_cors_allowed_origin(),
        }
    }
}

/// Vehicle simulation tuning
///
/// Speeds are in km/h, progress values are fractions of one route segment.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Delay between simulation ticks (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    /// Speed gained per tick while accelerating
    #[serde(default = "default_acceleration")]
    pub acceleration: f64,
    /// Speed lost per tick while braking for a named stop
    #[serde(default = "default_deceleration")]
    pub deceleration: f64,
    /// Floor applied whenever the vehicle is not parked
    #[serde(default = "default_min_moving_speed")]
    pub min_moving_speed: f64,
    /// Floor applied while braking into a named stop
    #[serde(default = "default_approach_floor_speed")]
    pub approach_floor_speed: f64,
    /// Segment progress per tick at full speed
    #[serde(default = "default_progress_factor")]
    pub progress_factor: f64,
    /// Parking time at a named waypoint (seconds)
    #[serde(default = "default_dwell_seconds")]
    pub dwell_seconds: u64,
    /// Chance per tick of a traffic slowdown
    #[serde(default = "default_traffic_probability")]
    pub traffic_probability: f64,
    /// Speed multiplier applied on a traffic slowdown
    #[serde(default = "default_traffic_damping")]
    pub traffic_damping: f64,
    /// Target speed (fraction of max) when the next waypoint is a named stop
    #[serde(default = "default_approach_speed_ratio")]
    pub approach_speed_ratio: f64,
    /// Remaining segment fraction under which the vehicle brakes for a stop
    #[serde(default = "default_braking_window")]
    pub braking_window: f64,
    /// Remaining segment fraction under which the status reads "Braking"
    #[serde(default = "default_braking_status_window")]
    pub braking_status_window: f64,
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_max_speed() -> f64 {
    60.0
}

fn default_acceleration() -> f64 {
    2.0
}

fn default_deceleration() -> f64 {
    3.0
}

fn default_min_moving_speed() -> f64 {
    5.0
}

fn default_approach_floor_speed() -> f64 {
    10.0
}

fn default_progress_factor() -> f64 {
    0.02
}

fn default_dwell_seconds() -> u64 {
    2
}

fn default_traffic_probability() -> f64 {
    0.02
}

fn default_traffic_damping() -> f64 {
    0.9
}

fn default_approach_speed_ratio() -> f64 {
    0.6
}

fn default_braking_window() -> f64 {
    0.2
}

fn default_braking_status_window() -> f64 {
    0.3
}

impl TrackingConfig {
    /// Reject values that would stall the vehicle or stop the tick loop
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.tick_interval_ms > 0, "tracking.tick_interval_ms must be greater than 0");
        ensure_positive("tracking.max_speed", self.max_speed)?;
        ensure_positive("tracking.progress_factor", self.progress_factor)?;
        ensure_positive("tracking.min_moving_speed", self.min_moving_speed)?;
        ensure_non_negative("tracking.acceleration", self.acceleration)?;
        ensure_non_negative("tracking.deceleration", self.deceleration)?;
        ensure_non_negative("tracking.approach_floor_speed", self.approach_floor_speed)?;
        ensure_fraction("tracking.traffic_probability", self.traffic_probability)?;
        ensure_fraction("tracking.traffic_damping", self.traffic_damping)?;
        ensure_fraction("tracking.approach_speed_ratio", self.approach_speed_ratio)?;
        ensure_fraction("tracking.braking_window", self.braking_window)?;
        ensure_fraction("tracking.braking_status_window", self.braking_status_window)?;
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_secs(self.dwell_seconds)
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_speed: default_max_speed(),
            acceleration: default_acceleration(),
            deceleration: default_deceleration(),
            min_moving_speed: default_min_moving_speed(),
            approach_floor_speed: default_approach_floor_speed(),
            progress_factor: default_progress_factor(),
            dwell_seconds: default_dwell_seconds(),
            traffic_probability: default_traffic_probability(),
            traffic_damping: default_traffic_damping(),
            approach_speed_ratio: default_approach_speed_ratio(),
            braking_window: default_braking_window(),
            braking_status_window: default_braking_status_window(),
        }
    }
}

/// Payment workflow simulation
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Simulated gateway latency (milliseconds)
    #[serde(default = "default_settlement_delay_ms")]
    pub settlement_delay_ms: u64,
    /// Fraction of payments approved by the random decider
    #[serde(default = "default_approval_rate")]
    pub approval_rate: f64,
}

impl PaymentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure_fraction("payment.approval_rate", self.approval_rate)
    }
}

fn default_settlement_delay_ms() -> u64 {
    5000
}

fn default_approval_rate() -> f64 {
    0.8
}

impl PaymentConfig {
    pub fn settlement_delay(&self) -> Duration {
        Duration::from_millis(self.settlement_delay_ms)
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            settlement_delay_ms: default_settlement_delay_ms(),
            approval_rate: default_approval_rate(),
        }
    }
}

/// Broadcast registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Outbound events buffered per connection before deliveries start failing
    #[serde(default = "default_connection_queue_capacity")]
    pub connection_queue_capacity: usize,
}

fn default_connection_queue_capacity() -> usize {
    256
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            connection_queue_capacity: default_connection_queue_capacity(),
        }
    }
}

/// Identity configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Reject connections and requests without a known token
    #[serde(default)]
    pub require_auth: bool,
    /// Access token -> subject id
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl FleetcastConfig {
    /// Check every section; called once at startup
    pub fn validate(&self) -> anyhow::Result<()> {
        self.tracking.validate()?;
        self.payment.validate()?;
        anyhow::ensure!(
            self.broadcast.connection_queue_capacity > 0,
            "broadcast.connection_queue_capacity must be greater than 0"
        );
        Ok(())
    }
}

fn ensure_positive(name: &str, value: f64) -> anyhow::Result<()> {
    anyhow::ensure!(
        value.is_finite() && value > 0.0,
        "{} must be a finite number greater than 0, got {}",
        name,
        value
    );
    Ok(())
}

fn ensure_non_negative(name: &str, value: f64) -> anyhow::Result<()> {
    anyhow::ensure!(
        value.is_finite() && value >= 0.0,
        "{} must be a finite number of at least 0, got {}",
        name,
        value
    );
    Ok(())
}

fn ensure_fraction(name: &str, value: f64) -> anyhow::Result<()> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&value),
        "{} must be between 0 and 1, got {}",
        name,
        value
    );
    Ok(())
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> anyhow::Result<FleetcastConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: FleetcastConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Load configuration from `FLEETCAST_CONFIG` (default `fleetcast.toml`), then apply env overrides.
///
/// A missing file is not an error: defaults are used.
pub fn load_from_env() -> anyhow::Result<FleetcastConfig> {
    let path = std::env::var("FLEETCAST_CONFIG").unwrap_or_else(|_| "fleetcast.toml".to_string());

    let mut config = if std::path::Path::new(&path).exists() {
        load_config(&path)?
    } else {
        FleetcastConfig::default()
    };

    if let Ok(v) = std::env::var("FLEETCAST_PORT") {
        config.server.port = v
            .parse()
            .map_err(|_| anyhow::anyhow!("FLEETCAST_PORT must be a valid port number"))?;
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = FleetcastConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.tracking.tick_interval_ms, 50);
        assert_eq!(config.tracking.max_speed, 60.0);
        assert_eq!(config.tracking.dwell(), Duration::from_secs(2));
        assert_eq!(config.payment.settlement_delay(), Duration::from_secs(5));
        assert_eq!(config.payment.approval_rate, 0.8);
        assert_eq!(config.broadcast.connection_queue_capacity, 256);
        assert!(!config.auth.require_auth);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            cors_allowed_origin = "https://fleet.example.com"

            [tracking]
            tick_interval_ms = 100
            max_speed = 80.0
            dwell_seconds = 5

            [payment]
            settlement_delay_ms = 250
            approval_rate = 1.0

            [broadcast]
            connection_queue_capacity = 16

            [auth]
            require_auth = true

            [auth.tokens]
            "tok-admin" = "admin"
        "#;

        let config: FleetcastConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(
            config.server.cors_allowed_origin.as_deref(),
            Some("https://fleet.example.com")
        );
        assert_eq!(config.tracking.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.tracking.max_speed, 80.0);
        assert_eq!(config.tracking.dwell_seconds, 5);
        assert_eq!(config.payment.settlement_delay_ms, 250);
        assert_eq!(config.broadcast.connection_queue_capacity, 16);
        assert!(config.auth.require_auth);
        assert_eq!(config.auth.tokens.get("tok-admin").unwrap(), "admin");
    }

    #[test]
    fn test_partial_config() {
        // Missing sections and fields use defaults
        let toml = r#"
            [tracking]
            acceleration = 4.0
        "#;

        let config: FleetcastConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.tracking.acceleration, 4.0);
        assert_eq!(config.tracking.deceleration, 3.0); // Default
        assert_eq!(config.server.port, 5000); // Default
        assert!(config.auth.tokens.is_empty());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[payment]\nsettlement_delay_ms = 10").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.payment.settlement_delay_ms, 10);
        assert_eq!(config.payment.approval_rate, 0.8);
    }

    #[test]
    fn test_load_config_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();

        assert!(load_config(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(FleetcastConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_tick_interval() {
        let config: FleetcastConfig = toml::from_str("[tracking]\ntick_interval_ms = 0").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn test_validate_rejects_stalling_motion_params() {
        for toml in [
            "[tracking]\nmax_speed = 0.0",
            "[tracking]\nmax_speed = -10.0",
            "[tracking]\nprogress_factor = 0.0",
            "[tracking]\nmin_moving_speed = 0.0",
            "[tracking]\ntraffic_probability = 1.5",
            "[tracking]\ntraffic_damping = nan",
            "[tracking]\nbraking_window = -0.1",
        ] {
            let config: FleetcastConfig = toml::from_str(toml).unwrap();
            assert!(config.validate().is_err(), "accepted: {}", toml);
        }
    }

    #[test]
    fn test_validate_rejects_bad_approval_rate() {
        for toml in [
            "[payment]\napproval_rate = nan",
            "[payment]\napproval_rate = 1.2",
            "[payment]\napproval_rate = -0.5",
        ] {
            let config: FleetcastConfig = toml::from_str(toml).unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("approval_rate"), "{}", err);
        }

        let config: FleetcastConfig = toml::from_str("[payment]\napproval_rate = 1.0").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_queue_capacity() {
        let config: FleetcastConfig =
            toml::from_str("[broadcast]\nconnection_queue_capacity = 0").unwrap();
        assert!(config.validate().is_err());
    }
}
