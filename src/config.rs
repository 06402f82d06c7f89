use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{comfort, geometry, protocol};

/// Boundary sync service configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Address the control channel binds to
    pub bind_address: IpAddr,
    /// Control channel port (0 picks an ephemeral port)
    pub tcp_port: u16,
    /// UDP port advertisements are sent to
    pub discovery_port: u16,
    /// Broadcast destination for advertisements
    pub broadcast_address: Ipv4Addr,
    /// Advertisement period
    pub broadcast_interval: Duration,
    /// Optional unicast destination sent alongside the broadcast
    pub unicast_target: Option<IpAddr>,
    /// Height of the extruded boundary walls
    pub wall_height: f32,
    /// Corner movement below which a frame is not re-committed
    pub recommit_threshold: f32,
    /// Port for the metrics endpoint, disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            tcp_port: protocol::SYNC_TCP_PORT,
            discovery_port: protocol::DISCOVERY_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
            broadcast_interval: Duration::from_millis(protocol::BROADCAST_INTERVAL_MS),
            unicast_target: None,
            wall_height: geometry::WALL_HEIGHT,
            recommit_threshold: geometry::RECOMMIT_THRESHOLD,
            metrics_port: None,
        }
    }
}

impl SyncConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(addr) = env_parse::<IpAddr>("SYNC_BIND_ADDRESS") {
            config.bind_address = addr;
        }

        if let Some(port) = env_parse::<u16>("SYNC_TCP_PORT") {
            config.tcp_port = port;
        }

        if let Some(port) = env_parse::<u16>("DISCOVERY_PORT") {
            if port > 0 {
                config.discovery_port = port;
            } else {
                tracing::warn!("DISCOVERY_PORT must be > 0, using default");
            }
        }

        if let Some(addr) = env_parse::<Ipv4Addr>("DISCOVERY_BROADCAST_ADDRESS") {
            config.broadcast_address = addr;
        }

        if let Some(ms) = env_parse::<u64>("DISCOVERY_INTERVAL_MS") {
            if (10..=60_000).contains(&ms) {
                config.broadcast_interval = Duration::from_millis(ms);
            } else {
                tracing::warn!("DISCOVERY_INTERVAL_MS must be 10-60000, using default");
            }
        }

        // Empty means broadcast only
        if let Ok(target) = std::env::var("DISCOVERY_TARGET") {
            let target = target.trim();
            if !target.is_empty() {
                match target.parse() {
                    Ok(ip) => config.unicast_target = Some(ip),
                    Err(_) => tracing::warn!("Invalid DISCOVERY_TARGET '{}', broadcasting only", target),
                }
            }
        }

        if let Some(height) = env_parse::<f32>("BOUNDARY_WALL_HEIGHT") {
            if height > 0.0 && height <= geometry::MAX_WALL_HEIGHT {
                config.wall_height = height;
            } else {
                tracing::warn!("BOUNDARY_WALL_HEIGHT must be in (0, {}], using default", geometry::MAX_WALL_HEIGHT);
            }
        }

        if let Some(threshold) = env_parse::<f32>("BOUNDARY_RECOMMIT_THRESHOLD") {
            if threshold >= 0.0 && threshold.is_finite() {
                config.recommit_threshold = threshold;
            } else {
                tracing::warn!("BOUNDARY_RECOMMIT_THRESHOLD must be >= 0, using default");
            }
        }

        if let Some(port) = env_parse::<u16>("METRICS_PORT") {
            if port > 0 {
                config.metrics_port = Some(port);
            } else {
                tracing::warn!("METRICS_PORT must be > 0, metrics disabled");
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.discovery_port == 0 {
            return Err("Discovery port cannot be 0".to_string());
        }
        if self.broadcast_interval.is_zero() {
            return Err("Broadcast interval must be positive".to_string());
        }
        if !(self.wall_height > 0.0 && self.wall_height <= geometry::MAX_WALL_HEIGHT) {
            return Err(format!("wall_height must be in (0, {}]", geometry::MAX_WALL_HEIGHT));
        }
        if !(self.recommit_threshold >= 0.0) {
            return Err("recommit_threshold cannot be negative".to_string());
        }
        if let Some(IpAddr::V6(ip)) = self.unicast_target {
            return Err(format!("unicast_target {} must be IPv4", ip));
        }
        if self.metrics_port.is_some() && self.metrics_port == Some(self.tcp_port) {
            return Err("metrics_port cannot equal the control channel port".to_string());
        }
        Ok(())
    }
}

/// How auto-turn applies its rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AutoTurnMode {
    /// Whole correction in one tick
    Snap,
    /// Spread over ticks at the configured angular speed
    LinearSmooth,
}

impl FromStr for AutoTurnMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snap" | "0" => Ok(Self::Snap),
            "smooth" | "linear" | "linear_smooth" | "1" => Ok(Self::LinearSmooth),
            other => Err(format!("unknown auto-turn mode '{}'", other)),
        }
    }
}

/// Comfort consumer settings
#[derive(Debug, Clone)]
pub struct ComfortConfig {
    pub auto_turn_enabled: bool,
    pub auto_turn_mode: AutoTurnMode,
    /// Distance at which a wall arms auto-turn
    pub auto_turn_activation_distance: f32,
    /// Distance beyond the activation distance a wall must be left behind
    /// before it can arm again
    pub auto_turn_deactivation_distance: f32,
    /// Snap turn magnitude in degrees
    pub auto_turn_snap_angle: f32,
    /// Face away from the corner when two walls are close
    pub auto_turn_use_corner_angle: bool,
    /// Smooth turn speed in degrees per second
    pub auto_turn_speed: f32,
    pub vestibular_enabled: bool,
    pub vestibular_radius: f32,
    pub ratchet_enabled: bool,
    /// Fraction of the angle to the wall that triggers a ratchet step
    pub ratchet_percent: f32,
    /// Comfort tick frequency in Hz
    pub tick_rate: u32,
}

impl Default for ComfortConfig {
    fn default() -> Self {
        Self {
            auto_turn_enabled: true,
            auto_turn_mode: AutoTurnMode::LinearSmooth,
            auto_turn_activation_distance: comfort::AUTO_TURN_ACTIVATION_DISTANCE,
            auto_turn_deactivation_distance: comfort::AUTO_TURN_DEACTIVATION_DISTANCE,
            auto_turn_snap_angle: comfort::AUTO_TURN_SNAP_ANGLE_DEG,
            auto_turn_use_corner_angle: true,
            auto_turn_speed: comfort::AUTO_TURN_SPEED_DEG_PER_SEC,
            vestibular_enabled: false,
            vestibular_radius: comfort::VESTIBULAR_MOTION_RADIUS,
            ratchet_enabled: false,
            ratchet_percent: comfort::VIEW_RATCHET_PERCENT,
            tick_rate: comfort::TICK_RATE,
        }
    }
}

impl ComfortConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(enabled) = env_bool("AUTO_TURN_ENABLED") {
            config.auto_turn_enabled = enabled;
        }
        if let Some(mode) = env_parse::<AutoTurnMode>("AUTO_TURN_MODE") {
            config.auto_turn_mode = mode;
        }
        if let Some(distance) = env_parse::<f32>("AUTO_TURN_ACTIVATION_DISTANCE") {
            config.auto_turn_activation_distance = distance;
        }
        if let Some(distance) = env_parse::<f32>("AUTO_TURN_DEACTIVATION_DISTANCE") {
            config.auto_turn_deactivation_distance = distance;
        }
        if let Some(angle) = env_parse::<f32>("AUTO_TURN_SNAP_ANGLE") {
            if angle > 0.0 && angle <= comfort::MAX_SNAP_ANGLE_DEG {
                config.auto_turn_snap_angle = angle;
            } else {
                tracing::warn!("AUTO_TURN_SNAP_ANGLE must be in (0, {}], using default", comfort::MAX_SNAP_ANGLE_DEG);
            }
        }
        if let Some(enabled) = env_bool("AUTO_TURN_USE_CORNER_ANGLE") {
            config.auto_turn_use_corner_angle = enabled;
        }
        if let Some(speed) = env_parse::<f32>("AUTO_TURN_SPEED") {
            config.auto_turn_speed = speed;
        }
        if let Some(enabled) = env_bool("VESTIBULAR_ENABLED") {
            config.vestibular_enabled = enabled;
        }
        if let Some(radius) = env_parse::<f32>("VESTIBULAR_RADIUS") {
            config.vestibular_radius = radius;
        }
        if let Some(enabled) = env_bool("RATCHET_ENABLED") {
            config.ratchet_enabled = enabled;
        }
        if let Some(percent) = env_parse::<f32>("RATCHET_PERCENT") {
            config.ratchet_percent = percent;
        }
        if let Some(rate) = env_parse::<u32>("COMFORT_TICK_RATE") {
            if (1..=1000).contains(&rate) {
                config.tick_rate = rate;
            } else {
                tracing::warn!("COMFORT_TICK_RATE must be 1-1000, using default");
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if !(self.auto_turn_activation_distance > 0.0) {
            return Err("auto_turn_activation_distance must be positive".to_string());
        }
        if !(self.auto_turn_deactivation_distance >= 0.0) {
            return Err("auto_turn_deactivation_distance cannot be negative".to_string());
        }
        if !(self.auto_turn_snap_angle > 0.0 && self.auto_turn_snap_angle <= comfort::MAX_SNAP_ANGLE_DEG) {
            return Err(format!("auto_turn_snap_angle must be in (0, {}]", comfort::MAX_SNAP_ANGLE_DEG));
        }
        if !(self.auto_turn_speed > 0.0) {
            return Err("auto_turn_speed must be positive".to_string());
        }
        if !(self.vestibular_radius > 0.0) {
            return Err("vestibular_radius must be positive".to_string());
        }
        if !(self.ratchet_percent > 0.0 && self.ratchet_percent <= 1.0) {
            return Err("ratchet_percent must be in (0, 1]".to_string());
        }
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, value);
            None
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Invalid {} '{}', using default", name, value);
            None
        }
    }
}
