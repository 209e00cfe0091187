//! Configuration loading and typed config structures for Greenwave.
//!
//! The canonical configuration lives in `greenwave-config.yaml` at the
//! project root. This module defines strongly-typed structs that mirror
//! the YAML structure, and provides a loader that reads and validates the
//! file. Every field has a default, so a missing file or a partial file
//! is always usable.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level control-plane configuration.
///
/// Mirrors the structure of `greenwave-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ControlConfig {
    /// Simulation session settings (endpoint, scenario, stepping, timeouts).
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Signal policy parameters (hysteresis margin, thresholds, emissions).
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Detection feed settings (endpoint, cadence, staleness).
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Infrastructure settings (observer port).
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ControlConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for external endpoints:
    /// - `GREENWAVE_SIM_HOST` overrides `simulation.host`
    /// - `GREENWAVE_SIM_PORT` overrides `simulation.port`
    /// - `GREENWAVE_DETECTION_ENDPOINT` overrides `detection.endpoint`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides for external endpoints.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("GREENWAVE_SIM_HOST") {
            self.simulation.host = host;
        }
        if let Ok(port) = std::env::var("GREENWAVE_SIM_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.simulation.port = port;
            }
        }
        if let Ok(endpoint) = std::env::var("GREENWAVE_DETECTION_ENDPOINT") {
            self.detection.endpoint = endpoint;
        }
    }
}

/// Simulation session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Hostname of the simulation engine's control port.
    #[serde(default = "default_sim_host")]
    pub host: String,

    /// TCP port of the simulation engine's control port.
    #[serde(default = "default_sim_port")]
    pub port: u16,

    /// Scenario reference handed to the engine on open.
    #[serde(default = "default_scenario")]
    pub scenario: String,

    /// Real-time milliseconds per simulation step.
    #[serde(default = "default_step_interval_ms")]
    pub step_interval_ms: u64,

    /// Milliseconds allowed for the session open before it fails.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Milliseconds allowed for a step or light command before it fails.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Maximum number of steps to run (0 = unlimited).
    #[serde(default)]
    pub max_steps: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            host: default_sim_host(),
            port: default_sim_port(),
            scenario: default_scenario(),
            step_interval_ms: default_step_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            max_steps: 0,
        }
    }
}

/// Signal policy configuration.
///
/// The hysteresis margin and pedestrian threshold are policy parameters,
/// not hardcoded truths; the defaults match the reference values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PolicyConfig {
    /// Minimum axis-count difference before the green axis switches.
    #[serde(default = "default_switch_margin")]
    pub switch_margin: u32,

    /// Pedestrian count above which the shorten-green advisory is emitted.
    #[serde(default = "default_pedestrian_threshold")]
    pub pedestrian_threshold: u32,

    /// Speed in meters per second below which a vehicle counts as queued.
    #[serde(default = "default_slow_speed_threshold")]
    pub slow_speed_threshold: f64,

    /// Estimated waiting seconds contributed per queued vehicle.
    #[serde(default = "default_wait_per_queued_s")]
    pub wait_per_queued_s: f64,

    /// Base CO2 output per vehicle per step, in kilograms.
    #[serde(default = "default_base_emission_kg")]
    pub base_emission_kg: f64,

    /// Additional CO2 output per queued vehicle per step, in kilograms.
    #[serde(default = "default_congestion_emission_kg")]
    pub congestion_emission_kg: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            switch_margin: default_switch_margin(),
            pedestrian_threshold: default_pedestrian_threshold(),
            slow_speed_threshold: default_slow_speed_threshold(),
            wait_per_queued_s: default_wait_per_queued_s(),
            base_emission_kg: default_base_emission_kg(),
            congestion_emission_kg: default_congestion_emission_kg(),
        }
    }
}

/// Detection feed configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectionConfig {
    /// HTTP endpoint serving detection summaries. Empty disables polling.
    #[serde(default)]
    pub endpoint: String,

    /// Milliseconds between detection polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum age in milliseconds before the feed counts as stale.
    #[serde(default = "default_staleness_ms")]
    pub staleness_ms: u64,

    /// Minimum confidence for a detection summary to be kept.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            staleness_ms: default_staleness_ms(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// Infrastructure configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// TCP port for the observer HTTP + `WebSocket` server.
    #[serde(default = "default_observer_port")]
    pub observer_port: u16,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            observer_port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_sim_host() -> String {
    String::from("localhost")
}

const fn default_sim_port() -> u16 {
    8813
}

fn default_scenario() -> String {
    String::from("traffic.sumocfg")
}

const fn default_step_interval_ms() -> u64 {
    1_000
}

const fn default_connect_timeout_ms() -> u64 {
    3_000
}

const fn default_command_timeout_ms() -> u64 {
    2_000
}

const fn default_switch_margin() -> u32 {
    3
}

const fn default_pedestrian_threshold() -> u32 {
    5
}

const fn default_slow_speed_threshold() -> f64 {
    2.0
}

const fn default_wait_per_queued_s() -> f64 {
    2.5
}

const fn default_base_emission_kg() -> f64 {
    0.12
}

const fn default_congestion_emission_kg() -> f64 {
    0.03
}

const fn default_poll_interval_ms() -> u64 {
    1_000
}

const fn default_staleness_ms() -> u64 {
    5_000
}

const fn default_confidence_threshold() -> f64 {
    0.5
}

const fn default_observer_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let config = ControlConfig::default();
        assert_eq!(config.simulation.port, 8813);
        assert_eq!(config.simulation.step_interval_ms, 1_000);
        assert_eq!(config.policy.switch_margin, 3);
        assert_eq!(config.policy.pedestrian_threshold, 5);
        assert_eq!(config.detection.staleness_ms, 5_000);
        assert_eq!(config.infrastructure.observer_port, 8080);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = r"
simulation:
  host: sim.internal
  port: 9001
policy:
  switch_margin: 5
";
        let config = ControlConfig::parse(yaml).unwrap();
        assert_eq!(config.simulation.host, "sim.internal");
        assert_eq!(config.simulation.port, 9001);
        // Untouched fields keep their defaults.
        assert_eq!(config.simulation.scenario, "traffic.sumocfg");
        assert_eq!(config.policy.switch_margin, 5);
        assert_eq!(config.policy.pedestrian_threshold, 5);
    }

    #[test]
    fn empty_yaml_is_all_defaults() {
        let config = ControlConfig::parse("{}").unwrap();
        assert_eq!(config, ControlConfig::default());
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let result = ControlConfig::parse("simulation: [not, a, map]");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
