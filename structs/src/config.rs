use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Point, Region};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissionKind {
    Surveillance,
    Search,
    Delivery,
}

/// Weights for the optimizer objective. Travel energy and load imbalance
/// are costs; priority coverage and deadline slack are rewards.
#[derive(Clone, Copy, Serialize, Deserialize, Debug)]
pub struct ObjectiveWeights {
    pub travel_energy: f32,
    pub load_balance: f32,
    pub priority: f32,
    pub temporal_slack: f32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("telemetry period must be positive, got {0} ms")]
    NonPositivePeriod(f32),
    #[error("timeout threshold must be positive, got {0} ms")]
    NonPositiveTimeout(f32),
    #[error("safety reserve fraction must be in [0, 1), got {0}")]
    InvalidReserve(f32),
    #[error("anomaly multiplier must be >= 1, got {0}")]
    InvalidAnomalyMultiplier(f32),
    #[error("operating region is empty")]
    EmptyRegion,
    #[error("altitude bounds inverted: min {0} > max {1}")]
    InvalidAltitudeBounds(f32, f32),
    #[error("cruise speed must be positive, got {0}")]
    NonPositiveSpeed(f32),
    #[error("optimization budget must be positive, got {0} ms")]
    NonPositiveBudget(f32),
}

/// Immutable engine configuration, validated once at startup and freely
/// shared afterwards. Times are seconds on the mission clock unless the
/// field name says milliseconds.
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    pub telemetry_period_ms: f32,
    pub timeout_threshold_ms: f32,
    /// Discharge-anomaly trigger: EMA rate above this multiple of baseline.
    pub anomaly_multiplier: f32,
    /// Expected cruise discharge rate, energy-fraction per second.
    pub baseline_discharge: f32,
    pub position_jump_threshold_m: f32,
    pub altitude_bounds_m: (f32, f32),
    pub safety_reserve_fraction: f32,
    pub collision_buffer_m: f32,
    pub optimization_budget_ms: f32,
    pub max_iterations: u32,
    pub max_stall_iterations: u32,
    pub cycle_budget_ms: f32,
    pub cruise_speed: f32,
    /// Extra energy charged per second of on-site task duration. Zero keeps
    /// the altitude-fold travel model as the only vertical cost.
    pub hover_energy_rate: f32,
    pub region: Region,
    /// Return-to-base point used by the energy reserve estimate.
    pub base: Point,
    pub command_queue_cap: usize,
    pub event_queue_cap: usize,
    pub surveillance_weights: ObjectiveWeights,
    pub search_weights: ObjectiveWeights,
    pub delivery_weights: ObjectiveWeights,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            telemetry_period_ms: 500.0,
            timeout_threshold_ms: 1500.0,
            anomaly_multiplier: 1.5,
            baseline_discharge: 0.0011,
            position_jump_threshold_m: 100.0,
            altitude_bounds_m: (5.0, 120.0),
            safety_reserve_fraction: 0.2,
            collision_buffer_m: 15.0,
            optimization_budget_ms: 100.0,
            max_iterations: 50,
            max_stall_iterations: 10,
            cycle_budget_ms: 6000.0,
            cruise_speed: 12.0,
            hover_energy_rate: 0.0,
            region: Region { x_min: 0.0, x_max: 3000.0, y_min: 0.0, y_max: 2000.0 },
            base: Point { x: 0.0, y: 0.0, z: 0.0 },
            command_queue_cap: 64,
            event_queue_cap: 256,
            surveillance_weights: ObjectiveWeights {
                travel_energy: 1.0,
                load_balance: 0.5,
                priority: 0.02,
                temporal_slack: 0.1,
            },
            search_weights: ObjectiveWeights {
                travel_energy: 0.5,
                load_balance: 0.2,
                priority: 0.03,
                temporal_slack: 0.5,
            },
            delivery_weights: ObjectiveWeights {
                travel_energy: 0.8,
                load_balance: 0.3,
                priority: 0.04,
                temporal_slack: 0.2,
            },
        }
    }
}

impl Config {
    pub fn weights_for(&self, kind: MissionKind) -> &ObjectiveWeights {
        match kind {
            MissionKind::Surveillance => &self.surveillance_weights,
            MissionKind::Search => &self.search_weights,
            MissionKind::Delivery => &self.delivery_weights,
        }
    }

    pub fn timeout_threshold_s(&self) -> f32 {
        self.timeout_threshold_ms / 1000.0
    }

    pub fn telemetry_period_s(&self) -> f32 {
        self.telemetry_period_ms / 1000.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry_period_ms <= 0.0 {
            return Err(ConfigError::NonPositivePeriod(self.telemetry_period_ms));
        }
        if self.timeout_threshold_ms <= 0.0 {
            return Err(ConfigError::NonPositiveTimeout(self.timeout_threshold_ms));
        }
        if !(0.0..1.0).contains(&self.safety_reserve_fraction) {
            return Err(ConfigError::InvalidReserve(self.safety_reserve_fraction));
        }
        if self.anomaly_multiplier < 1.0 {
            return Err(ConfigError::InvalidAnomalyMultiplier(self.anomaly_multiplier));
        }
        if self.region.x_min >= self.region.x_max || self.region.y_min >= self.region.y_max {
            return Err(ConfigError::EmptyRegion);
        }
        let (alt_min, alt_max) = self.altitude_bounds_m;
        if alt_min > alt_max {
            return Err(ConfigError::InvalidAltitudeBounds(alt_min, alt_max));
        }
        if self.cruise_speed <= 0.0 {
            return Err(ConfigError::NonPositiveSpeed(self.cruise_speed));
        }
        if self.optimization_budget_ms <= 0.0 {
            return Err(ConfigError::NonPositiveBudget(self.optimization_budget_ms));
        }
        Ok(())
    }
}
