use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{Point, TaskId, VehicleId};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Degraded,
    Failed,
    Charging,
    AwaitingPermission,
    Crashed,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    LinkTimeout,
    DischargeAnomaly,
    PositionJump,
    AltitudeEnvelope,
    /// The vehicle itself reported a failed or crashed health state.
    Reported,
}

impl FailureCause {
    pub fn label(&self) -> &'static str {
        match self {
            FailureCause::LinkTimeout => "link-timeout",
            FailureCause::DischargeAnomaly => "discharge-anomaly",
            FailureCause::PositionJump => "position-jump",
            FailureCause::AltitudeEnvelope => "altitude-envelope",
            FailureCause::Reported => "reported",
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct VehicleState {
    pub id: VehicleId,
    pub pos: Point,
    pub vel: Point,
    /// Remaining energy as a fraction of capacity, in [0, 1].
    pub energy: f32,
    /// Absolute capacity in energy units.
    pub energy_capacity: f32,
    pub payload: f32,
    pub max_payload: f32,
    pub operational: bool,
    pub health: Health,
    pub last_contact: f32,
    /// Ordered task ids committed to this vehicle. This list is the
    /// authoritative ownership record; tasks hold only an id back-reference.
    pub committed: Vec<TaskId>,
    /// Per-task grants authorizing flight outside the operating region.
    pub boundary_permits: BTreeSet<TaskId>,
    /// Meters of travel distance per energy unit.
    pub efficiency: f32,
    /// Exponential moving average of the discharge rate, fraction/s.
    pub discharge_ema: f32,
    /// Distance between the two most recent position samples.
    pub last_step: f32,
    /// Consecutive samples with altitude outside the configured envelope.
    pub alt_streak: u32,
    /// Latest reported per-task completion fractions.
    pub task_progress: BTreeMap<u32, f32>,
    pub failure: Option<FailureCause>,
}

impl VehicleState {
    pub fn new(id: VehicleId, pos: Point) -> VehicleState {
        VehicleState {
            id,
            pos,
            vel: Point::default(),
            energy: 1.0,
            energy_capacity: 100.0,
            payload: 0.0,
            max_payload: 2.5,
            operational: true,
            health: Health::Healthy,
            last_contact: 0.0,
            committed: Vec::new(),
            boundary_permits: BTreeSet::new(),
            efficiency: 150.0,
            discharge_ema: 0.0,
            last_step: 0.0,
            alt_streak: 0,
            task_progress: BTreeMap::new(),
            failure: None,
        }
    }

    /// Whether this vehicle may receive new task assignments. Charging
    /// vehicles qualify only once fully charged.
    pub fn accepts_tasks(&self) -> bool {
        self.operational
            && match self.health {
                Health::Healthy | Health::Degraded => true,
                Health::Charging => self.energy >= 0.999,
                Health::Failed | Health::AwaitingPermission | Health::Crashed => false,
            }
    }

    pub fn energy_units(&self) -> f32 {
        self.energy * self.energy_capacity
    }
}
