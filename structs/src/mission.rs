use serde::{Deserialize, Serialize};

use crate::{Point, TaskId, VehicleId, ZoneId};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum TaskKind {
    #[serde(rename = "patrol")]
    PatrolZone,
    #[serde(rename = "search")]
    SearchZone,
    #[serde(rename = "pickup")]
    Pickup,
    #[serde(rename = "dropoff")]
    Dropoff,
    #[serde(rename = "delivery")]
    DeliveryPair,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Unassigned,
    Assigned,
    InProgress,
    Completed,
    Orphaned,
    Escalated,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub pos: Point,
    /// Higher is more important.
    pub priority: i32,
    /// Estimated on-site execution time, seconds.
    pub duration: f32,
    /// Mass loaded or released by this task; zero for non-delivery kinds.
    pub payload_req: f32,
    /// Absolute deadline on the mission clock, if any.
    pub deadline: Option<f32>,
    pub zone: Option<ZoneId>,
    pub state: TaskState,
    /// Owner reference only; the committed list on the vehicle record is
    /// authoritative.
    pub assigned_to: Option<VehicleId>,
    /// For pickup/dropoff legs of a delivery, the opposite leg.
    pub paired_with: Option<TaskId>,
}

impl Task {
    pub fn new(id: TaskId, kind: TaskKind, pos: Point, priority: i32) -> Task {
        Task {
            id,
            kind,
            pos,
            priority,
            duration: 60.0,
            payload_req: 0.0,
            deadline: None,
            zone: None,
            state: TaskState::Unassigned,
            assigned_to: None,
            paired_with: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, TaskState::Completed)
    }
}
