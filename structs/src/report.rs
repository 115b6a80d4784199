use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::mission::TaskKind;
use crate::vehicle::Health;
use crate::{TaskId, VehicleId};

/// Per-vehicle telemetry record as it appears on the wire. Unknown JSON
/// fields are ignored; optional fields that are absent keep the last-known
/// value on ingest.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct TelemetryMsg {
    pub vehicle_id: VehicleId,
    pub t: f32,
    pub pos: [f32; 3],
    pub vel: [f32; 3],
    pub energy: Option<f32>,
    #[serde(default)]
    pub payload: Option<f32>,
    #[serde(default)]
    pub health: Option<Health>,
    #[serde(default)]
    pub task_progress: BTreeMap<u32, f32>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandOp {
    SetTaskList,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CommandTask {
    pub task_id: TaskId,
    pub waypoints: Vec<[f32; 3]>,
    pub kind: TaskKind,
}

/// Outbound command to one vehicle. Receipt is not acknowledged; the next
/// telemetry sample confirms uptake.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct CommandMsg {
    pub vehicle_id: VehicleId,
    pub op: CommandOp,
    pub tasks: Vec<CommandTask>,
}

#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
pub enum Strategy {
    #[serde(rename = "no-op")]
    NoOp,
    #[serde(rename = "full_reallocation")]
    FullReallocation,
    #[serde(rename = "error")]
    Error,
}

#[derive(Clone, Copy, Serialize, Debug, Default)]
pub struct PhaseTimings {
    pub observe: f32,
    pub orient: f32,
    pub decide: f32,
    pub act: f32,
}

/// Structured metrics record attached to every decision event.
/// `coverage_loss` is priority-weighted: escalated priority mass over the
/// priority mass of all non-completed tasks.
#[derive(Clone, Copy, Serialize, Debug, Default)]
pub struct CycleMetrics {
    pub recovery_rate: f32,
    pub tasks_recovered: u32,
    pub tasks_lost: u32,
    pub unallocated_count: u32,
    pub coverage_loss: f32,
    pub battery_spare: f32,
    pub payload_spare: f32,
    pub operational_uavs: u32,
    pub failed_uavs: u32,
    pub temporal_margin: f32,
    pub affected_zones: u32,
    pub objective_score: f32,
    pub optimization_time_ms: f32,
    pub optimization_iterations: u32,
    pub optimality_gap_estimate: f32,
    pub gap_time_bounded: bool,
}

/// One record per OODA cycle, emitted on the operator event channel.
#[derive(Clone, Serialize, Debug)]
pub struct DecisionEvent {
    pub cycle: u64,
    pub strategy: Strategy,
    pub rationale: String,
    pub phase_timings_ms: PhaseTimings,
    pub metrics: CycleMetrics,
    pub assignments: BTreeMap<u32, Vec<TaskId>>,
    pub escalated: Vec<TaskId>,
}
