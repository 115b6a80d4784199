use serde::{Deserialize, Serialize};

pub mod config;
pub mod mission;
pub mod plan;
pub mod report;
pub mod snapshot;
pub mod vehicle;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct VehicleId(pub u32);

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskId(pub u32);

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ZoneId(pub u32);

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32, z: f32) -> Point {
        Point { x, y, z }
    }

    pub fn dist_xy(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn dist(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Travel distance for the energy model: horizontal distance plus
    /// absolute altitude change (tunable approximation, see config).
    pub fn travel_dist(&self, other: &Point) -> f32 {
        self.dist_xy(other) + (self.z - other.z).abs()
    }

    /// Point at fraction `s` of the way toward `other`.
    pub fn lerp(&self, other: &Point, s: f32) -> Point {
        Point {
            x: self.x + (other.x - self.x) * s,
            y: self.y + (other.y - self.y) * s,
            z: self.z + (other.z - self.z) * s,
        }
    }

    pub fn eq_xyz(&self, other: &Point) -> bool {
        self.dist(other) < 1e-3
    }
}

impl From<[f32; 3]> for Point {
    fn from(p: [f32; 3]) -> Point {
        Point { x: p[0], y: p[1], z: p[2] }
    }
}

impl From<Point> for [f32; 3] {
    fn from(p: Point) -> [f32; 3] {
        [p.x, p.y, p.z]
    }
}

/// Axis-aligned operating region. Points exactly on the boundary count as
/// inside; only strictly-outside positions need a boundary permit.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Region {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl Region {
    pub fn contains(&self, p: &Point) -> bool {
        self.x_min <= p.x && p.x <= self.x_max && self.y_min <= p.y && p.y <= self.y_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::report::{CommandMsg, TelemetryMsg};

    #[test]
    fn region_boundary_is_inclusive() {
        let r = Region { x_min: 0.0, x_max: 3000.0, y_min: 0.0, y_max: 2000.0 };
        assert!(r.contains(&Point::new(3000.0, 2000.0, 50.0)));
        assert!(r.contains(&Point::new(0.0, 0.0, 0.0)));
        assert!(!r.contains(&Point::new(3000.1, 2000.0, 50.0)));
        assert!(!r.contains(&Point::new(-0.1, 100.0, 50.0)));
    }

    #[test]
    fn telemetry_ignores_unknown_fields_and_merges_optionals() {
        let json = r#"{
            "vehicle_id": 7, "t": 12.5,
            "pos": [1.0, 2.0, 30.0], "vel": [0.1, 0.0, 0.0],
            "energy": 0.75,
            "task_progress": {"4": 0.5},
            "some_future_field": {"ignored": true}
        }"#;
        let msg: TelemetryMsg = serde_json::from_str(json).unwrap();
        assert_eq!(msg.vehicle_id, VehicleId(7));
        assert_eq!(msg.energy, Some(0.75));
        assert_eq!(msg.payload, None);
        assert_eq!(msg.health, None);
        assert_eq!(msg.task_progress.get(&4), Some(&0.5));
    }

    #[test]
    fn command_round_trips_through_json() {
        use crate::mission::TaskKind;
        use crate::report::{CommandOp, CommandTask};
        let cmd = CommandMsg {
            vehicle_id: VehicleId(2),
            op: CommandOp::SetTaskList,
            tasks: vec![CommandTask {
                task_id: TaskId(9),
                waypoints: vec![[100.0, 200.0, 30.0]],
                kind: TaskKind::PatrolZone,
            }],
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"set_task_list\""));
        assert!(json.contains("\"patrol\""));
        let back: CommandMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(back.vehicle_id, cmd.vehicle_id);
        assert_eq!(back.tasks[0].task_id, TaskId(9));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn bad_config_refuses_to_run() {
        let mut cfg = Config::default();
        cfg.safety_reserve_fraction = 1.2;
        assert!(cfg.validate().is_err());
        let mut cfg = Config::default();
        cfg.telemetry_period_ms = 0.0;
        assert!(cfg.validate().is_err());
    }
}
