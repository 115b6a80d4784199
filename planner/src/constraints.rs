//! Feasibility oracle for (vehicle, task, fleet context) triples. Pure
//! functions, no hidden state; infeasibility is a value, never a panic.
//! Checks run in a fixed order and `can_assign` short-circuits on the first
//! failure, while `validate_plan` collects everything.

use std::collections::BTreeMap;
use std::fmt;

use tinyvec::TinyVec;

use refleet_structs::config::Config;
use refleet_structs::mission::{Task, TaskKind};
use refleet_structs::plan::Plan;
use refleet_structs::snapshot::FleetSnapshot;
use refleet_structs::vehicle::VehicleState;
use refleet_structs::{Point, TaskId, VehicleId};

pub type TaskTable = BTreeMap<TaskId, Task>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Infeasibility {
    NotOperational,
    PayloadExceeded { excess: f32 },
    InsufficientEnergy { deficit: f32 },
    OutsideRegionNoPermission,
    CollisionWith { other: VehicleId, clearance: f32 },
    DeadlineMissed { late_by: f32 },
}

impl Infeasibility {
    pub fn tag(&self) -> &'static str {
        match self {
            Infeasibility::NotOperational => "not-operational",
            Infeasibility::PayloadExceeded { .. } => "payload-exceeded",
            Infeasibility::InsufficientEnergy { .. } => "insufficient-energy",
            Infeasibility::OutsideRegionNoPermission => "outside-region-no-permission",
            Infeasibility::CollisionWith { .. } => "collision-with",
            Infeasibility::DeadlineMissed { .. } => "deadline-missed",
        }
    }
}

impl fmt::Display for Infeasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Infeasibility::NotOperational => write!(f, "not-operational"),
            Infeasibility::PayloadExceeded { excess } => {
                write!(f, "payload-exceeded (+{excess:.2} kg)")
            }
            Infeasibility::InsufficientEnergy { deficit } => {
                write!(f, "insufficient-energy (-{deficit:.2} units)")
            }
            Infeasibility::OutsideRegionNoPermission => write!(f, "outside-region-no-permission"),
            Infeasibility::CollisionWith { other, clearance } => {
                write!(f, "collision-with:{} ({clearance:.1} m)", other.0)
            }
            Infeasibility::DeadlineMissed { late_by } => {
                write!(f, "deadline-missed (+{late_by:.1} s)")
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Violation {
    pub vehicle: VehicleId,
    pub task: Option<TaskId>,
    pub reason: Infeasibility,
}

fn resolve<'t>(ids: &[TaskId], tasks: &'t TaskTable) -> Vec<&'t Task> {
    ids.iter().filter_map(|id| tasks.get(id)).collect()
}

/// The candidate and, for a pickup, its paired dropoff: both legs are
/// scheduled contiguously.
fn candidate_legs<'t>(task: &'t Task, tasks: &'t TaskTable) -> Vec<&'t Task> {
    let mut legs = vec![task];
    if task.kind == TaskKind::Pickup {
        if let Some(pair) = task.paired_with.and_then(|id| tasks.get(&id)) {
            legs.push(pair);
        }
    }
    legs
}

fn payload_peak(start: f32, seq: &[&Task]) -> f32 {
    let mut cur = start;
    let mut peak = cur;
    for t in seq {
        match t.kind {
            TaskKind::Pickup => {
                cur += t.payload_req;
                peak = peak.max(cur);
            }
            TaskKind::DeliveryPair => {
                // loads at the pickup point and releases on completion
                peak = peak.max(cur + t.payload_req);
            }
            TaskKind::Dropoff => {
                cur = (cur - t.payload_req).max(0.0);
            }
            TaskKind::PatrolZone | TaskKind::SearchZone => {}
        }
    }
    peak
}

/// Energy to fly the whole sequence from the vehicle's position and return
/// to base, in energy units.
pub fn route_energy(vehicle: &VehicleState, seq: &[&Task], cfg: &Config) -> f32 {
    let eff = vehicle.efficiency.max(1e-6);
    let mut cost = 0.0;
    let mut pos = vehicle.pos;
    for t in seq {
        cost += pos.travel_dist(&t.pos) / eff;
        cost += cfg.hover_energy_rate * t.duration;
        pos = t.pos;
    }
    cost + pos.travel_dist(&cfg.base) / eff
}

/// Estimated completion times for every task in the sequence, anchored at
/// `now`, using the planned cruise speed.
fn completion_times(vehicle: &VehicleState, seq: &[&Task], cfg: &Config, now: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(seq.len());
    let mut t = now;
    let mut pos = vehicle.pos;
    for task in seq {
        t += pos.dist(&task.pos) / cfg.cruise_speed;
        t += task.duration;
        out.push(t);
        pos = task.pos;
    }
    out
}

fn route_points(vehicle: &VehicleState, seq: &[&Task]) -> TinyVec<[Point; 8]> {
    let mut pts: TinyVec<[Point; 8]> = TinyVec::new();
    pts.push(vehicle.pos);
    for t in seq {
        pts.push(t.pos);
    }
    pts
}

fn dot(a: Point, b: Point) -> f32 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

fn sub(a: Point, b: Point) -> Point {
    Point { x: a.x - b.x, y: a.y - b.y, z: a.z - b.z }
}

/// Closest distance between segments p1-q1 and p2-q2. Degenerate segments
/// (single points) are handled.
fn seg_dist(p1: Point, q1: Point, p2: Point, q2: Point) -> f32 {
    const EPS: f32 = 1e-9;
    let d1 = sub(q1, p1);
    let d2 = sub(q2, p2);
    let r = sub(p1, p2);
    let a = dot(d1, d1);
    let e = dot(d2, d2);
    let f = dot(d2, r);

    let (s, t);
    if a <= EPS && e <= EPS {
        return p1.dist(&p2);
    }
    if a <= EPS {
        s = 0.0;
        t = (f / e).clamp(0.0, 1.0);
    } else {
        let c = dot(d1, r);
        if e <= EPS {
            t = 0.0;
            s = (-c / a).clamp(0.0, 1.0);
        } else {
            let b = dot(d1, d2);
            let denom = a * e - b * b;
            let mut s0 = if denom > EPS { ((b * f - c * e) / denom).clamp(0.0, 1.0) } else { 0.0 };
            let mut t0 = (b * s0 + f) / e;
            if t0 < 0.0 {
                t0 = 0.0;
                s0 = (-c / a).clamp(0.0, 1.0);
            } else if t0 > 1.0 {
                t0 = 1.0;
                s0 = ((b - c) / a).clamp(0.0, 1.0);
            }
            s = s0;
            t = t0;
        }
    }
    p1.lerp(&q1, s).dist(&p2.lerp(&q2, t))
}

/// Minimum clearance between two waypoint polylines, O(|a| * |b|).
fn min_clearance(a: &[Point], b: &[Point]) -> f32 {
    let mut best = f32::INFINITY;
    for i in 0..a.len().max(2) - 1 {
        let (p1, q1) = (a[i.min(a.len() - 1)], a[(i + 1).min(a.len() - 1)]);
        for j in 0..b.len().max(2) - 1 {
            let (p2, q2) = (b[j.min(b.len() - 1)], b[(j + 1).min(b.len() - 1)]);
            best = best.min(seg_dist(p1, q1, p2, q2));
        }
    }
    best
}

fn check_payload(vehicle: &VehicleState, seq: &[&Task]) -> Result<(), Infeasibility> {
    let peak = payload_peak(vehicle.payload, seq);
    if peak > vehicle.max_payload {
        return Err(Infeasibility::PayloadExceeded { excess: peak - vehicle.max_payload });
    }
    Ok(())
}

fn check_energy(vehicle: &VehicleState, seq: &[&Task], cfg: &Config) -> Result<(), Infeasibility> {
    let cost = route_energy(vehicle, seq, cfg);
    let reserve = cfg.safety_reserve_fraction * vehicle.energy_capacity;
    let remaining = vehicle.energy_units() - cost;
    // exactly at the reserve is accepted
    if remaining < reserve {
        return Err(Infeasibility::InsufficientEnergy { deficit: reserve - remaining });
    }
    Ok(())
}

fn check_boundary(vehicle: &VehicleState, task: &Task, cfg: &Config) -> Result<(), Infeasibility> {
    if cfg.region.contains(&task.pos) || vehicle.boundary_permits.contains(&task.id) {
        Ok(())
    } else {
        Err(Infeasibility::OutsideRegionNoPermission)
    }
}

fn check_deadlines(
    vehicle: &VehicleState,
    seq: &[&Task],
    cfg: &Config,
    now: f32,
) -> Result<(), Infeasibility> {
    let times = completion_times(vehicle, seq, cfg, now);
    for (task, done) in seq.iter().zip(times) {
        if let Some(deadline) = task.deadline {
            if done > deadline {
                return Err(Infeasibility::DeadlineMissed { late_by: done - deadline });
            }
        }
    }
    Ok(())
}

fn check_collision(
    vehicle: &VehicleState,
    seq: &[&Task],
    plan: &Plan,
    snapshot: &FleetSnapshot,
    tasks: &TaskTable,
    cfg: &Config,
) -> Result<(), Infeasibility> {
    let own = route_points(vehicle, seq);
    for (other_id, other_list) in plan.assignments.iter() {
        if *other_id == vehicle.id {
            continue;
        }
        let other = match snapshot.get(*other_id) {
            Some(v) => v,
            None => continue,
        };
        let other_route = route_points(other, &resolve(other_list, tasks));
        let clearance = min_clearance(&own, &other_route);
        if clearance < cfg.collision_buffer_m {
            return Err(Infeasibility::CollisionWith { other: *other_id, clearance });
        }
    }
    Ok(())
}

/// Feasibility of appending `task` (and its paired dropoff, if any) to the
/// vehicle's task list in `plan`. Checks run in order: operational, payload,
/// energy, boundary, collision, temporal; the first failure is returned.
pub fn can_assign(
    vehicle: &VehicleState,
    task: &Task,
    plan: &Plan,
    snapshot: &FleetSnapshot,
    tasks: &TaskTable,
    cfg: &Config,
    now: f32,
) -> Result<(), Infeasibility> {
    if !vehicle.accepts_tasks() {
        return Err(Infeasibility::NotOperational);
    }

    let mut seq = resolve(plan.tasks_of(vehicle.id), tasks);
    let legs = candidate_legs(task, tasks);
    seq.extend(legs.iter().copied());

    check_payload(vehicle, &seq)?;
    check_energy(vehicle, &seq, cfg)?;
    for leg in legs {
        check_boundary(vehicle, leg, cfg)?;
    }
    check_collision(vehicle, &seq, plan, snapshot, tasks, cfg)?;
    check_deadlines(vehicle, &seq, cfg, now)?;
    Ok(())
}

/// Check a whole plan atomically, collecting every violation instead of
/// short-circuiting. An empty result means the plan is feasible.
pub fn validate_plan(
    snapshot: &FleetSnapshot,
    plan: &Plan,
    tasks: &TaskTable,
    cfg: &Config,
    now: f32,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (vid, list) in plan.assignments.iter() {
        let vehicle = match snapshot.get(*vid) {
            Some(v) => v,
            None => continue,
        };
        let seq = resolve(list, tasks);

        if !list.is_empty() && !vehicle.accepts_tasks() {
            violations.push(Violation {
                vehicle: *vid,
                task: None,
                reason: Infeasibility::NotOperational,
            });
        }
        if let Err(reason) = check_payload(vehicle, &seq) {
            violations.push(Violation { vehicle: *vid, task: None, reason });
        }
        if let Err(reason) = check_energy(vehicle, &seq, cfg) {
            violations.push(Violation { vehicle: *vid, task: None, reason });
        }
        for task in seq.iter().copied() {
            if let Err(reason) = check_boundary(vehicle, task, cfg) {
                violations.push(Violation { vehicle: *vid, task: Some(task.id), reason });
            }
        }
        let times = completion_times(vehicle, &seq, cfg, now);
        for (task, done) in seq.iter().zip(times) {
            if let Some(deadline) = task.deadline {
                if done > deadline {
                    violations.push(Violation {
                        vehicle: *vid,
                        task: Some(task.id),
                        reason: Infeasibility::DeadlineMissed { late_by: done - deadline },
                    });
                }
            }
        }
    }

    // pairwise clearance over the whole plan
    let ids: Vec<VehicleId> = plan.assignments.keys().copied().collect();
    for (i, a) in ids.iter().enumerate() {
        for b in ids.iter().skip(i + 1) {
            let (va, vb) = match (snapshot.get(*a), snapshot.get(*b)) {
                (Some(va), Some(vb)) => (va, vb),
                _ => continue,
            };
            let ra = route_points(va, &resolve(plan.tasks_of(*a), tasks));
            let rb = route_points(vb, &resolve(plan.tasks_of(*b), tasks));
            let clearance = min_clearance(&ra, &rb);
            if clearance < cfg.collision_buffer_m {
                violations.push(Violation {
                    vehicle: *a,
                    task: None,
                    reason: Infeasibility::CollisionWith { other: *b, clearance },
                });
            }
        }
    }

    violations
}
