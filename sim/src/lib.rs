//! Kinematic fleet world: waypoint-following vehicles with battery drain,
//! charging at base, crash on depletion, and fault injection hooks. Feeds
//! telemetry into the controller and consumes its task-list commands; no
//! flight dynamics.

use std::collections::BTreeMap;

use log::info;

use refleet_structs::report::{CommandMsg, TelemetryMsg};
use refleet_structs::vehicle::Health;
use refleet_structs::{Point, TaskId, VehicleId};

pub struct SimVehicle {
    pub id: VehicleId,
    pub home: Point,
    pub pos: Point,
    pub velocity: f32,
    pub energy: f32,
    /// Battery fraction per second while traveling / while hovering.
    pub drain_travel: f32,
    pub drain_hover: f32,
    /// Battery fraction per second recovered on the ground at home.
    pub charge_rate: f32,
    pub payload: f32,
    pub max_payload: f32,
    pub health: Health,
    pub route: Vec<(TaskId, Point)>,
    pub progress: BTreeMap<u32, f32>,
    pub link_up: bool,
    /// Fault injection: multiplies the drain rates.
    pub drain_factor: f32,
}

impl SimVehicle {
    pub fn new(id: VehicleId, pos: Point) -> SimVehicle {
        SimVehicle {
            id,
            home: pos,
            pos,
            velocity: 12.0,
            energy: 1.0,
            drain_travel: 0.0011,
            drain_hover: 0.00037,
            charge_rate: 0.01,
            payload: 0.0,
            max_payload: 2.5,
            health: Health::Healthy,
            route: Vec::new(),
            progress: BTreeMap::new(),
            link_up: true,
            drain_factor: 1.0,
        }
    }
}

/// Below this charge fraction a vehicle landing at base drops into the
/// charging state; it recovers to healthy only once full.
const CHARGE_ENTRY: f32 = 0.3;

/// Move `pos` toward `target`, spending from the step's remaining travel
/// distance. Returns true when the target was reached with travel to spare.
fn advance(pos: &mut Point, target: Point, travel: &mut f32) -> bool {
    let dist = pos.dist(&target);
    if dist <= *travel {
        *travel -= dist;
        *pos = target;
        true
    } else {
        *pos = pos.lerp(&target, *travel / dist);
        *travel = 0.0;
        false
    }
}

pub struct World {
    pub t: f32,
    pub vehicles: Vec<SimVehicle>,
}

impl World {
    pub fn new(vehicles: Vec<SimVehicle>) -> World {
        World { t: 0.0, vehicles }
    }

    /// Five vehicles in the standard survey cluster, stacked by altitude,
    /// each at 80% charge.
    pub fn surveillance_grid() -> World {
        let positions = [
            (0.0, 0.0),
            (20.0, 0.0),
            (40.0, 0.0),
            (0.0, 20.0),
            (20.0, 20.0),
        ];
        let vehicles = positions
            .iter()
            .enumerate()
            .map(|(i, (x, y))| {
                let mut v = SimVehicle::new(
                    VehicleId(i as u32 + 1),
                    Point::new(*x, *y, 25.0 + 20.0 * i as f32),
                );
                v.energy = 0.8;
                v
            })
            .collect();
        World::new(vehicles)
    }

    /// Three couriers already carrying 1.8 kg of a 2.5 kg budget.
    pub fn delivery_trio() -> World {
        let vehicles = (0..3)
            .map(|i| {
                let mut v = SimVehicle::new(
                    VehicleId(i + 1),
                    Point::new(100.0 + 200.0 * i as f32, 100.0, 30.0),
                );
                v.payload = 1.8;
                v
            })
            .collect();
        World::new(vehicles)
    }

    fn vehicle_mut(&mut self, id: VehicleId) -> Option<&mut SimVehicle> {
        self.vehicles.iter_mut().find(|v| v.id == id)
    }

    pub fn apply_command(&mut self, cmd: &CommandMsg) {
        if let Some(v) = self.vehicle_mut(cmd.vehicle_id) {
            v.route = cmd
                .tasks
                .iter()
                .flat_map(|t| t.waypoints.iter().map(move |wp| (t.task_id, Point::from(*wp))))
                .collect();
            info!("vehicle {} new task list of {}", cmd.vehicle_id.0, cmd.tasks.len());
        }
    }

    pub fn cut_link(&mut self, id: VehicleId) {
        if let Some(v) = self.vehicle_mut(id) {
            v.link_up = false;
        }
    }

    pub fn inject_discharge_anomaly(&mut self, id: VehicleId, factor: f32) {
        if let Some(v) = self.vehicle_mut(id) {
            v.drain_factor = factor;
        }
    }

    pub fn teleport(&mut self, id: VehicleId, pos: Point) {
        if let Some(v) = self.vehicle_mut(id) {
            v.pos = pos;
        }
    }

    /// Advance the world and emit one telemetry record per vehicle with a
    /// live link.
    pub fn simulate(&mut self, dt: f32) -> Vec<TelemetryMsg> {
        self.t += dt;
        let mut out = Vec::new();

        for v in self.vehicles.iter_mut() {
            if v.health == Health::Crashed {
                continue;
            }

            let mut travel = dt * v.velocity;
            let mut traveling = false;
            while let Some((task, wp)) = v.route.first().copied() {
                traveling = true;
                if advance(&mut v.pos, wp, &mut travel) {
                    v.progress.insert(task.0, 1.0);
                    v.route.remove(0);
                } else {
                    v.progress.entry(task.0).or_insert(0.1);
                    break;
                }
            }
            // task list done: head back to base
            if v.route.is_empty() && !v.pos.eq_xyz(&v.home) && travel > 0.0 {
                traveling = true;
                advance(&mut v.pos, v.home, &mut travel);
            }

            let landed = v.route.is_empty() && v.pos.eq_xyz(&v.home);
            if landed {
                v.energy = (v.energy + v.charge_rate * dt).min(1.0);
                if v.energy >= 1.0 {
                    if v.health == Health::Charging {
                        v.health = Health::Healthy;
                        info!("vehicle {} fully charged", v.id.0);
                    }
                } else if v.health == Health::Healthy && v.energy < CHARGE_ENTRY {
                    v.health = Health::Charging;
                    info!("vehicle {} charging at base", v.id.0);
                }
            } else {
                let rate = if traveling { v.drain_travel } else { v.drain_hover };
                v.energy -= rate * v.drain_factor * dt;
                if v.energy <= 0.0 {
                    v.energy = 0.0;
                    v.health = Health::Crashed;
                    info!("vehicle {} battery depleted, crashed", v.id.0);
                }
            }

            if v.link_up {
                out.push(TelemetryMsg {
                    vehicle_id: v.id,
                    t: self.t,
                    pos: v.pos.into(),
                    vel: [0.0, 0.0, 0.0],
                    energy: Some(v.energy),
                    payload: Some(v.payload),
                    health: Some(v.health),
                    task_progress: v.progress.clone(),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drained_vehicle_returns_charges_and_recovers() {
        let mut v = SimVehicle::new(VehicleId(1), Point::new(0.0, 0.0, 30.0));
        v.pos = Point::new(120.0, 0.0, 30.0);
        v.energy = 0.2;
        let mut world = World::new(vec![v]);

        // empty task list: flies the 120 m back to base and starts charging
        for _ in 0..30 {
            world.simulate(1.0);
        }
        let v = &world.vehicles[0];
        assert!(v.pos.eq_xyz(&v.home));
        assert_eq!(v.health, Health::Charging);
        assert!(v.energy < 1.0);

        // recovers to healthy only once fully charged
        for _ in 0..120 {
            world.simulate(1.0);
        }
        let v = &world.vehicles[0];
        assert_eq!(v.health, Health::Healthy);
        assert!(v.energy >= 1.0);
    }

    #[test]
    fn depleted_vehicle_crashes_and_goes_silent() {
        let mut v = SimVehicle::new(VehicleId(1), Point::new(0.0, 0.0, 30.0));
        v.pos = Point::new(5000.0, 0.0, 30.0);
        v.energy = 0.001;
        v.route = vec![(TaskId(1), Point::new(6000.0, 0.0, 30.0))];
        let mut world = World::new(vec![v]);

        for _ in 0..10 {
            world.simulate(1.0);
        }
        assert_eq!(world.vehicles[0].health, Health::Crashed);
        assert!(world.simulate(1.0).is_empty(), "crashed vehicles stop reporting");
    }
}
