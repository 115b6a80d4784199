//! Weighted objective for the reallocation optimizer. Lower is better:
//! travel energy and load imbalance cost, covered priority and deadline
//! slack reward. Weight vectors are selected by mission type.

use refleet_structs::config::{Config, ObjectiveWeights};
use refleet_structs::plan::Plan;
use refleet_structs::snapshot::FleetSnapshot;

use crate::constraints::{route_energy, TaskTable};

fn variance(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return 0.0;
    }
    let mean = xs.iter().sum::<f32>() / xs.len() as f32;
    xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / xs.len() as f32
}

pub fn plan_cost(
    plan: &Plan,
    snapshot: &FleetSnapshot,
    tasks: &TaskTable,
    weights: &ObjectiveWeights,
    cfg: &Config,
    now: f32,
) -> f32 {
    let mut travel = 0.0f32;
    let mut load_fracs = Vec::with_capacity(plan.assignments.len());
    let mut priority = 0.0f32;
    let mut slack = 0.0f32;

    for (vid, list) in plan.assignments.iter() {
        let vehicle = match snapshot.get(*vid) {
            Some(v) => v,
            None => continue,
        };
        let seq: Vec<_> = list.iter().filter_map(|id| tasks.get(id)).collect();

        let energy = route_energy(vehicle, &seq, cfg);
        travel += energy;
        load_fracs.push(energy / vehicle.energy_capacity.max(1e-6));

        let mut t = now;
        let mut pos = vehicle.pos;
        for task in seq {
            priority += task.priority as f32;
            t += pos.dist(&task.pos) / cfg.cruise_speed;
            t += task.duration;
            if let Some(deadline) = task.deadline {
                slack += deadline - t;
            }
            pos = task.pos;
        }
    }

    weights.travel_energy * travel + weights.load_balance * variance(&load_fracs)
        - weights.priority * priority
        - weights.temporal_slack * slack
}
