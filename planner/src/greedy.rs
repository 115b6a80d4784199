//! Priority-ordered greedy seed. Tasks are taken in (priority desc,
//! deadline asc, payload asc) order and placed on the cheapest feasible
//! vehicle under the mission objective; tasks with no feasible candidate
//! are escalated with the per-vehicle rejection reasons kept for the
//! operator rationale.

use std::cmp::Ordering;

use log::debug;

use refleet_structs::config::{Config, MissionKind};
use refleet_structs::mission::{Task, TaskKind};
use refleet_structs::plan::Plan;
use refleet_structs::snapshot::FleetSnapshot;
use refleet_structs::{TaskId, VehicleId};

use crate::constraints::{can_assign, Infeasibility, TaskTable};
use crate::objective::plan_cost;

#[derive(Clone, Debug)]
pub struct EscalationReport {
    pub task: TaskId,
    pub rejections: Vec<(VehicleId, Infeasibility)>,
}

fn cmp_deadline(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn seed_order<'t>(orphans: &[TaskId], tasks: &'t TaskTable) -> Vec<&'t Task> {
    let mut order: Vec<&Task> = orphans.iter().filter_map(|id| tasks.get(id)).collect();
    order.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(cmp_deadline(a.deadline, b.deadline))
            .then(a.payload_req.partial_cmp(&b.payload_req).unwrap_or(Ordering::Equal))
            .then(a.id.cmp(&b.id))
    });
    order
}

fn push_with_pair(plan: &mut Plan, vehicle: VehicleId, task: &Task, tasks: &TaskTable) {
    plan.push_task(vehicle, task.id);
    if task.kind == TaskKind::Pickup {
        if let Some(pair) = task.paired_with.filter(|id| tasks.contains_key(id)) {
            plan.push_task(vehicle, pair);
        }
    }
}

pub fn greedy_seed(
    snapshot: &FleetSnapshot,
    orphans: &[TaskId],
    tasks: &TaskTable,
    cfg: &Config,
    kind: MissionKind,
    now: f32,
) -> (Plan, Vec<EscalationReport>) {
    let weights = cfg.weights_for(kind);
    let mut plan = Plan::from_snapshot(snapshot);
    let mut reports = Vec::new();
    let orphan_set: std::collections::BTreeSet<TaskId> = orphans.iter().copied().collect();

    for task in seed_order(orphans, tasks) {
        // a dropoff orphaned together with its pickup rides along with it;
        // one orphaned alone is placed like any other task
        if task.kind == TaskKind::Dropoff
            && task.paired_with.map_or(false, |p| orphan_set.contains(&p))
        {
            continue;
        }

        let base_cost = plan_cost(&plan, snapshot, tasks, weights, cfg, now);
        let mut best: Option<(f32, VehicleId)> = None;
        let mut rejections = Vec::new();

        for vehicle in snapshot.vehicles.values() {
            match can_assign(vehicle, task, &plan, snapshot, tasks, cfg, now) {
                Ok(()) => {
                    let mut candidate = plan.clone();
                    push_with_pair(&mut candidate, vehicle.id, task, tasks);
                    let marginal =
                        plan_cost(&candidate, snapshot, tasks, weights, cfg, now) - base_cost;
                    // ties break on ascending vehicle id
                    let better = match best {
                        None => true,
                        Some((cost, _)) => marginal < cost,
                    };
                    if better {
                        best = Some((marginal, vehicle.id));
                    }
                }
                Err(reason) => rejections.push((vehicle.id, reason)),
            }
        }

        match best {
            Some((marginal, vehicle)) => {
                debug!(
                    "greedy: task {} -> vehicle {} (marginal {:.3})",
                    task.id.0, vehicle.0, marginal
                );
                push_with_pair(&mut plan, vehicle, task, tasks);
            }
            None => {
                debug!("greedy: task {} escalated ({} rejections)", task.id.0, rejections.len());
                plan.escalated.push(task.id);
                let pair = task
                    .paired_with
                    .filter(|p| task.kind == TaskKind::Pickup && orphan_set.contains(p));
                if let Some(pair) = pair {
                    plan.escalated.push(pair);
                }
                reports.push(EscalationReport { task: task.id, rejections });
            }
        }
    }

    (plan, reports)
}
