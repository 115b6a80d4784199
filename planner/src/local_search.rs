//! Bounded local-search refinement of a seeded plan. First-improvement
//! acceptance over random swap and relocate moves, stopping on iteration
//! cap, stall cap, or the wall-clock budget. The RNG seed is derived from
//! the snapshot generation so identical inputs walk identical move
//! sequences.

use std::time::Instant;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use refleet_structs::config::{Config, MissionKind};
use refleet_structs::plan::Plan;
use refleet_structs::snapshot::FleetSnapshot;
use refleet_structs::VehicleId;

use crate::constraints::{validate_plan, TaskTable};
use crate::objective::plan_cost;

#[derive(Clone, Copy, Debug, Default)]
pub struct SearchStats {
    pub iterations: u32,
    pub improvement: f32,
    pub time_bounded: bool,
}

pub fn improve(
    mut plan: Plan,
    snapshot: &FleetSnapshot,
    tasks: &TaskTable,
    cfg: &Config,
    kind: MissionKind,
    now: f32,
    seed: u64,
) -> (Plan, f32, SearchStats) {
    #[cfg(feature = "prof")]
    let _p = hprof::enter("local_search");

    let weights = cfg.weights_for(kind);
    let mut score = plan_cost(&plan, snapshot, tasks, weights, cfg, now);
    let seed_score = score;
    let mut rng = StdRng::seed_from_u64(seed);
    let started = Instant::now();
    let mut stats = SearchStats::default();
    let mut stall = 0u32;

    let vehicles: Vec<VehicleId> = plan.assignments.keys().copied().collect();

    while stats.iterations < cfg.max_iterations && stall < cfg.max_stall_iterations {
        if started.elapsed().as_secs_f32() * 1000.0 > cfg.optimization_budget_ms {
            stats.time_bounded = true;
            break;
        }
        stats.iterations += 1;

        // delivery legs stay where the seed put them so pickup and dropoff
        // remain contiguous
        let movable: Vec<_> = plan
            .entries()
            .into_iter()
            .filter(|(_, _, t)| tasks.get(t).map_or(false, |t| t.paired_with.is_none()))
            .collect();
        if movable.is_empty() || vehicles.len() < 2 {
            break;
        }

        let mut candidate = plan.clone();
        let try_swap = movable.len() >= 2 && rng.gen_bool(0.5);
        if try_swap {
            let (_, _, a) = movable[rng.gen_range(0..movable.len())];
            let (_, _, b) = movable[rng.gen_range(0..movable.len())];
            if a == b {
                stall += 1;
                continue;
            }
            candidate.swap_tasks(a, b);
        } else {
            let (from, _, task) = movable[rng.gen_range(0..movable.len())];
            let target = vehicles[rng.gen_range(0..vehicles.len())];
            if target == from {
                stall += 1;
                continue;
            }
            candidate.remove_task(task);
            candidate.push_task(target, task);
        }

        if !validate_plan(snapshot, &candidate, tasks, cfg, now).is_empty() {
            stall += 1;
            continue;
        }
        let candidate_score = plan_cost(&candidate, snapshot, tasks, weights, cfg, now);
        if candidate_score < score {
            debug!(
                "local search: accepted move, {:.4} -> {:.4} (iter {})",
                score, candidate_score, stats.iterations
            );
            plan = candidate;
            score = candidate_score;
            stall = 0;
        } else {
            stall += 1;
        }
    }

    stats.improvement = seed_score - score;
    (plan, score, stats)
}
