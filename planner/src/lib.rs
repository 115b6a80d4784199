use std::time::Instant;

use log::info;

use refleet_structs::config::{Config, MissionKind};
use refleet_structs::plan::Plan;
use refleet_structs::snapshot::FleetSnapshot;
use refleet_structs::TaskId;

pub mod constraints;
pub mod greedy;
pub mod local_search;
pub mod objective;

pub use constraints::{can_assign, validate_plan, Infeasibility, TaskTable, Violation};
pub use greedy::EscalationReport;

#[derive(Clone, Copy, Debug, Default)]
pub struct OptStats {
    pub time_ms: f32,
    pub iterations: u32,
    /// Heuristic gap from optimal as a percentage; not a true bound.
    pub gap_estimate: f32,
    /// Set when the wall-clock budget cut the search short.
    pub time_bounded: bool,
}

#[derive(Clone, Debug)]
pub struct Outcome {
    pub plan: Plan,
    pub score: f32,
    pub stats: OptStats,
    pub escalations: Vec<EscalationReport>,
}

/// Estimate how much improvement the local search left on the table,
/// assuming it captures roughly 85% of what is reachable. Capped at 30%.
fn gap_estimate(seed_score: f32, final_score: f32) -> f32 {
    if seed_score.abs() < 1e-6 {
        return 0.0;
    }
    let improvement = (seed_score - final_score) / seed_score.abs() * 100.0;
    if improvement <= 0.0 {
        return 0.0;
    }
    (improvement * 0.15 / 0.85).clamp(0.0, 30.0)
}

/// Two-stage reallocation: greedy seed, then bounded local search. The
/// returned plan is feasible by construction (every accepted move passed the
/// validator) and deterministic for identical inputs.
pub fn optimize(
    snapshot: &FleetSnapshot,
    orphans: &[TaskId],
    tasks: &TaskTable,
    cfg: &Config,
    kind: MissionKind,
    now: f32,
    seed: u64,
) -> Outcome {
    #[cfg(feature = "prof")]
    let _p = hprof::enter("optimize");
    let started = Instant::now();
    let weights = cfg.weights_for(kind);

    if orphans.is_empty() {
        let plan = Plan::from_snapshot(snapshot);
        let score = objective::plan_cost(&plan, snapshot, tasks, weights, cfg, now);
        return Outcome {
            plan,
            score,
            stats: OptStats { time_ms: started.elapsed().as_secs_f32() * 1000.0, ..Default::default() },
            escalations: Vec::new(),
        };
    }

    if snapshot.operational().next().is_none() {
        let mut plan = Plan::from_snapshot(snapshot);
        let mut escalated: Vec<TaskId> = orphans.to_vec();
        escalated.sort();
        escalated.dedup();
        let escalations = escalated
            .iter()
            .map(|t| EscalationReport { task: *t, rejections: Vec::new() })
            .collect();
        plan.escalated = escalated;
        let score = objective::plan_cost(&plan, snapshot, tasks, weights, cfg, now);
        return Outcome {
            plan,
            score,
            stats: OptStats { time_ms: started.elapsed().as_secs_f32() * 1000.0, ..Default::default() },
            escalations,
        };
    }

    let (seeded, escalations) = greedy::greedy_seed(snapshot, orphans, tasks, cfg, kind, now);
    let seed_score = objective::plan_cost(&seeded, snapshot, tasks, weights, cfg, now);
    let (plan, score, search) =
        local_search::improve(seeded, snapshot, tasks, cfg, kind, now, seed);

    let stats = OptStats {
        time_ms: started.elapsed().as_secs_f32() * 1000.0,
        iterations: search.iterations,
        gap_estimate: gap_estimate(seed_score, score),
        time_bounded: search.time_bounded,
    };
    info!(
        "optimize: {} orphans, {} escalated, score {:.3} ({} iterations, {:.1} ms)",
        orphans.len(),
        plan.escalated.len(),
        score,
        stats.iterations,
        stats.time_ms
    );

    Outcome { plan, score, stats, escalations }
}
