//! OODA executive: ticks the failure sweep, coalesces triggers, runs the
//! observe / orient / decide / act cycle, and emits commands plus one
//! decision event per cycle. At most one cycle is in flight at a time; a
//! trigger raised during a cycle is consumed by exactly one follow-up cycle
//! that observes a fresh snapshot.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use refleet_planner::constraints::TaskTable;
use refleet_planner::{optimize, validate_plan, Outcome};
use refleet_structs::config::Config;
use refleet_structs::report::{
    CommandMsg, CommandOp, CommandTask, CycleMetrics, DecisionEvent, PhaseTimings, Strategy,
};
use refleet_structs::snapshot::FleetSnapshot;
use refleet_structs::{TaskId, VehicleId};

use crate::channels::Outbox;
use crate::detect;
use crate::missions::MissionDb;
use crate::store::FleetStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchState {
    Idle,
    Cycling,
    Stopped,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StatSummary {
    pub mean: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
}

fn stat_summary(xs: &[f32]) -> StatSummary {
    if xs.is_empty() {
        return StatSummary::default();
    }
    let mean = xs.iter().sum::<f32>() / xs.len() as f32;
    let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / xs.len() as f32;
    StatSummary {
        mean,
        std: var.sqrt(),
        min: xs.iter().copied().fold(f32::INFINITY, f32::min),
        max: xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
    }
}

/// Lifetime counters, read through `Executive::performance`.
#[derive(Default)]
struct Aggregates {
    cycles: u64,
    error_cycles: u64,
    tasks_recovered: u64,
    tasks_lost: u64,
    recovery_rates: Vec<f32>,
    objective_scores: Vec<f32>,
}

#[derive(Clone, Copy, Debug)]
pub struct PerfReport {
    pub cycles: u64,
    pub error_cycles: u64,
    pub tasks_recovered: u64,
    pub tasks_lost: u64,
    pub recovery_rate: StatSummary,
    pub objective_score: StatSummary,
    pub commands_dropped: u64,
    pub events_dropped: u64,
}

pub struct Executive {
    cfg: Config,
    store: Arc<FleetStore>,
    missions: MissionDb,
    cmd_tx: Arc<Outbox<CommandMsg>>,
    event_tx: Arc<Outbox<DecisionEvent>>,
    state: OrchState,
    cycle: u64,
    trigger: Arc<AtomicBool>,
    aggregates: Aggregates,
}

fn ms_since(t: Instant) -> f32 {
    t.elapsed().as_secs_f32() * 1000.0
}

fn battery_spare(snapshot: &FleetSnapshot, tasks: &TaskTable, cfg: &Config) -> f32 {
    snapshot
        .operational()
        .map(|v| {
            let seq: Vec<_> = v.committed.iter().filter_map(|id| tasks.get(id)).collect();
            let committed = refleet_planner::constraints::route_energy(v, &seq, cfg);
            let reserve = cfg.safety_reserve_fraction * v.energy_capacity;
            (v.energy_units() - committed - reserve).max(0.0)
        })
        .sum()
}

fn payload_spare(snapshot: &FleetSnapshot) -> f32 {
    snapshot.operational().map(|v| (v.max_payload - v.payload).max(0.0)).sum()
}

fn temporal_margin(tasks: &TaskTable, now: f32) -> f32 {
    let margin = tasks
        .values()
        .filter(|t| t.is_active())
        .filter_map(|t| t.deadline.map(|d| d - now))
        .fold(f32::INFINITY, f32::min);
    if margin.is_finite() {
        margin
    } else {
        0.0
    }
}

impl Executive {
    pub fn new(
        cfg: Config,
        store: Arc<FleetStore>,
        missions: MissionDb,
        cmd_tx: Arc<Outbox<CommandMsg>>,
        event_tx: Arc<Outbox<DecisionEvent>>,
    ) -> Executive {
        Executive {
            cfg,
            store,
            missions,
            cmd_tx,
            event_tx,
            state: OrchState::Idle,
            cycle: 0,
            trigger: Arc::new(AtomicBool::new(false)),
            aggregates: Aggregates::default(),
        }
    }

    /// Shared handle for external fault injection / operator triggers. Any
    /// number of sets collapse into a single cycle.
    pub fn trigger_handle(&self) -> Arc<AtomicBool> {
        self.trigger.clone()
    }

    pub fn request_cycle(&self) {
        self.trigger.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> OrchState {
        self.state
    }

    pub fn missions(&self) -> &MissionDb {
        &self.missions
    }

    pub fn missions_mut(&mut self) -> &mut MissionDb {
        &mut self.missions
    }

    pub fn shutdown(&mut self) {
        info!("executive stopping after {} cycles", self.aggregates.cycles);
        self.state = OrchState::Stopped;
    }

    pub fn performance(&self) -> PerfReport {
        PerfReport {
            cycles: self.aggregates.cycles,
            error_cycles: self.aggregates.error_cycles,
            tasks_recovered: self.aggregates.tasks_recovered,
            tasks_lost: self.aggregates.tasks_lost,
            recovery_rate: stat_summary(&self.aggregates.recovery_rates),
            objective_score: stat_summary(&self.aggregates.objective_scores),
            commands_dropped: self.cmd_tx.dropped(),
            events_dropped: self.event_tx.dropped(),
        }
    }

    /// One scheduler tick: fold telemetry progress into the mission db, run
    /// the failure sweep, and run OODA cycles for fresh faults or external
    /// triggers. Returns the decision events of every cycle that ran.
    pub fn tick(&mut self, now: f32) -> Vec<DecisionEvent> {
        if self.state == OrchState::Stopped {
            return Vec::new();
        }

        self.apply_task_progress();

        let snapshot = self.store.snapshot(now);
        let faults = detect::sweep(&snapshot, &self.cfg, now);
        for (id, cause) in faults.iter() {
            self.store.mark_failed(*id, *cause);
        }

        let mut events = Vec::new();
        if !faults.is_empty() || self.trigger.swap(false, Ordering::SeqCst) {
            events.push(self.run_cycle(now, faults.len()));
            // triggers raised while cycling coalesce into one extra cycle
            while self.state != OrchState::Stopped && self.trigger.swap(false, Ordering::SeqCst) {
                events.push(self.run_cycle(now, 0));
            }
        }
        events
    }

    /// Runs the ticker until the shutdown flag is raised. `clock` supplies
    /// the mission time anchor for each tick.
    pub fn run_blocking(mut self, shutdown: Arc<AtomicBool>, clock: impl Fn() -> f32) {
        let period = Duration::from_millis(self.cfg.telemetry_period_ms.max(1.0) as u64);
        while !shutdown.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.tick(clock());
            if let Some(remaining) = period.checked_sub(started.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
        self.shutdown();
    }

    fn apply_task_progress(&mut self) {
        for (vehicle, progress) in self.store.task_progress() {
            for (raw_id, fraction) in progress {
                let id = TaskId(raw_id);
                if fraction >= 1.0 {
                    self.missions.mark_completed(id);
                    self.store.remove_committed(vehicle, id);
                } else if fraction > 0.0 {
                    self.missions.mark_in_progress(id);
                }
            }
        }
    }

    fn run_cycle(&mut self, now: f32, fresh_faults: usize) -> DecisionEvent {
        self.state = OrchState::Cycling;
        self.cycle += 1;
        let cycle_started = Instant::now();
        info!("OODA cycle #{} triggered ({} fresh faults)", self.cycle, fresh_faults);

        // Observe
        let t0 = Instant::now();
        let snapshot = self.store.snapshot(now);
        let observe_ms = ms_since(t0);

        // Orient
        let t0 = Instant::now();
        let orphans = self.missions.orphaned_tasks(&snapshot);
        let zones = self.missions.affected_zones(&orphans);
        let battery = battery_spare(&snapshot, self.missions.tasks(), &self.cfg);
        let payload = payload_spare(&snapshot);
        let margin = temporal_margin(self.missions.tasks(), now);
        let orient_ms = ms_since(t0);

        // Decide
        let t0 = Instant::now();
        let strategy = if orphans.is_empty() && fresh_faults == 0 {
            Strategy::NoOp
        } else {
            Strategy::FullReallocation
        };
        let kind = self.missions.mission_kind();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            optimize(
                &snapshot,
                &orphans,
                self.missions.tasks(),
                &self.cfg,
                kind,
                now,
                snapshot.generation,
            )
        }));
        let decide_ms = ms_since(t0);

        let outcome: Outcome = match outcome {
            Ok(outcome) => {
                let violations =
                    validate_plan(&snapshot, &outcome.plan, self.missions.tasks(), &self.cfg, now);
                if violations.is_empty() {
                    outcome
                } else {
                    for v in violations.iter() {
                        error!(
                            "plan validation failed post-optimization: vehicle {} {}",
                            v.vehicle.0, v.reason
                        );
                    }
                    return self.error_cycle(
                        now,
                        observe_ms,
                        orient_ms,
                        decide_ms,
                        format!("plan failed validation with {} violations", violations.len()),
                    );
                }
            }
            Err(_) => {
                error!("optimizer panicked; abandoning cycle #{}", self.cycle);
                return self.error_cycle(
                    now,
                    observe_ms,
                    orient_ms,
                    decide_ms,
                    "optimizer failure".to_string(),
                );
            }
        };

        // Act
        let t0 = Instant::now();
        let mut commands = 0u32;
        for (vehicle, list) in outcome.plan.assignments.iter() {
            let unchanged = snapshot.get(*vehicle).map_or(false, |v| v.committed == *list);
            if unchanged {
                continue;
            }
            self.cmd_tx.push(self.make_command(*vehicle, list));
            self.store.set_committed(*vehicle, list.clone());
            commands += 1;
        }
        self.missions.commit_plan(&outcome.plan, &orphans);

        let tasks_lost = orphans.len() as u32;
        let tasks_recovered =
            orphans.iter().filter(|t| outcome.plan.owner_of(**t).is_some()).count() as u32;
        let recovery_rate =
            if tasks_lost == 0 { 0.0 } else { tasks_recovered as f32 / tasks_lost as f32 };
        let demand = self.missions.priority_demand();
        let coverage_loss = if demand > 0.0 {
            self.missions.priority_of(&outcome.plan.escalated) / demand
        } else {
            0.0
        };

        let metrics = CycleMetrics {
            recovery_rate,
            tasks_recovered,
            tasks_lost,
            unallocated_count: outcome.plan.escalated.len() as u32,
            coverage_loss,
            battery_spare: battery,
            payload_spare: payload,
            operational_uavs: snapshot.operational_count(),
            failed_uavs: snapshot.failed_count(),
            temporal_margin: margin,
            affected_zones: zones.len() as u32,
            objective_score: outcome.score,
            optimization_time_ms: outcome.stats.time_ms,
            optimization_iterations: outcome.stats.iterations,
            optimality_gap_estimate: outcome.stats.gap_estimate,
            gap_time_bounded: outcome.stats.time_bounded,
        };

        let rationale = self.build_rationale(strategy, &metrics, &outcome);
        let event = DecisionEvent {
            cycle: self.cycle,
            strategy,
            rationale,
            phase_timings_ms: PhaseTimings {
                observe: observe_ms,
                orient: orient_ms,
                decide: decide_ms,
                act: ms_since(t0),
            },
            metrics,
            assignments: outcome
                .plan
                .assignments
                .iter()
                .map(|(v, ts)| (v.0, ts.clone()))
                .collect(),
            escalated: outcome.plan.escalated.clone(),
        };
        self.event_tx.push(event.clone());

        self.aggregates.cycles += 1;
        self.aggregates.tasks_recovered += tasks_recovered as u64;
        self.aggregates.tasks_lost += tasks_lost as u64;
        self.aggregates.recovery_rates.push(recovery_rate);
        self.aggregates.objective_scores.push(outcome.score);

        let total_ms = ms_since(cycle_started);
        if total_ms > self.cfg.cycle_budget_ms {
            warn!("cycle #{} exceeded budget: {:.1} ms", self.cycle, total_ms);
        }
        info!(
            "cycle #{} done: {:?}, {} commands, recovery {:.2}, {:.1} ms",
            self.cycle, strategy, commands, recovery_rate, total_ms
        );
        self.state = OrchState::Idle;
        event
    }

    fn make_command(&self, vehicle: VehicleId, list: &[TaskId]) -> CommandMsg {
        let tasks = list
            .iter()
            .filter_map(|id| self.missions.get(*id))
            .map(|t| CommandTask {
                task_id: t.id,
                waypoints: vec![t.pos.into()],
                kind: t.kind,
            })
            .collect();
        CommandMsg { vehicle_id: vehicle, op: CommandOp::SetTaskList, tasks }
    }

    fn build_rationale(
        &self,
        strategy: Strategy,
        metrics: &CycleMetrics,
        outcome: &Outcome,
    ) -> String {
        match strategy {
            Strategy::NoOp => "no orphaned tasks; fleet nominal".to_string(),
            Strategy::Error => "cycle abandoned".to_string(),
            Strategy::FullReallocation => {
                let mut s = format!(
                    "reallocated {}/{} tasks, {} escalated; objective {:.3} \
                     ({} iterations, {:.1} ms)",
                    metrics.tasks_recovered,
                    metrics.tasks_lost,
                    metrics.unallocated_count,
                    metrics.objective_score,
                    metrics.optimization_iterations,
                    metrics.optimization_time_ms,
                );
                for report in outcome.escalations.iter() {
                    let reasons: Vec<String> = report
                        .rejections
                        .iter()
                        .map(|(v, r)| format!("vehicle {}: {}", v.0, r))
                        .collect();
                    s.push_str(&format!(
                        "; task {} infeasible [{}]",
                        report.task.0,
                        reasons.join(", ")
                    ));
                }
                s
            }
        }
    }

    /// An abandoned cycle: no commands are emitted, the previous plan stays
    /// in force, and the failure is visible in the aggregates. The next tick
    /// re-attempts.
    fn error_cycle(
        &mut self,
        _now: f32,
        observe_ms: f32,
        orient_ms: f32,
        decide_ms: f32,
        why: String,
    ) -> DecisionEvent {
        self.aggregates.cycles += 1;
        self.aggregates.error_cycles += 1;
        let event = DecisionEvent {
            cycle: self.cycle,
            strategy: Strategy::Error,
            rationale: why,
            phase_timings_ms: PhaseTimings {
                observe: observe_ms,
                orient: orient_ms,
                decide: decide_ms,
                act: 0.0,
            },
            metrics: CycleMetrics::default(),
            assignments: Default::default(),
            escalated: Vec::new(),
        };
        self.event_tx.push(event.clone());
        self.state = OrchState::Idle;
        event
    }
}
