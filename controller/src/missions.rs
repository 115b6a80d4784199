//! Authoritative mission task database. The executive reads it during
//! Orient and Decide and writes state transitions during Act; nothing else
//! writes task state while a cycle is in flight.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};

use refleet_structs::config::MissionKind;
use refleet_structs::mission::{Task, TaskKind, TaskState};
use refleet_structs::plan::Plan;
use refleet_structs::snapshot::FleetSnapshot;
use refleet_structs::{Point, TaskId, VehicleId, ZoneId};

pub struct TaskSpec {
    pub kind: TaskKind,
    pub pos: Point,
    pub priority: i32,
    pub duration: f32,
    pub payload_req: f32,
    pub deadline: Option<f32>,
    pub zone: Option<ZoneId>,
}

impl TaskSpec {
    pub fn new(kind: TaskKind, pos: Point, priority: i32) -> TaskSpec {
        TaskSpec {
            kind,
            pos,
            priority,
            duration: 60.0,
            payload_req: 0.0,
            deadline: None,
            zone: None,
        }
    }
}

pub struct MissionDb {
    tasks: BTreeMap<TaskId, Task>,
    next_id: u32,
    kind: MissionKind,
}

impl MissionDb {
    pub fn new(kind: MissionKind) -> MissionDb {
        MissionDb { tasks: BTreeMap::new(), next_id: 1, kind }
    }

    pub fn mission_kind(&self) -> MissionKind {
        self.kind
    }

    pub fn add_task(&mut self, spec: TaskSpec) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let mut task = Task::new(id, spec.kind, spec.pos, spec.priority);
        task.duration = spec.duration;
        task.payload_req = spec.payload_req;
        task.deadline = spec.deadline;
        task.zone = spec.zone;
        info!("task {} added: {:?} at ({:.0}, {:.0})", id.0, spec.kind, spec.pos.x, spec.pos.y);
        self.tasks.insert(id, task);
        id
    }

    /// A delivery as a contiguous pickup/dropoff pair. Returns the pickup id.
    pub fn add_delivery_pair(
        &mut self,
        pickup: Point,
        dropoff: Point,
        priority: i32,
        payload: f32,
        deadline: Option<f32>,
    ) -> (TaskId, TaskId) {
        let mut p = TaskSpec::new(TaskKind::Pickup, pickup, priority);
        p.payload_req = payload;
        p.deadline = deadline;
        let pickup_id = self.add_task(p);
        let mut d = TaskSpec::new(TaskKind::Dropoff, dropoff, priority);
        d.payload_req = payload;
        d.deadline = deadline;
        let dropoff_id = self.add_task(d);
        self.tasks.get_mut(&pickup_id).unwrap().paired_with = Some(dropoff_id);
        self.tasks.get_mut(&dropoff_id).unwrap().paired_with = Some(pickup_id);
        (pickup_id, dropoff_id)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn tasks(&self) -> &BTreeMap<TaskId, Task> {
        &self.tasks
    }

    pub fn assign(&mut self, id: TaskId, vehicle: VehicleId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.assigned_to = Some(vehicle);
            task.state = TaskState::Assigned;
            debug!("task {} assigned to vehicle {}", id.0, vehicle.0);
        }
    }

    pub fn mark_in_progress(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            if task.state == TaskState::Assigned {
                task.state = TaskState::InProgress;
            }
        }
    }

    pub fn mark_completed(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.state = TaskState::Completed;
            task.assigned_to = None;
            info!("task {} completed", id.0);
        }
    }

    pub fn mark_orphaned(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            if matches!(task.state, TaskState::Assigned | TaskState::InProgress) {
                task.state = TaskState::Orphaned;
                task.assigned_to = None;
            }
        }
    }

    pub fn mark_escalated(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.state = TaskState::Escalated;
            task.assigned_to = None;
        }
    }

    /// Operator action: put an escalated task back into play.
    pub fn release_escalation(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(&id) {
            if task.state == TaskState::Escalated {
                task.state = TaskState::Unassigned;
            }
        }
    }

    /// Read-only orphan computation for the Orient phase: tasks owned by a
    /// vehicle that can no longer fly, plus unassigned and
    /// previously-orphaned tasks. Escalated tasks stay with the operator.
    pub fn orphaned_tasks(&self, snapshot: &FleetSnapshot) -> Vec<TaskId> {
        let mut orphans = Vec::new();
        for task in self.tasks.values() {
            let lost_owner = match (task.state, task.assigned_to) {
                (TaskState::Assigned | TaskState::InProgress, Some(owner)) => snapshot
                    .get(owner)
                    .map_or(true, |v| !v.operational),
                _ => false,
            };
            if lost_owner
                || matches!(task.state, TaskState::Unassigned | TaskState::Orphaned)
            {
                orphans.push(task.id);
            }
        }
        orphans
    }

    pub fn affected_zones(&self, ids: &[TaskId]) -> BTreeSet<ZoneId> {
        ids.iter()
            .filter_map(|id| self.tasks.get(id))
            .filter_map(|t| t.zone)
            .collect()
    }

    /// Priority mass of every non-completed task; denominator of the
    /// priority-weighted coverage-loss metric.
    pub fn priority_demand(&self) -> f32 {
        self.tasks
            .values()
            .filter(|t| t.is_active())
            .map(|t| t.priority as f32)
            .sum()
    }

    pub fn priority_of(&self, ids: &[TaskId]) -> f32 {
        ids.iter()
            .filter_map(|id| self.tasks.get(id))
            .map(|t| t.priority as f32)
            .sum()
    }

    /// Commit a reallocation plan (Act phase): orphans named in the plan
    /// transition orphaned -> assigned, escalated ones orphaned ->
    /// escalated, and tasks the optimizer moved between surviving vehicles
    /// get their owner reference updated.
    pub fn commit_plan(&mut self, plan: &Plan, orphans: &[TaskId]) {
        for id in orphans {
            self.mark_orphaned(*id);
        }
        for (vehicle, list) in plan.assignments.iter() {
            for id in list {
                let needs_update = self.tasks.get(id).map_or(false, |t| match t.state {
                    TaskState::Completed | TaskState::Escalated => false,
                    TaskState::Orphaned | TaskState::Unassigned => true,
                    _ => t.assigned_to != Some(*vehicle),
                });
                if needs_update {
                    self.assign(*id, *vehicle);
                }
            }
        }
        for id in plan.escalated.iter() {
            self.mark_escalated(*id);
        }
    }

    pub fn counts_by_state(&self) -> BTreeMap<TaskState, usize> {
        let mut out = BTreeMap::new();
        for task in self.tasks.values() {
            *out.entry(task.state).or_insert(0) += 1;
        }
        out
    }
}
