use serde::Serialize;
use std::collections::BTreeMap;

use crate::snapshot::FleetSnapshot;
use crate::{TaskId, VehicleId};

/// An assignment of orphaned tasks onto the surviving fleet: ordered task
/// lists per vehicle plus the set of tasks no feasible vehicle could take.
#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct Plan {
    pub assignments: BTreeMap<VehicleId, Vec<TaskId>>,
    pub escalated: Vec<TaskId>,
}

impl Plan {
    /// Seed a plan from the committed lists of every vehicle currently able
    /// to take tasks.
    pub fn from_snapshot(snapshot: &FleetSnapshot) -> Plan {
        let assignments = snapshot
            .vehicles
            .values()
            .filter(|v| v.accepts_tasks())
            .map(|v| (v.id, v.committed.clone()))
            .collect();
        Plan { assignments, escalated: Vec::new() }
    }

    pub fn tasks_of(&self, vehicle: VehicleId) -> &[TaskId] {
        self.assignments.get(&vehicle).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn owner_of(&self, task: TaskId) -> Option<VehicleId> {
        self.assignments
            .iter()
            .find(|(_, ts)| ts.contains(&task))
            .map(|(v, _)| *v)
    }

    pub fn assigned_count(&self) -> usize {
        self.assignments.values().map(|ts| ts.len()).sum()
    }

    /// All (vehicle, position-in-list, task) entries in vehicle-id order.
    pub fn entries(&self) -> Vec<(VehicleId, usize, TaskId)> {
        let mut out = Vec::new();
        for (v, ts) in self.assignments.iter() {
            for (i, t) in ts.iter().enumerate() {
                out.push((*v, i, *t));
            }
        }
        out
    }

    pub fn push_task(&mut self, vehicle: VehicleId, task: TaskId) {
        self.assignments.entry(vehicle).or_default().push(task);
    }

    /// Remove a task wherever it appears. Returns the previous owner.
    pub fn remove_task(&mut self, task: TaskId) -> Option<VehicleId> {
        for (v, ts) in self.assignments.iter_mut() {
            if let Some(i) = ts.iter().position(|t| *t == task) {
                ts.remove(i);
                return Some(*v);
            }
        }
        None
    }

    /// Swap two assigned tasks in place, preserving both list positions.
    pub fn swap_tasks(&mut self, a: TaskId, b: TaskId) {
        let mut slot_a = None;
        let mut slot_b = None;
        for (v, ts) in self.assignments.iter() {
            for (i, t) in ts.iter().enumerate() {
                if *t == a {
                    slot_a = Some((*v, i));
                }
                if *t == b {
                    slot_b = Some((*v, i));
                }
            }
        }
        if let (Some((va, ia)), Some((vb, ib))) = (slot_a, slot_b) {
            self.assignments.get_mut(&va).unwrap()[ia] = b;
            self.assignments.get_mut(&vb).unwrap()[ib] = a;
        }
    }
}
