use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::vehicle::VehicleState;
use crate::VehicleId;

/// Immutable copy of the fleet taken at the start of an OODA cycle. All
/// Decide-phase logic reads exactly one snapshot. Vehicles are keyed in a
/// BTreeMap so every iteration over the fleet is in ascending id order.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct FleetSnapshot {
    pub t: f32,
    pub generation: u64,
    pub vehicles: BTreeMap<VehicleId, VehicleState>,
}

impl FleetSnapshot {
    pub fn get(&self, id: VehicleId) -> Option<&VehicleState> {
        self.vehicles.get(&id)
    }

    pub fn operational(&self) -> impl Iterator<Item = &VehicleState> {
        self.vehicles.values().filter(|v| v.accepts_tasks())
    }

    pub fn operational_count(&self) -> u32 {
        self.vehicles.values().filter(|v| v.operational).count() as u32
    }

    pub fn failed_count(&self) -> u32 {
        self.vehicles.values().filter(|v| !v.operational).count() as u32
    }
}
