//! Fleet state store: latest record per vehicle, written concurrently by
//! telemetry ingest and read by the executive through deep-copy snapshots.
//! One lock, held only for the duration of a write or a snapshot copy.
//! Failure *detection* does not live here; the store only records.

use parking_lot::Mutex;
use std::collections::BTreeMap;

use log::{debug, info};

use refleet_structs::config::Config;
use refleet_structs::report::TelemetryMsg;
use refleet_structs::snapshot::FleetSnapshot;
use refleet_structs::vehicle::{FailureCause, Health, VehicleState};
use refleet_structs::{TaskId, VehicleId};

const DISCHARGE_EMA_ALPHA: f32 = 0.3;

struct StoreInner {
    vehicles: BTreeMap<VehicleId, VehicleState>,
    generation: u64,
}

pub struct FleetStore {
    inner: Mutex<StoreInner>,
    altitude_bounds: (f32, f32),
}

impl FleetStore {
    pub fn new(cfg: &Config) -> FleetStore {
        FleetStore {
            inner: Mutex::new(StoreInner { vehicles: BTreeMap::new(), generation: 0 }),
            altitude_bounds: cfg.altitude_bounds_m,
        }
    }

    /// Seed a vehicle record at fleet initialization. Later telemetry for an
    /// unknown id auto-registers a default record instead.
    pub fn register(&self, vehicle: VehicleState) {
        let mut inner = self.inner.lock();
        info!("vehicle {} registered", vehicle.id.0);
        inner.vehicles.insert(vehicle.id, vehicle);
    }

    /// Apply one telemetry sample. Absent optional fields keep the previous
    /// value; the discharge-rate EMA, the inter-sample step length and the
    /// altitude-violation streak are updated from the previous sample.
    pub fn ingest(&self, msg: &TelemetryMsg, arrival: f32) {
        let mut inner = self.inner.lock();
        let rec = inner
            .vehicles
            .entry(msg.vehicle_id)
            .or_insert_with(|| VehicleState::new(msg.vehicle_id, msg.pos.into()));

        let prev_pos = rec.pos;
        let prev_energy = rec.energy;
        let prev_t = rec.last_contact;

        rec.pos = msg.pos.into();
        rec.vel = msg.vel.into();
        if let Some(energy) = msg.energy {
            rec.energy = energy.clamp(0.0, 1.0);
        }
        if let Some(payload) = msg.payload {
            rec.payload = payload;
        }
        if let Some(health) = msg.health {
            if rec.failure.is_none() {
                rec.health = health;
                rec.operational = !matches!(health, Health::Failed | Health::Crashed);
            }
        }
        if !msg.task_progress.is_empty() {
            rec.task_progress = msg.task_progress.clone();
        }

        rec.last_step = prev_pos.dist(&rec.pos);
        let dt = msg.t - prev_t;
        if dt > 0.0 && prev_t > 0.0 {
            let rate = ((prev_energy - rec.energy) / dt).max(0.0);
            rec.discharge_ema =
                DISCHARGE_EMA_ALPHA * rate + (1.0 - DISCHARGE_EMA_ALPHA) * rec.discharge_ema;
        }
        let (alt_min, alt_max) = self.altitude_bounds;
        if rec.pos.z < alt_min || rec.pos.z > alt_max {
            rec.alt_streak += 1;
        } else {
            rec.alt_streak = 0;
        }
        rec.last_contact = arrival;
        debug!(
            "ingest vehicle {} t={:.2} energy={:.3} ema={:.5}",
            msg.vehicle_id.0, msg.t, rec.energy, rec.discharge_ema
        );
    }

    /// Atomic deep copy of every record; bumps the generation counter.
    pub fn snapshot(&self, now: f32) -> FleetSnapshot {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        FleetSnapshot { t: now, generation: inner.generation, vehicles: inner.vehicles.clone() }
    }

    /// Transition a vehicle to failed. Idempotent; repeated causes keep the
    /// first one.
    pub fn mark_failed(&self, id: VehicleId, cause: FailureCause) {
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.vehicles.get_mut(&id) {
            if rec.failure.is_none() {
                info!("vehicle {} marked failed: {}", id.0, cause.label());
                rec.failure = Some(cause);
                if rec.health != Health::Crashed {
                    rec.health = Health::Failed;
                }
                rec.operational = false;
            }
        }
    }

    /// Replace a vehicle's committed task list (Act phase only).
    pub fn set_committed(&self, id: VehicleId, committed: Vec<TaskId>) {
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.vehicles.get_mut(&id) {
            rec.committed = committed;
        }
    }

    pub fn remove_committed(&self, id: VehicleId, task: TaskId) {
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.vehicles.get_mut(&id) {
            rec.committed.retain(|t| *t != task);
        }
    }

    /// Operator grant authorizing one vehicle to leave the operating region
    /// for one specific task.
    pub fn grant_boundary_permit(&self, id: VehicleId, task: TaskId) {
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.vehicles.get_mut(&id) {
            info!("boundary permit granted: vehicle {} task {}", id.0, task.0);
            rec.boundary_permits.insert(task);
        }
    }

    /// Latest reported per-task progress fractions, per vehicle.
    pub fn task_progress(&self) -> Vec<(VehicleId, BTreeMap<u32, f32>)> {
        let inner = self.inner.lock();
        inner
            .vehicles
            .values()
            .filter(|v| !v.task_progress.is_empty())
            .map(|v| (v.id, v.task_progress.clone()))
            .collect()
    }
}
