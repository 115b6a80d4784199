//! Multi-modal failure detection: a pure sweep over one fleet snapshot.
//! A vehicle is failed when its link timed out (strictly past the
//! threshold), its discharge EMA runs anomalously hot, its position jumped
//! between samples, or its altitude stayed outside the envelope for more
//! than one sample.

use log::warn;

use refleet_structs::config::Config;
use refleet_structs::snapshot::FleetSnapshot;
use refleet_structs::vehicle::FailureCause;
use refleet_structs::VehicleId;

pub fn sweep(snapshot: &FleetSnapshot, cfg: &Config, now: f32) -> Vec<(VehicleId, FailureCause)> {
    let mut failures = Vec::new();
    for vehicle in snapshot.vehicles.values() {
        // already swept, or seeded as failed at registration
        if vehicle.failure.is_some() {
            continue;
        }
        let cause = if !vehicle.operational {
            // the vehicle itself reported failed or crashed health
            Some(FailureCause::Reported)
        } else if vehicle.last_contact > 0.0
            && now - vehicle.last_contact > cfg.timeout_threshold_s()
        {
            Some(FailureCause::LinkTimeout)
        } else if vehicle.discharge_ema > cfg.anomaly_multiplier * cfg.baseline_discharge {
            Some(FailureCause::DischargeAnomaly)
        } else if vehicle.last_step > cfg.position_jump_threshold_m {
            Some(FailureCause::PositionJump)
        } else if vehicle.alt_streak > 1 {
            Some(FailureCause::AltitudeEnvelope)
        } else {
            None
        };
        if let Some(cause) = cause {
            warn!("vehicle {} failure detected: {}", vehicle.id.0, cause.label());
            failures.push((vehicle.id, cause));
        }
    }
    failures
}
