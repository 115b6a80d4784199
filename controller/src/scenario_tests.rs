#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use refleet_structs::config::{Config, MissionKind};
    use refleet_structs::mission::{TaskKind, TaskState};
    use refleet_structs::report::{CommandMsg, DecisionEvent, Strategy, TelemetryMsg};
    use refleet_structs::vehicle::{Health, VehicleState};
    use refleet_structs::{Point, TaskId, VehicleId, ZoneId};

    use crate::channels::Outbox;
    use crate::executive::Executive;
    use crate::missions::{MissionDb, TaskSpec};
    use crate::store::FleetStore;

    struct Rig {
        store: Arc<FleetStore>,
        exec: Executive,
        cmd: Arc<Outbox<CommandMsg>>,
        events: Arc<Outbox<DecisionEvent>>,
    }

    fn rig(cfg: Config, missions: MissionDb, fleet: Vec<VehicleState>) -> Rig {
        cfg.validate().unwrap();
        let store = Arc::new(FleetStore::new(&cfg));
        for v in fleet {
            store.register(v);
        }
        let cmd = Arc::new(Outbox::new(cfg.command_queue_cap));
        let events = Arc::new(Outbox::new(cfg.event_queue_cap));
        let exec =
            Executive::new(cfg, store.clone(), missions, cmd.clone(), events.clone());
        Rig { store, exec, cmd, events }
    }

    fn telemetry(id: u32, t: f32, pos: Point, energy: f32) -> TelemetryMsg {
        TelemetryMsg {
            vehicle_id: VehicleId(id),
            t,
            pos: pos.into(),
            vel: [0.0, 0.0, 0.0],
            energy: Some(energy),
            payload: None,
            health: None,
            task_progress: Default::default(),
        }
    }

    /// Five survey vehicles in the standard cluster, stacked by altitude,
    /// nine patrol zones on a 3x3 grid, all zones assigned.
    fn surveillance_rig() -> Rig {
        let positions = [(0.0, 0.0), (20.0, 0.0), (40.0, 0.0), (0.0, 20.0), (20.0, 20.0)];
        let mut fleet = Vec::new();
        for (i, (x, y)) in positions.iter().enumerate() {
            let mut v = VehicleState::new(
                VehicleId(i as u32 + 1),
                Point::new(*x, *y, 25.0 + 20.0 * i as f32),
            );
            v.energy = 0.8;
            fleet.push(v);
        }

        let mut db = MissionDb::new(MissionKind::Surveillance);
        let mut zone = 0u32;
        for y in [400.0, 1000.0, 1600.0] {
            for x in [600.0, 1500.0, 2400.0] {
                zone += 1;
                let mut spec =
                    TaskSpec::new(TaskKind::PatrolZone, Point::new(x, y, 30.0), 50);
                spec.zone = Some(ZoneId(zone));
                db.add_task(spec);
            }
        }
        // one or two zones per vehicle, fanned so routes do not cross
        let assignment: [(u32, &[u32]); 5] =
            [(1, &[1, 2]), (2, &[3, 6]), (3, &[5]), (4, &[7, 4]), (5, &[8, 9])];
        for (vid, zones) in assignment {
            for z in zones {
                db.assign(TaskId(*z), VehicleId(vid));
            }
        }

        let rig = rig(Config::default(), db, fleet);
        for (vid, zones) in assignment {
            rig.store
                .set_committed(VehicleId(vid), zones.iter().map(|z| TaskId(*z)).collect());
        }
        rig
    }

    /// Feed one telemetry round at time `t`; vehicle 3 discharges at
    /// `factor` times the configured baseline, everyone else holds steady.
    fn feed_round(rig: &Rig, t: f32, v3_energy: &mut f32, factor: f32) {
        let positions = [(0.0, 0.0), (20.0, 0.0), (40.0, 0.0), (0.0, 20.0), (20.0, 20.0)];
        for (i, (x, y)) in positions.iter().enumerate() {
            let id = i as u32 + 1;
            let energy = if id == 3 {
                *v3_energy -= factor * 0.0011 * 0.5;
                *v3_energy
            } else {
                0.8
            };
            let pos = Point::new(*x, *y, 25.0 + 20.0 * i as f32);
            rig.store.ingest(&telemetry(id, t, pos, energy), t);
        }
    }

    fn run_scenario_a() -> (Vec<DecisionEvent>, Vec<CommandMsg>) {
        let mut rig = surveillance_rig();
        let mut v3_energy = 0.8f32;
        let mut events = Vec::new();
        let mut t = 0.0f32;
        for _ in 0..6 {
            t += 0.5;
            feed_round(&rig, t, &mut v3_energy, 3.0);
            events.extend(rig.exec.tick(t));
        }
        (events, rig.cmd.drain())
    }

    #[test]
    fn scenario_a_single_failure_full_recovery() {
        let _ = env_logger::try_init();
        let (events, commands) = run_scenario_a();

        assert_eq!(events.len(), 1, "anomaly coalesces into exactly one cycle");
        let event = &events[0];
        assert_eq!(event.strategy, Strategy::FullReallocation);
        assert_eq!(event.metrics.tasks_lost, 1);
        assert_eq!(event.metrics.tasks_recovered, 1);
        assert_eq!(event.metrics.recovery_rate, 1.0);
        assert!(event.escalated.is_empty());
        assert_eq!(event.metrics.failed_uavs, 1);
        assert_eq!(event.metrics.operational_uavs, 4);

        // the orphaned zone moved to a surviving vehicle
        assert!(!event.assignments.contains_key(&3));
        let new_owner = event
            .assignments
            .iter()
            .find(|(_, ts)| ts.contains(&TaskId(5)))
            .map(|(v, _)| *v)
            .expect("zone 5 reassigned");
        assert_ne!(new_owner, 3);

        // every changed vehicle got a command, including the new owner
        assert!(!commands.is_empty());
        assert!(commands.iter().any(|c| c.vehicle_id == VehicleId(new_owner)));
    }

    #[test]
    fn scenario_f_identical_runs_are_bit_identical() {
        let (a, _) = run_scenario_a();
        let (b, _) = run_scenario_a();
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].assignments, b[0].assignments);
        assert_eq!(a[0].escalated, b[0].escalated);
        assert_eq!(
            a[0].metrics.objective_score.to_bits(),
            b[0].metrics.objective_score.to_bits()
        );
    }

    #[test]
    fn scenario_b_payload_infeasible_delivery_escalates() {
        let _ = env_logger::try_init();
        let mut fleet = Vec::new();
        for i in 0..3u32 {
            let mut v = VehicleState::new(
                VehicleId(i + 1),
                Point::new(100.0 + 200.0 * i as f32, 100.0, 30.0),
            );
            v.payload = 1.8;
            v.max_payload = 2.5;
            fleet.push(v);
        }
        let mut db = MissionDb::new(MissionKind::Delivery);
        let mut spec = TaskSpec::new(TaskKind::DeliveryPair, Point::new(300.0, 300.0, 30.0), 60);
        spec.payload_req = 2.0;
        let task = db.add_task(spec);

        let mut rig = rig(Config::default(), db, fleet);
        rig.exec.request_cycle();
        let events = rig.exec.tick(1.0);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.escalated, vec![task]);
        assert_eq!(event.metrics.recovery_rate, 0.0);
        assert_eq!(event.metrics.unallocated_count, 1);
        assert_eq!(event.rationale.matches("payload-exceeded").count(), 3);
        assert_eq!(rig.exec.missions().get(task).unwrap().state, TaskState::Escalated);
        assert!(rig.cmd.is_empty());
    }

    #[test]
    fn scenario_c_out_of_region_requires_operator() {
        let _ = env_logger::try_init();
        let fleet = vec![VehicleState::new(VehicleId(1), Point::new(100.0, 100.0, 30.0))];
        let mut db = MissionDb::new(MissionKind::Surveillance);
        let task = db.add_task(TaskSpec::new(
            TaskKind::PatrolZone,
            Point::new(3500.0, 2500.0, 30.0),
            70,
        ));

        let mut rig = rig(Config::default(), db, fleet);
        rig.exec.request_cycle();
        let events = rig.exec.tick(1.0);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].escalated, vec![task]);
        assert!(rig.cmd.is_empty(), "no command for an escalated task");
        assert_eq!(rig.exec.missions().get(task).unwrap().state, TaskState::Escalated);

        // operator grants the boundary permit and releases the task
        rig.store.grant_boundary_permit(VehicleId(1), task);
        rig.exec.missions_mut().release_escalation(task);
        rig.exec.request_cycle();
        let events = rig.exec.tick(2.0);
        assert_eq!(events.len(), 1);
        assert!(events[0].escalated.is_empty());
        assert_eq!(rig.cmd.drain().len(), 1);
        assert_eq!(rig.exec.missions().get(task).unwrap().state, TaskState::Assigned);
    }

    #[test]
    fn awaiting_permission_vehicle_holds_tasks_but_takes_no_new_ones() {
        let _ = env_logger::try_init();
        let fleet = vec![
            VehicleState::new(VehicleId(1), Point::new(100.0, 100.0, 30.0)),
            VehicleState::new(VehicleId(2), Point::new(400.0, 100.0, 30.0)),
        ];
        let mut db = MissionDb::new(MissionKind::Surveillance);
        let held = db.add_task(TaskSpec::new(
            TaskKind::PatrolZone,
            Point::new(600.0, 400.0, 30.0),
            50,
        ));
        db.assign(held, VehicleId(1));
        let orphan = db.add_task(TaskSpec::new(
            TaskKind::PatrolZone,
            Point::new(500.0, 100.0, 30.0),
            50,
        ));

        let mut rig = rig(Config::default(), db, fleet);
        rig.store.set_committed(VehicleId(1), vec![held]);

        // vehicle 1 reports it is holding for a boundary permit
        let mut msg = telemetry(1, 0.5, Point::new(100.0, 100.0, 30.0), 0.9);
        msg.health = Some(Health::AwaitingPermission);
        rig.store.ingest(&msg, 0.5);

        rig.exec.request_cycle();
        let events = rig.exec.tick(1.0);
        assert_eq!(events.len(), 1);

        // the new task went to the only accepting vehicle
        assert_eq!(
            events[0].assignments.get(&2).map(|ts| ts.contains(&orphan)),
            Some(true)
        );
        assert!(!events[0].assignments.contains_key(&1));
        // the holding vehicle keeps what it already owns
        let held_task = rig.exec.missions().get(held).unwrap();
        assert_eq!(held_task.state, TaskState::Assigned);
        assert_eq!(held_task.assigned_to, Some(VehicleId(1)));
    }

    #[test]
    fn scenario_d_golden_hour_picks_fastest_candidate() {
        let _ = env_logger::try_init();
        let near = VehicleState::new(VehicleId(1), Point::new(100.0, 100.0, 30.0));
        let far = VehicleState::new(VehicleId(2), Point::new(2000.0, 1500.0, 30.0));
        let mut db = MissionDb::new(MissionKind::Search);
        let mut spec = TaskSpec::new(TaskKind::SearchZone, Point::new(150.0, 100.0, 30.0), 100);
        spec.deadline = Some(61.0);
        spec.duration = 20.0;
        let task = db.add_task(spec);

        let mut rig = rig(Config::default(), db, vec![near, far]);
        rig.exec.request_cycle();
        let events = rig.exec.tick(1.0);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(event.escalated.is_empty());
        assert_eq!(
            event.assignments.get(&1).map(|ts| ts.as_slice()),
            Some([task].as_slice())
        );
        assert!(event.metrics.temporal_margin > 0.0);
        assert!(event.phase_timings_ms.decide <= 200.0);
    }

    #[test]
    fn scenario_e_two_failures_one_snapshot() {
        let _ = env_logger::try_init();
        let mut rig = surveillance_rig();
        let mut t = 0.0f32;
        let mut unused = 0.8f32;
        // healthy rounds to establish contact
        for _ in 0..2 {
            t += 0.5;
            feed_round(&rig, t, &mut unused, 1.0);
            assert!(rig.exec.tick(t).is_empty());
        }
        // vehicles 1 and 2 go silent 50 ms apart; both are past the
        // timeout threshold by the same sweep
        let silent_from = t;
        let mut events = Vec::new();
        while t < silent_from + 2.5 {
            t += 0.5;
            for id in 3..=5u32 {
                let i = id as usize - 1;
                let positions =
                    [(0.0, 0.0), (20.0, 0.0), (40.0, 0.0), (0.0, 20.0), (20.0, 20.0)];
                let (x, y) = positions[i];
                let pos = Point::new(x, y, 25.0 + 20.0 * i as f32);
                rig.store.ingest(&telemetry(id, t, pos, 0.8), t);
            }
            events.extend(rig.exec.tick(t));
        }
        assert_eq!(events.len(), 1, "both failures handled by one cycle");
        assert_eq!(events[0].metrics.failed_uavs, 2);
        assert_eq!(events[0].metrics.tasks_lost, 4);
    }

    #[test]
    fn coalesced_triggers_run_one_cycle() {
        let mut rig = surveillance_rig();
        rig.exec.request_cycle();
        rig.exec.request_cycle();
        let events = rig.exec.tick(1.0);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn timeout_fires_only_strictly_past_threshold() {
        let fleet = vec![VehicleState::new(VehicleId(1), Point::new(100.0, 100.0, 30.0))];
        let mut db = MissionDb::new(MissionKind::Surveillance);
        let task = db.add_task(TaskSpec::new(
            TaskKind::PatrolZone,
            Point::new(600.0, 400.0, 30.0),
            50,
        ));
        db.assign(task, VehicleId(1));
        let mut rig = rig(Config::default(), db, fleet);
        rig.store.set_committed(VehicleId(1), vec![task]);
        rig.store.ingest(&telemetry(1, 10.0, Point::new(100.0, 100.0, 30.0), 0.9), 10.0);

        // exactly at the threshold: no failure
        assert!(rig.exec.tick(11.5).is_empty());
        // strictly past it: failure and a cycle
        let events = rig.exec.tick(11.6);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metrics.failed_uavs, 1);
    }

    #[test]
    fn cycle_numbers_are_contiguous_and_states_conserved() {
        let mut rig = surveillance_rig();
        rig.exec.request_cycle();
        let first = rig.exec.tick(1.0);
        rig.exec.request_cycle();
        let second = rig.exec.tick(2.0);
        assert_eq!(first[0].cycle, 1);
        assert_eq!(second[0].cycle, 2);

        let counts = rig.exec.missions().counts_by_state();
        let total: usize = counts.values().sum();
        assert_eq!(total, 9, "task multiset conserved across cycles");
        assert_eq!(counts.get(&TaskState::Assigned).copied().unwrap_or(0), 9);
    }

    #[test]
    fn no_op_cycle_emits_event_but_no_commands() {
        let mut rig = surveillance_rig();
        rig.exec.request_cycle();
        let events = rig.exec.tick(1.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].strategy, Strategy::NoOp);
        assert_eq!(events[0].metrics.tasks_lost, 0);
        assert_eq!(events[0].metrics.recovery_rate, 0.0);
        assert!(rig.cmd.is_empty());
        assert_eq!(rig.events.len(), 1);
    }

    #[test]
    fn task_progress_completes_and_frees_the_vehicle() {
        let mut rig = surveillance_rig();
        let mut msg = telemetry(3, 0.5, Point::new(1500.0, 1000.0, 30.0), 0.7);
        msg.task_progress.insert(5, 1.0);
        rig.store.ingest(&msg, 0.5);
        rig.exec.tick(0.5);

        assert_eq!(
            rig.exec.missions().get(TaskId(5)).unwrap().state,
            TaskState::Completed
        );
        let snap = rig.store.snapshot(1.0);
        assert!(snap.get(VehicleId(3)).unwrap().committed.is_empty());
    }

    #[test]
    fn end_to_end_sim_loop_recovers_from_anomaly() {
        let _ = env_logger::try_init();
        let mut world = refleet_sim::World::surveillance_grid();
        let mut db = MissionDb::new(MissionKind::Surveillance);
        for y in [400.0, 1000.0, 1600.0] {
            for x in [600.0, 1500.0, 2400.0] {
                db.add_task(TaskSpec::new(TaskKind::PatrolZone, Point::new(x, y, 30.0), 50));
            }
        }
        let mut rig = rig(Config::default(), db, vec![]);

        let mut t = 0.0f32;
        let step = |rig: &mut Rig, world: &mut refleet_sim::World, t: &mut f32| {
            *t += 0.5;
            for msg in world.simulate(0.5) {
                rig.store.ingest(&msg, *t);
            }
            let events = rig.exec.tick(*t);
            for cmd in rig.cmd.drain() {
                world.apply_command(&cmd);
            }
            events
        };

        // fleet reports in, then the mission is handed out
        let mut events = Vec::new();
        for _ in 0..3 {
            events.extend(step(&mut rig, &mut world, &mut t));
        }
        rig.exec.request_cycle();
        events.extend(step(&mut rig, &mut world, &mut t));
        let bootstrap = events.last().expect("bootstrap cycle ran");
        assert_ne!(bootstrap.strategy, Strategy::Error);
        assert!(bootstrap.metrics.tasks_lost > 0);

        // anomalous discharge on a tasked vehicle triggers a recovery cycle
        let victim = bootstrap
            .assignments
            .iter()
            .find(|(_, ts)| !ts.is_empty())
            .map(|(v, _)| VehicleId(*v))
            .expect("bootstrap assigned tasks");
        world.inject_discharge_anomaly(victim, 3.0);
        let before = events.len();
        for _ in 0..10 {
            events.extend(step(&mut rig, &mut world, &mut t));
        }
        assert!(events.len() > before, "anomaly produced at least one cycle");
        assert!(events.iter().skip(before).all(|e| e.strategy != Strategy::Error));
    }
}
