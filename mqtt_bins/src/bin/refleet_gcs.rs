use std::sync::Arc;

use log::info;

use refleet_controller::channels::Outbox;
use refleet_controller::executive::Executive;
use refleet_controller::missions::{MissionDb, TaskSpec};
use refleet_controller::store::FleetStore;
use refleet_structs::config::{Config, MissionKind};
use refleet_structs::mission::TaskKind;
use refleet_structs::report::TelemetryMsg;
use refleet_structs::{Point, ZoneId};

fn demo_mission() -> MissionDb {
    let mut db = MissionDb::new(MissionKind::Surveillance);
    let columns = [600.0, 1500.0, 2400.0];
    let rows = [400.0, 1000.0, 1600.0];
    let mut zone = 0;
    for y in rows {
        for x in columns {
            zone += 1;
            let mut spec =
                TaskSpec::new(TaskKind::PatrolZone, Point::new(x, y, 30.0), 50 + zone);
            spec.zone = Some(ZoneId(zone as u32));
            db.add_task(spec);
        }
    }
    db
}

fn main() {
    env_logger::init();

    let cfg = Config::default();
    if let Err(e) = cfg.validate() {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    }

    let mqtt_opts = paho_mqtt::CreateOptionsBuilder::new()
        .server_uri("mqtt://localhost:1883")
        .finalize();
    let mqtt_cli = paho_mqtt::Client::new(mqtt_opts).unwrap();
    let conn_opts = paho_mqtt::ConnectOptionsBuilder::new()
        .keep_alive_interval(std::time::Duration::from_secs(20))
        .finalize();
    mqtt_cli.connect(conn_opts).unwrap();
    mqtt_cli.subscribe("/refleet/telemetry", 1).unwrap();
    let mqtt_rx = mqtt_cli.start_consuming();

    let store = Arc::new(FleetStore::new(&cfg));
    let cmd_tx = Arc::new(Outbox::new(cfg.command_queue_cap));
    let event_tx = Arc::new(Outbox::new(cfg.event_queue_cap));
    let period = std::time::Duration::from_millis(cfg.telemetry_period_ms as u64);
    let mut executive =
        Executive::new(cfg, store.clone(), demo_mission(), cmd_tx.clone(), event_tx.clone());

    // the initial mission is handed out once the fleet has reported in
    let mut bootstrapped = false;

    let start = std::time::Instant::now();
    let mut next_tick = std::time::Instant::now() + period;

    info!("refleet_gcs main loop starting.");
    loop {
        let timeout = next_tick.saturating_duration_since(std::time::Instant::now());
        match mqtt_rx.recv_timeout(timeout) {
            Ok(Some(msg)) => {
                if msg.topic() == "/refleet/telemetry" {
                    match serde_json::from_slice::<TelemetryMsg>(msg.payload_str().as_bytes()) {
                        Ok(telemetry) => {
                            store.ingest(&telemetry, start.elapsed().as_secs_f32())
                        }
                        Err(e) => println!("WARNING: malformed telemetry {:?}", e),
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                if e.is_disconnected() {
                    panic!("mqtt disconnected");
                }
            }
        }

        if std::time::Instant::now() >= next_tick {
            next_tick += period;
            if !bootstrapped && start.elapsed().as_secs_f32() > 2.0 {
                executive.request_cycle();
                bootstrapped = true;
            }
            executive.tick(start.elapsed().as_secs_f32());

            for cmd in cmd_tx.drain() {
                mqtt_cli
                    .publish(paho_mqtt::Message::new(
                        "/refleet/command",
                        serde_json::to_string(&cmd).unwrap(),
                        1,
                    ))
                    .unwrap();
            }
            for event in event_tx.drain() {
                println!(
                    "t={:.2} cycle #{} {:?}: {}",
                    start.elapsed().as_secs_f32(),
                    event.cycle,
                    event.strategy,
                    event.rationale
                );
                mqtt_cli
                    .publish(paho_mqtt::Message::new(
                        "/refleet/event",
                        serde_json::to_string(&event).unwrap(),
                        1,
                    ))
                    .unwrap();
            }
        }
    }
}
