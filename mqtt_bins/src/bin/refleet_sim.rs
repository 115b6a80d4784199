use refleet_sim::World;
use refleet_structs::report::CommandMsg;

fn main() {
    env_logger::init();

    let mqtt_opts = paho_mqtt::CreateOptionsBuilder::new()
        .server_uri("mqtt://localhost:1883")
        .finalize();
    let mqtt_cli = paho_mqtt::Client::new(mqtt_opts).unwrap();
    let conn_opts = paho_mqtt::ConnectOptionsBuilder::new()
        .keep_alive_interval(std::time::Duration::from_secs(20))
        .finalize();
    mqtt_cli.connect(conn_opts).unwrap();
    mqtt_cli.subscribe("/refleet/command", 1).unwrap();
    let mqtt_rx = mqtt_cli.start_consuming();

    let mut world = World::surveillance_grid();
    let mut last_updated = std::time::Instant::now();
    let update_frequency = std::time::Duration::from_millis(100);

    println!("refleet_sim main loop starting.");
    loop {
        let dt = last_updated.elapsed().as_secs_f32();
        last_updated = std::time::Instant::now();

        for msg in world.simulate(dt) {
            mqtt_cli
                .publish(paho_mqtt::Message::new(
                    "/refleet/telemetry",
                    serde_json::to_string(&msg).unwrap(),
                    1,
                ))
                .unwrap();
        }

        loop {
            let timeout = update_frequency.saturating_sub(last_updated.elapsed());
            match mqtt_rx.recv_timeout(timeout) {
                Ok(Some(msg)) => {
                    if msg.topic() == "/refleet/command" {
                        match serde_json::from_slice::<CommandMsg>(msg.payload_str().as_bytes()) {
                            Ok(cmd) => world.apply_command(&cmd),
                            Err(e) => println!("WARNING: malformed command {:?}", e),
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    if e.is_disconnected() {
                        panic!("mqtt disconnected");
                    } else if e.is_timeout() {
                        break;
                    }
                }
            }
        }
    }
}
