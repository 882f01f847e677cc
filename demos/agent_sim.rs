//! A miniature agent simulation driving the broker end to end.
//!
//! Three worker threads play simulation processes: each tick they insert
//! their agent's status row and nudge its energy, all through the
//! producer API. A control listener prints any pause/continue traffic.
//! After the last tick the main thread queries the final world state and
//! shuts the broker down.
//!
//! Run with: `cargo run --example agent_sim`

use simbroker::{
    Broker, BrokerConfig, ControlListener, MemoryStore, Producer,
};
use std::thread;
use std::time::Duration;

const TICKS: i64 = 10;
const AGENTS: i64 = 3;

const COLUMNS: [&str; 7] = ["tick", "aid", "role", "state", "energy", "x_pos", "y_pos"];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("simbroker=info")),
        )
        .init();

    let config = BrokerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        expected_queue_len: 50,
        ..Default::default()
    };
    let mut broker = Broker::start(config, MemoryStore::new()).expect("failed to start broker");
    let broker_addr = broker.local_addr();
    println!("broker listening on {broker_addr}");

    let listener =
        ControlListener::register("127.0.0.1:0", broker_addr).expect("failed to register listener");

    let workers: Vec<_> = (1..=AGENTS)
        .map(|aid| {
            thread::spawn(move || {
                let producer = Producer::bind("127.0.0.1:0", broker_addr)
                    .expect("failed to bind producer");
                // Roles cycle human / doctor / zombie like the source
                // simulation's bit flags.
                let role = match aid % 3 {
                    1 => 1, // human
                    2 => 2, // doctor
                    _ => 4, // zombie
                };
                let mut energy = 100;
                for tick in 1..=TICKS {
                    let x = (aid * tick % 7) as f32 / 7.0;
                    let y = (aid + tick) as f32 / 10.0;
                    producer
                        .insert(
                            &COLUMNS,
                            &[
                                &tick.to_string(),
                                &aid.to_string(),
                                &role.to_string(),
                                "1",
                                &energy.to_string(),
                                &x.to_string(),
                                &y.to_string(),
                            ],
                        )
                        .expect("insert failed");
                    energy -= 3;
                    thread::sleep(Duration::from_millis(5));
                }
                // Zombies drain everyone they met on the final tick.
                if role == 4 {
                    producer
                        .update(
                            Some(&format!("tick={TICKS} and aid!={aid}")),
                            &[("energy", &(energy - 10).to_string())],
                        )
                        .expect("update failed");
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked");
    }

    while let Some(message) = listener.try_recv() {
        println!("control message: {message}");
    }

    let producer = Producer::bind("127.0.0.1:0", broker_addr).expect("failed to bind producer");
    producer
        .select(Some(&format!("tick={TICKS}")), &["*"])
        .expect("select failed");
    println!("final tick:");
    for row in producer
        .recv_rows(Duration::from_millis(500))
        .expect("receive failed")
    {
        println!(
            "  {}",
            row.attributes
                .iter()
                .zip(&row.values)
                .map(|(a, v)| format!("{a}={v}"))
                .collect::<Vec<_>>()
                .join(" ")
        );
    }

    broker.stop().expect("failed to stop broker");
    listener.join();
    println!("broker stopped");
}
