//! # drift_server — demo game server
//!
//! Runs the replication core end to end inside one process: an
//! authoritative car world on one side of an in-process transport, a
//! client mirror on the other. The client joins, gets a car, drives a lap
//! of throttle and steering inputs, and the log shows snapshots flowing
//! and the mirror tracking the authoritative store.
//!
//! ## Tick sequence
//!
//! 1. Drain transport events into both endpoints.
//! 2. Apply the latest input sample per car.
//! 3. Run the replication pass.
//! 4. Sleep off the remainder of the tick.

mod sim;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use glam::Vec3;
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use drift_components::{Label, Transform, Velocity};
use drift_protocol::{CarInput, MemoryNetwork, MemoryTransport, PeerId};
use drift_replication::{
    ClientEvent, ReplicationClient, ReplicationServer, ServerEvent, pump, tagger,
};
use drift_store::{Entity, EntityStore};

const SERVER_PEER: PeerId = PeerId(1);
const CLIENT_PEER: PeerId = PeerId(2);

/// Configuration for the demo tick loop.
#[derive(Debug, Clone)]
struct TickConfig {
    /// Target ticks per second.
    tick_rate: f64,
    /// Number of ticks to run before shutting down.
    max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 600,
        }
    }
}

fn register_client_components(client: &mut ReplicationClient<MemoryTransport>) {
    client.register_component::<Transform>();
    client.register_component::<Velocity>();
    client.register_component::<Label>();
}

fn spawn_car(store: &mut EntityStore, name: &str) -> Result<Entity> {
    let car = store.create()?;
    store.attach(car, Transform::from_translation(Vec3::ZERO))?;
    store.attach(
        car,
        Velocity {
            linear: Vec3::ZERO,
            angular: Vec3::ZERO,
        },
    )?;
    store.attach(car, Label(name.to_string()))?;
    tagger::mark_replicated(store, car)?;
    tagger::mark_initialized(store, car)?;
    info!(%car, name, "spawned car");
    Ok(car)
}

/// A canned driving line: accelerate, sweep right, then brake.
fn demo_input(tick: u64) -> CarInput {
    match tick {
        0..=199 => CarInput {
            throttle: 1.0,
            brake: 0.0,
            steering: 0.0,
            handbrake: false,
        },
        200..=399 => CarInput {
            throttle: 0.6,
            brake: 0.0,
            steering: 0.4,
            handbrake: false,
        },
        _ => CarInput {
            throttle: 0.0,
            brake: 1.0,
            steering: 0.0,
            handbrake: false,
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("drift_server=info".parse()?))
        .init();

    info!("drift demo server starting");

    let config = TickConfig::default();
    let dt = 1.0 / config.tick_rate as f32;
    let tick_duration = Duration::from_secs_f64(1.0 / config.tick_rate);

    let network = MemoryNetwork::new();
    let (server_transport, mut server_queue) = network.endpoint(SERVER_PEER);
    let (client_transport, mut client_queue) = network.endpoint(CLIENT_PEER);

    let mut store = EntityStore::new();
    let mut server = ReplicationServer::new(server_transport);
    let mut client = ReplicationClient::new(client_transport, "demo-driver");
    register_client_components(&mut client);

    network.connect(SERVER_PEER, CLIENT_PEER)?;

    // Latest input sample per peer's car, latest-wins.
    let mut car_by_peer: HashMap<PeerId, Entity> = HashMap::new();
    let mut latest_input: HashMap<Entity, CarInput> = HashMap::new();

    let mut interval = time::interval(tick_duration);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    for tick in 0..config.max_ticks {
        interval.tick().await;
        let started = Instant::now();

        pump(&mut server, &mut server_queue);
        pump(&mut client, &mut client_queue);

        for event in server.poll_events() {
            match event {
                ServerEvent::PeerJoined { peer, name } => {
                    let car = spawn_car(&mut store, &name)?;
                    car_by_peer.insert(peer, car);
                    server.assign_car(peer, car)?;
                    server.broadcast_chat(&format!("{name} joined"));
                }
                ServerEvent::PeerLeft { peer } => {
                    if let Some(car) = car_by_peer.remove(&peer) {
                        latest_input.remove(&car);
                        if store.contains(car) {
                            store.destroy(car)?;
                        }
                    }
                }
                ServerEvent::InputReceived { peer, input, .. } => {
                    if let Some(&car) = car_by_peer.get(&peer) {
                        latest_input.insert(car, input);
                    }
                }
                ServerEvent::ChatReceived { peer, text } => {
                    info!(%peer, text, "chat");
                }
            }
        }

        for event in client.poll_events() {
            match event {
                ClientEvent::CarAssigned(car) => info!(%car, "client got its car"),
                ClientEvent::ChatReceived(text) => info!(text, "client chat"),
                ClientEvent::FullSyncApplied { sequence } => {
                    info!(sequence, "client applied full sync");
                }
                _ => {}
            }
        }

        let samples: Vec<(Entity, CarInput)> =
            latest_input.iter().map(|(&car, &input)| (car, input)).collect();
        sim::step_cars(&mut store, &samples, dt);

        server.replicate(&mut store);
        client.send_input(tick, demo_input(tick));

        if tick % 60 == 0
            && let Some(car) = client.car_entity()
            && let Ok(mirror) = client.store().get::<Transform>(car)
        {
            info!(
                tick,
                position = ?mirror.translation,
                "mirror car position"
            );
        }

        let elapsed = started.elapsed();
        if elapsed > tick_duration {
            warn!(tick, ?elapsed, "tick overran its budget");
        }
    }

    // Final consistency check between the two sides.
    if let Some(car) = client.car_entity() {
        let authoritative = store.get::<Transform>(car)?.translation;
        let mirrored = client.store().get::<Transform>(car)?.translation;
        info!(?authoritative, ?mirrored, "final car positions");
    }

    info!("drift demo server shut down");
    Ok(())
}
