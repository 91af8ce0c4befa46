//! A deliberately small car simulation, enough to exercise replication:
//! inputs turn into velocity, velocity integrates into the transform, and
//! every change is marked for the next snapshot.

use glam::{Quat, Vec3};
use tracing::warn;

use drift_components::{Transform, Velocity};
use drift_protocol::CarInput;
use drift_replication::tagger;
use drift_store::{Entity, EntityStore, StoreError};

/// Forward acceleration at full throttle, m/s².
const ACCELERATION: f32 = 12.0;
/// Braking deceleration, m/s².
const BRAKE_DECELERATION: f32 = 24.0;
/// Yaw rate at full steering lock, rad/s.
const STEER_RATE: f32 = 1.8;
/// Velocity decay per second when coasting.
const DRAG: f32 = 0.4;

/// Advance one car by `dt` seconds under `input`.
///
/// # Errors
///
/// Returns [`StoreError`] if the entity lost its car components.
pub fn step_car(
    store: &mut EntityStore,
    car: Entity,
    input: CarInput,
    dt: f32,
) -> Result<(), StoreError> {
    let transform = *store.get::<Transform>(car)?;
    let velocity = store.get_mut::<Velocity>(car)?;

    let forward = transform.rotation * Vec3::NEG_Z;
    let mut linear = velocity.linear;
    linear += forward * (input.throttle * ACCELERATION * dt);
    let speed = linear.length();
    if speed > 0.0 {
        let braking = if input.handbrake {
            BRAKE_DECELERATION * 2.0
        } else {
            input.brake * BRAKE_DECELERATION
        };
        let decel = (braking + DRAG * speed) * dt;
        linear *= (speed - decel).max(0.0) / speed;
    }
    velocity.linear = linear;
    velocity.angular = Vec3::new(0.0, -input.steering * STEER_RATE, 0.0);

    let angular = velocity.angular;
    let transform = store.get_mut::<Transform>(car)?;
    transform.translation += linear * dt;
    if angular.y.abs() > f32::EPSILON {
        transform.rotation = Quat::from_rotation_y(angular.y * dt) * transform.rotation;
    }

    tagger::mark_component_changed::<Transform>(store, car)?;
    tagger::mark_component_changed::<Velocity>(store, car)?;
    Ok(())
}

/// Step every car with its latest input sample, tolerating cars destroyed
/// mid-tick.
pub fn step_cars(store: &mut EntityStore, cars: &[(Entity, CarInput)], dt: f32) {
    for &(car, input) in cars {
        if !store.contains(car) {
            continue;
        }
        if let Err(error) = step_car(store, car, input, dt) {
            warn!(%car, %error, "skipping car step");
        }
    }
}
