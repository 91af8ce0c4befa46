//! # drift_components
//!
//! Concrete replicated components for the car game. These are the payloads
//! that actually cross the wire: a spatial transform, a velocity, and a
//! display label — together they exercise fixed-width, vector and string
//! encodings.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use drift_store::Component;

/// World-space placement of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position in world space.
    pub translation: Vec3,
    /// Orientation.
    pub rotation: Quat,
}

impl Transform {
    /// The identity transform at the world origin.
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// A transform at `translation` with identity rotation.
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Component for Transform {
    fn type_name() -> &'static str {
        "Transform"
    }
}

/// Linear and angular velocity of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    /// Linear velocity in world units per second.
    pub linear: Vec3,
    /// Angular velocity in radians per second, per axis.
    pub angular: Vec3,
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

/// Display name attached to an entity (e.g. the driver name over a car).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Label(pub String);

impl Component for Label {
    fn type_name() -> &'static str {
        "Label"
    }
}

#[cfg(test)]
mod tests {
    use drift_store::ComponentTypeId;

    use super::*;

    #[test]
    fn test_type_ids_are_distinct() {
        let ids = [
            ComponentTypeId::of::<Transform>(),
            ComponentTypeId::of::<Velocity>(),
            ComponentTypeId::of::<Label>(),
        ];
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[0], ids[2]);
        assert_ne!(ids[1], ids[2]);
    }

    #[test]
    fn test_transform_roundtrip() {
        let transform = Transform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.5),
        };
        let bytes = rmp_serde::to_vec_named(&transform).unwrap();
        let restored: Transform = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(transform, restored);
    }

    #[test]
    fn test_label_roundtrip() {
        let label = Label("midnight-driver".to_string());
        let bytes = rmp_serde::to_vec_named(&label).unwrap();
        let restored: Label = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(label, restored);
    }
}
