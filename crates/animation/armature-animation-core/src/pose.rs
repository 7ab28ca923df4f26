//! Pose, delta and transform value types.
//!
//! Rotations are kept twice: as accumulated Euler degrees ("raw rotation") so
//! additive deltas compose without order-dependent drift, and as a quaternion
//! rebuilt from that raw value whenever it is needed for application. Only the
//! parent→child composition multiplies quaternions.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

pub type Vec3 = Vector3<f32>;
pub type Quat = UnitQuaternion<f32>;

/// Build a quaternion from Euler angles in degrees (x = roll, y = pitch, z = yaw).
#[inline]
pub fn euler_to_quat(degrees: &Vec3) -> Quat {
    UnitQuaternion::from_euler_angles(
        degrees.x.to_radians(),
        degrees.y.to_radians(),
        degrees.z.to_radians(),
    )
}

/// Largest absolute component of a vector.
#[inline]
pub fn max_abs_component(v: &Vec3) -> f32 {
    v.x.abs().max(v.y.abs()).max(v.z.abs())
}

/// A nullable-field change to a reference pose.
///
/// `None` means "no change" and is not the same as a zero vector for scale:
/// a scale delta `s` multiplies the reference scale by `1 + s`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Seconds since the previous delta in the same track.
    pub time_delta: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    /// Euler degrees added to the reference raw rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec3>,
}

impl Delta {
    /// A delta that changes nothing, reached after `time_delta` seconds.
    pub fn empty(time_delta: f32) -> Self {
        Self {
            time_delta,
            ..Self::default()
        }
    }

    /// Build a delta from channel offsets, nulling components within `epsilon` of identity.
    pub fn from_offsets(
        time_delta: f32,
        position: Vec3,
        rotation: Vec3,
        scale: Vec3,
        epsilon: f32,
    ) -> Self {
        let keep = |v: Vec3| (max_abs_component(&v) > epsilon).then_some(v);
        Self {
            time_delta,
            position: keep(position),
            rotation: keep(rotation),
            scale: keep(scale),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.rotation.is_none() && self.scale.is_none()
    }

    /// Same values, different time delta.
    #[inline]
    pub fn with_time_delta(&self, time_delta: f32) -> Self {
        Self {
            time_delta,
            ..self.clone()
        }
    }
}

/// Static reference pose of a bone, relative to its parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    #[serde(default = "zero")]
    pub position: Vec3,
    /// Raw Euler rotation in degrees.
    #[serde(default = "zero")]
    pub rotation: Vec3,
    #[serde(default = "one")]
    pub scale: Vec3,
}

fn zero() -> Vec3 {
    Vec3::zeros()
}

fn one() -> Vec3 {
    Vec3::repeat(1.0)
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            position: zero(),
            rotation: zero(),
            scale: one(),
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// Apply a delta, skipping `None` fields.
    pub fn plus(&self, delta: Option<&Delta>) -> Pose {
        let Some(delta) = delta else {
            return self.clone();
        };
        let mut out = self.clone();
        if let Some(p) = &delta.position {
            out.position += p;
        }
        if let Some(r) = &delta.rotation {
            out.rotation += r;
        }
        if let Some(s) = &delta.scale {
            out.scale = out.scale.component_mul(&(one() + s));
        }
        out
    }

    #[inline]
    pub fn quaternion(&self) -> Quat {
        euler_to_quat(&self.rotation)
    }
}

/// A resolved transform: parent-relative for the local pose, model-relative once composed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Accumulated Euler degrees along the chain (informational, additive).
    pub raw_rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            position: zero(),
            rotation: Quat::identity(),
            scale: one(),
            raw_rotation: zero(),
        }
    }

    pub fn from_pose(pose: &Pose) -> Self {
        Self {
            position: pose.position,
            rotation: pose.quaternion(),
            scale: pose.scale,
            raw_rotation: pose.rotation,
        }
    }

    /// Express `local` in the space `self` is expressed in.
    pub fn compose(&self, local: &Transform) -> Transform {
        Transform {
            position: self.position
                + (self.rotation * local.position).component_mul(&self.scale),
            rotation: self.rotation * local.rotation,
            scale: self.scale.component_mul(&local.scale),
            raw_rotation: self.raw_rotation + local.raw_rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scale_delta_is_multiplicative_around_one() {
        let pose = Pose::identity();
        let delta = Delta {
            scale: Some(Vec3::new(0.5, 0.0, 0.0)),
            ..Delta::empty(0.0)
        };
        let out = pose.plus(Some(&delta));
        assert_relative_eq!(out.scale, Vec3::new(1.5, 1.0, 1.0));
    }

    #[test]
    fn null_fields_leave_pose_untouched() {
        let pose = Pose {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec3::new(0.0, 90.0, 0.0),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };
        assert_eq!(pose.plus(Some(&Delta::empty(1.0))), pose);
        assert_eq!(pose.plus(None), pose);
    }

    #[test]
    fn from_offsets_nulls_identity_components() {
        let d = Delta::from_offsets(
            0.1,
            Vec3::new(0.0, 0.00001, 0.0),
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::zeros(),
            1e-4,
        );
        assert!(d.position.is_none());
        assert_eq!(d.rotation, Some(Vec3::new(0.0, 10.0, 0.0)));
        assert!(d.scale.is_none());
    }

    #[test]
    fn compose_rotates_then_scales_child_offset() {
        let parent = Transform {
            position: Vec3::new(1.0, 0.0, 0.0),
            rotation: euler_to_quat(&Vec3::new(0.0, 0.0, 90.0)),
            scale: Vec3::new(2.0, 2.0, 2.0),
            raw_rotation: Vec3::new(0.0, 0.0, 90.0),
        };
        let child = Transform::from_pose(&Pose::from_position(Vec3::new(1.0, 0.0, 0.0)));
        let out = parent.compose(&child);
        assert_relative_eq!(out.position, Vec3::new(1.0, 2.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(out.scale, Vec3::new(2.0, 2.0, 2.0));
        assert_relative_eq!(out.raw_rotation, Vec3::new(0.0, 0.0, 90.0));
    }
}
