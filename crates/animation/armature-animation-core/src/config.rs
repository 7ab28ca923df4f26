//! Core configuration for armature-animation-core.
//!
//! Every iteration cap and epsilon used by the numeric parts of the crate lives
//! here as a named constant, and the tunable ones are mirrored as [`Config`]
//! fields so hosts can override them from a JSON document.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Fixed simulation rate. One tick is `1 / DEFAULT_TICKS_PER_SECOND` seconds.
pub const DEFAULT_TICKS_PER_SECOND: f32 = 20.0;

/// Newton-Raphson iteration cap used to invert the bezier time curve.
pub const BEZIER_MAX_ITERATIONS: u32 = 20;
/// Convergence threshold for the bezier time curve inversion.
pub const BEZIER_EPSILON: f32 = 1e-5;

/// FABRIK iteration cap.
pub const IK_MAX_ITERATIONS: u32 = 20;
/// Distance from the chain end to the target under which FABRIK stops early.
pub const IK_TOLERANCE: f32 = 1e-3;
/// Segments shorter than this are not re-placed (no direction to follow).
pub const IK_MIN_SEGMENT_DISTANCE: f32 = 1e-5;
/// Perpendicular offset, as a fraction of chain length, applied to a straight
/// chain aimed along its own line.
pub const IK_BEND_HINT: f32 = 0.02;

/// Rotation change (degrees) a single bone may sweep between two baked samples.
pub const LOCAL_ROTATION_THRESHOLD_DEG: f32 = 60.0;
/// Rotation change (degrees) a bone plus its ancestors may sweep between samples.
pub const ANCESTOR_ROTATION_THRESHOLD_DEG: f32 = 45.0;

/// Tuning for the FABRIK solver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkConfig {
    pub max_iterations: u32,
    pub tolerance: f32,
    pub min_segment_distance: f32,
    pub bend_hint: f32,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iterations: IK_MAX_ITERATIONS,
            tolerance: IK_TOLERANCE,
            min_segment_distance: IK_MIN_SEGMENT_DISTANCE,
            bend_hint: IK_BEND_HINT,
        }
    }
}

/// Feature toggles resolved at runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Solve independent IK chains on the rayon pool (requires the `parallel` cargo feature).
    pub parallel_ik: bool,
}

/// Configuration for baking, playback timing and IK.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ticks_per_second: f32,

    /// Raw keyframe times are rounded to this quantum (seconds) before merging.
    pub time_subdivision: f32,
    /// Gaps wider than this (seconds) receive uniformly spaced extra samples.
    pub min_sample_interval: f32,
    /// Inserted times closer than this (seconds) to an existing time are skipped.
    pub min_insert_spacing: f32,

    pub local_rotation_threshold_deg: f32,
    pub ancestor_rotation_threshold_deg: f32,
    /// Intervals whose rotation ratio reaches this value get subdivided.
    pub smoothing_ratio_limit: f32,
    pub max_smoothing_passes: u32,

    /// Delta components within this distance of identity are stored as `None`.
    pub delta_epsilon: f32,
    /// Layer speeds are clamped to at least this value.
    pub min_speed: f32,

    pub ik: IkConfig,
    pub features: Features,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            time_subdivision: 0.01,
            min_sample_interval: 0.25,
            min_insert_spacing: 0.05,
            local_rotation_threshold_deg: LOCAL_ROTATION_THRESHOLD_DEG,
            ancestor_rotation_threshold_deg: ANCESTOR_ROTATION_THRESHOLD_DEG,
            smoothing_ratio_limit: 2.0,
            max_smoothing_passes: 4,
            delta_epsilon: 1e-4,
            min_speed: 1e-3,
            ik: IkConfig::default(),
            features: Features::default(),
        }
    }
}

impl Config {
    /// Parse a config document; omitted fields keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Length of one tick in seconds.
    #[inline]
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.ticks_per_second.max(f32::EPSILON)
    }

    /// Convert a duration in seconds to whole ticks (rounded, never negative).
    #[inline]
    pub fn seconds_to_ticks(&self, seconds: f32) -> u32 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        (seconds * self.ticks_per_second).round() as u32
    }

    /// Convert whole ticks to seconds.
    #[inline]
    pub fn ticks_to_seconds(&self, ticks: u32) -> f32 {
        ticks as f32 * self.tick_seconds()
    }
}
