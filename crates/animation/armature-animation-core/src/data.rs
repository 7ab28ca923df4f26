//! Raw (pre-bake) animation data model.

use std::cmp::Ordering;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{AnimationError, Result};
use crate::interp::InterpolationStrategy;
use crate::pose::Vec3;

/// One channel sample. Equality and ordering look at `time` only.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SamplePoint {
    pub vector: Vec3,
    pub time: f32,
    #[serde(default)]
    pub strategy: InterpolationStrategy,
}

impl SamplePoint {
    pub fn new(time: f32, vector: Vec3, strategy: InterpolationStrategy) -> Self {
        Self {
            vector,
            time,
            strategy,
        }
    }

    pub fn linear(time: f32, vector: Vec3) -> Self {
        Self::new(time, vector, InterpolationStrategy::Linear)
    }
}

impl PartialEq for SamplePoint {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time
    }
}

impl PartialOrd for SamplePoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.time.partial_cmp(&other.time)
    }
}

/// One bone's combined channel values at one output time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositeSample {
    pub position: SamplePoint,
    pub rotation: SamplePoint,
    pub scale: SamplePoint,
}

/// What happens when a cursor runs past its last keyframe.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    Once,
    Loop,
    /// Keep yielding the final keyframe until stopped.
    Hold,
}

/// Independently timed channels of one bone.
///
/// Scale samples are stored as offsets from identity (`multiplier - 1`) so that a
/// zero vector means "no change" for every channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBoneAnimation {
    #[serde(default)]
    pub position: Vec<SamplePoint>,
    #[serde(default)]
    pub rotation: Vec<SamplePoint>,
    #[serde(default)]
    pub scale: Vec<SamplePoint>,
}

impl RawBoneAnimation {
    /// Sort each channel by time and drop duplicate times (the last sample wins).
    pub fn normalize(&mut self) {
        for channel in [&mut self.position, &mut self.rotation, &mut self.scale] {
            normalize_channel(channel);
        }
    }

    pub fn channels(&self) -> [&[SamplePoint]; 3] {
        [&self.position, &self.rotation, &self.scale]
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty() && self.rotation.is_empty() && self.scale.is_empty()
    }
}

fn normalize_channel(channel: &mut Vec<SamplePoint>) {
    channel.sort_by(|a, b| a.time.total_cmp(&b.time));
    let mut out: Vec<SamplePoint> = Vec::with_capacity(channel.len());
    for p in channel.drain(..) {
        match out.last_mut() {
            Some(last) if *last == p => *last = p,
            _ => out.push(p),
        }
    }
    *channel = out;
}

/// A named animation with per-bone raw channels, ready for baking.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAnimation {
    pub name: String,
    #[serde(default)]
    pub loop_mode: LoopMode,
    /// Authored length in seconds; baked tracks are padded to reach it.
    #[serde(default)]
    pub length: f32,
    pub bones: HashMap<String, RawBoneAnimation>,
}

impl RawAnimation {
    /// Validate basic invariants (finite, non-negative times and length).
    pub fn validate_basic(&self) -> Result<()> {
        if !self.length.is_finite() || self.length < 0.0 {
            return Err(AnimationError::InvalidAnimation {
                reason: format!("animation '{}' has invalid length {}", self.name, self.length),
            });
        }
        for (bone, channels) in &self.bones {
            for channel in channels.channels() {
                for p in channel {
                    if !p.time.is_finite() || p.time < 0.0 {
                        return Err(AnimationError::InvalidAnimation {
                            reason: format!(
                                "keyframe time {} on bone '{}' must be finite and >= 0",
                                p.time, bone
                            ),
                        });
                    }
                    if !(p.vector.x.is_finite() && p.vector.y.is_finite() && p.vector.z.is_finite())
                    {
                        return Err(AnimationError::InvalidAnimation {
                            reason: format!("non-finite keyframe value on bone '{bone}'"),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
