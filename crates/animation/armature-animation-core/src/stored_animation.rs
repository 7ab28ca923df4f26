use hashbrown::HashMap;
use serde::Deserialize;

use crate::data::{LoopMode, RawAnimation, RawBoneAnimation, SamplePoint};
use crate::error::{AnimationError, Result};
use crate::interp::{BezierHandle, InterpolationStrategy};
use crate::pose::{Pose, Vec3};
use crate::skeleton::BoneDef;

/// Public API: parse a raw animation JSON document into a [`RawAnimation`].
///
/// Notes:
/// - Times and length are in seconds.
/// - Rotation values are Euler degrees.
/// - Scale values are authored as multipliers (1 = unchanged) and stored as
///   offsets (`value - 1`), so a zero vector is the identity for every channel.
/// - Missing `interpolation` means linear; unknown names are rejected.
pub fn parse_raw_animation_json(s: &str) -> Result<RawAnimation> {
    let doc: StoredAnimation = serde_json::from_str(s)?;

    let mut bones = HashMap::with_capacity(doc.bones.len());
    for (bone, channels) in doc.bones {
        let mut raw = RawBoneAnimation {
            position: to_samples(&bone, &channels.position, |v| v)?,
            rotation: to_samples(&bone, &channels.rotation, |v| v)?,
            scale: to_samples(&bone, &channels.scale, |v| v - Vec3::repeat(1.0))?,
        };
        raw.normalize();
        bones.insert(bone, raw);
    }

    let raw = RawAnimation {
        name: doc.name,
        loop_mode: doc.loop_mode,
        length: doc.length,
        bones,
    };
    raw.validate_basic()?;
    Ok(raw)
}

/// Public API: parse a skeleton JSON document (`{ "bones": [...] }`) into bone definitions.
pub fn parse_skeleton_json(s: &str) -> Result<Vec<BoneDef>> {
    let doc: StoredSkeleton = serde_json::from_str(s)?;
    Ok(doc
        .bones
        .into_iter()
        .map(|b| BoneDef {
            name: b.name,
            parent: b.parent,
            pose: Pose {
                position: Vec3::from(b.pose.position),
                rotation: Vec3::from(b.pose.rotation),
                scale: Vec3::from(b.pose.scale),
            },
        })
        .collect())
}

fn to_samples(
    bone: &str,
    keyframes: &[SaKeyframe],
    convert: impl Fn(Vec3) -> Vec3,
) -> Result<Vec<SamplePoint>> {
    keyframes
        .iter()
        .map(|kf| {
            Ok(SamplePoint::new(
                kf.time,
                convert(Vec3::from(kf.value)),
                to_strategy(bone, kf)?,
            ))
        })
        .collect()
}

fn to_strategy(bone: &str, kf: &SaKeyframe) -> Result<InterpolationStrategy> {
    let name = kf
        .interpolation
        .as_deref()
        .unwrap_or("linear")
        .to_ascii_lowercase();
    match name.as_str() {
        "linear" => Ok(InterpolationStrategy::Linear),
        "step" => Ok(InterpolationStrategy::Step),
        "catmullrom" | "catmull_rom" => Ok(InterpolationStrategy::CatmullRom),
        "bezier" => Ok(InterpolationStrategy::Bezier {
            left: handle(
                kf.bezier_left_time,
                kf.bezier_left_value,
                BezierHandle::default_left(),
            ),
            right: handle(
                kf.bezier_right_time,
                kf.bezier_right_value,
                BezierHandle::default_right(),
            ),
        }),
        other => Err(AnimationError::InvalidAnimation {
            reason: format!(
                "unknown interpolation '{other}' on bone '{bone}' at t={}",
                kf.time
            ),
        }),
    }
}

fn handle(
    time: Option<[f32; 3]>,
    value: Option<[f32; 3]>,
    fallback: BezierHandle,
) -> Option<BezierHandle> {
    if time.is_none() && value.is_none() {
        return None;
    }
    Some(BezierHandle {
        time: time.map(Vec3::from).unwrap_or(fallback.time),
        value: value.map(Vec3::from).unwrap_or(fallback.value),
    })
}

// ----- JSON schema (serde) -----

#[derive(Debug, Deserialize)]
struct StoredAnimation {
    pub name: String,
    #[serde(rename = "loop", default)]
    pub loop_mode: LoopMode,
    #[serde(default)]
    pub length: f32,
    #[serde(default)]
    pub bones: HashMap<String, SaBone>,
}

#[derive(Debug, Default, Deserialize)]
struct SaBone {
    #[serde(default)]
    pub position: Vec<SaKeyframe>,
    #[serde(default)]
    pub rotation: Vec<SaKeyframe>,
    #[serde(default)]
    pub scale: Vec<SaKeyframe>,
}

#[derive(Debug, Deserialize)]
struct SaKeyframe {
    pub time: f32,
    pub value: [f32; 3],
    #[serde(default)]
    pub interpolation: Option<String>,
    #[serde(default)]
    pub bezier_left_time: Option<[f32; 3]>,
    #[serde(default)]
    pub bezier_left_value: Option<[f32; 3]>,
    #[serde(default)]
    pub bezier_right_time: Option<[f32; 3]>,
    #[serde(default)]
    pub bezier_right_value: Option<[f32; 3]>,
}

#[derive(Debug, Deserialize)]
struct StoredSkeleton {
    pub bones: Vec<SaBoneDef>,
}

#[derive(Debug, Deserialize)]
struct SaBoneDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub pose: SaPose,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SaPose {
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for SaPose {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}
