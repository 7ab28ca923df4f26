//! Baking API: merge independently timed raw channels into one resampled,
//! delta-encoded track per bone.
//!
//! All bones of an animation share one sample-time set:
//! 1. the rounded union of every keyframe time (plus the authored length),
//! 2. refined where any bone (alone, or summed with its ancestors) rotates
//!    too far between two neighbouring times,
//! 3. padded so no gap exceeds `Config::min_sample_interval`.
//!
//! Each bone's channels are then evaluated at every time and converted to
//! [`Delta`]s whose `time_delta` is relative to the previous entry.

use std::collections::BTreeSet;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::data::{CompositeSample, LoopMode, RawAnimation, RawBoneAnimation, SamplePoint};
use crate::error::Result;
use crate::interp::{find_index, sample_channel, InterpolationStrategy};
use crate::pose::{max_abs_component, Delta, Vec3};

/// Supplies bone ancestry to the rotation-smoothing pass.
///
/// Bones the hierarchy does not know are treated as roots.
pub trait BoneHierarchy {
    fn parent_of(&self, bone: &str) -> Option<String>;
}

/// Hierarchy in which every bone is a root.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatHierarchy;

impl BoneHierarchy for FlatHierarchy {
    fn parent_of(&self, _bone: &str) -> Option<String> {
        None
    }
}

/// Child name → parent name.
impl BoneHierarchy for HashMap<String, String> {
    fn parent_of(&self, bone: &str) -> Option<String> {
        self.get(bone).cloned()
    }
}

/// Immutable, delta-encoded keyframes of one bone. The first entry's
/// `time_delta` is absolute.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BakedTrack {
    pub name: String,
    pub deltas: Vec<Delta>,
}

impl BakedTrack {
    pub fn new(name: impl Into<String>, deltas: Vec<Delta>) -> Self {
        Self {
            name: name.into(),
            deltas,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Delta> {
        self.deltas.get(index)
    }

    /// Total playback time in seconds.
    pub fn duration(&self) -> f32 {
        self.deltas.iter().map(|d| d.time_delta).sum()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BakedAnimation {
    pub name: String,
    pub loop_mode: LoopMode,
    pub length: f32,
    /// Shared sample times (seconds) every track was evaluated at.
    pub sample_times: Vec<f32>,
    pub tracks: HashMap<String, Arc<BakedTrack>>,
}

impl BakedAnimation {
    pub fn track(&self, bone: &str) -> Option<&Arc<BakedTrack>> {
        self.tracks.get(bone)
    }

    pub fn bones(&self) -> impl Iterator<Item = &str> {
        self.tracks.keys().map(String::as_str)
    }
}

/// Bake a raw animation against `hierarchy` using the provided config.
pub fn bake_animation(
    raw: &RawAnimation,
    hierarchy: &dyn BoneHierarchy,
    cfg: &Config,
) -> Result<BakedAnimation> {
    raw.validate_basic()?;

    let quantum = if cfg.time_subdivision.is_finite() && cfg.time_subdivision > 0.0 {
        cfg.time_subdivision
    } else {
        0.01
    };

    let mut bones: Vec<(String, RawBoneAnimation)> = raw
        .bones
        .iter()
        .filter(|(_, b)| !b.is_empty())
        .map(|(name, b)| {
            let mut b = b.clone();
            for channel in [&mut b.position, &mut b.rotation, &mut b.scale] {
                for p in channel.iter_mut() {
                    p.time = round_to(p.time, quantum);
                }
            }
            b.normalize();
            (name.clone(), b)
        })
        .collect();
    bones.sort_by(|a, b| a.0.cmp(&b.0));

    let mut times = union_times(&bones, raw.length, quantum);
    smooth_rotations(&mut times, &bones, hierarchy, cfg, quantum);
    fill_min_density(&mut times, cfg, quantum);
    debug!(
        "bake '{}': {} bones, {} sample times",
        raw.name,
        bones.len(),
        times.len()
    );

    let mut tracks = HashMap::with_capacity(bones.len());
    for (name, bone) in &bones {
        let mut deltas = Vec::with_capacity(times.len());
        let mut prev_time: Option<f32> = None;
        for &t in &times {
            let sample = composite_at(bone, t);
            let time_delta = match prev_time {
                Some(p) => t - p,
                None => t,
            };
            prev_time = Some(t);
            deltas.push(Delta::from_offsets(
                time_delta,
                sample.position.vector,
                sample.rotation.vector,
                sample.scale.vector,
                cfg.delta_epsilon,
            ));
        }
        tracks.insert(name.clone(), Arc::new(BakedTrack::new(name.clone(), deltas)));
    }

    Ok(BakedAnimation {
        name: raw.name.clone(),
        loop_mode: raw.loop_mode,
        length: raw.length.max(times.last().copied().unwrap_or(0.0)),
        sample_times: times,
        tracks,
    })
}

/// Evaluate all three channels of `bone` at time `t`.
pub fn composite_at(bone: &RawBoneAnimation, t: f32) -> CompositeSample {
    let eval = |channel: &[SamplePoint]| {
        let strategy = channel
            .get(find_index(channel, t))
            .or_else(|| channel.last())
            .map(|p| p.strategy)
            .unwrap_or(InterpolationStrategy::Linear);
        SamplePoint::new(t, sample_channel(channel, t), strategy)
    };
    CompositeSample {
        position: eval(&bone.position),
        rotation: eval(&bone.rotation),
        scale: eval(&bone.scale),
    }
}

#[inline]
fn round_to(t: f32, quantum: f32) -> f32 {
    (t / quantum).round() * quantum
}

#[inline]
fn quantize(t: f32, quantum: f32) -> i64 {
    (t / quantum).round() as i64
}

fn union_times(bones: &[(String, RawBoneAnimation)], length: f32, quantum: f32) -> Vec<f32> {
    let mut keys = BTreeSet::new();
    for (_, bone) in bones {
        for channel in bone.channels() {
            keys.extend(channel.iter().map(|p| quantize(p.time, quantum)));
        }
    }
    if keys.is_empty() {
        return Vec::new();
    }
    if length > 0.0 {
        keys.insert(quantize(length, quantum));
    }
    keys.into_iter().map(|k| k as f32 * quantum).collect()
}

/// Insert `candidates` into the sorted `times`, skipping near-duplicates.
fn insert_times(times: &mut Vec<f32>, candidates: Vec<f32>, spacing: f32) -> usize {
    let mut inserted = 0;
    for t in candidates {
        let i = times.partition_point(|&x| x < t);
        let near_prev = i > 0 && t - times[i - 1] < spacing;
        let near_next = i < times.len() && times[i] - t < spacing;
        if near_prev || near_next {
            continue;
        }
        times.insert(i, t);
        inserted += 1;
    }
    inserted
}

/// Names of `bone` and its ancestors that carry rotation channels in this animation.
fn rotating_chain(
    bone: &str,
    hierarchy: &dyn BoneHierarchy,
    animated: &HashMap<&str, usize>,
) -> Vec<usize> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(bone.to_string());
    while let Some(name) = current {
        if !seen.insert(name.clone()) {
            break;
        }
        if let Some(&idx) = animated.get(name.as_str()) {
            chain.push(idx);
        }
        current = hierarchy.parent_of(&name);
    }
    chain
}

/// Largest rotation ratio any bone sweeps between `t0` and `t1`.
///
/// `rotations[b]` holds bone `b`'s rotation at the two ends.
fn rotation_ratio(
    rotations: &[(Vec3, Vec3)],
    chains: &[Vec<usize>],
    cfg: &Config,
) -> f32 {
    let local_thr = cfg.local_rotation_threshold_deg.max(f32::EPSILON);
    let ancestor_thr = cfg.ancestor_rotation_threshold_deg.max(f32::EPSILON);
    let mut ratio = 0.0f32;
    for (b, chain) in chains.iter().enumerate() {
        let (r0, r1) = &rotations[b];
        let local = max_abs_component(&(r1 - r0));
        let mut accumulated = Vec3::zeros();
        for &a in chain {
            let (a0, a1) = &rotations[a];
            accumulated += (a1 - a0).abs();
        }
        let inclusive = max_abs_component(&accumulated);
        ratio = ratio.max((local / local_thr).max(inclusive / ancestor_thr));
    }
    ratio
}

/// Subdivide intervals where rotation sweeps exceed the configured ratio.
pub(crate) fn smooth_rotations(
    times: &mut Vec<f32>,
    bones: &[(String, RawBoneAnimation)],
    hierarchy: &dyn BoneHierarchy,
    cfg: &Config,
    quantum: f32,
) {
    let animated: HashMap<&str, usize> = bones
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (name.as_str(), i))
        .collect();
    let chains: Vec<Vec<usize>> = bones
        .iter()
        .map(|(name, _)| rotating_chain(name, hierarchy, &animated))
        .collect();

    for pass in 0..cfg.max_smoothing_passes.max(1) {
        let rotations_at: Vec<Vec<Vec3>> = bones
            .iter()
            .map(|(_, b)| times.iter().map(|&t| sample_channel(&b.rotation, t)).collect())
            .collect();

        let mut candidates = Vec::new();
        for k in 1..times.len() {
            let (t0, t1) = (times[k - 1], times[k]);
            let ends: Vec<(Vec3, Vec3)> = rotations_at
                .iter()
                .map(|r| (r[k - 1], r[k]))
                .collect();
            let ratio = rotation_ratio(&ends, &chains, cfg);
            if !ratio.is_finite() || ratio < cfg.smoothing_ratio_limit {
                continue;
            }
            // Inserts closer together than the spacing guard would be discarded anyway.
            let count = (ratio.floor() as usize).min(max_inserts(t1 - t0, cfg, quantum));
            if count == 0 {
                continue;
            }
            let step = (t1 - t0) / (count + 1) as f32;
            trace!("smooth: ratio {ratio:.2} in ({t0}, {t1}) → {count} inserts");
            candidates.extend((1..=count).map(|j| round_to(t0 + step * j as f32, quantum)));
        }
        let inserted = insert_times(times, candidates, cfg.min_insert_spacing);
        trace!("smooth pass {pass}: {inserted} times inserted");
        if inserted == 0 {
            break;
        }
    }
}

/// Pad gaps wider than `min_sample_interval` with uniformly spaced times.
pub(crate) fn fill_min_density(times: &mut Vec<f32>, cfg: &Config, quantum: f32) {
    let interval = cfg.min_sample_interval;
    if !interval.is_finite() || interval <= 0.0 {
        return;
    }
    let interval = interval.max(insert_spacing(cfg, quantum));
    let mut candidates = Vec::new();
    for pair in times.windows(2) {
        let (t0, t1) = (pair[0], pair[1]);
        if t1 - t0 <= interval {
            continue;
        }
        let count = ((t1 - t0) / interval).ceil() as usize - 1;
        let step = (t1 - t0) / (count + 1) as f32;
        candidates.extend((1..=count).map(|k| round_to(t0 + step * k as f32, quantum)));
    }
    insert_times(times, candidates, cfg.min_insert_spacing);
}

/// Smallest gap an inserted time may leave to its neighbours.
fn insert_spacing(cfg: &Config, quantum: f32) -> f32 {
    if cfg.min_insert_spacing.is_finite() && cfg.min_insert_spacing > quantum {
        cfg.min_insert_spacing
    } else {
        quantum
    }
}

/// Upper bound on the times that fit strictly inside a gap of `gap` seconds.
fn max_inserts(gap: f32, cfg: &Config, quantum: f32) -> usize {
    let fit = (gap / insert_spacing(cfg, quantum)).floor();
    if fit.is_finite() && fit > 1.0 {
        fit as usize - 1
    } else {
        0
    }
}

/// Export baked data as serde_json::Value (stable schema for FFI/serialization).
pub fn export_baked_json(baked: &BakedAnimation) -> serde_json::Value {
    serde_json::to_value(baked).unwrap_or(serde_json::Value::Null)
}
