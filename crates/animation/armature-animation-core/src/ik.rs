//! FABRIK inverse kinematics over bone chains.
//!
//! The solver itself is pure: it takes model-space joint positions and a
//! target and returns new positions plus, for every segment, the world-space
//! rotation that swings the old segment direction onto the new one. Applying
//! those rotations to the skeleton is the caller's job.

use std::f32::consts::PI;

use nalgebra::Unit;
use serde::{Deserialize, Serialize};

use crate::config::IkConfig;
use crate::ids::BoneId;
use crate::pose::{Quat, Vec3};

/// A path of bones from a chain source down to its end bone, with segment
/// lengths captured once at registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IkChain {
    bones: Vec<BoneId>,
    lengths: Vec<f32>,
}

impl IkChain {
    /// Build a chain from its bones and their current positions.
    /// Returns `None` for chains with fewer than two bones.
    pub fn from_positions(bones: Vec<BoneId>, positions: &[Vec3]) -> Option<Self> {
        if bones.len() < 2 || positions.len() != bones.len() {
            return None;
        }
        let lengths = positions.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
        Some(Self { bones, lengths })
    }

    #[inline]
    pub fn bones(&self) -> &[BoneId] {
        &self.bones
    }

    #[inline]
    pub fn lengths(&self) -> &[f32] {
        &self.lengths
    }

    #[inline]
    pub fn source(&self) -> BoneId {
        self.bones[0]
    }

    #[inline]
    pub fn end(&self) -> BoneId {
        self.bones[self.bones.len() - 1]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn total_length(&self) -> f32 {
        self.lengths.iter().sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IkSolution {
    /// Solved model-space joint positions, source first.
    pub positions: Vec<Vec3>,
    /// World-space rotation applied to each segment's start bone (one per segment).
    pub rotations: Vec<Quat>,
    pub iterations: u32,
    pub converged: bool,
}

impl IkSolution {
    fn unchanged(positions: &[Vec3]) -> Self {
        Self {
            positions: positions.to_vec(),
            rotations: vec![Quat::identity(); positions.len().saturating_sub(1)],
            iterations: 0,
            converged: false,
        }
    }
}

/// One chain to solve, with its current joint positions and target.
#[derive(Clone, Debug)]
pub struct IkJob<'a> {
    pub chain: &'a IkChain,
    pub positions: Vec<Vec3>,
    pub target: Vec3,
}

/// Solve `chain` toward `target`, starting from `positions`.
pub fn fabrik(chain: &IkChain, positions: &[Vec3], target: Vec3, cfg: &IkConfig) -> IkSolution {
    let n = chain.len();
    if n < 2 || positions.len() != n {
        return IkSolution::unchanged(positions);
    }
    let lengths = chain.lengths();
    let mut p = positions.to_vec();
    let root = p[0];
    let last = n - 1;
    let total = chain.total_length();
    let to_target = target - root;
    let mut iterations = 0;

    if to_target.norm() >= total {
        // Out of reach: stretch straight toward the target.
        if let Some(dir) = to_target.try_normalize(cfg.min_segment_distance) {
            for i in 1..n {
                p[i] = p[i - 1] + dir * lengths[i - 1];
            }
        }
    } else {
        bend_if_collinear(&mut p, &target, total, cfg.bend_hint);
        while iterations < cfg.max_iterations && (p[last] - target).norm() > cfg.tolerance {
            p[last] = target;
            for i in (0..last).rev() {
                p[i] = place(p[i], p[i + 1], lengths[i], cfg.min_segment_distance);
            }
            p[0] = root;
            for i in 1..n {
                p[i] = place(p[i], p[i - 1], lengths[i - 1], cfg.min_segment_distance);
            }
            iterations += 1;
        }
    }

    let converged = (p[last] - target).norm() <= cfg.tolerance;
    let rotations = (0..last)
        .map(|i| {
            segment_rotation(
                &(positions[i + 1] - positions[i]),
                &(p[i + 1] - p[i]),
                cfg.min_segment_distance,
            )
        })
        .collect();
    IkSolution {
        positions: p,
        rotations,
        iterations,
        converged,
    }
}

/// Solve independent chains, on the rayon pool when `parallel` is set and the
/// `parallel` feature is compiled in.
pub fn solve_batch(jobs: &[IkJob<'_>], cfg: &IkConfig, parallel: bool) -> Vec<IkSolution> {
    #[cfg(feature = "parallel")]
    if parallel {
        use rayon::prelude::*;
        return jobs
            .par_iter()
            .map(|job| fabrik(job.chain, &job.positions, job.target, cfg))
            .collect();
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;
    jobs.iter()
        .map(|job| fabrik(job.chain, &job.positions, job.target, cfg))
        .collect()
}

/// Move `moving` onto the line toward `anchor`, `length` away from it.
#[inline]
fn place(moving: Vec3, anchor: Vec3, length: f32, min_distance: f32) -> Vec3 {
    let offset = moving - anchor;
    let distance = offset.norm();
    if distance < min_distance {
        return moving;
    }
    anchor + offset * (length / distance)
}

fn any_perpendicular(v: &Vec3) -> Vec3 {
    let c = v.cross(&Vec3::x());
    if c.norm_squared() > 1e-8 {
        c
    } else {
        v.cross(&Vec3::y())
    }
}

/// A straight chain aimed along its own line is a FABRIK fixed point; push the
/// interior joints sideways so the passes can fold it.
fn bend_if_collinear(p: &mut [Vec3], target: &Vec3, total: f32, hint: f32) {
    if p.len() < 3 || hint <= 0.0 {
        return;
    }
    let root = p[0];
    let Some(axis) = (p[p.len() - 1] - root).try_normalize(1e-6) else {
        return;
    };
    let slack = 1e-4 * total.max(1.0);
    let straight = p.iter().all(|q| (*q - root).cross(&axis).norm() <= slack);
    let on_line = (*target - root).cross(&axis).norm() <= slack;
    if !(straight && on_line) {
        return;
    }
    let offset = any_perpendicular(&axis).normalize() * (hint * total);
    let end = p.len() - 1;
    for q in &mut p[1..end] {
        *q += offset;
    }
}

fn segment_rotation(from: &Vec3, to: &Vec3, min_distance: f32) -> Quat {
    if from.norm() < min_distance || to.norm() < min_distance {
        return Quat::identity();
    }
    Quat::rotation_between(from, to).unwrap_or_else(|| {
        // Opposite directions: any half turn about a perpendicular axis works.
        Quat::from_axis_angle(&Unit::new_normalize(any_perpendicular(from)), PI)
    })
}
