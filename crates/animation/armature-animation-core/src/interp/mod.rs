//! Interpolation strategies over ordered channel samples.
//!
//! `interpolate(points, i, t)` expects `points[i]` to be the first sample with
//! `time >= t`. Index 0 has no predecessor, so every strategy blends from a
//! zero sample at time 0 instead. Queries at or past `points[i].time` return
//! `points[i].vector` exactly.

pub mod functions;

use serde::{Deserialize, Serialize};

use crate::data::SamplePoint;
use crate::pose::Vec3;
use functions::{catmull_rom_vec3, cubic_bezier, lerp_vec3, solve_bezier_parameter};

/// Time offsets default to a tenth of a second around the keyframe.
const DEFAULT_HANDLE_TIME: f32 = 0.1;

/// One bezier handle, per axis: `(time offset, value offset)` from its keyframe.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BezierHandle {
    pub time: Vec3,
    pub value: Vec3,
}

impl BezierHandle {
    pub fn default_left() -> Self {
        Self {
            time: Vec3::repeat(-DEFAULT_HANDLE_TIME),
            value: Vec3::zeros(),
        }
    }

    pub fn default_right() -> Self {
        Self {
            time: Vec3::repeat(DEFAULT_HANDLE_TIME),
            value: Vec3::zeros(),
        }
    }
}

/// How a channel moves into a sample from its predecessor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterpolationStrategy {
    Step,
    #[default]
    Linear,
    CatmullRom,
    Bezier {
        #[serde(default)]
        left: Option<BezierHandle>,
        #[serde(default)]
        right: Option<BezierHandle>,
    },
}

impl InterpolationStrategy {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Linear => "linear",
            Self::CatmullRom => "catmullrom",
            Self::Bezier { .. } => "bezier",
        }
    }

    fn right_handle(&self) -> BezierHandle {
        match self {
            Self::Bezier { right: Some(h), .. } => *h,
            _ => BezierHandle::default_right(),
        }
    }

    fn left_handle(&self) -> BezierHandle {
        match self {
            Self::Bezier { left: Some(h), .. } => *h,
            _ => BezierHandle::default_left(),
        }
    }
}

fn before_start(first: &SamplePoint) -> SamplePoint {
    SamplePoint {
        vector: Vec3::zeros(),
        time: 0.0,
        strategy: first.strategy,
    }
}

/// Index of the first sample with `time >= t`, or `points.len()` when `t` is past the end.
pub fn find_index(points: &[SamplePoint], t: f32) -> usize {
    points.partition_point(|p| p.time < t)
}

/// Evaluate a channel at time `t`. Empty channels yield zero.
pub fn sample_channel(points: &[SamplePoint], t: f32) -> Vec3 {
    match points.len() {
        0 => Vec3::zeros(),
        1 => points[0].vector,
        len => {
            let i = find_index(points, t);
            if i >= len {
                points[len - 1].vector
            } else {
                interpolate(points, i, t)
            }
        }
    }
}

/// Interpolate into `points[i]` at time `t`, dispatching on `points[i].strategy`.
pub fn interpolate(points: &[SamplePoint], i: usize, t: f32) -> Vec3 {
    let to = &points[i];
    if t >= to.time {
        return to.vector;
    }
    let start;
    let from = if i == 0 {
        start = before_start(to);
        &start
    } else {
        &points[i - 1]
    };
    let span = to.time - from.time;
    if span <= f32::EPSILON {
        return to.vector;
    }
    let alpha = ((t - from.time) / span).clamp(0.0, 1.0);

    match to.strategy {
        InterpolationStrategy::Step => from.vector,
        InterpolationStrategy::Linear => lerp_vec3(&from.vector, &to.vector, alpha),
        InterpolationStrategy::CatmullRom => {
            if points.len() < 4 {
                return lerp_vec3(&from.vector, &to.vector, alpha);
            }
            let len = points.len() as isize;
            let wrap = |k: isize| &points[k.rem_euclid(len) as usize].vector;
            let idx = i as isize;
            catmull_rom_vec3(wrap(idx - 2), &from.vector, &to.vector, wrap(idx + 1), alpha)
        }
        InterpolationStrategy::Bezier { .. } => bezier(from, to, t),
    }
}

/// Per-axis cubic bezier through `(time, value)` control points.
fn bezier(from: &SamplePoint, to: &SamplePoint, t: f32) -> Vec3 {
    let out = from.strategy.right_handle();
    let inn = to.strategy.left_handle();
    let (t0, t1) = (from.time, to.time);
    let mut result = Vec3::zeros();
    for axis in 0..3 {
        // Handles are clamped into the segment so the time curve stays invertible.
        let x = [
            t0,
            (t0 + out.time[axis]).clamp(t0, t1),
            (t1 + inn.time[axis]).clamp(t0, t1),
            t1,
        ];
        let s = solve_bezier_parameter(x, t);
        let (v0, v1) = (from.vector[axis], to.vector[axis]);
        result[axis] = cubic_bezier(v0, v0 + out.value[axis], v1 + inn.value[axis], v1, s);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pts(strategy: InterpolationStrategy, keys: &[(f32, f32)]) -> Vec<SamplePoint> {
        keys.iter()
            .map(|&(time, v)| SamplePoint {
                vector: Vec3::new(v, v * 2.0, -v),
                time,
                strategy,
            })
            .collect()
    }

    #[test]
    fn exact_at_sample_boundaries() {
        let strategies = [
            InterpolationStrategy::Step,
            InterpolationStrategy::Linear,
            InterpolationStrategy::CatmullRom,
            InterpolationStrategy::Bezier {
                left: None,
                right: None,
            },
        ];
        for strategy in strategies {
            let points = pts(strategy, &[(0.0, 0.3), (0.5, 1.0), (1.25, -2.0), (2.0, 4.0)]);
            for i in 0..points.len() {
                assert_eq!(
                    interpolate(&points, i, points[i].time),
                    points[i].vector,
                    "{} at {i}",
                    strategy.name()
                );
            }
        }
    }

    #[test]
    fn step_holds_previous_value() {
        let points = pts(InterpolationStrategy::Step, &[(0.0, 1.0), (1.0, 5.0)]);
        assert_eq!(interpolate(&points, 1, 0.99), points[0].vector);
    }

    #[test]
    fn linear_blends_by_alpha() {
        let points = pts(InterpolationStrategy::Linear, &[(0.0, 0.0), (2.0, 4.0)]);
        assert_relative_eq!(interpolate(&points, 1, 0.5), Vec3::new(1.0, 2.0, -1.0));
    }

    #[test]
    fn index_zero_blends_from_zero_sample() {
        let points = pts(InterpolationStrategy::Linear, &[(1.0, 2.0), (2.0, 4.0)]);
        assert_relative_eq!(interpolate(&points, 0, 0.5), Vec3::new(1.0, 2.0, -1.0));
    }

    #[test]
    fn catmull_rom_with_three_points_falls_back_to_linear() {
        let points = pts(
            InterpolationStrategy::CatmullRom,
            &[(0.0, 0.0), (1.0, 1.0), (2.0, 5.0)],
        );
        assert_relative_eq!(interpolate(&points, 2, 1.5), Vec3::new(3.0, 6.0, -3.0));
    }

    #[test]
    fn catmull_rom_uses_wrapped_neighbours() {
        let points = pts(
            InterpolationStrategy::CatmullRom,
            &[(0.0, 0.0), (1.0, 1.0), (2.0, 5.0), (3.0, 2.0)],
        );
        // At i == 1 the leading neighbour wraps to the last point.
        assert_relative_eq!(interpolate(&points, 1, 0.5).x, 0.125, epsilon = 1e-5);
        assert_relative_eq!(interpolate(&points, 2, 1.5).x, 3.25, epsilon = 1e-5);
    }

    #[test]
    fn skewed_bezier_handles_shift_the_midpoint() {
        let strategy = InterpolationStrategy::Bezier {
            left: Some(BezierHandle {
                time: Vec3::repeat(-0.1),
                value: Vec3::zeros(),
            }),
            right: Some(BezierHandle {
                time: Vec3::repeat(0.6),
                value: Vec3::repeat(0.5),
            }),
        };
        let points = pts(strategy, &[(0.0, 0.0), (1.0, 1.0)]);
        assert_relative_eq!(interpolate(&points, 1, 0.5).x, 0.4775, epsilon = 1e-3);
    }

    #[test]
    fn default_bezier_handles_ease_symmetrically() {
        let points = pts(
            InterpolationStrategy::Bezier {
                left: None,
                right: None,
            },
            &[(0.0, 0.0), (1.0, 1.0)],
        );
        let mid = interpolate(&points, 1, 0.5);
        assert_relative_eq!(mid.x, 0.5, epsilon = 1e-4);
        let early = interpolate(&points, 1, 0.1);
        assert!(early.x < 0.1, "flat handles ease in: {}", early.x);
    }

    #[test]
    fn sample_channel_handles_short_channels() {
        assert_eq!(sample_channel(&[], 3.0), Vec3::zeros());
        let one = pts(InterpolationStrategy::Linear, &[(0.5, 2.0)]);
        assert_eq!(sample_channel(&one, 0.0), one[0].vector);
        assert_eq!(sample_channel(&one, 9.0), one[0].vector);
        let two = pts(InterpolationStrategy::Linear, &[(0.0, 1.0), (1.0, 3.0)]);
        assert_eq!(sample_channel(&two, 5.0), two[1].vector);
    }
}
