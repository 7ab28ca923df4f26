//! Interpolation helpers:
//! - lerp_vec3 (component-wise linear blend)
//! - catmull_rom_vec3 (uniform Catmull-Rom through four points)
//! - cubic bezier evaluation and its derivative
//! - solve_bezier_parameter (Newton-Raphson inversion of the time curve)

use crate::config::{BEZIER_EPSILON, BEZIER_MAX_ITERATIONS};
use crate::pose::Vec3;

#[inline]
pub fn lerp_vec3(a: &Vec3, b: &Vec3, t: f32) -> Vec3 {
    a + (b - a) * t
}

/// Uniform Catmull-Rom spline between `p1` and `p2` at `t` in [0,1].
#[inline]
pub fn catmull_rom_vec3(p0: &Vec3, p1: &Vec3, p2: &Vec3, p3: &Vec3, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    (p1 * 2.0
        + (p2 - p0) * t
        + (p0 * 2.0 - p1 * 5.0 + p2 * 4.0 - p3) * t2
        + (p1 * 3.0 - p0 - p2 * 3.0 + p3) * t3)
        * 0.5
}

/// Cubic Bezier basis function
#[inline]
pub fn cubic_bezier(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

#[inline]
pub fn cubic_bezier_derivative(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    3.0 * u * u * (p1 - p0) + 6.0 * u * t * (p2 - p1) + 3.0 * t * t * (p3 - p2)
}

/// Find the curve parameter `s` in [0,1] whose time coordinate equals `time`.
///
/// `x` holds the four time control values. Starts from the linear guess and runs
/// at most [`BEZIER_MAX_ITERATIONS`] Newton steps, clamping into [0,1] after each.
pub fn solve_bezier_parameter(x: [f32; 4], time: f32) -> f32 {
    let span = x[3] - x[0];
    if span.abs() <= f32::EPSILON {
        return 1.0;
    }
    let mut s = ((time - x[0]) / span).clamp(0.0, 1.0);
    for _ in 0..BEZIER_MAX_ITERATIONS {
        let err = cubic_bezier(x[0], x[1], x[2], x[3], s) - time;
        if err.abs() < BEZIER_EPSILON {
            break;
        }
        let slope = cubic_bezier_derivative(x[0], x[1], x[2], x[3], s);
        if slope.abs() <= f32::EPSILON {
            break;
        }
        s = (s - err / slope).clamp(0.0, 1.0);
    }
    s
}
