//! Rolling orientation update.
//!
//! Each sphere tumbles about its own fixed random axis at a rate proportional to
//! its linear speed. This is not derived from angular momentum.

use glam::{Quat, Vec3};

/// Spin rate per unit of linear speed.
pub const SPIN_RATE: f32 = 5.0;

/// Incremental rotation for one step: `(axis * sin(angle), cos(angle))`.
pub fn spin_increment(axis: Vec3, speed: f32, dt: f32) -> Quat {
    let angle = SPIN_RATE * speed * dt;
    let (sin, cos) = angle.sin_cos();
    let axis = axis * sin;
    Quat::from_xyzw(axis.x, axis.y, axis.z, cos)
}

/// Left-multiply `rotation` by the increment and renormalise to keep it unit length.
pub fn advance(rotation: Quat, axis: Vec3, velocity: Vec3, dt: f32) -> Quat {
    let increment = spin_increment(axis, velocity.length(), dt);
    (increment * rotation).normalize()
}
