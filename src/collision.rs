//! Pairwise and pointer-driven collision resolution.
//!
//! A soft, visually tuned approximation: every particle is advanced by one
//! predicted step, overlapping pairs are pushed apart and exchange the normal
//! component of their relative velocity, the pointer acts as an immovable virtual
//! sphere, and a weak pull keeps the cluster centred. Pairs are tested O(N²),
//! which is fine for the small fixed population.

use glam::{Vec2, Vec3};

use crate::orientation;
use crate::particle::ParticleStore;

/// Fraction of the summed radii below which two spheres count as overlapping.
pub const CONTACT_TOLERANCE: f32 = 0.98;

/// Per-second velocity retention (`velocity *= DAMPING_PER_SECOND^dt`).
pub const DAMPING_PER_SECOND: f32 = 0.8;

/// Extra damping applied to the first particle of a colliding pair only.
pub const PAIR_DAMPING: f32 = 0.9;

/// Radius of the pointer's virtual collider.
pub const POINTER_RADIUS: f32 = 0.5;

/// Normalised device coordinates to world units for the pointer collider.
pub const POINTER_WORLD_SCALE: f32 = 2.0;

/// Strength of the pull back towards the origin, per unit of distance.
pub const CENTRAL_PULL: f32 = 0.1;

/// Minimum outward speed off the pointer collider, per unit of penetration.
pub const POINTER_PUSH: f32 = 2.0;

/// Last-known pointer position in world space. Written once per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerState {
    last_world: Vec2,
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_world(&self) -> Vec2 {
        self.last_world
    }

    /// Map a pointer position in NDC to the collider's world position.
    pub fn ndc_to_world(ndc: Vec2) -> Vec2 {
        ndc * POINTER_WORLD_SCALE
    }
}

/// A non-rendered sphere that takes part in collision tests.
#[derive(Clone, Copy, Debug)]
struct VirtualCollider {
    center: Vec3,
    radius: f32,
    velocity: Vec3,
}

/// Overlap between two spheres: unit normal from `b` towards `a` and penetration depth.
fn contact(a: Vec3, ra: f32, b: Vec3, rb: f32, fallback: Vec3) -> Option<(Vec3, f32)> {
    let delta = a - b;
    let distance = delta.length();
    let reach = CONTACT_TOLERANCE * (ra + rb);
    if distance >= reach {
        return None;
    }
    let normal = if distance > 0.0 { delta / distance } else { fallback };
    Some((normal, reach - distance))
}

/// Advance every particle by `dt` and resolve contacts in place.
///
/// `pointer_ndc` is the current pointer position in `[-1, 1]²`. A `dt` that is not
/// strictly positive leaves the store and the pointer state untouched. Callers
/// guarantee finite inputs.
pub fn resolve(store: &mut ParticleStore, pointer: &mut PointerState, pointer_ndc: Vec2, dt: f32) {
    if !(dt > 0.0) {
        return;
    }

    let pointer_world = PointerState::ndc_to_world(pointer_ndc);
    let pointer_collider = VirtualCollider {
        center: pointer_world.extend(0.0),
        radius: POINTER_RADIUS,
        velocity: ((pointer_world - pointer.last_world) / dt).extend(0.0),
    };

    let damping = DAMPING_PER_SECOND.powf(dt);
    let particles = store.as_mut_slice();
    let mut predicted: Vec<Vec3> = particles
        .iter()
        .map(|p| p.position + p.velocity * dt)
        .collect();

    for i in 0..particles.len() {
        let (head, tail) = particles.split_at_mut(i + 1);
        let current = &mut head[i];
        let axis = current.spin_axis();
        let mut p_i = predicted[i];
        let mut v_i = current.velocity * damping;

        for (offset, other) in tail.iter_mut().enumerate() {
            let j = i + 1 + offset;
            let Some((normal, depth)) = contact(p_i, current.radius(), predicted[j], other.radius(), axis) else {
                continue;
            };

            let push = normal * (0.5 * depth);
            p_i += push;
            predicted[j] -= push;

            // Separating pairs keep their velocities.
            let approach = (v_i - other.velocity).dot(normal);
            if approach < 0.0 {
                let exchange = normal * approach;
                v_i -= exchange;
                other.velocity += exchange;
            }
            v_i *= PAIR_DAMPING;
        }

        let pointer_contact = contact(
            p_i,
            current.radius(),
            pointer_collider.center,
            pointer_collider.radius,
            axis,
        );
        if let Some((normal, depth)) = pointer_contact {
            p_i += normal * (0.5 * depth);
            let approach = (v_i - pointer_collider.velocity).dot(normal);
            if approach < 0.0 {
                v_i -= normal * (2.0 * approach);
            }
        }

        current.rotation = orientation::advance(current.rotation, axis, v_i, dt);
        current.position = p_i;

        let distance = p_i.length();
        if let Some(home) = (-p_i).try_normalize() {
            v_i = v_i.lerp(home, CENTRAL_PULL * distance);
        }
        // Whatever the pull did, a particle inside the pointer leaves it.
        if let Some((normal, depth)) = pointer_contact {
            let outward = v_i.dot(normal);
            let floor = POINTER_PUSH * depth;
            if outward < floor {
                v_i += normal * (floor - outward);
            }
        }
        current.velocity = v_i;
        predicted[i] = p_i;
    }

    pointer.last_world = pointer_world;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{Particle, ParticleId};
    use glam::{Quat, Vec4};

    const DT: f32 = 1.0 / 60.0;

    fn particle(position: Vec3, velocity: Vec3, radius: f32) -> Particle {
        Particle::new(ParticleId(0), position, velocity, radius, Quat::IDENTITY, Vec4::new(0.0, 0.0, 1.0, 0.0))
            .unwrap()
    }

    /// Pointer parked far away from the origin with no motion.
    fn parked_pointer() -> (PointerState, Vec2) {
        let ndc = Vec2::new(1.0, 1.0);
        let state = PointerState { last_world: PointerState::ndc_to_world(ndc) };
        (state, ndc)
    }

    #[test]
    fn test_zero_dt_is_noop() {
        let mut store = ParticleStore::spawn(10, 3);
        let before = store.as_slice().to_vec();
        let mut pointer = PointerState::new();
        resolve(&mut store, &mut pointer, Vec2::new(0.3, 0.2), 0.0);
        assert_eq!(store.as_slice(), before.as_slice());
        assert_eq!(pointer, PointerState::new());
    }

    #[test]
    fn test_colliding_pair_separates_and_swaps() {
        let mut store = ParticleStore::from_particles(vec![
            particle(Vec3::new(-0.05, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0.5),
            particle(Vec3::new(0.05, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), 0.5),
        ]);
        let (mut pointer, ndc) = parked_pointer();

        resolve(&mut store, &mut pointer, ndc, DT);

        let [a, b] = store.as_slice() else { panic!("expected two particles") };
        let distance = a.position.distance(b.position);
        assert!(distance > 0.1, "distance {distance} did not increase");
        assert!(a.velocity.x < 0.0, "left sphere should now move left: {}", a.velocity.x);
        assert!(b.velocity.x > 0.0, "right sphere should now move right: {}", b.velocity.x);
    }

    #[test]
    fn test_separated_pair_does_not_interact() {
        let mut store = ParticleStore::from_particles(vec![
            particle(Vec3::new(-0.3, 0.0, 0.0), Vec3::ZERO, 0.1),
            particle(Vec3::new(0.3, 0.0, 0.0), Vec3::ZERO, 0.1),
        ]);
        let (mut pointer, ndc) = parked_pointer();
        resolve(&mut store, &mut pointer, ndc, DT);
        let [a, b] = store.as_slice() else { panic!("expected two particles") };
        assert_eq!(a.position, Vec3::new(-0.3, 0.0, 0.0));
        assert_eq!(b.position, Vec3::new(0.3, 0.0, 0.0));
        // Only the central pull acts, pointing back to the origin.
        assert!(a.velocity.x > 0.0 && b.velocity.x < 0.0);
    }

    #[test]
    fn test_pair_damping_is_one_sided() {
        // Identical approach speeds; only the lower id receives the extra factor.
        let mut store = ParticleStore::from_particles(vec![
            particle(Vec3::new(0.0, -0.1, 0.0), Vec3::new(0.0, 1.0, 0.0), 0.5),
            particle(Vec3::new(0.0, 0.1, 0.0), Vec3::new(0.0, -1.0, 0.0), 0.5),
        ]);
        let (mut pointer, ndc) = parked_pointer();
        resolve(&mut store, &mut pointer, ndc, DT);
        let [a, b] = store.as_slice() else { panic!("expected two particles") };
        assert!(a.velocity.y.abs() < b.velocity.y.abs());
    }

    #[test]
    fn test_pointer_repels_approaching_particle() {
        let mut store = ParticleStore::from_particles(vec![particle(
            Vec3::new(0.1, 0.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            0.2,
        )]);
        let mut pointer = PointerState::new();

        resolve(&mut store, &mut pointer, Vec2::ZERO, DT);

        let p = &store.as_slice()[0];
        assert!(p.velocity.x > 0.0, "velocity should point away from the pointer: {:?}", p.velocity);
        assert!(p.position.x > 0.1);
    }

    #[test]
    fn test_coincident_particle_is_pushed_out() {
        let mut store = ParticleStore::from_particles(vec![particle(Vec3::ZERO, Vec3::ZERO, 0.2)]);
        let mut pointer = PointerState::new();

        resolve(&mut store, &mut pointer, Vec2::ZERO, DT);

        let p = &store.as_slice()[0];
        assert!(p.is_finite());
        // Pushed along the spin axis (+Z for this seed).
        assert!(p.position.z > 0.0);
        assert!(p.position.length() > 0.0);
    }

    #[test]
    fn test_particle_on_pointer_moves_away() {
        let ndc = Vec2::new(0.5, 0.5);
        let center = PointerState::ndc_to_world(ndc).extend(0.0);
        for velocity in [Vec3::ZERO, Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.0, 0.0, 0.3)] {
            let mut store = ParticleStore::from_particles(vec![particle(center, velocity, 0.2)]);
            let mut pointer = PointerState { last_world: ndc * POINTER_WORLD_SCALE };

            resolve(&mut store, &mut pointer, ndc, DT);

            let p = &store.as_slice()[0];
            let away = p.position - center;
            assert!(away.length() > 0.0, "not pushed out for {velocity}");
            assert!(
                away.dot(p.velocity) > 0.0,
                "velocity {} points back at the pointer (start {velocity})",
                p.velocity
            );
        }
    }

    #[test]
    fn test_separating_pair_keeps_moving_apart() {
        let mut store = ParticleStore::from_particles(vec![
            particle(Vec3::new(-0.05, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), 0.5),
            particle(Vec3::new(0.05, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0.5),
        ]);
        let (mut pointer, ndc) = parked_pointer();

        resolve(&mut store, &mut pointer, ndc, DT);

        let [a, b] = store.as_slice() else { panic!("expected two particles") };
        assert!(a.velocity.x < 0.0, "left sphere turned back: {}", a.velocity.x);
        assert!(b.velocity.x > 0.0, "right sphere turned back: {}", b.velocity.x);
    }

    #[test]
    fn test_pointer_velocity_from_displacement() {
        // The pointer sweeps across a resting particle and drags it along +X.
        let mut store = ParticleStore::from_particles(vec![particle(Vec3::new(0.5, 0.0, 0.0), Vec3::ZERO, 0.2)]);
        let mut pointer = PointerState::new();
        resolve(&mut store, &mut pointer, Vec2::new(0.1, 0.0), DT);
        assert!(store.as_slice()[0].velocity.x > 1.0);
        assert_eq!(pointer.last_world(), Vec2::new(0.2, 0.0));
    }

    #[test]
    fn test_rotation_tumbles_with_speed() {
        let mut store = ParticleStore::from_particles(vec![particle(
            Vec3::new(0.0, 3.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            0.1,
        )]);
        let (mut pointer, ndc) = parked_pointer();
        resolve(&mut store, &mut pointer, ndc, DT);
        let q = store.as_slice()[0].rotation;
        assert!(!q.abs_diff_eq(Quat::IDENTITY, 1e-4));
        assert!((q.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_population_and_radius_survive_many_ticks() {
        let mut store = ParticleStore::spawn(40, 99);
        let radii: Vec<f32> = store.iter().map(|p| p.radius()).collect();
        let mut pointer = PointerState::new();
        for tick in 0..600 {
            let t = tick as f32 * DT;
            resolve(&mut store, &mut pointer, Vec2::new(t.sin() * 0.5, t.cos() * 0.5), DT);
            assert_eq!(store.len(), 40);
        }
        for (p, r) in store.iter().zip(radii) {
            assert_eq!(p.radius(), r);
            assert!(p.radius() > 0.0);
            assert!(p.is_finite());
        }
    }
}
