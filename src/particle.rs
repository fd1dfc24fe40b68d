//! Particle store for the fixed sphere population.
//!
//! Particles live in a flat array and are addressed by a stable [`ParticleId`]
//! that doubles as the slot in the GPU instance buffer. The population is created
//! once and never grows or shrinks.

use std::fmt;

use glam::{EulerRot, Quat, Vec3, Vec4};

use crate::error::SimulationError;

/// Default population size.
pub const DEFAULT_PARTICLE_COUNT: usize = 40;

/// Base radius before the per-particle random factor.
const BASE_RADIUS: f32 = 0.22;

/// Stable index of a particle, `0..N`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticleId(pub u32);

impl ParticleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Simulation state of one sphere.
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    id: ParticleId,
    pub position: Vec3,
    pub velocity: Vec3,
    radius: f32,
    /// Unit quaternion.
    pub rotation: Quat,
    /// Linear RGB in [0, 1], driven by the active palette.
    pub color: Vec3,
    seed: Vec4,
}

impl Particle {
    /// Build a particle. Fails when `radius` is not a positive finite number.
    pub fn new(
        id: ParticleId,
        position: Vec3,
        velocity: Vec3,
        radius: f32,
        rotation: Quat,
        seed: Vec4,
    ) -> Result<Self, SimulationError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(SimulationError::InvalidRadius { id, radius });
        }
        Ok(Self {
            id,
            position,
            velocity,
            radius,
            rotation,
            color: Vec3::ONE,
            seed,
        })
    }

    pub fn id(&self) -> ParticleId {
        self.id
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn seed(&self) -> Vec4 {
        self.seed
    }

    /// Fixed spin axis derived from the seed. Falls back to +Y for a degenerate seed.
    pub fn spin_axis(&self) -> Vec3 {
        self.seed.truncate().try_normalize().unwrap_or(Vec3::Y)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite() && self.rotation.is_finite()
    }
}

/// Deterministic xorshift64 generator used for spawning.
#[derive(Clone, Debug)]
pub struct SpawnRng {
    state: u64,
}

impl SpawnRng {
    pub fn new(seed: u64) -> Self {
        // Seed 0 is degenerate for xorshift (stays at zero forever)
        let state = if seed == 0 { 0x5DEECE66D } else { seed };
        Self { state }
    }

    /// Uniform sample in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        (self.state >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform sample in `[-1, 1)`.
    fn next_signed(&mut self) -> f32 {
        2.0 * (self.next_f32() - 0.5)
    }
}

/// Arena of particles indexed by [`ParticleId`].
#[derive(Clone, Debug, Default)]
pub struct ParticleStore {
    particles: Vec<Particle>,
}

impl ParticleStore {
    /// Spawn `count` particles around the origin.
    pub fn spawn(count: usize, seed: u64) -> Self {
        let mut rng = SpawnRng::new(seed);
        let particles = (0..count)
            .map(|i| {
                let position = Vec3::new(
                    rng.next_f32() - 0.5,
                    rng.next_f32() - 0.5,
                    rng.next_f32() - 0.5,
                );
                let radius = BASE_RADIUS * (0.5 + 0.5 * rng.next_f32());
                let seed = Vec4::new(
                    rng.next_signed(),
                    rng.next_signed(),
                    rng.next_signed(),
                    rng.next_signed(),
                );
                let velocity = Vec3::new(rng.next_signed(), rng.next_signed(), rng.next_signed());
                let tau = std::f32::consts::TAU;
                let rotation = Quat::from_euler(
                    EulerRot::XYZ,
                    tau * rng.next_f32(),
                    tau * rng.next_f32(),
                    tau * rng.next_f32(),
                );
                Particle {
                    id: ParticleId(i as u32),
                    position,
                    velocity,
                    radius,
                    rotation,
                    color: Vec3::ONE,
                    seed,
                }
            })
            .collect();
        Self { particles }
    }

    /// Adopt an explicit set of particles. Ids are reassigned to match slots.
    pub fn from_particles(particles: Vec<Particle>) -> Self {
        let particles = particles
            .into_iter()
            .enumerate()
            .map(|(i, mut p)| {
                p.id = ParticleId(i as u32);
                p
            })
            .collect();
        Self { particles }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn get(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }

    pub fn as_slice(&self) -> &[Particle] {
        &self.particles
    }

    /// Mutable access to the slots. The slice cannot grow or shrink the population.
    pub fn as_mut_slice(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// First particle whose kinematic state is not finite.
    pub fn find_degenerate(&self) -> Option<ParticleId> {
        self.particles.iter().find(|p| !p.is_finite()).map(|p| p.id)
    }

    /// Assign colours cyclically from a palette.
    pub fn apply_colors(&mut self, colors: &[Vec3]) {
        if colors.is_empty() {
            return;
        }
        for (i, particle) in self.particles.iter_mut().enumerate() {
            particle.color = colors[i % colors.len()];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_is_deterministic() {
        let a = ParticleStore::spawn(8, 123);
        let b = ParticleStore::spawn(8, 123);
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_spawn_ranges() {
        let store = ParticleStore::spawn(DEFAULT_PARTICLE_COUNT, 7);
        assert_eq!(store.len(), DEFAULT_PARTICLE_COUNT);
        for (i, p) in store.iter().enumerate() {
            assert_eq!(p.id().index(), i);
            assert!(p.position.abs().max_element() <= 0.5);
            assert!(p.radius() >= 0.11 && p.radius() <= 0.22);
            assert!(p.seed().abs().max_element() <= 1.0);
            assert!(p.velocity.abs().max_element() <= 1.0);
            assert!((p.rotation.length() - 1.0).abs() < 1e-4);
            assert_eq!(p.color, Vec3::ONE);
        }
    }

    #[test]
    fn test_seed_zero_still_varies() {
        let store = ParticleStore::spawn(2, 0);
        let a = store.as_slice()[0].position;
        let b = store.as_slice()[1].position;
        assert!((a - b).length() > 1e-3);
    }

    #[test]
    fn test_rejects_non_positive_radius() {
        let err = Particle::new(ParticleId(3), Vec3::ZERO, Vec3::ZERO, 0.0, Quat::IDENTITY, Vec4::ONE)
            .unwrap_err();
        assert!(matches!(err, SimulationError::InvalidRadius { id: ParticleId(3), .. }));
        assert!(Particle::new(ParticleId(0), Vec3::ZERO, Vec3::ZERO, f32::NAN, Quat::IDENTITY, Vec4::ONE).is_err());
    }

    #[test]
    fn test_from_particles_reassigns_ids() {
        let p = Particle::new(ParticleId(9), Vec3::ZERO, Vec3::ZERO, 0.5, Quat::IDENTITY, Vec4::ONE).unwrap();
        let store = ParticleStore::from_particles(vec![p.clone(), p]);
        let ids: Vec<_> = store.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![ParticleId(0), ParticleId(1)]);
    }

    #[test]
    fn test_spin_axis_fallback() {
        let p = Particle::new(ParticleId(0), Vec3::ZERO, Vec3::ZERO, 0.5, Quat::IDENTITY, Vec4::new(0.0, 0.0, 0.0, 1.0))
            .unwrap();
        assert_eq!(p.spin_axis(), Vec3::Y);
    }

    #[test]
    fn test_apply_colors_cycles() {
        let mut store = ParticleStore::spawn(7, 1);
        let colors = [Vec3::X, Vec3::Y, Vec3::Z];
        store.apply_colors(&colors);
        assert_eq!(store.as_slice()[0].color, Vec3::X);
        assert_eq!(store.as_slice()[4].color, Vec3::Y);
        assert_eq!(store.as_slice()[6].color, Vec3::X);
    }
}
