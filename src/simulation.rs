//! One physics tick over the particle store.

use glam::Vec2;

use crate::collision::{self, PointerState};
use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::particle::ParticleStore;

/// Owns the particle population and the pointer state carried between ticks.
#[derive(Clone, Debug)]
pub struct Simulation {
    store: ParticleStore,
    pointer: PointerState,
    ticks: u64,
}

impl Simulation {
    pub fn new(config: &SimulationConfig) -> Self {
        Self::from_store(ParticleStore::spawn(config.particle_count, config.seed))
    }

    pub fn from_store(store: ParticleStore) -> Self {
        Self {
            store,
            pointer: PointerState::new(),
            ticks: 0,
        }
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ParticleStore {
        &mut self.store
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    /// Number of ticks that advanced the state.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance by `dt` seconds with the pointer at `pointer_ndc`.
    ///
    /// Non-finite inputs are rejected before anything is mutated. `dt == 0` is a no-op.
    pub fn tick(&mut self, dt: f32, pointer_ndc: Vec2) -> Result<(), SimulationError> {
        if !dt.is_finite() {
            return Err(SimulationError::degenerate(format!("dt ({dt})")));
        }
        if !pointer_ndc.is_finite() {
            return Err(SimulationError::degenerate(format!("pointer ({pointer_ndc})")));
        }
        if let Some(id) = self.store.find_degenerate() {
            return Err(SimulationError::degenerate(format!("particle {id} state")));
        }
        if dt <= 0.0 {
            return Ok(());
        }

        collision::resolve(&mut self.store, &mut self.pointer, pointer_ndc, dt);
        self.ticks += 1;
        log::trace!("tick {} advanced {} particles by {dt:.4}s", self.ticks, self.store.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_population_invariant() {
        let mut sim = Simulation::new(&SimulationConfig::default());
        let n = sim.store().len();
        for i in 0..300 {
            sim.tick(DT, Vec2::new((i as f32 * 0.01).sin(), 0.0)).unwrap();
            assert_eq!(sim.store().len(), n);
        }
        assert_eq!(sim.ticks(), 300);
    }

    #[test]
    fn test_quaternions_stay_unit_for_ten_thousand_ticks() {
        let mut sim = Simulation::new(&SimulationConfig { particle_count: 40, seed: 5 });
        for i in 0..10_000 {
            let t = i as f32 * DT;
            sim.tick(DT, Vec2::new(0.6 * (0.7 * t).cos(), 0.6 * (0.3 * t).sin())).unwrap();
            for p in sim.store().iter() {
                let norm = p.rotation.length();
                assert!((1.0 - 1e-3..=1.0 + 1e-3).contains(&norm), "particle {} norm {norm}", p.id());
                assert!(p.radius() > 0.0);
            }
        }
    }

    #[test]
    fn test_zero_dt_leaves_state_unchanged() {
        let mut sim = Simulation::new(&SimulationConfig::default());
        sim.tick(DT, Vec2::new(0.2, 0.1)).unwrap();
        let before = sim.store().as_slice().to_vec();
        let pointer = *sim.pointer();

        sim.tick(0.0, Vec2::new(-0.9, 0.9)).unwrap();

        assert_eq!(sim.store().as_slice(), before.as_slice());
        assert_eq!(*sim.pointer(), pointer);
        assert_eq!(sim.ticks(), 1);
    }

    #[test]
    fn test_rejects_non_finite_inputs() {
        let mut sim = Simulation::new(&SimulationConfig::default());
        let before = sim.store().as_slice().to_vec();
        assert!(matches!(sim.tick(f32::NAN, Vec2::ZERO), Err(SimulationError::DegenerateInput { .. })));
        assert!(sim.tick(DT, Vec2::new(f32::INFINITY, 0.0)).is_err());
        assert_eq!(sim.store().as_slice(), before.as_slice());

        sim.store_mut().as_mut_slice()[3].velocity.x = f32::NAN;
        let err = sim.tick(DT, Vec2::ZERO).unwrap_err();
        assert!(err.to_string().contains("#3"));
    }
}
