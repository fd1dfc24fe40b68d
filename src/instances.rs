//! GPU instance data mirrored from the particle store.

use bytemuck::{Pod, Zeroable};

use crate::particle::{Particle, ParticleStore};

/// Per-instance attributes for the sphere draw. Slot `i` holds particle `i`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    /// xyz = world position, w = radius.
    pub position_scale: [f32; 4],
    /// Rotation quaternion [x, y, z, w].
    pub rotation: [f32; 4],
    /// xyz = velocity, w = particle id.
    pub velocity_id: [f32; 4],
    /// rgb = palette colour, a unused.
    pub color: [f32; 4],
    /// Fixed per-particle random vector.
    pub rands: [f32; 4],
}

impl InstanceRaw {
    pub fn from_particle(particle: &Particle) -> Self {
        let p = particle.position;
        let v = particle.velocity;
        let c = particle.color;
        Self {
            position_scale: [p.x, p.y, p.z, particle.radius()],
            rotation: particle.rotation.to_array(),
            velocity_id: [v.x, v.y, v.z, particle.id().0 as f32],
            color: [c.x, c.y, c.z, 1.0],
            rands: particle.seed().to_array(),
        }
    }

    /// Returns the vertex buffer layout for instanced rendering.
    /// This should be used as the second vertex buffer (slot 1) with step_mode::Instance.
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        const ATTRIBS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
            // After mesh vertex attributes (0, 1, 2)
            3 => Float32x4,
            4 => Float32x4,
            5 => Float32x4,
            6 => Float32x4,
            7 => Float32x4
        ];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ATTRIBS,
        }
    }
}

/// CPU staging copy of the instance buffer with change tracking.
#[derive(Clone, Debug, Default)]
pub struct InstanceBuffer {
    instances: Vec<InstanceRaw>,
    dirty: bool,
}

impl InstanceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh from the store. Returns whether anything changed.
    pub fn sync(&mut self, store: &ParticleStore) -> bool {
        let changed = self.instances.len() != store.len()
            || store
                .iter()
                .zip(&self.instances)
                .any(|(p, raw)| InstanceRaw::from_particle(p) != *raw);
        if changed {
            self.instances.clear();
            self.instances.extend(store.iter().map(InstanceRaw::from_particle));
            self.dirty = true;
        }
        changed
    }

    /// Whether the contents changed since the last [`InstanceBuffer::mark_uploaded`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_uploaded(&mut self) {
        self.dirty = false;
    }

    pub fn as_slice(&self) -> &[InstanceRaw] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
