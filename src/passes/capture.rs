use bytemuck::{Pod, Zeroable};

use super::{copy, FramePass, PassContext, PassKind};
use crate::error::{RenderError, ResourceId};
use crate::gpu::backend::{GpuBackend, Input, Output, SceneDraw, TargetId};

/// Uniforms for the instanced sphere draw
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct SceneUniforms {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    light_position: [f32; 4],
    params: [f32; 4], // x = time, y = dt, z = normal scale, w = repeat
}

const SCENE_INPUTS: [Input; 5] = [
    Input::Resource(ResourceId::NormalMap),
    Input::Resource(ResourceId::Noise),
    Input::Resource(ResourceId::Lut),
    Input::Resource(ResourceId::EnvDiffuse),
    Input::Resource(ResourceId::EnvSpecular),
];

const GBUFFER: [TargetId; 3] = [TargetId::Diffuse, TargetId::Normal, TargetId::Position];

/// Draws every particle into the G-buffer and rebuilds the diffuse mip chain.
#[derive(Debug, Default)]
pub struct CapturePass {
    time: f32,
}

impl CapturePass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds accumulated by this pass.
    pub fn time(&self) -> f32 {
        self.time
    }
}

impl FramePass for CapturePass {
    fn kind(&self) -> PassKind {
        PassKind::Capture
    }

    fn output(&self) -> TargetId {
        TargetId::Diffuse
    }

    fn execute(&mut self, ctx: &PassContext<'_>, backend: &mut dyn GpuBackend) -> Result<(), RenderError> {
        self.time += ctx.dt;

        if ctx.instances.is_dirty() {
            backend.write_instances(ctx.instances.as_slice())?;
        }

        let eye = ctx.camera.position;
        let light = ctx.light.position;
        let uniforms = SceneUniforms {
            view_proj: ctx.camera.view_projection_matrix(ctx.aspect()).to_cols_array_2d(),
            camera_position: [eye.x, eye.y, eye.z, 1.0],
            light_position: [light.x, light.y, light.z, 1.0],
            params: [self.time, ctx.dt, ctx.params.normal_scale, ctx.params.repeat],
        };

        backend.draw_scene(&SceneDraw {
            uniforms: bytemuck::bytes_of(&uniforms),
            inputs: &SCENE_INPUTS,
            instance_count: ctx.instances.len() as u32,
            outputs: &GBUFFER,
            depth: TargetId::Depth,
        })?;

        // Plain box-filtered mips; the mip-blur pass replaces the first few.
        for level in 1..ctx.targets.mip_levels(TargetId::Diffuse) {
            copy(
                backend,
                "Diffuse Mip Copy",
                Input::TargetMip(TargetId::Diffuse, level - 1),
                Output::mip(TargetId::Diffuse, level),
            )?;
        }
        Ok(())
    }
}
