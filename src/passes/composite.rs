use bytemuck::{Pod, Zeroable};

use super::{FramePass, PassContext, PassKind};
use crate::error::{RenderError, ResourceId};
use crate::gpu::backend::{FullscreenDraw, GpuBackend, Input, Output, Program, TargetId};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CompositeUniforms {
    camera_position: [f32; 4],
    light_position: [f32; 4],
    params: [f32; 4], // xy = resolution, z = time, w = highest usable diffuse mip
}

/// Binding order of the composite program.
pub const COMPOSITE_INPUTS: [Input; 8] = [
    Input::Target(TargetId::Diffuse),
    Input::Target(TargetId::BlurredNormal),
    Input::Target(TargetId::Position),
    Input::Target(TargetId::BlurredPosition),
    Input::Resource(ResourceId::Lut),
    Input::Resource(ResourceId::EnvDiffuse),
    Input::Resource(ResourceId::EnvSpecular),
    Input::Resource(ResourceId::Distortion),
];

/// Shades the blurred G-buffer into [`TargetId::Shaded`].
#[derive(Debug, Default)]
pub struct CompositePass {
    time: f32,
}

impl CompositePass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time(&self) -> f32 {
        self.time
    }
}

impl FramePass for CompositePass {
    fn kind(&self) -> PassKind {
        PassKind::Composite
    }

    fn output(&self) -> TargetId {
        TargetId::Shaded
    }

    fn execute(&mut self, ctx: &PassContext<'_>, backend: &mut dyn GpuBackend) -> Result<(), RenderError> {
        self.time += ctx.dt;

        let (width, height) = ctx.targets.extent(TargetId::Shaded).unwrap_or((1, 1));
        let max_mip = ctx.targets.mip_levels(TargetId::Diffuse).saturating_sub(1);
        let eye = ctx.camera.position;
        let light = ctx.light.position;
        let uniforms = CompositeUniforms {
            camera_position: [eye.x, eye.y, eye.z, 1.0],
            light_position: [light.x, light.y, light.z, 1.0],
            params: [width as f32, height as f32, self.time, max_mip as f32],
        };

        backend.draw_fullscreen(&FullscreenDraw {
            label: "Composite",
            program: Program::Composite,
            inputs: &COMPOSITE_INPUTS,
            uniforms: bytemuck::bytes_of(&uniforms),
            output: Output::new(TargetId::Shaded),
        })
    }
}
