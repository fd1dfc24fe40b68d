use bytemuck::{Pod, Zeroable};

use super::{FramePass, PassContext, PassKind};
use crate::config::ToneConfig;
use crate::error::{RenderError, ResourceId};
use crate::gpu::backend::{FullscreenDraw, GpuBackend, Input, Output, Program, TargetId};

/// Uniforms for threshold pass
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ThresholdUniforms {
    threshold: f32,
    soft_knee: f32,
    _padding: [f32; 2],
}

/// Uniforms for blur pass
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BlurUniforms {
    direction_and_radius: [f32; 4], // xy = direction, z = radius, w = unused
    texel: [f32; 4],
}

/// Uniforms for combine pass
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CombineUniforms {
    intensity: f32,
    blend_mode: u32,
    _padding: [f32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct GradeUniforms {
    strength: f32,
    _padding: [f32; 3],
}

/// Bloom followed by a 3D LUT grade into [`TargetId::Output`].
#[derive(Debug)]
pub struct TonePass {
    config: ToneConfig,
}

impl TonePass {
    pub fn new(config: &ToneConfig) -> Self {
        Self {
            config: config.sanitize(),
        }
    }

    pub fn config(&self) -> &ToneConfig {
        &self.config
    }

    fn blur(
        &self,
        ctx: &PassContext<'_>,
        backend: &mut dyn GpuBackend,
        from: TargetId,
        to: TargetId,
        direction: [f32; 2],
    ) -> Result<(), RenderError> {
        let [texel_x, texel_y] = ctx.texel_size(from);
        let uniforms = BlurUniforms {
            direction_and_radius: [direction[0], direction[1], self.config.radius, 0.0],
            texel: [texel_x, texel_y, 0.0, 0.0],
        };
        backend.draw_fullscreen(&FullscreenDraw {
            label: "Bloom Blur",
            program: Program::BloomBlur,
            inputs: &[Input::Target(from)],
            uniforms: bytemuck::bytes_of(&uniforms),
            output: Output::new(to),
        })
    }
}

impl FramePass for TonePass {
    fn kind(&self) -> PassKind {
        PassKind::Tone
    }

    fn output(&self) -> TargetId {
        TargetId::Output
    }

    fn execute(&mut self, ctx: &PassContext<'_>, backend: &mut dyn GpuBackend) -> Result<(), RenderError> {
        let threshold = ThresholdUniforms {
            threshold: self.config.threshold,
            soft_knee: self.config.soft_knee,
            _padding: [0.0; 2],
        };
        backend.draw_fullscreen(&FullscreenDraw {
            label: "Bloom Threshold",
            program: Program::BloomThreshold,
            inputs: &[Input::Target(TargetId::Shaded)],
            uniforms: bytemuck::bytes_of(&threshold),
            output: Output::new(TargetId::BloomA),
        })?;

        self.blur(ctx, backend, TargetId::BloomA, TargetId::BloomB, [1.0, 0.0])?;
        self.blur(ctx, backend, TargetId::BloomB, TargetId::BloomA, [0.0, 1.0])?;

        let combine = CombineUniforms {
            intensity: self.config.intensity,
            blend_mode: self.config.blend.shader_index(),
            _padding: [0.0; 2],
        };
        backend.draw_fullscreen(&FullscreenDraw {
            label: "Bloom Combine",
            program: Program::BloomCombine,
            inputs: &[Input::Target(TargetId::Shaded), Input::Target(TargetId::BloomA)],
            uniforms: bytemuck::bytes_of(&combine),
            output: Output::new(TargetId::Bloomed),
        })?;

        let grade = GradeUniforms {
            strength: self.config.lut_strength,
            _padding: [0.0; 3],
        };
        backend.draw_fullscreen(&FullscreenDraw {
            label: "LUT Grade",
            program: Program::LutGrade,
            inputs: &[Input::Target(TargetId::Bloomed), Input::Resource(ResourceId::Lut)],
            uniforms: bytemuck::bytes_of(&grade),
            output: Output::new(TargetId::Output),
        })
    }
}
