use bytemuck::{Pod, Zeroable};

use super::{FramePass, PassContext, PassKind};
use crate::error::RenderError;
use crate::gpu::backend::{FullscreenDraw, GpuBackend, Input, Output, Program, TargetId};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct DownsampleUniforms {
    texel: [f32; 4], // xy = source texel size
}

/// Replaces the first diffuse mips with a 13-tap blurred downsample chain.
///
/// Each level is built from the already blurred level above it.
#[derive(Debug)]
pub struct MipBlurPass {
    levels: u32,
}

impl MipBlurPass {
    pub fn new(levels: u32) -> Self {
        Self { levels }
    }

    /// Mip levels this pass writes for a diffuse target with `mips` levels.
    pub fn written_levels(&self, mips: u32) -> std::ops::RangeInclusive<u32> {
        1..=self.levels.min(mips.saturating_sub(1))
    }
}

impl FramePass for MipBlurPass {
    fn kind(&self) -> PassKind {
        PassKind::MipBlur
    }

    fn output(&self) -> TargetId {
        TargetId::Diffuse
    }

    fn execute(&mut self, ctx: &PassContext<'_>, backend: &mut dyn GpuBackend) -> Result<(), RenderError> {
        let Some((width, height)) = ctx.targets.extent(TargetId::Diffuse) else {
            return Ok(());
        };

        for level in self.written_levels(ctx.targets.mip_levels(TargetId::Diffuse)) {
            let source_w = (width >> (level - 1)).max(1);
            let source_h = (height >> (level - 1)).max(1);
            let uniforms = DownsampleUniforms {
                texel: [1.0 / source_w as f32, 1.0 / source_h as f32, 0.0, 0.0],
            };
            backend.draw_fullscreen(&FullscreenDraw {
                label: "Diffuse Mip Blur",
                program: Program::MipDownsample,
                inputs: &[Input::TargetMip(TargetId::Diffuse, level - 1)],
                uniforms: bytemuck::bytes_of(&uniforms),
                output: Output::mip(TargetId::Diffuse, level),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_levels_respect_chain_length() {
        let pass = MipBlurPass::new(4);
        assert_eq!(pass.written_levels(11), 1..=4);
        assert_eq!(pass.written_levels(3), 1..=2);
        assert!(pass.written_levels(1).is_empty());
        assert!(pass.written_levels(0).is_empty());
    }
}
