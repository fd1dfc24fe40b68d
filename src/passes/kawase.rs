use bytemuck::{Pod, Zeroable};

use super::{copy, FramePass, PassContext, PassKind};
use crate::config::KawaseConfig;
use crate::error::RenderError;
use crate::gpu::backend::{FullscreenDraw, GpuBackend, Input, Output, Program, TargetId};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct KawaseUniforms {
    params: [f32; 4], // xy = source texel size, z = offset, w = scale
}

const SCRATCH: [TargetId; 2] = [TargetId::BlurScratchA, TargetId::BlurScratchB];

/// Multi-iteration Kawase blur of one G-buffer channel.
///
/// Iterations run at the scratch targets' half resolution, alternating
/// between the two, and the result is copied into `destination`.
#[derive(Debug)]
pub struct KawasePass {
    source: TargetId,
    destination: TargetId,
    config: KawaseConfig,
}

impl KawasePass {
    pub fn new(source: TargetId, destination: TargetId, config: KawaseConfig) -> Self {
        Self {
            source,
            destination,
            config,
        }
    }

    pub fn source(&self) -> TargetId {
        self.source
    }
}

impl FramePass for KawasePass {
    fn kind(&self) -> PassKind {
        PassKind::IsotropicBlur
    }

    fn output(&self) -> TargetId {
        self.destination
    }

    fn execute(&mut self, ctx: &PassContext<'_>, backend: &mut dyn GpuBackend) -> Result<(), RenderError> {
        let mut read = self.source;
        for (i, &offset) in self.config.kernel.offsets().iter().enumerate() {
            let write = SCRATCH[i % 2];
            let [texel_x, texel_y] = ctx.texel_size(read);
            let uniforms = KawaseUniforms {
                params: [texel_x, texel_y, offset, self.config.scale],
            };
            backend.draw_fullscreen(&FullscreenDraw {
                label: "Kawase Blur",
                program: Program::Kawase,
                inputs: &[Input::Target(read)],
                uniforms: bytemuck::bytes_of(&uniforms),
                output: Output::new(write),
            })?;
            read = write;
        }

        copy(backend, "Kawase Resolve", Input::Target(read), Output::new(self.destination))
    }
}
