//! The five frame passes.
//!
//! Each pass owns its own state (time accumulators, tuning) and is handed the
//! shared frame state by reference. Passes only talk to the GPU through
//! [`GpuBackend`], naming their inputs and outputs by id.

mod capture;
mod composite;
mod kawase;
mod mip_blur;
mod tone;

pub use capture::CapturePass;
pub use composite::CompositePass;
pub use kawase::KawasePass;
pub use mip_blur::MipBlurPass;
pub use tone::TonePass;

use crate::camera::{CameraConfig, LightConfig};
use crate::config::SceneParams;
use crate::error::RenderError;
use crate::gpu::backend::{FullscreenDraw, GpuBackend, Input, Output, Program, TargetId};
use crate::gpu::targets::RenderTargets;
use crate::instances::InstanceBuffer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    Capture,
    MipBlur,
    IsotropicBlur,
    Composite,
    Tone,
}

/// Per-frame state shared by every pass.
pub struct PassContext<'a> {
    pub frame: u64,
    /// Seconds since the previous frame.
    pub dt: f32,
    pub targets: &'a RenderTargets,
    pub camera: &'a CameraConfig,
    pub light: &'a LightConfig,
    pub params: &'a SceneParams,
    pub instances: &'a InstanceBuffer,
}

impl PassContext<'_> {
    /// Surface aspect ratio, 1 before the first resize.
    pub fn aspect(&self) -> f32 {
        match self.targets.size() {
            Some((w, h)) => w as f32 / h as f32,
            None => 1.0,
        }
    }

    /// Size of one texel of `id` in UV units.
    pub fn texel_size(&self, id: TargetId) -> [f32; 2] {
        let (w, h) = self.targets.extent(id).unwrap_or((1, 1));
        [1.0 / w as f32, 1.0 / h as f32]
    }
}

pub trait FramePass {
    fn kind(&self) -> PassKind;

    /// Target holding this pass's result once it has run.
    fn output(&self) -> TargetId;

    fn execute(&mut self, ctx: &PassContext<'_>, backend: &mut dyn GpuBackend) -> Result<(), RenderError>;
}

/// Resample `source` into `output` with the copy program.
pub(crate) fn copy(
    backend: &mut dyn GpuBackend,
    label: &str,
    source: Input,
    output: Output,
) -> Result<(), RenderError> {
    backend.draw_fullscreen(&FullscreenDraw {
        label,
        program: Program::Copy,
        inputs: &[source],
        uniforms: &[],
        output,
    })
}
