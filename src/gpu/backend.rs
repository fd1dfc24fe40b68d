//! The command seam between the pass chain and a GPU.
//!
//! Passes never touch `wgpu` directly. They describe draws in terms of
//! [`TargetId`]s, [`ResourceId`]s and [`Program`]s and hand them to a
//! [`GpuBackend`]. The production implementation is
//! [`WgpuBackend`](crate::gpu::wgpu_backend::WgpuBackend); tests substitute a
//! recording double.
//!
//! Commands are issued in pass order between [`GpuBackend::begin_frame`] and
//! [`GpuBackend::end_frame`]. A backend must execute them in that order, which is
//! the only synchronisation the pass chain relies on.

use std::fmt;

use crate::assets::ImageData;
use crate::error::{RenderError, ResourceId};
use crate::instances::InstanceRaw;

/// Render targets owned by the target manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetId {
    Diffuse,
    Normal,
    Position,
    Depth,
    BlurredNormal,
    BlurredPosition,
    BlurScratchA,
    BlurScratchB,
    Shaded,
    BloomA,
    BloomB,
    Bloomed,
    Output,
}

impl TargetId {
    pub const ALL: [TargetId; 13] = [
        TargetId::Diffuse,
        TargetId::Normal,
        TargetId::Position,
        TargetId::Depth,
        TargetId::BlurredNormal,
        TargetId::BlurredPosition,
        TargetId::BlurScratchA,
        TargetId::BlurScratchB,
        TargetId::Shaded,
        TargetId::BloomA,
        TargetId::BloomB,
        TargetId::Bloomed,
        TargetId::Output,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TargetId::Diffuse => "diffuse",
            TargetId::Normal => "normal",
            TargetId::Position => "position",
            TargetId::Depth => "depth",
            TargetId::BlurredNormal => "blurred_normal",
            TargetId::BlurredPosition => "blurred_position",
            TargetId::BlurScratchA => "blur_scratch_a",
            TargetId::BlurScratchB => "blur_scratch_b",
            TargetId::Shaded => "shaded",
            TargetId::BloomA => "bloom_a",
            TargetId::BloomB => "bloom_b",
            TargetId::Bloomed => "bloomed",
            TargetId::Output => "output",
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
    Depth32Float,
}

impl TargetFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TargetFormat::Depth32Float)
    }
}

/// Sampling filter used when a target is read as an input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
    /// Linear within and between mip levels.
    LinearMipmap,
}

/// Fixed per-target layout entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetDesc {
    pub format: TargetFormat,
    pub filter: Filter,
    /// Requested mip levels; clamped to what the size allows.
    pub mip_levels: u32,
    /// Size relative to the surface.
    pub scale: f32,
}

/// A target with its resolved size, as handed to [`GpuBackend::allocate_targets`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetAllocation {
    pub id: TargetId,
    pub format: TargetFormat,
    pub filter: Filter,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
}

/// Compiled GPU programs. Every full-screen program shares one vertex stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Program {
    /// Plain resample of one input.
    Copy,
    /// 13-tap blurred downsample.
    MipDownsample,
    /// One Kawase iteration.
    Kawase,
    /// Deferred-style shading of the G-buffer.
    Composite,
    BloomThreshold,
    BloomBlur,
    BloomCombine,
    LutGrade,
}

impl Program {
    /// Number of sampled inputs the program binds, in order.
    pub fn input_count(self) -> usize {
        match self {
            Program::Copy
            | Program::MipDownsample
            | Program::Kawase
            | Program::BloomThreshold
            | Program::BloomBlur => 1,
            Program::BloomCombine | Program::LutGrade => 2,
            Program::Composite => 8,
        }
    }

    /// Programs whose taps land between texels and need bilinear reads,
    /// whatever filter the source target normally uses.
    pub fn samples_between_texels(self) -> bool {
        matches!(self, Program::MipDownsample | Program::Kawase | Program::BloomBlur)
    }
}

/// A sampled input to a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Input {
    /// A target with its full mip chain.
    Target(TargetId),
    /// A single mip level of a target.
    TargetMip(TargetId, u32),
    /// An externally supplied image.
    Resource(ResourceId),
}

impl Input {
    pub fn target(self) -> Option<TargetId> {
        match self {
            Input::Target(id) | Input::TargetMip(id, _) => Some(id),
            Input::Resource(_) => None,
        }
    }
}

/// Colour attachment of a full-screen draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Output {
    pub target: TargetId,
    pub mip: u32,
}

impl Output {
    pub fn new(target: TargetId) -> Self {
        Self { target, mip: 0 }
    }

    pub fn mip(target: TargetId, mip: u32) -> Self {
        Self { target, mip }
    }
}

/// Instanced sphere draw into the G-buffer.
#[derive(Clone, Copy, Debug)]
pub struct SceneDraw<'a> {
    /// Bytes of the scene uniform block.
    pub uniforms: &'a [u8],
    /// Normal map, sparkle noise, LUT, env diffuse, env specular.
    pub inputs: &'a [Input],
    pub instance_count: u32,
    /// Colour attachments, in shader output order.
    pub outputs: &'a [TargetId],
    pub depth: TargetId,
}

/// One full-screen triangle-pair draw.
#[derive(Clone, Copy, Debug)]
pub struct FullscreenDraw<'a> {
    pub label: &'a str,
    pub program: Program,
    pub inputs: &'a [Input],
    pub uniforms: &'a [u8],
    pub output: Output,
}

/// Rendering commands the pass chain needs from a GPU.
pub trait GpuBackend {
    /// Start recording frame `frame`.
    fn begin_frame(&mut self, frame: u64);

    /// Replace every target with the given allocations.
    ///
    /// Atomic: on error the previous targets stay in place and usable.
    fn allocate_targets(&mut self, targets: &[TargetAllocation]) -> Result<(), RenderError>;

    /// Upload (or replace) an external image.
    fn upload_resource(&mut self, id: ResourceId, image: &ImageData) -> Result<(), RenderError>;

    /// Overwrite the instance buffer, growing it when needed.
    fn write_instances(&mut self, instances: &[InstanceRaw]) -> Result<(), RenderError>;

    fn draw_scene(&mut self, draw: &SceneDraw<'_>) -> Result<(), RenderError>;

    fn draw_fullscreen(&mut self, draw: &FullscreenDraw<'_>) -> Result<(), RenderError>;

    /// Submit everything recorded since [`GpuBackend::begin_frame`].
    fn end_frame(&mut self) -> Result<(), RenderError>;

    /// Drop everything recorded since [`GpuBackend::begin_frame`] without submitting it.
    fn discard_frame(&mut self);

    /// Drop every GPU resource. The backend is unusable afterwards.
    fn release(&mut self);
}
