//! Render-target manager.
//!
//! Owns the fixed target layout and the currently allocated sizes. The layout
//! (formats, filtering, mip counts, scale) is fixed at construction; only the
//! size changes afterwards.

use crate::error::RenderError;
use crate::gpu::backend::{Filter, GpuBackend, TargetAllocation, TargetDesc, TargetFormat, TargetId};

/// Formats and sizing rules for every target.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetLayout {
    entries: Vec<(TargetId, TargetDesc)>,
}

impl TargetLayout {
    /// The layout used by the pass chain. `diffuse_mips` counts the base level.
    pub fn standard(diffuse_mips: u32) -> Self {
        use TargetFormat::*;
        let color = |format, filter, scale| TargetDesc {
            format,
            filter,
            mip_levels: 1,
            scale,
        };
        let entries = vec![
            (
                TargetId::Diffuse,
                TargetDesc {
                    format: Rgba8Unorm,
                    filter: Filter::LinearMipmap,
                    mip_levels: diffuse_mips.max(1),
                    scale: 1.0,
                },
            ),
            (TargetId::Normal, color(Rgba16Float, Filter::Nearest, 1.0)),
            (TargetId::Position, color(Rgba16Float, Filter::Nearest, 1.0)),
            (TargetId::Depth, color(Depth32Float, Filter::Nearest, 1.0)),
            (TargetId::BlurredNormal, color(Rgba16Float, Filter::Linear, 1.0)),
            (TargetId::BlurredPosition, color(Rgba16Float, Filter::Linear, 1.0)),
            (TargetId::BlurScratchA, color(Rgba16Float, Filter::Linear, 0.5)),
            (TargetId::BlurScratchB, color(Rgba16Float, Filter::Linear, 0.5)),
            (TargetId::Shaded, color(Rgba16Float, Filter::Linear, 1.0)),
            (TargetId::BloomA, color(Rgba16Float, Filter::Linear, 0.5)),
            (TargetId::BloomB, color(Rgba16Float, Filter::Linear, 0.5)),
            (TargetId::Bloomed, color(Rgba16Float, Filter::Linear, 1.0)),
            (TargetId::Output, color(Rgba8UnormSrgb, Filter::Linear, 1.0)),
        ];
        Self { entries }
    }

    pub fn desc(&self, id: TargetId) -> Option<&TargetDesc> {
        self.entries.iter().find(|(t, _)| *t == id).map(|(_, d)| d)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(TargetId, TargetDesc)> {
        self.entries.iter()
    }
}

/// Size of one target for a surface dimension.
pub fn scaled_extent(surface: u32, scale: f32) -> u32 {
    ((surface as f32 * scale).floor() as u32).max(1)
}

/// Longest mip chain a `width × height` texture supports.
pub fn max_mip_levels(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Current allocation state of every target.
#[derive(Debug)]
pub struct RenderTargets {
    layout: TargetLayout,
    size: Option<(u32, u32)>,
    allocations: Vec<TargetAllocation>,
}

impl RenderTargets {
    pub fn new(layout: TargetLayout) -> Self {
        Self {
            layout,
            size: None,
            allocations: Vec::new(),
        }
    }

    pub fn layout(&self) -> &TargetLayout {
        &self.layout
    }

    /// Surface size of the live allocation, if any.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    /// Reallocate every target for a `width × height` surface.
    ///
    /// Returns `Ok(false)` without touching the backend when the size is unchanged.
    /// Zero dimensions are clamped to one. On error the previous allocation and
    /// the recorded size are left as they were.
    pub fn resize(&mut self, backend: &mut dyn GpuBackend, width: u32, height: u32) -> Result<bool, RenderError> {
        let size = (width.max(1), height.max(1));
        if self.size == Some(size) {
            return Ok(false);
        }

        let allocations: Vec<TargetAllocation> = self
            .layout
            .iter()
            .map(|&(id, desc)| {
                let w = scaled_extent(size.0, desc.scale);
                let h = scaled_extent(size.1, desc.scale);
                TargetAllocation {
                    id,
                    format: desc.format,
                    filter: desc.filter,
                    width: w,
                    height: h,
                    mip_levels: desc.mip_levels.min(max_mip_levels(w, h)),
                }
            })
            .collect();

        backend.allocate_targets(&allocations)?;

        log::info!("render targets resized to {}x{}", size.0, size.1);
        self.size = Some(size);
        self.allocations = allocations;
        Ok(true)
    }

    pub fn allocation(&self, id: TargetId) -> Option<&TargetAllocation> {
        self.allocations.iter().find(|a| a.id == id)
    }

    /// Allocated mip count, or 0 before the first resize.
    pub fn mip_levels(&self, id: TargetId) -> u32 {
        self.allocation(id).map_or(0, |a| a.mip_levels)
    }

    pub fn extent(&self, id: TargetId) -> Option<(u32, u32)> {
        self.allocation(id).map(|a| (a.width, a.height))
    }

    /// Forget the allocation. Used on teardown.
    pub fn clear(&mut self) {
        self.size = None;
        self.allocations.clear();
    }
}
