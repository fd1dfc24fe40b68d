//! Application configuration.
//!
//! Everything is loaded from one JSON document. Every struct carries
//! `#[serde(default)]`, so a partial file (or `{}`) yields the built-in scene.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::camera::{CameraConfig, LightConfig};
use crate::error::ConfigError;
use crate::palette;
use crate::particle::DEFAULT_PARTICLE_COUNT;
use crate::pass_chain::PipelineTier;

pub const NORMAL_SCALE_RANGE: (f32, f32) = (0.0, 2.0);
pub const REPEAT_RANGE: (f32, f32) = (1.0, 16.0);

/// Population and RNG seed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    pub particle_count: usize,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            particle_count: DEFAULT_PARTICLE_COUNT,
            seed: 0x2545_F491,
        }
    }
}

/// Tunable scene parameters. Takes effect on the next frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneParams {
    /// Index into the palette table.
    pub palette: usize,
    /// Index into the loaded normal-map set.
    pub normal_id: usize,
    pub normal_scale: f32,
    /// Texture repeat for the normal and sparkle maps.
    pub repeat: f32,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            palette: 10,
            normal_id: 72,
            normal_scale: 1.5,
            repeat: 3.5,
        }
    }
}

impl SceneParams {
    /// Clamp every field into range. Non-finite floats fall back to their defaults.
    ///
    /// `normal_map_count` is the size of the loaded normal-map set.
    pub fn sanitize(&self, normal_map_count: usize) -> Self {
        let defaults = Self::default();
        let clamp = |value: f32, (lo, hi): (f32, f32), fallback: f32, name: &str| {
            if !value.is_finite() {
                log::warn!("{name} is not finite ({value}), using {fallback}");
                return fallback;
            }
            let clamped = value.clamp(lo, hi);
            if clamped != value {
                log::warn!("{name} {value} clamped to {clamped}");
            }
            clamped
        };

        let max_palette = palette::palette_count().saturating_sub(1);
        let max_normal = normal_map_count.saturating_sub(1);
        if self.palette > max_palette {
            log::warn!("palette {} clamped to {max_palette}", self.palette);
        }
        Self {
            palette: self.palette.min(max_palette),
            normal_id: self.normal_id.min(max_normal),
            normal_scale: clamp(self.normal_scale, NORMAL_SCALE_RANGE, defaults.normal_scale, "normalScale"),
            repeat: clamp(self.repeat, REPEAT_RANGE, defaults.repeat, "repeat"),
        }
    }
}

/// Blend used when adding bloom back onto the shaded image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendMode {
    Add,
    #[default]
    Screen,
    ColorDodge,
}

impl BlendMode {
    /// Value of the `blend_mode` uniform.
    pub fn shader_index(self) -> u32 {
        match self {
            BlendMode::Add => 0,
            BlendMode::Screen => 1,
            BlendMode::ColorDodge => 2,
        }
    }
}

/// Maximum bloom blur radius in texels.
pub const MAX_BLOOM_RADIUS: f32 = 32.0;

/// Bloom and grading parameters for the tone pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToneConfig {
    pub threshold: f32,
    pub soft_knee: f32,
    pub intensity: f32,
    pub radius: f32,
    pub blend: BlendMode,
    /// Mix between the ungraded and the LUT-graded colour.
    pub lut_strength: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            soft_knee: 0.5,
            intensity: 0.6,
            radius: 4.0,
            blend: BlendMode::Screen,
            lut_strength: 1.0,
        }
    }
}

impl ToneConfig {
    /// Clamp parameters to safe ranges
    pub fn sanitize(&self) -> Self {
        Self {
            threshold: self.threshold.max(0.0),
            soft_knee: self.soft_knee.clamp(0.0, 1.0),
            intensity: self.intensity.max(0.0),
            radius: self.radius.clamp(0.0, MAX_BLOOM_RADIUS),
            blend: self.blend,
            lut_strength: self.lut_strength.clamp(0.0, 1.0),
        }
    }
}

/// Kernel presets for the Kawase blur, as per-iteration sample offsets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KernelSize {
    VerySmall,
    Small,
    Medium,
    Large,
    #[default]
    VeryLarge,
    Huge,
}

impl KernelSize {
    pub fn offsets(self) -> &'static [f32] {
        match self {
            KernelSize::VerySmall => &[0.0, 0.0],
            KernelSize::Small => &[0.0, 1.0, 1.0],
            KernelSize::Medium => &[0.0, 1.0, 1.0, 2.0],
            KernelSize::Large => &[0.0, 1.0, 2.0, 2.0, 3.0],
            KernelSize::VeryLarge => &[0.0, 1.0, 2.0, 3.0, 4.0, 4.0, 5.0],
            KernelSize::Huge => &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 6.0, 7.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KawaseConfig {
    pub kernel: KernelSize,
    /// Multiplier on every kernel offset.
    pub scale: f32,
}

impl Default for KawaseConfig {
    fn default() -> Self {
        Self {
            kernel: KernelSize::VeryLarge,
            scale: 3.0,
        }
    }
}

/// Pass chain settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub tier: PipelineTier,
    /// Diffuse mip levels replaced by the blurred downsample.
    pub mip_blur_levels: u32,
    pub kawase: KawaseConfig,
    pub tone: ToneConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tier: PipelineTier::Full,
            mip_blur_levels: 4,
            kawase: KawaseConfig::default(),
            tone: ToneConfig::default(),
        }
    }
}

/// Root of the JSON configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub params: SceneParams,
    pub camera: CameraConfig,
    pub light: LightConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
