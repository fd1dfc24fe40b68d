//! Error types for the simulation, renderer and asset layers.
//!
//! Every error here is fatal for the frame or the process that raised it; nothing
//! is retried internally and no error state is carried across frames.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::particle::ParticleId;

/// Externally supplied texture inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Lut,
    EnvDiffuse,
    EnvSpecular,
    NormalMap,
    Distortion,
    Noise,
}

impl ResourceId {
    pub const ALL: [ResourceId; 6] = [
        ResourceId::Lut,
        ResourceId::EnvDiffuse,
        ResourceId::EnvSpecular,
        ResourceId::NormalMap,
        ResourceId::Distortion,
        ResourceId::Noise,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResourceId::Lut => "lut",
            ResourceId::EnvDiffuse => "env_diffuse",
            ResourceId::EnvSpecular => "env_specular",
            ResourceId::NormalMap => "normal_map",
            ResourceId::Distortion => "distortion",
            ResourceId::Noise => "noise",
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contract violations detected by the simulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// A non-finite value reached the physics step.
    #[error("degenerate input: {what} is not finite")]
    DegenerateInput { what: String },

    /// A particle was constructed with a radius that is not strictly positive.
    #[error("particle {id} has invalid radius {radius}")]
    InvalidRadius { id: ParticleId, radius: f32 },
}

impl SimulationError {
    pub(crate) fn degenerate(what: impl Into<String>) -> Self {
        SimulationError::DegenerateInput { what: what.into() }
    }
}

/// Fatal renderer errors.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A required texture or lookup table was not supplied at startup.
    #[error("required resource `{0}` was not supplied")]
    ResourceMissing(ResourceId),

    /// A GPU buffer or render target could not be created.
    #[error("failed to allocate {what}: {reason}")]
    Allocation { what: String, reason: String },

    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to create the GPU device.
    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// Reading the presented frame back to the CPU failed.
    #[error("failed to read back frame: {0}")]
    Readback(String),
}

/// Errors raised while loading external assets.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Pixel data does not match the declared dimensions.
    #[error("image is {width}x{height} but has {len} bytes of RGBA data")]
    Dimensions { width: u32, height: u32, len: usize },
}

/// Errors raised while reading configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Error for one application frame.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Render(#[from] RenderError),
}
