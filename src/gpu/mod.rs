pub mod backend;
pub mod mesh;
pub mod pipeline;
pub mod targets;
pub mod wgpu_backend;
