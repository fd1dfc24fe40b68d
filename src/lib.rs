pub mod error;
pub mod config;
pub mod palette;

// Simulation
pub mod particle;
pub mod orientation;
pub mod collision;
pub mod simulation;

// Rendering
pub mod camera;
pub mod instances;
pub mod assets;
pub mod gpu;
pub mod passes;
pub mod pass_chain;
pub mod renderer;
pub mod app;

pub mod cli;
