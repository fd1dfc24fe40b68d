use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glam::Vec2;

use crate::app::{App, FrameInput};
use crate::assets::AssetBundle;
use crate::config::AppConfig;
use crate::gpu::wgpu_backend::WgpuBackend;
use crate::pass_chain::PipelineTier;
use crate::simulation::Simulation;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render frames to disk
    Render {
        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Asset directory (lut.png, env_diffuse.png, env_specular.png, distortion.png, noise.png, normals/)
        #[arg(long, conflicts_with = "procedural_assets")]
        assets: Option<PathBuf>,

        /// Generate every asset instead of loading them
        #[arg(long)]
        procedural_assets: bool,

        /// Number of frames to render
        #[arg(long, default_value_t = 120)]
        frames: u32,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Output width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON pointer path, one `[x, y]` NDC pair per frame
        #[arg(long)]
        pointer: Option<PathBuf>,

        /// Skip bloom and grading
        #[arg(long)]
        reduced: bool,

        /// Override the simulation seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run the physics only and print the final particle state as JSON
    Simulate {
        /// Number of ticks
        #[arg(long, default_value_t = 600)]
        ticks: u32,

        /// Ticks per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON pointer path, one `[x, y]` NDC pair per tick
        #[arg(long)]
        pointer: Option<PathBuf>,

        /// Override the simulation seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            out,
            assets,
            procedural_assets,
            frames,
            fps,
            width,
            height,
            config,
            pointer,
            reduced,
            seed,
        } => {
            let mut config = load_config(config.as_deref(), seed)?;
            if reduced {
                config.pipeline.tier = PipelineTier::Reduced;
            }
            let bundle = match assets {
                Some(dir) => AssetBundle::load_dir(&dir)
                    .with_context(|| format!("loading assets from {}", dir.display()))?
                    .with_generated_noise(config.simulation.seed),
                None => {
                    if !procedural_assets {
                        log::info!("no asset directory given, generating assets");
                    }
                    AssetBundle::procedural(config.simulation.seed)
                }
            };
            let path = load_pointer_path(pointer.as_deref())?;
            render_offline(&config, bundle, &out, frames, fps, width, height, &path)?;
        }
        Commands::Simulate {
            ticks,
            fps,
            config,
            pointer,
            seed,
        } => {
            let config = load_config(config.as_deref(), seed)?;
            let path = load_pointer_path(pointer.as_deref())?;
            let snapshot = simulate(&config, ticks, fps, &path)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>, seed: Option<u64>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load(path).with_context(|| format!("reading {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(seed) = seed {
        config.simulation.seed = seed;
    }
    Ok(config)
}

fn load_pointer_path(path: Option<&Path>) -> Result<Vec<Vec2>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let points: Vec<[f32; 2]> = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("pointer file must be a JSON list of [x, y] pairs: {e}"))?;
    Ok(points.into_iter().map(Vec2::from).collect())
}

/// Pointer for frame `i`; the path holds its last point once exhausted.
fn pointer_at(path: &[Vec2], i: usize) -> Vec2 {
    path.get(i).or(path.last()).copied().unwrap_or(Vec2::ZERO)
}

fn frame_dt(fps: f32) -> Result<f32> {
    if !(fps.is_finite() && fps > 0.0) {
        anyhow::bail!("fps must be positive, got {fps}");
    }
    Ok(1.0 / fps)
}

#[allow(clippy::too_many_arguments)]
fn render_offline(
    config: &AppConfig,
    bundle: AssetBundle,
    out_dir: &Path,
    frames: u32,
    fps: f32,
    width: u32,
    height: u32,
    pointer_path: &[Vec2],
) -> Result<()> {
    let dt = frame_dt(fps)?;
    std::fs::create_dir_all(out_dir)?;

    let backend = WgpuBackend::new_headless()?;
    let mut app = App::new(config, bundle, backend, width, height)?;

    println!("Rendering {} frames to {:?}...", frames, out_dir);

    for i in 0..frames {
        app.frame(&FrameInput {
            dt,
            pointer: pointer_at(pointer_path, i as usize),
            camera: None,
        })?;

        let image = app.renderer_mut().backend_mut().read_output()?;
        let frame_path = out_dir.join(format!("frame_{:05}.png", i));
        image.save_png(&frame_path)?;

        if i % 60 == 0 {
            print!(".");
            std::io::stdout().flush()?;
        }
    }
    println!("\nDone.");

    app.teardown();
    Ok(())
}

fn simulate(config: &AppConfig, ticks: u32, fps: f32, pointer_path: &[Vec2]) -> Result<serde_json::Value> {
    let dt = frame_dt(fps)?;
    let mut simulation = Simulation::new(&config.simulation);
    for i in 0..ticks {
        simulation.tick(dt, pointer_at(pointer_path, i as usize))?;
    }
    log::info!("simulated {} ticks", simulation.ticks());

    let particles: Vec<serde_json::Value> = simulation
        .store()
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id().0,
                "radius": p.radius(),
                "position": p.position.to_array(),
                "velocity": p.velocity.to_array(),
                "rotation": p.rotation.to_array(),
            })
        })
        .collect();
    Ok(serde_json::json!({
        "ticks": simulation.ticks(),
        "particles": particles,
    }))
}
