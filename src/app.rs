//! Frame driver tying the simulation to the renderer.

use glam::Vec2;

use crate::assets::AssetBundle;
use crate::camera::{CameraConfig, LightConfig};
use crate::config::{AppConfig, SceneParams};
use crate::error::{AppError, RenderError, ResourceId};
use crate::gpu::backend::GpuBackend;
use crate::palette;
use crate::renderer::Renderer;
use crate::simulation::Simulation;

/// Input for one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameInput {
    /// Seconds since the previous frame.
    pub dt: f32,
    /// Pointer in normalised device coordinates.
    pub pointer: Vec2,
    /// Replaces the current camera when set.
    pub camera: Option<CameraConfig>,
}

pub struct App<B: GpuBackend> {
    simulation: Simulation,
    renderer: Renderer<B>,
    assets: AssetBundle,
    camera: CameraConfig,
    light: LightConfig,
    params: SceneParams,
    applied_palette: Option<usize>,
    applied_normal: usize,
}

impl<B: GpuBackend> App<B> {
    pub fn new(config: &AppConfig, assets: AssetBundle, backend: B, width: u32, height: u32) -> Result<Self, AppError> {
        let params = config.params.sanitize(assets.normal_maps.len());
        let resources = assets.resource_set(params.normal_id);
        let renderer = Renderer::new(backend, &config.pipeline, &resources, width, height)?;

        Ok(Self {
            simulation: Simulation::new(&config.simulation),
            renderer,
            assets,
            camera: config.camera.clone(),
            light: config.light.clone(),
            applied_normal: params.normal_id,
            params,
            applied_palette: None,
        })
    }

    /// Replace the tunables. They are clamped and take effect on the next frame.
    pub fn set_params(&mut self, params: SceneParams) {
        self.params = params;
    }

    pub fn params(&self) -> &SceneParams {
        &self.params
    }

    /// Advance the simulation and render one frame.
    pub fn frame(&mut self, input: &FrameInput) -> Result<(), AppError> {
        if let Some(camera) = &input.camera {
            self.camera = camera.clone();
        }

        let params = self.params.sanitize(self.assets.normal_maps.len());
        if self.applied_palette != Some(params.palette) {
            self.simulation.store_mut().apply_colors(&palette::colors(params.palette));
            self.applied_palette = Some(params.palette);
        }
        if self.applied_normal != params.normal_id {
            let image = self
                .assets
                .normal_map(params.normal_id)
                .ok_or(RenderError::ResourceMissing(ResourceId::NormalMap))?;
            self.renderer.set_normal_map(image)?;
            log::debug!("switched to normal map {}", params.normal_id);
            self.applied_normal = params.normal_id;
        }
        self.params = params;

        self.simulation.tick(input.dt, input.pointer)?;
        self.renderer.render(
            self.simulation.store(),
            &self.camera,
            &self.light,
            &self.params,
            input.dt,
        )?;
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool, AppError> {
        Ok(self.renderer.resize(width, height)?)
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn renderer(&self) -> &Renderer<B> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<B> {
        &mut self.renderer
    }

    /// Release GPU resources and return the backend.
    pub fn teardown(self) -> B {
        self.renderer.teardown()
    }
}
