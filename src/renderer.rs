//! Frame renderer: target manager, uploaded resources and the pass chain.

use crate::assets::{ImageData, ResourceSet};
use crate::camera::{CameraConfig, LightConfig};
use crate::config::{PipelineConfig, SceneParams};
use crate::error::{RenderError, ResourceId};
use crate::gpu::backend::GpuBackend;
use crate::gpu::targets::{RenderTargets, TargetLayout};
use crate::instances::InstanceBuffer;
use crate::particle::ParticleStore;
use crate::pass_chain::PassChain;
use crate::passes::PassContext;

pub struct Renderer<B: GpuBackend> {
    backend: B,
    targets: RenderTargets,
    chain: PassChain,
    instances: InstanceBuffer,
    frame: u64,
}

impl<B: GpuBackend> Renderer<B> {
    /// Upload every resource and allocate targets for a `width × height` surface.
    ///
    /// Fails with [`RenderError::ResourceMissing`] before touching the backend if
    /// any resource is absent.
    pub fn new(
        mut backend: B,
        config: &PipelineConfig,
        resources: &ResourceSet,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        if let Some(missing) = resources.first_missing() {
            return Err(RenderError::ResourceMissing(missing));
        }
        for id in ResourceId::ALL {
            if let Some(image) = resources.get(id) {
                backend.upload_resource(id, image)?;
            }
        }

        let mut targets = RenderTargets::new(TargetLayout::standard(1 + config.mip_blur_levels));
        targets.resize(&mut backend, width, height)?;

        let chain = PassChain::new(config);
        log::info!("renderer ready: {width}x{height}, {:?} tier", chain.tier());

        Ok(Self {
            backend,
            targets,
            chain,
            instances: InstanceBuffer::new(),
            frame: 0,
        })
    }

    /// Reallocate targets. Same size is a no-op.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool, RenderError> {
        self.targets.resize(&mut self.backend, width, height)
    }

    /// Swap the active normal map.
    pub fn set_normal_map(&mut self, image: &ImageData) -> Result<(), RenderError> {
        self.backend.upload_resource(ResourceId::NormalMap, image)
    }

    /// Record and submit one frame.
    pub fn render(
        &mut self,
        store: &ParticleStore,
        camera: &CameraConfig,
        light: &LightConfig,
        params: &SceneParams,
        dt: f32,
    ) -> Result<(), RenderError> {
        self.instances.sync(store);

        self.backend.begin_frame(self.frame);
        let ctx = PassContext {
            frame: self.frame,
            dt,
            targets: &self.targets,
            camera,
            light,
            params,
            instances: &self.instances,
        };
        if let Err(err) = self.chain.execute(&ctx, &mut self.backend) {
            self.backend.discard_frame();
            return Err(err);
        }
        self.backend.end_frame()?;

        self.instances.mark_uploaded();
        self.frame += 1;
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub fn chain(&self) -> &PassChain {
        &self.chain
    }

    /// Frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Release every GPU resource and hand the backend back.
    pub fn teardown(mut self) -> B {
        self.backend.release();
        self.targets.clear();
        log::info!("renderer torn down after {} frames", self.frame);
        self.backend
    }
}
