//! The fixed, ordered pass list and its tiers.

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::RenderError;
use crate::gpu::backend::{GpuBackend, Input, Output, TargetId};
use crate::passes::{
    self, CapturePass, CompositePass, FramePass, KawasePass, MipBlurPass, PassContext, PassKind, TonePass,
};

/// How much of the pass list runs. Every tier is a prefix of [`PipelineTier::Full`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineTier {
    #[default]
    Full,
    /// Everything up to and including the composite; no bloom or grading.
    Reduced,
}

impl PipelineTier {
    pub fn includes(self, kind: PassKind) -> bool {
        match self {
            PipelineTier::Full => true,
            PipelineTier::Reduced => kind != PassKind::Tone,
        }
    }
}

/// Ordered passes for one tier.
pub struct PassChain {
    tier: PipelineTier,
    passes: Vec<Box<dyn FramePass>>,
}

impl PassChain {
    pub fn new(config: &PipelineConfig) -> Self {
        let full: Vec<Box<dyn FramePass>> = vec![
            Box::new(CapturePass::new()),
            Box::new(MipBlurPass::new(config.mip_blur_levels)),
            Box::new(KawasePass::new(
                TargetId::Normal,
                TargetId::BlurredNormal,
                config.kawase.clone(),
            )),
            Box::new(KawasePass::new(
                TargetId::Position,
                TargetId::BlurredPosition,
                config.kawase.clone(),
            )),
            Box::new(CompositePass::new()),
            Box::new(TonePass::new(&config.tone)),
        ];

        let passes = full
            .into_iter()
            .take_while(|pass| config.tier.includes(pass.kind()))
            .collect();

        Self {
            tier: config.tier,
            passes,
        }
    }

    pub fn tier(&self) -> PipelineTier {
        self.tier
    }

    /// Pass kinds in execution order.
    pub fn kinds(&self) -> Vec<PassKind> {
        self.passes.iter().map(|pass| pass.kind()).collect()
    }

    /// Run every pass in order, then present into [`TargetId::Output`].
    pub fn execute(&mut self, ctx: &PassContext<'_>, backend: &mut dyn GpuBackend) -> Result<(), RenderError> {
        for pass in &mut self.passes {
            log::debug!("frame {}: {:?}", ctx.frame, pass.kind());
            pass.execute(ctx, backend)?;
        }

        match self.passes.last().map(|pass| pass.output()) {
            Some(last) if last != TargetId::Output => {
                passes::copy(backend, "Present", Input::Target(last), Output::new(TargetId::Output))
            }
            _ => Ok(()),
        }
    }
}
