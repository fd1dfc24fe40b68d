//! Pass ordering checks against a backend that stamps every target write.
//!
//! Run with: cargo test --test pipeline_order

use std::collections::HashMap;

use glam::Vec2;
use marbles::app::{App, FrameInput};
use marbles::assets::{AssetBundle, ImageData, ResourceSet};
use marbles::camera::{CameraConfig, LightConfig};
use marbles::config::{AppConfig, PipelineConfig, SceneParams};
use marbles::error::{AppError, RenderError, ResourceId};
use marbles::gpu::backend::{
    FullscreenDraw, GpuBackend, Input, Program, SceneDraw, TargetAllocation, TargetId,
};
use marbles::instances::InstanceRaw;
use marbles::particle::ParticleStore;
use marbles::pass_chain::PipelineTier;
use marbles::renderer::Renderer;

/// Frame number and global sequence of the last write to a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Stamp {
    frame: u64,
    seq: u64,
}

#[derive(Clone, Debug)]
struct Draw {
    label: String,
    program: Option<Program>,
    inputs: Vec<Input>,
    /// Stamps of the targets read, in input order. `None` for resources.
    read: Vec<Option<Stamp>>,
    writes: Vec<TargetId>,
    stamp: Stamp,
}

#[derive(Default)]
struct RecordingBackend {
    frame: u64,
    seq: u64,
    stamps: HashMap<TargetId, Stamp>,
    allocations: Vec<Vec<TargetAllocation>>,
    uploads: Vec<ResourceId>,
    instance_writes: usize,
    /// Submitted draws.
    draws: Vec<Draw>,
    /// Draws recorded since the last submit. Like an open encoder, they survive
    /// `begin_frame` and only `discard_frame` drops them.
    pending: Vec<Draw>,
    fail_allocation: bool,
    /// Label of a fullscreen draw that fails once.
    fail_once: Option<&'static str>,
    released: bool,
}

impl RecordingBackend {
    fn record(&mut self, label: &str, program: Option<Program>, inputs: &[Input], writes: Vec<TargetId>) {
        self.seq += 1;
        let stamp = Stamp {
            frame: self.frame,
            seq: self.seq,
        };
        let read = inputs
            .iter()
            .map(|input| input.target().and_then(|id| self.stamps.get(&id).copied()))
            .collect();
        for &id in &writes {
            self.stamps.insert(id, stamp);
        }
        self.pending.push(Draw {
            label: label.to_string(),
            program,
            inputs: inputs.to_vec(),
            read,
            writes,
            stamp,
        });
    }

    fn frame_draws(&self, frame: u64) -> Vec<&Draw> {
        self.draws.iter().filter(|d| d.stamp.frame == frame).collect()
    }

    fn last_write(&self, frame: u64, id: TargetId) -> Option<Stamp> {
        self.frame_draws(frame)
            .into_iter()
            .filter(|d| d.writes.contains(&id))
            .map(|d| d.stamp)
            .max()
    }

    fn programs(&self, frame: u64) -> Vec<Option<Program>> {
        self.frame_draws(frame).into_iter().map(|d| d.program).collect()
    }
}

impl GpuBackend for RecordingBackend {
    fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
    }

    fn allocate_targets(&mut self, targets: &[TargetAllocation]) -> Result<(), RenderError> {
        if self.fail_allocation {
            return Err(RenderError::Allocation {
                what: "render targets".into(),
                reason: "simulated out of memory".into(),
            });
        }
        self.allocations.push(targets.to_vec());
        Ok(())
    }

    fn upload_resource(&mut self, id: ResourceId, _image: &ImageData) -> Result<(), RenderError> {
        self.uploads.push(id);
        Ok(())
    }

    fn write_instances(&mut self, _instances: &[InstanceRaw]) -> Result<(), RenderError> {
        self.instance_writes += 1;
        Ok(())
    }

    fn draw_scene(&mut self, draw: &SceneDraw<'_>) -> Result<(), RenderError> {
        let mut writes = draw.outputs.to_vec();
        writes.push(draw.depth);
        self.record("scene", None, draw.inputs, writes);
        Ok(())
    }

    fn draw_fullscreen(&mut self, draw: &FullscreenDraw<'_>) -> Result<(), RenderError> {
        assert_eq!(draw.inputs.len(), draw.program.input_count(), "{}", draw.label);
        if self.fail_once == Some(draw.label) {
            self.fail_once = None;
            return Err(RenderError::Allocation {
                what: draw.label.into(),
                reason: "simulated device loss".into(),
            });
        }
        self.record(draw.label, Some(draw.program), draw.inputs, vec![draw.output.target]);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        self.draws.append(&mut self.pending);
        Ok(())
    }

    fn discard_frame(&mut self) {
        self.pending.clear();
    }

    fn release(&mut self) {
        self.released = true;
    }
}

fn resources() -> ResourceSet {
    AssetBundle::procedural(7).resource_set(0)
}

fn renderer(tier: PipelineTier) -> Renderer<RecordingBackend> {
    let config = PipelineConfig {
        tier,
        ..PipelineConfig::default()
    };
    Renderer::new(RecordingBackend::default(), &config, &resources(), 320, 240).unwrap()
}

fn render_frames(renderer: &mut Renderer<RecordingBackend>, frames: usize) {
    let store = ParticleStore::spawn(12, 3);
    for _ in 0..frames {
        renderer
            .render(
                &store,
                &CameraConfig::default(),
                &LightConfig::default(),
                &SceneParams::default(),
                1.0 / 60.0,
            )
            .unwrap();
    }
}

#[test]
fn composite_reads_blurred_targets_from_the_same_frame() {
    let mut renderer = renderer(PipelineTier::Full);
    render_frames(&mut renderer, 3);
    let backend = renderer.backend();

    for frame in 0..3 {
        let composite = backend
            .frame_draws(frame)
            .into_iter()
            .find(|d| d.program == Some(Program::Composite))
            .expect("composite draw");

        let scene = backend.last_write(frame, TargetId::Normal).expect("capture ran");
        for (input, read) in composite.inputs.iter().zip(&composite.read) {
            let Some(id) = input.target() else {
                assert!(read.is_none());
                continue;
            };
            let read = read.expect("target was written before composite");
            assert_eq!(read.frame, frame, "{id} is stale");
            assert!(read.seq >= scene.seq, "{id} was read before capture");
            assert_eq!(Some(read), backend.last_write(frame, id).filter(|s| s.seq < composite.stamp.seq));
        }

        // Blurred copies come from this frame's blur, after this frame's capture.
        for id in [TargetId::BlurredNormal, TargetId::BlurredPosition] {
            let blurred = backend.last_write(frame, id).unwrap();
            assert!(blurred.seq > scene.seq);
            assert!(blurred.seq < composite.stamp.seq);
        }

        // The mip blur finished before composite sampled the diffuse chain.
        let mip_blur = backend
            .frame_draws(frame)
            .into_iter()
            .filter(|d| d.program == Some(Program::MipDownsample))
            .map(|d| d.stamp)
            .max()
            .expect("mip blur ran");
        assert!(mip_blur.seq < composite.stamp.seq);
    }
}

#[test]
fn full_tier_ends_in_output_through_tone() {
    let mut renderer = renderer(PipelineTier::Full);
    render_frames(&mut renderer, 1);
    let draws = renderer.backend().frame_draws(0);

    let last = draws.last().unwrap();
    assert_eq!(last.program, Some(Program::LutGrade));
    assert_eq!(last.label, "LUT Grade");
    assert_eq!(last.writes, vec![TargetId::Output]);
    assert_eq!(last.inputs[1], Input::Resource(ResourceId::Lut));

    let order: Vec<Program> = draws
        .iter()
        .filter_map(|d| d.program)
        .filter(|p| {
            matches!(
                p,
                Program::BloomThreshold | Program::BloomBlur | Program::BloomCombine | Program::LutGrade
            )
        })
        .collect();
    assert_eq!(
        order,
        vec![
            Program::BloomThreshold,
            Program::BloomBlur,
            Program::BloomBlur,
            Program::BloomCombine,
            Program::LutGrade,
        ]
    );
}

#[test]
fn composite_binds_inputs_in_fixed_order() {
    let mut renderer = renderer(PipelineTier::Full);
    render_frames(&mut renderer, 1);
    let composite = renderer
        .backend()
        .frame_draws(0)
        .into_iter()
        .find(|d| d.program == Some(Program::Composite))
        .unwrap()
        .inputs
        .clone();

    assert_eq!(
        composite,
        vec![
            Input::Target(TargetId::Diffuse),
            Input::Target(TargetId::BlurredNormal),
            Input::Target(TargetId::Position),
            Input::Target(TargetId::BlurredPosition),
            Input::Resource(ResourceId::Lut),
            Input::Resource(ResourceId::EnvDiffuse),
            Input::Resource(ResourceId::EnvSpecular),
            Input::Resource(ResourceId::Distortion),
        ]
    );
}

#[test]
fn reduced_tier_is_a_prefix_that_presents_the_composite() {
    let mut full = renderer(PipelineTier::Full);
    let mut reduced = renderer(PipelineTier::Reduced);
    render_frames(&mut full, 1);
    render_frames(&mut reduced, 1);

    let full_programs = full.backend().programs(0);
    let reduced_programs = reduced.backend().programs(0);

    // Everything but the final present matches the start of the full chain.
    let (present, prefix) = reduced_programs.split_last().unwrap();
    assert_eq!(*present, Some(Program::Copy));
    assert_eq!(&full_programs[..prefix.len()], prefix);
    assert_eq!(prefix.last(), Some(&Some(Program::Composite)));

    let last = reduced.backend().frame_draws(0).last().copied().cloned().unwrap();
    assert_eq!(last.inputs, vec![Input::Target(TargetId::Shaded)]);
    assert_eq!(last.writes, vec![TargetId::Output]);
}

#[test]
fn resize_to_same_size_is_idempotent() {
    let mut renderer = renderer(PipelineTier::Full);
    assert_eq!(renderer.backend().allocations.len(), 1);

    assert!(!renderer.resize(320, 240).unwrap());
    assert_eq!(renderer.backend().allocations.len(), 1);

    assert!(renderer.resize(640, 480).unwrap());
    assert!(!renderer.resize(640, 480).unwrap());
    assert_eq!(renderer.backend().allocations.len(), 2);
    assert_eq!(renderer.targets().size(), Some((640, 480)));
}

#[test]
fn failed_allocation_keeps_previous_targets() {
    let mut renderer = renderer(PipelineTier::Full);
    renderer.backend_mut().fail_allocation = true;

    let err = renderer.resize(8192, 8192).unwrap_err();
    assert!(matches!(err, RenderError::Allocation { .. }));
    assert_eq!(renderer.targets().size(), Some((320, 240)));
    assert_eq!(renderer.targets().extent(TargetId::Output), Some((320, 240)));

    // Still renders at the old size.
    render_frames(&mut renderer, 1);
    assert_eq!(renderer.frame_count(), 1);
}

#[test]
fn failed_frame_is_not_submitted_with_the_next() {
    let mut clean = renderer(PipelineTier::Full);
    render_frames(&mut clean, 1);
    let expected = clean.backend().programs(0);

    let mut renderer = renderer(PipelineTier::Full);
    renderer.backend_mut().fail_once = Some("Kawase Resolve");
    let err = renderer
        .render(
            &ParticleStore::spawn(12, 3),
            &CameraConfig::default(),
            &LightConfig::default(),
            &SceneParams::default(),
            1.0 / 60.0,
        )
        .unwrap_err();
    assert!(matches!(err, RenderError::Allocation { .. }));
    assert_eq!(renderer.frame_count(), 0);
    assert!(renderer.backend().draws.is_empty());
    assert!(renderer.backend().pending.is_empty());

    // The retry submits exactly one clean frame.
    render_frames(&mut renderer, 1);
    assert_eq!(renderer.frame_count(), 1);
    assert_eq!(renderer.backend().programs(0), expected);
    assert!(renderer.backend().pending.is_empty());
}

#[test]
fn missing_resource_fails_at_startup() {
    let mut resources = ResourceSet::new();
    let bundle = AssetBundle::procedural(1);
    resources.insert(ResourceId::Lut, bundle.lut.clone().unwrap());
    resources.insert(ResourceId::NormalMap, bundle.normal_maps[0].clone());

    let result = Renderer::new(
        RecordingBackend::default(),
        &PipelineConfig::default(),
        &resources,
        64,
        64,
    );
    assert!(matches!(result, Err(RenderError::ResourceMissing(ResourceId::EnvDiffuse))));
}

#[test]
fn instances_upload_only_when_particles_move() {
    let mut renderer = renderer(PipelineTier::Reduced);
    render_frames(&mut renderer, 3);
    // Same store every frame: uploaded once.
    assert_eq!(renderer.backend().instance_writes, 1);
}

#[test]
fn teardown_releases_backend() {
    let mut renderer = renderer(PipelineTier::Full);
    render_frames(&mut renderer, 1);
    let backend = renderer.teardown();
    assert!(backend.released);
}

#[test]
fn app_frames_advance_simulation_and_swap_normal_maps() {
    let config = AppConfig {
        params: SceneParams {
            normal_id: 0,
            ..SceneParams::default()
        },
        ..AppConfig::default()
    };
    let bundle = AssetBundle::procedural(2);
    let mut app = App::new(&config, bundle, RecordingBackend::default(), 160, 120).unwrap();
    let normal_uploads = |app: &App<RecordingBackend>| {
        app.renderer()
            .backend()
            .uploads
            .iter()
            .filter(|&&id| id == ResourceId::NormalMap)
            .count()
    };
    assert_eq!(normal_uploads(&app), 1);

    let input = FrameInput {
        dt: 1.0 / 60.0,
        pointer: Vec2::new(0.3, -0.2),
        camera: None,
    };
    app.frame(&input).unwrap();
    app.frame(&input).unwrap();
    assert_eq!(app.simulation().ticks(), 2);
    assert_eq!(app.renderer().frame_count(), 2);
    assert_eq!(normal_uploads(&app), 1);

    app.set_params(SceneParams {
        normal_id: 2,
        ..app.params().clone()
    });
    app.frame(&input).unwrap();
    assert_eq!(normal_uploads(&app), 2);

    // Out-of-range ids clamp to the last loaded map.
    app.set_params(SceneParams {
        normal_id: 500,
        ..app.params().clone()
    });
    app.frame(&input).unwrap();
    assert_eq!(app.params().normal_id, 3);
    assert_eq!(normal_uploads(&app), 3);
}

#[test]
fn app_rejects_degenerate_frame_input() {
    let bundle = AssetBundle::procedural(2);
    let mut app = App::new(&AppConfig::default(), bundle, RecordingBackend::default(), 64, 64).unwrap();
    let err = app
        .frame(&FrameInput {
            dt: f32::NAN,
            pointer: Vec2::ZERO,
            camera: None,
        })
        .unwrap_err();
    assert!(matches!(err, AppError::Simulation(_)));
    assert_eq!(app.renderer().frame_count(), 0);
}
