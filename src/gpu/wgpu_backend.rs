//! Headless `wgpu` implementation of [`GpuBackend`].
//!
//! Every draw records into one command encoder that is submitted at
//! [`GpuBackend::end_frame`]. Uniform blocks go into a ring of 256-byte slots
//! addressed with dynamic offsets, so draws inside one encoder never overwrite
//! each other's uniforms. When the ring fills up mid-frame the encoder is
//! submitted early and the ring restarts.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::assets::ImageData;
use crate::error::{RenderError, ResourceId};
use crate::gpu::backend::{
    Filter, FullscreenDraw, GpuBackend, Input, Program, SceneDraw, TargetAllocation, TargetFormat, TargetId,
};
use crate::gpu::mesh::{self, Vertex};
use crate::gpu::pipeline::{self, QUAD_VERTICES};
use crate::instances::InstanceRaw;

/// Uniform slot size and dynamic offset alignment.
const UNIFORM_ALIGNMENT: usize = 256;

/// Uniform slots available between two submissions.
const UNIFORM_SLOTS: usize = 64;

/// Sphere tessellation.
const SPHERE_LAT_SEGMENTS: u32 = 24;
const SPHERE_LON_SEGMENTS: u32 = 48;

const SCENE_INPUT_COUNT: usize = 5;

fn texture_format(format: TargetFormat) -> wgpu::TextureFormat {
    match format {
        TargetFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TargetFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TargetFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TargetFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

/// Sampler choices shared by all bind groups.
struct Samplers {
    nearest_clamp: wgpu::Sampler,
    linear_clamp: wgpu::Sampler,
    linear_mip_clamp: wgpu::Sampler,
    nearest_repeat: wgpu::Sampler,
    linear_repeat: wgpu::Sampler,
}

impl Samplers {
    fn new(device: &wgpu::Device) -> Self {
        use wgpu::{AddressMode, FilterMode};

        let make = |label: &str, address_mode: AddressMode, filter: FilterMode, mipmap_filter: FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: address_mode,
                address_mode_v: address_mode,
                address_mode_w: address_mode,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter,
                ..Default::default()
            })
        };
        Self {
            nearest_clamp: make("Nearest Clamp Sampler", AddressMode::ClampToEdge, FilterMode::Nearest, FilterMode::Nearest),
            linear_clamp: make("Linear Clamp Sampler", AddressMode::ClampToEdge, FilterMode::Linear, FilterMode::Nearest),
            linear_mip_clamp: make("Linear Mip Sampler", AddressMode::ClampToEdge, FilterMode::Linear, FilterMode::Linear),
            nearest_repeat: make("Nearest Repeat Sampler", AddressMode::Repeat, FilterMode::Nearest, FilterMode::Nearest),
            linear_repeat: make("Linear Repeat Sampler", AddressMode::Repeat, FilterMode::Linear, FilterMode::Nearest),
        }
    }

    fn for_target(&self, filter: Filter, single_mip: bool) -> &wgpu::Sampler {
        match filter {
            Filter::Nearest => &self.nearest_clamp,
            Filter::Linear => &self.linear_clamp,
            Filter::LinearMipmap if single_mip => &self.linear_clamp,
            Filter::LinearMipmap => &self.linear_mip_clamp,
        }
    }

    fn for_resource(&self, id: ResourceId) -> &wgpu::Sampler {
        match id {
            ResourceId::Noise => &self.nearest_repeat,
            ResourceId::NormalMap | ResourceId::Distortion => &self.linear_repeat,
            ResourceId::Lut | ResourceId::EnvDiffuse | ResourceId::EnvSpecular => &self.linear_clamp,
        }
    }
}

struct GpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    mip_views: Vec<wgpu::TextureView>,
    allocation: TargetAllocation,
}

struct GpuResource {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct SphereMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

/// Offscreen renderer state on one device.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    encoder: Option<wgpu::CommandEncoder>,
    frame: u64,

    targets: HashMap<TargetId, GpuTarget>,
    resources: HashMap<ResourceId, GpuResource>,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layouts: HashMap<usize, wgpu::BindGroupLayout>,
    shaders: HashMap<Program, wgpu::ShaderModule>,
    scene_shader: wgpu::ShaderModule,
    pipelines: HashMap<(Program, wgpu::TextureFormat), wgpu::RenderPipeline>,
    scene_pipeline: Option<(Vec<wgpu::TextureFormat>, wgpu::RenderPipeline)>,

    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_cursor: usize,

    quad_vertex_buffer: wgpu::Buffer,
    sphere: SphereMesh,
    instance_buffer: Option<wgpu::Buffer>,
    instance_capacity: usize,
    samplers: Samplers,
}

impl WgpuBackend {
    /// Request a high-performance adapter without a surface.
    pub fn new_headless() -> Result<Self, RenderError> {
        pollster::block_on(Self::request_headless())
    }

    async fn request_headless() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Marbles Device"),
                    ..Default::default()
                },
                None,
            )
            .await?;

        Ok(Self::new(device, queue))
    }

    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Ring Buffer"),
            size: (UNIFORM_ALIGNMENT * UNIFORM_SLOTS) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Ring Bind Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(UNIFORM_ALIGNMENT as u64),
                }),
            }],
        });

        let mut texture_layouts = HashMap::new();
        for count in [1, 2, SCENE_INPUT_COUNT, Program::Composite.input_count()] {
            texture_layouts
                .entry(count)
                .or_insert_with(|| create_texture_layout(&device, count));
        }

        let programs = [
            Program::Copy,
            Program::MipDownsample,
            Program::Kawase,
            Program::Composite,
            Program::BloomThreshold,
            Program::BloomBlur,
            Program::BloomCombine,
            Program::LutGrade,
        ];
        let shaders = programs
            .into_iter()
            .map(|program| {
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&format!("{program:?} Shader")),
                    source: wgpu::ShaderSource::Wgsl(pipeline::program_source(program).into()),
                });
                (program, module)
            })
            .collect();
        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(pipeline::scene_source().into()),
        });

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad Buffer"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let (vertices, indices) = mesh::create_sphere_geometry(SPHERE_LAT_SEGMENTS, SPHERE_LON_SEGMENTS);
        let sphere = SphereMesh {
            vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Sphere Vertex Buffer"),
                contents: bytemuck::cast_slice::<Vertex, u8>(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Sphere Index Buffer"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
            index_count: indices.len() as u32,
        };

        let samplers = Samplers::new(&device);

        Self {
            device,
            queue,
            encoder: None,
            frame: 0,
            targets: HashMap::new(),
            resources: HashMap::new(),
            uniform_layout,
            texture_layouts,
            shaders,
            scene_shader,
            pipelines: HashMap::new(),
            scene_pipeline: None,
            uniform_buffer,
            uniform_bind_group,
            uniform_cursor: 0,
            quad_vertex_buffer,
            sphere,
            instance_buffer: None,
            instance_capacity: 0,
            samplers,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Frame number passed to the last [`GpuBackend::begin_frame`].
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Copy the presented frame back to the CPU as tightly packed RGBA8.
    pub fn read_output(&mut self) -> Result<ImageData, RenderError> {
        self.flush();

        let target = self
            .targets
            .get(&TargetId::Output)
            .ok_or_else(|| RenderError::Readback("output target is not allocated".into()))?;
        let width = target.allocation.width;
        let height = target.allocation.height;

        // Rows must be padded to COPY_BYTES_PER_ROW_ALIGNMENT
        let unpadded_bytes_per_row = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Readback Buffer"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::Readback(e.to_string()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        {
            let data = buffer_slice.get_mapped_range();
            for row in 0..height {
                let start = (row * padded_bytes_per_row) as usize;
                pixels.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
            }
        }
        output_buffer.unmap();

        ImageData::from_rgba(pixels, width, height).map_err(|e| RenderError::Readback(e.to_string()))
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Encoder") })
        })
    }

    /// Submit recorded work and restart the uniform ring.
    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
        self.uniform_cursor = 0;
    }

    /// Copy `bytes` into the next uniform slot and return its dynamic offset.
    fn push_uniforms(&mut self, bytes: &[u8]) -> Result<u32, RenderError> {
        if bytes.len() > UNIFORM_ALIGNMENT {
            return Err(RenderError::Allocation {
                what: "uniform slot".into(),
                reason: format!("{} bytes exceed the {UNIFORM_ALIGNMENT}-byte slot", bytes.len()),
            });
        }
        if self.uniform_cursor == UNIFORM_SLOTS {
            log::debug!("uniform ring full, submitting early");
            self.flush();
        }
        let mut slot = [0u8; UNIFORM_ALIGNMENT];
        slot[..bytes.len()].copy_from_slice(bytes);
        let offset = self.uniform_cursor * UNIFORM_ALIGNMENT;
        self.queue.write_buffer(&self.uniform_buffer, offset as u64, &slot);
        self.uniform_cursor += 1;
        Ok(offset as u32)
    }

    fn target(&self, id: TargetId) -> Result<&GpuTarget, RenderError> {
        self.targets.get(&id).ok_or_else(|| RenderError::Allocation {
            what: format!("target `{id}`"),
            reason: "not allocated".into(),
        })
    }

    fn input_binding(&self, input: Input, bilinear: bool) -> Result<(&wgpu::TextureView, &wgpu::Sampler), RenderError> {
        match input {
            Input::Target(id) => {
                let target = self.target(id)?;
                let single = target.allocation.mip_levels == 1;
                let filter = match target.allocation.filter {
                    Filter::Nearest if bilinear => Filter::Linear,
                    filter => filter,
                };
                Ok((&target.view, self.samplers.for_target(filter, single)))
            }
            Input::TargetMip(id, mip) => {
                let target = self.target(id)?;
                let view = target.mip_views.get(mip as usize).ok_or_else(|| RenderError::Allocation {
                    what: format!("mip {mip} of `{id}`"),
                    reason: format!("target has {} levels", target.allocation.mip_levels),
                })?;
                Ok((view, &self.samplers.linear_clamp))
            }
            Input::Resource(id) => {
                let resource = self.resources.get(&id).ok_or(RenderError::ResourceMissing(id))?;
                Ok((&resource.view, self.samplers.for_resource(id)))
            }
        }
    }

    /// `bilinear` forces filtered reads of targets that are normally sampled nearest.
    fn texture_bind_group(&self, label: &str, inputs: &[Input], bilinear: bool) -> Result<wgpu::BindGroup, RenderError> {
        let layout = self.texture_layouts.get(&inputs.len()).ok_or_else(|| RenderError::Allocation {
            what: format!("bind group layout for {} inputs", inputs.len()),
            reason: "unsupported input count".into(),
        })?;
        let bindings = inputs
            .iter()
            .map(|&input| self.input_binding(input, bilinear))
            .collect::<Result<Vec<_>, _>>()?;
        let entries: Vec<wgpu::BindGroupEntry> = bindings
            .iter()
            .enumerate()
            .flat_map(|(i, (view, sampler))| {
                [
                    wgpu::BindGroupEntry {
                        binding: (2 * i) as u32,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: (2 * i + 1) as u32,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ]
            })
            .collect();
        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        }))
    }

    fn ensure_fullscreen_pipeline(&mut self, program: Program, format: wgpu::TextureFormat) {
        if self.pipelines.contains_key(&(program, format)) {
            return;
        }
        let texture_layout = &self.texture_layouts[&program.input_count()];
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{program:?} Pipeline Layout")),
            bind_group_layouts: &[&self.uniform_layout, texture_layout],
            push_constant_ranges: &[],
        });
        let pipeline = pipeline::create_fullscreen_pipeline(
            &self.device,
            &format!("{program:?} Pipeline"),
            &self.shaders[&program],
            &layout,
            format,
        );
        log::debug!("created {program:?} pipeline for {format:?}");
        self.pipelines.insert((program, format), pipeline);
    }

    fn ensure_scene_pipeline(&mut self, color_formats: &[wgpu::TextureFormat], depth_format: wgpu::TextureFormat) {
        if matches!(&self.scene_pipeline, Some((formats, _)) if formats.as_slice() == color_formats) {
            return;
        }
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&self.uniform_layout, &self.texture_layouts[&SCENE_INPUT_COUNT]],
            push_constant_ranges: &[],
        });
        let pipeline =
            pipeline::create_scene_pipeline(&self.device, &self.scene_shader, &layout, color_formats, depth_format);
        self.scene_pipeline = Some((color_formats.to_vec(), pipeline));
    }

    fn create_target(&self, allocation: &TargetAllocation) -> GpuTarget {
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if !allocation.format.is_depth() {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(allocation.id.name()),
            size: wgpu::Extent3d {
                width: allocation.width,
                height: allocation.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: allocation.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(allocation.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mip_views = (0..allocation.mip_levels)
            .map(|level| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        GpuTarget {
            texture,
            view,
            mip_views,
            allocation: *allocation,
        }
    }

    /// Run `f` inside out-of-memory and validation error scopes.
    fn scoped<T>(&self, what: &str, f: impl FnOnce(&Self) -> T) -> Result<T, RenderError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(self);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match out_of_memory.or(validation) {
            Some(error) => Err(RenderError::Allocation {
                what: what.to_string(),
                reason: error.to_string(),
            }),
            None => Ok(value),
        }
    }
}

fn create_texture_layout(device: &wgpu::Device, inputs: usize) -> wgpu::BindGroupLayout {
    let entries: Vec<wgpu::BindGroupLayoutEntry> = (0..inputs)
        .flat_map(|i| {
            [
                wgpu::BindGroupLayoutEntry {
                    binding: (2 * i) as u32,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: (2 * i + 1) as u32,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ]
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{inputs}-Input Texture Layout")),
        entries: &entries,
    })
}

impl GpuBackend for WgpuBackend {
    fn begin_frame(&mut self, frame: u64) {
        // Leftovers from a frame that never reached end_frame are dropped.
        self.discard_frame();
        self.frame = frame;
        self.encoder();
    }

    fn allocate_targets(&mut self, targets: &[TargetAllocation]) -> Result<(), RenderError> {
        // Work recorded against the old targets must not be lost.
        self.flush();
        let created = self.scoped("render targets", |backend| {
            targets
                .iter()
                .map(|allocation| (allocation.id, backend.create_target(allocation)))
                .collect::<HashMap<_, _>>()
        })?;
        for old in std::mem::replace(&mut self.targets, created).into_values() {
            old.texture.destroy();
        }
        Ok(())
    }

    fn upload_resource(&mut self, id: ResourceId, image: &ImageData) -> Result<(), RenderError> {
        let size = wgpu::Extent3d {
            width: image.width(),
            height: image.height(),
            depth_or_array_layers: 1,
        };
        let texture = self.scoped(id.name(), |backend| {
            backend.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(id.name()),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.pixels(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width()),
                rows_per_image: Some(image.height()),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("uploaded {id} ({}x{})", image.width(), image.height());
        self.resources.insert(id, GpuResource { texture, view });
        Ok(())
    }

    fn write_instances(&mut self, instances: &[InstanceRaw]) -> Result<(), RenderError> {
        if instances.is_empty() {
            return Ok(());
        }
        if self.instance_buffer.is_none() || self.instance_capacity < instances.len() {
            let capacity = instances.len().next_power_of_two();
            let buffer = self.scoped("instance buffer", |backend| {
                backend.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Instance Buffer"),
                    size: (capacity * std::mem::size_of::<InstanceRaw>()) as u64,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })?;
            self.instance_buffer = Some(buffer);
            self.instance_capacity = capacity;
        }
        if let Some(buffer) = &self.instance_buffer {
            self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(instances));
        }
        Ok(())
    }

    fn draw_scene(&mut self, draw: &SceneDraw<'_>) -> Result<(), RenderError> {
        let color_formats = draw
            .outputs
            .iter()
            .map(|&id| self.target(id).map(|t| texture_format(t.allocation.format)))
            .collect::<Result<Vec<_>, _>>()?;
        let depth_format = texture_format(self.target(draw.depth)?.allocation.format);
        self.ensure_scene_pipeline(&color_formats, depth_format);

        let offset = self.push_uniforms(draw.uniforms)?;
        let textures = self.texture_bind_group("Scene Texture Bind Group", draw.inputs, false)?;
        self.encoder();

        let Self {
            encoder,
            targets,
            scene_pipeline,
            uniform_bind_group,
            sphere,
            instance_buffer,
            ..
        } = self;
        let (Some(encoder), Some((_, pipeline))) = (encoder.as_mut(), scene_pipeline.as_ref()) else {
            return Ok(());
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = draw
            .outputs
            .iter()
            .filter_map(|id| targets.get(id))
            .map(|target| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &target.mip_views[0],
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let depth_view = targets.get(&draw.depth).map(|t| &t.view);

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("G-Buffer Capture Pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let Some(instances) = instance_buffer.as_ref().filter(|_| draw.instance_count > 0) else {
            // Nothing to draw; the pass still clears the G-buffer.
            return Ok(());
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &*uniform_bind_group, &[offset]);
        pass.set_bind_group(1, &textures, &[]);
        pass.set_vertex_buffer(0, sphere.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, instances.slice(..));
        pass.set_index_buffer(sphere.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..sphere.index_count, 0, 0..draw.instance_count);
        Ok(())
    }

    fn draw_fullscreen(&mut self, draw: &FullscreenDraw<'_>) -> Result<(), RenderError> {
        debug_assert_eq!(draw.inputs.len(), draw.program.input_count(), "{}", draw.label);
        let format = texture_format(self.target(draw.output.target)?.allocation.format);
        self.ensure_fullscreen_pipeline(draw.program, format);

        let offset = self.push_uniforms(draw.uniforms)?;
        let textures = self.texture_bind_group(draw.label, draw.inputs, draw.program.samples_between_texels())?;
        self.encoder();

        let Self {
            encoder,
            targets,
            pipelines,
            uniform_bind_group,
            quad_vertex_buffer,
            ..
        } = self;
        let Some(encoder) = encoder.as_mut() else {
            return Ok(());
        };
        let target = targets.get(&draw.output.target).ok_or_else(|| RenderError::Allocation {
            what: format!("target `{}`", draw.output.target),
            reason: "not allocated".into(),
        })?;
        let view = target.mip_views.get(draw.output.mip as usize).ok_or_else(|| RenderError::Allocation {
            what: format!("mip {} of `{}`", draw.output.mip, draw.output.target),
            reason: format!("target has {} levels", target.allocation.mip_levels),
        })?;
        let Some(pipeline) = pipelines.get(&(draw.program, format)) else {
            return Ok(());
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(draw.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &*uniform_bind_group, &[offset]);
        pass.set_bind_group(1, &textures, &[]);
        pass.set_vertex_buffer(0, quad_vertex_buffer.slice(..));
        pass.draw(0..6, 0..1);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        self.flush();
        Ok(())
    }

    fn discard_frame(&mut self) {
        if self.encoder.take().is_some() {
            log::debug!("discarding unsubmitted commands of frame {}", self.frame);
        }
        self.uniform_cursor = 0;
    }

    fn release(&mut self) {
        self.encoder = None;
        for (_, target) in self.targets.drain() {
            target.texture.destroy();
        }
        for (_, resource) in self.resources.drain() {
            resource.texture.destroy();
        }
        if let Some(buffer) = self.instance_buffer.take() {
            buffer.destroy();
        }
        self.instance_capacity = 0;
        self.pipelines.clear();
        self.scene_pipeline = None;
        log::info!("released GPU resources");
    }
}
