use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::bytes_of;
use glam::Mat4;
use log::warn;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::passes::{OutputChannel, PassGraph, PassId, ShadowSchedule};
use crate::render::common::{LightParams, DEPTH_FORMAT, GBUFFER_FORMATS};
use crate::render::shared::{COMPOSITE_SHADER, GBUFFER_SHADER, SHADOW_SHADER};
use crate::skinning::SkinnedVertex;
use crate::uniforms::{DrawUniforms, MaterialParams, UniformRing};
use crate::SkinnedMesh;

/// GPU renderer backed by wgpu that encodes the character pipeline: two
/// depth-only shadow renders, the four-target geometry pass, and a debug
/// present blit standing in for the external composition stage.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,

    graph: PassGraph,
    lit: bool,

    shadow_targets: [ShadowTarget; 2],
    gbuffer: GBufferTargets,

    shadow_pipelines: [wgpu::RenderPipeline; 2],
    gbuffer_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,

    uniform_ring: UniformRing,
    uniform_buffers: Vec<wgpu::Buffer>,
    uniform_bind_groups: Vec<wgpu::BindGroup>,
    palette_buffers: Vec<wgpu::Buffer>,
    palette_bind_groups: Vec<wgpu::BindGroup>,
    palette_capacity: usize,

    material_bind_group: wgpu::BindGroup,
    shadow_sample_bind_group: wgpu::BindGroup,
    composite_layout: wgpu::BindGroupLayout,
    composite_sampler: wgpu::Sampler,
    composite_bind_group: wgpu::BindGroup,

    mesh: MeshBuffers,
}

impl Renderer {
    /// Initializes the GPU renderer for the provided window and figure.
    ///
    /// `lights` supplies the two shadow casters' depth resolutions; `None`
    /// entries fall back to a 1x1 placeholder map that always reads fully
    /// lit. The palette buffers are sized for `palette_len` bones up front.
    pub async fn new(
        window: Arc<Window>,
        mesh: &SkinnedMesh,
        palette_len: usize,
        lights: [Option<LightParams>; 2],
        material: MaterialParams,
    ) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("viewer-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let lit = lights.iter().any(Option::is_some);
        let shadow_targets = [
            ShadowTarget::create(&device, resolution_of(&lights[0]), "shadow-primary"),
            ShadowTarget::create(&device, resolution_of(&lights[1]), "shadow-secondary"),
        ];
        let gbuffer = GBufferTargets::create(&device, config.width, config.height);

        // Bind group layouts shared by the pipelines.
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw-uniform-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: Some(
                        std::num::NonZeroU64::new(std::mem::size_of::<DrawUniforms>() as u64)
                            .unwrap(),
                    ),
                },
                count: None,
            }],
        });

        let palette_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("palette-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            std::num::NonZeroU64::new(std::mem::size_of::<MaterialParams>() as u64)
                                .unwrap(),
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shadow_sample_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("shadow-sample-layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                        count: None,
                    },
                ],
            });

        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        // Shadow pipelines: depth only, one per light, front-face culled
        // with a small depth bias against acne.
        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADOW_SHADER.into()),
        });
        let shadow_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("shadow-pipeline-layout"),
                bind_group_layouts: &[&draw_layout, &palette_layout],
                push_constant_ranges: &[],
            });
        let shadow_pipelines = [
            create_shadow_pipeline(
                &device,
                &shadow_pipeline_layout,
                &shadow_shader,
                "shadow_primary_vs",
            ),
            create_shadow_pipeline(
                &device,
                &shadow_pipeline_layout,
                &shadow_shader,
                "shadow_secondary_vs",
            ),
        ];

        // Geometry pass writing the four output channels.
        let gbuffer_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gbuffer-shader"),
            source: wgpu::ShaderSource::Wgsl(GBUFFER_SHADER.into()),
        });
        let gbuffer_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("gbuffer-pipeline-layout"),
                bind_group_layouts: &[
                    &draw_layout,
                    &palette_layout,
                    &material_layout,
                    &shadow_sample_layout,
                ],
                push_constant_ranges: &[],
            });
        let gbuffer_targets: Vec<Option<wgpu::ColorTargetState>> = GBUFFER_FORMATS
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();
        let gbuffer_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("gbuffer-pipeline"),
            layout: Some(&gbuffer_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &gbuffer_shader,
                entry_point: "vs_main",
                compilation_options: Default::default(),
                buffers: &[SkinnedVertex::layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &gbuffer_shader,
                entry_point: "fs_main",
                compilation_options: Default::default(),
                targets: &gbuffer_targets,
            }),
            multiview: None,
        });

        // Present blit.
        let composite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("composite-shader"),
            source: wgpu::ShaderSource::Wgsl(COMPOSITE_SHADER.into()),
        });
        let composite_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("composite-pipeline-layout"),
                bind_group_layouts: &[&composite_layout],
                push_constant_ranges: &[],
            });
        let composite_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("composite-pipeline"),
            layout: Some(&composite_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &composite_shader,
                entry_point: "vs_main",
                compilation_options: Default::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &composite_shader,
                entry_point: "fs_main",
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        // Ring-buffered per-draw state so the CPU fills frame N+1 while the
        // GPU reads frame N.
        let uniform_ring = UniformRing::new(UniformRing::DEFAULT_DEPTH);
        let palette_capacity = palette_len.max(1);
        let mut uniform_buffers = Vec::with_capacity(uniform_ring.depth());
        let mut uniform_bind_groups = Vec::with_capacity(uniform_ring.depth());
        let mut palette_buffers = Vec::with_capacity(uniform_ring.depth());
        let mut palette_bind_groups = Vec::with_capacity(uniform_ring.depth());
        for slot in 0..uniform_ring.depth() {
            let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("draw-uniforms-{slot}")),
                size: std::mem::size_of::<DrawUniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            uniform_bind_groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("draw-uniforms-bind-{slot}")),
                layout: &draw_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            }));
            uniform_buffers.push(uniform_buffer);

            let palette_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("palette-{slot}")),
                size: (palette_capacity * std::mem::size_of::<[[f32; 4]; 4]>()) as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            palette_bind_groups.push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("palette-bind-{slot}")),
                layout: &palette_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: palette_buffer.as_entire_binding(),
                }],
            }));
            palette_buffers.push(palette_buffer);
        }

        // Material constants plus a white fallback texture; real texture
        // loading is an external concern.
        let material_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("material"),
            contents: bytes_of(&material),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let white_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("white-texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &white_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[255u8; 4],
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let white_view = white_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let base_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("base-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let material_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material-bind"),
            layout: &material_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: material_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&white_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&base_sampler),
                },
            ],
        });

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let shadow_sample_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-sample-bind"),
            layout: &shadow_sample_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&shadow_targets[0].view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&shadow_targets[1].view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&shadow_sampler),
                },
            ],
        });

        let composite_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("composite-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let composite_bind_group = create_composite_bind_group(
            &device,
            &composite_layout,
            &gbuffer,
            &composite_sampler,
        );

        let mesh = MeshBuffers::from_mesh(&device, mesh, "figure");

        // Shadow maps start cleared to the far plane so an unlit frame
        // samples as fully visible without ever rendering them.
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("shadow-clear-encoder"),
        });
        for target in &shadow_targets {
            clear_depth_pass(&mut encoder, &target.view, "shadow-clear");
        }
        queue.submit(std::iter::once(encoder.finish()));

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            graph: PassGraph::character_pipeline(),
            lit,
            shadow_targets,
            gbuffer,
            shadow_pipelines,
            gbuffer_pipeline,
            composite_pipeline,
            uniform_ring,
            uniform_buffers,
            uniform_bind_groups,
            palette_buffers,
            palette_bind_groups,
            palette_capacity,
            material_bind_group,
            shadow_sample_bind_group,
            composite_layout,
            composite_sampler,
            composite_bind_group,
            mesh,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Resizes the swap chain and the G-buffer to the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.gbuffer = GBufferTargets::create(&self.device, new_size.width, new_size.height);
        self.composite_bind_group = create_composite_bind_group(
            &self.device,
            &self.composite_layout,
            &self.gbuffer,
            &self.composite_sampler,
        );
    }

    /// Publishes the frame's pose and uniform block into the next ring slot
    /// and returns the slot index for `render`.
    ///
    /// The slot's buffers are replaced wholesale; slots still referenced by
    /// in-flight frames are untouched. A palette longer than the capacity
    /// chosen at startup is truncated (the binder rejects such meshes before
    /// drawing); a shorter one is padded with identity so clamped indices
    /// read a valid bone.
    pub fn upload_frame(&mut self, palette: &[Mat4], block: DrawUniforms) -> usize {
        let slot = self.uniform_ring.publish(block);
        self.queue
            .write_buffer(&self.uniform_buffers[slot], 0, bytes_of(&block));

        if palette.len() > self.palette_capacity {
            warn!(
                "palette of {} bones exceeds the configured capacity {}; truncating",
                palette.len(),
                self.palette_capacity
            );
        }
        let mut staged: Vec<[[f32; 4]; 4]> = Vec::with_capacity(self.palette_capacity);
        staged.extend(
            palette
                .iter()
                .take(self.palette_capacity)
                .map(|bone| bone.to_cols_array_2d()),
        );
        staged.resize(self.palette_capacity, Mat4::IDENTITY.to_cols_array_2d());
        self.queue.write_buffer(
            &self.palette_buffers[slot],
            0,
            bytemuck::cast_slice(&staged),
        );

        slot
    }

    /// Encodes one frame in pass-graph order and presents it.
    ///
    /// The command stream fences both shadow renders ahead of the main pass;
    /// `schedule` tracks the same ordering for CPU-side observers.
    pub fn render(
        &mut self,
        slot: usize,
        schedule: &mut ShadowSchedule,
    ) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        schedule.begin();
        for pass in self.graph.order() {
            match pass {
                PassId::ShadowPrimary | PassId::ShadowSecondary => {
                    // an unlit schedule is already Ready and both renders
                    // are skipped
                    if self.lit {
                        let index = if pass == PassId::ShadowPrimary { 0 } else { 1 };
                        self.encode_shadow_pass(&mut encoder, index, slot, pass.name());
                        match pass {
                            PassId::ShadowPrimary => schedule.finish_primary(),
                            _ => schedule.finish_secondary(),
                        }
                    }
                }
                PassId::Main => {
                    debug_assert!(schedule.ready());
                    self.encode_gbuffer_pass(&mut encoder, slot);
                }
            }
        }

        // Debug present of albedo * light; real composition is external.
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("composite-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
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
            pass.set_pipeline(&self.composite_pipeline);
            pass.set_bind_group(0, &self.composite_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        schedule.reset();
        Ok(())
    }

    fn encode_shadow_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        index: usize,
        slot: usize,
        label: &str,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.shadow_targets[index].view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.shadow_pipelines[index]);
        pass.set_bind_group(0, &self.uniform_bind_groups[slot], &[]);
        pass.set_bind_group(1, &self.palette_bind_groups[slot], &[]);
        pass.set_vertex_buffer(0, self.mesh.vertex.slice(..));
        pass.set_index_buffer(self.mesh.index.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..self.mesh.index_count, 0, 0..1);
    }

    fn encode_gbuffer_pass(&self, encoder: &mut wgpu::CommandEncoder, slot: usize) {
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = self
            .gbuffer
            .views
            .iter()
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.gbuffer.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.gbuffer_pipeline);
        pass.set_bind_group(0, &self.uniform_bind_groups[slot], &[]);
        pass.set_bind_group(1, &self.palette_bind_groups[slot], &[]);
        pass.set_bind_group(2, &self.material_bind_group, &[]);
        pass.set_bind_group(3, &self.shadow_sample_bind_group, &[]);
        pass.set_vertex_buffer(0, self.mesh.vertex.slice(..));
        pass.set_index_buffer(self.mesh.index.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..self.mesh.index_count, 0, 0..1);
    }
}

fn resolution_of(light: &Option<LightParams>) -> u32 {
    light.as_ref().map(|l| l.resolution.max(1)).unwrap_or(1)
}

fn create_shadow_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(entry_point),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point,
            compilation_options: Default::default(),
            buffers: &[SkinnedVertex::layout()],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Front),
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: Default::default(),
            bias: wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 1.0,
                clamp: 0.01,
            },
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: None,
        multiview: None,
    })
}

fn create_composite_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    gbuffer: &GBufferTargets,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("composite-bind"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(
                    &gbuffer.views[OutputChannel::Albedo.index()],
                ),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(
                    &gbuffer.views[OutputChannel::Light.index()],
                ),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn clear_depth_pass(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, label: &str) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
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
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &SkinnedMesh, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

/// The four main-pass render targets plus the pass's own depth buffer,
/// indexed by output channel.
struct GBufferTargets {
    _textures: Vec<wgpu::Texture>,
    views: Vec<wgpu::TextureView>,
    _depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
}

impl GBufferTargets {
    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let mut textures = Vec::with_capacity(GBUFFER_FORMATS.len());
        let mut views = Vec::with_capacity(GBUFFER_FORMATS.len());
        for (index, format) in GBUFFER_FORMATS.iter().enumerate() {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("gbuffer-{index}")),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: *format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            views.push(texture.create_view(&wgpu::TextureViewDescriptor::default()));
            textures.push(texture);
        }
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gbuffer-depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _textures: textures,
            views,
            _depth: depth,
            depth_view,
        }
    }
}

struct ShadowTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl ShadowTarget {
    fn create(device: &wgpu::Device, resolution: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: resolution.max(1),
                height: resolution.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_shadow_resolution_is_one_texel() {
        assert_eq!(resolution_of(&None), 1);
    }

    #[test]
    fn configured_resolution_passes_through() {
        let light = LightParams {
            position: glam::Vec3::ZERO,
            target: glam::Vec3::ZERO,
            extent: 12.0,
            near: 1.0,
            far: 20.0,
            resolution: 512,
            color: glam::Vec3::ONE,
            intensity: 1.0,
        };
        assert_eq!(resolution_of(&Some(light)), 512);
    }
}
