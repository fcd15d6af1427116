use std::{sync::Arc, time::Duration};
use winit::window::Window;
use instant::Instant;
use glam::Vec2;
use wgpu::util::DeviceExt;

use crate::camera::{Camera, CameraUniform};
use crate::circuit::CircuitAnimator;
use crate::config::AnimatorConfig;
use crate::models::{CircleInstance, FrameBatch, LineVertex, Vertex2D};

const LINES_WGSL: &str = include_str!("./shaders/lines.wgsl");
const CIRCLES_WGSL: &str = include_str!("./shaders/circles.wgsl");

// Initial GPU buffer capacity, in elements. Buffers grow on demand.
const INITIAL_CIRCLE_CAPACITY: u64 = 128;
const INITIAL_LINE_VERTEX_CAPACITY: u64 = 256;

pub struct State {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub is_surface_configured: bool,
    needs_srgb_output_conversion: bool,

    pub camera: Camera,
    pub camera_buffer: wgpu::Buffer,
    pub camera_bind_group: wgpu::BindGroup,
    pub camera_uniform: CameraUniform,
    pub camera_needs_update: bool,

    pub line_render_pipeline: wgpu::RenderPipeline,
    pub circle_render_pipeline: wgpu::RenderPipeline,

    pub circle_instance_buffer: wgpu::Buffer,
    pub quad_vertex_buffer: wgpu::Buffer,
    pub quad_index_buffer: wgpu::Buffer,
    pub line_vertex_buffer: wgpu::Buffer,
    pub batch: FrameBatch,

    pub animator_config: AnimatorConfig,
    pub animator: Option<CircuitAnimator>,
    /// Set by an explicit unmount; keeps resizes from mounting again.
    pub unmounted: bool,
    pub started_at: Instant,

    pub last_frame_instant: Instant,
    pub frame_count_in_second: u32,
    pub current_fps: u32,
}

impl State {
    // Takes Arc<Window> for setup, doesn't store it.
    pub async fn new(window_arc: Arc<Window>, animator_config: AnimatorConfig) -> anyhow::Result<State> {
        let size = window_arc.inner_size();
        let scale_factor = window_arc.scale_factor();

        let gpu = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::BROWSER_WEBGPU,
            ..Default::default()
        });

        // Surface itself is !Send on WASM due to HtmlCanvasElement
        let surface = gpu.create_surface(window_arc)?;

        let adapter = gpu
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let Some(&first_format) = surface_caps.formats.first() else {
            anyhow::bail!("Surface reports no supported texture formats");
        };
        let texture_format = surface_caps.formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or_else(|| {
                log::warn!("No sRGB surface format found, falling back to {:?}", first_format);
                first_format
            });

        // 确定是否需要着色器进行 sRGB 输出转换
        let needs_srgb_output_conversion = !texture_format.is_srgb();

        log::info!(
            "Using {} ({:?}, Target Format: {:?}), Needs Shader sRGB Output Conversion: {}",
            adapter_info.name,
            adapter_info.backend,
            texture_format,
            needs_srgb_output_conversion
        );

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: texture_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let camera = Camera::new(size.width, size.height, scale_factor);
        let camera_uniform = camera.uniform(needs_srgb_output_conversion);

        let camera_buffer = device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("Camera Buffer"),
                contents: bytemuck::cast_slice(&[camera_uniform]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            }
        );

        let camera_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }
            ],
            label: Some("Camera Bind Group Layout"),
        });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                }
            ],
            label: Some("Camera Bind Group"),
        });

        // --- 着色器模块 ---
        let lines_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lines Shader"),
            source: wgpu::ShaderSource::Wgsl(LINES_WGSL.into()),
        });

        let circles_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Circles Shader"),
            source: wgpu::ShaderSource::Wgsl(CIRCLES_WGSL.into()),
        });

        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[
                &camera_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        let line_render_pipeline = create_pipeline(
            &device,
            "Line Render Pipeline",
            &render_pipeline_layout,
            &lines_shader_module,
            &[LineVertex::layout()],
            wgpu::PrimitiveTopology::LineList,
            texture_format,
        );

        let circle_render_pipeline = create_pipeline(
            &device,
            "Circle Render Pipeline",
            &render_pipeline_layout,
            &circles_shader_module,
            &[Vertex2D::layout(), CircleInstance::layout()],
            wgpu::PrimitiveTopology::TriangleList,
            texture_format,
        );

        let circle_instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Circle Instance Buffer"),
            size: INITIAL_CIRCLE_CAPACITY * std::mem::size_of::<CircleInstance>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let quad_vertex_buffer = device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("Quad Vertex Buffer"),
                contents: bytemuck::cast_slice(Vertex2D::QUAD_VERTICES.as_slice()),
                usage: wgpu::BufferUsages::VERTEX,
            }
        );

        let quad_index_buffer = device.create_buffer_init(
            &wgpu::util::BufferInitDescriptor {
                label: Some("Quad Index Buffer"),
                contents: bytemuck::cast_slice(Vertex2D::QUAD_INDICES.as_slice()),
                usage: wgpu::BufferUsages::INDEX,
            }
        );

        let line_vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Line Vertex Buffer"),
            size: INITIAL_LINE_VERTEX_CAPACITY * std::mem::size_of::<LineVertex>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let batch = FrameBatch::new(animator_config.palette.layer_opacity);
        let now = Instant::now();

        Ok( Self {
            surface, device, queue, config, is_surface_configured: false, needs_srgb_output_conversion,
            camera, camera_buffer, camera_bind_group, camera_uniform, camera_needs_update: true,
            line_render_pipeline, circle_render_pipeline,
            circle_instance_buffer, quad_vertex_buffer, quad_index_buffer, line_vertex_buffer, batch,
            animator_config, animator: None, unmounted: false, started_at: now,
            last_frame_instant: now, frame_count_in_second: 0, current_fps: 0,
        })
    }

    /// Time since this state was created; the animator's clock.
    pub fn now(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            log::info!("Resize {}, {}", width, height);
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);

            self.camera.update_viewport(width, height);
            self.camera_needs_update = true;
            self.is_surface_configured = true;

            if self.animator.is_none() || self.animator_config.restart_on_resize {
                self.mount_animator();
            }
            // No request_redraw here, it's App's responsibility
        }
    }

    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        self.camera.set_scale_factor(scale_factor);
        self.camera_needs_update = true;
        // Logical size changed even if the physical one did not
        if self.animator_config.restart_on_resize {
            self.mount_animator();
        }
    }

    /// Reconfigures a lost or outdated surface without touching the animator.
    pub fn reconfigure_surface(&mut self) {
        if self.is_surface_configured {
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Replaces the running animator with a fresh layout for the current
    /// viewport. No-op after an explicit unmount.
    pub fn mount_animator(&mut self) {
        if self.unmounted || !self.is_surface_configured {
            return;
        }
        if let Some(mut previous) = self.animator.take() {
            previous.teardown();
        }
        self.batch = FrameBatch::new(self.animator_config.palette.layer_opacity);
        self.animator = CircuitAnimator::mount(self.camera.logical_size(), self.now(), self.animator_config.clone());
    }

    pub fn unmount_animator(&mut self) {
        self.unmounted = true;
        if let Some(mut animator) = self.animator.take() {
            animator.teardown();
        }
        self.batch.circles.clear();
        self.batch.lines.clear();
    }

    pub fn pointer_moved(&mut self, screen_pos: Vec2) {
        let world_pos = self.camera.screen_to_world(screen_pos);
        let now = self.now();
        let Some(animator) = self.animator.as_mut() else {
            return;
        };
        if let Some(node) = animator.pointer_moved(world_pos, now) {
            log::debug!("Pointer pulsed node {}", node);
        }
    }

    pub fn log_stats(&self) {
        log::info!("FPS: {}", self.current_fps);
        if let Some(animator) = &self.animator {
            log::info!("{:?}, {} timers pending", animator.stats(), animator.pending_timers());
        }
    }

    /// Fires due timers and draws the next frame into the batch. Returns
    /// whether the animation loop should keep running.
    pub fn update(&mut self) -> bool {
        if self.camera_needs_update {
            self.camera_uniform = self.camera.uniform(self.needs_srgb_output_conversion);
            self.queue.write_buffer(
                &self.camera_buffer,
                0,
                bytemuck::cast_slice(&[self.camera_uniform]),
            );
            self.camera_needs_update = false;
        }

        let now = self.now();
        let Some(animator) = self.animator.as_mut() else {
            return false;
        };
        animator.advance(now);
        animator.draw(now, &mut self.batch);
        self.update_gpu_buffers();
        true
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        if !self.is_surface_configured {
            return Ok(());
        }

        // --- FPS Calculation ---
        self.frame_count_in_second += 1;
        let now = Instant::now();
        let elapsed = (now - self.last_frame_instant).as_secs_f32();

        if elapsed >= 1.0 {
            self.current_fps = self.frame_count_in_second;
            self.frame_count_in_second = 0;
            self.last_frame_instant = now;
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.animator_config.palette.background.into_linear_wgpu_color()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);

            if !self.batch.lines.is_empty() {
                render_pass.set_pipeline(&self.line_render_pipeline);
                render_pass.set_vertex_buffer(0, self.line_vertex_buffer.slice(..));
                render_pass.draw(0..self.batch.lines.len() as u32, 0..1);
            }

            if !self.batch.circles.is_empty() {
                render_pass.set_pipeline(&self.circle_render_pipeline);
                render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
                render_pass.set_vertex_buffer(1, self.circle_instance_buffer.slice(..));
                render_pass.set_index_buffer(self.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                render_pass.draw_indexed(
                    0..Vertex2D::QUAD_INDICES.len() as u32,
                    0,
                    0..self.batch.circles.len() as u32,
                );
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn update_gpu_buffers(&mut self) {
        let circle_data: &[u8] = bytemuck::cast_slice(&self.batch.circles);
        let line_data: &[u8] = bytemuck::cast_slice(&self.batch.lines);

        if self.circle_instance_buffer.size() < circle_data.len() as u64 {
            self.circle_instance_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Circle Instance Buffer (Resized)"),
                contents: circle_data,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
        } else if !circle_data.is_empty() {
            self.queue.write_buffer(&self.circle_instance_buffer, 0, circle_data);
        }

        if self.line_vertex_buffer.size() < line_data.len() as u64 {
            self.line_vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Line Vertex Buffer (Resized)"),
                contents: line_data,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
        } else if !line_data.is_empty() {
            self.queue.write_buffer(&self.line_vertex_buffer, 0, line_data);
        }
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    buffers: &[wgpu::VertexBufferLayout],
    topology: wgpu::PrimitiveTopology,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}
