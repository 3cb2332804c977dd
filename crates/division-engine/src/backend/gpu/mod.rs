//! `wgpu` backend bound to a window surface.
//!
//! Mapped buffers are CPU shadow copies; unmapping uploads the modified range
//! with `Queue::write_buffer`. Pipelines are built per render pass because wgpu
//! bakes the vertex layout and blend state into the pipeline.
//! Multi-draw is issued as one draw per range. Device calls that can fail
//! validation run inside an error scope and surface as backend errors.

mod frame;
mod init;
mod resources;
mod scope;
mod surface;

pub use init::{GpuInit, GraphicsApi};
pub use resources::{GpuBuffer, GpuPipeline, GpuProgram};

use core::ops::Range;

use anyhow::Context as _;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::backend::{Backend, PipelineDescriptor};
use crate::color::Color;
use crate::error::{EngineError, Result};
use crate::layout::VertexLayout;
use crate::resources::Topology;
use crate::shader::{CompiledProgram, ShaderStage};

use frame::FrameRecording;
use surface::{apply_resize, choose_alpha_mode, choose_surface_format, map_surface_error};

/// Owns the wgpu device and the surface of one window.
///
/// The surface borrows the window, so the window must outlive the backend.
pub struct WgpuBackend<'w> {
    window: &'w Window,
    surface: wgpu::Surface<'w>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    api_name: &'static str,

    frame: Option<FrameRecording>,
}

impl<'w> WgpuBackend<'w> {
    /// Creates the device and configures the window surface.
    ///
    /// Adapter and device acquisition are asynchronous under wgpu.
    pub async fn new(window: &'w Window, init: GpuInit) -> anyhow::Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.api.backends(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .with_context(|| format!("no GPU adapter for {:?}", init.api))?;

        let info = adapter.get_info();
        log::info!("adapter: {} ({:?})", info.name, info.backend);

        let required_features = init.required_features
            | (adapter.features() & wgpu::Features::VERTEX_ATTRIBUTE_64BIT);
        let required_limits = init.required_limits.unwrap_or_else(|| adapter.limits());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("division device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps, init.prefer_srgb)
            .context("no supported surface formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: init.present_mode,
            alpha_mode: choose_alpha_mode(&caps, init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            api_name: api_name(info.backend),
            frame: None,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Drawable size in physical pixels.
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Reconfigures the surface. A zero size defers configuration and skips frames.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        apply_resize(&self.surface, &self.device, &mut self.config, &mut self.size, new_size);
    }

    fn recording(&mut self) -> Result<&mut FrameRecording> {
        self.frame
            .as_mut()
            .ok_or_else(|| EngineError::backend("no frame in progress"))
    }
}

fn api_name(backend: wgpu::Backend) -> &'static str {
    match backend {
        wgpu::Backend::Gl => "opengl",
        wgpu::Backend::Metal => "metal",
        wgpu::Backend::Vulkan => "vulkan",
        wgpu::Backend::Dx12 => "dx12",
        wgpu::Backend::BrowserWebGpu => "webgpu",
        _ => "wgpu",
    }
}

impl Backend for WgpuBackend<'_> {
    type VertexBuffer = GpuBuffer;
    type UniformBuffer = GpuBuffer;
    type Program = GpuProgram;
    type Pipeline = GpuPipeline;

    fn name(&self) -> &'static str {
        self.api_name
    }

    // ── vertex buffers ─────────────────────────────────────────────────────

    fn vertex_buffer_alloc(&mut self, layout: &VertexLayout, capacity: u32) -> Result<GpuBuffer> {
        resources::vertex_buffer(&self.device, layout, capacity)
    }

    fn vertex_buffer_free(&mut self, buffer: GpuBuffer) {
        drop(buffer);
    }

    fn vertex_buffer_unmap(&mut self, buffer: &mut GpuBuffer, modified: Range<usize>) {
        buffer.upload(&self.queue, modified);
    }

    // ── uniform buffers ────────────────────────────────────────────────────

    fn uniform_buffer_alloc(&mut self, size: usize) -> Result<GpuBuffer> {
        resources::uniform_buffer(&self.device, size)
    }

    fn uniform_buffer_free(&mut self, buffer: GpuBuffer) {
        drop(buffer);
    }

    fn uniform_buffer_unmap(&mut self, buffer: &mut GpuBuffer, modified: Range<usize>) {
        buffer.upload(&self.queue, modified);
    }

    // ── programs and pipelines ─────────────────────────────────────────────

    fn program_link(&mut self, program: &CompiledProgram) -> Result<GpuProgram> {
        resources::program(&self.device, program)
    }

    fn program_free(&mut self, program: GpuProgram) {
        drop(program);
    }

    fn pipeline_create(&mut self, desc: &PipelineDescriptor<'_, GpuProgram>) -> Result<GpuPipeline> {
        resources::pipeline(&self.device, self.config.format, desc)
    }

    fn pipeline_free(&mut self, pipeline: GpuPipeline) {
        drop(pipeline);
    }

    // ── frame ──────────────────────────────────────────────────────────────

    fn begin_frame(&mut self, clear: Color) -> Result<()> {
        if self.frame.is_some() {
            return Err(EngineError::backend("begin_frame called twice"));
        }
        if self.size.width == 0 || self.size.height == 0 {
            return Err(EngineError::FrameSkipped("surface has zero size".into()));
        }

        let surface_texture = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(err) => {
                let action =
                    map_surface_error(&self.surface, &self.device, &self.config, self.size, &err);
                return Err(action.into_error(&err));
            }
        };

        self.frame = Some(FrameRecording::new(surface_texture, resources::wgpu_color(clear)));
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &GpuBuffer) -> Result<()> {
        self.recording()?.bind_vertex_buffer(buffer.buffer());
        Ok(())
    }

    fn bind_program(&mut self, _program: &GpuProgram, pipeline: &GpuPipeline) -> Result<()> {
        self.recording()?.bind_pipeline(pipeline);
        Ok(())
    }

    fn bind_uniform(&mut self, buffer: &GpuBuffer, binding: u32, stage: ShaderStage) -> Result<()> {
        self.recording()?.bind_uniform(buffer.buffer(), binding, stage);
        Ok(())
    }

    fn draw(&mut self, _topology: Topology, first: u32, count: u32, instances: u32) -> Result<()> {
        let Self { device, frame, .. } = self;
        let frame = frame
            .as_mut()
            .ok_or_else(|| EngineError::backend("no frame in progress"))?;
        frame.record_draw(device, vec![first..first + count], instances)
    }

    fn multi_draw(
        &mut self,
        _topology: Topology,
        starts: &[u32],
        counts: &[u32],
        instances: u32,
    ) -> Result<()> {
        if starts.len() != counts.len() {
            return Err(EngineError::backend("multi_draw starts and counts differ in length"));
        }
        let ranges = starts.iter().zip(counts).map(|(&s, &c)| s..s + c).collect();

        let Self { device, frame, .. } = self;
        let frame = frame
            .as_mut()
            .ok_or_else(|| EngineError::backend("no frame in progress"))?;
        frame.record_draw(device, ranges, instances)
    }

    fn present(&mut self) -> Result<()> {
        let frame = self
            .frame
            .take()
            .ok_or_else(|| EngineError::backend("present without begin_frame"))?;

        let surface_texture = frame.submit(&self.device, &self.queue);
        self.window.pre_present_notify();
        surface_texture.present();
        Ok(())
    }
}
