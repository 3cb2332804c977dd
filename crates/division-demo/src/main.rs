use anyhow::{Context as _, Result};
use bytemuck::{Pod, Zeroable};

use division_engine::backend::gpu::{GpuInit, GraphicsApi, WgpuBackend};
use division_engine::logging::{LoggingConfig, init_logging};
use division_engine::resources::UniformBufferDescriptor;
use division_engine::time::FrameTime;
use division_engine::window::{Runtime, Settings};
use division_engine::{
    App, AppControl, AttributeDescriptor, AttributeType, Color, Context, RenderPassDescriptor,
    ShaderSource, ShaderStage, Topology, UniformBufferId, VertexObject,
};

const SHADER: &str = include_str!("shaders/triangle.wgsl");

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Tint {
    color: [f32; 4],
}

#[derive(Default)]
struct Demo {
    tint: Option<UniformBufferId>,
    elapsed: f32,
}

impl<'w> App<WgpuBackend<'w>> for Demo {
    fn init(&mut self, ctx: &mut Context<WgpuBackend<'w>>) -> Result<()> {
        let attributes = [
            AttributeDescriptor::new(AttributeType::Vec3, 0),
            AttributeDescriptor::new(AttributeType::Vec4, 1),
        ];

        // Two triangles packed into one buffer as separate objects, drawn with one multi-draw.
        let pair = ctx.vertex_buffer_alloc(&attributes, 6, Topology::Triangles)?;
        ctx.vertex_buffer_set_objects(pair, &[VertexObject::new(0, 3), VertexObject::new(3, 3)])?;
        ctx.vertex_buffer_write_values(
            pair,
            0,
            0,
            &[[-0.9f32, -0.9, 0.0], [-0.1, -0.9, 0.0], [-0.5, -0.1, 0.0]],
            0,
        )?;
        ctx.vertex_buffer_write_values(pair, 0, 1, &[[1.0f32, 0.3, 0.3, 1.0]; 3], 0)?;
        ctx.vertex_buffer_write_values(
            pair,
            1,
            0,
            &[[0.1f32, -0.9, 0.0], [0.9, -0.9, 0.0], [0.5, -0.1, 0.0]],
            0,
        )?;
        ctx.vertex_buffer_write_values(pair, 1, 1, &[[0.3f32, 1.0, 0.3, 1.0]; 3], 0)?;

        let single = ctx.vertex_buffer_alloc(&attributes, 3, Topology::Triangles)?;
        ctx.vertex_buffer_write_values(
            single,
            0,
            0,
            &[[-0.5f32, 0.1, 0.0], [0.5, 0.1, 0.0], [0.0, 0.9, 0.0]],
            0,
        )?;
        ctx.vertex_buffer_write_values(
            single,
            0,
            1,
            &[[1.0f32, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0]],
            0,
        )?;

        let tint = ctx.uniform_buffer_alloc(UniformBufferDescriptor::new(
            size_of::<Tint>(),
            0,
            ShaderStage::Fragment,
        ))?;
        ctx.uniform_buffer_write(tint, &Tint { color: [1.0; 4] })?;
        self.tint = Some(tint);

        let program = ctx
            .shader_program_create_linked(&[
                ShaderSource::vertex("vs_main", SHADER),
                ShaderSource::fragment("fs_main", SHADER),
            ])
            .context("failed to link triangle shader")?;

        ctx.render_pass_alloc(&RenderPassDescriptor::new(pair, program).uniform(tint))?;
        ctx.render_pass_alloc(&RenderPassDescriptor::new(single, program).uniform(tint).vertices(0, 3))?;

        log::info!("demo scene ready: {} render passes", ctx.render_passes().count());
        Ok(())
    }

    fn update(&mut self, ctx: &mut Context<WgpuBackend<'w>>, time: FrameTime) -> AppControl {
        self.elapsed += time.dt;

        if let Some(tint) = self.tint {
            let pulse = 0.6 + 0.4 * self.elapsed.sin();
            // Failures already reach the log through the context.
            let _ = ctx.uniform_buffer_write(tint, &Tint { color: [pulse, pulse, pulse, 1.0] });
        }

        AppControl::Continue
    }
}

fn graphics_api() -> GraphicsApi {
    match std::env::var("DIVISION_API").as_deref() {
        Ok("gl" | "opengl") => GraphicsApi::OpenGl,
        Ok("metal") => GraphicsApi::Metal,
        _ => GraphicsApi::Auto,
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let settings = Settings {
        title: "division demo".to_string(),
        clear_color: Color::from_rgba8(5, 5, 13, 255),
        ..Default::default()
    };
    let gpu_init = GpuInit { api: graphics_api(), ..Default::default() };

    Runtime::run(settings, gpu_init, Demo::default())
}
