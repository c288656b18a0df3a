use depthfx_core::DepthFxResult;

use super::FullscreenPipeline;
use crate::graph::{slots, FrameContext, PassSetup, PassTarget, RenderPass};
use crate::gpu::GpuContext;
use crate::registry::{GpuTexture, TextureRegistry, TextureUnit};
use crate::viewport::Viewport;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ParallaxUniforms {
    cover: [f32; 4],
    pointer: [f32; 2],
    strength: f32,
    focus: f32,
}

/// Displaces media UVs by depth and pointer offset.
pub struct ParallaxPass {
    pipeline: FullscreenPipeline,
    video: TextureUnit,
    depth: TextureUnit,
    strength: f32,
    focus: f32,
}

impl ParallaxPass {
    pub const READS: &'static [&'static str] = &[slots::VIDEO, slots::FILTERED_DEPTH];

    pub fn new(setup: &mut PassSetup<'_>) -> DepthFxResult<Self> {
        let video = setup.registry.register(slots::VIDEO, wgpu::TextureFormat::Rgba8Unorm)?;
        let depth = setup
            .registry
            .register(slots::FILTERED_DEPTH, wgpu::TextureFormat::R8Unorm)?;
        let pipeline = FullscreenPipeline::new::<ParallaxUniforms>(
            setup.gpu,
            "parallax",
            include_str!("../shaders/parallax.wgsl"),
            2,
            setup.display_format,
        )?;
        Ok(Self {
            pipeline,
            video,
            depth,
            strength: setup.config.parallax_strength,
            focus: setup.config.parallax_focus,
        })
    }
}

impl RenderPass for ParallaxPass {
    fn name(&self) -> &'static str {
        "parallax"
    }

    fn reads(&self) -> &[&'static str] {
        Self::READS
    }

    fn writes(&self) -> PassTarget {
        PassTarget::Display
    }

    fn resize(
        &mut self,
        _gpu: &GpuContext,
        _registry: &mut TextureRegistry<GpuTexture>,
        _viewport: &Viewport,
    ) -> DepthFxResult<()> {
        Ok(())
    }

    fn execute(&mut self, ctx: &mut FrameContext<'_>) -> DepthFxResult<()> {
        let registry = ctx.registry;
        let video = &registry.get(self.video)?.view;
        let depth = &registry.get(self.depth)?.view;
        let uniforms = ParallaxUniforms {
            cover: ctx.frame.cover.to_vec4(),
            pointer: ctx.frame.pointer,
            strength: self.strength,
            focus: self.focus,
        };
        self.pipeline.write_uniforms(&ctx.gpu.queue, &uniforms);
        self.pipeline
            .draw(&ctx.gpu.device, ctx.encoder, &[video, depth], ctx.display);
        Ok(())
    }
}
