use depthfx_core::DepthFxResult;

use super::{CocEncoding, FullscreenPipeline};
use crate::graph::{slots, FrameContext, PassSetup, PassTarget, RenderPass};
use crate::gpu::GpuContext;
use crate::registry::{GpuTexture, TextureRegistry, TextureUnit};
use crate::viewport::Viewport;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct CompositeUniforms {
    cover: [f32; 4],
    vignette_strength: f32,
    blend_scale: f32,
    coc_packed: f32,
    _pad: f32,
}

/// Blends sharp and blurred color by |CoC| and applies the vignette.
pub struct CompositePass {
    pipeline: FullscreenPipeline,
    video: TextureUnit,
    coc: TextureUnit,
    blurred: TextureUnit,
    encoding: CocEncoding,
    vignette_strength: f32,
    blend_scale: f32,
}

impl CompositePass {
    pub const READS: &'static [&'static str] = &[slots::VIDEO, slots::COC, slots::BLURRED];

    pub fn new(setup: &mut PassSetup<'_>, encoding: CocEncoding) -> DepthFxResult<Self> {
        let video = setup.registry.register(slots::VIDEO, wgpu::TextureFormat::Rgba8Unorm)?;
        let coc = setup.registry.register(slots::COC, encoding.format())?;
        let blurred = setup
            .registry
            .register(slots::BLURRED, wgpu::TextureFormat::Rgba8Unorm)?;
        let pipeline = FullscreenPipeline::new::<CompositeUniforms>(
            setup.gpu,
            "composite",
            include_str!("../shaders/composite.wgsl"),
            3,
            setup.display_format,
        )?;
        Ok(Self {
            pipeline,
            video,
            coc,
            blurred,
            encoding,
            vignette_strength: setup.config.vignette_strength,
            blend_scale: setup.config.max_blur_radius,
        })
    }
}

impl RenderPass for CompositePass {
    fn name(&self) -> &'static str {
        "composite"
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
        let coc = &registry.get(self.coc)?.view;
        let blurred = &registry.get(self.blurred)?.view;
        let uniforms = CompositeUniforms {
            cover: ctx.frame.cover.to_vec4(),
            vignette_strength: self.vignette_strength,
            blend_scale: self.blend_scale,
            coc_packed: self.encoding.shader_flag(),
            _pad: 0.0,
        };
        self.pipeline.write_uniforms(&ctx.gpu.queue, &uniforms);
        self.pipeline
            .draw(&ctx.gpu.device, ctx.encoder, &[video, coc, blurred], ctx.display);
        Ok(())
    }
}
