use depthfx_core::DepthFxResult;

use super::{ensure_target, CocEncoding, FullscreenPipeline};
use crate::graph::{slots, FrameContext, PassSetup, PassTarget, RenderPass};
use crate::gpu::GpuContext;
use crate::registry::{GpuTexture, TextureRegistry, TextureUnit};
use crate::viewport::Viewport;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct DofUniforms {
    cover: [f32; 4],
    texel: [f32; 2],
    max_radius: f32,
    sample_count: f32,
    highlight_threshold: f32,
    highlight_gain: f32,
    coc_packed: f32,
    _pad: f32,
}

/// Stochastic disc blur scaled by the CoC, with bokeh highlight boost.
pub struct DofBlurPass {
    pipeline: FullscreenPipeline,
    video: TextureUnit,
    coc: TextureUnit,
    output: TextureUnit,
    encoding: CocEncoding,
    max_radius: f32,
    sample_count: u32,
    highlight_threshold: f32,
    highlight_gain: f32,
}

impl DofBlurPass {
    pub const READS: &'static [&'static str] = &[slots::VIDEO, slots::COC];

    pub fn new(setup: &mut PassSetup<'_>, encoding: CocEncoding) -> DepthFxResult<Self> {
        let video = setup.registry.register(slots::VIDEO, wgpu::TextureFormat::Rgba8Unorm)?;
        let coc = setup.registry.register(slots::COC, encoding.format())?;
        let output = setup
            .registry
            .register(slots::BLURRED, wgpu::TextureFormat::Rgba8Unorm)?;
        let pipeline = FullscreenPipeline::new::<DofUniforms>(
            setup.gpu,
            "dof_blur",
            include_str!("../shaders/dof_blur.wgsl"),
            2,
            wgpu::TextureFormat::Rgba8Unorm,
        )?;
        Ok(Self {
            pipeline,
            video,
            coc,
            output,
            encoding,
            max_radius: setup.config.max_blur_radius,
            sample_count: setup.quality.sample_count,
            highlight_threshold: setup.config.highlight_threshold,
            highlight_gain: setup.config.highlight_gain,
        })
    }
}

impl RenderPass for DofBlurPass {
    fn name(&self) -> &'static str {
        "dof_blur"
    }

    fn reads(&self) -> &[&'static str] {
        Self::READS
    }

    fn writes(&self) -> PassTarget {
        PassTarget::Slot(slots::BLURRED)
    }

    fn resize(
        &mut self,
        gpu: &GpuContext,
        registry: &mut TextureRegistry<GpuTexture>,
        viewport: &Viewport,
    ) -> DepthFxResult<()> {
        let (w, h) = viewport.working_size();
        ensure_target(gpu, registry, self.output, w, h)?;
        Ok(())
    }

    fn execute(&mut self, ctx: &mut FrameContext<'_>) -> DepthFxResult<()> {
        let registry = ctx.registry;
        let video = &registry.get(self.video)?.view;
        let coc = &registry.get(self.coc)?.view;
        let output = &registry.get(self.output)?.view;
        let uniforms = DofUniforms {
            cover: ctx.frame.cover.to_vec4(),
            texel: ctx.frame.viewport.working_texel_size(),
            max_radius: self.max_radius,
            sample_count: self.sample_count as f32,
            highlight_threshold: self.highlight_threshold,
            highlight_gain: self.highlight_gain,
            coc_packed: self.encoding.shader_flag(),
            _pad: 0.0,
        };
        self.pipeline.write_uniforms(&ctx.gpu.queue, &uniforms);
        self.pipeline
            .draw(&ctx.gpu.device, ctx.encoder, &[video, coc], output);
        Ok(())
    }

    fn dispose(&mut self, registry: &mut TextureRegistry<GpuTexture>) {
        registry.release(self.output);
    }
}
