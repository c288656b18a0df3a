use depthfx_core::DepthFxResult;

use super::{ensure_target, FullscreenPipeline};
use crate::graph::{slots, FrameContext, FrameState, PassSetup, PassTarget, RenderPass};
use crate::gpu::GpuContext;
use crate::registry::{GpuTexture, TextureRegistry, TextureUnit};
use crate::viewport::Viewport;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct BilateralUniforms {
    texel: [f32; 2],
    radius: f32,
    sigma_space: f32,
    sigma_range: f32,
    _pad: [f32; 3],
}

/// Edge-preserving depth smoothing at depth resolution.
///
/// Runs only when the sampler delivered new depth, or when its target was
/// just recreated.
pub struct BilateralPass {
    pipeline: FullscreenPipeline,
    input: TextureUnit,
    output: TextureUnit,
    depth_size: (u32, u32),
    uniforms: BilateralUniforms,
    dirty: bool,
}

impl BilateralPass {
    pub const READS: &'static [&'static str] = &[slots::RAW_DEPTH];

    pub fn new(setup: &mut PassSetup<'_>) -> DepthFxResult<Self> {
        let input = setup.registry.register(slots::RAW_DEPTH, wgpu::TextureFormat::R8Unorm)?;
        let output = setup
            .registry
            .register(slots::FILTERED_DEPTH, wgpu::TextureFormat::R8Unorm)?;
        let pipeline = FullscreenPipeline::new::<BilateralUniforms>(
            setup.gpu,
            "bilateral",
            include_str!("../shaders/bilateral.wgsl"),
            1,
            wgpu::TextureFormat::R8Unorm,
        )?;
        let (w, h) = setup.depth_size;
        Ok(Self {
            pipeline,
            input,
            output,
            depth_size: setup.depth_size,
            uniforms: BilateralUniforms {
                texel: [1.0 / w.max(1) as f32, 1.0 / h.max(1) as f32],
                radius: setup.quality.bilateral_radius as f32,
                sigma_space: setup.config.bilateral_sigma_space,
                sigma_range: setup.config.bilateral_sigma_range,
                _pad: [0.0; 3],
            },
            dirty: true,
        })
    }
}

impl RenderPass for BilateralPass {
    fn name(&self) -> &'static str {
        "bilateral"
    }

    fn reads(&self) -> &[&'static str] {
        Self::READS
    }

    fn writes(&self) -> PassTarget {
        PassTarget::Slot(slots::FILTERED_DEPTH)
    }

    fn should_execute(&self, frame: &FrameState) -> bool {
        self.dirty || frame.depth_changed
    }

    fn resize(
        &mut self,
        gpu: &GpuContext,
        registry: &mut TextureRegistry<GpuTexture>,
        _viewport: &Viewport,
    ) -> DepthFxResult<()> {
        // Depth-sized, so only (re)created when missing.
        let (w, h) = self.depth_size;
        if ensure_target(gpu, registry, self.output, w, h)? {
            self.dirty = true;
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut FrameContext<'_>) -> DepthFxResult<()> {
        let registry = ctx.registry;
        let input = &registry.get(self.input)?.view;
        let output = &registry.get(self.output)?.view;
        self.pipeline.write_uniforms(&ctx.gpu.queue, &self.uniforms);
        self.pipeline
            .draw(&ctx.gpu.device, ctx.encoder, &[input], output);
        self.dirty = false;
        Ok(())
    }

    fn dispose(&mut self, registry: &mut TextureRegistry<GpuTexture>) {
        registry.release(self.output);
        self.dirty = true;
    }
}
