use depthfx_core::DepthFxResult;

use super::{ensure_target, FullscreenPipeline, TARGET_USAGE};
use crate::graph::{slots, FrameContext, PassSetup, PassTarget, RenderPass};
use crate::gpu::GpuContext;
use crate::registry::{GpuTexture, TextureRegistry, TextureUnit};
use crate::viewport::Viewport;

/// Storage format of the CoC target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CocEncoding {
    /// Signed value in a single half-float channel.
    Float,
    /// `coc * 0.5 + 0.5` split into high and low bytes of an RG8 target.
    Packed,
}

impl CocEncoding {
    pub fn format(self) -> wgpu::TextureFormat {
        match self {
            CocEncoding::Float => wgpu::TextureFormat::R16Float,
            CocEncoding::Packed => wgpu::TextureFormat::Rg8Unorm,
        }
    }

    /// Shader flag selecting the decode path.
    pub(crate) fn shader_flag(self) -> f32 {
        match self {
            CocEncoding::Float => 0.0,
            CocEncoding::Packed => 1.0,
        }
    }

    /// Pick the float target when the device accepts it as a render target.
    pub fn negotiate(gpu: &GpuContext) -> Self {
        let format = CocEncoding::Float.format();
        let accepted = gpu.supports_render_target(format)
            && gpu
                .try_create(|device| {
                    device.create_texture(&wgpu::TextureDescriptor {
                        label: Some("coc probe"),
                        size: wgpu::Extent3d {
                            width: 1,
                            height: 1,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: 1,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format,
                        usage: TARGET_USAGE,
                        view_formats: &[],
                    })
                })
                .is_some();
        if accepted {
            CocEncoding::Float
        } else {
            tracing::info!("Float CoC target rejected, using packed RG8 encoding");
            CocEncoding::Packed
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct CocUniforms {
    cover: [f32; 4],
    focal_depth: f32,
    aperture: f32,
    focus_range: f32,
    depth_scale: f32,
    coc_packed: f32,
    _pad: [f32; 3],
}

/// Per-pixel signed circle of confusion at working resolution.
pub struct CocPass {
    pipeline: FullscreenPipeline,
    input: TextureUnit,
    output: TextureUnit,
    encoding: CocEncoding,
    aperture: f32,
    focus_range: f32,
    depth_scale: f32,
}

impl CocPass {
    pub const READS: &'static [&'static str] = &[slots::FILTERED_DEPTH];

    /// Build the pass writing `encoding`; see [`CocEncoding::negotiate`].
    pub fn new(setup: &mut PassSetup<'_>, encoding: CocEncoding) -> DepthFxResult<Self> {
        let input = setup
            .registry
            .register(slots::FILTERED_DEPTH, wgpu::TextureFormat::R8Unorm)?;
        let output = setup.registry.register(slots::COC, encoding.format())?;
        let pipeline = FullscreenPipeline::new::<CocUniforms>(
            setup.gpu,
            "coc",
            include_str!("../shaders/coc.wgsl"),
            1,
            encoding.format(),
        )?;
        Ok(Self {
            pipeline,
            input,
            output,
            encoding,
            aperture: setup.config.aperture,
            focus_range: setup.config.focus_range,
            depth_scale: setup.config.depth_scale,
        })
    }

    pub fn encoding(&self) -> CocEncoding {
        self.encoding
    }
}

impl RenderPass for CocPass {
    fn name(&self) -> &'static str {
        "coc"
    }

    fn reads(&self) -> &[&'static str] {
        Self::READS
    }

    fn writes(&self) -> PassTarget {
        PassTarget::Slot(slots::COC)
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
        let input = &registry.get(self.input)?.view;
        let output = &registry.get(self.output)?.view;
        let uniforms = CocUniforms {
            cover: ctx.frame.cover.to_vec4(),
            focal_depth: ctx.frame.focal_depth,
            aperture: self.aperture * ctx.frame.coc_scale,
            focus_range: self.focus_range,
            depth_scale: self.depth_scale,
            coc_packed: self.encoding.shader_flag(),
            _pad: [0.0; 3],
        };
        self.pipeline.write_uniforms(&ctx.gpu.queue, &uniforms);
        self.pipeline.draw(&ctx.gpu.device, ctx.encoder, &[input], output);
        Ok(())
    }

    fn dispose(&mut self, registry: &mut TextureRegistry<GpuTexture>) {
        registry.release(self.output);
    }
}
