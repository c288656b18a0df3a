//! Ordered render pass graph.
//!
//! A [`PassGraph`] is a strictly sequential list of passes. Each pass
//! declares the slots it reads and the single target it writes; the graph
//! checks at construction that every read is satisfied either by an external
//! input (uploaded by the renderer) or by an earlier pass, and that exactly
//! one pass, the last, writes the display.

use std::collections::HashSet;

use depthfx_core::{DepthFxError, DepthFxResult, QualityParams, ResolvedConfig};

use crate::gpu::GpuContext;
use crate::registry::{GpuTexture, TextureRegistry};
use crate::viewport::{CoverFit, Viewport};

/// Well-known slot names shared by the passes and the renderer.
pub mod slots {
    /// Current media frame, RGBA8, media-sized.
    pub const VIDEO: &str = "video";
    /// Sampled depth as uploaded from the sampler.
    pub const RAW_DEPTH: &str = "depth.raw";
    /// Edge-preserving smoothed depth.
    pub const FILTERED_DEPTH: &str = "depth.filtered";
    /// Signed circle of confusion at working resolution.
    pub const COC: &str = "coc";
    /// Depth-of-field blurred color at working resolution.
    pub const BLURRED: &str = "dof.blurred";
}

/// Slots the renderer uploads before the graph runs.
pub const EXTERNAL_INPUTS: &[&str] = &[slots::VIDEO, slots::RAW_DEPTH];

/// Where a pass draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    Slot(&'static str),
    Display,
}

/// Per-frame values every pass may read.
#[derive(Debug, Clone, Copy)]
pub struct FrameState {
    pub time: f64,
    /// True when the sampler returned a different buffer than last frame.
    pub depth_changed: bool,
    /// Focal depth after the focus callback and breathing offset.
    pub focal_depth: f32,
    /// Breathing multiplier on the CoC magnitude.
    pub coc_scale: f32,
    /// Pointer offset in `[-1, 1]` on both axes.
    pub pointer: [f32; 2],
    pub viewport: Viewport,
    pub cover: CoverFit,
}

/// Everything a pass needs while recording commands.
pub struct FrameContext<'a> {
    pub gpu: &'a GpuContext,
    pub registry: &'a TextureRegistry<GpuTexture>,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub display: &'a wgpu::TextureView,
    pub frame: &'a FrameState,
}

/// Construction-time environment handed to effect graphs.
pub struct PassSetup<'a> {
    pub gpu: &'a GpuContext,
    pub registry: &'a mut TextureRegistry<GpuTexture>,
    pub config: &'a ResolvedConfig,
    pub quality: &'a QualityParams,
    pub display_format: wgpu::TextureFormat,
    /// Size of the sampled depth texture.
    pub depth_size: (u32, u32),
}

/// One step of an effect.
pub trait RenderPass: Send {
    fn name(&self) -> &'static str;

    /// Slot names sampled by this pass.
    fn reads(&self) -> &[&'static str];

    fn writes(&self) -> PassTarget;

    /// Whether to run this frame. Defaults to every frame.
    fn should_execute(&self, _frame: &FrameState) -> bool {
        true
    }

    /// (Re)create viewport-dependent targets.
    fn resize(
        &mut self,
        gpu: &GpuContext,
        registry: &mut TextureRegistry<GpuTexture>,
        viewport: &Viewport,
    ) -> DepthFxResult<()>;

    fn execute(&mut self, ctx: &mut FrameContext<'_>) -> DepthFxResult<()>;

    /// Release the pass's targets.
    fn dispose(&mut self, _registry: &mut TextureRegistry<GpuTexture>) {}
}

/// A validated, ordered pass list.
pub struct PassGraph {
    passes: Vec<Box<dyn RenderPass>>,
}

impl std::fmt::Debug for PassGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassGraph")
            .field("passes", &self.pass_names())
            .finish()
    }
}

impl PassGraph {
    /// Validate declarations and build the graph.
    pub fn new(passes: Vec<Box<dyn RenderPass>>, external_inputs: &[&str]) -> DepthFxResult<Self> {
        if passes.is_empty() {
            return Err(DepthFxError::Graph("graph has no passes".into()));
        }

        let mut available: HashSet<&str> = external_inputs.iter().copied().collect();
        let last = passes.len() - 1;

        for (index, pass) in passes.iter().enumerate() {
            for read in pass.reads() {
                if !available.contains(read) {
                    return Err(DepthFxError::Graph(format!(
                        "pass '{}' reads '{read}' before anything writes it",
                        pass.name()
                    )));
                }
            }
            match pass.writes() {
                PassTarget::Display if index != last => {
                    return Err(DepthFxError::Graph(format!(
                        "pass '{}' writes the display but is not the last pass",
                        pass.name()
                    )));
                }
                PassTarget::Display => {}
                PassTarget::Slot(_) if index == last => {
                    return Err(DepthFxError::Graph(format!(
                        "last pass '{}' must write the display",
                        pass.name()
                    )));
                }
                PassTarget::Slot(slot) => {
                    if !available.insert(slot) {
                        return Err(DepthFxError::Graph(format!(
                            "pass '{}' writes '{slot}', which is already produced",
                            pass.name()
                        )));
                    }
                }
            }
        }

        Ok(Self { passes })
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn resize(
        &mut self,
        gpu: &GpuContext,
        registry: &mut TextureRegistry<GpuTexture>,
        viewport: &Viewport,
    ) -> DepthFxResult<()> {
        for pass in &mut self.passes {
            pass.resize(gpu, registry, viewport)?;
        }
        Ok(())
    }

    /// Record every pass that wants to run this frame, in order.
    pub fn execute(&mut self, ctx: &mut FrameContext<'_>) -> DepthFxResult<()> {
        for pass in &mut self.passes {
            if pass.should_execute(ctx.frame) {
                pass.execute(ctx)?;
            }
        }
        Ok(())
    }

    pub fn dispose(&mut self, registry: &mut TextureRegistry<GpuTexture>) {
        for pass in &mut self.passes {
            pass.dispose(registry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::{BilateralPass, CocPass, CompositePass, DofBlurPass, ParallaxPass};

    struct DeclaredPass {
        name: &'static str,
        reads: Vec<&'static str>,
        writes: PassTarget,
    }

    impl RenderPass for DeclaredPass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn reads(&self) -> &[&'static str] {
            &self.reads
        }

        fn writes(&self) -> PassTarget {
            self.writes
        }

        fn resize(
            &mut self,
            _gpu: &GpuContext,
            _registry: &mut TextureRegistry<GpuTexture>,
            _viewport: &Viewport,
        ) -> DepthFxResult<()> {
            Ok(())
        }

        fn execute(&mut self, _ctx: &mut FrameContext<'_>) -> DepthFxResult<()> {
            Ok(())
        }
    }

    fn pass(name: &'static str, reads: &[&'static str], writes: PassTarget) -> Box<dyn RenderPass> {
        Box::new(DeclaredPass {
            name,
            reads: reads.to_vec(),
            writes,
        })
    }

    fn rack_focus_declarations() -> Vec<Box<dyn RenderPass>> {
        vec![
            pass("bilateral", BilateralPass::READS, PassTarget::Slot(slots::FILTERED_DEPTH)),
            pass("coc", CocPass::READS, PassTarget::Slot(slots::COC)),
            pass("dof_blur", DofBlurPass::READS, PassTarget::Slot(slots::BLURRED)),
            pass("composite", CompositePass::READS, PassTarget::Display),
        ]
    }

    #[test]
    fn test_rack_focus_order_validates() {
        let graph = PassGraph::new(rack_focus_declarations(), EXTERNAL_INPUTS).unwrap();
        assert_eq!(graph.pass_names(), vec!["bilateral", "coc", "dof_blur", "composite"]);
    }

    #[test]
    fn test_parallax_order_validates() {
        let passes = vec![
            pass("bilateral", BilateralPass::READS, PassTarget::Slot(slots::FILTERED_DEPTH)),
            pass("parallax", ParallaxPass::READS, PassTarget::Display),
        ];
        assert_eq!(PassGraph::new(passes, EXTERNAL_INPUTS).unwrap().len(), 2);
    }

    #[test]
    fn test_read_before_write_is_rejected() {
        let mut passes = rack_focus_declarations();
        passes.swap(1, 2);
        let err = PassGraph::new(passes, EXTERNAL_INPUTS).unwrap_err();
        assert!(err.to_string().contains("dof_blur"));
    }

    #[test]
    fn test_display_must_be_last() {
        let passes = vec![
            pass("early", &[slots::VIDEO], PassTarget::Display),
            pass("late", &[slots::VIDEO], PassTarget::Slot(slots::BLURRED)),
        ];
        assert!(PassGraph::new(passes, EXTERNAL_INPUTS).is_err());

        let no_display = vec![pass("only", &[slots::VIDEO], PassTarget::Slot(slots::BLURRED))];
        assert!(PassGraph::new(no_display, EXTERNAL_INPUTS).is_err());
    }

    #[test]
    fn test_duplicate_writer_is_rejected() {
        let passes = vec![
            pass("a", &[slots::RAW_DEPTH], PassTarget::Slot(slots::FILTERED_DEPTH)),
            pass("b", &[slots::RAW_DEPTH], PassTarget::Slot(slots::FILTERED_DEPTH)),
            pass("out", &[slots::FILTERED_DEPTH], PassTarget::Display),
        ];
        assert!(PassGraph::new(passes, EXTERNAL_INPUTS).is_err());
    }

    #[test]
    fn test_empty_graph_is_rejected() {
        assert!(PassGraph::new(Vec::new(), EXTERNAL_INPUTS).is_err());
    }
}
