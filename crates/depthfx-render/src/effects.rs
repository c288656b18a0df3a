//! Effect graph descriptors.
//!
//! The renderer is a single engine; what it draws is decided by the
//! [`EffectGraph`] injected at construction.

use depthfx_core::DepthFxResult;

use crate::graph::{PassGraph, PassSetup, RenderPass, EXTERNAL_INPUTS};
use crate::passes::{BilateralPass, CocEncoding, CocPass, CompositePass, DofBlurPass, ParallaxPass};

/// Builds the pass list for one effect.
pub trait EffectGraph: Send {
    fn name(&self) -> &'static str;

    /// Create the passes against a live GPU context. Called on
    /// initialization and again after every context restore.
    fn build(&self, setup: &mut PassSetup<'_>) -> DepthFxResult<PassGraph>;
}

/// Depth-of-field with a moving focal plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct RackFocus {
    coc_encoding: Option<CocEncoding>,
}

impl RackFocus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip format negotiation and store the CoC as `encoding`.
    pub fn with_coc_encoding(mut self, encoding: CocEncoding) -> Self {
        self.coc_encoding = Some(encoding);
        self
    }
}

impl EffectGraph for RackFocus {
    fn name(&self) -> &'static str {
        "rack-focus"
    }

    fn build(&self, setup: &mut PassSetup<'_>) -> DepthFxResult<PassGraph> {
        let bilateral = BilateralPass::new(setup)?;
        let encoding = self
            .coc_encoding
            .unwrap_or_else(|| CocEncoding::negotiate(setup.gpu));
        let coc = CocPass::new(setup, encoding)?;
        let blur = DofBlurPass::new(setup, encoding)?;
        let composite = CompositePass::new(setup, encoding)?;

        let passes: Vec<Box<dyn RenderPass>> = vec![
            Box::new(bilateral),
            Box::new(coc),
            Box::new(blur),
            Box::new(composite),
        ];
        PassGraph::new(passes, EXTERNAL_INPUTS)
    }
}

/// Pointer-driven depth parallax.
#[derive(Debug, Clone, Copy, Default)]
pub struct Parallax;

impl EffectGraph for Parallax {
    fn name(&self) -> &'static str {
        "parallax"
    }

    fn build(&self, setup: &mut PassSetup<'_>) -> DepthFxResult<PassGraph> {
        let passes: Vec<Box<dyn RenderPass>> = vec![
            Box::new(BilateralPass::new(setup)?),
            Box::new(ParallaxPass::new(setup)?),
        ];
        PassGraph::new(passes, EXTERNAL_INPUTS)
    }
}

/// Look up an effect by its CLI name.
pub fn effect_by_name(name: &str) -> Option<Box<dyn EffectGraph>> {
    match name {
        "rack-focus" | "dof" => Some(Box::new(RackFocus::new())),
        "parallax" => Some(Box::new(Parallax)),
        _ => None,
    }
}
