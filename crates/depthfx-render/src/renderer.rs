//! The renderer orchestrator.
//!
//! One [`Renderer`] drives one effect graph against one GPU context. It owns
//! the lifecycle state machine:
//!
//! ```text
//! Uninitialized -> Initialized -> Running -> Disposed
//!                       ^            |
//!                       |            v
//!                       +------ ContextLost
//! ```
//!
//! Every frame it uploads the media frame, refreshes depth when the host
//! signalled a new video frame (or every frame when it never does), folds
//! pointer and focus input into the frame state, executes the graph and
//! presents.

use std::fmt;
use std::sync::Arc;

use depthfx_core::{
    resolve_quality, DepthFxError, DepthFxResult, DepthSample, DepthSampler, QualityParams,
    ResolvedConfig, SamplerOptions,
};

use crate::effects::EffectGraph;
use crate::gpu::GpuContext;
use crate::graph::{slots, FrameContext, FrameState, PassGraph, PassSetup};
use crate::host::{EventSink, FrameRequestId, FrameScheduler, RendererEvent};
use crate::media::{MediaKind, MediaSource};
use crate::present::Presenter;
use crate::registry::{GpuTexture, TextureRegistry, TextureUnit};
use crate::viewport::{CoverFit, Viewport};

const INPUT_USAGE: wgpu::TextureUsages =
    wgpu::TextureUsages::TEXTURE_BINDING.union(wgpu::TextureUsages::COPY_DST);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    Initialized,
    Running,
    ContextLost,
    Disposed,
}

impl fmt::Display for RendererState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RendererState::Uninitialized => "uninitialized",
            RendererState::Initialized => "initialized",
            RendererState::Running => "running",
            RendererState::ContextLost => "context-lost",
            RendererState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Logical size of the host container.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Container {
    css_width: f32,
    css_height: f32,
    device_pixel_ratio: f32,
}

/// Everything tied to one GPU context. Dropped wholesale on context loss.
struct GpuResources {
    gpu: GpuContext,
    presenter: Box<dyn Presenter>,
    registry: TextureRegistry<GpuTexture>,
    graph: PassGraph,
    quality: QualityParams,
    viewport: Viewport,
    cover: CoverFit,
    video: TextureUnit,
    raw_depth: TextureUnit,
    depth_size: (u32, u32),
}

impl GpuResources {
    fn release(mut self) -> usize {
        self.graph.dispose(&mut self.registry);
        self.registry.release_all()
    }
}

type FocusCallback = Box<dyn FnMut(f64) -> f32 + Send>;

pub struct Renderer {
    config: ResolvedConfig,
    effect: Box<dyn EffectGraph>,
    state: RendererState,
    resources: Option<GpuResources>,
    media: Option<Box<dyn MediaSource>>,
    depth_source_size: (u32, u32),
    container: Option<Container>,
    sampler: Option<Box<dyn DepthSampler>>,
    scheduler: Option<Box<dyn FrameScheduler>>,
    pending_frame: Option<FrameRequestId>,
    events: Option<Box<dyn EventSink>>,
    focus: Option<FocusCallback>,
    pointer: [f32; 2],
    /// `None` until the host first signals a video frame.
    video_frame_pending: Option<bool>,
    last_depth: Option<Arc<DepthSample>>,
    frame_index: u64,
}

impl Renderer {
    pub fn new(config: ResolvedConfig, effect: Box<dyn EffectGraph>) -> Self {
        Self {
            config,
            effect,
            state: RendererState::Uninitialized,
            resources: None,
            media: None,
            depth_source_size: (0, 0),
            container: None,
            sampler: None,
            scheduler: None,
            pending_frame: None,
            events: None,
            focus: None,
            pointer: [0.0, 0.0],
            video_frame_pending: None,
            last_depth: None,
            frame_index: 0,
        }
    }

    pub fn with_event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.events = Some(Box::new(sink));
        self
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn effect_name(&self) -> &'static str {
        self.effect.name()
    }

    pub fn quality(&self) -> Option<&QualityParams> {
        self.resources.as_ref().map(|r| &r.quality)
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.resources.as_ref().map(|r| r.viewport)
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending_frame.is_some()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Options a sampler should be built with to match this renderer's
    /// depth texture. Available once initialized.
    pub fn sampler_options(&self) -> Option<SamplerOptions> {
        let res = self.resources.as_ref()?;
        let (w, h) = res.depth_size;
        Some(SamplerOptions::from_quality(w, h, &res.quality, &self.config))
    }

    /// Acquire GPU resources for `media` and a depth set of
    /// `depth_width x depth_height`.
    ///
    /// Calling it again replaces the previous resources. A disposed
    /// renderer stays disposed and rejects the call.
    pub fn initialize(
        &mut self,
        gpu: GpuContext,
        presenter: Box<dyn Presenter>,
        media: Box<dyn MediaSource>,
        depth_width: u32,
        depth_height: u32,
    ) -> DepthFxResult<()> {
        self.ensure_not_disposed("initialize")?;
        if depth_width == 0 || depth_height == 0 {
            return Err(DepthFxError::InvalidArgument(format!(
                "depth size must be non-zero, got {depth_width}x{depth_height}"
            )));
        }
        let (media_width, media_height) = media.size();
        if media_width == 0 || media_height == 0 {
            return Err(DepthFxError::InvalidArgument("media has no pixels".into()));
        }

        self.teardown();
        self.state = RendererState::Uninitialized;
        self.depth_source_size = (depth_width, depth_height);
        let duration = media.duration();
        self.media = Some(media);

        let resources = self.build_resources(gpu, presenter)?;
        let (width, height) = resources.viewport.size();
        self.resources = Some(resources);
        self.state = RendererState::Initialized;

        tracing::info!(
            effect = self.effect.name(),
            width,
            height,
            "Renderer initialized"
        );
        self.emit(RendererEvent::Ready {
            width: media_width,
            height: media_height,
            duration,
        });
        Ok(())
    }

    /// Begin the frame loop with a depth sampler and the host's scheduler.
    pub fn start(
        &mut self,
        sampler: Box<dyn DepthSampler>,
        scheduler: Box<dyn FrameScheduler>,
    ) -> DepthFxResult<()> {
        if self.state != RendererState::Initialized {
            return Err(DepthFxError::InvalidArgument(format!(
                "start requires an initialized renderer, state is {}",
                self.state
            )));
        }
        if let Some(expected) = self.resources.as_ref().map(|r| r.depth_size) {
            if sampler.target_size() != expected {
                tracing::warn!(
                    sampler = ?sampler.target_size(),
                    ?expected,
                    "Sampler target differs from depth texture, texture will follow the sampler"
                );
            }
        }
        tracing::info!(strategy = sampler.strategy(), "Renderer started");
        self.sampler = Some(sampler);
        self.scheduler = Some(scheduler);
        self.state = RendererState::Running;
        self.schedule_next();
        Ok(())
    }

    /// Override the focal depth per frame. The callback receives playback
    /// time and returns normalized depth.
    pub fn set_focus_callback(&mut self, callback: impl FnMut(f64) -> f32 + Send + 'static) {
        self.focus = Some(Box::new(callback));
    }

    pub fn clear_focus_callback(&mut self) {
        self.focus = None;
    }

    /// Pointer offset from the container centre, each axis in `[-1, 1]`.
    pub fn set_pointer(&mut self, x: f32, y: f32) {
        let clamp = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        self.pointer = [clamp(x), clamp(y)];
    }

    /// Seek the media and treat the jump as a new video frame.
    pub fn seek(&mut self, time_seconds: f64) {
        if let Some(media) = self.media.as_mut() {
            media.seek(time_seconds);
            self.on_video_frame();
        }
    }

    /// Host signal that the media advanced to a new video frame.
    pub fn on_video_frame(&mut self) {
        self.video_frame_pending = Some(true);
    }

    /// Resize for a container of `css_width x css_height` logical pixels.
    pub fn resize(&mut self, css_width: f32, css_height: f32, device_pixel_ratio: f32) -> DepthFxResult<()> {
        self.container = Some(Container {
            css_width,
            css_height,
            device_pixel_ratio,
        });
        let mirror = self.mirror();
        let media_size = self.media.as_ref().map(|m| m.size()).unwrap_or((1, 1));
        let Some(res) = self.resources.as_mut() else {
            return Ok(());
        };

        let viewport = Viewport::from_container(
            css_width,
            css_height,
            device_pixel_ratio,
            &res.quality,
            res.gpu.max_texture_dimension(),
        );
        let surface_changed = res.presenter.configure(&res.gpu, viewport.width, viewport.height)?;
        res.cover = CoverFit::compute(media_size.0, media_size.1, &viewport, mirror);
        if viewport != res.viewport || surface_changed {
            res.viewport = viewport;
            res.graph.resize(&res.gpu, &mut res.registry, &viewport)?;
            tracing::info!(
                width = viewport.width,
                height = viewport.height,
                working_width = viewport.working_width,
                working_height = viewport.working_height,
                "Renderer resized"
            );
        }
        Ok(())
    }

    /// Render one frame. A no-op unless running.
    ///
    /// A failed frame emits [`RendererEvent::Error`] and is returned to the
    /// caller. The renderer stays running and the next frame is still
    /// requested.
    pub fn frame(&mut self) -> DepthFxResult<()> {
        if self.state != RendererState::Running {
            return Ok(());
        }
        self.pending_frame = None;

        if self.resources.as_ref().is_some_and(|r| r.gpu.is_lost()) {
            self.notify_context_lost();
            return Ok(());
        }

        match self.render_frame() {
            Ok(time) => {
                self.frame_index += 1;
                self.emit(RendererEvent::FrameAdvanced {
                    frame: self.frame_index,
                    time,
                });
                self.schedule_next();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Frame failed");
                self.emit(RendererEvent::Error {
                    message: e.to_string(),
                });
                self.schedule_next();
                Err(e)
            }
        }
    }

    /// Read the last presented frame back as RGBA8.
    pub fn capture(&self) -> DepthFxResult<Vec<u8>> {
        let res = self
            .resources
            .as_ref()
            .ok_or_else(|| DepthFxError::InvalidArgument(format!("cannot capture while {}", self.state)))?;
        res.presenter.read_pixels(&res.gpu)
    }

    /// Drop every GPU object after the context was lost.
    pub fn notify_context_lost(&mut self) {
        if !matches!(self.state, RendererState::Running | RendererState::Initialized) {
            return;
        }
        self.cancel_pending();
        if let Some(resources) = self.resources.take() {
            resources.release();
        }
        self.last_depth = None;
        // The restored depth texture starts empty, so the first frame after
        // restore must sample again even if the video is paused.
        if self.video_frame_pending.is_some() {
            self.video_frame_pending = Some(true);
        }
        self.state = RendererState::ContextLost;
        tracing::warn!("GPU context lost, renderer suspended");
    }

    /// Rebuild GPU resources on a fresh context and resume.
    pub fn restore_context(&mut self, gpu: GpuContext, presenter: Box<dyn Presenter>) -> DepthFxResult<()> {
        self.ensure_not_disposed("restore_context")?;
        if self.state != RendererState::ContextLost {
            return Err(DepthFxError::InvalidArgument(format!(
                "restore_context requires a lost context, state is {}",
                self.state
            )));
        }
        let resources = self.build_resources(gpu, presenter)?;
        self.resources = Some(resources);
        self.state = RendererState::Initialized;
        tracing::info!("GPU context restored");

        if self.sampler.is_some() && self.scheduler.is_some() {
            self.state = RendererState::Running;
            self.schedule_next();
        }
        Ok(())
    }

    /// Release GPU objects, cancel the pending frame and stop the sampler.
    /// Safe to call in any state, any number of times.
    pub fn dispose(&mut self) {
        if self.state == RendererState::Disposed {
            return;
        }
        self.teardown();
        self.state = RendererState::Disposed;
        tracing::debug!("Renderer disposed");
    }

    fn ensure_not_disposed(&self, operation: &str) -> DepthFxResult<()> {
        if self.state == RendererState::Disposed {
            return Err(DepthFxError::InvalidArgument(format!(
                "{operation} called on a disposed renderer"
            )));
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.cancel_pending();
        if let Some(mut sampler) = self.sampler.take() {
            sampler.dispose();
        }
        self.scheduler = None;
        if let Some(resources) = self.resources.take() {
            let released = resources.release();
            tracing::debug!(released, "Released GPU textures");
        }
        self.media = None;
        self.last_depth = None;
        self.video_frame_pending = None;
        self.frame_index = 0;
    }

    fn cancel_pending(&mut self) {
        if let Some(id) = self.pending_frame.take() {
            if let Some(scheduler) = self.scheduler.as_mut() {
                scheduler.cancel_frame(id);
            }
        }
    }

    fn schedule_next(&mut self) {
        if self.pending_frame.is_some() {
            return;
        }
        if let Some(scheduler) = self.scheduler.as_mut() {
            self.pending_frame = Some(scheduler.request_frame());
        }
    }

    fn emit(&mut self, event: RendererEvent) {
        if let Some(sink) = self.events.as_mut() {
            sink.emit(event);
        }
    }

    fn mirror(&self) -> bool {
        self.media
            .as_ref()
            .is_some_and(|m| m.kind() == MediaKind::Camera)
    }

    fn build_resources(&self, gpu: GpuContext, mut presenter: Box<dyn Presenter>) -> DepthFxResult<GpuResources> {
        let media = self
            .media
            .as_ref()
            .ok_or_else(|| DepthFxError::InvalidArgument("no media source".into()))?;
        let (media_width, media_height) = media.size();
        let container = self.container.unwrap_or(Container {
            css_width: media_width as f32,
            css_height: media_height as f32,
            device_pixel_ratio: 1.0,
        });

        let signals = gpu.capability_signals(container.device_pixel_ratio);
        let quality = resolve_quality(&signals, self.config.quality);
        tracing::info!(
            tier = %quality.tier,
            backend = %gpu.backend.kind,
            "Quality tier resolved"
        );

        let max_dimension = gpu.max_texture_dimension();
        if media_width > max_dimension || media_height > max_dimension {
            return Err(DepthFxError::InvalidArgument(format!(
                "media {media_width}x{media_height} exceeds the device texture limit {max_dimension}"
            )));
        }

        let (depth_w, depth_h) = self.depth_source_size;
        let depth_size = quality.depth_target_size(depth_w, depth_h);

        let mut registry = TextureRegistry::new();
        let video = registry.register(slots::VIDEO, wgpu::TextureFormat::Rgba8Unorm)?;
        let raw_depth = registry.register(slots::RAW_DEPTH, wgpu::TextureFormat::R8Unorm)?;
        registry.bind(
            video,
            GpuTexture::new(
                &gpu.device,
                slots::VIDEO,
                media_width,
                media_height,
                wgpu::TextureFormat::Rgba8Unorm,
                INPUT_USAGE,
            ),
        )?;
        registry.bind(
            raw_depth,
            GpuTexture::new(
                &gpu.device,
                slots::RAW_DEPTH,
                depth_size.0,
                depth_size.1,
                wgpu::TextureFormat::R8Unorm,
                INPUT_USAGE,
            ),
        )?;

        let mut graph = {
            let mut setup = PassSetup {
                gpu: &gpu,
                registry: &mut registry,
                config: &self.config,
                quality: &quality,
                display_format: presenter.format(),
                depth_size,
            };
            self.effect.build(&mut setup)?
        };

        let viewport = Viewport::from_container(
            container.css_width,
            container.css_height,
            container.device_pixel_ratio,
            &quality,
            max_dimension,
        );
        presenter.configure(&gpu, viewport.width, viewport.height)?;
        let cover = CoverFit::compute(media_width, media_height, &viewport, self.mirror());
        graph.resize(&gpu, &mut registry, &viewport)?;
        tracing::debug!(passes = ?graph.pass_names(), "Pass graph built");

        Ok(GpuResources {
            gpu,
            presenter,
            registry,
            graph,
            quality,
            viewport,
            cover,
            video,
            raw_depth,
            depth_size,
        })
    }

    fn render_frame(&mut self) -> DepthFxResult<f64> {
        let res = self
            .resources
            .as_mut()
            .ok_or_else(|| DepthFxError::InvalidArgument("renderer has no GPU resources".into()))?;
        let media = self
            .media
            .as_ref()
            .ok_or_else(|| DepthFxError::InvalidArgument("renderer has no media source".into()))?;
        let time = media.current_time();

        upload_video(res, media.as_ref())?;

        let refresh_depth = self.video_frame_pending != Some(false);
        let mut depth_changed = false;
        if refresh_depth {
            if let Some(sampler) = self.sampler.as_mut() {
                let sample = sampler.sample(time);
                let changed = self
                    .last_depth
                    .as_ref()
                    .map_or(true, |previous| !Arc::ptr_eq(previous, &sample));
                if changed {
                    upload_depth(res, &sample)?;
                    self.last_depth = Some(sample);
                    depth_changed = true;
                }
            }
            if self.video_frame_pending.is_some() {
                self.video_frame_pending = Some(false);
            }
        }

        let base_focus = match self.focus.as_mut() {
            Some(callback) => callback(time),
            None => self.config.focal_depth,
        };
        let focal_depth = (base_focus + self.config.breathing_offset(time)).clamp(0.0, 1.0);

        let frame_state = FrameState {
            time,
            depth_changed,
            focal_depth,
            coc_scale: self.config.breathing_coc_scale(time),
            pointer: self.pointer,
            viewport: res.viewport,
            cover: res.cover,
        };

        let display = res.presenter.acquire(&res.gpu)?;
        let mut encoder = res
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("depthfx frame"),
            });
        {
            let mut ctx = FrameContext {
                gpu: &res.gpu,
                registry: &res.registry,
                encoder: &mut encoder,
                display: &display.view,
                frame: &frame_state,
            };
            res.graph.execute(&mut ctx)?;
        }
        res.gpu.queue.submit(Some(encoder.finish()));
        res.presenter.present(display);
        Ok(time)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn write_plane(queue: &wgpu::Queue, texture: &GpuTexture, data: &[u8], bytes_per_pixel: u32) {
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(texture.width * bytes_per_pixel),
            rows_per_image: Some(texture.height),
        },
        wgpu::Extent3d {
            width: texture.width,
            height: texture.height,
            depth_or_array_layers: 1,
        },
    );
}

fn upload_video(res: &GpuResources, media: &dyn MediaSource) -> DepthFxResult<()> {
    let texture = res.registry.get(res.video)?;
    let pixels = media.frame();
    let expected = texture.width as usize * texture.height as usize * 4;
    if pixels.len() != expected {
        return Err(DepthFxError::InvalidArgument(format!(
            "media frame has {} bytes, expected {expected}",
            pixels.len()
        )));
    }
    write_plane(&res.gpu.queue, texture, pixels, 4);
    Ok(())
}

fn upload_depth(res: &mut GpuResources, sample: &DepthSample) -> DepthFxResult<()> {
    let size = (sample.width, sample.height);
    if res.registry.get(res.raw_depth)?.size() != size {
        let texture = GpuTexture::new(
            &res.gpu.device,
            slots::RAW_DEPTH,
            sample.width,
            sample.height,
            wgpu::TextureFormat::R8Unorm,
            INPUT_USAGE,
        );
        res.registry.bind(res.raw_depth, texture)?;
        res.depth_size = size;
    }
    write_plane(&res.gpu.queue, res.registry.get(res.raw_depth)?, &sample.data, 1);
    Ok(())
}
