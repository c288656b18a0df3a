//! Display targets.
//!
//! A [`Presenter`] owns whatever the terminal pass draws into: a window
//! surface for interactive hosts, or an offscreen texture that can be read
//! back for headless rendering.

use depthfx_core::{DepthFxError, DepthFxResult};

use crate::gpu::GpuContext;

/// A display texture acquired for one frame.
pub struct DisplayFrame {
    pub view: wgpu::TextureView,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

pub trait Presenter: Send {
    /// Format the terminal pass must render in.
    fn format(&self) -> wgpu::TextureFormat;

    fn size(&self) -> (u32, u32);

    /// Match the display buffer to `width x height`. Returns `true` when it
    /// actually changed.
    fn configure(&mut self, gpu: &GpuContext, width: u32, height: u32) -> DepthFxResult<bool>;

    fn acquire(&mut self, gpu: &GpuContext) -> DepthFxResult<DisplayFrame>;

    /// Show a frame after its commands were submitted.
    fn present(&mut self, frame: DisplayFrame) {
        if let Some(texture) = frame.surface_texture {
            texture.present();
        }
    }

    /// Copy the last presented frame to tightly packed RGBA8.
    fn read_pixels(&self, _gpu: &GpuContext) -> DepthFxResult<Vec<u8>> {
        Err(DepthFxError::InvalidArgument(
            "this presenter cannot be read back".into(),
        ))
    }
}

/// Presents to a window surface owned by the host.
pub struct SurfacePresenter {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl SurfacePresenter {
    pub fn new(surface: wgpu::Surface<'static>, gpu: &GpuContext, width: u32, height: u32) -> DepthFxResult<Self> {
        let config = surface
            .get_default_config(&gpu.adapter, width.max(1), height.max(1))
            .ok_or_else(|| DepthFxError::gpu("surface is not supported by the adapter"))?;
        surface.configure(&gpu.device, &config);
        Ok(Self { surface, config })
    }
}

impl Presenter for SurfacePresenter {
    fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn configure(&mut self, gpu: &GpuContext, width: u32, height: u32) -> DepthFxResult<bool> {
        let (width, height) = (width.max(1), height.max(1));
        if self.size() == (width, height) {
            return Ok(false);
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&gpu.device, &self.config);
        Ok(true)
    }

    fn acquire(&mut self, gpu: &GpuContext) -> DepthFxResult<DisplayFrame> {
        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&gpu.device, &self.config);
                self.surface.get_current_texture().map_err(DepthFxError::gpu)?
            }
            Err(e) => return Err(DepthFxError::gpu(e)),
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(DisplayFrame {
            view,
            surface_texture: Some(texture),
        })
    }
}

/// Renders into an RGBA8 texture that can be read back.
pub struct OffscreenPresenter {
    texture: Option<wgpu::Texture>,
    width: u32,
    height: u32,
}

impl OffscreenPresenter {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new() -> Self {
        Self {
            texture: None,
            width: 0,
            height: 0,
        }
    }

    fn ensure_texture(&mut self, gpu: &GpuContext) -> &wgpu::Texture {
        let (width, height) = (self.width.max(1), self.height.max(1));
        self.texture.get_or_insert_with(|| {
            gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("offscreen display"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })
    }
}

impl Default for OffscreenPresenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes per row of a `width`-pixel RGBA8 copy, padded to wgpu's alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strip row padding from a read-back buffer.
pub fn unpad_rows(padded: &[u8], width: u32, height: u32) -> Vec<u8> {
    let row = (width * 4) as usize;
    let stride = padded_bytes_per_row(width) as usize;
    let mut out = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        out.extend_from_slice(&padded[start..start + row]);
    }
    out
}

impl Presenter for OffscreenPresenter {
    fn format(&self) -> wgpu::TextureFormat {
        Self::FORMAT
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn configure(&mut self, _gpu: &GpuContext, width: u32, height: u32) -> DepthFxResult<bool> {
        let (width, height) = (width.max(1), height.max(1));
        if self.size() == (width, height) {
            return Ok(false);
        }
        self.width = width;
        self.height = height;
        self.texture = None;
        Ok(true)
    }

    fn acquire(&mut self, gpu: &GpuContext) -> DepthFxResult<DisplayFrame> {
        let view = self
            .ensure_texture(gpu)
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(DisplayFrame {
            view,
            surface_texture: None,
        })
    }

    fn read_pixels(&self, gpu: &GpuContext) -> DepthFxResult<Vec<u8>> {
        let texture = self
            .texture
            .as_ref()
            .ok_or_else(|| DepthFxError::InvalidArgument("nothing has been rendered yet".into()))?;
        let (width, height) = (self.width, self.height);
        let stride = padded_bytes_per_row(width);

        let readback = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen readback"),
            size: (stride * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("offscreen readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(stride),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(DepthFxError::gpu(e)),
            Err(_) => return Err(DepthFxError::gpu("readback callback dropped")),
        }

        let pixels = unpad_rows(&slice.get_mapped_range(), width, height);
        readback.unmap();
        Ok(pixels)
    }
}
