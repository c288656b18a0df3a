//! Fullscreen passes used by the effect graphs.
//!
//! Every pass draws one screen-covering quad with the same bind group
//! layout: a uniform block at binding 0, a linear clamp sampler at binding 1
//! and its input textures from binding 2 on. [`FullscreenPipeline`] owns
//! that shared plumbing so each pass only supplies its fragment shader and
//! uniform struct.

mod bilateral;
mod coc;
mod composite;
mod dof_blur;
mod parallax;

pub use bilateral::BilateralPass;
pub use coc::{CocEncoding, CocPass};
pub use composite::CompositePass;
pub use dof_blur::DofBlurPass;
pub use parallax::ParallaxPass;

use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;
use crate::registry::{GpuTexture, TextureRegistry, TextureUnit};

const FULLSCREEN_WGSL: &str = include_str!("../shaders/fullscreen.wgsl");

/// Usage of every intermediate render target.
pub(crate) const TARGET_USAGE: wgpu::TextureUsages =
    wgpu::TextureUsages::RENDER_ATTACHMENT.union(wgpu::TextureUsages::TEXTURE_BINDING);

/// Full WGSL module for a pass: the shared vertex stage and helpers
/// followed by the pass's fragment stage.
pub(crate) fn shader_source(fragment_source: &str) -> String {
    format!("{FULLSCREEN_WGSL}\n{fragment_source}")
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    uv: [f32; 2],
}

const VERTICES: &[Vertex] = &[
    Vertex { position: [-1.0, 1.0], uv: [0.0, 0.0] },
    Vertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    Vertex { position: [1.0, -1.0], uv: [1.0, 1.0] },
    Vertex { position: [-1.0, 1.0], uv: [0.0, 0.0] },
    Vertex { position: [1.0, -1.0], uv: [1.0, 1.0] },
    Vertex { position: [1.0, 1.0], uv: [1.0, 0.0] },
];

pub(crate) struct FullscreenPipeline {
    label: &'static str,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniforms: wgpu::Buffer,
    vertex_buffer: wgpu::Buffer,
}

impl FullscreenPipeline {
    /// Build a pipeline for `fragment_source` drawing into `format`. `U` is
    /// the pass's uniform struct.
    ///
    /// Shader and pipeline validation run inside an error scope, so a
    /// backend that rejects the translated shader yields
    /// [`DepthFxError::Gpu`](crate::DepthFxError::Gpu) instead of reaching
    /// the device's uncaptured error handler.
    pub(crate) fn new<U: bytemuck::Pod>(
        gpu: &GpuContext,
        label: &'static str,
        fragment_source: &str,
        texture_count: u32,
        format: wgpu::TextureFormat,
    ) -> crate::DepthFxResult<Self> {
        let device = &gpu.device;
        let source = shader_source(fragment_source);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        entries.extend((0..texture_count).map(|i| wgpu::BindGroupLayoutEntry {
            binding: 2 + i,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(crate::DepthFxError::Gpu(format!(
                "{label} pipeline rejected: {err}"
            )));
        }

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<U>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Ok(Self {
            label,
            pipeline,
            bind_group_layout,
            sampler,
            uniforms,
            vertex_buffer,
        })
    }

    pub(crate) fn write_uniforms<U: bytemuck::Pod>(&self, queue: &wgpu::Queue, value: &U) {
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(value));
    }

    /// Record one draw of the quad, sampling `inputs` in binding order.
    pub(crate) fn draw(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        inputs: &[&wgpu::TextureView],
        target: &wgpu::TextureView,
    ) {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        entries.extend(inputs.iter().enumerate().map(|(i, view)| wgpu::BindGroupEntry {
            binding: 2 + i as u32,
            resource: wgpu::BindingResource::TextureView(view),
        }));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.label),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        rpass.draw(0..6, 0..1);
    }
}

/// Bind a fresh `width x height` target into `unit` unless one of that size
/// is already bound.
pub(crate) fn ensure_target(
    gpu: &GpuContext,
    registry: &mut TextureRegistry<GpuTexture>,
    unit: TextureUnit,
    width: u32,
    height: u32,
) -> crate::DepthFxResult<bool> {
    if let Ok(existing) = registry.get(unit) {
        if existing.size() == (width.max(1), height.max(1)) {
            return Ok(false);
        }
    }
    let slot = registry
        .slot(unit)
        .ok_or_else(|| crate::DepthFxError::Graph(format!("{unit} was never registered")))?;
    let label = slot.name.clone();
    let format = slot.format;
    let texture = GpuTexture::new(&gpu.device, &label, width, height, format, TARGET_USAGE);
    registry.bind(unit, texture)?;
    tracing::debug!(slot = %label, width, height, "Recreated render target");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAGMENT_SHADERS: &[(&str, &str)] = &[
        ("bilateral", include_str!("../shaders/bilateral.wgsl")),
        ("coc", include_str!("../shaders/coc.wgsl")),
        ("dof_blur", include_str!("../shaders/dof_blur.wgsl")),
        ("composite", include_str!("../shaders/composite.wgsl")),
        ("parallax", include_str!("../shaders/parallax.wgsl")),
    ];

    /// Words GLSL reserves that the GL translation passes through unescaped.
    const GLSL_RESERVED: &[&str] = &[
        "active", "asm", "buffer", "cast", "centroid", "class", "coherent", "common", "double",
        "enum", "extern", "external", "filter", "fixed", "flat", "goto", "half", "highp", "hvec2",
        "hvec3", "hvec4", "inline", "input", "interface", "invariant", "layout", "long", "lowp",
        "mediump", "namespace", "noinline", "noperspective", "output", "packed", "partition",
        "patch", "precise", "precision", "public", "readonly", "resource", "restrict", "sample",
        "shared", "short", "sizeof", "smooth", "static", "subroutine", "superp", "template",
        "this", "typedef", "union", "unsigned", "using", "varying", "volatile", "writeonly",
    ];

    fn identifiers(source: &str) -> impl Iterator<Item = &str> {
        source
            .lines()
            .map(|line| line.split("//").next().unwrap_or(""))
            .flat_map(|line| line.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')))
            .filter(|word| !word.is_empty())
    }

    fn parse_module(name: &str, fragment: &str) -> (naga::Module, naga::valid::ModuleInfo) {
        let source = shader_source(fragment);
        let module = naga::front::wgsl::parse_str(&source)
            .unwrap_or_else(|e| panic!("{name}: {}", e.emit_to_string(&source)));
        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::empty(),
        )
        .validate(&module)
        .unwrap_or_else(|e| panic!("{name}: {e:?}"));
        (module, info)
    }

    #[test]
    fn test_shaders_validate() {
        for (name, fragment) in FRAGMENT_SHADERS {
            let (module, _) = parse_module(name, fragment);
            let entry_points: Vec<_> = module.entry_points.iter().map(|ep| ep.name.as_str()).collect();
            assert!(entry_points.contains(&"vs_main"), "{name}");
            assert!(entry_points.contains(&"fs_main"), "{name}");
        }
    }

    #[test]
    fn test_shaders_translate_to_gles() {
        for (name, fragment) in FRAGMENT_SHADERS {
            let (module, info) = parse_module(name, fragment);
            for (stage, entry_point) in [
                (naga::ShaderStage::Vertex, "vs_main"),
                (naga::ShaderStage::Fragment, "fs_main"),
            ] {
                let options = naga::back::glsl::Options {
                    version: naga::back::glsl::Version::Embedded {
                        version: 300,
                        is_webgl: false,
                    },
                    ..Default::default()
                };
                let pipeline_options = naga::back::glsl::PipelineOptions {
                    shader_stage: stage,
                    entry_point: entry_point.to_string(),
                    multiview: None,
                };
                let mut glsl = String::new();
                let mut writer = naga::back::glsl::Writer::new(
                    &mut glsl,
                    &module,
                    &info,
                    &options,
                    &pipeline_options,
                    naga::proc::BoundsCheckPolicies::default(),
                )
                .unwrap_or_else(|e| panic!("{name}/{entry_point}: {e}"));
                writer
                    .write()
                    .unwrap_or_else(|e| panic!("{name}/{entry_point}: {e}"));
                assert!(glsl.contains("void main()"), "{name}/{entry_point}");
            }
        }
    }

    #[test]
    fn test_shaders_avoid_glsl_reserved_words() {
        for (name, fragment) in FRAGMENT_SHADERS {
            let source = shader_source(fragment);
            for word in identifiers(&source) {
                assert!(
                    !GLSL_RESERVED.contains(&word),
                    "{name} uses '{word}', which the GL backend cannot compile"
                );
            }
        }
    }
}
