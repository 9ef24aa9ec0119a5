// SPDX-License-Identifier: GPL-3.0-only

//! wgpu implementation of the capability query and resource store.
//!
//! Texture ids handed to the generators map to `wgpu::Texture` handles kept
//! here, so a caller can resolve the binding table of a generated program
//! into bind group entries.

use super::{
    Format, FormatCaps, FormatQuery, GpuCaps, KNOWN_FORMATS, ResourceStore, Texture,
    TextureDimension, TextureId, TextureParams,
};
use crate::errors::{SamplingError, SamplingResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

/// Create a wgpu adapter, device and queue suitable for the generated programs.
///
/// Requests the adapter's own limits and, when available, linear filtering of
/// 32-bit float textures (used by the polar LUT).
pub async fn create_compute_device(label: &str) -> Result<WgpuGpu, String> {
    info!(label = label, "Creating GPU device for sampling shaders");

    let instance = wgpu::Instance::default();
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| format!("Failed to find suitable GPU adapter: {}", e))?;

    let adapter_info = adapter.get_info();
    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: adapter.features() & wgpu::Features::FLOAT32_FILTERABLE,
            required_limits: adapter.limits(),
            ..Default::default()
        })
        .await
        .map_err(|e| format!("Failed to create GPU device: {}", e))?;

    Ok(WgpuGpu::new(
        Arc::new(adapter),
        Arc::new(device),
        Arc::new(queue),
    ))
}

/// Device context backed by wgpu
pub struct WgpuGpu {
    adapter: Arc<wgpu::Adapter>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    next_id: AtomicU64,
    textures: Mutex<HashMap<TextureId, wgpu::Texture>>,
}

impl WgpuGpu {
    pub fn new(
        adapter: Arc<wgpu::Adapter>,
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
    ) -> Self {
        Self {
            adapter,
            device,
            queue,
            next_id: AtomicU64::new(1),
            textures: Mutex::new(HashMap::new()),
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Look up the wgpu texture behind a handle
    pub fn texture(&self, id: TextureId) -> Option<wgpu::Texture> {
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Register an externally created texture (e.g. a decoded video frame)
    pub fn import_texture(&self, texture: wgpu::Texture) -> Option<Texture> {
        let format = KNOWN_FORMATS
            .iter()
            .find(|fmt| Some(texture.format()) == wgpu_format(fmt.name))?;
        let dimension = match texture.dimension() {
            wgpu::TextureDimension::D1 => TextureDimension::D1,
            wgpu::TextureDimension::D2 => TextureDimension::D2,
            wgpu::TextureDimension::D3 => return None,
        };

        let handle = Texture {
            id: TextureId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            width: texture.width(),
            height: texture.height(),
            dimension,
            format: format.with_caps(self.format_caps(texture.format())),
            sample_mode: super::SampleMode::Linear,
            address_mode: super::AddressMode::Clamp,
        };
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id, texture);
        Some(handle)
    }

    fn format_caps(&self, format: wgpu::TextureFormat) -> FormatCaps {
        let features = self.adapter.get_texture_format_features(format);
        let mut caps = FormatCaps::empty();
        if features
            .allowed_usages
            .contains(wgpu::TextureUsages::TEXTURE_BINDING)
        {
            caps = caps | FormatCaps::SAMPLEABLE;
        }
        let filterable = features
            .flags
            .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE);
        // 32-bit float filtering also has to be enabled on the device
        let float32 = matches!(
            format,
            wgpu::TextureFormat::R32Float | wgpu::TextureFormat::Rgba32Float
        );
        if filterable
            && (!float32
                || self
                    .device
                    .features()
                    .contains(wgpu::Features::FLOAT32_FILTERABLE))
        {
            caps = caps | FormatCaps::LINEAR;
        }
        if features
            .allowed_usages
            .contains(wgpu::TextureUsages::STORAGE_BINDING)
        {
            caps = caps | FormatCaps::STORABLE;
        }
        caps
    }
}

fn wgpu_format(name: &str) -> Option<wgpu::TextureFormat> {
    Some(match name {
        "r8unorm" => wgpu::TextureFormat::R8Unorm,
        "rgba8unorm" => wgpu::TextureFormat::Rgba8Unorm,
        "r16float" => wgpu::TextureFormat::R16Float,
        "rgba16float" => wgpu::TextureFormat::Rgba16Float,
        "r32float" => wgpu::TextureFormat::R32Float,
        "rgba32float" => wgpu::TextureFormat::Rgba32Float,
        _ => return None,
    })
}

impl GpuCaps for WgpuGpu {
    fn max_1d_texture_dim(&self) -> u32 {
        self.device.limits().max_texture_dimension_1d
    }

    fn compute_available(&self) -> bool {
        self.adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
    }

    fn shared_memory_budget(&self) -> u32 {
        self.device.limits().max_compute_workgroup_storage_size
    }

    fn find_format(&self, query: &FormatQuery) -> Option<Format> {
        KNOWN_FORMATS.iter().find_map(|fmt| {
            let caps = self.format_caps(wgpu_format(fmt.name)?);
            let fmt = fmt.with_caps(caps);
            fmt.matches(query).then_some(fmt)
        })
    }
}

impl ResourceStore for WgpuGpu {
    fn create_texture(&self, params: &TextureParams<'_>) -> SamplingResult<Texture> {
        let format = wgpu_format(params.format.name).ok_or_else(|| {
            SamplingError::Format(format!("{} has no wgpu equivalent", params.format.name))
        })?;

        let mut usage = wgpu::TextureUsages::COPY_DST;
        if params.sampleable {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }

        let desc = wgpu::TextureDescriptor {
            label: Some("shader_sampling_texture"),
            size: wgpu::Extent3d {
                width: params.width,
                height: params.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: match params.dimension {
                TextureDimension::D1 => wgpu::TextureDimension::D1,
                TextureDimension::D2 => wgpu::TextureDimension::D2,
            },
            format,
            usage,
            view_formats: &[],
        };

        // Allocation errors are reported through error scopes, not return values
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = match params.initial_data {
            Some(data) => self.device.create_texture_with_data(
                &self.queue,
                &desc,
                wgpu::util::TextureDataOrder::LayerMajor,
                data,
            ),
            None => self.device.create_texture(&desc),
        };
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = validation.or(oom) {
            warn!(error = %err, "wgpu texture creation failed");
            texture.destroy();
            return Err(SamplingError::Resource(err.to_string()));
        }

        let handle = Texture {
            id: TextureId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            width: params.width,
            height: params.height,
            dimension: params.dimension,
            format: params.format,
            sample_mode: params.sample_mode,
            address_mode: params.address_mode,
        };
        debug!(
            id = handle.id.0,
            width = handle.width,
            format = handle.format.name,
            "wgpu texture created"
        );
        self.textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id, texture);
        Ok(handle)
    }

    fn destroy_texture(&self, texture: Texture) {
        let removed = self
            .textures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&texture.id);
        if let Some(texture) = removed {
            texture.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterConfig;
    use crate::gpu::FormatKind;
    use crate::shaders::reference::{FetchStrategy, ImageF32, resample_polar};
    use crate::shaders::{
        BindingResource, SamplePolarParams, SampleSource, ShaderBuilder, ShaderObject,
        ShaderProgram, ShaderStage, sample_polar,
    };

    const FULLSCREEN_VS: &str = "@vertex\n\
        fn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {\n\
        \x20   let uv = vec2<f32>(f32((i << 1u) & 2u), f32(i & 2u));\n\
        \x20   return vec4<f32>(uv * 2.0 - vec2<f32>(1.0), 0.0, 1.0);\n\
        }\n";

    /// Hides compute support so the builder emits the per-pixel kernel
    struct FragmentOnly<'a>(&'a WgpuGpu);

    impl GpuCaps for FragmentOnly<'_> {
        fn max_1d_texture_dim(&self) -> u32 {
            self.0.max_1d_texture_dim()
        }

        fn compute_available(&self) -> bool {
            false
        }

        fn shared_memory_budget(&self) -> u32 {
            0
        }

        fn find_format(&self, query: &FormatQuery) -> Option<Format> {
            self.0.find_format(query)
        }
    }

    impl ResourceStore for FragmentOnly<'_> {
        fn create_texture(&self, params: &TextureParams<'_>) -> SamplingResult<Texture> {
            self.0.create_texture(params)
        }

        fn destroy_texture(&self, texture: Texture) {
            self.0.destroy_texture(texture)
        }
    }

    fn f16_to_f32(bits: u16) -> f32 {
        let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
        let exp = ((bits >> 10) & 0x1f) as i32;
        let frac = (bits & 0x3ff) as f32;
        match exp {
            0 => sign * frac * 2f32.powi(-24),
            31 => f32::NAN,
            _ => sign * (1.0 + frac / 1024.0) * 2f32.powi(exp - 15),
        }
    }

    /// Run a generated program over its whole output and read the result back
    fn run_program(gpu: &WgpuGpu, program: &ShaderProgram) -> Vec<[f32; 4]> {
        enum Resource {
            View(wgpu::TextureView),
            Sampler(wgpu::Sampler),
            Buffer(wgpu::Buffer),
        }

        let device = gpu.device();
        let (width, height) = program.output_size;
        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let (format, texel_bytes, usage) = match program.stage {
            ShaderStage::Compute { .. } => (
                wgpu::TextureFormat::Rgba16Float,
                8,
                wgpu::TextureUsages::STORAGE_BINDING,
            ),
            ShaderStage::Fragment => (
                wgpu::TextureFormat::Rgba32Float,
                16,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            ),
        };
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("polar_output"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: usage | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let resources: Vec<(u32, Resource)> = program
            .bindings
            .iter()
            .map(|binding| {
                let resource = match &binding.resource {
                    BindingResource::Texture(id) => Resource::View(
                        gpu.texture(*id)
                            .expect("bound texture is registered")
                            .create_view(&Default::default()),
                    ),
                    BindingResource::Sampler { .. } => {
                        Resource::Sampler(device.create_sampler(&wgpu::SamplerDescriptor {
                            mag_filter: wgpu::FilterMode::Linear,
                            min_filter: wgpu::FilterMode::Linear,
                            ..Default::default()
                        }))
                    }
                    BindingResource::UniformF32(value) => Resource::Buffer(
                        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: None,
                            contents: bytemuck::bytes_of(value),
                            usage: wgpu::BufferUsages::UNIFORM,
                        }),
                    ),
                    BindingResource::OutputImage { .. } => {
                        Resource::View(target.create_view(&Default::default()))
                    }
                };
                (binding.binding, resource)
            })
            .collect();
        let entries: Vec<wgpu::BindGroupEntry> = resources
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    Resource::View(view) => wgpu::BindingResource::TextureView(view),
                    Resource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                    Resource::Buffer(buffer) => buffer.as_entire_binding(),
                },
            })
            .collect();

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("polar_program"),
            source: wgpu::ShaderSource::Wgsl(program.source.as_str().into()),
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("polar_encoder"),
        });

        match program.stage {
            ShaderStage::Compute { .. } => {
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("polar_compute"),
                    layout: None,
                    module: &module,
                    entry_point: Some(ShaderProgram::ENTRY_POINT),
                    compilation_options: Default::default(),
                    cache: None,
                });
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: None,
                    layout: &pipeline.get_bind_group_layout(0),
                    entries: &entries,
                });
                let [gx, gy] = program.dispatch_size().expect("compute program");
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: None,
                    timestamp_writes: None,
                });
                pass.set_pipeline(&pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(gx, gy, 1);
            }
            ShaderStage::Fragment => {
                let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("fullscreen_vs"),
                    source: wgpu::ShaderSource::Wgsl(FULLSCREEN_VS.into()),
                });
                let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("polar_fragment"),
                    layout: None,
                    vertex: wgpu::VertexState {
                        module: &vertex,
                        entry_point: Some("vs_main"),
                        compilation_options: Default::default(),
                        buffers: &[],
                    },
                    primitive: wgpu::PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    fragment: Some(wgpu::FragmentState {
                        module: &module,
                        entry_point: Some(ShaderProgram::ENTRY_POINT),
                        compilation_options: Default::default(),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    multiview: None,
                    cache: None,
                });
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: None,
                    layout: &pipeline.get_bind_group_layout(0),
                    entries: &entries,
                });
                let view = target.create_view(&Default::default());
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: None,
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(&pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }

        let row_bytes = width * texel_bytes;
        assert_eq!(row_bytes % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT, 0);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("polar_readback"),
            size: u64::from(row_bytes * height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(row_bytes),
                    rows_per_image: None,
                },
            },
            extent,
        );
        gpu.queue().submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = device.poll(wgpu::PollType::wait_indefinitely());
        receiver.recv().unwrap().unwrap();

        let data = slice.get_mapped_range();
        let texels = match program.stage {
            ShaderStage::Compute { .. } => data
                .chunks_exact(8)
                .map(|t| {
                    std::array::from_fn(|n| f16_to_f32(u16::from_le_bytes([t[2 * n], t[2 * n + 1]])))
                })
                .collect(),
            ShaderStage::Fragment => bytemuck::pod_collect_to_vec::<u8, [f32; 4]>(&data),
        };
        drop(data);
        staging.unmap();
        texels
    }

    fn assert_close(name: &str, actual: &[[f32; 4]], expected: &ImageF32, tolerance: f32) {
        assert_eq!(actual.len(), expected.data.len());
        for (i, (a, e)) in actual.iter().zip(&expected.data).enumerate() {
            for n in 0..4 {
                assert!(
                    (a[n] - e[n]).abs() <= tolerance,
                    "{}: pixel {} channel {}: {} vs {}",
                    name,
                    i,
                    n,
                    a[n],
                    e[n]
                );
            }
        }
    }

    #[test]
    fn test_format_names_map_to_wgpu() {
        for fmt in KNOWN_FORMATS {
            assert!(wgpu_format(fmt.name).is_some(), "{} unmapped", fmt.name);
        }
        assert!(wgpu_format("bgra8unorm-srgb").is_none());
    }

    #[test]
    fn test_create_lut_texture() {
        // This test requires a GPU, so it may be skipped in CI
        let gpu = match pollster::block_on(create_compute_device("test_device")) {
            Ok(gpu) => gpu,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let query = FormatQuery {
            kind: crate::gpu::FormatKind::Float,
            components: 1,
            bit_depth: 16,
            caps: FormatCaps::SAMPLEABLE,
        };
        let Some(format) = gpu.find_format(&query) else {
            println!("Skipping test (no r16float)");
            return;
        };
        let data = [0u8; 2 * 64];
        let tex = gpu
            .create_texture(&TextureParams {
                width: 64,
                height: 1,
                dimension: TextureDimension::D1,
                format,
                sampleable: true,
                sample_mode: crate::gpu::SampleMode::Linear,
                address_mode: crate::gpu::AddressMode::Clamp,
                initial_data: Some(&data),
            })
            .expect("64-entry LUT should fit any device");
        assert!(gpu.texture(tex.id).is_some());
        gpu.destroy_texture(tex.clone());
        assert!(gpu.texture(tex.id).is_none());
    }

    #[test]
    fn test_polar_kernels_match_reference() {
        // This test requires a GPU, so it may be skipped in CI
        let gpu = match pollster::block_on(create_compute_device("test_device")) {
            Ok(gpu) => gpu,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };
        let fragment_only = FragmentOnly(&gpu);
        let Some(format) = gpu.find_format(&FormatQuery {
            kind: FormatKind::Unorm,
            components: 4,
            bit_depth: 8,
            caps: FormatCaps::SAMPLEABLE | FormatCaps::LINEAR,
        }) else {
            println!("Skipping test (no rgba8unorm)");
            return;
        };

        // Upscale and mild downscale; output widths keep readback rows aligned
        for (src_size, out_size) in [((32, 24), (64, 48)), ((40, 30), (32, 24))] {
            let image = ImageF32::from_fn(src_size.0, src_size.1, |x, y| {
                std::array::from_fn(|n| ((x * 37 + y * 61 + n as u32 * 23) % 256) as f32 / 255.0)
            });
            let bytes: Vec<u8> = image
                .data
                .iter()
                .flat_map(|px| px.map(|v| (v * 255.0).round() as u8))
                .collect();
            let source = gpu
                .create_texture(&TextureParams {
                    width: src_size.0,
                    height: src_size.1,
                    dimension: TextureDimension::D2,
                    format,
                    sampleable: true,
                    sample_mode: crate::gpu::SampleMode::Linear,
                    address_mode: crate::gpu::AddressMode::Clamp,
                    initial_data: Some(&bytes),
                })
                .unwrap();

            let mut lut = ShaderObject::new();
            let mut programs = Vec::new();
            for device in [&gpu as &dyn crate::gpu::Gpu, &fragment_only] {
                let mut sh = ShaderBuilder::new(device);
                let src = SampleSource::new(&source).with_output_size(out_size.0, out_size.1);
                if !sample_polar(
                    &mut sh,
                    &src,
                    SamplePolarParams::new(FilterConfig::ewa_lanczos(), &mut lut),
                ) {
                    println!("Skipping test (no filterable r32float for the LUT)");
                    lut.destroy(&gpu);
                    gpu.destroy_texture(source);
                    return;
                }
                programs.push(sh.finish().unwrap());
            }
            assert_eq!(programs[1].stage, ShaderStage::Fragment);

            let filter = lut.filter().unwrap();
            let expected =
                resample_polar(&image, out_size.0, out_size.1, filter, FetchStrategy::Direct)
                    .unwrap();
            for program in &programs {
                let actual = run_program(&gpu, program);
                let (name, tolerance) = match program.stage {
                    // rgba16float storage output
                    ShaderStage::Compute { .. } => ("tiled", 4e-3),
                    ShaderStage::Fragment => ("per-pixel", 2e-3),
                };
                assert_close(name, &actual, &expected, tolerance);
            }

            lut.destroy(&gpu);
            gpu.destroy_texture(source);
        }
    }
}
