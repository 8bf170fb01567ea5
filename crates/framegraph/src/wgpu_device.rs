//! wgpu implementation of [`GraphicsDevice`]
//!
//! Shaders are Vulkan-flavoured GLSL 450, parsed and validated with naga so that
//! diagnostics come back as text with line numbers before anything reaches wgpu.
//! Validated modules are handed to wgpu as naga IR.
//!
//! Uniform locations are byte offsets into the pass's std140 uniform block; a fresh
//! uniform buffer is written for every draw. Render pipelines depend on the blend
//! mode and attachment formats as well as the program, so they are created lazily
//! per combination and cached until the program is deleted.

use crate::device::{DeviceError, DrawCall, Extent, GraphicsDevice, PixelFormat, ShaderStage};
use crate::framegraph::SAMPLER_TEXTURE_SUFFIX;
use crate::script::{BlendMode, UniformValue};
use std::borrow::Cow;
use std::collections::HashMap;
use wgpu::naga;
use wgpu::util::DeviceExt;

/// Entry point of every stage
const ENTRY_POINT: &str = "main";

/// Format of the presentable surface
pub const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Usage of script images: sampled, rendered to and copied for readback
const IMAGE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Usage of the presentable surface
const SURFACE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT.union(wgpu::TextureUsages::COPY_SRC);

/// A parsed and validated shader stage
#[derive(Debug)]
pub struct WgpuShader {
    stage: naga::ShaderStage,
    module: naga::Module,
}

/// Byte layout of a program's uniform block
#[derive(Debug, Clone)]
struct UniformBlock {
    binding: u32,
    size: u32,
    /// Member name to byte offset
    offsets: HashMap<String, u32>,
}

/// A sampled image slot and its sampler slot
#[derive(Debug, Clone)]
struct TextureSlot {
    /// Declared texture name, including the texture suffix
    name: String,
    binding: u32,
}

/// A linked program with its reflected resource interface
#[derive(Debug)]
pub struct WgpuProgram {
    id: u64,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_block: Option<UniformBlock>,
    textures: Vec<TextureSlot>,
    samplers: Vec<u32>,
}

/// A GPU image with its default view
#[derive(Debug)]
pub struct WgpuImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
}

impl WgpuImage {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

/// Render target binding of a pass
///
/// wgpu has no framebuffer objects; attachments are bound per render pass, so this is
/// only an identity token.
#[derive(Debug)]
pub struct WgpuFramebuffer {
    id: u64,
}

/// Resolved uniform or sampler location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WgpuLocation {
    /// Byte offset inside the uniform block
    Uniform { offset: u32 },
    /// Binding slot of a sampled texture
    Texture { binding: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u64,
    blend: BlendMode,
    formats: Vec<wgpu::TextureFormat>,
}

/// [`GraphicsDevice`] backed by a wgpu device rendering into an owned surface texture
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: u64,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    sampler: wgpu::Sampler,
    placeholder: wgpu::TextureView,
    surface: wgpu::Texture,
    surface_view: wgpu::TextureView,
    float32_filterable: bool,
}

impl WgpuDevice {
    /// Creates a device on the default adapter without a window
    ///
    /// # Arguments
    /// * `size` - Initial size of the presentable surface
    ///
    /// # Returns
    /// The device, or an error if no adapter or device is available
    pub async fn headless(size: Extent) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| DeviceError::Backend(err.to_string()))?;

        // Filtering 32-bit float images is optional; fall back to nearest sampling without it
        let required_features = adapter.features() & wgpu::Features::FLOAT32_FILTERABLE;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Framegraph Device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|err| DeviceError::Backend(err.to_string()))?;

        tracing::info!(adapter = %adapter.get_info().name, backend = ?adapter.get_info().backend, "created headless device");
        Self::from_parts(device, queue, size)
    }

    /// Wraps an existing device and queue
    ///
    /// # Returns
    /// The device, or an error if the initial surface cannot be created at `size`
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, size: Extent) -> Result<Self, DeviceError> {
        let float32_filterable = device.features().contains(wgpu::Features::FLOAT32_FILTERABLE);
        let filter = if float32_filterable { wgpu::FilterMode::Linear } else { wgpu::FilterMode::Nearest };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Pass Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 0.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });

        let placeholder = create_texture(&device, "Placeholder Image", Extent::new(1, 1), wgpu::TextureFormat::Rgba8Unorm, IMAGE_USAGE).create_view(&wgpu::TextureViewDescriptor::default());
        let surface = create_surface(&device, size)?;
        let surface_view = surface.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            device,
            queue,
            next_id: 0,
            pipelines: HashMap::new(),
            sampler,
            placeholder,
            surface,
            surface_view,
            float32_filterable,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Texture the present program writes into
    pub fn surface_texture(&self) -> &wgpu::Texture {
        &self.surface
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Runs `f` inside a validation error scope
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
        with_error_scope(&self.device, f)
    }

    /// Creates the pipeline for a program, blend mode and attachment formats unless it is cached
    fn prepare_pipeline(&mut self, program: &WgpuProgram, blend: BlendMode, formats: Vec<wgpu::TextureFormat>) -> Result<PipelineKey, DeviceError> {
        let key = PipelineKey {
            program: program.id,
            blend,
            formats,
        };
        if self.pipelines.contains_key(&key) {
            return Ok(key);
        }

        for &format in &key.formats {
            if blend != BlendMode::Opaque && blend_state(blend, format).is_none() {
                tracing::warn!(?format, ?blend, "blending is not supported for this format, writing opaque");
            }
        }

        let color_targets = key
            .formats
            .iter()
            .map(|&format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend: blend_state(blend, format),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect::<Vec<_>>();

        let (pipeline, error) = self.scoped(|device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("Pass Pipeline {}", program.id)),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: Some(ENTRY_POINT),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: Some(ENTRY_POINT),
                    compilation_options: Default::default(),
                    targets: &color_targets,
                }),
                multiview: None,
                cache: None,
            })
        });
        if let Some(error) = error {
            return Err(DeviceError::Submission(error.to_string()));
        }

        tracing::trace!(program = program.id, ?blend, formats = ?key.formats, "created render pipeline");
        self.pipelines.insert(key.clone(), pipeline);
        Ok(key)
    }

    /// Encodes and submits one fullscreen draw with a prepared pipeline
    fn submit_draw(
        &self,
        key: &PipelineKey,
        program: &WgpuProgram,
        targets: &[(&wgpu::TextureView, wgpu::TextureFormat)],
        uniforms: &[(WgpuLocation, UniformValue)],
        textures: &HashMap<u32, &wgpu::TextureView>,
        viewport: Extent,
    ) -> Result<(), DeviceError> {
        let pipeline = self
            .pipelines
            .get(key)
            .ok_or_else(|| DeviceError::Submission(format!("no pipeline prepared for program {}", program.id)))?;

        let uniform_buffer = program.uniform_block.as_ref().map(|block| {
            let contents = pack_uniforms(program.id, block.size, uniforms);
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Pass Uniforms"),
                contents: &contents,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let mut entries = Vec::new();
        if let (Some(block), Some(buffer)) = (&program.uniform_block, &uniform_buffer) {
            entries.push(wgpu::BindGroupEntry {
                binding: block.binding,
                resource: buffer.as_entire_binding(),
            });
        }
        for slot in &program.textures {
            let view = textures.get(&slot.binding).copied().unwrap_or(&self.placeholder);
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        for &binding in &program.samplers {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
        }

        let (_, error) = self.scoped(|device| {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Pass Bind Group"),
                layout: &program.bind_group_layout,
                entries: &entries,
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Pass Encoder") });
            {
                let color_attachments = targets
                    .iter()
                    .map(|(view, _)| {
                        Some(wgpu::RenderPassColorAttachment {
                            view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Load,
                                store: wgpu::StoreOp::Store,
                            },
                        })
                    })
                    .collect::<Vec<_>>();
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Pass"),
                    color_attachments: &color_attachments,
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &bind_group, &[]);
                render_pass.set_viewport(0.0, 0.0, viewport.width as f32, viewport.height as f32, 0.0, 1.0);
                render_pass.draw(0..3, 0..1);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
        });

        match error {
            Some(error) => Err(DeviceError::Submission(error.to_string())),
            None => Ok(()),
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type Image = WgpuImage;
    type Framebuffer = WgpuFramebuffer;
    type Location = WgpuLocation;

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<WgpuShader, String> {
        let stage = match stage {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        };

        let mut frontend = naga::front::glsl::Frontend::default();
        let module = frontend.parse(&naga::front::glsl::Options::from(stage), source).map_err(|errors| {
            errors
                .errors
                .iter()
                .map(|error| format!("ERROR: 0:{}: {}", error.meta.location(source).line_number, error.kind))
                .collect::<Vec<_>>()
                .join("\n")
        })?;

        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::default())
            .validate(&module)
            .map_err(|error| {
                let line = error.spans().next().map(|(span, _)| span.location(source).line_number).unwrap_or(0);
                format!("ERROR: 0:{line}: {}", error.as_inner())
            })?;

        Ok(WgpuShader { stage, module })
    }

    fn link_program(&mut self, vertex: &WgpuShader, fragment: &WgpuShader) -> Result<WgpuProgram, String> {
        if vertex.stage != naga::ShaderStage::Vertex || fragment.stage != naga::ShaderStage::Fragment {
            return Err("link requires one vertex and one fragment shader".to_string());
        }

        let interface = reflect_interface(&fragment.module)?;
        let sample_type = wgpu::TextureSampleType::Float {
            filterable: self.float32_filterable,
        };
        let sampler_type = if self.float32_filterable {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };

        let mut layout_entries = Vec::new();
        if let Some(block) = &interface.uniform_block {
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(block.size as u64),
                },
                count: None,
            });
        }
        for slot in &interface.textures {
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: slot.binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        for &binding in &interface.samplers {
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(sampler_type),
                count: None,
            });
        }

        let id = self.next_id();
        let ((vertex_module, fragment_module, bind_group_layout, pipeline_layout), error) = self.scoped(|device| {
            let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Fullscreen Vertex"),
                source: wgpu::ShaderSource::Naga(Cow::Owned(vertex.module.clone())),
            });
            let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("Pass Fragment {id}")),
                source: wgpu::ShaderSource::Naga(Cow::Owned(fragment.module.clone())),
            });
            let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("Pass Bind Group Layout {id}")),
                entries: &layout_entries,
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("Pass Pipeline Layout {id}")),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
            (vertex_module, fragment_module, bind_group_layout, pipeline_layout)
        });
        if let Some(error) = error {
            return Err(error.to_string());
        }

        Ok(WgpuProgram {
            id,
            vertex: vertex_module,
            fragment: fragment_module,
            bind_group_layout,
            pipeline_layout,
            uniform_block: interface.uniform_block,
            textures: interface.textures,
            samplers: interface.samplers,
        })
    }

    fn delete_shader(&mut self, _shader: WgpuShader) {}

    fn delete_program(&mut self, program: WgpuProgram) {
        self.pipelines.retain(|key, _| key.program != program.id);
    }

    fn uniform_location(&self, program: &WgpuProgram, name: &str) -> Option<WgpuLocation> {
        if let Some(&offset) = program.uniform_block.as_ref().and_then(|block| block.offsets.get(name)) {
            return Some(WgpuLocation::Uniform { offset });
        }
        let texture_name = format!("{name}{SAMPLER_TEXTURE_SUFFIX}");
        program
            .textures
            .iter()
            .find(|slot| slot.name == texture_name)
            .map(|slot| WgpuLocation::Texture { binding: slot.binding })
    }

    fn create_image(&mut self, format: PixelFormat, size: Extent) -> Result<WgpuImage, DeviceError> {
        let texture_format = texture_format(format);
        let (texture, error) = self.scoped(|device| create_texture(device, &format!("Image {format} {size}"), size, texture_format, IMAGE_USAGE));
        if let Some(error) = error {
            return Err(DeviceError::ImageCreation {
                format,
                size,
                message: error.to_string(),
            });
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuImage {
            texture,
            view,
            format: texture_format,
        })
    }

    fn delete_image(&mut self, image: WgpuImage) {
        image.texture.destroy();
    }

    fn create_framebuffer(&mut self) -> Result<WgpuFramebuffer, DeviceError> {
        Ok(WgpuFramebuffer { id: self.next_id() })
    }

    fn delete_framebuffer(&mut self, framebuffer: WgpuFramebuffer) {
        tracing::trace!(framebuffer = framebuffer.id, "released framebuffer");
    }

    fn resize_surface(&mut self, size: Extent) -> Result<(), DeviceError> {
        let surface = create_surface(&self.device, size)?;
        self.surface.destroy();
        self.surface_view = surface.create_view(&wgpu::TextureViewDescriptor::default());
        self.surface = surface;
        Ok(())
    }

    fn clear_surface(&mut self, color: [f32; 4]) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Clear Encoder") });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Surface"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.surface_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: color[0] as f64,
                        g: color[1] as f64,
                        b: color[2] as f64,
                        a: color[3] as f64,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn draw(&mut self, call: &DrawCall<'_, Self>) -> Result<(), DeviceError> {
        let formats = call.attachments.iter().map(|image| image.format).collect();
        let key = self.prepare_pipeline(call.program, call.blend, formats)?;

        let targets = call.attachments.iter().map(|image| (&image.view, image.format)).collect::<Vec<_>>();
        let textures = call
            .textures
            .iter()
            .filter_map(|texture| match (&texture.location, texture.image) {
                (Some(WgpuLocation::Texture { binding }), Some(image)) => Some((*binding, &image.view)),
                _ => None,
            })
            .collect::<HashMap<_, _>>();

        self.submit_draw(&key, call.program, &targets, &call.uniforms, &textures, call.viewport)
    }

    fn present(&mut self, program: &WgpuProgram, image: &WgpuImage) -> Result<(), DeviceError> {
        let key = self.prepare_pipeline(program, BlendMode::Opaque, vec![SURFACE_FORMAT])?;
        let surface_size = Extent::new(self.surface.width(), self.surface.height());
        let textures = program.textures.first().map(|slot| (slot.binding, &image.view)).into_iter().collect::<HashMap<_, _>>();

        self.submit_draw(&key, program, &[(&self.surface_view, SURFACE_FORMAT)], &[], &textures, surface_size)
    }
}

/// Resource interface reflected from a fragment module
struct ReflectedInterface {
    uniform_block: Option<UniformBlock>,
    textures: Vec<TextureSlot>,
    samplers: Vec<u32>,
}

/// Collects the uniform block, sampled textures and samplers declared in descriptor set 0
fn reflect_interface(module: &naga::Module) -> Result<ReflectedInterface, String> {
    let mut interface = ReflectedInterface {
        uniform_block: None,
        textures: Vec::new(),
        samplers: Vec::new(),
    };

    for (_, global) in module.global_variables.iter() {
        let Some(binding) = &global.binding else { continue };
        if binding.group != 0 {
            return Err(format!("resource in descriptor set {} is not supported", binding.group));
        }

        match (&global.space, &module.types[global.ty].inner) {
            (naga::AddressSpace::Uniform, naga::TypeInner::Struct { members, span }) => {
                let offsets = members.iter().filter_map(|member| member.name.clone().map(|name| (name, member.offset))).collect();
                interface.uniform_block = Some(UniformBlock {
                    binding: binding.binding,
                    size: *span,
                    offsets,
                });
            }
            (naga::AddressSpace::Handle, naga::TypeInner::Image { .. }) => interface.textures.push(TextureSlot {
                name: global.name.clone().unwrap_or_default(),
                binding: binding.binding,
            }),
            (naga::AddressSpace::Handle, naga::TypeInner::Sampler { .. }) => interface.samplers.push(binding.binding),
            (space, _) => return Err(format!("unsupported resource in {space:?} address space at binding {}", binding.binding)),
        }
    }

    Ok(interface)
}

/// Lays uniform values out at their block offsets
///
/// A value that would run past the end of the block is dropped with a warning.
fn pack_uniforms(program: u64, block_size: u32, uniforms: &[(WgpuLocation, UniformValue)]) -> Vec<u8> {
    let mut contents = vec![0u8; block_size as usize];
    for (location, value) in uniforms {
        if let WgpuLocation::Uniform { offset } = *location {
            let bytes = value.to_bytes();
            let start = offset as usize;
            match contents.get_mut(start..start + bytes.len()) {
                Some(slot) => slot.copy_from_slice(&bytes),
                None => tracing::warn!(program, offset, size = bytes.len(), block_size, "uniform value overflows its block, dropping it"),
            }
        }
    }
    contents
}

fn with_error_scope<T>(device: &wgpu::Device, f: impl FnOnce(&wgpu::Device) -> T) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f(device);
    let error = pollster::block_on(device.pop_error_scope());
    (value, error)
}

/// Creates the presentable surface texture, reporting sizes the device rejects
fn create_surface(device: &wgpu::Device, size: Extent) -> Result<wgpu::Texture, DeviceError> {
    let size = size.at_least_one();
    let (texture, error) = with_error_scope(device, |device| create_texture(device, "Surface", size, SURFACE_FORMAT, SURFACE_USAGE));
    match error {
        Some(err) => {
            texture.destroy();
            Err(DeviceError::SurfaceCreation { size, message: err.to_string() })
        }
        None => Ok(texture),
    }
}

fn create_texture(device: &wgpu::Device, label: &str, size: Extent, format: wgpu::TextureFormat, usage: wgpu::TextureUsages) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

/// Texture format backing each pixel format
pub fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba16F => wgpu::TextureFormat::Rgba16Float,
        PixelFormat::Rgba32F => wgpu::TextureFormat::Rgba32Float,
    }
}

/// Fixed-function blend state of a mode on a target format
///
/// 32-bit float targets are not blendable, so they always write opaque.
pub fn blend_state(mode: BlendMode, format: wgpu::TextureFormat) -> Option<wgpu::BlendState> {
    if format == wgpu::TextureFormat::Rgba32Float {
        return None;
    }
    let component = |src_factor, dst_factor| wgpu::BlendComponent {
        src_factor,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    use wgpu::BlendFactor::*;
    match mode {
        BlendMode::Opaque => None,
        BlendMode::AlphaBlend => Some(wgpu::BlendState {
            color: component(SrcAlpha, OneMinusSrcAlpha),
            alpha: component(One, OneMinusSrcAlpha),
        }),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: component(One, One),
            alpha: component(One, One),
        }),
        BlendMode::Multiplicative => Some(wgpu::BlendState {
            color: component(Dst, Zero),
            alpha: component(DstAlpha, Zero),
        }),
    }
}
