//! In-memory collaborators for unit tests

use crate::controls::{ControlHost, ControlSpec, WidgetId};
use crate::device::{DeviceError, DrawCall, Extent, GraphicsDevice, PixelFormat, ShaderStage};
use crate::script::{
    BlendMode, BlockBody, ColorAttachment, ContextInput, ContextRequest, FrameResult, LoadResult, NameTypePair, SamplerBinding, ScriptCompiler, ScriptError, ShaderDesc, ShaderInvocation,
    UniformValue, Vec2,
};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug)]
pub struct MockShader {
    id: u32,
    source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockProgram(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockImage(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockFramebuffer(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLocation {
    pub name: String,
}

/// A draw as seen by [`MockDevice`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub program: MockProgram,
    pub framebuffer: MockFramebuffer,
    pub uniforms: Vec<(String, UniformValue)>,
    /// (unit, sampler name, image)
    pub textures: Vec<(u32, Option<String>, Option<MockImage>)>,
    pub attachments: Vec<MockImage>,
    pub viewport: Extent,
    pub blend: BlendMode,
}

/// Recording graphics device
///
/// Shader compilation fails with a GL-style `ERROR: 0:<line>:` log when the source
/// contains `syntax_error`; linking fails when the fragment source contains `link_error`.
#[derive(Debug, Default)]
pub struct MockDevice {
    next_id: u32,
    shaders: HashSet<u32>,
    programs: HashMap<u32, String>,
    images: HashMap<u32, (PixelFormat, Extent)>,
    framebuffers: HashSet<u32>,
    pub shader_compiles: usize,
    pub fail_image_creation: bool,
    pub fail_resize: bool,
    pub fail_vertex_stage: bool,
    pub draws: Vec<RecordedDraw>,
    pub presents: Vec<(MockProgram, MockImage)>,
    pub resizes: Vec<Extent>,
    pub clears: usize,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn image_info(&self, image: MockImage) -> Option<(PixelFormat, Extent)> {
        self.images.get(&image.0).copied()
    }
}

impl GraphicsDevice for MockDevice {
    type Shader = MockShader;
    type Program = MockProgram;
    type Image = MockImage;
    type Framebuffer = MockFramebuffer;
    type Location = MockLocation;

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<MockShader, String> {
        self.shader_compiles += 1;
        if self.fail_vertex_stage && stage == ShaderStage::Vertex {
            return Err("ERROR: vertex stage unsupported".to_string());
        }
        if let Some(index) = source.lines().position(|line| line.contains("syntax_error")) {
            return Err(format!("ERROR: 0:{}: 'syntax_error' : syntax error", index + 1));
        }
        let id = self.next_id();
        self.shaders.insert(id);
        Ok(MockShader {
            id,
            source: source.to_string(),
        })
    }

    fn link_program(&mut self, _vertex: &MockShader, fragment: &MockShader) -> Result<MockProgram, String> {
        if fragment.source.contains("link_error") {
            return Err("link failed".to_string());
        }
        let id = self.next_id();
        self.programs.insert(id, fragment.source.clone());
        Ok(MockProgram(id))
    }

    fn delete_shader(&mut self, shader: MockShader) {
        self.shaders.remove(&shader.id);
    }

    fn delete_program(&mut self, program: MockProgram) {
        self.programs.remove(&program.0);
    }

    fn uniform_location(&self, program: &MockProgram, name: &str) -> Option<MockLocation> {
        self.programs
            .get(&program.0)
            .filter(|source| source.contains(name))
            .map(|_| MockLocation { name: name.to_string() })
    }

    fn create_image(&mut self, format: PixelFormat, size: Extent) -> Result<MockImage, DeviceError> {
        if self.fail_image_creation {
            return Err(DeviceError::ImageCreation {
                format,
                size,
                message: "out of memory".to_string(),
            });
        }
        let id = self.next_id();
        self.images.insert(id, (format, size));
        Ok(MockImage(id))
    }

    fn delete_image(&mut self, image: MockImage) {
        self.images.remove(&image.0);
    }

    fn create_framebuffer(&mut self) -> Result<MockFramebuffer, DeviceError> {
        let id = self.next_id();
        self.framebuffers.insert(id);
        Ok(MockFramebuffer(id))
    }

    fn delete_framebuffer(&mut self, framebuffer: MockFramebuffer) {
        self.framebuffers.remove(&framebuffer.0);
    }

    fn resize_surface(&mut self, size: Extent) -> Result<(), DeviceError> {
        if self.fail_resize {
            return Err(DeviceError::SurfaceCreation {
                size,
                message: "dimension exceeds device limit".to_string(),
            });
        }
        self.resizes.push(size);
        Ok(())
    }

    fn clear_surface(&mut self, _color: [f32; 4]) {
        self.clears += 1;
    }

    fn draw(&mut self, call: &DrawCall<'_, Self>) -> Result<(), DeviceError> {
        self.draws.push(RecordedDraw {
            program: *call.program,
            framebuffer: *call.framebuffer,
            uniforms: call.uniforms.iter().map(|(location, value)| (location.name.clone(), *value)).collect(),
            textures: call
                .textures
                .iter()
                .map(|texture| (texture.unit, texture.location.as_ref().map(|location| location.name.clone()), texture.image.copied()))
                .collect(),
            attachments: call.attachments.iter().map(|image| **image).collect(),
            viewport: call.viewport,
            blend: call.blend,
        });
        Ok(())
    }

    fn present(&mut self, program: &MockProgram, image: &MockImage) -> Result<(), DeviceError> {
        self.presents.push((*program, *image));
        Ok(())
    }
}

/// Recording control host; tests may edit slider values through `values`
#[derive(Debug, Default)]
pub struct MockControls {
    next_widget: WidgetId,
    specs: HashMap<WidgetId, ControlSpec>,
    pub created: Vec<(ControlSpec, usize)>,
    pub removed: Vec<WidgetId>,
    pub values: HashMap<WidgetId, f64>,
    pub texts: HashMap<WidgetId, String>,
}

impl MockControls {
    /// Live widget whose spec carries `name`
    pub fn widget_named(&self, name: &str) -> Option<WidgetId> {
        self.specs.iter().find(|(_, spec)| spec.name() == Some(name)).map(|(widget, _)| *widget)
    }
}

impl ControlHost for MockControls {
    fn create(&mut self, spec: &ControlSpec, position: usize) -> WidgetId {
        self.next_widget += 1;
        let widget = self.next_widget;
        self.specs.insert(widget, spec.clone());
        self.created.push((spec.clone(), position));
        if let Some(value) = spec.initial_value() {
            self.values.insert(widget, value);
        }
        widget
    }

    fn remove(&mut self, widget: WidgetId) {
        self.specs.remove(&widget);
        self.values.remove(&widget);
        self.texts.remove(&widget);
        self.removed.push(widget);
    }

    fn read_value(&self, widget: WidgetId) -> Option<f64> {
        self.values.get(&widget).copied()
    }

    fn set_text(&mut self, widget: WidgetId, text: &str) {
        self.texts.insert(widget, text.to_string());
    }
}

/// Script compiler that serves canned results and records the inputs it was given
#[derive(Debug, Default)]
pub struct ScriptedCompiler {
    pub load: LoadResult,
    pub fail_compile: bool,
    /// Served in order; `default_frame` once exhausted
    pub frames: VecDeque<Result<FrameResult, String>>,
    pub default_frame: FrameResult,
    pub received: Vec<Vec<ContextInput>>,
}

impl ScriptCompiler for ScriptedCompiler {
    fn compile(&mut self, _source: &str) -> Result<LoadResult, ScriptError> {
        if self.fail_compile {
            return Err(ScriptError::Unavailable("compiler crashed".to_string()));
        }
        Ok(self.load.clone())
    }

    fn evaluate(&mut self, inputs: &[ContextInput]) -> Result<FrameResult, ScriptError> {
        self.received.push(inputs.to_vec());
        match self.frames.pop_front() {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(message)) => Err(ScriptError::Evaluation(message)),
            None => Ok(self.default_frame.clone()),
        }
    }
}

pub fn name_type(name: &str, ty: &str) -> NameTypePair {
    NameTypePair {
        name: name.to_string(),
        ty: ty.to_string(),
    }
}

/// Pass with a single `vec4` output
pub fn pass_desc(name: &str, body: &str, start: u32) -> ShaderDesc {
    ShaderDesc {
        name: name.to_string(),
        blend_mode: BlendMode::Opaque,
        includes: Vec::new(),
        outs: vec![name_type("out_color", "vec4")],
        uniforms: Vec::new(),
        samplers: Vec::new(),
        body: BlockBody {
            text: body.to_string(),
            start,
        },
    }
}

pub fn invocation(shader_name: &str, attachments: &[u32]) -> ShaderInvocation {
    ShaderInvocation {
        shader_name: shader_name.to_string(),
        uniforms: Vec::new(),
        image_sampler_bindings: Vec::new(),
        color_attachments: attachments
            .iter()
            .map(|&id| ColorAttachment {
                id,
                mip_start: 0,
                mip_end: 1,
            })
            .collect(),
    }
}

pub fn sampling(invocation: ShaderInvocation, images: &[u32]) -> ShaderInvocation {
    ShaderInvocation {
        image_sampler_bindings: images.iter().map(|&id| SamplerBinding { id }).collect(),
        ..invocation
    }
}

pub fn image_request(id: u32, pixel_format: &str, width: u32, height: u32) -> ContextRequest {
    ContextRequest::CachedImage {
        id,
        pixel_format: pixel_format.to_string(),
        size: Vec2 { x: width, y: height },
    }
}

/// Input value named `name`, if present
pub fn input<'a>(inputs: &'a [ContextInput], name: &str) -> Option<&'a UniformValue> {
    inputs.iter().find(|input| input.name == name).map(|input| &input.value)
}
