//! Frame execution engine
//!
//! [`FrameExecutor`] ties the pieces together. [`FrameExecutor::build`] runs on every
//! edit and feeds the script compiler's pass descriptions into the pass registry;
//! [`FrameExecutor::tick`] runs on every animation frame, evaluates the render graph
//! and turns its requests and invocations into draws.

use crate::clock::PlaybackClock;
use crate::controls::{ControlHost, ControlReconciler, ControlSpec};
use crate::device::{DeviceError, DrawCall, Extent, GraphicsDevice, PixelFormat, TextureBinding};
use crate::framegraph::{Framegraph, PassFailure, RegistryError};
use crate::image_cache::{DEFAULT_STALENESS_THRESHOLD, ImageCache, ImageRequest, SWAPCHAIN_IMAGE_ID};
use crate::program::{ProgramError, RasterProgramCompiler};
use crate::script::{ContextRequest, ScriptCompiler, ScriptError, ShaderInvocation, UniformValue, Vec2};
use crate::session::SessionContext;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Copies the swapchain image onto the surface with gamma correction
pub const PRESENT_FRAGMENT_SOURCE: &str = r#"#version 450
layout(set = 0, binding = 1) uniform texture2D source_texture;
layout(set = 0, binding = 2) uniform sampler source_sampler;
layout(location = 0) out vec4 out_color;

void main() {
    vec3 color = texelFetch(sampler2D(source_texture, source_sampler), ivec2(gl_FragCoord.xy), 0).rgb;
    out_color = vec4(pow(clamp(color, 0.0, 1.0), vec3(1.0 / 2.2)), 1.0);
}
"#;

/// Executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Unused frames after which a cached image is released
    pub staleness_threshold: u32,
    /// Format of the swapchain-sized image with logical id 0
    pub swapchain_format: PixelFormat,
    /// Color the surface is cleared to every frame
    pub clear_color: [f32; 4],
    /// Context input carrying elapsed milliseconds
    pub time_input: String,
    /// Context input carrying the swapchain size
    pub size_input: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: DEFAULT_STALENESS_THRESHOLD,
            swapchain_format: PixelFormat::Rgba8,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            time_input: "@time".to_string(),
            size_input: "@swapchain_size".to_string(),
        }
    }
}

/// Build-time failure surfaced to the editor
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The script itself did not compile
    #[error("{line}:{column}: {message}")]
    Script { line: u32, column: u32, message: String },
    /// A pass's generated shader did not compile
    #[error(transparent)]
    Shader(#[from] PassFailure),
    /// The device cannot build any pass
    #[error(transparent)]
    Fatal(ProgramError),
    /// The compiler produced no usable result
    #[error(transparent)]
    Unavailable(#[from] ScriptError),
}

impl From<RegistryError> for BuildError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Pass(failure) => Self::Shader(failure),
            RegistryError::Fatal(err) => Self::Fatal(err),
        }
    }
}

impl BuildError {
    /// Original script line the error points at, 0 if unknown
    pub fn line(&self) -> u32 {
        match self {
            Self::Script { line, .. } => *line,
            Self::Shader(failure) => failure.line,
            Self::Fatal(_) | Self::Unavailable(_) => 0,
        }
    }
}

/// Reason a single shader invocation was skipped
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("no pass named '{0}'")]
    UnknownPass(String),
    #[error("pass '{pass}' has {expected} outputs but the invocation binds {actual} attachments")]
    AttachmentCountMismatch { pass: String, expected: usize, actual: usize },
    #[error("pass '{pass}' attachments differ in size: {expected} and {actual}")]
    AttachmentSizeMismatch { pass: String, expected: Extent, actual: Extent },
    #[error("pass '{pass}' writes to image {image}, which was not requested this frame")]
    UnresolvedAttachment { pass: String, image: u32 },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Lifecycle state of the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// No build has succeeded yet; ticks do nothing
    Uncompiled,
    Ready,
}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No successful build yet
    NotCompiled,
    /// Playback is paused; the surface keeps its last image
    Paused,
    /// The surface could not be resized to the layout size; retried next tick
    SurfaceUnavailable,
    /// The script failed to evaluate; nothing was drawn
    EvaluationFailed,
    Rendered { executed: usize, skipped: usize },
}

/// Drives builds and frames for one editor session
pub struct FrameExecutor<D: GraphicsDevice, S: ScriptCompiler, H: ControlHost> {
    device: D,
    compiler: S,
    host: H,
    config: ExecutorConfig,
    present_program: D::Program,
    framegraph: Framegraph<D>,
    images: ImageCache<D>,
    controls: ControlReconciler,
    session: SessionContext,
    clock: PlaybackClock,
    state: ExecutorState,
    surface_size: Option<Extent>,
}

impl<D: GraphicsDevice, S: ScriptCompiler, H: ControlHost> FrameExecutor<D, S, H> {
    /// Creates an executor
    ///
    /// # Arguments
    /// * `device` - Graphics device all passes run on
    /// * `compiler` - Script compiler producing pass descriptions and frames
    /// * `host` - UI host for script controls
    /// * `config` - Executor settings
    ///
    /// # Returns
    /// The executor, or the error from compiling the present program
    pub fn new(mut device: D, compiler: S, host: H, config: ExecutorConfig) -> Result<Self, ProgramError> {
        let program_compiler = RasterProgramCompiler::default();
        let present_program = program_compiler.compile(&mut device, PRESENT_FRAGMENT_SOURCE)?;

        Ok(Self {
            device,
            compiler,
            host,
            images: ImageCache::new(config.staleness_threshold),
            config,
            present_program,
            framegraph: Framegraph::new(program_compiler),
            controls: ControlReconciler::new(),
            session: SessionContext::new(),
            clock: PlaybackClock::new(),
            state: ExecutorState::Uncompiled,
            surface_size: None,
        })
    }

    /// Compiles script source and updates the pass registry
    ///
    /// On failure the previously built passes keep running.
    pub fn build(&mut self, source: &str) -> Result<(), BuildError> {
        let load = self.compiler.compile(source)?;
        if let Some(error) = load.error {
            return Err(BuildError::Script {
                line: error.line,
                column: error.column,
                message: error.desc,
            });
        }

        self.framegraph.update_from_compile_result(&mut self.device, &load.declarations, &load.shader_descs)?;

        if self.state == ExecutorState::Uncompiled {
            tracing::info!(passes = self.framegraph.len(), "first successful build");
            self.state = ExecutorState::Ready;
        }
        Ok(())
    }

    /// Runs one frame
    ///
    /// Never fails: every problem is logged and, depending on its scope, skips the
    /// offending invocation or the rest of the frame.
    ///
    /// # Arguments
    /// * `now` - Host timestamp of this tick
    /// * `layout_size` - Current size of the area the surface is displayed in
    pub fn tick(&mut self, now: Duration, layout_size: Extent) -> FrameOutcome {
        if self.state == ExecutorState::Uncompiled {
            return FrameOutcome::NotCompiled;
        }
        if !self.clock.is_playing() {
            return FrameOutcome::Paused;
        }
        let elapsed = self.clock.elapsed(now);

        let size = layout_size.at_least_one();
        if self.surface_size != Some(size) {
            tracing::debug!(%size, "resizing surface");
            if let Err(err) = self.device.resize_surface(size) {
                tracing::error!(%size, error = %err, "surface resize failed, skipping frame");
                return FrameOutcome::SurfaceUnavailable;
            }
            self.surface_size = Some(size);
        }
        self.device.clear_surface(self.config.clear_color);

        self.session.push_input(
            self.config.size_input.clone(),
            UniformValue::UVec2(Vec2 {
                x: size.width,
                y: size.height,
            }),
        );
        self.session.push_input(self.config.time_input.clone(), UniformValue::Float((elapsed.as_secs_f64() * 1000.0) as f32));

        let inputs = self.session.take_inputs();
        let frame = match self.compiler.evaluate(&inputs) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "frame evaluation failed");
                return FrameOutcome::EvaluationFailed;
            }
        };

        self.images.begin_frame(&mut self.device);
        let swapchain_request = ImageRequest {
            id: SWAPCHAIN_IMAGE_ID,
            format: self.config.swapchain_format,
            size,
        };
        if let Err(err) = self.images.resolve(&mut self.device, &swapchain_request) {
            tracing::error!(error = %err, "failed to allocate swapchain image");
        }

        self.process_requests(&frame.context_requests);

        let mut executed = 0;
        let mut skipped = 0;
        for invocation in &frame.shader_invocations {
            match self.run_invocation(invocation) {
                Ok(()) => executed += 1,
                Err(err) => {
                    tracing::warn!(pass = %invocation.shader_name, error = %err, "skipping shader invocation");
                    skipped += 1;
                }
            }
        }

        match self.images.get(SWAPCHAIN_IMAGE_ID) {
            Some(swapchain) => {
                if let Err(err) = self.device.present(&self.present_program, &swapchain.image) {
                    tracing::error!(error = %err, "present failed");
                }
            }
            None => tracing::warn!("no swapchain image to present"),
        }

        self.controls.end_frame(&mut self.host);

        FrameOutcome::Rendered { executed, skipped }
    }

    /// Handles the frame's context requests in declaration order
    fn process_requests(&mut self, requests: &[ContextRequest]) {
        self.session.begin_requests();

        for request in requests {
            match request {
                ContextRequest::Float { name, min_val, max_val, def_val } => {
                    let spec = ControlSpec::float_slider(name, *min_val as f64, *max_val as f64, self.session.value_or(name, *def_val as f64));
                    let value = self.slider_value(&spec);
                    self.session.record(name, value);
                    self.session.push_input(name, UniformValue::Float(value as f32));
                }
                ContextRequest::Int { name, min_val, max_val, def_val } => {
                    let spec = ControlSpec::int_slider(name, *min_val as f64, *max_val as f64, self.session.value_or(name, *def_val as f64));
                    let value = self.slider_value(&spec).round();
                    self.session.record(name, value);
                    self.session.push_input(name, UniformValue::Int(value as i32));
                }
                ContextRequest::Bool { name, .. } => {
                    // Always on until booleans get a dedicated control
                    self.session.mark_active(name);
                    self.session.push_input(name, UniformValue::Int(1));
                }
                ContextRequest::Text { text } => {
                    let widget = self.controls.request(&mut self.host, &ControlSpec::text(text));
                    self.host.set_text(widget, text);
                }
                ContextRequest::CachedImage { id, pixel_format, size } => {
                    if *id == SWAPCHAIN_IMAGE_ID {
                        tracing::warn!(image = id, "image id is reserved for the swapchain image");
                        continue;
                    }
                    let format = match pixel_format.parse::<PixelFormat>() {
                        Ok(format) => format,
                        Err(err) => {
                            tracing::warn!(image = id, error = %err, "skipping image request");
                            continue;
                        }
                    };
                    let request = ImageRequest {
                        id: *id,
                        format,
                        size: Extent::new(size.x, size.y).at_least_one(),
                    };
                    if let Err(err) = self.images.resolve(&mut self.device, &request) {
                        tracing::warn!(image = id, error = %err, "skipping image request");
                    }
                }
                ContextRequest::LoadedImage { filename, id } => {
                    tracing::debug!(image = id, %filename, "loaded image requests are not supported");
                }
            }
        }

        self.session.end_requests();
    }

    /// Reconciles a slider and reads its current value
    fn slider_value(&mut self, spec: &ControlSpec) -> f64 {
        let widget = self.controls.request(&mut self.host, spec);
        self.host.read_value(widget).or(spec.initial_value()).unwrap_or_default()
    }

    /// Draws one shader invocation
    fn run_invocation(&mut self, invocation: &ShaderInvocation) -> Result<(), InvocationError> {
        let pass_name = &invocation.shader_name;
        let pass = self.framegraph.get(pass_name).ok_or_else(|| InvocationError::UnknownPass(pass_name.clone()))?;

        if invocation.color_attachments.len() != pass.output_count() {
            return Err(InvocationError::AttachmentCountMismatch {
                pass: pass_name.clone(),
                expected: pass.output_count(),
                actual: invocation.color_attachments.len(),
            });
        }

        let mut attachments = Vec::with_capacity(invocation.color_attachments.len());
        let mut viewport: Option<Extent> = None;
        for attachment in &invocation.color_attachments {
            let image = self.images.get(attachment.id).ok_or_else(|| InvocationError::UnresolvedAttachment {
                pass: pass_name.clone(),
                image: attachment.id,
            })?;
            match viewport {
                Some(expected) if expected != image.size => {
                    return Err(InvocationError::AttachmentSizeMismatch {
                        pass: pass_name.clone(),
                        expected,
                        actual: image.size,
                    });
                }
                _ => viewport = Some(image.size),
            }
            attachments.push(&image.image);
        }

        let uniforms = invocation
            .uniforms
            .iter()
            .enumerate()
            .filter_map(|(index, uniform)| {
                let uniform = uniform.as_ref()?;
                let location = pass.uniform_locations.get(index)?.clone()?;
                let declared = pass.uniform_types.get(index)?;
                if !accepts_value(declared, &uniform.value) {
                    tracing::warn!(pass = %pass_name, uniform = %uniform.name, %declared, actual = uniform.value.glsl_type(), "skipping uniform of mismatched type");
                    return None;
                }
                Some((location, uniform.value))
            })
            .collect();

        let textures = invocation
            .image_sampler_bindings
            .iter()
            .enumerate()
            .map(|(index, binding)| {
                let image = self.images.get(binding.id).map(|allocated| &allocated.image);
                if image.is_none() {
                    tracing::warn!(pass = %pass_name, image = binding.id, "sampled image was not requested this frame");
                }
                TextureBinding {
                    unit: index as u32,
                    location: pass.sampler_locations.get(index).cloned().flatten(),
                    image,
                }
            })
            .collect();

        let call = DrawCall {
            program: &pass.program,
            framebuffer: &pass.framebuffer,
            uniforms,
            textures,
            attachments,
            viewport: viewport.or(self.surface_size).unwrap_or_default(),
            blend: pass.blend,
        };
        self.device.draw(&call)?;
        Ok(())
    }

    /// Pauses playback; ticks leave the surface untouched until resumed
    pub fn pause(&mut self, now: Duration) {
        self.clock.pause(now);
    }

    pub fn resume(&mut self, now: Duration) {
        self.clock.resume(now);
    }

    /// Restarts elapsed time from zero on the next tick
    pub fn restart(&mut self) {
        self.clock.restart();
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn compiler(&self) -> &S {
        &self.compiler
    }

    pub fn compiler_mut(&mut self) -> &mut S {
        &mut self.compiler
    }

    pub fn framegraph(&self) -> &Framegraph<D> {
        &self.framegraph
    }

    pub fn image_cache(&self) -> &ImageCache<D> {
        &self.images
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Surface size as of the last tick
    pub fn surface_size(&self) -> Option<Extent> {
        self.surface_size
    }

    /// Releases every GPU object and hands back the collaborators
    pub fn shutdown(mut self) -> (D, S, H) {
        self.framegraph.clear(&mut self.device);
        self.images.clear(&mut self.device);
        self.controls.clear(&mut self.host);
        self.device.delete_program(self.present_program);
        (self.device, self.compiler, self.host)
    }
}

/// Whether a value may be written to a uniform declared with GLSL type `declared`
fn accepts_value(declared: &str, value: &UniformValue) -> bool {
    match declared {
        "bool" => matches!(value, UniformValue::Int(_) | UniformValue::UInt(_)),
        _ => declared == value.glsl_type(),
    }
}
