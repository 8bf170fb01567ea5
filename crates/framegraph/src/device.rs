//! Graphics device abstraction
//!
//! The frame-graph engine talks to the GPU exclusively through [`GraphicsDevice`].
//! The trait mirrors an OpenGL-family object model: shaders are compiled and linked
//! into programs, uniform locations are looked up by name, images and framebuffers
//! are created and released explicitly, and every pass is a fullscreen-triangle draw.

use crate::script::{BlendMode, UniformValue};
use std::fmt;
use std::str::FromStr;

/// Width and height of an image or surface in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    /// Creates a new extent
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns this extent with both dimensions clamped to at least one pixel
    pub fn at_least_one(self) -> Self {
        Self::new(self.width.max(1), self.height.max(1))
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel formats an image request may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit unsigned normalized RGBA
    Rgba8,
    /// 16-bit float RGBA
    Rgba16F,
    /// 32-bit float RGBA
    Rgba32F,
}

impl FromStr for PixelFormat {
    type Err = PixelFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rgba8" => Ok(Self::Rgba8),
            "rgba16f" => Ok(Self::Rgba16F),
            "rgba32f" => Ok(Self::Rgba32F),
            _ => Err(PixelFormatParseError(s.to_string())),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgba8 => write!(f, "rgba8"),
            Self::Rgba16F => write!(f, "rgba16f"),
            Self::Rgba32F => write!(f, "rgba32f"),
        }
    }
}

/// Error returned when a pixel format name is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pixel format '{0}'")]
pub struct PixelFormatParseError(pub String);

/// Pipeline stage a shader object belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Resource-level device failure
///
/// These never abort a frame; the operation that produced them is skipped and logged.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// A texture could not be created
    #[error("failed to create {format} image of size {size}: {message}")]
    ImageCreation { format: PixelFormat, size: Extent, message: String },
    /// The presentable surface could not be (re)created
    #[error("failed to create {size} surface: {message}")]
    SurfaceCreation { size: Extent, message: String },
    /// A framebuffer could not be created
    #[error("failed to create framebuffer: {0}")]
    FramebufferCreation(String),
    /// A draw or present submission was rejected by the backend
    #[error("draw submission failed: {0}")]
    Submission(String),
    /// Adapter or device acquisition failed
    #[error("graphics backend unavailable: {0}")]
    Backend(String),
}

/// A texture bound to a sequential texture unit for one draw
pub struct TextureBinding<'a, D: GraphicsDevice + ?Sized> {
    /// Texture unit index, assigned in sampler declaration order
    pub unit: u32,
    /// Sampler uniform location in the program, if the program uses it
    pub location: Option<D::Location>,
    /// Image to sample; `None` leaves the unit without a texture
    pub image: Option<&'a D::Image>,
}

/// Everything a single fullscreen pass needs to be drawn
pub struct DrawCall<'a, D: GraphicsDevice + ?Sized> {
    pub program: &'a D::Program,
    pub framebuffer: &'a D::Framebuffer,
    /// Uniform values to set before drawing, keyed by resolved location
    pub uniforms: Vec<(D::Location, UniformValue)>,
    pub textures: Vec<TextureBinding<'a, D>>,
    /// Color attachments; the index in this list is the attachment slot
    pub attachments: Vec<&'a D::Image>,
    pub viewport: Extent,
    pub blend: BlendMode,
}

/// GPU abstraction consumed by the frame-graph engine
pub trait GraphicsDevice {
    type Shader;
    type Program;
    type Image;
    type Framebuffer;
    type Location: Clone + fmt::Debug;

    /// Compiles one shader stage, returning the native diagnostic log on failure
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;

    /// Links a vertex and fragment shader into a program, returning the link log on failure
    fn link_program(&mut self, vertex: &Self::Shader, fragment: &Self::Shader) -> Result<Self::Program, String>;

    fn delete_shader(&mut self, shader: Self::Shader);

    fn delete_program(&mut self, program: Self::Program);

    /// Looks up a uniform or sampler location by name
    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<Self::Location>;

    fn create_image(&mut self, format: PixelFormat, size: Extent) -> Result<Self::Image, DeviceError>;

    fn delete_image(&mut self, image: Self::Image);

    fn create_framebuffer(&mut self) -> Result<Self::Framebuffer, DeviceError>;

    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer);

    /// Resizes the presentable surface backing store
    ///
    /// On failure the previous surface stays in place.
    fn resize_surface(&mut self, size: Extent) -> Result<(), DeviceError>;

    /// Clears the presentable surface
    fn clear_surface(&mut self, color: [f32; 4]);

    /// Draws a fullscreen triangle into the call's attachments
    fn draw(&mut self, call: &DrawCall<'_, Self>) -> Result<(), DeviceError>;

    /// Copies `image` onto the presentable surface using the given copy program
    fn present(&mut self, program: &Self::Program, image: &Self::Image) -> Result<(), DeviceError>;
}
