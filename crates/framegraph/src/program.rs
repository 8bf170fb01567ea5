//! Raster program compilation
//!
//! Every pass is a fullscreen triangle, so programs are always a fixed vertex stage
//! linked with a pass-specific fragment stage.

use crate::device::{GraphicsDevice, ShaderStage};
use regex::Regex;
use std::sync::LazyLock;

/// Vertex stage shared by every pass: one triangle covering the whole viewport
pub const FULLSCREEN_VERTEX_SOURCE: &str = r#"#version 450

void main() {
    float x = gl_VertexIndex == 2 ? 4.0 : -1.0;
    float y = gl_VertexIndex == 1 ? 4.0 : -1.0;
    gl_Position = vec4(x, y, 0.0, 1.0);
}
"#;

/// `<file>:<line>` as found in GL-family driver logs, e.g. `ERROR: 0:12: ...`
static DIAGNOSTIC_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(\d+)\s*:\s*(\d+)").ok());

/// Structured program compilation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgramError {
    /// The fragment stage failed to compile or the program failed to link
    ///
    /// `line` is the 1-based generated line the diagnostic points at, or 0 when unknown.
    #[error("{message}")]
    Failed { line: u32, message: String },
    /// The fixed vertex stage failed to compile; the device is unusable for passes
    #[error("fullscreen vertex stage failed to compile: {0}")]
    Fatal(String),
}

impl ProgramError {
    /// Generated line the failure is attributed to, 0 if none
    pub fn line(&self) -> u32 {
        match self {
            Self::Failed { line, .. } => *line,
            Self::Fatal(_) => 0,
        }
    }
}

/// Extracts the line number from a native compiler diagnostic
///
/// The second number of the first `<digits>:<digits>` pair is taken as the line.
/// Driver log formats are not standardized, so anything unparsable yields 0.
pub fn diagnostic_line(log: &str) -> u32 {
    DIAGNOSTIC_LINE
        .as_ref()
        .and_then(|re| re.captures(log))
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Compiles fragment sources into fullscreen raster programs
#[derive(Debug, Clone)]
pub struct RasterProgramCompiler {
    vertex_source: String,
}

impl Default for RasterProgramCompiler {
    fn default() -> Self {
        Self::new(FULLSCREEN_VERTEX_SOURCE)
    }
}

impl RasterProgramCompiler {
    /// Creates a compiler that links fragments against `vertex_source`
    pub fn new(vertex_source: impl Into<String>) -> Self {
        Self {
            vertex_source: vertex_source.into(),
        }
    }

    /// Compiles and links a program
    ///
    /// Shader objects never outlive this call, whether linking succeeds or not.
    ///
    /// # Arguments
    /// * `device` - Device that owns the resulting program
    /// * `fragment_source` - Complete fragment shader source
    ///
    /// # Returns
    /// The linked program, or the failure with the line it was attributed to
    pub fn compile<D: GraphicsDevice>(&self, device: &mut D, fragment_source: &str) -> Result<D::Program, ProgramError> {
        let fragment = device.compile_shader(ShaderStage::Fragment, fragment_source).map_err(|log| ProgramError::Failed {
            line: diagnostic_line(&log),
            message: log,
        })?;

        let vertex = match device.compile_shader(ShaderStage::Vertex, &self.vertex_source) {
            Ok(vertex) => vertex,
            Err(log) => {
                device.delete_shader(fragment);
                return Err(ProgramError::Fatal(log));
            }
        };

        let linked = device.link_program(&vertex, &fragment);
        device.delete_shader(vertex);
        device.delete_shader(fragment);

        linked.map_err(|log| ProgramError::Failed { line: 0, message: log })
    }
}
