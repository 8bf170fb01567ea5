//! Script compiler interface and data model
//!
//! The script compiler is an external collaborator. It is reached through two
//! synchronous calls: [`ScriptCompiler::compile`] turns source text into shader
//! descriptions, and [`ScriptCompiler::evaluate`] runs one frame of the render
//! graph and returns the context requests and shader invocations for it.
//!
//! The types below follow the compiler's JSON wire format, so a compiler that
//! speaks JSON can be adapted with [`JsonScriptCompiler`].

use serde::{Deserialize, Serialize};

/// Two-component vector as serialized by the compiler (`{x, y}`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2<T> {
    pub x: T,
    pub y: T,
}

/// Three-component vector (`{x, y, z}`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

/// Four-component vector (`{x, y, z, w}`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec4<T> {
    pub x: T,
    pub y: T,
    pub z: T,
    pub w: T,
}

/// A type-tagged scalar or vector value
///
/// Used for shader uniforms and for context inputs fed back to the script.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2<f32>),
    Vec3(Vec3<f32>),
    Vec4(Vec4<f32>),
    Int(i32),
    IVec2(Vec2<i32>),
    IVec3(Vec3<i32>),
    IVec4(Vec4<i32>),
    UInt(u32),
    UVec2(Vec2<u32>),
    UVec3(Vec3<u32>),
    UVec4(Vec4<u32>),
}

impl UniformValue {
    /// GLSL type name of this value
    pub fn glsl_type(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Vec2(_) => "vec2",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) => "vec4",
            Self::Int(_) => "int",
            Self::IVec2(_) => "ivec2",
            Self::IVec3(_) => "ivec3",
            Self::IVec4(_) => "ivec4",
            Self::UInt(_) => "uint",
            Self::UVec2(_) => "uvec2",
            Self::UVec3(_) => "uvec3",
            Self::UVec4(_) => "uvec4",
        }
    }

    /// Raw little-endian component bytes, as laid out in a uniform buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            Self::Float(v) => bytemuck::bytes_of(&v).to_vec(),
            Self::Vec2(v) => bytemuck::bytes_of(&[v.x, v.y]).to_vec(),
            Self::Vec3(v) => bytemuck::bytes_of(&[v.x, v.y, v.z]).to_vec(),
            Self::Vec4(v) => bytemuck::bytes_of(&[v.x, v.y, v.z, v.w]).to_vec(),
            Self::Int(v) => bytemuck::bytes_of(&v).to_vec(),
            Self::IVec2(v) => bytemuck::bytes_of(&[v.x, v.y]).to_vec(),
            Self::IVec3(v) => bytemuck::bytes_of(&[v.x, v.y, v.z]).to_vec(),
            Self::IVec4(v) => bytemuck::bytes_of(&[v.x, v.y, v.z, v.w]).to_vec(),
            Self::UInt(v) => bytemuck::bytes_of(&v).to_vec(),
            Self::UVec2(v) => bytemuck::bytes_of(&[v.x, v.y]).to_vec(),
            Self::UVec3(v) => bytemuck::bytes_of(&[v.x, v.y, v.z]).to_vec(),
            Self::UVec4(v) => bytemuck::bytes_of(&[v.x, v.y, v.z, v.w]).to_vec(),
        }
    }
}

/// A named, typed value
///
/// Serialized flat: `{"name": "speed", "type": "float", "value": 0.4}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    #[serde(flatten)]
    pub value: UniformValue,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: UniformValue) -> Self {
        Self { name: name.into(), value }
    }
}

/// Context input fed into the next evaluation
pub type ContextInput = NamedValue;

/// Fixed-function blend state of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Opaque,
    AlphaBlend,
    Additive,
    Multiplicative,
}

/// A span of original script source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    pub text: String,
    /// Line in the original script at which `text` begins
    pub start: u32,
}

/// A reusable source fragment that shader descriptions include by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub body: BlockBody,
}

/// A name and GLSL type pair, used for outputs and uniforms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameTypePair {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// Compiler description of one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderDesc {
    pub name: String,
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default)]
    pub includes: Vec<String>,
    /// Output slots; position defines the attachment index
    #[serde(default)]
    pub outs: Vec<NameTypePair>,
    #[serde(default)]
    pub uniforms: Vec<NameTypePair>,
    #[serde(default)]
    pub samplers: Vec<NameTypePair>,
    pub body: BlockBody,
}

/// Compiler-side error with its original source position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDiagnostic {
    pub line: u32,
    pub column: u32,
    pub desc: String,
}

/// Output of [`ScriptCompiler::compile`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResult {
    #[serde(default)]
    pub shader_descs: Vec<ShaderDesc>,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
    #[serde(default)]
    pub error: Option<ScriptDiagnostic>,
}

/// A request the script makes of the host for the current frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContextRequest {
    #[serde(rename = "FloatRequest")]
    Float { name: String, min_val: f32, max_val: f32, def_val: f32 },
    #[serde(rename = "IntRequest")]
    Int { name: String, min_val: i32, max_val: i32, def_val: i32 },
    #[serde(rename = "BoolRequest")]
    Bool { name: String, def_val: bool },
    #[serde(rename = "TextRequest")]
    Text { text: String },
    #[serde(rename = "CachedImageRequest")]
    CachedImage { id: u32, pixel_format: String, size: Vec2<u32> },
    #[serde(rename = "LoadedImageRequest")]
    LoadedImage { filename: String, id: u32 },
}

/// Image bound to a sampler slot of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerBinding {
    pub id: u32,
}

/// Image written through an output slot of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorAttachment {
    pub id: u32,
    #[serde(default)]
    pub mip_start: u32,
    #[serde(default)]
    pub mip_end: u32,
}

/// One runtime instruction to execute a named pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderInvocation {
    pub shader_name: String,
    /// Uniform values in the pass's declared uniform order; `null` entries are skipped
    #[serde(default)]
    pub uniforms: Vec<Option<NamedValue>>,
    #[serde(default)]
    pub image_sampler_bindings: Vec<SamplerBinding>,
    #[serde(default)]
    pub color_attachments: Vec<ColorAttachment>,
}

/// Output of [`ScriptCompiler::evaluate`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    #[serde(default)]
    pub context_requests: Vec<ContextRequest>,
    #[serde(default)]
    pub shader_invocations: Vec<ShaderInvocation>,
}

/// Failure reported by a script compiler
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The compiler could not produce any result
    #[error("script compiler produced no usable result: {0}")]
    Unavailable(String),
    /// The compiler produced output that could not be decoded
    #[error("malformed script compiler output: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The per-frame evaluation raised an error
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
}

/// Synchronous boundary to the external script compiler
///
/// A message-passing or worker-backed compiler can satisfy this trait by blocking
/// on its reply; the frame executor does not need to know.
pub trait ScriptCompiler {
    /// Compiles script source into pass descriptions
    fn compile(&mut self, source: &str) -> Result<LoadResult, ScriptError>;

    /// Evaluates one frame of the render graph
    fn evaluate(&mut self, inputs: &[ContextInput]) -> Result<FrameResult, ScriptError>;
}

/// Adapts a compiler that exchanges JSON strings
///
/// `load` receives script source and returns a JSON load result; `frame` receives
/// the JSON-encoded context input list and returns a JSON frame result. Both may
/// fail with a message, which is how a thrown exception crosses the boundary.
pub struct JsonScriptCompiler<L, F>
where
    L: FnMut(&str) -> Result<String, String>,
    F: FnMut(&str) -> Result<String, String>,
{
    load: L,
    frame: F,
}

impl<L, F> JsonScriptCompiler<L, F>
where
    L: FnMut(&str) -> Result<String, String>,
    F: FnMut(&str) -> Result<String, String>,
{
    pub fn new(load: L, frame: F) -> Self {
        Self { load, frame }
    }
}

impl<L, F> ScriptCompiler for JsonScriptCompiler<L, F>
where
    L: FnMut(&str) -> Result<String, String>,
    F: FnMut(&str) -> Result<String, String>,
{
    fn compile(&mut self, source: &str) -> Result<LoadResult, ScriptError> {
        let raw = (self.load)(source).map_err(ScriptError::Unavailable)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn evaluate(&mut self, inputs: &[ContextInput]) -> Result<FrameResult, ScriptError> {
        let encoded = serde_json::to_string(inputs)?;
        let raw = (self.frame)(&encoded).map_err(ScriptError::Evaluation)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_input_wire_format() {
        let input = NamedValue::new("@swapchain_size", UniformValue::UVec2(Vec2 { x: 640, y: 480 }));
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json, serde_json::json!({"name": "@swapchain_size", "type": "uvec2", "value": {"x": 640, "y": 480}}));

        let decoded: NamedValue = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_context_requests_decode() {
        let json = r#"[
            {"type": "FloatRequest", "name": "Speed", "min_val": 0.0, "max_val": 2.0, "def_val": 0.4},
            {"type": "IntRequest", "name": "Steps", "min_val": 1, "max_val": 8, "def_val": 4},
            {"type": "BoolRequest", "name": "Enabled", "def_val": false},
            {"type": "TextRequest", "text": "Frame index:3"},
            {"type": "CachedImageRequest", "id": 1, "pixel_format": "rgba16f", "size": {"x": 320, "y": 200}},
            {"type": "LoadedImageRequest", "filename": "noise.png", "id": 2}
        ]"#;
        let requests: Vec<ContextRequest> = serde_json::from_str(json).unwrap();

        assert_eq!(requests.len(), 6);
        assert_eq!(
            requests[0],
            ContextRequest::Float {
                name: "Speed".to_string(),
                min_val: 0.0,
                max_val: 2.0,
                def_val: 0.4
            }
        );
        assert!(matches!(requests[2], ContextRequest::Bool { def_val: false, .. }));
        assert_eq!(
            requests[4],
            ContextRequest::CachedImage {
                id: 1,
                pixel_format: "rgba16f".to_string(),
                size: Vec2 { x: 320, y: 200 }
            }
        );
    }

    #[test]
    fn test_shader_desc_decode_with_defaults() {
        let json = r#"{
            "name": "ColorPass",
            "blend_mode": "alphablend",
            "outs": [{"name": "out_color", "type": "vec4"}],
            "uniforms": [{"name": "size", "type": "ivec2"}],
            "body": {"text": "out_color = vec4(1.0);\n", "start": 12}
        }"#;
        let desc: ShaderDesc = serde_json::from_str(json).unwrap();

        assert_eq!(desc.blend_mode, BlendMode::AlphaBlend);
        assert!(desc.includes.is_empty());
        assert!(desc.samplers.is_empty());
        assert_eq!(desc.uniforms[0].ty, "ivec2");
        assert_eq!(desc.body.start, 12);
    }

    #[test]
    fn test_invocation_allows_null_uniforms() {
        let json = r#"{
            "shader_name": "Blit",
            "uniforms": [null, {"name": "gain", "type": "float", "value": 2.0}],
            "image_sampler_bindings": [{"id": 3}],
            "color_attachments": [{"id": 0, "mip_start": 0, "mip_end": 1}]
        }"#;
        let invocation: ShaderInvocation = serde_json::from_str(json).unwrap();

        assert_eq!(invocation.uniforms[0], None);
        assert_eq!(invocation.uniforms[1], Some(NamedValue::new("gain", UniformValue::Float(2.0))));
        assert_eq!(invocation.color_attachments[0].id, 0);
    }

    #[test]
    fn test_uniform_value_bytes() {
        assert_eq!(UniformValue::Float(1.0).to_bytes(), 1.0f32.to_le_bytes().to_vec());
        assert_eq!(UniformValue::IVec2(Vec2 { x: -1, y: 2 }).to_bytes().len(), 8);
        assert_eq!(UniformValue::UVec4(Vec4 { x: 1, y: 2, z: 3, w: 4 }).to_bytes().len(), 16);
        assert_eq!(UniformValue::Vec3(Vec3 { x: 0.0, y: 0.0, z: 0.0 }).glsl_type(), "vec3");
    }

    #[test]
    fn test_json_compiler_round_trip() {
        let mut seen_inputs = String::new();
        let mut compiler = JsonScriptCompiler::new(
            |_source| Ok(r#"{"shader_descs": [], "declarations": []}"#.to_string()),
            |inputs| {
                seen_inputs = inputs.to_string();
                Ok(r#"{"context_requests": [{"type": "TextRequest", "text": "hi"}], "shader_invocations": []}"#.to_string())
            },
        );

        let load = compiler.compile("void main() {}").unwrap();
        assert!(load.error.is_none());

        let frame = compiler.evaluate(&[NamedValue::new("@time", UniformValue::Float(16.0))]).unwrap();
        assert_eq!(frame.context_requests, vec![ContextRequest::Text { text: "hi".to_string() }]);
        drop(compiler);
        assert!(seen_inputs.contains("\"@time\""));
    }

    #[test]
    fn test_json_compiler_reports_failures() {
        let mut compiler = JsonScriptCompiler::new(|_| Err("wasm trap".to_string()), |_| Ok("not json".to_string()));

        assert!(matches!(compiler.compile(""), Err(ScriptError::Unavailable(_))));
        assert!(matches!(compiler.evaluate(&[]), Err(ScriptError::Malformed(_))));
    }
}
