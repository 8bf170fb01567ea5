//! Pass registry
//!
//! Maps each script pass name to a compiled program and the binding metadata an
//! invocation of that pass needs. Passes are rebuilt only when their generated
//! fragment source changes, and a failed rebuild leaves the previous pass running.

use crate::device::GraphicsDevice;
use crate::program::{ProgramError, RasterProgramCompiler};
use crate::script::{BlendMode, Declaration, ShaderDesc};
use crate::source_assembler::SourceAssembler;
use std::collections::HashMap;

/// First line of every generated fragment shader
const FRAGMENT_HEADER: &str = "#version 450\n";

/// Descriptor set holding the uniform block and sampled images of a pass
const PASS_DESCRIPTOR_SET: u32 = 0;

/// A pass that failed to build, with its error mapped back to script source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Pass {pass} failed: {message}")]
pub struct PassFailure {
    pub pass: String,
    /// Original script line, 0 when the failure has no source attribution
    pub line: u32,
    pub message: String,
}

/// Why the registry could not be brought up to date
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Pass(#[from] PassFailure),
    /// The shared vertex stage failed to compile; no pass can be built on this device
    #[error(transparent)]
    Fatal(ProgramError),
}

/// A compiled pass and its binding metadata
pub struct Pass<D: GraphicsDevice> {
    /// Generated fragment source, used to detect changes
    pub source: String,
    pub program: D::Program,
    /// Attachment slot for each output, in output declaration order
    pub attachment_slots: Vec<u32>,
    /// Resolved uniform locations, in uniform declaration order
    pub uniform_locations: Vec<Option<D::Location>>,
    /// Declared GLSL type of each uniform, in uniform declaration order
    pub uniform_types: Vec<String>,
    /// Resolved sampler locations, in sampler declaration order
    pub sampler_locations: Vec<Option<D::Location>>,
    pub framebuffer: D::Framebuffer,
    pub blend: BlendMode,
}

impl<D: GraphicsDevice> Pass<D> {
    /// Number of color outputs the pass writes
    pub fn output_count(&self) -> usize {
        self.attachment_slots.len()
    }
}

/// Registry of compiled passes keyed by pass name
pub struct Framegraph<D: GraphicsDevice> {
    passes: HashMap<String, Pass<D>>,
    program_compiler: RasterProgramCompiler,
}

impl<D: GraphicsDevice> Default for Framegraph<D> {
    fn default() -> Self {
        Self::new(RasterProgramCompiler::default())
    }
}

impl<D: GraphicsDevice> Framegraph<D> {
    pub fn new(program_compiler: RasterProgramCompiler) -> Self {
        Self {
            passes: HashMap::new(),
            program_compiler,
        }
    }

    /// Brings the registry in line with a script compile result
    ///
    /// Passes are processed in order and the first failure stops the update; passes
    /// already processed keep their new state, the failing pass and every later one
    /// keep their previous state.
    ///
    /// # Arguments
    /// * `device` - Device owning the programs and framebuffers
    /// * `declarations` - Shared source fragments passes may include
    /// * `shader_descs` - Pass descriptions
    ///
    /// # Returns
    /// `Ok(())` when every pass is up to date, or the first failure
    pub fn update_from_compile_result(&mut self, device: &mut D, declarations: &[Declaration], shader_descs: &[ShaderDesc]) -> Result<(), RegistryError> {
        for desc in shader_descs {
            let assembler = assemble_fragment_source(declarations, desc);

            if self.passes.get(&desc.name).is_some_and(|pass| pass.source == assembler.text()) {
                tracing::trace!(pass = %desc.name, "pass source unchanged");
                continue;
            }

            let program = self.program_compiler.compile(device, assembler.text()).map_err(|err| match err {
                ProgramError::Fatal(_) => {
                    tracing::error!(pass = %desc.name, error = %err, "no pass can be built on this device");
                    RegistryError::Fatal(err)
                }
                ProgramError::Failed { line, message } => RegistryError::Pass(PassFailure {
                    pass: desc.name.clone(),
                    line: assembler.map_generated_line_to_source(line).unwrap_or(0),
                    message,
                }),
            })?;

            let framebuffer = match device.create_framebuffer() {
                Ok(framebuffer) => framebuffer,
                Err(err) => {
                    device.delete_program(program);
                    return Err(PassFailure {
                        pass: desc.name.clone(),
                        line: 0,
                        message: err.to_string(),
                    }
                    .into());
                }
            };

            let uniform_locations = desc.uniforms.iter().map(|uniform| device.uniform_location(&program, &uniform.name)).collect();
            let sampler_locations = desc.samplers.iter().map(|sampler| device.uniform_location(&program, &sampler.name)).collect();

            let pass = Pass {
                source: assembler.into_text(),
                program,
                attachment_slots: (0..desc.outs.len() as u32).collect(),
                uniform_locations,
                uniform_types: desc.uniforms.iter().map(|uniform| uniform.ty.clone()).collect(),
                sampler_locations,
                framebuffer,
                blend: desc.blend_mode,
            };

            if let Some(old) = self.passes.insert(desc.name.clone(), pass) {
                device.delete_program(old.program);
                device.delete_framebuffer(old.framebuffer);
                tracing::debug!(pass = %desc.name, "recompiled pass");
            } else {
                tracing::debug!(pass = %desc.name, "compiled pass");
            }
        }

        Ok(())
    }

    /// Looks up a pass by name
    pub fn get(&self, name: &str) -> Option<&Pass<D>> {
        self.passes.get(name)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Releases every pass
    pub fn clear(&mut self, device: &mut D) {
        for (_, pass) in self.passes.drain() {
            device.delete_program(pass.program);
            device.delete_framebuffer(pass.framebuffer);
        }
    }
}

/// Assembles the complete fragment shader of a pass
///
/// Layout: version header, included declaration bodies in include order, interface
/// declarations, `main` opening, pass body, `main` closing. Uniforms live in one
/// std140 block; each sampler is a separate texture/sampler pair combined under the
/// sampler's own name.
pub fn assemble_fragment_source(declarations: &[Declaration], desc: &ShaderDesc) -> SourceAssembler {
    let mut assembler = SourceAssembler::new();
    assembler.add_synthetic_block(FRAGMENT_HEADER);

    for include in &desc.includes {
        match declarations.iter().find(|decl| &decl.name == include) {
            Some(decl) => {
                assembler.add_source_block(&decl.body.text, decl.body.start);
                if !decl.body.text.ends_with('\n') {
                    assembler.add_synthetic_block("\n");
                }
            }
            None => tracing::warn!(pass = %desc.name, include = %include, "included declaration not found"),
        }
    }

    let mut interface = String::new();
    for (index, out) in desc.outs.iter().enumerate() {
        interface.push_str(&format!("layout(location = {index}) out {} {};\n", out.ty, out.name));
    }
    if !desc.uniforms.is_empty() {
        interface.push_str(&format!("layout(set = {PASS_DESCRIPTOR_SET}, binding = 0, std140) uniform PassUniforms {{\n"));
        for uniform in &desc.uniforms {
            interface.push_str(&format!("    {} {};\n", uniform.ty, uniform.name));
        }
        interface.push_str("};\n");
    }
    for (index, sampler) in desc.samplers.iter().enumerate() {
        let (texture_binding, sampler_binding) = sampler_bindings(index as u32);
        let name = &sampler.name;
        interface.push_str(&format!("layout(set = {PASS_DESCRIPTOR_SET}, binding = {texture_binding}) uniform texture2D {name}_texture;\n"));
        interface.push_str(&format!("layout(set = {PASS_DESCRIPTOR_SET}, binding = {sampler_binding}) uniform sampler {name}_sampler;\n"));
        interface.push_str(&format!("#define {name} sampler2D({name}_texture, {name}_sampler)\n"));
    }
    assembler.add_synthetic_block(&interface);

    assembler.add_synthetic_block("void main() {\n");
    assembler.add_source_block(&desc.body.text, desc.body.start);
    if !desc.body.text.ends_with('\n') {
        assembler.add_synthetic_block("\n");
    }
    assembler.add_synthetic_block("}\n");
    assembler
}

/// Texture and sampler binding slots of the sampler at `index`
pub fn sampler_bindings(index: u32) -> (u32, u32) {
    (1 + 2 * index, 2 + 2 * index)
}

/// Suffix of the texture half of a declared sampler
pub const SAMPLER_TEXTURE_SUFFIX: &str = "_texture";
