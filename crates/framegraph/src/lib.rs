//! Frame-graph execution engine for live shader authoring
//!
//! A user script describes fragment passes and, every frame, the images, controls and
//! pass invocations it needs. This crate compiles the passes into GPU programs, keeps
//! transient images alive across frames, reconciles the requested controls with a host
//! panel and runs the invocations against a [`GraphicsDevice`].
//!
//! [`FrameExecutor`] ties the pieces together; [`WgpuDevice`] is the wgpu backend.

pub mod clock;
pub mod controls;
pub mod device;
pub mod executor;
pub mod framegraph;
pub mod image_cache;
pub mod program;
pub mod script;
pub mod session;
pub mod source_assembler;
pub mod wgpu_device;

#[cfg(test)]
mod test_support;

pub use controls::{ControlHost, ControlReconciler, ControlSpec, HeadlessControls};
pub use device::{DeviceError, Extent, GraphicsDevice, PixelFormat};
pub use executor::{BuildError, ExecutorConfig, FrameExecutor, FrameOutcome};
pub use framegraph::{Framegraph, PassFailure, RegistryError};
pub use image_cache::ImageCache;
pub use program::{ProgramError, RasterProgramCompiler};
pub use script::{FrameResult, JsonScriptCompiler, LoadResult, ScriptCompiler, ScriptError};
pub use source_assembler::SourceAssembler;
pub use wgpu_device::{SURFACE_FORMAT, WgpuDevice, WgpuImage, texture_format};
