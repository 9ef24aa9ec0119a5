// SPDX-License-Identifier: GPL-3.0-only

//! GPU shader generators for polar (EWA) resampling and debanding
//!
//! This library emits WGSL programs that sample a source texture, together
//! with the binding table needed to run them, and manages the filter LUT the
//! polar sampler depends on.
//!
//! # Architecture
//!
//! - [`gpu`]: capability query and texture store traits, with a headless and a wgpu device
//! - [`filters`]: radial filter kernels and LUT weight generation
//! - [`shaders`]: the program builder, the sampling passes and CPU references
//! - [`config`]: JSON configuration for the command line tool
//!
//! # Example
//!
//! ```
//! use shader_sampling::filters::FilterConfig;
//! use shader_sampling::gpu::HeadlessGpu;
//! use shader_sampling::shaders::{SamplePolarParams, SampleSource, ShaderBuilder, ShaderObject, sample_polar};
//!
//! let gpu = HeadlessGpu::default();
//! let source = gpu.create_image(1920, 1080, "rgba16float").unwrap();
//! let mut lut = ShaderObject::new();
//!
//! let mut sh = ShaderBuilder::new(&gpu);
//! let src = SampleSource::new(&source).with_output_size(1280, 720);
//! assert!(sample_polar(&mut sh, &src, SamplePolarParams::new(FilterConfig::ewa_lanczos(), &mut lut)));
//! let program = sh.finish().unwrap();
//! assert!(program.source.contains("fn main"));
//! lut.destroy(&gpu);
//! ```

pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod gpu;
pub mod shaders;

// Re-export commonly used types
pub use config::Config;
pub use errors::{SamplingError, SamplingResult};
pub use shaders::{ShaderBuilder, ShaderObject, ShaderProgram};
