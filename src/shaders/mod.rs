// SPDX-License-Identifier: GPL-3.0-only
//! Shader generators for image sampling
//!
//! Programs are assembled with a [`ShaderBuilder`] and handed back as a
//! [`ShaderProgram`]: WGSL source plus a binding table. The generators in this
//! module append one sampling pass each:
//!
//! - [`sample_polar`]: polar (EWA) resampling through a cached weight LUT
//! - [`deband`]: iterative debanding with optional grain
//!
//! [`reference`] holds CPU versions of both for verification.

mod builder;
mod deband;
mod polar;
mod program;
pub mod reference;
mod shader_object;

pub use builder::{
    BoundTexture, GLOBAL_ID, Ident, LOCAL_ID, OUTPUT_COLOR, OUTPUT_ID, Rect, ShaderBuilder,
    WORKGROUP_ID, wgsl_f32,
};
pub use deband::{DebandParams, deband, try_deband};
pub use polar::{
    PolarPlan, PolarTap, ResolvedSource, SamplePolarParams, SampleSource, TileFootprint,
    sample_polar, try_sample_polar, worst_case_distance,
};
pub use program::{Binding, BindingResource, ShaderProgram, ShaderStage, compute_dispatch_size};
pub use shader_object::{LUT_FORMAT_QUERY, LutState, ShaderObject};
