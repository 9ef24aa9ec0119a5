// SPDX-License-Identifier: GPL-3.0-only

//! The finished artifact handed to the caller: WGSL source plus binding table

use super::builder::Ident;
use crate::gpu::{AddressMode, SampleMode, TextureId};

/// Which kind of entry point the program has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// One independent invocation per output pixel, writing `@location(0)`
    Fragment,
    /// Cooperative workgroups writing to a storage image
    Compute { workgroup_size: [u32; 2] },
}

/// What a binding slot must be populated with
#[derive(Debug, Clone, PartialEq)]
pub enum BindingResource {
    /// Sampled 1D or 2D texture
    Texture(TextureId),
    /// Sampler matching the texture bound before it
    Sampler {
        sample_mode: SampleMode,
        address_mode: AddressMode,
    },
    /// Uniform buffer holding a single f32
    UniformF32(f32),
    /// Write-only storage image the compute kernel stores its result into
    OutputImage { format: &'static str },
}

/// One `@group(g) @binding(b)` slot of a program
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: Ident,
    pub group: u32,
    pub binding: u32,
    pub resource: BindingResource,
}

/// A complete generated program
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    /// WGSL module source
    pub source: String,
    /// Resources in binding order. Every texture listed here must outlive
    /// the program's execution.
    pub bindings: Vec<Binding>,
    pub stage: ShaderStage,
    /// Output width and height in pixels
    pub output_size: (u32, u32),
}

impl ShaderProgram {
    /// Name of the entry point in `source`
    pub const ENTRY_POINT: &'static str = "main";

    /// Workgroups to dispatch for a compute program
    pub fn dispatch_size(&self) -> Option<[u32; 2]> {
        match self.stage {
            ShaderStage::Compute { workgroup_size } => Some([
                compute_dispatch_size(self.output_size.0, workgroup_size[0]),
                compute_dispatch_size(self.output_size.1, workgroup_size[1]),
            ]),
            ShaderStage::Fragment => None,
        }
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.name.as_str() == name)
    }

    /// Textures the program reads from
    pub fn textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.bindings.iter().filter_map(|b| match b.resource {
            BindingResource::Texture(id) => Some(id),
            _ => None,
        })
    }
}

/// Calculate compute shader dispatch size (workgroups needed)
///
/// Given a dimension and workgroup size, returns the number of workgroups
/// needed to cover the entire dimension.
#[inline]
pub fn compute_dispatch_size(dimension: u32, workgroup_size: u32) -> u32 {
    dimension.div_ceil(workgroup_size)
}
