// SPDX-License-Identifier: GPL-3.0-only

//! Device-facing interfaces used by the shader generators.
//!
//! The generators never talk to a graphics API directly. They ask a
//! [`GpuCaps`] for limits and formats and a [`ResourceStore`] for textures.
//! Two implementations are provided:
//!
//! - [`HeadlessGpu`]: in-memory device with configurable limits, used for
//!   offline program generation and tests
//! - [`WgpuGpu`]: wraps a wgpu adapter/device/queue

mod headless;
mod wgpu_backend;

pub use headless::{GpuLimits, HeadlessGpu};
pub use wgpu_backend::{WgpuGpu, create_compute_device};

use crate::errors::SamplingResult;
use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Opaque texture identifier, unique per resource store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Numeric interpretation of a texture format's components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatKind {
    /// Unsigned normalized integers
    Unorm,
    /// Floating point
    Float,
}

/// Capability flags of a texture format on a given device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatCaps(u8);

impl FormatCaps {
    /// Can be bound as a sampled texture
    pub const SAMPLEABLE: Self = Self(1 << 0);
    /// Supports linear filtering when sampled
    pub const LINEAR: Self = Self(1 << 1);
    /// Can be bound as a storage image
    pub const STORABLE: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FormatCaps {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// A texture format as reported by the capability query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// WGSL / wgpu spelling, e.g. `r32float`
    pub name: &'static str,
    pub kind: FormatKind,
    pub components: u8,
    /// Bits per component
    pub bit_depth: u8,
    pub caps: FormatCaps,
}

impl Format {
    pub const fn new(name: &'static str, kind: FormatKind, components: u8, bit_depth: u8) -> Self {
        Self {
            name,
            kind,
            components,
            bit_depth,
            caps: FormatCaps::empty(),
        }
    }

    pub const fn with_caps(self, caps: FormatCaps) -> Self {
        Self { caps, ..self }
    }

    /// Size of one texel in bytes
    pub fn texel_size(&self) -> usize {
        self.components as usize * self.bit_depth as usize / 8
    }

    /// Whether this format satisfies a query
    pub fn matches(&self, query: &FormatQuery) -> bool {
        self.kind == query.kind
            && self.components == query.components
            && self.bit_depth == query.bit_depth
            && self.caps.contains(query.caps)
    }
}

/// Formats both built-in devices know about. Capabilities are filled in per device.
pub const KNOWN_FORMATS: [Format; 6] = [
    Format::new("r8unorm", FormatKind::Unorm, 1, 8),
    Format::new("rgba8unorm", FormatKind::Unorm, 4, 8),
    Format::new("r16float", FormatKind::Float, 1, 16),
    Format::new("rgba16float", FormatKind::Float, 4, 16),
    Format::new("r32float", FormatKind::Float, 1, 32),
    Format::new("rgba32float", FormatKind::Float, 4, 32),
];

/// Parameters for [`GpuCaps::find_format`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatQuery {
    pub kind: FormatKind,
    pub components: u8,
    pub bit_depth: u8,
    /// Capabilities the format must have
    pub caps: FormatCaps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextureDimension {
    D1,
    D2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleMode {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AddressMode {
    #[default]
    Clamp,
    Repeat,
    Mirror,
}

/// Texture creation request
#[derive(Debug, Clone)]
pub struct TextureParams<'a> {
    pub width: u32,
    /// Always 1 for 1D textures
    pub height: u32,
    pub dimension: TextureDimension,
    pub format: Format,
    pub sampleable: bool,
    pub sample_mode: SampleMode,
    pub address_mode: AddressMode,
    /// Tightly packed texel data, `width * height * texel_size` bytes
    pub initial_data: Option<&'a [u8]>,
}

impl TextureParams<'_> {
    /// Expected length of `initial_data` in bytes
    pub fn data_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.texel_size()
    }
}

/// Handle to a texture owned by a [`ResourceStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub format: Format,
    pub sample_mode: SampleMode,
    pub address_mode: AddressMode,
}

impl Texture {
    /// Number of components stored per texel
    pub fn components(&self) -> u32 {
        self.format.components as u32
    }
}

/// Device limits and format support
pub trait GpuCaps {
    /// Largest width a 1D texture may have
    fn max_1d_texture_dim(&self) -> u32;

    /// Whether compute dispatch is supported
    fn compute_available(&self) -> bool;

    /// Workgroup shared memory available to one compute group, in bytes
    fn shared_memory_budget(&self) -> u32;

    /// Find a format matching the query, if the device has one
    fn find_format(&self, query: &FormatQuery) -> Option<Format>;
}

/// Texture allocation
pub trait ResourceStore {
    /// Create a texture. Fails with [`crate::SamplingError::Resource`].
    fn create_texture(&self, params: &TextureParams<'_>) -> SamplingResult<Texture>;

    /// Release a texture. Unknown handles are ignored.
    fn destroy_texture(&self, texture: Texture);
}

/// A device context: capability query plus resource store
pub trait Gpu: GpuCaps + ResourceStore {}

impl<T: GpuCaps + ResourceStore + ?Sized> Gpu for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_caps_contains() {
        let caps = FormatCaps::SAMPLEABLE | FormatCaps::LINEAR;
        assert!(caps.contains(FormatCaps::SAMPLEABLE));
        assert!(caps.contains(FormatCaps::SAMPLEABLE | FormatCaps::LINEAR));
        assert!(!caps.contains(FormatCaps::STORABLE));
        assert!(caps.contains(FormatCaps::empty()));
    }

    #[test]
    fn test_format_matches_query() {
        let fmt = Format::new("r32float", FormatKind::Float, 1, 32)
            .with_caps(FormatCaps::SAMPLEABLE | FormatCaps::LINEAR);
        let query = FormatQuery {
            kind: FormatKind::Float,
            components: 1,
            bit_depth: 32,
            caps: FormatCaps::SAMPLEABLE | FormatCaps::LINEAR,
        };
        assert!(fmt.matches(&query));
        assert!(!fmt.matches(&FormatQuery {
            bit_depth: 16,
            ..query
        }));
        assert_eq!(fmt.texel_size(), 4);
    }
}
