// SPDX-License-Identifier: GPL-3.0-only

//! In-memory device used for offline program generation and tests

use super::{
    Format, FormatCaps, FormatKind, FormatQuery, GpuCaps, KNOWN_FORMATS, ResourceStore,
    Texture, TextureDimension, TextureId, TextureParams,
};
use crate::errors::{SamplingError, SamplingResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Limits reported by a [`HeadlessGpu`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuLimits {
    pub max_texture_dim_1d: u32,
    pub max_texture_dim_2d: u32,
    /// Whether compute dispatch is available
    pub compute: bool,
    /// Workgroup shared memory budget in bytes
    pub max_shared_memory: u32,
    /// Whether 32-bit float formats support linear filtering
    pub float32_filterable: bool,
}

impl Default for GpuLimits {
    fn default() -> Self {
        // wgpu's default limits, with the float32 filtering feature enabled
        Self {
            max_texture_dim_1d: 8192,
            max_texture_dim_2d: 8192,
            compute: true,
            max_shared_memory: 16384,
            float32_filterable: true,
        }
    }
}

#[derive(Default)]
struct StoreState {
    next_id: u64,
    created: u64,
    fail_allocations: bool,
    /// Contents are only kept for textures created with initial data
    textures: HashMap<TextureId, (Texture, Option<Vec<u8>>)>,
}

/// A device that keeps textures in host memory
pub struct HeadlessGpu {
    limits: GpuLimits,
    formats: Vec<Format>,
    state: Mutex<StoreState>,
}

impl HeadlessGpu {
    pub fn new(limits: GpuLimits) -> Self {
        let formats = KNOWN_FORMATS
            .iter()
            .map(|fmt| fmt.with_caps(Self::format_caps(fmt, &limits)))
            .collect();

        Self {
            limits,
            formats,
            state: Mutex::new(StoreState::default()),
        }
    }

    fn format_caps(fmt: &Format, limits: &GpuLimits) -> FormatCaps {
        let mut caps = FormatCaps::SAMPLEABLE;
        if fmt.kind == FormatKind::Unorm || fmt.bit_depth < 32 || limits.float32_filterable {
            caps = caps | FormatCaps::LINEAR;
        }
        if fmt.components == 4 || fmt.bit_depth == 32 {
            caps = caps | FormatCaps::STORABLE;
        }
        caps
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn limits(&self) -> &GpuLimits {
        &self.limits
    }

    /// All formats with their capabilities on this device
    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    /// Make every following allocation fail until reset
    pub fn set_fail_allocations(&self, fail: bool) {
        self.state().fail_allocations = fail;
    }

    /// Number of textures successfully created over the device's lifetime
    pub fn textures_created(&self) -> u64 {
        self.state().created
    }

    /// Number of textures created and not yet destroyed
    pub fn live_textures(&self) -> usize {
        self.state().textures.len()
    }

    /// Copy of a live texture's contents, zeroed if it was never written
    pub fn texture_data(&self, id: TextureId) -> Option<Vec<u8>> {
        self.state().textures.get(&id).map(|(texture, data)| {
            data.clone().unwrap_or_else(|| {
                vec![0; texture.width as usize * texture.height as usize * texture.format.texel_size()]
            })
        })
    }

    /// Create a zero-initialized 2D texture, e.g. a source image for sampling
    pub fn create_image(&self, width: u32, height: u32, format_name: &str) -> SamplingResult<Texture> {
        let format = self
            .formats
            .iter()
            .find(|fmt| fmt.name == format_name)
            .copied()
            .ok_or_else(|| SamplingError::Format(format!("unknown format {}", format_name)))?;

        self.create_texture(&TextureParams {
            width,
            height,
            dimension: TextureDimension::D2,
            format,
            sampleable: true,
            sample_mode: super::SampleMode::Linear,
            address_mode: super::AddressMode::Clamp,
            initial_data: None,
        })
    }
}

impl Default for HeadlessGpu {
    fn default() -> Self {
        Self::new(GpuLimits::default())
    }
}

impl GpuCaps for HeadlessGpu {
    fn max_1d_texture_dim(&self) -> u32 {
        self.limits.max_texture_dim_1d
    }

    fn compute_available(&self) -> bool {
        self.limits.compute
    }

    fn shared_memory_budget(&self) -> u32 {
        if self.limits.compute {
            self.limits.max_shared_memory
        } else {
            0
        }
    }

    fn find_format(&self, query: &FormatQuery) -> Option<Format> {
        self.formats.iter().find(|fmt| fmt.matches(query)).copied()
    }
}

impl ResourceStore for HeadlessGpu {
    fn create_texture(&self, params: &TextureParams<'_>) -> SamplingResult<Texture> {
        let max_dim = match params.dimension {
            TextureDimension::D1 => self.limits.max_texture_dim_1d,
            TextureDimension::D2 => self.limits.max_texture_dim_2d,
        };
        if params.width == 0 || params.height == 0 {
            return Err(SamplingError::Resource("texture has zero size".to_string()));
        }
        if params.width > max_dim || params.height > max_dim {
            return Err(SamplingError::Resource(format!(
                "texture size {}x{} exceeds device limit {}",
                params.width, params.height, max_dim
            )));
        }
        if params.dimension == TextureDimension::D1 && params.height != 1 {
            return Err(SamplingError::Resource(
                "1D textures must have a height of 1".to_string(),
            ));
        }

        let size = params.data_size();
        let data = match params.initial_data {
            Some(data) if data.len() != size => {
                return Err(SamplingError::Resource(format!(
                    "initial data is {} bytes, expected {}",
                    data.len(),
                    size
                )));
            }
            Some(data) => Some(data.to_vec()),
            None => None,
        };

        let mut state = self.state();
        if state.fail_allocations {
            return Err(SamplingError::Resource(
                "allocation failed (injected)".to_string(),
            ));
        }

        state.next_id += 1;
        state.created += 1;
        let texture = Texture {
            id: TextureId(state.next_id),
            width: params.width,
            height: params.height,
            dimension: params.dimension,
            format: params.format,
            sample_mode: params.sample_mode,
            address_mode: params.address_mode,
        };
        state.textures.insert(texture.id, (texture.clone(), data));

        debug!(
            id = texture.id.0,
            width = texture.width,
            height = texture.height,
            format = texture.format.name,
            "Headless texture created"
        );
        Ok(texture)
    }

    fn destroy_texture(&self, texture: Texture) {
        if self.state().textures.remove(&texture.id).is_some() {
            debug!(id = texture.id.0, "Headless texture destroyed");
        }
    }
}
