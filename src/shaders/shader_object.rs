// SPDX-License-Identifier: GPL-3.0-only

//! Caller-owned LUT cache slot
//!
//! A [`ShaderObject`] pairs a generated [`Filter`] with the 1D texture holding
//! its weights. The caller keeps the object across program builds; the polar
//! sampler only regenerates it when the request no longer matches.
//!
//! States:
//! - `Empty`: no filter, no texture
//! - `Valid`: filter and texture match the request
//! - `Stale`: filter and texture present, but for a different request
//!
//! Regeneration releases the old pair before allocating the new one, so a
//! failure part-way leaves the object `Empty`.

use crate::constants::FILTER_SCALE_TOLERANCE;
use crate::errors::{SamplingError, SamplingResult};
use crate::filters::{Filter, FilterGenerator, FilterParams};
use crate::gpu::{
    AddressMode, FormatCaps, FormatKind, FormatQuery, Gpu, ResourceStore, SampleMode, Texture,
    TextureDimension, TextureParams,
};
use tracing::{debug, info, warn};

/// Cache state relative to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutState {
    Empty,
    Valid,
    Stale,
}

/// Format the LUT is stored in: one linearly filterable 32-bit float channel
pub const LUT_FORMAT_QUERY: FormatQuery = FormatQuery {
    kind: FormatKind::Float,
    components: 1,
    bit_depth: 32,
    caps: FormatCaps::SAMPLEABLE.union(FormatCaps::LINEAR),
};

/// A cached filter and its backing texture
#[derive(Debug, Default)]
pub struct ShaderObject {
    filter: Option<Filter>,
    texture: Option<Texture>,
    generation: u64,
}

impl ShaderObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn texture(&self) -> Option<&Texture> {
        self.texture.as_ref()
    }

    /// Number of successful regenerations so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.texture.is_none()
    }

    /// Whether the cached filter can serve `request`
    pub fn is_compatible(&self, request: &FilterParams) -> bool {
        let Some(filter) = &self.filter else {
            return false;
        };
        filter.lut_entries() == request.lut_entries
            && (filter.filter_scale() - request.filter_scale).abs() <= FILTER_SCALE_TOLERANCE
            && *filter.config() == request.config
    }

    pub fn state(&self, request: &FilterParams) -> LutState {
        if self.texture.is_none() || self.filter.is_none() {
            LutState::Empty
        } else if self.is_compatible(request) {
            LutState::Valid
        } else {
            LutState::Stale
        }
    }

    /// Make the object valid for `request`, regenerating if needed.
    ///
    /// Returns whether a regeneration happened. Capability and format errors
    /// leave the object untouched; later failures leave it empty.
    pub fn ensure(
        &mut self,
        gpu: &dyn Gpu,
        generator: &dyn FilterGenerator,
        request: &FilterParams,
    ) -> SamplingResult<bool> {
        let limit = gpu.max_1d_texture_dim();
        if request.lut_entries > limit {
            return Err(SamplingError::Capability {
                requested: request.lut_entries,
                limit,
            });
        }

        if self.state(request) == LutState::Valid {
            return Ok(false);
        }

        let format = gpu.find_format(&LUT_FORMAT_QUERY).ok_or_else(|| {
            SamplingError::Format("found no matching texture format for polar LUT".to_string())
        })?;

        info!(
            lut_entries = request.lut_entries,
            filter_scale = request.filter_scale,
            "Recreating polar filter LUT"
        );
        self.release(gpu);

        let filter = generator
            .generate(request)
            .ok_or_else(|| SamplingError::Resource("failed initializing polar filter".to_string()))?;
        check_filter(&filter, request)?;

        let texture = gpu
            .create_texture(&TextureParams {
                width: request.lut_entries,
                height: 1,
                dimension: TextureDimension::D1,
                format,
                sampleable: true,
                sample_mode: SampleMode::Linear,
                address_mode: AddressMode::Clamp,
                initial_data: Some(bytemuck::cast_slice(&filter.weights)),
            })
            .map_err(|e| SamplingError::Resource(format!("failed creating polar LUT texture: {}", e)))?;

        debug!(
            texture = texture.id.0,
            radius = filter.radius,
            radius_cutoff = filter.radius_cutoff,
            "Polar LUT ready"
        );
        self.filter = Some(filter);
        self.texture = Some(texture);
        self.generation += 1;
        Ok(true)
    }

    fn release<S: ResourceStore + ?Sized>(&mut self, store: &S) {
        self.filter = None;
        if let Some(texture) = self.texture.take() {
            store.destroy_texture(texture);
        }
    }

    /// Release the filter and texture. The object can be reused afterwards.
    pub fn destroy<S: ResourceStore + ?Sized>(&mut self, store: &S) {
        self.release(store);
    }
}

/// A generated filter must be uploadable and emit finite WGSL literals
fn check_filter(filter: &Filter, request: &FilterParams) -> SamplingResult<()> {
    if !filter.radius.is_finite() || filter.radius <= 0.0 {
        return Err(SamplingError::Resource(format!(
            "polar filter has invalid radius {}",
            filter.radius
        )));
    }
    if !filter.radius_cutoff.is_finite() || filter.radius_cutoff < 0.0 {
        return Err(SamplingError::Resource(format!(
            "polar filter has invalid cutoff radius {}",
            filter.radius_cutoff
        )));
    }
    if filter.weights.len() != request.lut_entries as usize {
        return Err(SamplingError::Resource(format!(
            "polar filter has {} weights, expected {}",
            filter.weights.len(),
            request.lut_entries
        )));
    }
    if filter.weights.iter().any(|w| !w.is_finite()) {
        return Err(SamplingError::Resource(
            "polar filter has non-finite weights".to_string(),
        ));
    }
    Ok(())
}

impl Drop for ShaderObject {
    fn drop(&mut self) {
        if let Some(texture) = &self.texture {
            warn!(
                texture = texture.id.0,
                "ShaderObject dropped without destroy, LUT texture leaked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{FilterConfig, RadialFilterGenerator};
    use crate::gpu::{GpuLimits, HeadlessGpu};

    fn request(scale: f32) -> FilterParams {
        FilterParams {
            config: FilterConfig::ewa_lanczos(),
            lut_entries: 64,
            filter_scale: scale,
            cutoff: 0.001,
        }
    }

    struct FailingGenerator;

    impl FilterGenerator for FailingGenerator {
        fn generate(&self, _params: &FilterParams) -> Option<Filter> {
            None
        }
    }

    /// Produces a filter with the given radius and a constant weight
    struct FixedGenerator {
        radius: f32,
        weight: f32,
    }

    impl FilterGenerator for FixedGenerator {
        fn generate(&self, params: &FilterParams) -> Option<Filter> {
            Some(Filter {
                params: *params,
                weights: vec![self.weight; params.lut_entries as usize],
                radius: self.radius,
                radius_cutoff: self.radius,
            })
        }
    }

    #[test]
    fn test_lifecycle() {
        let gpu = HeadlessGpu::default();
        let mut obj = ShaderObject::new();
        assert_eq!(obj.state(&request(1.0)), LutState::Empty);

        assert!(obj.ensure(&gpu, &RadialFilterGenerator, &request(1.0)).unwrap());
        assert_eq!(obj.state(&request(1.0)), LutState::Valid);
        assert_eq!(obj.generation(), 1);

        // Within tolerance
        assert!(!obj.ensure(&gpu, &RadialFilterGenerator, &request(1.0005)).unwrap());
        assert_eq!(obj.state(&request(2.0)), LutState::Stale);

        assert!(obj.ensure(&gpu, &RadialFilterGenerator, &request(2.0)).unwrap());
        assert_eq!(obj.generation(), 2);
        assert_eq!(gpu.live_textures(), 1);

        obj.destroy(&gpu);
        assert!(obj.is_empty());
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn test_lut_texture_holds_weights() {
        let gpu = HeadlessGpu::default();
        let mut obj = ShaderObject::new();
        obj.ensure(&gpu, &RadialFilterGenerator, &request(1.0)).unwrap();

        let texture = obj.texture().unwrap();
        let data = gpu.texture_data(texture.id).unwrap();
        let weights: Vec<f32> = bytemuck::pod_collect_to_vec(&data);
        assert_eq!(weights, obj.filter().unwrap().weights);
        assert_eq!(texture.dimension, TextureDimension::D1);
        obj.destroy(&gpu);
    }

    #[test]
    fn test_format_failure_leaves_slot_unchanged() {
        let gpu = HeadlessGpu::default();
        let mut obj = ShaderObject::new();
        obj.ensure(&gpu, &RadialFilterGenerator, &request(1.0)).unwrap();

        let no_float_filtering = HeadlessGpu::new(GpuLimits {
            float32_filterable: false,
            ..Default::default()
        });
        let err = obj
            .ensure(&no_float_filtering, &RadialFilterGenerator, &request(2.0))
            .unwrap_err();
        assert!(matches!(err, SamplingError::Format(_)));
        assert_eq!(obj.generation(), 1);
        assert!(obj.texture().is_some());
        obj.destroy(&gpu);
    }

    #[test]
    fn test_failed_generation_leaves_slot_empty() {
        let gpu = HeadlessGpu::default();
        let mut obj = ShaderObject::new();
        obj.ensure(&gpu, &RadialFilterGenerator, &request(1.0)).unwrap();

        let err = obj.ensure(&gpu, &FailingGenerator, &request(2.0)).unwrap_err();
        assert!(matches!(err, SamplingError::Resource(_)));
        assert!(obj.is_empty());
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn test_failed_allocation_leaves_slot_empty() {
        let gpu = HeadlessGpu::default();
        let mut obj = ShaderObject::new();
        obj.ensure(&gpu, &RadialFilterGenerator, &request(1.0)).unwrap();

        gpu.set_fail_allocations(true);
        let err = obj.ensure(&gpu, &RadialFilterGenerator, &request(2.0)).unwrap_err();
        assert!(matches!(err, SamplingError::Resource(_)));
        assert!(obj.is_empty());
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn test_capability_error_before_anything_else() {
        let gpu = HeadlessGpu::new(GpuLimits {
            max_texture_dim_1d: 32,
            ..Default::default()
        });
        let mut obj = ShaderObject::new();
        let err = obj
            .ensure(&gpu, &RadialFilterGenerator, &request(1.0))
            .unwrap_err();
        assert_eq!(
            err,
            SamplingError::Capability {
                requested: 64,
                limit: 32
            }
        );
        assert_eq!(gpu.textures_created(), 0);
        assert!(obj.is_empty());
    }

    #[test]
    fn test_unusable_filters_are_rejected() {
        let gpu = HeadlessGpu::default();
        let generators = [
            FixedGenerator { radius: 0.0, weight: 1.0 },
            FixedGenerator { radius: -2.0, weight: 1.0 },
            FixedGenerator { radius: f32::INFINITY, weight: 1.0 },
            FixedGenerator { radius: f32::NAN, weight: 1.0 },
            FixedGenerator { radius: 2.0, weight: f32::NAN },
        ];
        for generator in &generators {
            let mut obj = ShaderObject::new();
            let err = obj.ensure(&gpu, generator, &request(1.0)).unwrap_err();
            assert!(matches!(err, SamplingError::Resource(_)));
            assert!(obj.is_empty());
            assert_eq!(obj.generation(), 0);
        }
        assert_eq!(gpu.textures_created(), 0);

        let mut obj = ShaderObject::new();
        let generator = FixedGenerator { radius: 2.0, weight: 1.0 };
        assert!(obj.ensure(&gpu, &generator, &request(1.0)).unwrap());
        obj.destroy(&gpu);
    }
}
