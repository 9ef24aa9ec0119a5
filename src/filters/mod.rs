// SPDX-License-Identifier: GPL-3.0-only

//! Filter configurations and LUT weight generation
//!
//! A polar filter is fully described by a 1D weight function of distance.
//! [`FilterGenerator`] turns a [`FilterConfig`] into a discretized [`Filter`]
//! that the polar sampler uploads as a 1D texture.

mod kernels;

pub use kernels::{JINC_ZERO_1, JINC_ZERO_3, KernelFunction, SPHINX_ZERO_1};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kernel, window and shaping parameters of a filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub kernel: KernelFunction,
    /// Optional window, stretched over the kernel's support
    pub window: Option<KernelFunction>,
    /// Widens (>1) or sharpens (<1) the kernel. 0 means 1.
    #[serde(default)]
    pub blur: f32,
    /// Attenuation of negative lobes, 0 (none) to 1 (removed)
    #[serde(default)]
    pub clamp: f32,
    /// Whether this is a radially symmetric (EWA) filter
    pub polar: bool,
}

impl FilterConfig {
    /// Jinc windowed by jinc, three lobes
    pub fn ewa_lanczos() -> Self {
        Self {
            kernel: KernelFunction::Jinc {
                radius: JINC_ZERO_3,
            },
            window: Some(KernelFunction::Jinc {
                radius: JINC_ZERO_1,
            }),
            blur: 0.0,
            clamp: 0.0,
            polar: true,
        }
    }

    /// Unwindowed jinc, three lobes
    pub fn ewa_jinc() -> Self {
        Self {
            window: None,
            ..Self::ewa_lanczos()
        }
    }

    /// Jinc windowed by sinc
    pub fn ewa_ginseng() -> Self {
        Self {
            window: Some(KernelFunction::Sinc { radius: 1.0 }),
            ..Self::ewa_lanczos()
        }
    }

    /// Radial gaussian
    pub fn gaussian() -> Self {
        Self {
            kernel: KernelFunction::Gaussian { sigma: 1.0 },
            window: None,
            blur: 0.0,
            clamp: 0.0,
            polar: true,
        }
    }

    /// Separable triangle filter. Not usable for polar sampling.
    pub fn bilinear() -> Self {
        Self {
            kernel: KernelFunction::Triangle,
            window: None,
            blur: 0.0,
            clamp: 0.0,
            polar: false,
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        Some(match name {
            "ewa_lanczos" => Self::ewa_lanczos(),
            "ewa_jinc" => Self::ewa_jinc(),
            "ewa_ginseng" => Self::ewa_ginseng(),
            "gaussian" => Self::gaussian(),
            "bilinear" => Self::bilinear(),
            _ => return None,
        })
    }

    fn effective_blur(&self) -> f32 {
        if self.blur > 0.0 { self.blur } else { 1.0 }
    }

    /// Weight at distance `x` in unscaled kernel units, before normalization
    pub fn sample(&self, x: f64) -> f64 {
        let x = x / self.effective_blur() as f64;
        let kernel_radius = self.kernel.radius() as f64;
        let mut w = self.kernel.eval(x);
        if let Some(window) = &self.window {
            w *= window.eval(x * window.radius() as f64 / kernel_radius);
        }
        if w < 0.0 {
            w *= 1.0 - self.clamp.clamp(0.0, 1.0) as f64;
        }
        w
    }
}

/// Request for [`FilterGenerator::generate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub config: FilterConfig,
    pub lut_entries: u32,
    /// Inverse minification scale, >= 1
    pub filter_scale: f32,
    /// Weights below this magnitude are considered outside the support
    pub cutoff: f32,
}

/// A discretized radial filter
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub params: FilterParams,
    /// `lut_entries` weights sampled uniformly over `[0, radius]`
    pub weights: Vec<f32>,
    /// Support of the scaled filter in source pixels
    pub radius: f32,
    /// Distance beyond which every weight is below the cutoff
    pub radius_cutoff: f32,
}

impl Filter {
    pub fn config(&self) -> &FilterConfig {
        &self.params.config
    }

    pub fn lut_entries(&self) -> u32 {
        self.params.lut_entries
    }

    pub fn filter_scale(&self) -> f32 {
        self.params.filter_scale
    }

    /// Linearly interpolated weight at distance `d` (in pixels), the way the
    /// generated programs read the LUT
    pub fn weight_at(&self, d: f32) -> f32 {
        let n = self.weights.len();
        if n == 0 || self.radius <= 0.0 {
            return 0.0;
        }
        let x = (d / self.radius).clamp(0.0, 1.0) * (n - 1) as f32;
        let i = x.floor() as usize;
        let j = (i + 1).min(n - 1);
        let t = x - i as f32;
        self.weights[i] * (1.0 - t) + self.weights[j] * t
    }
}

/// Produces discretized weights for a filter configuration
pub trait FilterGenerator {
    fn generate(&self, params: &FilterParams) -> Option<Filter>;
}

/// Generates radial weights by evaluating [`FilterConfig::sample`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RadialFilterGenerator;

impl FilterGenerator for RadialFilterGenerator {
    fn generate(&self, params: &FilterParams) -> Option<Filter> {
        let config = &params.config;
        if !config.polar {
            debug!("Radial generator only handles polar filters");
            return None;
        }
        if params.lut_entries < 2 || params.filter_scale <= 0.0 {
            return None;
        }

        let entries = params.lut_entries as usize;
        let scale = params.filter_scale as f64;
        let radius = config.kernel.radius() * config.effective_blur() * params.filter_scale;

        let center = config.sample(0.0);
        if center.abs() < f64::EPSILON {
            return None;
        }

        let weights: Vec<f32> = (0..entries)
            .map(|i| {
                let x = radius as f64 * i as f64 / (entries - 1) as f64;
                (config.sample(x / scale) / center) as f32
            })
            .collect();

        let mut radius_cutoff = radius;
        if params.cutoff > 0.0 {
            radius_cutoff = 0.0;
            if let Some(last) = weights.iter().rposition(|w| w.abs() > params.cutoff) {
                radius_cutoff = radius * last as f32 / (entries - 1) as f32;
            }
        }

        debug!(
            entries,
            radius, radius_cutoff, "Generated polar filter weights"
        );

        Some(Filter {
            params: *params,
            weights,
            radius,
            radius_cutoff,
        })
    }
}
