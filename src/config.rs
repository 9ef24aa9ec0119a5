// SPDX-License-Identifier: GPL-3.0-only

//! JSON configuration of the command line tool

use crate::constants::{DEFAULT_CUTOFF, DEFAULT_LUT_ENTRIES};
use crate::errors::{SamplingError, SamplingResult};
use crate::filters::FilterConfig;
use crate::gpu::GpuLimits;
use crate::shaders::DebandParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Polar sampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolarSettings {
    /// Name of a filter preset (e.g. "ewa_lanczos")
    pub preset: String,
    /// Explicit filter, takes precedence over `preset`
    pub filter: Option<FilterConfig>,
    pub lut_entries: u32,
    pub cutoff: f32,
}

impl Default for PolarSettings {
    fn default() -> Self {
        Self {
            preset: "ewa_lanczos".to_string(),
            filter: None,
            lut_entries: DEFAULT_LUT_ENTRIES,
            cutoff: DEFAULT_CUTOFF,
        }
    }
}

impl PolarSettings {
    /// The filter these settings select
    pub fn filter_config(&self) -> SamplingResult<FilterConfig> {
        match self.filter {
            Some(filter) => Ok(filter),
            None => FilterConfig::preset(&self.preset).ok_or_else(|| {
                SamplingError::Settings(format!("unknown filter preset '{}'", self.preset))
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Limits of the headless device programs are generated for
    pub limits: GpuLimits,
    pub polar: PolarSettings,
    pub deband: DebandParams,
}

impl Config {
    pub fn from_json_str(json: &str) -> SamplingResult<Self> {
        serde_json::from_str(json).map_err(|e| SamplingError::Settings(e.to_string()))
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> SamplingResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SamplingError::Settings(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&json)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn to_json(&self) -> SamplingResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SamplingError::Settings(e.to_string()))
    }
}
