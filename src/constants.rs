// SPDX-License-Identifier: GPL-3.0-only

//! Defaults and fixed tuning values shared by the generators

/// Default number of entries in a polar LUT
pub const DEFAULT_LUT_ENTRIES: u32 = 64;

/// Default weight cutoff used to derive `radius_cutoff`
pub const DEFAULT_CUTOFF: f32 = 0.001;

/// A cached filter is reused if its scale is within this distance of the request
pub const FILTER_SCALE_TOLERANCE: f32 = 1e-3;

/// Base tile width in invocations for the cooperative compute kernel.
///
/// 32 matches the warp size on NVIDIA; 256 invocations per group leaves room
/// for several groups in flight.
pub const TILE_WIDTH: u32 = 32;

/// Base tile height in invocations for the cooperative compute kernel
pub const TILE_HEIGHT: u32 = 256 / TILE_WIDTH;

/// Bytes per component held in workgroup memory
pub const SHARED_COMPONENT_BYTES: u32 = 4;

/// Default deband parameters
pub mod deband {
    pub const ITERATIONS: u32 = 1;
    pub const THRESHOLD: f32 = 4.0;
    pub const RADIUS: f32 = 16.0;
    pub const GRAIN: f32 = 6.0;
}

/// Storage format of the compute kernel's output image (WGSL spelling)
pub const OUTPUT_STORAGE_FORMAT: &str = "rgba16float";
