// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use shader_sampling::constants::{self, deband};

#[test]
fn test_tile_is_256_invocations() {
    assert_eq!(constants::TILE_WIDTH * constants::TILE_HEIGHT, 256);
    assert_eq!(constants::TILE_HEIGHT, 8);
}

#[test]
fn test_polar_defaults() {
    assert_eq!(constants::DEFAULT_LUT_ENTRIES, 64);
    assert_eq!(constants::DEFAULT_CUTOFF, 0.001);
    assert_eq!(constants::FILTER_SCALE_TOLERANCE, 1e-3);
}

#[test]
fn test_deband_defaults() {
    assert_eq!(deband::ITERATIONS, 1);
    assert_eq!(deband::THRESHOLD, 4.0);
    assert_eq!(deband::RADIUS, 16.0);
    assert_eq!(deband::GRAIN, 6.0);
}
