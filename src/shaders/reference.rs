// SPDX-License-Identifier: GPL-3.0-only

//! CPU reference of the generated programs
//!
//! Mirrors the arithmetic of the emitted WGSL closely enough to compare the
//! two fetch strategies of the polar kernel and to check deband behavior
//! without a device.

use super::deband::DebandParams;
use super::polar::{PolarPlan, TileFootprint};
use crate::constants::{TILE_HEIGHT, TILE_WIDTH};
use crate::filters::Filter;

/// RGBA float image in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct ImageF32 {
    pub width: u32,
    pub height: u32,
    pub data: Vec<[f32; 4]>,
}

impl ImageF32 {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> [f32; 4]) -> Self {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> [f32; 4] {
        self.data[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: [f32; 4]) {
        self.data[(y * self.width + x) as usize] = value;
    }

    /// Texel at integer coordinates, clamped to the edge
    pub fn texel_clamped(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(x, y)
    }

    /// Bilinear sample at normalized coordinates with clamp-to-edge
    pub fn sample_bilinear(&self, u: f32, v: f32) -> [f32; 4] {
        let fx = u * self.width as f32 - 0.5;
        let fy = v * self.height as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let a = self.texel_clamped(x0, y0);
        let b = self.texel_clamped(x0 + 1, y0);
        let c = self.texel_clamped(x0, y0 + 1);
        let d = self.texel_clamped(x0 + 1, y0 + 1);
        std::array::from_fn(|n| {
            let top = a[n] * (1.0 - tx) + b[n] * tx;
            let bottom = c[n] * (1.0 - tx) + d[n] * tx;
            top * (1.0 - ty) + bottom * ty
        })
    }
}

/// How the reference polar kernel reads texels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Through a per-workgroup tile, indexed the way the compute kernel does
    SharedTile,
    /// Directly from the image
    Direct,
}

/// Resample `image` to `out_w x out_h` with a polar filter.
///
/// Returns `None` if a tiled fetch would fall outside the tile footprint.
pub fn resample_polar(
    image: &ImageF32,
    out_w: u32,
    out_h: u32,
    filter: &Filter,
    strategy: FetchStrategy,
) -> Option<ImageF32> {
    let plan = PolarPlan::new(filter.radius, filter.radius_cutoff);
    let ratio_x = out_w as f32 / image.width as f32;
    let ratio_y = out_h as f32 / image.height as f32;
    let footprint = TileFootprint::new(ratio_x, ratio_y, plan.padding(), 4);
    let offset = plan.offset() as i64;

    // Texel-space position of the sample for output coordinate `o`
    let base_texel = |ox: u32, oy: u32| -> ([i64; 2], [f32; 2]) {
        let fx = (ox as f32 + 0.5) / ratio_x - 0.5;
        let fy = (oy as f32 + 0.5) / ratio_y - 0.5;
        (
            [fx.floor() as i64, fy.floor() as i64],
            [fx - fx.floor(), fy - fy.floor()],
        )
    };

    let mut out = ImageF32::new(out_w, out_h);
    for oy in 0..out_h {
        for ox in 0..out_w {
            let (base, fcoord) = base_texel(ox, oy);
            let (wbase, _) = base_texel(ox / TILE_WIDTH * TILE_WIDTH, oy / TILE_HEIGHT * TILE_HEIGHT);
            let rel = [base[0] - wbase[0], base[1] - wbase[1]];

            let mut color = [0.0f32; 4];
            let mut wsum = 0.0f32;
            for tap in &plan.taps {
                let dx = tap.x as f32 - fcoord[0];
                let dy = tap.y as f32 - fcoord[1];
                let d = (dx * dx + dy * dy).sqrt();
                if tap.guarded && d >= plan.radius_cutoff {
                    continue;
                }

                let c = match strategy {
                    FetchStrategy::Direct => {
                        image.texel_clamped(base[0] + tap.x as i64, base[1] + tap.y as i64)
                    }
                    FetchStrategy::SharedTile => {
                        let tx = rel[0] + tap.x as i64 + offset;
                        let ty = rel[1] + tap.y as i64 + offset;
                        if tx < 0
                            || ty < 0
                            || tx >= footprint.width as i64
                            || ty >= footprint.height as i64
                        {
                            return None;
                        }
                        image.texel_clamped(wbase[0] + tx - offset, wbase[1] + ty - offset)
                    }
                };

                let w = filter.weight_at(d);
                wsum += w;
                for n in 0..4 {
                    color[n] += w * c[n];
                }
            }
            out.set(ox, oy, color.map(|c| c / wsum));
        }
    }
    Some(out)
}

/// The deband pass's pseudo-random generator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebandPrng {
    state: f32,
}

impl DebandPrng {
    pub fn permute(x: f32) -> f32 {
        let y = (34.0 * x + 1.0) * x;
        y - (y * (1.0 / 289.0)).floor() * 289.0
    }

    /// Seed from a normalized position and the pass seed
    pub fn new(pos: [f32; 2], seed: f32) -> Self {
        let m = [pos[0] + 1.0, pos[1] + 1.0, seed + 1.0];
        Self {
            state: Self::permute(Self::permute(Self::permute(m[0]) + m[1]) + m[2]),
        }
    }

    /// Next value in `[0, 1)`
    pub fn next(&mut self) -> f32 {
        self.state = Self::permute(self.state);
        let x = self.state * (1.0 / 41.0);
        x - x.floor()
    }
}

/// Deband one pixel at normalized position `pos`
pub fn deband_pixel(image: &ImageF32, pos: [f32; 2], params: &DebandParams) -> [f32; 4] {
    let mut prng = DebandPrng::new(pos, params.seed);
    let mut color = image.sample_bilinear(pos[0], pos[1]);
    let pt = [1.0 / image.width as f32, 1.0 / image.height as f32];

    for i in 1..=params.iterations {
        let dist = prng.next() * params.radius_at(i);
        let dir = prng.next() * std::f32::consts::TAU;
        let o = [dist * dir.cos(), dist * dir.sin()];

        let mut avg = [0.0f32; 4];
        for (sx, sy) in [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)] {
            let s = image.sample_bilinear(pos[0] + pt[0] * sx * o[0], pos[1] + pt[1] * sy * o[1]);
            for n in 0..4 {
                avg[n] += 0.25 * s[n];
            }
        }

        let threshold = params.threshold_at(i);
        for n in 0..4 {
            if (color[n] - avg[n]).abs() <= threshold {
                color[n] = avg[n];
            }
        }
    }

    if params.grain > 0.0 {
        let noise = [prng.next(), prng.next(), prng.next()];
        for n in 0..3 {
            color[n] += params.grain_amplitude() * (noise[n] - 0.5);
        }
    }
    color
}
