// SPDX-License-Identifier: GPL-3.0-only

//! Polar (EWA) resampling
//!
//! Every output pixel is the normalized weighted sum of the source texels
//! within `radius_cutoff` of its sample position. Weights come from a cached
//! 1D LUT indexed by distance.
//!
//! Two kernels share the same per-tap code and differ only in how a texel is
//! fetched ([`TexelFetch`]):
//!
//! - Tiled compute: each workgroup of `TILE_WIDTH x TILE_HEIGHT` invocations
//!   cooperatively loads the source footprint of its tile into workgroup
//!   memory, then every invocation reads its taps from there
//! - Per-pixel: each invocation samples its taps straight from the texture

use super::builder::{
    BoundTexture, Ident, LOCAL_ID, OUTPUT_COLOR, Rect, ShaderBuilder, WORKGROUP_ID, wgsl_f32,
};
use super::shader_object::ShaderObject;
use crate::constants::{
    DEFAULT_CUTOFF, DEFAULT_LUT_ENTRIES, SHARED_COMPONENT_BYTES, TILE_HEIGHT, TILE_WIDTH,
};
use crate::errors::{SamplingError, SamplingResult};
use crate::filters::{FilterConfig, FilterGenerator, FilterParams, RadialFilterGenerator};
use crate::gpu::Texture;
use std::f32::consts::SQRT_2;
use tracing::{debug, warn};

const COMPONENTS: [&str; 4] = ["x", "y", "z", "w"];

/// Source of a sampling pass
#[derive(Debug, Clone)]
pub struct SampleSource<'a> {
    pub texture: &'a Texture,
    /// Region of the texture to sample, in texels. Defaults to the whole
    /// texture; a zero width or height also means the full extent.
    pub rect: Option<Rect>,
    /// Number of components to sample. Defaults to the texture format's.
    pub components: Option<u32>,
    /// Output width. Defaults to the source width.
    pub new_w: Option<u32>,
    /// Output height. Defaults to the source height.
    pub new_h: Option<u32>,
}

impl<'a> SampleSource<'a> {
    pub fn new(texture: &'a Texture) -> Self {
        Self {
            texture,
            rect: None,
            components: None,
            new_w: None,
            new_h: None,
        }
    }

    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    pub fn with_components(mut self, components: u32) -> Self {
        self.components = Some(components);
        self
    }

    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.new_w = Some(width);
        self.new_h = Some(height);
        self
    }

    /// Fill in defaults and derive the scaling ratios
    pub fn resolve(&self) -> ResolvedSource {
        let tex_w = self.texture.width as f32;
        let tex_h = self.texture.height as f32;
        let mut rect = self.rect.unwrap_or(Rect::new(0.0, 0.0, tex_w, tex_h));
        if rect.w() == 0.0 {
            rect.x1 = rect.x0 + tex_w;
        }
        if rect.h() == 0.0 {
            rect.y1 = rect.y0 + tex_h;
        }

        let src_w = rect.w().abs();
        let src_h = rect.h().abs();
        let out_w = self.new_w.unwrap_or(src_w.round() as u32);
        let out_h = self.new_h.unwrap_or(src_h.round() as u32);

        ResolvedSource {
            rect,
            components: self
                .components
                .unwrap_or(self.texture.components())
                .clamp(1, 4),
            out_w,
            out_h,
            ratio_x: out_w as f32 / src_w,
            ratio_y: out_h as f32 / src_h,
        }
    }
}

/// A [`SampleSource`] with all defaults applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedSource {
    pub rect: Rect,
    pub components: u32,
    pub out_w: u32,
    pub out_h: u32,
    /// Output size over source size; below 1 when downscaling
    pub ratio_x: f32,
    pub ratio_y: f32,
}

impl ResolvedSource {
    /// How much the filter has to be widened to avoid aliasing: the inverse of
    /// the stronger downscale ratio, never below 1
    pub fn filter_scale(&self) -> f32 {
        (1.0 / self.ratio_x.min(self.ratio_y)).max(1.0)
    }
}

/// Parameters of [`sample_polar`]
pub struct SamplePolarParams<'a> {
    /// Must be a polar filter
    pub filter: FilterConfig,
    /// LUT resolution. 0 selects the default.
    pub lut_entries: u32,
    /// Weights below this magnitude are dropped from the support. Zero or
    /// negative selects the default.
    pub cutoff: f32,
    /// Cache slot holding the LUT between calls
    pub lut: &'a mut ShaderObject,
    /// Produces the LUT weights on regeneration
    pub generator: &'a dyn FilterGenerator,
}

impl<'a> SamplePolarParams<'a> {
    /// LUT request for a given filter scale, with unset values defaulted
    pub fn filter_params(&self, filter_scale: f32) -> FilterParams {
        FilterParams {
            config: self.filter,
            lut_entries: match self.lut_entries {
                0 => DEFAULT_LUT_ENTRIES,
                n => n,
            },
            filter_scale,
            cutoff: if self.cutoff > 0.0 {
                self.cutoff
            } else {
                DEFAULT_CUTOFF
            },
        }
    }

    pub fn new(filter: FilterConfig, lut: &'a mut ShaderObject) -> Self {
        Self {
            filter,
            lut_entries: DEFAULT_LUT_ENTRIES,
            cutoff: DEFAULT_CUTOFF,
            lut,
            generator: &RadialFilterGenerator,
        }
    }

    pub fn with_lut_entries(mut self, entries: u32) -> Self {
        self.lut_entries = entries;
        self
    }

    pub fn with_cutoff(mut self, cutoff: f32) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_generator(mut self, generator: &'a dyn FilterGenerator) -> Self {
        self.generator = generator;
        self
    }
}

/// Smallest possible distance between a sample position and the texel at
/// integer offset `(x, y)` from its base texel
pub fn worst_case_distance(x: i32, y: i32) -> f32 {
    let xx = (x.abs() - 1).max(0) as f32;
    let yy = (y.abs() - 1).max(0) as f32;
    (xx * xx + yy * yy).sqrt()
}

/// One statically included texel offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolarTap {
    pub x: i32,
    pub y: i32,
    /// Needs a runtime `d < radius_cutoff` check
    pub guarded: bool,
}

/// Offsets that can contribute for a given filter support
#[derive(Debug, Clone, PartialEq)]
pub struct PolarPlan {
    /// Offsets range over `1 - bound ..= bound` on both axes
    pub bound: i32,
    pub radius: f32,
    pub radius_cutoff: f32,
    /// Included taps, row-major
    pub taps: Vec<PolarTap>,
}

impl PolarPlan {
    pub fn new(radius: f32, radius_cutoff: f32) -> Self {
        let bound = radius_cutoff.ceil().max(0.0) as i32;
        let mut taps = Vec::new();
        for y in 1 - bound..=bound {
            for x in 1 - bound..=bound {
                let dmax = worst_case_distance(x, y);
                if dmax >= radius_cutoff {
                    continue;
                }
                taps.push(PolarTap {
                    x,
                    y,
                    guarded: dmax >= radius_cutoff - SQRT_2,
                });
            }
        }

        Self {
            bound,
            radius,
            radius_cutoff,
            taps,
        }
    }

    /// Padding above and left of the base texel
    pub fn offset(&self) -> i32 {
        self.bound - 1
    }

    /// Total padding per axis
    pub fn padding(&self) -> i32 {
        (self.offset() + self.bound).max(0)
    }

    /// No taps at all: the weight sum is zero and the output undefined
    pub fn is_degenerate(&self) -> bool {
        self.taps.is_empty()
    }
}

/// Source region one workgroup loads into workgroup memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileFootprint {
    /// Texels per row
    pub width: u32,
    /// Rows
    pub height: u32,
    pub components: u32,
}

impl TileFootprint {
    pub fn new(ratio_x: f32, ratio_y: f32, padding: i32, components: u32) -> Self {
        let padding = padding.max(0) as u32 + 1;
        Self {
            width: ((TILE_WIDTH as f32 / ratio_x).ceil() as u32).saturating_add(padding),
            height: ((TILE_HEIGHT as f32 / ratio_y).ceil() as u32).saturating_add(padding),
            components,
        }
    }

    /// Texels in the tile, `None` on overflow
    pub fn texels(&self) -> Option<u64> {
        u64::from(self.width).checked_mul(u64::from(self.height))
    }

    /// Workgroup memory the tile needs, `None` if it does not fit in a `u64`
    pub fn shared_bytes(&self) -> Option<u64> {
        self.texels()?
            .checked_mul(u64::from(self.components))?
            .checked_mul(u64::from(SHARED_COMPONENT_BYTES))
    }
}

/// How a tap reads its texel
enum TexelFetch<'s> {
    /// From per-component workgroup arrays, via `idx`
    Shared {
        arrays: &'s [Ident],
        stride: i32,
        offset: i32,
    },
    /// Straight from the texture
    Direct {
        src: &'s BoundTexture,
        components: u32,
    },
}

impl TexelFetch<'_> {
    /// Statement(s) loading the texel at offset `(x, y)` into `c`
    fn load(&self, x: i32, y: i32) -> String {
        match self {
            TexelFetch::Shared {
                arrays,
                stride,
                offset,
            } => {
                let lanes: Vec<String> = (0..4)
                    .map(|n| match arrays.get(n) {
                        Some(array) => format!("{}[idx]", array),
                        None => "0.0".to_string(),
                    })
                    .collect();
                format!(
                    "idx = {} * rel.y + rel.x + {};\nc = vec4<f32>({});",
                    stride,
                    stride * (y + offset) + x + offset,
                    lanes.join(", ")
                )
            }
            TexelFetch::Direct { src, components } => {
                let sample = format!(
                    "textureSampleLevel({}, {}, base + {} * vec2<f32>({}, {}), 0.0)",
                    src.texture,
                    src.sampler,
                    src.pt,
                    wgsl_f32(x as f32),
                    wgsl_f32(y as f32)
                );
                if *components < 4 {
                    format!("c = {} * {};", sample, component_mask(*components))
                } else {
                    format!("c = {};", sample)
                }
            }
        }
    }
}

fn component_mask(components: u32) -> String {
    let lanes: Vec<&str> = (0..4)
        .map(|n| if n < components { "1.0" } else { "0.0" })
        .collect();
    format!("vec4<f32>({})", lanes.join(", "))
}

/// Emit the weighted contribution of one tap
fn emit_tap(
    sh: &mut ShaderBuilder<'_>,
    plan: &PolarPlan,
    lut: &Ident,
    fetch: &TexelFetch<'_>,
    tap: PolarTap,
) {
    sh.stmt(format!(
        "d = length(vec2<f32>({}, {}) - fcoord);",
        wgsl_f32(tap.x as f32),
        wgsl_f32(tap.y as f32)
    ));
    if tap.guarded {
        sh.begin_block(&format!("if (d < {})", wgsl_f32(plan.radius_cutoff)));
    }
    sh.stmt(format!(
        "w = {}(d * {});\nwsum += w;",
        lut,
        wgsl_f32(1.0 / plan.radius)
    ));
    sh.stmt(fetch.load(tap.x, tap.y));
    sh.stmt(format!("{OUTPUT_COLOR} += w * c;"));
    if tap.guarded {
        sh.end_block();
    }
}

/// Cooperative load of the tile footprint, then a barrier
fn emit_tile_load(
    sh: &mut ShaderBuilder<'_>,
    src: &BoundTexture,
    footprint: &TileFootprint,
    texels: u64,
    offset: i32,
) -> Vec<Ident> {
    let arrays: Vec<Ident> = (0..footprint.components)
        .map(|n| sh.fresh(&format!("tile{}", n)))
        .collect();
    for array in &arrays {
        sh.decl(format!(
            "var<workgroup> {}: array<f32, {}>;",
            array, texels
        ));
    }

    sh.stmt(format!(
        "let wpos = {}(vec2<f32>({WORKGROUP_ID}.xy * vec2<u32>({TILE_WIDTH}u, {TILE_HEIGHT}u)));\n\
         let wbase = wpos - {pt} * fract(wpos * {size} - vec2<f32>(0.5));\n\
         let fcoord = fract({pos} * {size} - vec2<f32>(0.5));\n\
         let base = {pos} - {pt} * fcoord;\n\
         let rel = vec2<i32>(round((base - wbase) * {size}));",
        src.map,
        pt = src.pt,
        size = src.size,
        pos = src.pos,
    ));

    let iw = footprint.width;
    let ih = footprint.height;
    sh.begin_block(&format!(
        "for (var ty: i32 = i32({LOCAL_ID}.y); ty < {ih}; ty += {TILE_HEIGHT})"
    ));
    sh.begin_block(&format!(
        "for (var tx: i32 = i32({LOCAL_ID}.x); tx < {iw}; tx += {TILE_WIDTH})"
    ));
    sh.stmt(format!(
        "c = textureSampleLevel({}, {}, wbase + {} * vec2<f32>(f32(tx - {offset}), f32(ty - {offset})), 0.0);",
        src.texture, src.sampler, src.pt
    ));
    for (array, lane) in arrays.iter().zip(COMPONENTS) {
        sh.stmt(format!("{array}[{iw} * ty + tx] = c.{lane};"));
    }
    sh.end_block();
    sh.end_block();
    sh.stmt("workgroupBarrier();");
    arrays
}

/// Append a polar resampling pass to `sh`.
///
/// Returns `false` (with the reason logged) if the pass could not be added.
/// On success the program outputs the resampled color and the LUT is held in
/// `params.lut`, which must outlive the program's execution.
pub fn sample_polar(
    sh: &mut ShaderBuilder<'_>,
    src: &SampleSource<'_>,
    params: SamplePolarParams<'_>,
) -> bool {
    match try_sample_polar(sh, src, params) {
        Ok(()) => true,
        Err(e) => {
            e.log();
            false
        }
    }
}

/// [`sample_polar`], returning the failure instead of logging it
pub fn try_sample_polar(
    sh: &mut ShaderBuilder<'_>,
    src: &SampleSource<'_>,
    params: SamplePolarParams<'_>,
) -> SamplingResult<()> {
    if !params.filter.polar {
        return Err(SamplingError::Config(
            "trying to use polar sampling with a non-polar filter".to_string(),
        ));
    }

    let resolved = src.resolve();
    sh.require(resolved.out_w, resolved.out_h)?;

    let request = params.filter_params(resolved.filter_scale());
    params.lut.ensure(sh.gpu(), params.generator, &request)?;

    let (filter, lut_texture) = params
        .lut
        .filter()
        .zip(params.lut.texture())
        .ok_or_else(|| SamplingError::Resource("polar LUT missing after update".to_string()))?;
    let plan = PolarPlan::new(filter.radius, filter.radius_cutoff);
    let lut_texture = lut_texture.clone();

    if plan.is_degenerate() {
        warn!(
            radius_cutoff = plan.radius_cutoff,
            "Polar filter has no taps, output is undefined"
        );
    }

    let lut = sh.bind_texture_1d("polar_lut", &lut_texture);
    let src_tex = sh.bind(src.texture, "src_tex", Some(resolved.rect))?;
    let lut_fn = sh.lut_sampler(&lut, request.lut_entries);

    let footprint = TileFootprint::new(
        resolved.ratio_x,
        resolved.ratio_y,
        plan.padding(),
        resolved.components,
    );
    let shared_bytes = footprint.shared_bytes();
    let tiled = sh.try_compute(
        TILE_WIDTH,
        TILE_HEIGHT,
        shared_bytes.unwrap_or(u64::MAX),
    );
    debug!(
        out_w = resolved.out_w,
        out_h = resolved.out_h,
        filter_scale = request.filter_scale,
        taps = plan.taps.len(),
        shared_bytes = ?shared_bytes,
        tiled,
        "Emitting polar sampling pass"
    );

    sh.stmt("// polar sampling");
    sh.begin_block("");
    sh.stmt("var d: f32;\nvar w: f32;\nvar wsum: f32 = 0.0;\nvar idx: i32;\nvar c: vec4<f32>;");

    let texels = footprint.texels().filter(|_| tiled);
    if let Some(texels) = texels {
        let arrays = emit_tile_load(sh, &src_tex, &footprint, texels, plan.offset());
        let fetch = TexelFetch::Shared {
            arrays: &arrays,
            stride: footprint.width as i32,
            offset: plan.offset(),
        };
        for &tap in &plan.taps {
            emit_tap(sh, &plan, &lut_fn, &fetch, tap);
        }
    } else {
        sh.stmt(format!(
            "let fcoord = fract({pos} * {size} - vec2<f32>(0.5));\n\
             let base = {pos} - {pt} * fcoord;",
            pos = src_tex.pos,
            size = src_tex.size,
            pt = src_tex.pt,
        ));
        let fetch = TexelFetch::Direct {
            src: &src_tex,
            components: resolved.components,
        };
        for &tap in &plan.taps {
            emit_tap(sh, &plan, &lut_fn, &fetch, tap);
        }
    }

    sh.stmt(format!("{OUTPUT_COLOR} = {OUTPUT_COLOR} / vec4<f32>(wsum);"));
    sh.end_block();
    sh.set_color_output();
    Ok(())
}
