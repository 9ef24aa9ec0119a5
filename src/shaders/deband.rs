// SPDX-License-Identifier: GPL-3.0-only

//! Debanding with optional grain
//!
//! Each iteration compares the current color with the average of four
//! samples taken at a random distance and angle around the pixel, rotated by
//! quarter turns. If the difference stays under the iteration's threshold the
//! average replaces the color. Grain then adds centered noise to the color
//! channels.

use super::builder::{OUTPUT_COLOR, ShaderBuilder, wgsl_f32};
use crate::constants::deband as defaults;
use crate::errors::SamplingResult;
use crate::gpu::Texture;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use tracing::debug;

/// Deband parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebandParams {
    /// Varies the noise pattern, e.g. per frame
    pub seed: f32,
    /// Refinement passes. 0 disables averaging.
    pub iterations: u32,
    /// Cut-off threshold; divided by `1000 * i` on iteration `i`
    pub threshold: f32,
    /// Initial sampling radius in texels, scaled by `i` on iteration `i`
    pub radius: f32,
    /// Noise amplitude, divided by 1000. 0 disables grain.
    pub grain: f32,
}

impl Default for DebandParams {
    fn default() -> Self {
        Self {
            seed: 0.0,
            iterations: defaults::ITERATIONS,
            threshold: defaults::THRESHOLD,
            radius: defaults::RADIUS,
            grain: defaults::GRAIN,
        }
    }
}

impl DebandParams {
    /// Threshold applied on iteration `i` (1-based)
    pub fn threshold_at(&self, i: u32) -> f32 {
        self.threshold / (1000.0 * i as f32)
    }

    /// Sampling radius on iteration `i` (1-based), in texels
    pub fn radius_at(&self, i: u32) -> f32 {
        self.radius * i as f32
    }

    /// Grain amplitude in color units
    pub fn grain_amplitude(&self) -> f32 {
        self.grain / 1000.0
    }
}

/// Append a deband pass sampling `texture` at its native size.
///
/// Adds nothing if the program already has a color or a different output size.
pub fn deband(sh: &mut ShaderBuilder<'_>, texture: &Texture, params: &DebandParams) {
    if let Err(e) = try_deband(sh, texture, params) {
        e.log();
    }
}

/// [`deband`], returning the failure instead of logging it
pub fn try_deband(
    sh: &mut ShaderBuilder<'_>,
    texture: &Texture,
    params: &DebandParams,
) -> SamplingResult<()> {
    sh.require(texture.width, texture.height)?;
    let src = sh.bind(texture, "deband", None)?;

    let permute = sh.fresh("permute");
    let random = sh.fresh("random");
    sh.decl(format!(
        "fn {permute}(x: f32) -> f32 {{\n\
         \x20   let y = (34.0 * x + 1.0) * x;\n\
         \x20   return y - floor(y * (1.0 / 289.0)) * 289.0;\n\
         }}\n\
         \n\
         fn {random}(state: ptr<function, f32>) -> f32 {{\n\
         \x20   *state = {permute}(*state);\n\
         \x20   return fract(*state * (1.0 / 41.0));\n\
         }}"
    ));

    let seed = sh.uniform_f32("seed", params.seed);

    sh.stmt("// deband");
    sh.begin_block("");
    sh.stmt(format!(
        "let m = vec3<f32>({pos}, {seed}) + vec3<f32>(1.0);\n\
         var prng = {permute}({permute}({permute}(m.x) + m.y) + m.z);\n\
         var avg: vec4<f32>;\n\
         var diff: vec4<f32>;\n\
         {OUTPUT_COLOR} = textureSampleLevel({tex}, {smp}, {pos}, 0.0);",
        pos = src.pos,
        tex = src.texture,
        smp = src.sampler,
    ));

    if params.iterations > 0 {
        let average = sh.fresh("average");
        let taps: Vec<String> = [("", ""), ("-", ""), ("-", "-"), ("", "-")]
            .iter()
            .map(|(sx, sy)| {
                format!(
                    "    sum += textureSampleLevel({}, {}, pos + {} * vec2<f32>({sx}o.x, {sy}o.y), 0.0);",
                    src.texture, src.sampler, src.pt
                )
            })
            .collect();
        sh.decl(format!(
            "fn {average}(pos: vec2<f32>, radius: f32, state: ptr<function, f32>) -> vec4<f32> {{\n\
             \x20   let dist = {random}(state) * radius;\n\
             \x20   let dir = {random}(state) * {};\n\
             \x20   let o = dist * vec2<f32>(cos(dir), sin(dir));\n\
             \x20   var sum = vec4<f32>(0.0);\n\
             {}\n\
             \x20   return 0.25 * sum;\n\
             }}",
            wgsl_f32(TAU),
            taps.join("\n"),
        ));

        for i in 1..=params.iterations {
            sh.stmt(format!(
                "avg = {average}({pos}, {}, &prng);\n\
                 diff = abs({OUTPUT_COLOR} - avg);\n\
                 {OUTPUT_COLOR} = select(avg, {OUTPUT_COLOR}, diff > vec4<f32>({}));",
                wgsl_f32(params.radius_at(i)),
                wgsl_f32(params.threshold_at(i)),
                pos = src.pos,
            ));
        }
    }

    if params.grain > 0.0 {
        sh.stmt(format!(
            "let noise = vec3<f32>({random}(&prng), {random}(&prng), {random}(&prng));\n\
             {OUTPUT_COLOR} = vec4<f32>({OUTPUT_COLOR}.xyz + {} * (noise - vec3<f32>(0.5)), {OUTPUT_COLOR}.w);",
            wgsl_f32(params.grain_amplitude()),
        ));
    }

    sh.end_block();
    sh.set_color_output();
    debug!(
        iterations = params.iterations,
        grain = params.grain,
        "Emitted deband pass"
    );
    Ok(())
}
