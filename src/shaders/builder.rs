// SPDX-License-Identifier: GPL-3.0-only

//! Append-only WGSL program builder and resource binder
//!
//! Passes add module-scope declarations and main-body statements. Every name a
//! pass introduces comes from [`ShaderBuilder::fresh`], so several passes can
//! be composed into one program without collisions. The text is only
//! assembled in [`ShaderBuilder::finish`].

use super::program::{Binding, BindingResource, ShaderProgram, ShaderStage};
use crate::constants::OUTPUT_STORAGE_FORMAT;
use crate::errors::{SamplingError, SamplingResult};
use crate::gpu::{Gpu, Texture};
use std::fmt;
use tracing::debug;

/// Accumulated output color of the program (`vec4<f32>`)
pub const OUTPUT_COLOR: &str = "color";
/// Integer coordinates of the output pixel as `vec2<f32>`
pub const OUTPUT_ID: &str = "out_id";
/// `@builtin(local_invocation_id)` in compute programs
pub const LOCAL_ID: &str = "local_id";
/// `@builtin(workgroup_id)` in compute programs
pub const WORKGROUP_ID: &str = "wg_id";
/// `@builtin(global_invocation_id)` in compute programs
pub const GLOBAL_ID: &str = "global_id";

/// A generated WGSL identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format an f32 as a WGSL float literal (always with a decimal point or exponent)
pub fn wgsl_f32(v: f32) -> String {
    format!("{:?}", v)
}

/// Sub-rectangle of a texture, in texels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn w(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn h(&self) -> f32 {
        self.y1 - self.y0
    }
}

/// Identifiers produced by [`ShaderBuilder::bind`]
#[derive(Debug, Clone)]
pub struct BoundTexture {
    pub texture: Ident,
    pub sampler: Ident,
    /// Maps integer output coordinates to normalized texture coordinates
    pub map: Ident,
    /// Normalized sample position of the current output pixel
    pub pos: Ident,
    /// Texture size in texels
    pub size: Ident,
    /// Size of one texel in normalized coordinates
    pub pt: Ident,
}

/// What the program produces so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signature {
    None,
    Color,
}

/// Builder for one program
pub struct ShaderBuilder<'a> {
    gpu: &'a dyn Gpu,
    counter: u32,
    next_binding: u32,
    header: Vec<String>,
    body: Vec<String>,
    depth: usize,
    bindings: Vec<Binding>,
    output_size: Option<(u32, u32)>,
    signature: Signature,
    stage: ShaderStage,
    shared_memory: u64,
}

impl<'a> ShaderBuilder<'a> {
    /// Start a program for the given device. Every texture bound later must
    /// belong to this device.
    pub fn new(gpu: &'a dyn Gpu) -> Self {
        Self {
            gpu,
            counter: 0,
            next_binding: 0,
            header: Vec::new(),
            body: Vec::new(),
            depth: 0,
            bindings: Vec::new(),
            output_size: None,
            signature: Signature::None,
            stage: ShaderStage::Fragment,
            shared_memory: 0,
        }
    }

    pub fn gpu(&self) -> &'a dyn Gpu {
        self.gpu
    }

    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.output_size
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Shared memory reserved by compute passes, in bytes
    pub fn shared_memory(&self) -> u64 {
        self.shared_memory
    }

    /// A new identifier, unique within this program
    pub fn fresh(&mut self, name: &str) -> Ident {
        debug_assert!(
            name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit() || c == '_'),
            "invalid identifier prefix {name:?}"
        );
        self.counter += 1;
        Ident(format!("{}_{}", name, self.counter))
    }

    /// Add a module-scope declaration (function, constant, workgroup array)
    pub fn decl(&mut self, code: impl Into<String>) {
        self.header.push(code.into());
    }

    /// Add a statement to the main body
    pub fn stmt(&mut self, code: impl AsRef<str>) {
        let indent = "    ".repeat(self.depth + 1);
        for line in code.as_ref().lines() {
            self.body.push(format!("{}{}", indent, line));
        }
    }

    /// Open a `{` block (optionally with a header such as `if (...)`)
    pub fn begin_block(&mut self, head: &str) {
        if head.is_empty() {
            self.stmt("{");
        } else {
            self.stmt(format!("{} {{", head));
        }
        self.depth += 1;
    }

    pub fn end_block(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.stmt("}");
    }

    /// Check that a new sampling pass can start with the given output size.
    ///
    /// Fails if the program already produces a color, or if its output size
    /// was fixed to something else.
    pub fn require(&mut self, width: u32, height: u32) -> SamplingResult<()> {
        if self.signature != Signature::None {
            return Err(SamplingError::Precondition(
                "shader already produces a color".to_string(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(SamplingError::Precondition(format!(
                "invalid output size {}x{}",
                width, height
            )));
        }
        match self.output_size {
            Some(size) if size != (width, height) => Err(SamplingError::Precondition(format!(
                "output size {}x{} does not match {}x{}",
                width, height, size.0, size.1
            ))),
            _ => {
                self.output_size = Some((width, height));
                Ok(())
            }
        }
    }

    /// Mark that the output color has been written
    pub fn set_color_output(&mut self) {
        self.signature = Signature::Color;
    }

    /// Try to turn this program into a compute kernel with the given
    /// workgroup size, reserving `shared_memory` bytes of workgroup memory.
    /// Pass `u64::MAX` for a requirement too large to compute.
    pub fn try_compute(&mut self, bw: u32, bh: u32, shared_memory: u64) -> bool {
        if !self.gpu.compute_available() {
            return false;
        }
        if matches!(self.stage, ShaderStage::Compute { workgroup_size } if workgroup_size != [bw, bh])
        {
            return false;
        }

        let total = self.shared_memory.saturating_add(shared_memory);
        if total > u64::from(self.gpu.shared_memory_budget()) {
            debug!(
                requested = total,
                budget = self.gpu.shared_memory_budget(),
                "Shared memory budget exceeded"
            );
            return false;
        }

        self.shared_memory = total;
        self.stage = ShaderStage::Compute {
            workgroup_size: [bw, bh],
        };
        true
    }

    fn add_binding(&mut self, name: Ident, resource: BindingResource) -> u32 {
        let binding = self.next_binding;
        self.next_binding += 1;
        self.bindings.push(Binding {
            name,
            group: 0,
            binding,
            resource,
        });
        binding
    }

    /// Bind a 2D texture for sampling. `rect` selects the source region
    /// (defaults to the whole texture), which is stretched over the output.
    pub fn bind(
        &mut self,
        texture: &Texture,
        purpose: &str,
        rect: Option<Rect>,
    ) -> SamplingResult<BoundTexture> {
        let (out_w, out_h) = self.output_size.ok_or_else(|| {
            SamplingError::Precondition("output size must be set before binding".to_string())
        })?;
        let rect = rect.unwrap_or(Rect::new(
            0.0,
            0.0,
            texture.width as f32,
            texture.height as f32,
        ));

        let tex = self.fresh(purpose);
        let sampler = self.fresh(&format!("{}_sampler", purpose));
        let map = self.fresh(&format!("{}_map", purpose));
        let size = self.fresh(&format!("{}_size", purpose));
        let pt = self.fresh(&format!("{}_pt", purpose));
        let pos = self.fresh(&format!("{}_pos", purpose));

        let tex_binding = self.add_binding(tex.clone(), BindingResource::Texture(texture.id));
        let sampler_binding = self.add_binding(
            sampler.clone(),
            BindingResource::Sampler {
                sample_mode: texture.sample_mode,
                address_mode: texture.address_mode,
            },
        );

        let (w, h) = (texture.width as f32, texture.height as f32);
        self.decl(format!(
            "@group(0) @binding({tex_binding}) var {tex}: texture_2d<f32>;\n\
             @group(0) @binding({sampler_binding}) var {sampler}: sampler;\n\
             const {size}: vec2<f32> = vec2<f32>({}, {});\n\
             const {pt}: vec2<f32> = vec2<f32>({}, {});\n\
             fn {map}(id: vec2<f32>) -> vec2<f32> {{\n\
             \x20   return (vec2<f32>({}, {}) + (id + vec2<f32>(0.5)) * vec2<f32>({}, {})) * {pt};\n\
             }}",
            wgsl_f32(w),
            wgsl_f32(h),
            wgsl_f32(1.0 / w),
            wgsl_f32(1.0 / h),
            wgsl_f32(rect.x0),
            wgsl_f32(rect.y0),
            wgsl_f32(rect.w() / out_w as f32),
            wgsl_f32(rect.h() / out_h as f32),
        ));
        self.stmt(format!("let {pos} = {map}({OUTPUT_ID});"));

        debug!(
            texture = texture.id.0,
            name = %tex,
            "Bound texture for sampling"
        );
        Ok(BoundTexture {
            texture: tex,
            sampler,
            map,
            pos,
            size,
            pt,
        })
    }

    /// Bind a 1D texture read with `textureLoad`
    pub fn bind_texture_1d(&mut self, name: &str, texture: &Texture) -> Ident {
        let ident = self.fresh(name);
        let binding = self.add_binding(ident.clone(), BindingResource::Texture(texture.id));
        self.decl(format!(
            "@group(0) @binding({binding}) var {ident}: texture_1d<f32>;"
        ));
        ident
    }

    /// Bind an f32 uniform
    pub fn uniform_f32(&mut self, name: &str, value: f32) -> Ident {
        let ident = self.fresh(name);
        let binding = self.add_binding(ident.clone(), BindingResource::UniformF32(value));
        self.decl(format!(
            "@group(0) @binding({binding}) var<uniform> {ident}: f32;"
        ));
        ident
    }

    /// Emit a function `f(x: f32) -> f32` that linearly interpolates a 1D LUT
    /// of `entries` texels over `x` in `[0, 1]`
    pub fn lut_sampler(&mut self, lut: &Ident, entries: u32) -> Ident {
        let func = self.fresh("lut_sample");
        let last = entries.saturating_sub(1);
        self.decl(format!(
            "fn {func}(x: f32) -> f32 {{\n\
             \x20   let t = clamp(x, 0.0, 1.0) * {};\n\
             \x20   let i = u32(floor(t));\n\
             \x20   let j = min(i + 1u, {last}u);\n\
             \x20   let a = textureLoad({lut}, i, 0).x;\n\
             \x20   let b = textureLoad({lut}, j, 0).x;\n\
             \x20   return mix(a, b, t - floor(t));\n\
             }}",
            wgsl_f32(last as f32),
        ));
        func
    }

    /// Assemble the final WGSL module
    pub fn finish(mut self) -> SamplingResult<ShaderProgram> {
        let (out_w, out_h) = self.output_size.ok_or_else(|| {
            SamplingError::Precondition("program has no output size".to_string())
        })?;
        if self.signature != Signature::Color {
            return Err(SamplingError::Precondition(
                "program does not produce a color".to_string(),
            ));
        }

        let mut source = String::from("// Generated by shader-sampling\n\n");
        let output = match self.stage {
            ShaderStage::Compute { .. } => {
                let ident = self.fresh("out_image");
                let binding = self.add_binding(
                    ident.clone(),
                    BindingResource::OutputImage {
                        format: OUTPUT_STORAGE_FORMAT,
                    },
                );
                self.decl(format!(
                    "@group(0) @binding({binding}) var {ident}: texture_storage_2d<{OUTPUT_STORAGE_FORMAT}, write>;"
                ));
                Some(ident)
            }
            ShaderStage::Fragment => None,
        };

        for decl in &self.header {
            source.push_str(decl);
            source.push_str("\n\n");
        }

        match (self.stage, output) {
            (ShaderStage::Compute { workgroup_size }, Some(output)) => {
                source.push_str(&format!(
                    "@compute @workgroup_size({}, {}, 1)\n\
                     fn main(\n\
                     \x20   @builtin(global_invocation_id) {GLOBAL_ID}: vec3<u32>,\n\
                     \x20   @builtin(local_invocation_id) {LOCAL_ID}: vec3<u32>,\n\
                     \x20   @builtin(workgroup_id) {WORKGROUP_ID}: vec3<u32>,\n\
                     ) {{\n\
                     \x20   let {OUTPUT_ID} = vec2<f32>({GLOBAL_ID}.xy);\n\
                     \x20   var {OUTPUT_COLOR} = vec4<f32>(0.0);\n",
                    workgroup_size[0], workgroup_size[1],
                ));
                for line in &self.body {
                    source.push_str(line);
                    source.push('\n');
                }
                source.push_str(&format!(
                    "    if (all({GLOBAL_ID}.xy < vec2<u32>({out_w}u, {out_h}u))) {{\n\
                     \x20       textureStore({output}, vec2<i32>({GLOBAL_ID}.xy), {OUTPUT_COLOR});\n\
                     \x20   }}\n\
                     }}\n"
                ));
            }
            _ => {
                source.push_str(&format!(
                    "@fragment\n\
                     fn main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) vec4<f32> {{\n\
                     \x20   let {OUTPUT_ID} = floor(frag_coord.xy);\n\
                     \x20   var {OUTPUT_COLOR} = vec4<f32>(0.0);\n"
                ));
                for line in &self.body {
                    source.push_str(line);
                    source.push('\n');
                }
                source.push_str(&format!("    return {OUTPUT_COLOR};\n}}\n"));
            }
        }

        debug!(
            stage = ?self.stage,
            bindings = self.bindings.len(),
            bytes = source.len(),
            "Shader program assembled"
        );
        Ok(ShaderProgram {
            source,
            bindings: self.bindings,
            stage: self.stage,
            output_size: (out_w, out_h),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuLimits, HeadlessGpu};

    #[test]
    fn test_fresh_identifiers_are_unique() {
        let gpu = HeadlessGpu::default();
        let mut sh = ShaderBuilder::new(&gpu);
        let a = sh.fresh("tex");
        let b = sh.fresh("tex");
        let c = sh.fresh("color");
        assert_ne!(a, b);
        assert_ne!(c.as_str(), OUTPUT_COLOR);
    }

    #[test]
    fn test_require_checks_size_and_signature() {
        let gpu = HeadlessGpu::default();
        let mut sh = ShaderBuilder::new(&gpu);
        assert!(sh.require(0, 10).is_err());
        assert!(sh.require(64, 32).is_ok());
        assert!(sh.require(64, 32).is_ok());
        assert!(matches!(
            sh.require(32, 32),
            Err(SamplingError::Precondition(_))
        ));
        sh.set_color_output();
        assert!(sh.require(64, 32).is_err());
    }

    #[test]
    fn test_try_compute_respects_budget() {
        let gpu = HeadlessGpu::new(GpuLimits {
            max_shared_memory: 1024,
            ..Default::default()
        });
        let mut sh = ShaderBuilder::new(&gpu);
        assert!(!sh.try_compute(32, 8, 2048));
        assert_eq!(sh.stage(), ShaderStage::Fragment);
        assert!(sh.try_compute(32, 8, 512));
        assert!(!sh.try_compute(16, 16, 0));
        assert!(!sh.try_compute(32, 8, 1024));
        assert_eq!(sh.shared_memory(), 512);
        assert!(!sh.try_compute(32, 8, u64::MAX));
        assert_eq!(sh.shared_memory(), 512);
    }

    #[test]
    fn test_try_compute_without_compute_support() {
        let gpu = HeadlessGpu::new(GpuLimits {
            compute: false,
            ..Default::default()
        });
        let mut sh = ShaderBuilder::new(&gpu);
        assert!(!sh.try_compute(32, 8, 0));
    }

    #[test]
    fn test_wgsl_float_literals() {
        assert_eq!(wgsl_f32(3.0), "3.0");
        assert_eq!(wgsl_f32(-0.5), "-0.5");
        assert!(wgsl_f32(1e-7).contains('e'));
    }

    #[test]
    fn test_finish_requires_color() {
        let gpu = HeadlessGpu::default();
        let mut sh = ShaderBuilder::new(&gpu);
        sh.require(8, 8).unwrap();
        assert!(sh.finish().is_err());
    }
}
