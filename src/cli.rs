// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Generating polar resampling programs
//! - Generating deband programs
//! - Listing the headless device's capabilities

use shader_sampling::Config;
use shader_sampling::gpu::{FormatCaps, GpuCaps, HeadlessGpu};
use shader_sampling::shaders::{
    BindingResource, SamplePolarParams, SampleSource, ShaderBuilder, ShaderObject, ShaderProgram,
    ShaderStage, deband, try_sample_polar,
};
use std::path::Path;

/// Load the configuration file, or the defaults without one
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::default()),
    }
}

/// Generate and print a polar resampling program
pub fn generate_polar(
    config: &Config,
    src_size: (u32, u32),
    out_size: (u32, u32),
    format: &str,
    preset: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let gpu = HeadlessGpu::new(config.limits);
    let source = gpu.create_image(src_size.0, src_size.1, format)?;

    let mut settings = config.polar.clone();
    if let Some(preset) = preset {
        settings.preset = preset.to_string();
        settings.filter = None;
    }
    let filter = settings.filter_config()?;

    let mut lut = ShaderObject::new();
    let mut sh = ShaderBuilder::new(&gpu);
    let src = SampleSource::new(&source).with_output_size(out_size.0, out_size.1);
    let params = SamplePolarParams::new(filter, &mut lut)
        .with_lut_entries(settings.lut_entries)
        .with_cutoff(settings.cutoff);

    let result = try_sample_polar(&mut sh, &src, params)
        .and_then(|()| sh.finish())
        .map(|program| print_program(&program));
    lut.destroy(&gpu);
    result?;
    Ok(())
}

/// Generate and print a deband program
pub fn generate_deband(
    config: &Config,
    size: (u32, u32),
    seed: Option<f32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let gpu = HeadlessGpu::new(config.limits);
    let source = gpu.create_image(size.0, size.1, "rgba16float")?;

    let mut params = config.deband;
    if let Some(seed) = seed {
        params.seed = seed;
    }

    let mut sh = ShaderBuilder::new(&gpu);
    deband(&mut sh, &source, &params);
    let program = sh.finish()?;
    print_program(&program);
    Ok(())
}

/// Print the limits and formats of the configured headless device
pub fn show_caps(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let gpu = HeadlessGpu::new(config.limits);

    println!("Device limits:");
    println!("  Max 1D texture:   {}", gpu.max_1d_texture_dim());
    println!("  Compute:          {}", gpu.compute_available());
    println!("  Shared memory:    {} bytes", gpu.shared_memory_budget());
    println!();
    println!("Formats:");
    for format in gpu.formats() {
        let mut caps = Vec::new();
        if format.caps.contains(FormatCaps::SAMPLEABLE) {
            caps.push("sampleable");
        }
        if format.caps.contains(FormatCaps::LINEAR) {
            caps.push("linear");
        }
        if format.caps.contains(FormatCaps::STORABLE) {
            caps.push("storable");
        }
        println!("  {:<12} {}", format.name, caps.join(", "));
    }
    Ok(())
}

fn print_program(program: &ShaderProgram) {
    match program.stage {
        ShaderStage::Compute { workgroup_size } => {
            let [gx, gy] = program.dispatch_size().unwrap_or([0, 0]);
            println!(
                "// compute, workgroup {}x{}, dispatch {}x{}",
                workgroup_size[0], workgroup_size[1], gx, gy
            );
        }
        ShaderStage::Fragment => println!("// fragment"),
    }
    println!(
        "// output {}x{}",
        program.output_size.0, program.output_size.1
    );
    for binding in &program.bindings {
        let resource = match &binding.resource {
            BindingResource::Texture(id) => format!("texture #{}", id.0),
            BindingResource::Sampler {
                sample_mode,
                address_mode,
            } => format!("sampler {:?}/{:?}", sample_mode, address_mode),
            BindingResource::UniformF32(v) => format!("uniform f32 = {}", v),
            BindingResource::OutputImage { format } => format!("storage image {}", format),
        };
        println!(
            "// @group({}) @binding({}) {}: {}",
            binding.group, binding.binding, binding.name, resource
        );
    }
    println!();
    print!("{}", program.source);
}
