// SPDX-License-Identifier: GPL-3.0-only

//! Error types for shader generation and LUT management

use std::fmt;
use tracing::{error, info, warn};

/// Result type alias using SamplingError
pub type SamplingResult<T> = Result<T, SamplingError>;

/// Failures reported by the sampling shader generators
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingError {
    /// Filter configuration not usable for the requested operation
    Config(String),
    /// Request exceeds a device limit
    Capability {
        /// What was requested (e.g. LUT entries)
        requested: u32,
        /// The device limit that was exceeded
        limit: u32,
    },
    /// No texture format with the required capabilities
    Format(String),
    /// Texture allocation or filter generation failed
    Resource(String),
    /// Shader signature or output dimension mismatch
    Precondition(String),
    /// Configuration file could not be read or parsed
    Settings(String),
}

impl SamplingError {
    /// Emit this error at the severity matching how actionable it is for the caller
    pub fn log(&self) {
        match self {
            SamplingError::Config(_)
            | SamplingError::Capability { .. }
            | SamplingError::Resource(_)
            | SamplingError::Settings(_) => error!("{}", self),
            SamplingError::Format(_) => warn!("{}", self),
            SamplingError::Precondition(_) => info!("{}", self),
        }
    }
}

impl fmt::Display for SamplingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SamplingError::Capability { requested, limit } => write!(
                f,
                "LUT of size {} exceeds the max 1D texture dimension ({})",
                requested, limit
            ),
            SamplingError::Format(msg) => write!(f, "Format error: {}", msg),
            SamplingError::Resource(msg) => write!(f, "Resource error: {}", msg),
            SamplingError::Precondition(msg) => write!(f, "Precondition failed: {}", msg),
            SamplingError::Settings(msg) => write!(f, "Settings error: {}", msg),
        }
    }
}

impl std::error::Error for SamplingError {}
