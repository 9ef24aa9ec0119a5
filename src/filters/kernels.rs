// SPDX-License-Identifier: GPL-3.0-only

//! Radial kernel functions

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// First zero of jinc, used as the window radius of EWA Lanczos
pub const JINC_ZERO_1: f32 = 1.219_669_9;
/// Third zero of jinc, the default support of a jinc kernel
pub const JINC_ZERO_3: f32 = 3.238_315_5;
/// First zero of sphinx
pub const SPHINX_ZERO_1: f32 = 1.430_296_7;

/// A 1D weight function of distance, defined on `[0, radius]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KernelFunction {
    Box,
    Triangle,
    Gaussian { sigma: f32 },
    Sinc { radius: f32 },
    Jinc { radius: f32 },
    Sphinx { radius: f32 },
}

impl KernelFunction {
    /// Support of the kernel
    pub fn radius(&self) -> f32 {
        match *self {
            KernelFunction::Box | KernelFunction::Triangle => 1.0,
            KernelFunction::Gaussian { .. } => 2.0,
            KernelFunction::Sinc { radius }
            | KernelFunction::Jinc { radius }
            | KernelFunction::Sphinx { radius } => radius,
        }
    }

    /// Evaluate at distance `x` (in kernel units). Zero outside the support.
    pub fn eval(&self, x: f64) -> f64 {
        let x = x.abs();
        if x > self.radius() as f64 {
            return 0.0;
        }

        match *self {
            KernelFunction::Box => 1.0,
            KernelFunction::Triangle => 1.0 - x,
            KernelFunction::Gaussian { sigma } => (-2.0 * x * x / sigma as f64).exp(),
            KernelFunction::Sinc { .. } => {
                if x < 1e-8 {
                    1.0
                } else {
                    let px = PI * x;
                    px.sin() / px
                }
            }
            KernelFunction::Jinc { .. } => {
                if x < 1e-8 {
                    1.0
                } else {
                    let px = PI * x;
                    2.0 * bessel_j1(px) / px
                }
            }
            KernelFunction::Sphinx { .. } => {
                if x < 1e-8 {
                    1.0
                } else {
                    let px = PI * x;
                    3.0 * (px.sin() - px * px.cos()) / (px * px * px)
                }
            }
        }
    }
}

/// Bessel function of the first kind, order one (rational approximation)
fn bessel_j1(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 8.0 {
        let y = x * x;
        let num = x
            * (72362614232.0
                + y * (-7895059235.0
                    + y * (242396853.1
                        + y * (-2972611.439 + y * (15704.48260 + y * (-30.16036606))))));
        let den = 144725228442.0
            + y * (2300535178.0 + y * (18583304.74 + y * (99447.43394 + y * (376.9991397 + y))));
        num / den
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 2.356194491;
        let p = 1.0
            + y * (0.183105e-2
                + y * (-0.3516396496e-4 + y * (0.2457520174e-5 + y * (-0.240337019e-6))));
        let q = 0.04687499995
            + y * (-0.2002690873e-3
                + y * (0.8449199096e-5 + y * (-0.88228987e-6 + y * 0.105787412e-6)));
        let ans = (0.636619772 / ax).sqrt() * (xx.cos() * p - z * xx.sin() * q);
        if x < 0.0 { -ans } else { ans }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jinc_zeros() {
        let jinc = KernelFunction::Jinc {
            radius: JINC_ZERO_3,
        };
        assert!((jinc.eval(0.0) - 1.0).abs() < 1e-9);
        assert!(jinc.eval(JINC_ZERO_1 as f64).abs() < 1e-4);
        assert!(jinc.eval(JINC_ZERO_3 as f64).abs() < 1e-4);
        // First side lobe is negative
        assert!(jinc.eval(1.6) < 0.0);
    }

    #[test]
    fn test_zero_outside_support() {
        assert_eq!(KernelFunction::Triangle.eval(1.5), 0.0);
        assert_eq!(KernelFunction::Box.eval(-0.5), 1.0);
        assert_eq!(KernelFunction::Gaussian { sigma: 1.0 }.eval(2.5), 0.0);
    }

    #[test]
    fn test_sphinx_first_zero() {
        let sphinx = KernelFunction::Sphinx {
            radius: SPHINX_ZERO_1,
        };
        assert!(sphinx.eval(SPHINX_ZERO_1 as f64 - 1e-3).abs() < 1e-2);
    }
}
