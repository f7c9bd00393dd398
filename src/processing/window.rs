// Copyright 2026 QubitOS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Window functions.
//!
//! Symmetric windows over `N` samples, using `N - 1` in the denominator.
//! A one-sample window has weight 1.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Per-sample multiplicative weighting applied before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    /// All weights 1.
    #[default]
    None,
    /// Raised cosine reaching zero at both ends.
    Hann,
    /// Raised cosine with 0.08 pedestal.
    Hamming,
    /// Three-term cosine window.
    Blackman,
}

impl WindowFunction {
    /// All window functions.
    pub const ALL: [WindowFunction; 4] = [
        WindowFunction::None,
        WindowFunction::Hann,
        WindowFunction::Hamming,
        WindowFunction::Blackman,
    ];

    /// Weights for `n` samples.
    pub fn weights(self, n: usize) -> Vec<f64> {
        if n <= 1 || self == WindowFunction::None {
            return vec![1.0; n];
        }
        let denom = (n - 1) as f64;
        (0..n)
            .map(|i| {
                let x = 2.0 * PI * i as f64 / denom;
                match self {
                    WindowFunction::None => 1.0,
                    WindowFunction::Hann => 0.5 - 0.5 * x.cos(),
                    WindowFunction::Hamming => 0.54 - 0.46 * x.cos(),
                    WindowFunction::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
                }
            })
            .collect()
    }
}

impl fmt::Display for WindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WindowFunction::None => "none",
            WindowFunction::Hann => "hann",
            WindowFunction::Hamming => "hamming",
            WindowFunction::Blackman => "blackman",
        };
        write!(f, "{name}")
    }
}

impl FromStr for WindowFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "rect" | "rectangular" => Ok(WindowFunction::None),
            "hann" | "hanning" => Ok(WindowFunction::Hann),
            "hamming" => Ok(WindowFunction::Hamming),
            "blackman" => Ok(WindowFunction::Blackman),
            other => Err(Error::Config(format!("unknown window function '{other}'"))),
        }
    }
}
