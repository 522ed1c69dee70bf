//! Analysis windows
//!
//! Periodic (DFT-even) windows, selected by name on the command line, and
//! centered zero-padding of a short window up to the FFT size.

use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Window function applied to each STFT frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Hann,
    Hamming,
    Blackman,
    Bartlett,
    Boxcar,
}

impl WindowKind {
    /// Periodic window of length `len`
    pub fn coefficients(&self, len: usize) -> Vec<f32> {
        if len == 0 {
            return Vec::new();
        }
        let n = len as f32;
        (0..len)
            .map(|i| {
                let x = i as f32;
                match self {
                    WindowKind::Hann => 0.5 - 0.5 * (2.0 * PI * x / n).cos(),
                    WindowKind::Hamming => 0.54 - 0.46 * (2.0 * PI * x / n).cos(),
                    WindowKind::Blackman => {
                        0.42 - 0.5 * (2.0 * PI * x / n).cos() + 0.08 * (4.0 * PI * x / n).cos()
                    }
                    WindowKind::Bartlett => 1.0 - (2.0 * x / n - 1.0).abs(),
                    WindowKind::Boxcar => 1.0,
                }
            })
            .collect()
    }

    /// Window of `win_length` samples centered inside `n_fft` zeros
    pub fn padded(&self, win_length: usize, n_fft: usize) -> Vec<f32> {
        pad_center(&self.coefficients(win_length), n_fft)
    }

    pub fn name(&self) -> &'static str {
        match self {
            WindowKind::Hann => "hann",
            WindowKind::Hamming => "hamming",
            WindowKind::Blackman => "blackman",
            WindowKind::Bartlett => "bartlett",
            WindowKind::Boxcar => "boxcar",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindowKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hann" | "hanning" => Ok(WindowKind::Hann),
            "hamming" => Ok(WindowKind::Hamming),
            "blackman" => Ok(WindowKind::Blackman),
            "bartlett" | "triangle" => Ok(WindowKind::Bartlett),
            "boxcar" | "rect" | "rectangular" | "ones" => Ok(WindowKind::Boxcar),
            _ => Err(EvalError::UnknownWindow {
                name: s.to_string(),
            }),
        }
    }
}

/// Center `data` inside a zero vector of length `size`
///
/// Data longer than `size` is returned unchanged.
pub fn pad_center(data: &[f32], size: usize) -> Vec<f32> {
    if data.len() >= size {
        return data.to_vec();
    }
    let lpad = (size - data.len()) / 2;
    let mut out = vec![0.0; size];
    out[lpad..lpad + data.len()].copy_from_slice(data);
    out
}
