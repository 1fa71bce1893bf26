//! Spectrum reconstruction - DC removal, chirp linearization and inverse FFT
//!
//! The detector samples the spectrum at wavenumbers that are not evenly
//! spaced. The chirp curve maps each acquired column to its position on a
//! uniform grid; resampling onto that grid before the inverse transform
//! yields the depth profile of every row.

use crate::decode::SpectralVolume;
use crate::error::{OctError, Result};
use crate::types::DecodedArray;
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use num_complex::Complex;
use rustfft::FftPlanner;
use serde::Serialize;

/// Intermediate and final arrays of one reconstruction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconstruction {
    /// Scan rows minus the per-column apodization mean
    pub corrected: Array2<f64>,
    /// `corrected` resampled onto the uniform grid `0..size_z`
    pub linearized: Array2<f64>,
    /// `log10(|ifft(linearized)|)` along each row
    pub image: Array2<f64>,
}

/// Check that a chirp is strictly increasing, the precondition of
/// [`linearize_and_transform`]
pub fn chirp_is_monotonic(chirp: ArrayView1<'_, f64>) -> bool {
    chirp.windows(2).into_iter().all(|w| w[1] > w[0])
}

/// Per-column mean of the apodization rows
pub fn dc_profile(apo: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
    apo.mean_axis(Axis(0)).ok_or_else(|| {
        OctError::InvalidDimensions("apodization block has no rows".to_string())
    })
}

/// Remove the DC profile, linearize against `chirp` and transform.
///
/// `chirp` must be strictly increasing and cover every integer coordinate in
/// `0..size_z`; the interpolant is never extrapolated.
pub fn linearize_and_transform(
    scan: ArrayView2<'_, f64>,
    apo: ArrayView2<'_, f64>,
    chirp: ArrayView1<'_, f64>,
) -> Result<Reconstruction> {
    let columns = scan.ncols();
    if apo.ncols() != columns {
        return Err(OctError::InvalidDimensions(format!(
            "scan has {} columns but apodization has {}",
            columns,
            apo.ncols()
        )));
    }
    if chirp.len() != columns {
        return Err(OctError::CalibrationLengthMismatch {
            chirp_len: chirp.len(),
            columns,
        });
    }
    if columns == 0 {
        return Err(OctError::InvalidDimensions("scan has no columns".to_string()));
    }

    let dc = dc_profile(apo)?;
    let corrected = &scan - &dc;
    let linearized = resample(&corrected, chirp)?;
    let image = inverse_transform_log(&linearized);

    Ok(Reconstruction {
        corrected,
        linearized,
        image,
    })
}

/// Reconstruct one frame of a stacked volume.
///
/// Frame `n` holds channel `n`; only the rows and columns that channel filled
/// are used. A channel without apodization rows takes them from the first
/// channel that has some, as in containers whose channel 0 is apodization
/// only. `chirp` is the decoded `Chirp` member; its first row is used.
pub fn reconstruct_frame(
    volume: &SpectralVolume,
    frame: usize,
    chirp: &DecodedArray,
) -> Result<Reconstruction> {
    let layout = volume.channels.get(frame).ok_or_else(|| {
        OctError::InvalidDimensions(format!(
            "frame {} holds no channel ({} decoded)",
            frame,
            volume.channel_count()
        ))
    })?;
    let scan_rows = layout.plan.scan_rows().ok_or_else(|| {
        OctError::InvalidDimensions(format!("{} has no scan rows", layout.logical_name))
    })?;
    let (apo_layout, apo_rows) = layout
        .plan
        .apo_rows()
        .map(|rows| (layout, rows))
        .or_else(|| {
            volume
                .channels
                .iter()
                .find_map(|c| c.plan.apo_rows().map(|rows| (c, rows)))
        })
        .ok_or_else(|| {
            OctError::InvalidDimensions("volume has no apodization rows".to_string())
        })?;
    if apo_layout.channel != layout.channel {
        log::debug!(
            "{} uses apodization rows of {}",
            layout.logical_name,
            apo_layout.logical_name
        );
    }

    let chirp = chirp.to_f64();
    if chirp.nrows() == 0 {
        return Err(OctError::CalibrationLengthMismatch {
            chirp_len: 0,
            columns: layout.size_z,
        });
    }
    let scan = volume.scan.to_f64();
    let apo = volume.apo.to_f64();
    linearize_and_transform(
        filled_block(&scan, layout.channel, scan_rows.len(), layout.size_z)?,
        filled_block(&apo, apo_layout.channel, apo_rows.len(), apo_layout.size_z)?,
        chirp.row(0),
    )
}

/// Leading `rows x cols` block of one outer index
fn filled_block(
    volume: &Array3<f64>,
    outer: usize,
    rows: usize,
    cols: usize,
) -> Result<ArrayView2<'_, f64>> {
    let (frames, max_rows, max_cols) = volume.dim();
    if outer >= frames || rows > max_rows || cols > max_cols {
        return Err(OctError::InvalidDimensions(format!(
            "block {} x {} at frame {} exceeds volume {} x {} x {}",
            rows, cols, outer, frames, max_rows, max_cols
        )));
    }
    Ok(volume.slice(s![outer, ..rows, ..cols]))
}

/// Bracketing node and weight for one target coordinate
#[derive(Debug, Clone, Copy)]
struct Knot {
    lower: usize,
    weight: f64,
}

fn knots(chirp: ArrayView1<'_, f64>, targets: usize) -> Result<Vec<Knot>> {
    let nodes: Vec<f64> = chirp.iter().cloned().collect();
    let last = nodes.len() - 1;
    let (min, max) = (nodes[0], nodes[last]);

    (0..targets)
        .map(|j| {
            let x = j as f64;
            let above = nodes.partition_point(|&node| node <= x);
            if above == 0 || (above > last && x > max) {
                return Err(OctError::CalibrationRange { value: x, min, max });
            }
            if above > last {
                return Ok(Knot {
                    lower: last,
                    weight: 0.0,
                });
            }
            let lower = above - 1;
            let span = nodes[above] - nodes[lower];
            let weight = if span > 0.0 {
                (x - nodes[lower]) / span
            } else {
                0.0
            };
            Ok(Knot { lower, weight })
        })
        .collect()
}

fn resample(corrected: &Array2<f64>, chirp: ArrayView1<'_, f64>) -> Result<Array2<f64>> {
    let columns = corrected.ncols();
    let knots = knots(chirp, columns)?;
    let mut linearized = Array2::zeros(corrected.raw_dim());

    for (src, mut dst) in corrected.rows().into_iter().zip(linearized.rows_mut()) {
        for (out, knot) in dst.iter_mut().zip(&knots) {
            let y0 = src[knot.lower];
            *out = if knot.weight == 0.0 {
                y0
            } else {
                y0 + knot.weight * (src[knot.lower + 1] - y0)
            };
        }
    }
    Ok(linearized)
}

fn inverse_transform_log(linearized: &Array2<f64>) -> Array2<f64> {
    let n = linearized.ncols();
    let mut planner = FftPlanner::<f64>::new();
    let ifft = planner.plan_fft_inverse(n);
    let scale = 1.0 / n as f64;

    let mut image = Array2::zeros(linearized.raw_dim());
    let mut buffer = vec![Complex::new(0.0, 0.0); n];
    for (src, mut dst) in linearized.rows().into_iter().zip(image.rows_mut()) {
        for (b, v) in buffer.iter_mut().zip(src.iter()) {
            *b = Complex::new(*v, 0.0);
        }
        ifft.process(&mut buffer);
        for (out, c) in dst.iter_mut().zip(&buffer) {
            *out = (c.norm() * scale).log10();
        }
    }
    image
}
