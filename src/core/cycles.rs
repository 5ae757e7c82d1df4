use crate::io::par_file::ImageGeometry;
use crate::types::{CyclesField, RealRaster};
use num_traits::Float;

/// Fixed-width histogram over explicit bin edges `start + i * delta`.
///
/// `delta` is the width as seen from `start`, `(start + width) - start`, so
/// the edges carry the same rounding as an arange over `[start, stop)`. With
/// `start = -2.5` the edge near zero lies just above it, and an exact zero
/// falls in the bin left of it. Values outside `[first edge, last edge]` and NaNs are not counted; the
/// last bin is closed on the right.
#[derive(Debug, Clone)]
pub struct Histogram {
    edges: Vec<f64>,
    counts: Vec<usize>,
}

impl Histogram {
    /// Histogram with `n_edges` edges (and `n_edges - 1` bins)
    pub fn new(start: f64, width: f64, n_edges: usize) -> Self {
        let delta = (start + width) - start;
        let edges: Vec<f64> = (0..n_edges).map(|i| start + i as f64 * delta).collect();
        let counts = vec![0; n_edges.saturating_sub(1)];
        Self { edges, counts }
    }

    /// Bins of 0.1 cycles covering [-2.5, 2.5] used for residual bias removal
    pub fn residual_cycles() -> Self {
        Self::new(-2.5, 0.1, 51)
    }

    pub fn accumulate<T: Float>(&mut self, values: impl IntoIterator<Item = T>) {
        let (first, last) = match (self.edges.first(), self.edges.last()) {
            (Some(&f), Some(&l)) if !self.counts.is_empty() => (f, l),
            _ => return,
        };
        for value in values {
            let v = match value.to_f64() {
                Some(v) if !v.is_nan() => v,
                _ => continue,
            };
            if v < first || v > last {
                continue;
            }
            let upper = self.edges.partition_point(|&e| e <= v);
            let bin = upper.saturating_sub(1).min(self.counts.len() - 1);
            self.counts[bin] += 1;
        }
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Left edge of the first most populated bin
    pub fn peak_left_edge(&self) -> f64 {
        let mut best = 0;
        for (i, &c) in self.counts.iter().enumerate() {
            if c > self.counts[best] {
                best = i;
            }
        }
        self.edges.get(best).copied().unwrap_or(0.0)
    }

    /// Centre of the dominant bin, assuming the bin width is 0.1
    pub fn peak_center(&self) -> f64 {
        self.peak_left_edge() + 0.05
    }
}

/// Root mean square over the finite-or-infinite (non-NaN) values.
///
/// Returns NaN when no value is available.
pub fn nan_rms<T: Float>(values: impl IntoIterator<Item = T>) -> f64 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for v in values {
        if let Some(v) = v.to_f64() {
            if !v.is_nan() {
                sum += v * v;
                count += 1;
            }
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        (sum / count as f64).sqrt()
    }
}

/// Percentile `q` (0-100) of the non-NaN values with linear interpolation
/// between closest ranks. NaN when no value is available.
pub fn nan_percentile<T: Float>(values: impl IntoIterator<Item = T>, q: f64) -> f64 {
    let mut sorted: Vec<f64> = values
        .into_iter()
        .filter_map(|v| v.to_f64())
        .filter(|v| !v.is_nan())
        .collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    if lower == upper {
        sorted[lower]
    } else {
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

/// RMS of `a - b` over pixels where the difference is defined
pub fn nan_rms_difference(a: &RealRaster, b: &RealRaster) -> f64 {
    nan_rms(a.iter().zip(b.iter()).map(|(&x, &y)| x - y))
}

/// A residual raster converted to cycles with its global bias removed
#[derive(Debug, Clone)]
pub struct CycleField {
    pub cycles: CyclesField,
    /// Bias (in cycles) that was subtracted
    pub peak: f64,
    pub rms: f64,
}

/// Converts residual rasters (mm) into bias-free cycle fields
#[derive(Debug, Clone, Copy)]
pub struct CycleFieldBuilder {
    coef_r2m: f64,
}

impl CycleFieldBuilder {
    pub fn new(coef_r2m: f64) -> Self {
        Self { coef_r2m }
    }

    pub fn from_geometry(geometry: &ImageGeometry) -> Self {
        Self::new(geometry.coef_r2m())
    }

    pub fn coef_r2m(&self) -> f64 {
        self.coef_r2m
    }

    /// Convert a residual raster to cycles and remove the histogram-mode bias
    pub fn build(&self, residual_mm: &RealRaster) -> CycleField {
        let coef = self.coef_r2m as f32;
        let pi = std::f32::consts::PI;
        let raw = residual_mm.mapv(|r| r / coef / 2.0 / pi);

        let mut histogram = Histogram::residual_cycles();
        histogram.accumulate(raw.iter().copied());
        let peak = histogram.peak_center();

        let shift = peak as f32;
        let cycles = raw.mapv(|c| c - shift);
        let rms = nan_rms(cycles.iter().copied());

        log::debug!("Residual bias {:.2} cycles removed, RMS = {:.3}", peak, rms);

        CycleField { cycles, peak, rms }
    }
}

/// `(cycles, rms)` for a residual raster in mm
pub fn build_cycles(residual_mm: &RealRaster, coef_r2m: f64) -> (CyclesField, f64) {
    let field = CycleFieldBuilder::new(coef_r2m).build(residual_mm);
    (field.cycles, field.rms)
}
