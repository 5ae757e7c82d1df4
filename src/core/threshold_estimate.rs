use crate::core::cycles::{nan_percentile, CycleFieldBuilder, Histogram};
use crate::io::layout::FrameLayout;
use crate::io::par_file::{ImageGeometry, TargetSelection};
use crate::io::raster::RasterStore;
use crate::types::{CorrectionError, CorrectionResult, PairId};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Percentile of per-pair RMS values used as the correction threshold
pub const THRESH_PERCENTILE: f64 = 80.0;

/// Distribution of per-interferogram residual RMS (in cycles)
#[derive(Debug, Clone)]
pub struct ResidualStatistics {
    pub per_pair: Vec<(PairId, f64)>,
    pub mode: f64,
    pub median: f64,
    pub mean: f64,
    pub thresh: f64,
}

impl ResidualStatistics {
    pub fn from_rms(per_pair: Vec<(PairId, f64)>) -> Self {
        let values: Vec<f64> = per_pair.iter().map(|(_, rms)| *rms).collect();

        // bins of 0.1 over [0, 2.9]
        let mut histogram = Histogram::new(0.0, 0.1, 30);
        histogram.accumulate(values.iter().copied());
        let mode = histogram.peak_center();

        let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        let mean = if finite.is_empty() {
            f64::NAN
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };

        Self {
            mode,
            median: nan_percentile(values.iter().copied(), 50.0),
            mean,
            thresh: nan_percentile(values.iter().copied(), THRESH_PERCENTILE),
            per_pair,
        }
    }

    pub fn value(&self, selection: TargetSelection) -> f64 {
        match selection {
            TargetSelection::Mode => self.mode,
            TargetSelection::Median => self.median,
            TargetSelection::Mean => self.mean,
            TargetSelection::Thresh => self.thresh,
        }
    }

    /// Threshold file content readable by the parameter file parser
    pub fn render(&self) -> String {
        let pair_lines = self
            .per_pair
            .iter()
            .map(|(pair, rms)| format!("{} {:5.2}\n", pair, rms));
        let stat_lines = [
            TargetSelection::Mode,
            TargetSelection::Median,
            TargetSelection::Mean,
            TargetSelection::Thresh,
        ]
        .into_iter()
        .map(|selection| format!("{}: {:5.2}\n", selection.key(), self.value(selection)));

        std::iter::once(String::from("# RMS of residual (in number of 2pi)\n"))
            .chain(pair_lines)
            .chain(stat_lines)
            .collect()
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> CorrectionResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())?;
        log::info!("Residual statistics saved to {}", path.display());
        Ok(())
    }
}

/// Estimates correction thresholds from the residuals of a whole frame
#[derive(Debug, Clone)]
pub struct ThresholdEstimator {
    store: RasterStore,
    builder: CycleFieldBuilder,
}

impl ThresholdEstimator {
    pub fn new(store: RasterStore, builder: CycleFieldBuilder) -> Self {
        Self { store, builder }
    }

    pub fn from_geometry(geometry: &ImageGeometry) -> Self {
        Self::new(
            RasterStore::from_geometry(geometry),
            CycleFieldBuilder::from_geometry(geometry),
        )
    }

    /// RMS of one residual file after bias removal
    pub fn residual_rms<P: AsRef<Path>>(&self, path: P) -> CorrectionResult<f64> {
        let residual = self.store.read_real(path)?;
        Ok(self.builder.build(&residual).rms)
    }

    pub fn estimate(&self, layout: &FrameLayout) -> CorrectionResult<ResidualStatistics> {
        let residuals: Vec<(PairId, PathBuf)> = layout.discover_residuals()?.into_iter().collect();
        if residuals.is_empty() {
            return Err(CorrectionError::EmptyBatch {
                location: layout.residual_dir().display().to_string(),
            });
        }
        log::info!("Reading {} residual maps", residuals.len());

        let rms_of = |(pair, path): &(PairId, PathBuf)| -> CorrectionResult<(PairId, f64)> {
            let rms = self.residual_rms(path)?;
            log::debug!("{} {:5.2}", pair, rms);
            Ok((*pair, rms))
        };

        #[cfg(feature = "parallel")]
        let per_pair = residuals
            .par_iter()
            .map(rms_of)
            .collect::<CorrectionResult<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let per_pair = residuals
            .iter()
            .map(rms_of)
            .collect::<CorrectionResult<Vec<_>>>()?;

        let stats = ResidualStatistics::from_rms(per_pair);
        log::info!(
            "IFG RMS residual, peak = {:.2}, median = {:.2}, mean = {:.2}, {}% = {:.2}",
            stats.mode,
            stats.median,
            stats.mean,
            THRESH_PERCENTILE,
            stats.thresh
        );
        Ok(stats)
    }

    /// Estimate and write the threshold file of the frame
    pub fn run(&self, layout: &FrameLayout) -> CorrectionResult<ResidualStatistics> {
        let stats = self.estimate(layout)?;
        stats.write(layout.threshold_file())?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::par_file::read_param_as;
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    fn pair(key: &str) -> PairId {
        key.parse().unwrap()
    }

    #[test]
    fn test_statistics_of_rms_values() {
        let stats = ResidualStatistics::from_rms(vec![
            (pair("20200103_20200115"), 0.12),
            (pair("20200103_20200127"), 0.14),
            (pair("20200115_20200127"), 0.31),
            (pair("20200115_20200208"), 0.45),
            (pair("20200127_20200208"), f64::NAN),
        ]);
        assert_abs_diff_eq!(stats.mode, 0.15, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.median, 0.225, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.mean, 0.255, epsilon = 1e-9);
        // rank 0.8 * 3 = 2.4 between 0.31 and 0.45
        assert_abs_diff_eq!(stats.thresh, 0.366, epsilon = 1e-9);
    }

    #[test]
    fn test_render_lists_pairs_then_statistics() {
        let stats = ResidualStatistics::from_rms(vec![(pair("20200103_20200115"), 0.2)]);
        assert_eq!(
            stats.render(),
            "# RMS of residual (in number of 2pi)\n\
             20200103_20200115  0.20\n\
             RMS_mode:  0.25\n\
             RMS_median:  0.20\n\
             RMS_mean:  0.20\n\
             RMS_thresh:  0.20\n"
        );
    }

    #[test]
    fn test_rendered_file_is_readable_as_parameters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("info").join("131resid_2pi.txt");
        let stats = ResidualStatistics::from_rms(vec![
            (pair("20200103_20200115"), 0.2),
            (pair("20200103_20200127"), 0.4),
        ]);
        stats.write(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# RMS of residual (in number of 2pi)\n"));
        assert!(content.contains("20200103_20200127  0.40\n"));

        let thresh: f64 = read_param_as(&path, "RMS_thresh").unwrap();
        assert_abs_diff_eq!(thresh, 0.36, epsilon = 1e-9);
        let median: f64 = read_param_as(&path, "RMS_median").unwrap();
        assert_abs_diff_eq!(median, 0.3, epsilon = 1e-9);
    }
}
