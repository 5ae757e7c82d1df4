use crate::types::{CorrectionError, CorrectionResult, Thresholds};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const SPEED_OF_LIGHT: f64 = 299_792_458.0; // m/s

/// Look up `key` in a whitespace separated parameter file.
///
/// Lines look like `range_samples:   1000` or `RMS_thresh: 0.25`; the first
/// token (with an optional trailing colon) is the key and the second the
/// value.
pub fn read_param<P: AsRef<Path>>(path: P, key: &str) -> CorrectionResult<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    find_param(&content, key).ok_or_else(|| {
        CorrectionError::Configuration(format!("{} not found in {}", key, path.display()))
    })
}

fn find_param(content: &str, key: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        let name = tokens.next()?.trim_end_matches(':');
        if name == key {
            tokens.next().map(str::to_string)
        } else {
            None
        }
    })
}

pub fn read_param_as<T: FromStr, P: AsRef<Path>>(path: P, key: &str) -> CorrectionResult<T> {
    let path = path.as_ref();
    let raw = read_param(path, key)?;
    raw.parse::<T>().map_err(|_| {
        CorrectionError::Configuration(format!(
            "Invalid value '{}' for {} in {}",
            raw,
            key,
            path.display()
        ))
    })
}

/// Raster dimensions and radar frequency of a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageGeometry {
    /// Range samples per line
    pub width: usize,
    /// Azimuth lines
    pub length: usize,
    /// Hz (5.405e9 for Sentinel-1 C-band)
    pub radar_frequency: f64,
}

impl ImageGeometry {
    /// Read `range_samples`, `azimuth_lines` and `radar_frequency` from a
    /// `slc.mli.par` style file
    pub fn from_par_file<P: AsRef<Path>>(path: P) -> CorrectionResult<Self> {
        let path = path.as_ref();
        log::info!("Reading image geometry from {}", path.display());
        let geometry = Self {
            width: read_param_as(path, "range_samples")?,
            length: read_param_as(path, "azimuth_lines")?,
            radar_frequency: read_param_as(path, "radar_frequency")?,
        };
        if geometry.width == 0 || geometry.length == 0 || !(geometry.radar_frequency > 0.0) {
            return Err(CorrectionError::Configuration(format!(
                "Degenerate geometry in {}: {:?}",
                path.display(),
                geometry
            )));
        }
        log::debug!("Image geometry: {:?}", geometry);
        Ok(geometry)
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.length, self.width)
    }

    /// Radar wavelength in metres
    pub fn wavelength(&self) -> f64 {
        SPEED_OF_LIGHT / self.radar_frequency
    }

    /// Radians to line-of-sight millimetres
    pub fn coef_r2m(&self) -> f64 {
        -self.wavelength() / 4.0 / std::f64::consts::PI * 1000.0
    }
}

/// Which statistic of the residual threshold file becomes the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetSelection {
    Mode,
    Median,
    Mean,
    #[default]
    Thresh,
}

impl TargetSelection {
    pub fn key(&self) -> &'static str {
        match self {
            TargetSelection::Mode => "RMS_mode",
            TargetSelection::Median => "RMS_median",
            TargetSelection::Mean => "RMS_mean",
            TargetSelection::Thresh => "RMS_thresh",
        }
    }
}

impl fmt::Display for TargetSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetSelection::Mode => "mode",
            TargetSelection::Median => "median",
            TargetSelection::Mean => "mean",
            TargetSelection::Thresh => "thresh",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TargetSelection {
    type Err = CorrectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mode" => Ok(TargetSelection::Mode),
            "median" => Ok(TargetSelection::Median),
            "mean" => Ok(TargetSelection::Mean),
            "thresh" => Ok(TargetSelection::Thresh),
            _ => Err(CorrectionError::Configuration(format!(
                "Invalid target threshold selection: {}",
                s
            ))),
        }
    }
}

/// Where the initial thresholds come from
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdSource {
    /// Same value for correction and target
    Explicit(f64),
    /// `RMS_thresh` for correction, the selected statistic for target
    File {
        path: PathBuf,
        target: TargetSelection,
    },
}

impl ThresholdSource {
    /// Explicit override when given, otherwise the threshold file
    pub fn new(explicit: Option<f64>, file: PathBuf, target: TargetSelection) -> Self {
        match explicit {
            Some(value) => ThresholdSource::Explicit(value),
            None => ThresholdSource::File { path: file, target },
        }
    }

    pub fn resolve(&self) -> CorrectionResult<Thresholds> {
        let thresholds = match self {
            ThresholdSource::Explicit(value) => Thresholds::new(*value, *value),
            ThresholdSource::File { path, target } => {
                if !path.exists() {
                    return Err(CorrectionError::Configuration(format!(
                        "No input threshold and no threshold file {}",
                        path.display()
                    )));
                }
                Thresholds::new(
                    read_param_as(path, TargetSelection::Thresh.key())?,
                    read_param_as(path, target.key())?,
                )
            }
        };
        log::info!("Correction threshold = {:.2}", thresholds.correction);
        log::info!("Target threshold = {:.2}", thresholds.target);
        Ok(thresholds)
    }
}
