use crate::core::cycles::{nan_rms, nan_rms_difference};
use crate::types::{
    Category, CorrectionError, CorrectionResult, CyclesField, LabelRaster, RealRaster, Thresholds,
};
use std::collections::BTreeMap;

/// RMS values (in cycles) gathered while deciding one interferogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionStats {
    /// RMS of the bias-free residual
    pub rms: f64,
    /// RMS after subtracting the per-pixel nearest integer
    pub rms_integer: f64,
    /// RMS after subtracting the per-component mode
    pub rms_mode: f64,
}

/// Fields produced by an accepted integer-cycle correction
#[derive(Debug, Clone)]
pub struct Correction {
    pub corrected_unw: RealRaster,
    pub cycles: CyclesField,
    pub integer_field: RealRaster,
    pub mode_field: RealRaster,
    pub stats: CorrectionStats,
}

/// Result of the first two gates, which only need the cycles field
#[derive(Debug, Clone)]
pub enum Screening {
    /// RMS already below the correction threshold
    Good { rms: f64 },
    /// Even per-pixel rounding cannot reach the target threshold
    Bad { rms: f64, rms_integer: f64 },
    /// Correction is possible; the component stage decides how
    NeedsCorrection {
        rms: f64,
        rms_integer: f64,
        integer_field: RealRaster,
    },
}

/// Correction outcome for one interferogram
#[derive(Debug, Clone)]
pub enum Outcome {
    Good { rms: f64 },
    Bad { rms: f64, rms_integer: f64 },
    ModeCorrected(Correction),
    IntegerCorrected(Correction),
}

impl Outcome {
    pub fn category(&self) -> Category {
        match self {
            Outcome::Good { .. } => Category::Good,
            Outcome::Bad { .. } => Category::Bad,
            Outcome::ModeCorrected(_) => Category::ModeCorrected,
            Outcome::IntegerCorrected(_) => Category::IntegerCorrected,
        }
    }

    pub fn correction(&self) -> Option<&Correction> {
        match self {
            Outcome::ModeCorrected(c) | Outcome::IntegerCorrected(c) => Some(c),
            _ => None,
        }
    }
}

/// Nearest integer cycle count per pixel, ties to even; NaN stays NaN
pub fn nearest_integer(cycles: &CyclesField) -> RealRaster {
    cycles.mapv(f32::round_ties_even)
}

/// Statistical mode of every positive component label.
///
/// Only pixels with a defined integer value take part. Among equally
/// frequent values the smallest wins. A label with no valid pixel maps to
/// `None`.
pub fn component_modes(
    integer_field: &RealRaster,
    components: &LabelRaster,
) -> CorrectionResult<BTreeMap<i8, Option<i32>>> {
    check_shape("component label", integer_field, components.dim())?;

    let mut histograms: BTreeMap<i8, BTreeMap<i32, usize>> = BTreeMap::new();
    for (&label, &value) in components.iter().zip(integer_field.iter()) {
        if label <= 0 {
            continue;
        }
        let counts = histograms.entry(label).or_default();
        if !value.is_nan() {
            *counts.entry(value as i32).or_insert(0) += 1;
        }
    }

    let modes = histograms
        .into_iter()
        .map(|(label, counts)| {
            let mut best: Option<(i32, usize)> = None;
            for (value, count) in counts {
                if best.map_or(true, |(_, c)| count > c) {
                    best = Some((value, count));
                }
            }
            (label, best.map(|(value, _)| value))
        })
        .collect();

    Ok(modes)
}

/// Per-pixel integer field with every labelled component set to its mode
pub fn mode_field(
    integer_field: &RealRaster,
    components: &LabelRaster,
) -> CorrectionResult<RealRaster> {
    let modes = component_modes(integer_field, components)?;
    for (label, mode) in &modes {
        if mode.is_none() {
            log::warn!(
                "Component {} has no valid residual pixel, keeping per-pixel integers",
                label
            );
        }
    }

    let mut field = integer_field.clone();
    for (value, &label) in field.iter_mut().zip(components.iter()) {
        if let Some(Some(mode)) = modes.get(&label) {
            *value = *mode as f32;
        }
    }
    Ok(field)
}

/// Subtract whole cycles from an unwrapped phase raster
pub fn subtract_cycles(unw: &RealRaster, cycles: &RealRaster) -> RealRaster {
    let two_pi = 2.0 * std::f32::consts::PI;
    let mut corrected = unw.clone();
    for (u, &c) in corrected.iter_mut().zip(cycles.iter()) {
        *u -= c * two_pi;
    }
    corrected
}

fn check_shape(name: &str, reference: &RealRaster, dim: (usize, usize)) -> CorrectionResult<()> {
    if reference.dim() != dim {
        return Err(CorrectionError::Processing(format!(
            "{} raster is {}x{}, residual is {}x{}",
            name,
            dim.0,
            dim.1,
            reference.dim().0,
            reference.dim().1
        )));
    }
    Ok(())
}

/// Per-interferogram correction decision at fixed thresholds
#[derive(Debug, Clone, Copy)]
pub struct CorrectionDecider {
    thresholds: Thresholds,
}

impl CorrectionDecider {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Run the gates that depend on the cycles field alone
    pub fn screen(&self, cycles: &CyclesField) -> Screening {
        let rms = nan_rms(cycles.iter().copied());
        if rms < self.thresholds.correction {
            return Screening::Good { rms };
        }

        let integer_field = nearest_integer(cycles);
        let rms_integer = nan_rms_difference(cycles, &integer_field);
        // NaN fails this gate too
        if !(rms_integer <= self.thresholds.target) {
            return Screening::Bad { rms, rms_integer };
        }

        Screening::NeedsCorrection {
            rms,
            rms_integer,
            integer_field,
        }
    }

    /// Choose between component-mode and nearest-integer correction
    pub fn correct(
        &self,
        cycles: CyclesField,
        integer_field: RealRaster,
        components: &LabelRaster,
        unw: &RealRaster,
        rms: f64,
        rms_integer: f64,
    ) -> CorrectionResult<Outcome> {
        check_shape("unwrapped phase", &cycles, unw.dim())?;
        let mode_field = mode_field(&integer_field, components)?;
        let rms_mode = nan_rms_difference(&cycles, &mode_field);
        let stats = CorrectionStats {
            rms,
            rms_integer,
            rms_mode,
        };

        if rms_mode < self.thresholds.target {
            log::debug!(
                "Component modes reduce RMS to {:.2}, below target {:.2}",
                rms_mode,
                self.thresholds.target
            );
            let corrected_unw = subtract_cycles(unw, &mode_field);
            Ok(Outcome::ModeCorrected(Correction {
                corrected_unw,
                cycles,
                integer_field,
                mode_field,
                stats,
            }))
        } else {
            log::debug!(
                "Component modes reduce RMS to {:.2}, above target {:.2}; nearest integer reaches {:.2}",
                rms_mode,
                self.thresholds.target,
                rms_integer
            );
            let corrected_unw = subtract_cycles(unw, &integer_field);
            Ok(Outcome::IntegerCorrected(Correction {
                corrected_unw,
                cycles,
                integer_field,
                mode_field,
                stats,
            }))
        }
    }

    /// Full decision for one interferogram
    pub fn decide(
        &self,
        cycles: CyclesField,
        components: &LabelRaster,
        unw: &RealRaster,
    ) -> CorrectionResult<Outcome> {
        match self.screen(&cycles) {
            Screening::Good { rms } => Ok(Outcome::Good { rms }),
            Screening::Bad { rms, rms_integer } => Ok(Outcome::Bad { rms, rms_integer }),
            Screening::NeedsCorrection {
                rms,
                rms_integer,
                integer_field,
            } => self.correct(cycles, integer_field, components, unw, rms, rms_integer),
        }
    }
}

/// Decide one interferogram with explicit thresholds
pub fn decide(
    cycles: CyclesField,
    components: &LabelRaster,
    unw: &RealRaster,
    correction_thresh: f64,
    target_thresh: f64,
) -> CorrectionResult<Outcome> {
    CorrectionDecider::new(Thresholds::new(correction_thresh, target_thresh))
        .decide(cycles, components, unw)
}
