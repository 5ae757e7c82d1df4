//! unwcorr: Residual-driven 2π unwrapping-error correction for InSAR time series
//!
//! Interferograms whose time-series residual shows whole-cycle misclosure are
//! corrected per connected component (or per pixel), discarded when no
//! integer correction brings the residual under the target threshold, and the
//! thresholds are relaxed until the retained network has no gap.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    Category, CategoryLists, CorrectionError, CorrectionResult, CyclesField, LabelRaster, PairId,
    RealRaster, Thresholds,
};

pub use crate::io::{FrameLayout, ImageGeometry, LayoutParams, RasterStore, ReportWriter};
pub use crate::core::{
    decide, CorrectionDecider, CorrectionPipeline, CycleFieldBuilder, Outcome, PipelineConfig,
    ThresholdEstimator, ThresholdRelaxationLoop,
};

#[cfg(feature = "python")]
mod python {
    use crate::core::cycles::build_cycles;
    use crate::core::decision::{decide, Outcome};
    use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
    use pyo3::prelude::*;

    fn to_py_err(e: crate::CorrectionError) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
    }

    /// Residual (mm) to bias-free cycles; returns `(cycles, rms)`
    #[pyfunction]
    fn cycles_from_residual<'py>(
        py: Python<'py>,
        residual: PyReadonlyArray2<'py, f32>,
        coef_r2m: f64,
    ) -> (&'py PyArray2<f32>, f64) {
        let (cycles, rms) = build_cycles(&residual.as_array().to_owned(), coef_r2m);
        (cycles.into_pyarray(py), rms)
    }

    /// Returns `(category, corrected_unw)`; the raster is `None` unless corrected
    #[pyfunction]
    #[pyo3(name = "decide")]
    fn py_decide<'py>(
        py: Python<'py>,
        cycles: PyReadonlyArray2<'py, f32>,
        components: PyReadonlyArray2<'py, i8>,
        unw: PyReadonlyArray2<'py, f32>,
        correction_thresh: f64,
        target_thresh: f64,
    ) -> PyResult<(String, Option<&'py PyArray2<f32>>)> {
        let outcome = decide(
            cycles.as_array().to_owned(),
            &components.as_array().to_owned(),
            &unw.as_array().to_owned(),
            correction_thresh,
            target_thresh,
        )
        .map_err(to_py_err)?;

        let category = outcome.category().to_string();
        let corrected = match outcome {
            Outcome::ModeCorrected(c) | Outcome::IntegerCorrected(c) => {
                Some(c.corrected_unw.into_pyarray(py))
            }
            Outcome::Good { .. } | Outcome::Bad { .. } => None,
        };
        Ok((category, corrected))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(cycles_from_residual, m)?)?;
        m.add_function(wrap_pyfunction!(py_decide, m)?)?;
        Ok(())
    }
}
