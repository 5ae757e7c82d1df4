//! File-backed correction of a whole frame.

use crate::core::batch::{BatchParams, BatchRunner, PairProcessor};
use crate::core::cycles::CycleFieldBuilder;
use crate::core::decision::{nearest_integer, CorrectionDecider, Screening};
use crate::core::diagnostics::{DiagnosticPlotter, NullPlotter, PngPlotter};
use crate::core::network::LinkNetworkEvaluator;
use crate::core::relaxation::{RelaxationOutcome, RelaxationParams, ThresholdRelaxationLoop};
use crate::io::baselines::Baselines;
use crate::io::layout::{FrameLayout, LayoutParams};
use crate::io::par_file::{ImageGeometry, TargetSelection, ThresholdSource};
use crate::io::raster::{link_or_copy, RasterStore};
use crate::io::reference::ReferencePoint;
use crate::io::report::ReportWriter;
use crate::types::{Category, CorrectionResult, PairId, Thresholds};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// Decides one pair from the rasters of a frame and writes its outputs
pub struct FramePairProcessor<D: DiagnosticPlotter> {
    layout: FrameLayout,
    residuals: BTreeMap<PairId, PathBuf>,
    store: RasterStore,
    builder: CycleFieldBuilder,
    plotter: D,
}

impl<D: DiagnosticPlotter> FramePairProcessor<D> {
    pub fn new(layout: FrameLayout, geometry: &ImageGeometry, plotter: D) -> Self {
        Self {
            layout,
            residuals: BTreeMap::new(),
            store: RasterStore::from_geometry(geometry),
            builder: CycleFieldBuilder::from_geometry(geometry),
            plotter,
        }
    }

    /// Read residuals from discovered files instead of `<pair>.res`
    pub fn with_residuals(mut self, residuals: BTreeMap<PairId, PathBuf>) -> Self {
        self.residuals = residuals;
        self
    }

    pub fn plotter(&self) -> &D {
        &self.plotter
    }

    fn residual_file(&self, pair: &PairId) -> PathBuf {
        self.residuals
            .get(pair)
            .cloned()
            .unwrap_or_else(|| self.layout.residual_file(pair))
    }
}

impl<D: DiagnosticPlotter> PairProcessor for FramePairProcessor<D> {
    fn process(&self, pair: &PairId, thresholds: Thresholds) -> CorrectionResult<Category> {
        let residual = self.store.read_real(self.residual_file(pair))?;
        let cycles = self.builder.build(&residual).cycles;
        let decider = CorrectionDecider::new(thresholds);

        match decider.screen(&cycles) {
            Screening::Good { rms } => {
                log::info!(
                    "{}: RMS residual = {:.2}, below correction threshold {:.2}, no correction",
                    pair,
                    rms,
                    thresholds.correction
                );
                fs::create_dir_all(self.layout.corrected_pair_dir(pair))?;
                link_or_copy(
                    self.layout.unw_file(pair),
                    self.layout.corrected_unw_file(pair),
                )?;
                self.plotter.plot_good(pair, &cycles, rms)?;
                Ok(Category::Good)
            }
            Screening::Bad { rms, rms_integer } => {
                log::info!(
                    "{}: RMS residual = {:.2}, nearest integer reduces it to {:.2}, still above {:.2}, discard",
                    pair,
                    rms,
                    rms_integer,
                    thresholds.target
                );
                let integer_field = nearest_integer(&cycles);
                self.plotter
                    .plot_bad(pair, &cycles, &integer_field, rms, rms_integer)?;
                Ok(Category::Bad)
            }
            Screening::NeedsCorrection {
                rms,
                rms_integer,
                integer_field,
            } => {
                let unw = self.store.read_real(self.layout.unw_file(pair))?;
                let components = self.store.read_labels(self.layout.conncomp_file(pair))?;
                let outcome =
                    decider.correct(cycles, integer_field, &components, &unw, rms, rms_integer)?;
                let category = outcome.category();

                if let Some(correction) = outcome.correction() {
                    log::info!(
                        "{}: RMS residual = {:.2}, integer {:.2}, component mode {:.2}, {}",
                        pair,
                        rms,
                        rms_integer,
                        correction.stats.rms_mode,
                        category
                    );
                    fs::create_dir_all(self.layout.corrected_pair_dir(pair))?;
                    self.store
                        .write_real(self.layout.corrected_unw_file(pair), &correction.corrected_unw)?;
                    self.plotter
                        .plot_correction(pair, category, &components, &unw, correction)?;
                }
                Ok(category)
            }
        }
    }

    fn input_location(&self) -> String {
        self.layout.residual_dir().display().to_string()
    }
}

/// Configuration of a frame correction run
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub layout: LayoutParams,
    /// Overrides both thresholds when set
    pub correction_thresh: Option<f64>,
    pub target: TargetSelection,
    pub batch: BatchParams,
    pub relaxation: RelaxationParams,
    /// Skip PNG diagnostics
    pub no_plot: bool,
}

/// Corrects all interferograms of a frame and writes the category reports
#[derive(Debug, Clone)]
pub struct CorrectionPipeline {
    config: PipelineConfig,
}

impl CorrectionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> CorrectionResult<RelaxationOutcome> {
        let layout = FrameLayout::new(&self.config.layout);
        let geometry = ImageGeometry::from_par_file(layout.geometry_file())?;
        let thresholds = ThresholdSource::new(
            self.config.correction_thresh,
            layout.threshold_file(),
            self.config.target,
        )
        .resolve()?;

        layout.prepare_outputs()?;
        let residuals = layout.discover_residuals()?;

        if self.config.no_plot {
            self.run_with(&layout, &geometry, residuals, thresholds, NullPlotter)
        } else {
            let reference = ReferencePoint::load_optional(layout.reference_file());
            let plotter = PngPlotter::new(layout.clone(), reference)
                .with_baselines(Baselines::load_optional(layout.baseline_file()));
            self.run_with(&layout, &geometry, residuals, thresholds, plotter)
        }
    }

    fn run_with<D: DiagnosticPlotter>(
        &self,
        layout: &FrameLayout,
        geometry: &ImageGeometry,
        residuals: BTreeMap<PairId, PathBuf>,
        thresholds: Thresholds,
        plotter: D,
    ) -> CorrectionResult<RelaxationOutcome> {
        let pairs: Vec<PairId> = residuals.keys().copied().collect();
        let processor =
            FramePairProcessor::new(layout.clone(), geometry, plotter).with_residuals(residuals);
        let reports = ReportWriter::new(layout.info_dir(), layout.suffix());
        let relaxation = ThresholdRelaxationLoop::new(
            BatchRunner::new(self.config.batch.clone()),
            LinkNetworkEvaluator,
            self.config.relaxation.clone(),
        );

        let outcome = relaxation.run(&pairs, thresholds, &processor, |record| {
            reports.write_categories(&record.categories, &record.thresholds)?;
            processor
                .plotter()
                .plot_networks(&record.thresholds, &record.categories, &record.network)
        })?;
        reports.write_strong_links(&outcome.strong_links)?;
        Ok(outcome)
    }
}
