//! Diagnostic images of the per-interferogram decision.
//!
//! Panels are rendered straight from the rasters: cycles fields on a
//! diverging red-white-blue ramp over [-2, 2], unwrapped phase on the same
//! ramp stretched to its 0.5/99.5 percentiles, component labels on a
//! ten-colour palette. Missing pixels are light grey.
//!
//! Network plots place acquisition dates by time (x) and perpendicular
//! baseline (y) and draw one line per interferogram.

use crate::core::cycles::nan_percentile;
use crate::core::decision::Correction;
use crate::core::network::{epochs, NetworkReport};
use crate::io::baselines::Baselines;
use crate::io::layout::FrameLayout;
use crate::io::reference::ReferencePoint;
use crate::types::{
    Category, CategoryLists, CorrectionResult, CyclesField, LabelRaster, PairId, RealRaster,
    Thresholds,
};
use chrono::NaiveDate;
use image::{Rgb, RgbImage};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Renders per-pair diagnostics. Called from batch workers.
pub trait DiagnosticPlotter: Sync {
    fn plot_good(&self, pair: &PairId, cycles: &CyclesField, rms: f64) -> CorrectionResult<()>;

    fn plot_bad(
        &self,
        pair: &PairId,
        cycles: &CyclesField,
        integer_field: &RealRaster,
        rms: f64,
        rms_integer: f64,
    ) -> CorrectionResult<()>;

    fn plot_correction(
        &self,
        pair: &PairId,
        category: Category,
        components: &LabelRaster,
        unw: &RealRaster,
        correction: &Correction,
    ) -> CorrectionResult<()>;

    /// Network plots of the retained set after a batch run at `thresholds`
    fn plot_networks(
        &self,
        thresholds: &Thresholds,
        categories: &CategoryLists,
        report: &NetworkReport,
    ) -> CorrectionResult<()>;
}

/// Plotter that draws nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPlotter;

impl DiagnosticPlotter for NullPlotter {
    fn plot_good(&self, _: &PairId, _: &CyclesField, _: f64) -> CorrectionResult<()> {
        Ok(())
    }

    fn plot_bad(&self, _: &PairId, _: &CyclesField, _: &RealRaster, _: f64, _: f64) -> CorrectionResult<()> {
        Ok(())
    }

    fn plot_correction(
        &self,
        _: &PairId,
        _: Category,
        _: &LabelRaster,
        _: &RealRaster,
        _: &Correction,
    ) -> CorrectionResult<()> {
        Ok(())
    }

    fn plot_networks(&self, _: &Thresholds, _: &CategoryLists, _: &NetworkReport) -> CorrectionResult<()> {
        Ok(())
    }
}

const NAN_COLOR: Rgb<u8> = Rgb([220, 220, 220]);
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const MARKER: Rgb<u8> = Rgb([255, 0, 0]);
const NODE: Rgb<u8> = Rgb([0, 0, 0]);
const LINK: Rgb<u8> = Rgb([31, 119, 180]);
const CORRECTED_LINK: Rgb<u8> = Rgb([255, 127, 14]);
const WEAK_LINK: Rgb<u8> = Rgb([214, 39, 40]);
const PANEL_GAP: u32 = 4;
const CYCLES_RANGE: (f64, f64) = (-2.0, 2.0);

/// Red (low) to blue (high) through near-white
const DIVERGING_STOPS: [[f64; 3]; 5] = [
    [103.0, 0.0, 31.0],
    [214.0, 96.0, 77.0],
    [247.0, 247.0, 247.0],
    [67.0, 147.0, 195.0],
    [5.0, 48.0, 97.0],
];

const LABEL_PALETTE: [Rgb<u8>; 10] = [
    Rgb([31, 119, 180]),
    Rgb([255, 127, 14]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
    Rgb([227, 119, 194]),
    Rgb([127, 127, 127]),
    Rgb([188, 189, 34]),
    Rgb([23, 190, 207]),
];

/// Colour of `value` on the diverging ramp between `vmin` and `vmax`
pub fn diverging_color(value: f64, vmin: f64, vmax: f64) -> Rgb<u8> {
    if value.is_nan() {
        return NAN_COLOR;
    }
    let span = vmax - vmin;
    let t = if span > 0.0 {
        ((value - vmin) / span).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let scaled = t * (DIVERGING_STOPS.len() - 1) as f64;
    let i = (scaled.floor() as usize).min(DIVERGING_STOPS.len() - 2);
    let frac = scaled - i as f64;
    let (lo, hi) = (DIVERGING_STOPS[i], DIVERGING_STOPS[i + 1]);
    let channel = |c: usize| (lo[c] + (hi[c] - lo[c]) * frac).round() as u8;
    Rgb([channel(0), channel(1), channel(2)])
}

pub fn label_color(label: i8) -> Rgb<u8> {
    LABEL_PALETTE[(label as i32).rem_euclid(LABEL_PALETTE.len() as i32) as usize]
}

fn put_clipped(canvas: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

/// Filled square of side `2 * half + 1` centred on `(x, y)`
fn draw_square(canvas: &mut RgbImage, (x, y): (i64, i64), half: i64, color: Rgb<u8>) {
    for dy in -half..=half {
        for dx in -half..=half {
            put_clipped(canvas, x + dx, y + dy, color);
        }
    }
}

/// Line sampled once per pixel along its longer axis; dashes are 6 on, 4 off
fn draw_line(canvas: &mut RgbImage, a: (i64, i64), b: (i64, i64), color: Rgb<u8>, dashed: bool) {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let steps = dx.abs().max(dy.abs()).max(1);
    for i in 0..=steps {
        if dashed && i % 10 >= 6 {
            continue;
        }
        let t = i as f64 / steps as f64;
        let x = a.0 + (dx as f64 * t).round() as i64;
        let y = a.1 + (dy as f64 * t).round() as i64;
        put_clipped(canvas, x, y, color);
    }
}

/// Renders downsampled panels and tiles them into one PNG
#[derive(Debug, Clone, Copy)]
pub struct PanelRenderer {
    /// Longest panel side in pixels
    pub max_panel_size: usize,
}

impl Default for PanelRenderer {
    fn default() -> Self {
        Self { max_panel_size: 600 }
    }
}

impl PanelRenderer {
    /// Sampling stride that fits a `(rows, cols)` raster into one panel
    pub fn stride(&self, dim: (usize, usize)) -> usize {
        let longest = dim.0.max(dim.1);
        let max = self.max_panel_size.max(1);
        ((longest + max - 1) / max).max(1)
    }

    fn render<T: Copy>(&self, raster: &ndarray::Array2<T>, color: impl Fn(T) -> Rgb<u8>) -> RgbImage {
        let stride = self.stride(raster.dim());
        let (rows, cols) = raster.dim();
        let height = (rows + stride - 1) / stride;
        let width = (cols + stride - 1) / stride;
        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            color(raster[[y as usize * stride, x as usize * stride]])
        })
    }

    pub fn render_field(&self, field: &RealRaster, vmin: f64, vmax: f64) -> RgbImage {
        self.render(field, |v| diverging_color(v as f64, vmin, vmax))
    }

    pub fn render_cycles(&self, cycles: &CyclesField) -> RgbImage {
        self.render_field(cycles, CYCLES_RANGE.0, CYCLES_RANGE.1)
    }

    pub fn render_labels(&self, labels: &LabelRaster) -> RgbImage {
        self.render(labels, label_color)
    }

    /// Mark a full-resolution pixel position with a small red square
    pub fn mark(&self, panel: &mut RgbImage, dim: (usize, usize), point: ReferencePoint) {
        let stride = self.stride(dim);
        let centre = ((point.x / stride) as i64, (point.y / stride) as i64);
        draw_square(panel, centre, 1, MARKER);
    }

    /// Tile equally sized panels row by row into `columns` columns
    pub fn compose(&self, panels: &[RgbImage], columns: usize) -> RgbImage {
        let columns = columns.max(1);
        let rows = (panels.len() + columns - 1) / columns;
        let cell_w = panels.iter().map(|p| p.width()).max().unwrap_or(0);
        let cell_h = panels.iter().map(|p| p.height()).max().unwrap_or(0);
        let width = columns as u32 * cell_w + (columns as u32 - 1) * PANEL_GAP;
        let height = rows as u32 * cell_h + (rows as u32).saturating_sub(1) * PANEL_GAP;

        let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);
        for (i, panel) in panels.iter().enumerate() {
            let x0 = (i % columns) as u32 * (cell_w + PANEL_GAP);
            let y0 = (i / columns) as u32 * (cell_h + PANEL_GAP);
            for (x, y, pixel) in panel.enumerate_pixels() {
                canvas.put_pixel(x0 + x, y0 + y, *pixel);
            }
        }
        canvas
    }
}

/// Links drawn in one style
#[derive(Debug, Clone, Copy)]
pub struct LinkLayer<'a> {
    pub pairs: &'a BTreeSet<PairId>,
    pub color: Rgb<u8>,
    pub dashed: bool,
}

impl<'a> LinkLayer<'a> {
    pub fn solid(pairs: &'a BTreeSet<PairId>, color: Rgb<u8>) -> Self {
        Self {
            pairs,
            color,
            dashed: false,
        }
    }

    pub fn dashed(pairs: &'a BTreeSet<PairId>, color: Rgb<u8>) -> Self {
        Self {
            pairs,
            color,
            dashed: true,
        }
    }
}

/// Draws an interferogram network: time on x, baseline on y
#[derive(Debug, Clone, Copy)]
pub struct NetworkRenderer {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
}

impl Default for NetworkRenderer {
    fn default() -> Self {
        Self {
            width: 800,
            height: 400,
            margin: 20,
        }
    }
}

impl NetworkRenderer {
    /// Pixel position of every epoch; `bperp` is parallel to `epochs`
    pub fn positions(&self, epochs: &[NaiveDate], bperp: &[f64]) -> BTreeMap<NaiveDate, (i64, i64)> {
        let (first, last) = match (epochs.first(), epochs.last()) {
            (Some(&f), Some(&l)) => (f, l),
            _ => return BTreeMap::new(),
        };
        let days = (last - first).num_days().max(1) as f64;
        let (bmin, bmax) = bperp
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &b| (lo.min(b), hi.max(b)));
        let bspan = if bmax > bmin { bmax - bmin } else { 1.0 };
        let margin = self.margin as f64;
        let inner_w = (self.width as f64 - 2.0 * margin).max(1.0);
        let inner_h = (self.height as f64 - 2.0 * margin).max(1.0);

        epochs
            .iter()
            .zip(bperp)
            .map(|(&date, &b)| {
                let x = margin + (date - first).num_days() as f64 / days * inner_w;
                let y = if bmax > bmin {
                    margin + (1.0 - (b - bmin) / bspan) * inner_h
                } else {
                    margin + inner_h / 2.0
                };
                (date, (x.round() as i64, y.round() as i64))
            })
            .collect()
    }

    pub fn render(&self, epochs: &[NaiveDate], bperp: &[f64], layers: &[LinkLayer]) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        let positions = self.positions(epochs, bperp);
        for layer in layers {
            for pair in layer.pairs {
                if let (Some(&a), Some(&b)) =
                    (positions.get(&pair.primary), positions.get(&pair.secondary))
                {
                    draw_line(&mut canvas, a, b, layer.color, layer.dashed);
                }
            }
        }
        for &point in positions.values() {
            draw_square(&mut canvas, point, 2, NODE);
        }
        canvas
    }
}

/// Writes PNG diagnostics into the per-category directories of a frame
#[derive(Debug, Clone)]
pub struct PngPlotter {
    layout: FrameLayout,
    reference: Option<ReferencePoint>,
    baselines: Baselines,
    renderer: PanelRenderer,
    network_renderer: NetworkRenderer,
}

impl PngPlotter {
    pub fn new(layout: FrameLayout, reference: Option<ReferencePoint>) -> Self {
        Self {
            layout,
            reference,
            baselines: Baselines::default(),
            renderer: PanelRenderer::default(),
            network_renderer: NetworkRenderer::default(),
        }
    }

    /// Baselines for the network plots; without them dummy values are used
    pub fn with_baselines(mut self, baselines: Baselines) -> Self {
        self.baselines = baselines;
        self
    }

    pub fn with_renderer(mut self, renderer: PanelRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    fn cycles_panel(&self, cycles: &CyclesField) -> RgbImage {
        let mut panel = self.renderer.render_cycles(cycles);
        if let Some(point) = self.reference {
            self.renderer.mark(&mut panel, cycles.dim(), point);
        }
        panel
    }

    fn save(&self, image: &RgbImage, path: &Path) -> CorrectionResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        image.save(path)?;
        log::debug!("Saved {}", path.display());
        Ok(())
    }
}

impl DiagnosticPlotter for PngPlotter {
    fn plot_good(&self, pair: &PairId, cycles: &CyclesField, rms: f64) -> CorrectionResult<()> {
        log::debug!("{}: good, RMS residual = {:.2}", pair, rms);
        let image = self.cycles_panel(cycles);
        self.save(&image, &self.layout.png_file(Category::Good, pair))
    }

    fn plot_bad(
        &self,
        pair: &PairId,
        cycles: &CyclesField,
        integer_field: &RealRaster,
        rms: f64,
        rms_integer: f64,
    ) -> CorrectionResult<()> {
        log::debug!(
            "{}: bad, RMS residual = {:.2}, after nearest integer = {:.2}",
            pair,
            rms,
            rms_integer
        );
        let panels = [
            self.cycles_panel(cycles),
            self.renderer.render_cycles(integer_field),
        ];
        let image = self.renderer.compose(&panels, 2);
        self.save(&image, &self.layout.png_file(Category::Bad, pair))
    }

    fn plot_correction(
        &self,
        pair: &PairId,
        category: Category,
        components: &LabelRaster,
        unw: &RealRaster,
        correction: &Correction,
    ) -> CorrectionResult<()> {
        let vmin = nan_percentile(unw.iter().copied(), 0.5);
        let vmax = nan_percentile(unw.iter().copied(), 99.5);
        let stats = correction.stats;
        log::debug!(
            "{}: {}, RMS residual {:.2}, integer {:.2}, mode {:.2}",
            pair,
            category,
            stats.rms,
            stats.rms_integer,
            stats.rms_mode
        );

        let panels = [
            self.renderer.render_labels(components),
            self.renderer.render_field(unw, vmin, vmax),
            self.renderer.render_field(&correction.corrected_unw, vmin, vmax),
            self.cycles_panel(&correction.cycles),
            self.renderer.render_cycles(&correction.integer_field),
            self.renderer.render_cycles(&correction.mode_field),
        ];
        let image = self.renderer.compose(&panels, 3);
        self.save(&image, &self.layout.png_file(category, pair))
    }

    fn plot_networks(
        &self,
        thresholds: &Thresholds,
        categories: &CategoryLists,
        report: &NetworkReport,
    ) -> CorrectionResult<()> {
        if report.strong_links.is_empty() {
            log::debug!("No strong links at {}, skipping network plots", thresholds);
            return Ok(());
        }
        let retained = categories.retained();
        let corrected = categories.corrected();
        let uncorrected: BTreeSet<PairId> = retained.difference(&corrected).copied().collect();
        let dates: Vec<NaiveDate> = epochs(&retained).into_iter().collect();
        let bperp = self.baselines.for_epochs(&dates);
        let renderer = &self.network_renderer;

        let only_good = renderer.render(&dates, &bperp, &[LinkLayer::solid(&uncorrected, LINK)]);
        self.save(
            &only_good,
            &self.layout.network_png("only_good_without_correction", thresholds),
        )?;

        let with_corrected = renderer.render(
            &dates,
            &bperp,
            &[
                LinkLayer::solid(&uncorrected, LINK),
                LinkLayer::solid(&corrected, CORRECTED_LINK),
            ],
        );
        self.save(
            &with_corrected,
            &self.layout.network_png("with_corrected", thresholds),
        )?;

        let all_retained = renderer.render(
            &dates,
            &bperp,
            &[
                LinkLayer::solid(&report.strong_links, LINK),
                LinkLayer::dashed(&report.weak_links, WEAK_LINK),
            ],
        );
        self.save(
            &all_retained,
            &self.layout.network_png("all_retained", thresholds),
        )
    }
}
