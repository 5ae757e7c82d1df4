use approx::assert_abs_diff_eq;
use ndarray::Array2;
use std::f32::consts::PI;
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;
use unwcorr::core::batch::BatchParams;
use unwcorr::io::report::read_pair_list;
use unwcorr::{
    Category, CorrectionError, CorrectionPipeline, FrameLayout, ImageGeometry, LayoutParams,
    PairId, PipelineConfig, RasterStore, ReportWriter, Thresholds,
};

const LENGTH: usize = 5;
const WIDTH: usize = 6;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Minimal frame on disk: geometry file plus per-pair rasters
struct SyntheticFrame {
    dir: TempDir,
    layout: FrameLayout,
    geometry: ImageGeometry,
    store: RasterStore,
}

impl SyntheticFrame {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let layout = FrameLayout::new(&LayoutParams {
            frame_dir: dir.path().to_path_buf(),
            ..LayoutParams::default()
        });
        let par_file = layout.geometry_file();
        fs::create_dir_all(par_file.parent().unwrap()).unwrap();
        fs::write(
            &par_file,
            format!(
                "title: synthetic\nrange_samples: {}\nazimuth_lines: {}\nradar_frequency: 5405000000.0 Hz\n",
                WIDTH, LENGTH
            ),
        )
        .unwrap();
        fs::create_dir_all(layout.residual_dir()).unwrap();
        let geometry = ImageGeometry::from_par_file(&par_file).unwrap();
        let store = RasterStore::from_geometry(&geometry);
        Self {
            dir,
            layout,
            geometry,
            store,
        }
    }

    fn layout_params(&self) -> LayoutParams {
        LayoutParams {
            frame_dir: self.dir.path().to_path_buf(),
            ..LayoutParams::default()
        }
    }

    /// Write residual (given in cycles), unwrapped phase and labels of a pair
    fn add_pair(&self, key: &str, cycles: &Array2<f32>, unw: &Array2<f32>, labels: &Array2<i8>) -> PairId {
        let pair: PairId = key.parse().unwrap();
        let coef = self.geometry.coef_r2m() as f32;
        let residual_mm = cycles.mapv(|c| c * 2.0 * PI * coef);
        self.store
            .write_real(self.layout.residual_file(&pair), &residual_mm)
            .unwrap();

        let unw_file = self.layout.unw_file(&pair);
        fs::create_dir_all(unw_file.parent().unwrap()).unwrap();
        self.store.write_real(&unw_file, unw).unwrap();

        let cc_file = self.layout.conncomp_file(&pair);
        fs::create_dir_all(cc_file.parent().unwrap()).unwrap();
        let label_bytes: Vec<u8> = labels.iter().map(|&l| l as u8).collect();
        fs::write(cc_file, label_bytes).unwrap();
        pair
    }
}

fn uniform(value: f32) -> Array2<f32> {
    Array2::from_elem((LENGTH, WIDTH), value)
}

/// One cycle of error in the two leftmost columns
fn left_strip_error() -> Array2<f32> {
    Array2::from_shape_fn((LENGTH, WIDTH), |(_, c)| if c < 2 { 1.0 } else { 0.0 })
}

/// Half-cycle noise on 14 of 30 pixels, not correctable by whole cycles
fn half_cycle_noise() -> Array2<f32> {
    Array2::from_shape_fn((LENGTH, WIDTH), |(r, c)| {
        if r * WIDTH + c < 14 {
            0.5
        } else {
            0.0
        }
    })
}

fn config(frame: &SyntheticFrame, thresh: f64) -> PipelineConfig {
    PipelineConfig {
        layout: frame.layout_params(),
        correction_thresh: Some(thresh),
        batch: BatchParams {
            worker_count: 2,
            min_parallel_batch: 100,
        },
        ..PipelineConfig::default()
    }
}

#[test]
fn test_frame_correction_categories_and_outputs() {
    init_logger();
    let frame = SyntheticFrame::new();
    let strip_labels =
        Array2::from_shape_fn((LENGTH, WIDTH), |(_, c)| if c < 2 { 1i8 } else { 2 });
    let single_label = Array2::from_elem((LENGTH, WIDTH), 1i8);
    let offset_unw = left_strip_error().mapv(|k| 0.5 + k * 2.0 * PI);

    let good_a = frame.add_pair("20200101_20200113", &uniform(0.0), &uniform(0.3), &single_label);
    let good_b = frame.add_pair("20200101_20200125", &uniform(0.0), &uniform(-1.2), &single_label);
    let good_c = frame.add_pair("20200125_20200206", &uniform(0.0), &uniform(2.0), &single_label);
    let mode = frame.add_pair("20200113_20200125", &left_strip_error(), &offset_unw, &strip_labels);
    let integer = frame.add_pair("20200113_20200206", &left_strip_error(), &offset_unw, &single_label);
    let bad = frame.add_pair("20200101_20200206", &half_cycle_noise(), &uniform(0.0), &single_label);

    let outcome = CorrectionPipeline::new(config(&frame, 0.2)).run().unwrap();
    let categories = &outcome.categories;

    assert_eq!(outcome.iterations, 0);
    assert_eq!(categories.len(), 6);
    for pair in [good_a, good_b, good_c] {
        assert_eq!(categories.category_of(&pair), Some(Category::Good));
    }
    assert_eq!(categories.category_of(&mode), Some(Category::ModeCorrected));
    assert_eq!(categories.category_of(&integer), Some(Category::IntegerCorrected));
    assert_eq!(categories.category_of(&bad), Some(Category::Bad));
    assert_eq!(outcome.strong_links.len(), 5);

    // good outputs are the untouched input
    let layout = &frame.layout;
    assert_eq!(
        fs::read(layout.corrected_unw_file(&good_b)).unwrap(),
        fs::read(layout.unw_file(&good_b)).unwrap()
    );

    // both corrections remove the cycle in the left strip
    for pair in [mode, integer] {
        let corrected = frame.store.read_real(layout.corrected_unw_file(&pair)).unwrap();
        for value in corrected.iter() {
            assert_abs_diff_eq!(*value, 0.5, epsilon = 1e-4);
        }
    }
    assert!(!layout.corrected_pair_dir(&bad).exists());

    // diagnostics land in the category directories
    assert!(layout.png_file(Category::Good, &good_a).is_file());
    assert!(layout.png_file(Category::ModeCorrected, &mode).is_file());
    assert!(layout.png_file(Category::IntegerCorrected, &integer).is_file());
    assert!(layout.png_file(Category::Bad, &bad).is_file());

    // network plots without a baselines file
    let thresholds = Thresholds::new(0.2, 0.2);
    for kind in ["only_good_without_correction", "with_corrected", "all_retained"] {
        assert!(layout.network_png(kind, &thresholds).is_file(), "{}", kind);
    }

    let reports = ReportWriter::new(layout.info_dir(), "");
    assert_eq!(
        read_pair_list(reports.category_file(Category::Bad, &thresholds)).unwrap(),
        vec![bad]
    );
    assert_eq!(
        read_pair_list(reports.category_file(Category::Good, &thresholds)).unwrap(),
        vec![good_a, good_b, good_c]
    );
    let strong = read_pair_list(reports.strong_link_file()).unwrap();
    assert_eq!(strong.len(), 5);
    assert!(!strong.contains(&bad));
}

#[test]
fn test_thresholds_relax_until_network_is_connected() {
    init_logger();
    let frame = SyntheticFrame::new();
    let labels = Array2::from_elem((LENGTH, WIDTH), 1i8);

    frame.add_pair("20200101_20200113", &uniform(0.0), &uniform(0.0), &labels);
    frame.add_pair("20200101_20200125", &uniform(0.0), &uniform(0.0), &labels);
    let noisy = frame.add_pair("20200113_20200125", &half_cycle_noise(), &uniform(1.0), &labels);

    let mut cfg = config(&frame, 0.2);
    cfg.no_plot = true;
    let outcome = CorrectionPipeline::new(cfg).run().unwrap();

    // nearest integer brings the noisy pair to about 0.31, accepted once the
    // target reaches 0.35; its own RMS of about 0.38 stays above correction
    assert_eq!(outcome.iterations, 3);
    assert_abs_diff_eq!(outcome.thresholds.correction, 0.35, epsilon = 1e-9);
    assert_eq!(
        outcome.categories.category_of(&noisy),
        Some(Category::IntegerCorrected)
    );
    assert_eq!(outcome.strong_links.len(), 3);

    let thresholds: Vec<f64> = outcome
        .history
        .iter()
        .map(|record| record.thresholds.correction)
        .collect();
    assert!(thresholds.windows(2).all(|w| w[1] > w[0]));

    let reports = ReportWriter::new(frame.layout.info_dir(), "");
    for (c, expected_bad) in [(0.2, 1), (0.25, 1), (0.3, 1), (0.35, 0)] {
        let t = Thresholds::new(c, c);
        let bad = read_pair_list(reports.category_file(Category::Bad, &t)).unwrap();
        assert_eq!(bad.len(), expected_bad, "bad list at {}", t);
    }
    assert!(frame.layout.png_dir(Category::Good).read_dir().unwrap().next().is_none());
}

#[test]
fn test_prefixed_residual_names_are_read() {
    init_logger();
    let frame = SyntheticFrame::new();
    let labels = Array2::from_elem((LENGTH, WIDTH), 1i8);
    let pairs = [
        frame.add_pair("20200101_20200113", &uniform(0.0), &uniform(0.1), &labels),
        frame.add_pair("20200101_20200125", &uniform(0.0), &uniform(0.2), &labels),
        frame.add_pair("20200113_20200125", &left_strip_error(), &uniform(0.3), &labels),
    ];
    let plain = frame.layout.residual_file(&pairs[2]);
    fs::rename(&plain, frame.layout.residual_dir().join("ts_20200113_20200125.res")).unwrap();

    let outcome = CorrectionPipeline::new(config(&frame, 0.2)).run().unwrap();
    assert_eq!(
        outcome.categories.category_of(&pairs[2]),
        Some(Category::IntegerCorrected)
    );
    assert!(frame.layout.corrected_unw_file(&pairs[2]).is_file());
    assert!(!plain.exists());
}

/// Five dates with every category; all decided in one batch
fn mixed_frame() -> SyntheticFrame {
    let frame = SyntheticFrame::new();
    let single = Array2::from_elem((LENGTH, WIDTH), 1i8);
    let strip = Array2::from_shape_fn((LENGTH, WIDTH), |(_, c)| if c < 2 { 1i8 } else { 2 });
    let offset_unw = left_strip_error().mapv(|k| 0.5 + k * 2.0 * PI);

    frame.add_pair("20200101_20200113", &uniform(0.0), &uniform(0.3), &single);
    frame.add_pair("20200113_20200125", &left_strip_error(), &offset_unw, &strip);
    frame.add_pair("20200125_20200206", &left_strip_error(), &offset_unw, &single);
    frame.add_pair("20200206_20200218", &uniform(0.0), &uniform(-0.4), &single);
    frame.add_pair("20200101_20200125", &uniform(0.0), &uniform(1.1), &single);
    frame.add_pair("20200113_20200206", &uniform(0.0), &uniform(0.7), &single);
    frame.add_pair("20200101_20200206", &left_strip_error(), &offset_unw, &strip);
    frame.add_pair("20200125_20200218", &half_cycle_noise(), &uniform(0.0), &single);
    frame
}

/// Category and corrected raster bytes of every pair after a run
fn run_and_collect(
    frame: &SyntheticFrame,
    batch: BatchParams,
) -> BTreeMap<PairId, (Category, Option<Vec<u8>>)> {
    let cfg = PipelineConfig {
        batch,
        ..config(frame, 0.2)
    };
    let outcome = CorrectionPipeline::new(cfg).run().unwrap();
    assert_eq!(outcome.iterations, 0);
    frame
        .layout
        .discover_pairs()
        .unwrap()
        .into_iter()
        .map(|pair| {
            let category = outcome.categories.category_of(&pair).unwrap();
            let bytes = fs::read(frame.layout.corrected_unw_file(&pair)).ok();
            (pair, (category, bytes))
        })
        .collect()
}

#[test]
fn test_parallel_frame_matches_sequential() {
    init_logger();
    let frame = mixed_frame();

    let parallel = run_and_collect(
        &frame,
        BatchParams {
            worker_count: 3,
            min_parallel_batch: 2,
        },
    );
    let sequential = run_and_collect(
        &frame,
        BatchParams {
            worker_count: 1,
            min_parallel_batch: 2,
        },
    );

    assert_eq!(parallel.len(), 8);
    assert_eq!(parallel, sequential);
    let count = |c: Category| parallel.values().filter(|(cat, _)| *cat == c).count();
    assert_eq!(count(Category::Good), 4);
    assert_eq!(count(Category::ModeCorrected), 2);
    assert_eq!(count(Category::IntegerCorrected), 1);
    assert_eq!(count(Category::Bad), 1);
    assert!(parallel
        .values()
        .all(|(cat, bytes)| bytes.is_some() == cat.is_retained()));
}

#[test]
fn test_missing_residuals_abort() {
    init_logger();
    let frame = SyntheticFrame::new();
    let err = CorrectionPipeline::new(config(&frame, 0.3)).run().unwrap_err();
    match err {
        CorrectionError::EmptyBatch { location } => assert!(location.contains("130resid")),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_missing_threshold_source_is_a_configuration_error() {
    init_logger();
    let frame = SyntheticFrame::new();
    let cfg = PipelineConfig {
        correction_thresh: None,
        ..config(&frame, 0.3)
    };
    let err = CorrectionPipeline::new(cfg).run().unwrap_err();
    assert!(matches!(err, CorrectionError::Configuration(_)));
}
