use crate::types::{Category, CorrectionError, CorrectionResult, PairId, Thresholds};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory names of one frame run, relative to the frame directory
#[derive(Debug, Clone)]
pub struct LayoutParams {
    /// Frame directory holding all other directories
    pub frame_dir: PathBuf,
    /// Connected components and `slc.mli.par`
    pub comp_cc_dir: PathBuf,
    /// Unwrapped interferograms to be corrected
    pub unw_dir: PathBuf,
    /// Output of corrected interferograms
    pub correct_dir: PathBuf,
    /// Time series directory with residuals and info files
    pub ts_dir: PathBuf,
    /// Suffix of residual directory, threshold file and reports
    pub suffix: String,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            frame_dir: PathBuf::from("./"),
            comp_cc_dir: PathBuf::from("GEOCml10GACOS"),
            unw_dir: PathBuf::from("GEOCml10GACOS"),
            correct_dir: PathBuf::from("GEOCml10GACOS_corrected"),
            ts_dir: PathBuf::from("TS_GEOCml10GACOS"),
            suffix: String::new(),
        }
    }
}

/// All input and output locations of a frame run
#[derive(Debug, Clone)]
pub struct FrameLayout {
    comp_cc_dir: PathBuf,
    unw_dir: PathBuf,
    correct_dir: PathBuf,
    ts_dir: PathBuf,
    suffix: String,
}

impl FrameLayout {
    pub fn new(params: &LayoutParams) -> Self {
        let join = |dir: &Path| params.frame_dir.join(dir);
        Self {
            comp_cc_dir: join(&params.comp_cc_dir),
            unw_dir: join(&params.unw_dir),
            correct_dir: join(&params.correct_dir),
            ts_dir: join(&params.ts_dir),
            suffix: params.suffix.clone(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn residual_dir(&self) -> PathBuf {
        self.ts_dir.join(format!("130resid{}", self.suffix))
    }

    pub fn info_dir(&self) -> PathBuf {
        self.ts_dir.join("info")
    }

    pub fn network_dir(&self) -> PathBuf {
        self.ts_dir.join("network")
    }

    pub fn correct_dir(&self) -> &Path {
        &self.correct_dir
    }

    pub fn geometry_file(&self) -> PathBuf {
        self.comp_cc_dir.join("slc.mli.par")
    }

    pub fn threshold_file(&self) -> PathBuf {
        self.info_dir().join(format!("131resid_2pi{}.txt", self.suffix))
    }

    pub fn reference_file(&self) -> PathBuf {
        self.info_dir().join("120ref.txt")
    }

    pub fn baseline_file(&self) -> PathBuf {
        self.comp_cc_dir.join("baselines")
    }

    pub fn residual_file(&self, pair: &PairId) -> PathBuf {
        self.residual_dir().join(format!("{}.res", pair))
    }

    pub fn unw_file(&self, pair: &PairId) -> PathBuf {
        self.unw_dir.join(pair.key()).join(format!("{}.unw", pair))
    }

    pub fn conncomp_file(&self, pair: &PairId) -> PathBuf {
        self.comp_cc_dir.join(pair.key()).join(format!("{}.conncomp", pair))
    }

    pub fn corrected_pair_dir(&self, pair: &PairId) -> PathBuf {
        self.correct_dir.join(pair.key())
    }

    pub fn corrected_unw_file(&self, pair: &PairId) -> PathBuf {
        self.corrected_pair_dir(pair).join(format!("{}.unw", pair))
    }

    /// Diagnostic image directory of a category
    pub fn png_dir(&self, category: Category) -> PathBuf {
        let name = match category {
            Category::Good => "good_ifg_no_correction",
            Category::Bad => "bad_ifg_no_correction",
            Category::IntegerCorrected => "integer_correction",
            Category::ModeCorrected => "mode_correction",
        };
        self.residual_dir().join(name)
    }

    pub fn png_file(&self, category: Category, pair: &PairId) -> PathBuf {
        self.png_dir(category).join(format!("{}.png", pair))
    }

    /// Residual file of every pair in the residual directory.
    ///
    /// The pair key is the trailing `YYYYMMDD_YYYYMMDD` of the file stem, so
    /// prefixed names are accepted. When two files carry the same key the
    /// first in name order is used.
    pub fn discover_residuals(&self) -> CorrectionResult<BTreeMap<PairId, PathBuf>> {
        let dir = self.residual_dir();
        let pattern = Regex::new(r"(\d{8}_\d{8})$").map_err(|e| {
            CorrectionError::Processing(format!("Invalid pair pattern: {}", e))
        })?;

        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("res") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut residuals: BTreeMap<PairId, PathBuf> = BTreeMap::new();
        for path in paths {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            let stem = name.split('.').next().unwrap_or("");
            let pair = match pattern.captures(stem).map(|c| c[1].parse::<PairId>()) {
                Some(Ok(pair)) => pair,
                _ => {
                    log::warn!("Skipping residual file without pair key: {}", path.display());
                    continue;
                }
            };
            if let Some(kept) = residuals.get(&pair) {
                log::warn!(
                    "Ignoring {}, {} already holds the residual of {}",
                    path.display(),
                    kept.display(),
                    pair
                );
                continue;
            }
            residuals.insert(pair, path);
        }
        log::info!("Found {} residual files in {}", residuals.len(), dir.display());
        Ok(residuals)
    }

    /// Network plot `kind` of the retained set at the given thresholds
    pub fn network_png(&self, kind: &str, thresholds: &Thresholds) -> PathBuf {
        self.network_dir()
            .join(format!("network132_{}{}_{}.png", kind, self.suffix, thresholds))
    }

    /// Pairs with a `*.res` file in the residual directory, sorted
    pub fn discover_pairs(&self) -> CorrectionResult<Vec<PairId>> {
        Ok(self.discover_residuals()?.into_keys().collect())
    }

    /// Start a run from empty output directories
    pub fn prepare_outputs(&self) -> CorrectionResult<()> {
        let mut fresh = vec![self.correct_dir.clone()];
        fresh.extend(
            [
                Category::Good,
                Category::Bad,
                Category::IntegerCorrected,
                Category::ModeCorrected,
            ]
            .iter()
            .map(|c| self.png_dir(*c)),
        );
        for dir in fresh {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
        }
        fs::create_dir_all(self.info_dir())?;
        fs::create_dir_all(self.network_dir())?;
        Ok(())
    }
}
