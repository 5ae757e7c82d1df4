use chrono::NaiveDate;
use ndarray::Array2;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Real-valued raster sample (residual mm, unwrapped phase rad, cycles)
pub type RasterReal = f32;

/// 2D real raster (azimuth lines x range samples)
pub type RealRaster = Array2<RasterReal>;

/// 2D connected-component label raster, 0 = unlabeled
pub type LabelRaster = Array2<i8>;

/// Residual expressed as a fractional number of 2π cycles
pub type CyclesField = RealRaster;

/// Interferogram pair identified by its acquisition dates.
///
/// Ordering follows (primary, secondary), which is the same order as the
/// canonical `YYYYMMDD_YYYYMMDD` key sorted as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairId {
    pub primary: NaiveDate,
    pub secondary: NaiveDate,
}

impl PairId {
    pub const KEY_LEN: usize = 17;

    pub fn new(primary: NaiveDate, secondary: NaiveDate) -> CorrectionResult<Self> {
        if primary >= secondary {
            return Err(CorrectionError::InvalidFormat(format!(
                "Pair primary date {} is not before secondary date {}",
                primary.format("%Y%m%d"),
                secondary.format("%Y%m%d")
            )));
        }
        Ok(Self { primary, secondary })
    }

    /// Canonical `YYYYMMDD_YYYYMMDD` key
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.primary.format("%Y%m%d"),
            self.secondary.format("%Y%m%d")
        )
    }
}

impl FromStr for PairId {
    type Err = CorrectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CorrectionError::InvalidFormat(format!("Invalid pair key: {}", s));
        if s.len() != Self::KEY_LEN {
            return Err(invalid());
        }
        let (primary, secondary) = s.split_once('_').ok_or_else(invalid)?;
        let primary = NaiveDate::parse_from_str(primary, "%Y%m%d").map_err(|_| invalid())?;
        let secondary = NaiveDate::parse_from_str(secondary, "%Y%m%d").map_err(|_| invalid())?;
        Self::new(primary, secondary)
    }
}

/// RMS thresholds in cycles for one batch run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// RMS above which correction is attempted
    pub correction: f64,
    /// RMS a correction must reach to be accepted
    pub target: f64,
}

impl Thresholds {
    pub fn new(correction: f64, target: f64) -> Self {
        Self { correction, target }
    }

    /// Both thresholds loosened by `step`
    pub fn relaxed(&self, step: f64) -> Self {
        Self {
            correction: self.correction + step,
            target: self.target + step,
        }
    }
}

impl fmt::Display for Thresholds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}_{:.2}", self.correction, self.target)
    }
}

/// Decision category of one interferogram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Good,
    ModeCorrected,
    IntegerCorrected,
    Bad,
}

impl Category {
    pub fn is_retained(&self) -> bool {
        !matches!(self, Category::Bad)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Good => write!(f, "good"),
            Category::ModeCorrected => write!(f, "mode-corrected"),
            Category::IntegerCorrected => write!(f, "integer-corrected"),
            Category::Bad => write!(f, "bad"),
        }
    }
}

/// Disjoint category membership of a set of pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryLists {
    pub good: BTreeSet<PairId>,
    pub mode_corrected: BTreeSet<PairId>,
    pub integer_corrected: BTreeSet<PairId>,
    pub bad: BTreeSet<PairId>,
}

impl CategoryLists {
    pub fn insert(&mut self, pair: PairId, category: Category) {
        self.list_mut(category).insert(pair);
    }

    pub fn list(&self, category: Category) -> &BTreeSet<PairId> {
        match category {
            Category::Good => &self.good,
            Category::ModeCorrected => &self.mode_corrected,
            Category::IntegerCorrected => &self.integer_corrected,
            Category::Bad => &self.bad,
        }
    }

    fn list_mut(&mut self, category: Category) -> &mut BTreeSet<PairId> {
        match category {
            Category::Good => &mut self.good,
            Category::ModeCorrected => &mut self.mode_corrected,
            Category::IntegerCorrected => &mut self.integer_corrected,
            Category::Bad => &mut self.bad,
        }
    }

    pub fn category_of(&self, pair: &PairId) -> Option<Category> {
        [
            Category::Good,
            Category::ModeCorrected,
            Category::IntegerCorrected,
            Category::Bad,
        ]
        .into_iter()
        .find(|c| self.list(*c).contains(pair))
    }

    /// Union of two results over disjoint pair sets
    pub fn merge(mut self, other: CategoryLists) -> Self {
        self.good.extend(other.good);
        self.mode_corrected.extend(other.mode_corrected);
        self.integer_corrected.extend(other.integer_corrected);
        self.bad.extend(other.bad);
        self
    }

    /// Fold in a re-run over (a subset of) the currently bad pairs.
    ///
    /// Pairs decided in `rerun` leave the bad list and take their new category;
    /// accepted pairs from earlier runs are never touched.
    pub fn absorb_rerun(&self, rerun: &CategoryLists) -> Self {
        let mut next = self.clone();
        for category in [Category::Good, Category::ModeCorrected, Category::IntegerCorrected] {
            for pair in rerun.list(category) {
                next.bad.remove(pair);
                next.insert(*pair, category);
            }
        }
        next
    }

    pub fn retained(&self) -> BTreeSet<PairId> {
        self.good
            .iter()
            .chain(&self.mode_corrected)
            .chain(&self.integer_corrected)
            .copied()
            .collect()
    }

    pub fn corrected(&self) -> BTreeSet<PairId> {
        self.mode_corrected
            .iter()
            .chain(&self.integer_corrected)
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.good.len() + self.mode_corrected.len() + self.integer_corrected.len() + self.bad.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Error types for unwrapping correction
#[derive(Debug, thiserror::Error)]
pub enum CorrectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No ifgs for correcting, check if there are *.res files in {location}")]
    EmptyBatch { location: String },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Result type for correction operations
pub type CorrectionResult<T> = Result<T, CorrectionError>;
