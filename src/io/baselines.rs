//! Perpendicular baselines of acquisition dates, used as the vertical axis
//! of network plots.

use crate::types::{CorrectionError, CorrectionResult};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Baseline (m) per acquisition date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baselines {
    by_date: BTreeMap<NaiveDate, f64>,
}

fn parse_date(token: &str) -> CorrectionResult<NaiveDate> {
    NaiveDate::parse_from_str(token, "%Y%m%d")
        .map_err(|e| CorrectionError::InvalidFormat(format!("Invalid date '{}': {}", token, e)))
}

fn parse_value(token: &str) -> CorrectionResult<f64> {
    token
        .parse()
        .map_err(|_| CorrectionError::InvalidFormat(format!("Invalid baseline '{}'", token)))
}

impl Baselines {
    /// Parse a baselines file.
    ///
    /// Four columns (`primary secondary bperp dt`) give the secondary date's
    /// baseline, with the primary at zero. Otherwise every line is
    /// `date bperp`. The format is decided by the first line.
    pub fn parse(content: &str) -> CorrectionResult<Self> {
        let rows: Vec<Vec<&str>> = content
            .lines()
            .map(|l| l.split_whitespace().collect::<Vec<_>>())
            .filter(|t| !t.is_empty())
            .collect();

        let mut by_date = BTreeMap::new();
        let four_columns = rows.first().map_or(false, |t| t.len() == 4);
        for tokens in &rows {
            if four_columns {
                if tokens.len() < 3 {
                    return Err(CorrectionError::InvalidFormat(format!(
                        "Short baseline line: '{}'",
                        tokens.join(" ")
                    )));
                }
                by_date.entry(parse_date(tokens[0])?).or_insert(0.0);
                by_date.insert(parse_date(tokens[1])?, parse_value(tokens[2])?);
            } else {
                if tokens.len() < 2 {
                    return Err(CorrectionError::InvalidFormat(format!(
                        "Short baseline line: '{}'",
                        tokens.join(" ")
                    )));
                }
                by_date.insert(parse_date(tokens[0])?, parse_value(tokens[1])?);
            }
        }
        Ok(Self { by_date })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> CorrectionResult<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Baselines from `path`, or an empty table when it is missing or unreadable
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No {}, network plots use dummy baselines", path.display());
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(baselines) => baselines,
            Err(e) => {
                log::warn!("Cannot read {} ({}), using dummy baselines", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn get(&self, date: &NaiveDate) -> Option<f64> {
        self.by_date.get(date).copied()
    }

    /// Baseline of every epoch. When any epoch is missing, all epochs get
    /// dummy values so the plot keeps one consistent axis.
    pub fn for_epochs(&self, epochs: &[NaiveDate]) -> Vec<f64> {
        let known: Option<Vec<f64>> = epochs.iter().map(|d| self.get(d)).collect();
        match known {
            Some(values) => values,
            None => {
                if !self.by_date.is_empty() {
                    log::warn!("Baselines incomplete for the retained epochs, using dummy values");
                }
                dummy_baselines(epochs.len())
            }
        }
    }
}

/// Deterministic values in [0, 1) spread like random draws
pub fn dummy_baselines(n: usize) -> Vec<f64> {
    const GOLDEN: f64 = 0.618_033_988_749_895;
    (0..n).map(|i| (0.5 + i as f64 * GOLDEN).fract()).collect()
}
