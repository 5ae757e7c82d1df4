//! Connectivity of the retained interferogram network.
//!
//! Acquisition dates are graph nodes and interferograms are edges. A pair is
//! a weak link when one of its dates ends up with fewer than two links once
//! other weak links are removed. A gap is an interval between consecutive
//! dates that no strong link spans; a time-series inversion over a network
//! with gaps is not well posed.

use crate::types::{CorrectionResult, PairId};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Strong/weak partition of a retained set and its gap count
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkReport {
    pub n_gap: usize,
    pub strong_links: BTreeSet<PairId>,
    pub weak_links: BTreeSet<PairId>,
}

impl NetworkReport {
    pub fn is_connected(&self) -> bool {
        self.n_gap == 0
    }
}

/// Evaluates connectivity of a retained interferogram set
pub trait NetworkGapEvaluator {
    fn evaluate(&self, retained: &BTreeSet<PairId>) -> CorrectionResult<NetworkReport>;
}

/// Acquisition dates of a set of pairs
pub fn epochs<'a>(pairs: impl IntoIterator<Item = &'a PairId>) -> BTreeSet<NaiveDate> {
    pairs
        .into_iter()
        .flat_map(|p| [p.primary, p.secondary])
        .collect()
}

/// Split pairs into (strong, weak) by repeatedly dropping every pair that
/// touches a date with fewer than two links
pub fn separate_strong_and_weak_links(
    pairs: &BTreeSet<PairId>,
) -> (BTreeSet<PairId>, BTreeSet<PairId>) {
    let mut strong = pairs.clone();
    loop {
        let mut degree: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for pair in &strong {
            *degree.entry(pair.primary).or_insert(0) += 1;
            *degree.entry(pair.secondary).or_insert(0) += 1;
        }
        if degree.values().all(|&d| d >= 2) {
            break;
        }
        strong.retain(|p| degree[&p.primary] >= 2 && degree[&p.secondary] >= 2);
    }
    let weak = pairs.difference(&strong).copied().collect();
    (strong, weak)
}

/// Number of consecutive-date intervals not spanned by any pair
pub fn count_gaps(pairs: &BTreeSet<PairId>) -> usize {
    let dates: Vec<NaiveDate> = epochs(pairs).into_iter().collect();
    dates
        .windows(2)
        .filter(|w| {
            !pairs
                .iter()
                .any(|p| p.primary <= w[0] && p.secondary >= w[1])
        })
        .count()
}

/// Default evaluator: strong/weak link separation followed by gap counting
/// over the strong links
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkNetworkEvaluator;

impl NetworkGapEvaluator for LinkNetworkEvaluator {
    fn evaluate(&self, retained: &BTreeSet<PairId>) -> CorrectionResult<NetworkReport> {
        if retained.is_empty() {
            log::warn!("No retained ifgs, network is disconnected");
            return Ok(NetworkReport {
                n_gap: 1,
                ..NetworkReport::default()
            });
        }

        let (strong_links, weak_links) = separate_strong_and_weak_links(retained);
        log::info!("{} ifgs are well-connected", strong_links.len());
        log::info!("{} ifgs are weak links", weak_links.len());

        let n_gap = if strong_links.is_empty() {
            1
        } else {
            count_gaps(&strong_links)
        };
        log::info!(
            "{} dates in strong network, n_gap = {}",
            epochs(&strong_links).len(),
            n_gap
        );

        Ok(NetworkReport {
            n_gap,
            strong_links,
            weak_links,
        })
    }
}
