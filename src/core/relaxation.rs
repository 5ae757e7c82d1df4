//! Network-driven threshold relaxation.
//!
//! The first batch decides every pair. While the retained network still has
//! a gap, both thresholds are loosened by a fixed step and only the pairs
//! that are still bad are decided again. Accepted pairs are never revisited,
//! so thresholds and the retained set only grow.

use crate::core::batch::{BatchRunner, PairProcessor};
use crate::core::network::{NetworkGapEvaluator, NetworkReport};
use crate::types::{CategoryLists, CorrectionError, CorrectionResult, PairId, Thresholds};
use std::collections::BTreeSet;

/// Relaxation parameters
#[derive(Debug, Clone)]
pub struct RelaxationParams {
    /// Increment applied to both thresholds per iteration (cycles)
    pub step: f64,
    /// Abort after this many relaxation steps; `None` relaxes until connected
    pub max_iterations: Option<usize>,
}

impl Default for RelaxationParams {
    fn default() -> Self {
        Self {
            step: 0.05,
            max_iterations: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Iterating,
    Converged,
}

/// Snapshot taken after every batch run
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub iteration: usize,
    pub state: LoopState,
    pub thresholds: Thresholds,
    pub categories: CategoryLists,
    pub network: NetworkReport,
}

#[derive(Debug, Clone)]
pub struct RelaxationOutcome {
    pub categories: CategoryLists,
    /// Thresholds at which the network became connected
    pub thresholds: Thresholds,
    pub strong_links: BTreeSet<PairId>,
    pub iterations: usize,
    pub history: Vec<IterationRecord>,
}

pub struct ThresholdRelaxationLoop<E: NetworkGapEvaluator> {
    runner: BatchRunner,
    evaluator: E,
    params: RelaxationParams,
}

impl<E: NetworkGapEvaluator> ThresholdRelaxationLoop<E> {
    pub fn new(runner: BatchRunner, evaluator: E, params: RelaxationParams) -> Self {
        Self {
            runner,
            evaluator,
            params,
        }
    }

    /// Run batches until the retained network has no gap.
    ///
    /// `on_iteration` sees every snapshot before the loop moves on, which is
    /// where the caller persists per-iteration reports.
    pub fn run<P, F>(
        &self,
        pairs: &[PairId],
        initial: Thresholds,
        processor: &P,
        mut on_iteration: F,
    ) -> CorrectionResult<RelaxationOutcome>
    where
        P: PairProcessor,
        F: FnMut(&IterationRecord) -> CorrectionResult<()>,
    {
        let mut thresholds = initial;
        let mut categories = self.runner.run(pairs, thresholds, processor)?;
        let mut history = Vec::new();
        let mut iteration = 0;

        loop {
            let network = self.evaluator.evaluate(&categories.retained())?;
            let state = if network.is_connected() {
                LoopState::Converged
            } else {
                LoopState::Iterating
            };

            let record = IterationRecord {
                iteration,
                state,
                thresholds,
                categories: categories.clone(),
                network,
            };
            on_iteration(&record)?;
            let strong_links = record.network.strong_links.clone();
            let n_gap = record.network.n_gap;
            history.push(record);

            if state == LoopState::Converged {
                log::info!(
                    "Network connected after {} relaxation step(s) at thresholds {:.2}/{:.2}",
                    iteration,
                    thresholds.correction,
                    thresholds.target
                );
                return Ok(RelaxationOutcome {
                    categories,
                    thresholds,
                    strong_links,
                    iterations: iteration,
                    history,
                });
            }

            if let Some(max) = self.params.max_iterations {
                if iteration >= max {
                    return Err(CorrectionError::Processing(format!(
                        "Network still has {} gap(s) after {} relaxation steps (thresholds {:.2}/{:.2})",
                        n_gap, iteration, thresholds.correction, thresholds.target
                    )));
                }
            }

            iteration += 1;
            thresholds = thresholds.relaxed(self.params.step);
            log::info!(
                "n_gap={}, increase correction_thresh and target_thresh by {:.2}",
                n_gap,
                self.params.step
            );
            log::info!("Correction threshold = {:.2}", thresholds.correction);
            log::info!("Target threshold = {:.2}", thresholds.target);

            let still_bad: Vec<PairId> = categories.bad.iter().copied().collect();
            let rerun = self.runner.run(&still_bad, thresholds, processor)?;
            categories = categories.absorb_rerun(&rerun);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::batch::BatchParams;
    use crate::core::network::LinkNetworkEvaluator;
    use crate::types::Category;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Good below the correction threshold, bad otherwise; records calls
    struct RmsProcessor {
        rms: HashMap<PairId, f64>,
        calls: Mutex<Vec<(PairId, Thresholds)>>,
    }

    impl RmsProcessor {
        fn new(table: &[(&str, f64)]) -> Self {
            Self {
                rms: table
                    .iter()
                    .map(|(k, v)| (k.parse().unwrap(), *v))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl PairProcessor for RmsProcessor {
        fn process(&self, pair: &PairId, thresholds: Thresholds) -> CorrectionResult<Category> {
            self.calls.lock().unwrap().push((*pair, thresholds));
            Ok(if self.rms[pair] < thresholds.correction {
                Category::Good
            } else {
                Category::Bad
            })
        }
    }

    fn relaxation_loop(max_iterations: Option<usize>) -> ThresholdRelaxationLoop<LinkNetworkEvaluator> {
        ThresholdRelaxationLoop::new(
            BatchRunner::new(BatchParams {
                worker_count: 1,
                min_parallel_batch: 100,
            }),
            LinkNetworkEvaluator,
            RelaxationParams {
                step: 0.05,
                max_iterations,
            },
        )
    }

    fn sorted_pairs(processor: &RmsProcessor) -> Vec<PairId> {
        let mut pairs: Vec<PairId> = processor.rms.keys().copied().collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn test_relaxes_until_connected() {
        let processor = RmsProcessor::new(&[
            ("20200101_20200113", 0.1),
            ("20200101_20200125", 0.1),
            ("20200113_20200125", 0.38),
        ]);
        let pairs = sorted_pairs(&processor);
        let mut seen = Vec::new();
        let outcome = relaxation_loop(None)
            .run(&pairs, Thresholds::new(0.3, 0.3), &processor, |record| {
                seen.push((record.iteration, record.state));
                Ok(())
            })
            .unwrap();

        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.categories.good.len(), 3);
        assert_eq!(outcome.strong_links.len(), 3);
        assert!((outcome.thresholds.correction - 0.4).abs() < 1e-9);
        assert_eq!(
            seen,
            vec![
                (0, LoopState::Iterating),
                (1, LoopState::Iterating),
                (2, LoopState::Converged)
            ]
        );

        // only the bad pair is decided again
        let calls = processor.calls.lock().unwrap();
        assert_eq!(calls.len(), 5);
        let revisited: BTreeSet<PairId> = calls[3..].iter().map(|(p, _)| *p).collect();
        assert_eq!(revisited.len(), 1);
        assert!(revisited.contains(&"20200113_20200125".parse().unwrap()));
    }

    #[test]
    fn test_thresholds_and_retained_set_are_monotonic() {
        let processor = RmsProcessor::new(&[
            ("20200101_20200113", 0.1),
            ("20200101_20200125", 0.33),
            ("20200113_20200125", 0.42),
            ("20200113_20200206", 0.2),
            ("20200125_20200206", 0.36),
        ]);
        let pairs = sorted_pairs(&processor);
        let outcome = relaxation_loop(None)
            .run(&pairs, Thresholds::new(0.3, 0.3), &processor, |_| Ok(()))
            .unwrap();

        for window in outcome.history.windows(2) {
            let (before, after) = (&window[0], &window[1]);
            assert!(after.thresholds.correction >= before.thresholds.correction);
            assert!(after.thresholds.target >= before.thresholds.target);
            for category in [Category::Good, Category::ModeCorrected, Category::IntegerCorrected] {
                assert!(before
                    .categories
                    .list(category)
                    .is_subset(after.categories.list(category)));
            }
        }
        assert_eq!(outcome.history.last().unwrap().state, LoopState::Converged);
    }

    #[test]
    fn test_gap_without_bad_pairs_is_fatal() {
        let processor = RmsProcessor::new(&[
            ("20200101_20200113", 0.1),
            ("20200113_20200125", 0.1),
            ("20200101_20200125", 0.1),
            ("20200301_20200313", 0.1),
            ("20200313_20200325", 0.1),
            ("20200301_20200325", 0.1),
        ]);
        let pairs = sorted_pairs(&processor);
        let err = relaxation_loop(None)
            .run(&pairs, Thresholds::new(0.3, 0.3), &processor, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, CorrectionError::EmptyBatch { .. }));
    }

    #[test]
    fn test_iteration_limit() {
        let processor = RmsProcessor::new(&[
            ("20200101_20200113", 0.1),
            ("20200101_20200125", 0.1),
            ("20200113_20200125", 5.0),
        ]);
        let pairs = sorted_pairs(&processor);
        let err = relaxation_loop(Some(3))
            .run(&pairs, Thresholds::new(0.3, 0.3), &processor, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, CorrectionError::Processing(_)));
        assert_eq!(processor.calls.lock().unwrap().len(), 6);
    }
}
