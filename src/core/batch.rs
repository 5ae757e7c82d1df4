use crate::types::{Category, CategoryLists, CorrectionError, CorrectionResult, PairId, Thresholds};

/// Batch execution parameters
#[derive(Debug, Clone)]
pub struct BatchParams {
    /// Number of parallel workers
    pub worker_count: usize,
    /// Batches up to this size run sequentially in one worker
    pub min_parallel_batch: usize,
}

impl Default for BatchParams {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            min_parallel_batch: 100,
        }
    }
}

/// Decides one interferogram at the given thresholds.
///
/// Implementations must not depend on which worker runs them or in which
/// order pairs are processed.
pub trait PairProcessor: Sync {
    fn process(&self, pair: &PairId, thresholds: Thresholds) -> CorrectionResult<Category>;

    /// Where the inputs come from, for error messages
    fn input_location(&self) -> String {
        "the input pair set".to_string()
    }
}

/// Split `items` into at most `n` contiguous parts whose sizes differ by at
/// most one; no part is empty
pub fn even_split<T>(items: &[T], n: usize) -> Vec<&[T]> {
    let n = n.min(items.len()).max(1);
    let (k, m) = (items.len() / n, items.len() % n);
    (0..n)
        .map(|i| {
            let start = i * k + i.min(m);
            let end = (i + 1) * k + (i + 1).min(m);
            &items[start..end]
        })
        .filter(|part| !part.is_empty())
        .collect()
}

/// Runs the per-pair decision over a set of pairs and gathers categories
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    params: BatchParams,
}

impl BatchRunner {
    pub fn new(params: BatchParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BatchParams {
        &self.params
    }

    pub fn run<P: PairProcessor>(
        &self,
        pairs: &[PairId],
        thresholds: Thresholds,
        processor: &P,
    ) -> CorrectionResult<CategoryLists> {
        if pairs.is_empty() {
            return Err(CorrectionError::EmptyBatch {
                location: processor.input_location(),
            });
        }

        let parallel =
            self.params.worker_count > 1 && pairs.len() > self.params.min_parallel_batch;
        log::info!(
            "Deciding {} ifgs at thresholds {:.2}/{:.2} ({})",
            pairs.len(),
            thresholds.correction,
            thresholds.target,
            if parallel {
                format!("{} workers", self.params.worker_count)
            } else {
                "sequential".to_string()
            }
        );

        let lists = if parallel {
            self.run_parallel(pairs, thresholds, processor)?
        } else {
            Self::run_partition(pairs, thresholds, processor)?
        };

        log::info!(
            "Batch done: {} good, {} mode-corrected, {} integer-corrected, {} bad",
            lists.good.len(),
            lists.mode_corrected.len(),
            lists.integer_corrected.len(),
            lists.bad.len()
        );
        Ok(lists)
    }

    fn run_partition<P: PairProcessor>(
        pairs: &[PairId],
        thresholds: Thresholds,
        processor: &P,
    ) -> CorrectionResult<CategoryLists> {
        let mut lists = CategoryLists::default();
        for pair in pairs {
            let category = processor.process(pair, thresholds)?;
            lists.insert(*pair, category);
        }
        Ok(lists)
    }

    #[cfg(feature = "parallel")]
    fn run_parallel<P: PairProcessor>(
        &self,
        pairs: &[PairId],
        thresholds: Thresholds,
        processor: &P,
    ) -> CorrectionResult<CategoryLists> {
        use rayon::prelude::*;

        let partitions = even_split(pairs, self.params.worker_count);
        log::debug!(
            "Partition sizes: {:?}",
            partitions.iter().map(|p| p.len()).collect::<Vec<_>>()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.params.worker_count)
            .build()
            .map_err(|e| CorrectionError::Processing(format!("Failed to build worker pool: {}", e)))?;

        let results: Vec<CategoryLists> = pool.install(|| {
            partitions
                .par_iter()
                .map(|part| Self::run_partition(part, thresholds, processor))
                .collect::<CorrectionResult<Vec<_>>>()
        })?;

        Ok(results
            .into_iter()
            .fold(CategoryLists::default(), CategoryLists::merge))
    }

    #[cfg(not(feature = "parallel"))]
    fn run_parallel<P: PairProcessor>(
        &self,
        pairs: &[PairId],
        thresholds: Thresholds,
        processor: &P,
    ) -> CorrectionResult<CategoryLists> {
        Self::run_partition(pairs, thresholds, processor)
    }
}
