//! Core correction modules

pub mod batch;
pub mod cycles;
pub mod decision;
pub mod diagnostics;
pub mod network;
pub mod pipeline;
pub mod relaxation;
pub mod threshold_estimate;

// Re-export main types
pub use batch::{even_split, BatchParams, BatchRunner, PairProcessor};
pub use cycles::{build_cycles, nan_rms, CycleField, CycleFieldBuilder, Histogram};
pub use decision::{decide, Correction, CorrectionDecider, CorrectionStats, Outcome, Screening};
pub use diagnostics::{DiagnosticPlotter, NetworkRenderer, NullPlotter, PngPlotter};
pub use network::{LinkNetworkEvaluator, NetworkGapEvaluator, NetworkReport};
pub use pipeline::{CorrectionPipeline, FramePairProcessor, PipelineConfig};
pub use relaxation::{LoopState, RelaxationOutcome, RelaxationParams, ThresholdRelaxationLoop};
pub use threshold_estimate::{ResidualStatistics, ThresholdEstimator};
