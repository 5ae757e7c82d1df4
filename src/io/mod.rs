//! I/O modules for frame layout, rasters, parameter files and reports

pub mod baselines;
pub mod layout;
pub mod par_file;
pub mod raster;
pub mod reference;
pub mod report;

pub use baselines::Baselines;
pub use layout::{FrameLayout, LayoutParams};
pub use par_file::{ImageGeometry, TargetSelection, ThresholdSource};
pub use raster::{link_or_copy, RasterStore};
pub use reference::ReferencePoint;
pub use report::ReportWriter;
