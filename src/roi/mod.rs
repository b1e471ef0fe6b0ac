//! ROI label combination: grouping input, label mapping, output width
//! selection, and the volume transform.

pub mod combine;
pub mod dtype;
pub mod groups;
pub mod map;

pub use combine::{combine_dseg_labels, Combined, CombineOptions, DsegInput};
pub use dtype::OutDtype;
pub use groups::GroupSpec;
pub use map::{LabelConflict, LabelMap};
