//! Combine labels in discrete segmentation (dseg) NIfTI volumes.
//!
//! A dseg volume assigns each voxel an integer label identifying a region
//! (a parcellation, a tissue map). This crate merges groups of those labels
//! into fewer region-of-interest labels: build a mapping from a grouping
//! specification, pick a minimal signed integer width for the result, and
//! relabel every voxel, carrying the spatial metadata through unchanged.
//!
//! ```ignore
//! use dsegroi::{combine_dseg_labels, CombineOptions, GroupSpec};
//!
//! // Merge labels 17 and 53 (left/right hippocampus) into ROI 1.
//! let groups = GroupSpec::parse("{1: [17, 53]}")?;
//! let options = CombineOptions::new().output("hippocampus_roi.nii.gz");
//! let combined = combine_dseg_labels("aparc_dseg.nii.gz", &groups, &options)?;
//! println!("{} labels mapped", combined.map.len());
//! ```

pub mod cli;
pub mod error;
pub mod nifti;
pub mod roi;

pub use error::{Error, Result};
pub use roi::{
    combine_dseg_labels, Combined, CombineOptions, DsegInput, GroupSpec, LabelConflict, LabelMap,
    OutDtype,
};
