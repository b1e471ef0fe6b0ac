//! Combine dseg labels into ROI labels.
//!
//! The transform is a pure function of (volume, grouping, options) apart
//! from the optional save and the conflict warnings: voxels whose label is
//! mapped take their new label, unmapped voxels become background, and with
//! zero preservation on (the default) background stays background even when
//! 0 appears in a group.

use crate::error::{Error, Result};
use crate::nifti::{self, NiftiImage, VoxelData};
use crate::roi::dtype::OutDtype;
use crate::roi::groups::GroupSpec;
use crate::roi::map::LabelMap;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Input volume: an on-disk path or an already-loaded image.
#[derive(Debug)]
pub enum DsegInput {
    /// Load the volume from this path.
    Path(PathBuf),
    /// Use this volume directly.
    Image(NiftiImage),
}

impl From<&Path> for DsegInput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for DsegInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&str> for DsegInput {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<NiftiImage> for DsegInput {
    fn from(image: NiftiImage) -> Self {
        Self::Image(image)
    }
}

/// Options for [`combine_dseg_labels`].
#[derive(Debug, Clone)]
pub struct CombineOptions {
    /// Where to save the combined volume; nothing is written when unset.
    pub output: Option<PathBuf>,
    /// New label of the first group when the grouping is an ordered list.
    pub start_label: i32,
    /// Keep original zero voxels at zero, even if 0 appears in a group.
    pub preserve_zero: bool,
    /// Output width override. Auto-selected from the largest new label when
    /// unset. An explicit width is used as given: values that do not fit
    /// wrap, matching a plain integer narrowing.
    pub out_dtype: Option<OutDtype>,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            output: None,
            start_label: 1,
            preserve_zero: true,
            out_dtype: None,
        }
    }
}

impl CombineOptions {
    /// Default options: start label 1, preserve zero, auto width, no output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the combined volume to `path`.
    pub fn output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Set the first new label for the ordered-groups form.
    pub fn start_label(mut self, label: i32) -> Self {
        self.start_label = label;
        self
    }

    /// Control zero preservation.
    pub fn preserve_zero(mut self, preserve: bool) -> Self {
        self.preserve_zero = preserve;
        self
    }

    /// Force the output width.
    pub fn out_dtype(mut self, dtype: OutDtype) -> Self {
        self.out_dtype = Some(dtype);
        self
    }
}

/// A combined volume together with the mapping that produced it.
#[derive(Debug)]
pub struct Combined {
    /// The relabeled volume, spatial metadata carried over from the input.
    pub image: NiftiImage,
    /// The original-to-new mapping, including dropped conflict claims.
    pub map: LabelMap,
}

/// Combine label values in a dseg volume into fewer ROI labels.
///
/// Loads the input if given as a path, builds the label mapping from
/// `groups`, picks the output width, relabels every voxel, and optionally
/// saves the result. The returned image keeps the input's spatial metadata;
/// only the voxel values and the datatype change.
///
/// # Example
/// ```ignore
/// // Merge labels 17 and 53 into ROI 1.
/// let groups = GroupSpec::parse("{1: [17, 53]}")?;
/// let combined = combine_dseg_labels("dseg.nii.gz", &groups, &CombineOptions::new())?;
/// ```
pub fn combine_dseg_labels(
    input: impl Into<DsegInput>,
    groups: &GroupSpec,
    options: &CombineOptions,
) -> Result<Combined> {
    let image = match input.into() {
        DsegInput::Path(path) => nifti::load(path)?,
        DsegInput::Image(image) => image,
    };
    let labels = image.to_i32()?;

    let map = LabelMap::from_spec(groups, options.start_label)?;

    let reserve = i32::from(options.preserve_zero);
    let needed = map.max_new_label().max(reserve);
    let out_dtype = options.out_dtype.unwrap_or_else(|| OutDtype::fit(needed));
    tracing::debug!(
        mapped_labels = map.len(),
        max_new_label = map.max_new_label(),
        %out_dtype,
        "combining labels"
    );

    let data = remap(&labels, &map, options.preserve_zero, out_dtype)?;

    let mut header = image.header().clone();
    header.datatype = out_dtype.datatype();
    let combined = NiftiImage::from_parts(header, data);

    if let Some(path) = &options.output {
        nifti::save(&combined, path)?;
    }

    Ok(Combined {
        image: combined,
        map,
    })
}

/// Relabel every voxel into a fresh array of the chosen width.
///
/// Distinct original labels touch disjoint voxel sets, so a single pass
/// with a lookup per voxel is equivalent to applying the mapping entries
/// one at a time. New labels are narrowed with `as`, so a width too small
/// for the largest label wraps rather than erroring.
fn remap(
    labels: &ArrayD<i32>,
    map: &LabelMap,
    preserve_zero: bool,
    out_dtype: OutDtype,
) -> Result<VoxelData> {
    let slice = labels.as_slice_memory_order().ok_or_else(|| {
        Error::NonContiguousArray("label array must be contiguous to remap".into())
    })?;
    let shape = labels.shape();

    macro_rules! remap_into {
        ($t:ty, $variant:ident) => {{
            let mut out = vec![0 as $t; slice.len()];
            out.par_iter_mut().zip(slice.par_iter()).for_each(|(o, &v)| {
                if preserve_zero && v == 0 {
                    return; // background stays background
                }
                if let Some(new_label) = map.get(v) {
                    *o = new_label as $t;
                }
            });
            VoxelData::$variant(
                ArrayD::from_shape_vec(IxDyn(shape).f(), out).map_err(|e| {
                    Error::InvalidDimensions(format!("failed to build output array: {e}"))
                })?,
            )
        }};
    }

    Ok(match out_dtype {
        OutDtype::Int8 => remap_into!(i8, I8),
        OutDtype::Int16 => remap_into!(i16, I16),
        OutDtype::Int32 => remap_into!(i32, I32),
    })
}
