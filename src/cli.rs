//! Command-line interface.

use crate::error::Result;
use crate::roi::{combine_dseg_labels, CombineOptions, GroupSpec, OutDtype};
use clap::Parser;
use std::path::PathBuf;

/// Combine labels in a dseg NIfTI volume into ROI labels.
#[derive(Parser, Debug)]
#[command(name = "dsegroi", version, about = "Combine labels in a dseg NIfTI")]
pub struct Cli {
    /// Path to the input dseg NIfTI (.nii or .nii.gz).
    pub dseg: PathBuf,

    /// Groups mapping: JSON or Python-style literal, or a path to a file
    /// containing either. Examples: '[[1,2,3],[4,5]]' or '{1:[1,2,3],2:[4,5]}'.
    #[arg(short, long)]
    pub groups: String,

    /// Output NIfTI path. Nothing is written when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// First new label when the groups are given as an ordered list.
    #[arg(long, default_value_t = 1)]
    pub start_label: i32,

    /// Keep original zero voxels at zero (default).
    #[arg(long, overrides_with = "no_preserve_zero")]
    preserve_zero: bool,

    /// Map zero voxels like any other label.
    #[arg(long, overrides_with = "preserve_zero")]
    no_preserve_zero: bool,

    /// Output dtype (int8, int16, int32). Inferred from the largest new
    /// label when omitted.
    #[arg(long)]
    pub out_dtype: Option<OutDtype>,
}

impl Cli {
    /// Effective zero-preservation setting (on unless `--no-preserve-zero`).
    pub fn preserve_zero(&self) -> bool {
        !self.no_preserve_zero
    }

    /// Run the combination described by these arguments.
    pub fn run(&self) -> Result<()> {
        let groups = GroupSpec::from_arg(&self.groups)?;

        let options = CombineOptions {
            output: self.output.clone(),
            start_label: self.start_label,
            preserve_zero: self.preserve_zero(),
            out_dtype: self.out_dtype,
        };

        combine_dseg_labels(self.dseg.as_path(), &groups, &options)?;

        match &self.output {
            Some(path) => println!("Saved combined dseg to {}", path.display()),
            None => println!("Combined labels (no output file)."),
        }
        Ok(())
    }
}
