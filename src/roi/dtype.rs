//! Output integer width selection.
//!
//! Kept separate from the transform so the boundary cases (127 vs 128,
//! 32767 vs 32768) are testable on their own.

use crate::error::Error;
use crate::nifti::DataType;

/// Signed integer widths a combined volume can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutDtype {
    /// Signed 8-bit output.
    Int8,
    /// Signed 16-bit output.
    Int16,
    /// Signed 32-bit output.
    Int32,
}

impl OutDtype {
    /// Largest label value this width can represent.
    pub const fn max_value(self) -> i32 {
        match self {
            Self::Int8 => i8::MAX as i32,
            Self::Int16 => i16::MAX as i32,
            Self::Int32 => i32::MAX,
        }
    }

    /// Smallest width whose maximum is at least `needed`.
    pub fn fit(needed: i32) -> Self {
        if needed <= Self::Int8.max_value() {
            Self::Int8
        } else if needed <= Self::Int16.max_value() {
            Self::Int16
        } else {
            Self::Int32
        }
    }

    /// Corresponding `NIfTI` datatype code.
    pub const fn datatype(self) -> DataType {
        match self {
            Self::Int8 => DataType::Int8,
            Self::Int16 => DataType::Int16,
            Self::Int32 => DataType::Int32,
        }
    }
}

impl std::fmt::Display for OutDtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for OutDtype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "i8" | "int8" => Ok(Self::Int8),
            "i16" | "int16" => Ok(Self::Int16),
            "i32" | "int32" => Ok(Self::Int32),
            _ => Err(Error::Configuration(format!(
                "unknown output dtype: '{s}' (expected int8, int16, or int32)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_picks_smallest_sufficient_width() {
        assert_eq!(OutDtype::fit(0), OutDtype::Int8);
        assert_eq!(OutDtype::fit(100), OutDtype::Int8);
        assert_eq!(OutDtype::fit(127), OutDtype::Int8);
        assert_eq!(OutDtype::fit(128), OutDtype::Int16);
        assert_eq!(OutDtype::fit(200), OutDtype::Int16);
        assert_eq!(OutDtype::fit(32_767), OutDtype::Int16);
        assert_eq!(OutDtype::fit(32_768), OutDtype::Int32);
    }

    #[test]
    fn parses_width_names() {
        assert_eq!("int8".parse::<OutDtype>().unwrap(), OutDtype::Int8);
        assert_eq!("INT16".parse::<OutDtype>().unwrap(), OutDtype::Int16);
        assert_eq!("i32".parse::<OutDtype>().unwrap(), OutDtype::Int32);
        assert!("float32".parse::<OutDtype>().is_err());
    }

    #[test]
    fn maps_to_nifti_datatypes() {
        assert_eq!(OutDtype::Int8.datatype(), DataType::Int8);
        assert_eq!(OutDtype::Int16.datatype(), DataType::Int16);
        assert_eq!(OutDtype::Int32.datatype(), DataType::Int32);
    }
}
