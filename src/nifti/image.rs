//! In-memory NIfTI volume: header plus voxel payload.
//!
//! Voxel arrays are kept in Fortran (column-major) memory order, the NIfTI
//! on-disk convention, so byte-level encode/decode is a straight copy.

use crate::error::{Error, Result};
use crate::nifti::header::{DataType, NiftiHeader};
use byteorder::{ByteOrder, LittleEndian};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};

/// Element types a volume can hold, tied to their `NIfTI` datatype code.
pub trait NiftiElement: Copy + Send + Sync + 'static {
    /// The on-disk datatype for this element type.
    const DTYPE: DataType;
    /// Zero value, used when re-laying arrays out in F-order.
    const ZERO: Self;
    /// Wrap an array of this element type into [`VoxelData`].
    fn wrap(array: ArrayD<Self>) -> VoxelData;
}

macro_rules! impl_element {
    ($($t:ty => $variant:ident, $dtype:ident, $zero:expr;)*) => {
        $(impl NiftiElement for $t {
            const DTYPE: DataType = DataType::$dtype;
            const ZERO: Self = $zero;
            fn wrap(array: ArrayD<Self>) -> VoxelData {
                VoxelData::$variant(array)
            }
        })*
    };
}

impl_element! {
    u8  => U8,  UInt8,   0;
    i8  => I8,  Int8,    0;
    i16 => I16, Int16,   0;
    u16 => U16, UInt16,  0;
    i32 => I32, Int32,   0;
    u32 => U32, UInt32,  0;
    i64 => I64, Int64,   0;
    u64 => U64, UInt64,  0;
    f32 => F32, Float32, 0.0;
    f64 => F64, Float64, 0.0;
}

/// Voxel payload, one variant per supported on-disk data type.
#[derive(Debug, Clone)]
pub enum VoxelData {
    /// Unsigned 8-bit voxels.
    U8(ArrayD<u8>),
    /// Signed 8-bit voxels.
    I8(ArrayD<i8>),
    /// Signed 16-bit voxels.
    I16(ArrayD<i16>),
    /// Unsigned 16-bit voxels.
    U16(ArrayD<u16>),
    /// Signed 32-bit voxels.
    I32(ArrayD<i32>),
    /// Unsigned 32-bit voxels.
    U32(ArrayD<u32>),
    /// Signed 64-bit voxels.
    I64(ArrayD<i64>),
    /// Unsigned 64-bit voxels.
    U64(ArrayD<u64>),
    /// 32-bit float voxels.
    F32(ArrayD<f32>),
    /// 64-bit float voxels.
    F64(ArrayD<f64>),
}

macro_rules! with_array {
    ($data:expr, $a:ident => $body:expr) => {
        match $data {
            VoxelData::U8($a) => $body,
            VoxelData::I8($a) => $body,
            VoxelData::I16($a) => $body,
            VoxelData::U16($a) => $body,
            VoxelData::I32($a) => $body,
            VoxelData::U32($a) => $body,
            VoxelData::I64($a) => $body,
            VoxelData::U64($a) => $body,
            VoxelData::F32($a) => $body,
            VoxelData::F64($a) => $body,
        }
    };
}

impl VoxelData {
    /// On-disk datatype of this payload.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::U8(_) => DataType::UInt8,
            Self::I8(_) => DataType::Int8,
            Self::I16(_) => DataType::Int16,
            Self::U16(_) => DataType::UInt16,
            Self::I32(_) => DataType::Int32,
            Self::U32(_) => DataType::UInt32,
            Self::I64(_) => DataType::Int64,
            Self::U64(_) => DataType::UInt64,
            Self::F32(_) => DataType::Float32,
            Self::F64(_) => DataType::Float64,
        }
    }

    /// Array shape.
    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        with_array!(self, a => a.ndim())
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        with_array!(self, a => a.len())
    }

    /// True when the payload holds no voxels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A NIfTI volume: header metadata plus voxel data.
#[derive(Debug, Clone)]
pub struct NiftiImage {
    header: NiftiHeader,
    data: VoxelData,
}

impl NiftiImage {
    /// Build an image from an existing header and payload.
    ///
    /// The header's dims are trusted to match the payload; [`crate::nifti::save`]
    /// re-validates before writing.
    pub fn from_parts(header: NiftiHeader, data: VoxelData) -> Self {
        Self { header, data }
    }

    /// Build an image from a voxel array and a 4x4 voxel-to-world affine.
    ///
    /// The array is re-laid out in Fortran order if it is not already, per
    /// the NIfTI convention. A fresh NIfTI-1 header is derived from the
    /// array's shape and element type.
    pub fn from_array<T: NiftiElement>(data: ArrayD<T>, affine: [[f64; 4]; 4]) -> Self {
        let data = to_f_order(data);

        let mut header = NiftiHeader {
            datatype: T::DTYPE,
            ndim: data.ndim() as u8,
            scl_slope: 1.0,
            scl_inter: 0.0,
            ..NiftiHeader::default()
        };
        header.dim = [1; 7];
        for (i, &d) in data.shape().iter().take(7).enumerate() {
            header.dim[i] = d as i64;
        }
        header.set_affine(affine);

        Self {
            header,
            data: T::wrap(data),
        }
    }

    /// Header metadata.
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// Mutable header metadata. Dims and datatype are re-validated on save.
    pub fn header_mut(&mut self) -> &mut NiftiHeader {
        &mut self.header
    }

    /// Voxel payload.
    pub fn data(&self) -> &VoxelData {
        &self.data
    }

    /// Image shape.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Element datatype.
    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    /// Voxel-to-world affine from the header.
    pub fn affine(&self) -> [[f64; 4]; 4] {
        self.header.affine()
    }

    /// Materialize the voxels as signed 32-bit labels.
    ///
    /// Applies the header's scl slope/intercept when set (slope 0 means
    /// unscaled per the standard), then truncates toward zero, matching how
    /// label volumes stored as floats are conventionally read back.
    pub fn to_i32(&self) -> Result<ArrayD<i32>> {
        let slope = match self.header.scl_slope {
            s if s == 0.0 || !s.is_finite() => 1.0,
            s => s,
        };
        let inter = match self.header.scl_inter {
            i if !i.is_finite() => 0.0,
            i => i,
        };
        let scaled = slope != 1.0 || inter != 0.0;

        macro_rules! cast {
            ($a:expr) => {{
                let slice = $a.as_slice_memory_order().ok_or_else(|| {
                    Error::NonContiguousArray("voxel array must be contiguous to read labels".into())
                })?;
                let values: Vec<i32> = if scaled {
                    slice
                        .iter()
                        .map(|&v| (v as f64).mul_add(slope, inter) as i32)
                        .collect()
                } else {
                    slice.iter().map(|&v| v as i32).collect()
                };
                ArrayD::from_shape_vec(IxDyn($a.shape()).f(), values).map_err(|e| {
                    Error::InvalidDimensions(format!("failed to rebuild label array: {e}"))
                })?
            }};
        }

        Ok(with_array!(&self.data, a => cast!(a)))
    }

    /// Serialize the voxel payload as little-endian bytes in memory order.
    pub fn data_to_bytes(&self) -> Result<Vec<u8>> {
        macro_rules! encode {
            ($a:expr, $elem:ty, $write:path) => {{
                let slice = $a.as_slice_memory_order().ok_or_else(|| {
                    Error::NonContiguousArray("voxel array must be contiguous to serialize".into())
                })?;
                let mut buf = vec![0u8; slice.len() * std::mem::size_of::<$elem>()];
                $write(slice, &mut buf);
                buf
            }};
        }

        Ok(match &self.data {
            VoxelData::U8(a) => a
                .as_slice_memory_order()
                .ok_or_else(|| {
                    Error::NonContiguousArray("voxel array must be contiguous to serialize".into())
                })?
                .to_vec(),
            VoxelData::I8(a) => a
                .as_slice_memory_order()
                .ok_or_else(|| {
                    Error::NonContiguousArray("voxel array must be contiguous to serialize".into())
                })?
                .iter()
                .map(|&v| v as u8)
                .collect(),
            VoxelData::I16(a) => encode!(a, i16, LittleEndian::write_i16_into),
            VoxelData::U16(a) => encode!(a, u16, LittleEndian::write_u16_into),
            VoxelData::I32(a) => encode!(a, i32, LittleEndian::write_i32_into),
            VoxelData::U32(a) => encode!(a, u32, LittleEndian::write_u32_into),
            VoxelData::I64(a) => encode!(a, i64, LittleEndian::write_i64_into),
            VoxelData::U64(a) => encode!(a, u64, LittleEndian::write_u64_into),
            VoxelData::F32(a) => encode!(a, f32, LittleEndian::write_f32_into),
            VoxelData::F64(a) => encode!(a, f64, LittleEndian::write_f64_into),
        })
    }
}

/// Re-lay an array out in Fortran order unless it already is.
fn to_f_order<T: NiftiElement>(a: ArrayD<T>) -> ArrayD<T> {
    let is_f_contiguous = a.t().is_standard_layout();
    if is_f_contiguous {
        a
    } else {
        let shape = a.shape().to_vec();
        let mut f = ArrayD::from_elem(IxDyn(&shape).f(), T::ZERO);
        f.assign(&a);
        f
    }
}
