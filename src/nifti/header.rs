//! `NIfTI` header parsing and representation.
//!
//! Supports NIfTI-1 (348-byte) and NIfTI-2 (540-byte) headers with automatic
//! version and endianness detection. Only the fields a label volume needs to
//! round-trip are modeled; everything spatial is carried through untouched so
//! a relabeled volume keeps the geometry of its source.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// NIfTI format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NiftiVersion {
    /// NIfTI-1 (348-byte header, 16-bit dimensions)
    #[default]
    Nifti1,
    /// NIfTI-2 (540-byte header, 64-bit dimensions)
    Nifti2,
}

impl NiftiVersion {
    /// Header size in bytes for this version.
    pub const fn header_size(self) -> usize {
        match self {
            Self::Nifti1 => 348,
            Self::Nifti2 => 540,
        }
    }

    /// Default data offset for this version (header + extender padding).
    pub const fn default_vox_offset(self) -> i64 {
        match self {
            Self::Nifti1 => 352,
            Self::Nifti2 => 544,
        }
    }
}

/// NIfTI-1 field byte offsets.
mod v1 {
    pub const DIM: usize = 40;
    pub const INTENT_CODE: usize = 68;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const XYZT_UNITS: usize = 123;
    pub const DESCRIP: usize = 148;
    pub const AUX_FILE: usize = 228;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const QUATERN: usize = 256;
    pub const QOFFSET: usize = 268;
    pub const SROW: usize = 280;
    pub const MAGIC: usize = 344;
}

/// NIfTI-2 field byte offsets.
mod v2 {
    pub const MAGIC: usize = 4;
    pub const DATATYPE: usize = 12;
    pub const BITPIX: usize = 14;
    pub const DIM: usize = 16;
    pub const PIXDIM: usize = 104;
    pub const VOX_OFFSET: usize = 168;
    pub const SCL_SLOPE: usize = 176;
    pub const SCL_INTER: usize = 184;
    pub const DESCRIP: usize = 240;
    pub const AUX_FILE: usize = 320;
    pub const QFORM_CODE: usize = 344;
    pub const SFORM_CODE: usize = 348;
    pub const QUATERN: usize = 352;
    pub const QOFFSET: usize = 376;
    pub const SROW: usize = 400;
    pub const XYZT_UNITS: usize = 500;
    pub const INTENT_CODE: usize = 504;
}

/// `NIfTI` data type codes a segmentation volume may be stored in.
///
/// Discrete label maps are nominally integer, but tools in the wild write
/// them as floats too, so the float codes are accepted on load and cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum DataType {
    /// Unsigned 8-bit integer
    UInt8 = 2,
    /// Signed 16-bit integer
    Int16 = 4,
    /// Signed 32-bit integer
    Int32 = 8,
    /// 32-bit floating point
    Float32 = 16,
    /// 64-bit floating point
    Float64 = 64,
    /// Signed 8-bit integer
    Int8 = 256,
    /// Unsigned 16-bit integer
    UInt16 = 512,
    /// Unsigned 32-bit integer
    UInt32 = 768,
    /// Signed 64-bit integer
    Int64 = 1024,
    /// Unsigned 64-bit integer
    UInt64 = 1280,
}

impl DataType {
    /// Parse from a `NIfTI` datatype code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            2 => Ok(Self::UInt8),
            4 => Ok(Self::Int16),
            8 => Ok(Self::Int32),
            16 => Ok(Self::Float32),
            64 => Ok(Self::Float64),
            256 => Ok(Self::Int8),
            512 => Ok(Self::UInt16),
            768 => Ok(Self::UInt32),
            1024 => Ok(Self::Int64),
            1280 => Ok(Self::UInt64),
            _ => Err(Error::UnsupportedDataType(code)),
        }
    }

    /// Size of each element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Rust type name, for messages.
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::UInt8 => "u8",
            Self::Int8 => "i8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Int64 => "i64",
            Self::UInt64 => "u64",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Unified header over both NIfTI versions.
///
/// Fields use the wider NIfTI-2 representations (i64 dims, f64 floats);
/// NIfTI-1 writing downcasts. The `xyzt_units` code byte is carried raw:
/// this crate never interprets units, it only passes them through.
#[derive(Debug, Clone)]
pub struct NiftiHeader {
    /// Format version the file was read as (and will be written as).
    pub version: NiftiVersion,
    /// Number of dimensions (1-7).
    pub ndim: u8,
    /// Size along each dimension.
    pub dim: [i64; 7],
    /// Element data type.
    pub datatype: DataType,
    /// qfac at index 0, voxel sizes at 1..=ndim.
    pub pixdim: [f64; 8],
    /// Byte offset of the data section.
    pub vox_offset: i64,
    /// Data scaling slope (0 means "no scaling" per the standard).
    pub scl_slope: f64,
    /// Data scaling intercept.
    pub scl_inter: f64,
    /// Raw spatial/temporal units code.
    pub xyzt_units: u8,
    /// Intent code.
    pub intent_code: i32,
    /// Free-text description.
    pub descrip: String,
    /// Auxiliary filename.
    pub aux_file: String,
    /// qform transform code.
    pub qform_code: i32,
    /// sform transform code.
    pub sform_code: i32,
    /// Quaternion b, c, d for the qform.
    pub quatern: [f64; 3],
    /// qform offsets x, y, z.
    pub qoffset: [f64; 3],
    /// First three rows of the sform affine.
    pub srow: [[f64; 4]; 3],
    /// File endianness (true = little endian).
    pub(crate) little_endian: bool,
}

impl Default for NiftiHeader {
    fn default() -> Self {
        Self {
            version: NiftiVersion::Nifti1,
            ndim: 3,
            dim: [1, 1, 1, 1, 1, 1, 1],
            datatype: DataType::Int32,
            pixdim: [1.0; 8],
            vox_offset: 352,
            scl_slope: 1.0,
            scl_inter: 0.0,
            xyzt_units: 2, // millimeters
            intent_code: 0,
            descrip: String::new(),
            aux_file: String::new(),
            qform_code: 0,
            sform_code: 1,
            quatern: [0.0; 3],
            qoffset: [0.0; 3],
            srow: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
            ],
            little_endian: true,
        }
    }
}

impl NiftiHeader {
    /// NIfTI-1 header size in bytes.
    pub const SIZE: usize = 348;

    /// Header size for this header's version.
    pub fn header_size(&self) -> usize {
        self.version.header_size()
    }

    /// Read a header from bytes, detecting version and endianness from the
    /// leading `sizeof_hdr` field.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "header too short to detect version",
            )));
        }

        let le = LittleEndian::read_i32(&bytes[0..4]);
        let be = BigEndian::read_i32(&bytes[0..4]);
        let (version, little_endian) = match (le, be) {
            (348, _) => (NiftiVersion::Nifti1, true),
            (_, 348) => (NiftiVersion::Nifti1, false),
            (540, _) => (NiftiVersion::Nifti2, true),
            (_, 540) => (NiftiVersion::Nifti2, false),
            _ => {
                return Err(Error::InvalidMagic([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ]))
            }
        };

        if bytes.len() < version.header_size() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "header too short: got {} bytes, need {} for {:?}",
                    bytes.len(),
                    version.header_size(),
                    version
                ),
            )));
        }

        let header = match (version, little_endian) {
            (NiftiVersion::Nifti1, true) => Self::parse_v1::<LittleEndian>(bytes, true)?,
            (NiftiVersion::Nifti1, false) => Self::parse_v1::<BigEndian>(bytes, false)?,
            (NiftiVersion::Nifti2, true) => Self::parse_v2::<LittleEndian>(bytes, true)?,
            (NiftiVersion::Nifti2, false) => Self::parse_v2::<BigEndian>(bytes, false)?,
        };
        header.validate()?;
        Ok(header)
    }

    fn parse_v1<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        let magic = &bytes[v1::MAGIC..v1::MAGIC + 4];
        if magic != b"n+1\0" && magic != b"ni1\0" {
            return Err(Error::InvalidMagic([
                magic[0], magic[1], magic[2], magic[3],
            ]));
        }

        let i16_at = |off: usize| E::read_i16(&bytes[off..off + 2]);
        let f32_at = |off: usize| f64::from(E::read_f32(&bytes[off..off + 4]));

        let ndim = checked_ndim(i64::from(i16_at(v1::DIM)))?;
        let mut dim = [1i64; 7];
        for (i, d) in dim.iter_mut().enumerate() {
            let raw = i16_at(v1::DIM + 2 + i * 2);
            if raw < 0 {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {i} has negative value: {raw}"
                )));
            }
            *d = i64::from(raw);
        }

        let datatype = checked_datatype(i16_at(v1::DATATYPE), i16_at(v1::BITPIX))?;

        let mut pixdim = [0.0f64; 8];
        for (i, p) in pixdim.iter_mut().enumerate() {
            *p = f32_at(v1::PIXDIM + i * 4);
        }

        let vox_offset = f32_at(v1::VOX_OFFSET);
        if !vox_offset.is_finite() || vox_offset.fract() != 0.0 {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset must be a finite integer, got {vox_offset}"
            )));
        }

        Ok(Self {
            version: NiftiVersion::Nifti1,
            ndim,
            dim,
            datatype,
            pixdim,
            vox_offset: vox_offset as i64,
            scl_slope: f32_at(v1::SCL_SLOPE),
            scl_inter: f32_at(v1::SCL_INTER),
            xyzt_units: bytes[v1::XYZT_UNITS],
            intent_code: i32::from(i16_at(v1::INTENT_CODE)),
            descrip: fixed_str(&bytes[v1::DESCRIP..v1::DESCRIP + 80]),
            aux_file: fixed_str(&bytes[v1::AUX_FILE..v1::AUX_FILE + 24]),
            qform_code: i32::from(i16_at(v1::QFORM_CODE)),
            sform_code: i32::from(i16_at(v1::SFORM_CODE)),
            quatern: [
                f32_at(v1::QUATERN),
                f32_at(v1::QUATERN + 4),
                f32_at(v1::QUATERN + 8),
            ],
            qoffset: [
                f32_at(v1::QOFFSET),
                f32_at(v1::QOFFSET + 4),
                f32_at(v1::QOFFSET + 8),
            ],
            srow: [
                [
                    f32_at(v1::SROW),
                    f32_at(v1::SROW + 4),
                    f32_at(v1::SROW + 8),
                    f32_at(v1::SROW + 12),
                ],
                [
                    f32_at(v1::SROW + 16),
                    f32_at(v1::SROW + 20),
                    f32_at(v1::SROW + 24),
                    f32_at(v1::SROW + 28),
                ],
                [
                    f32_at(v1::SROW + 32),
                    f32_at(v1::SROW + 36),
                    f32_at(v1::SROW + 40),
                    f32_at(v1::SROW + 44),
                ],
            ],
            little_endian,
        })
    }

    fn parse_v2<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        let magic = &bytes[v2::MAGIC..v2::MAGIC + 8];
        if magic != b"n+2\0\r\n\x1a\n" && magic != b"ni2\0\r\n\x1a\n" {
            return Err(Error::InvalidMagic([
                magic[0], magic[1], magic[2], magic[3],
            ]));
        }

        let i64_at = |off: usize| E::read_i64(&bytes[off..off + 8]);
        let f64_at = |off: usize| E::read_f64(&bytes[off..off + 8]);

        let ndim = checked_ndim(i64_at(v2::DIM))?;
        let mut dim = [1i64; 7];
        for (i, d) in dim.iter_mut().enumerate() {
            let raw = i64_at(v2::DIM + 8 + i * 8);
            if raw < 0 {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {i} has negative value: {raw}"
                )));
            }
            *d = raw;
        }

        let datatype = checked_datatype(
            E::read_i16(&bytes[v2::DATATYPE..v2::DATATYPE + 2]),
            E::read_i16(&bytes[v2::BITPIX..v2::BITPIX + 2]),
        )?;

        let mut pixdim = [0.0f64; 8];
        for (i, p) in pixdim.iter_mut().enumerate() {
            *p = f64_at(v2::PIXDIM + i * 8);
        }

        Ok(Self {
            version: NiftiVersion::Nifti2,
            ndim,
            dim,
            datatype,
            pixdim,
            vox_offset: i64_at(v2::VOX_OFFSET),
            scl_slope: f64_at(v2::SCL_SLOPE),
            scl_inter: f64_at(v2::SCL_INTER),
            xyzt_units: E::read_i32(&bytes[v2::XYZT_UNITS..v2::XYZT_UNITS + 4]) as u8,
            intent_code: E::read_i32(&bytes[v2::INTENT_CODE..v2::INTENT_CODE + 4]),
            descrip: fixed_str(&bytes[v2::DESCRIP..v2::DESCRIP + 80]),
            aux_file: fixed_str(&bytes[v2::AUX_FILE..v2::AUX_FILE + 24]),
            qform_code: E::read_i32(&bytes[v2::QFORM_CODE..v2::QFORM_CODE + 4]),
            sform_code: E::read_i32(&bytes[v2::SFORM_CODE..v2::SFORM_CODE + 4]),
            quatern: [
                f64_at(v2::QUATERN),
                f64_at(v2::QUATERN + 8),
                f64_at(v2::QUATERN + 16),
            ],
            qoffset: [
                f64_at(v2::QOFFSET),
                f64_at(v2::QOFFSET + 8),
                f64_at(v2::QOFFSET + 16),
            ],
            srow: [
                [
                    f64_at(v2::SROW),
                    f64_at(v2::SROW + 8),
                    f64_at(v2::SROW + 16),
                    f64_at(v2::SROW + 24),
                ],
                [
                    f64_at(v2::SROW + 32),
                    f64_at(v2::SROW + 40),
                    f64_at(v2::SROW + 48),
                    f64_at(v2::SROW + 56),
                ],
                [
                    f64_at(v2::SROW + 64),
                    f64_at(v2::SROW + 72),
                    f64_at(v2::SROW + 80),
                    f64_at(v2::SROW + 88),
                ],
            ],
            little_endian,
        })
    }

    /// Serialize in this header's version (always little endian).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self.version {
            NiftiVersion::Nifti1 => self.to_bytes_v1(),
            NiftiVersion::Nifti2 => self.to_bytes_v2(),
        }
    }

    fn to_bytes_v1(&self) -> Vec<u8> {
        let mut buf = vec![0u8; NiftiVersion::Nifti1.header_size()];
        LittleEndian::write_i32(&mut buf[0..4], 348);

        LittleEndian::write_i16(&mut buf[v1::DIM..v1::DIM + 2], i16::from(self.ndim));
        for i in 0..7 {
            let off = v1::DIM + 2 + i * 2;
            let d = self.dim[i].min(i64::from(i16::MAX)) as i16;
            LittleEndian::write_i16(&mut buf[off..off + 2], d);
        }

        LittleEndian::write_i16(&mut buf[v1::DATATYPE..v1::DATATYPE + 2], self.datatype as i16);
        LittleEndian::write_i16(
            &mut buf[v1::BITPIX..v1::BITPIX + 2],
            (self.datatype.byte_size() * 8) as i16,
        );
        LittleEndian::write_i16(
            &mut buf[v1::INTENT_CODE..v1::INTENT_CODE + 2],
            self.intent_code as i16,
        );

        for (i, &p) in self.pixdim.iter().enumerate() {
            let off = v1::PIXDIM + i * 4;
            LittleEndian::write_f32(&mut buf[off..off + 4], p as f32);
        }

        LittleEndian::write_f32(
            &mut buf[v1::VOX_OFFSET..v1::VOX_OFFSET + 4],
            self.vox_offset as f32,
        );
        LittleEndian::write_f32(
            &mut buf[v1::SCL_SLOPE..v1::SCL_SLOPE + 4],
            self.scl_slope as f32,
        );
        LittleEndian::write_f32(
            &mut buf[v1::SCL_INTER..v1::SCL_INTER + 4],
            self.scl_inter as f32,
        );
        buf[v1::XYZT_UNITS] = self.xyzt_units;

        write_fixed_str(&mut buf[v1::DESCRIP..v1::DESCRIP + 80], &self.descrip);
        write_fixed_str(&mut buf[v1::AUX_FILE..v1::AUX_FILE + 24], &self.aux_file);

        LittleEndian::write_i16(
            &mut buf[v1::QFORM_CODE..v1::QFORM_CODE + 2],
            self.qform_code as i16,
        );
        LittleEndian::write_i16(
            &mut buf[v1::SFORM_CODE..v1::SFORM_CODE + 2],
            self.sform_code as i16,
        );

        for (i, &q) in self.quatern.iter().enumerate() {
            let off = v1::QUATERN + i * 4;
            LittleEndian::write_f32(&mut buf[off..off + 4], q as f32);
        }
        for (i, &q) in self.qoffset.iter().enumerate() {
            let off = v1::QOFFSET + i * 4;
            LittleEndian::write_f32(&mut buf[off..off + 4], q as f32);
        }
        for (r, row) in self.srow.iter().enumerate() {
            for (c, &x) in row.iter().enumerate() {
                let off = v1::SROW + (r * 4 + c) * 4;
                LittleEndian::write_f32(&mut buf[off..off + 4], x as f32);
            }
        }

        buf[v1::MAGIC..v1::MAGIC + 4].copy_from_slice(b"n+1\0");
        buf
    }

    fn to_bytes_v2(&self) -> Vec<u8> {
        let mut buf = vec![0u8; NiftiVersion::Nifti2.header_size()];
        LittleEndian::write_i32(&mut buf[0..4], 540);
        buf[v2::MAGIC..v2::MAGIC + 8].copy_from_slice(b"n+2\0\r\n\x1a\n");

        LittleEndian::write_i16(&mut buf[v2::DATATYPE..v2::DATATYPE + 2], self.datatype as i16);
        LittleEndian::write_i16(
            &mut buf[v2::BITPIX..v2::BITPIX + 2],
            (self.datatype.byte_size() * 8) as i16,
        );

        LittleEndian::write_i64(&mut buf[v2::DIM..v2::DIM + 8], i64::from(self.ndim));
        for i in 0..7 {
            let off = v2::DIM + 8 + i * 8;
            LittleEndian::write_i64(&mut buf[off..off + 8], self.dim[i]);
        }

        for (i, &p) in self.pixdim.iter().enumerate() {
            let off = v2::PIXDIM + i * 8;
            LittleEndian::write_f64(&mut buf[off..off + 8], p);
        }

        LittleEndian::write_i64(&mut buf[v2::VOX_OFFSET..v2::VOX_OFFSET + 8], self.vox_offset);
        LittleEndian::write_f64(&mut buf[v2::SCL_SLOPE..v2::SCL_SLOPE + 8], self.scl_slope);
        LittleEndian::write_f64(&mut buf[v2::SCL_INTER..v2::SCL_INTER + 8], self.scl_inter);
        LittleEndian::write_i32(
            &mut buf[v2::XYZT_UNITS..v2::XYZT_UNITS + 4],
            i32::from(self.xyzt_units),
        );
        LittleEndian::write_i32(
            &mut buf[v2::INTENT_CODE..v2::INTENT_CODE + 4],
            self.intent_code,
        );

        write_fixed_str(&mut buf[v2::DESCRIP..v2::DESCRIP + 80], &self.descrip);
        write_fixed_str(&mut buf[v2::AUX_FILE..v2::AUX_FILE + 24], &self.aux_file);

        LittleEndian::write_i32(&mut buf[v2::QFORM_CODE..v2::QFORM_CODE + 4], self.qform_code);
        LittleEndian::write_i32(&mut buf[v2::SFORM_CODE..v2::SFORM_CODE + 4], self.sform_code);

        for (i, &q) in self.quatern.iter().enumerate() {
            let off = v2::QUATERN + i * 8;
            LittleEndian::write_f64(&mut buf[off..off + 8], q);
        }
        for (i, &q) in self.qoffset.iter().enumerate() {
            let off = v2::QOFFSET + i * 8;
            LittleEndian::write_f64(&mut buf[off..off + 8], q);
        }
        for (r, row) in self.srow.iter().enumerate() {
            for (c, &x) in row.iter().enumerate() {
                let off = v2::SROW + (r * 8 + c) * 8;
                LittleEndian::write_f64(&mut buf[off..off + 8], x);
            }
        }

        buf
    }

    /// 4x4 affine mapping voxel indices to world coordinates.
    ///
    /// Resolution order: sform if set, else qform, else a pixdim-scaled
    /// identity.
    pub fn affine(&self) -> [[f64; 4]; 4] {
        if self.sform_code > 0 {
            [self.srow[0], self.srow[1], self.srow[2], [0.0, 0.0, 0.0, 1.0]]
        } else if self.qform_code > 0 {
            self.qform_affine()
        } else {
            [
                [self.pixdim[1], 0.0, 0.0, 0.0],
                [0.0, self.pixdim[2], 0.0, 0.0],
                [0.0, 0.0, self.pixdim[3], 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ]
        }
    }

    /// Install a 4x4 affine as the sform, deriving voxel spacing from the
    /// column norms.
    pub fn set_affine(&mut self, affine: [[f64; 4]; 4]) {
        self.srow = [affine[0], affine[1], affine[2]];
        self.sform_code = 1;
        for axis in 0..3 {
            let norm = (affine[0][axis] * affine[0][axis]
                + affine[1][axis] * affine[1][axis]
                + affine[2][axis] * affine[2][axis])
                .sqrt();
            self.pixdim[axis + 1] = norm;
        }
    }

    #[allow(clippy::many_single_char_names)]
    fn qform_affine(&self) -> [[f64; 4]; 4] {
        let [b, c, d] = self.quatern;
        let a = (1.0 - b * b - c * c - d * d).max(0.0).sqrt();
        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let [i, j, k] = [self.pixdim[1].abs(), self.pixdim[2], self.pixdim[3] * qfac];

        [
            [
                (a * a + b * b - c * c - d * d) * i,
                2.0 * (b * c - a * d) * j,
                2.0 * (b * d + a * c) * k,
                self.qoffset[0],
            ],
            [
                2.0 * (b * c + a * d) * i,
                (a * a - b * b + c * c - d * d) * j,
                2.0 * (c * d - a * b) * k,
                self.qoffset[1],
            ],
            [
                2.0 * (b * d - a * c) * i,
                2.0 * (c * d + a * b) * j,
                (a * a - b * b - c * c + d * d) * k,
                self.qoffset[2],
            ],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Image shape (first `ndim` dimensions).
    pub fn shape(&self) -> Vec<usize> {
        self.dim[..self.ndim as usize]
            .iter()
            .map(|&d| d as usize)
            .collect()
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.dim[..self.ndim as usize]
            .iter()
            .map(|&d| d as usize)
            .product()
    }

    /// Size of the data section in bytes.
    pub fn data_size(&self) -> usize {
        self.num_voxels() * self.datatype.byte_size()
    }

    /// Check basic header invariants.
    pub fn validate(&self) -> Result<()> {
        if self.ndim == 0 || self.ndim > 7 {
            return Err(Error::InvalidDimensions(format!(
                "ndim must be 1..=7, got {}",
                self.ndim
            )));
        }

        for i in 0..self.ndim as usize {
            if self.dim[i] == 0 {
                return Err(Error::InvalidDimensions(format!("dimension {i} is zero")));
            }
            let spacing = self.pixdim[i + 1];
            if !spacing.is_finite() || spacing <= 0.0 {
                return Err(Error::InvalidDimensions(format!(
                    "pixdim[{}] must be finite and > 0, got {spacing}",
                    i + 1
                )));
            }
        }

        if self.vox_offset < self.header_size() as i64 {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset {} before header end ({})",
                self.vox_offset,
                self.header_size()
            )));
        }

        let mut voxels: usize = 1;
        for i in 0..self.ndim as usize {
            voxels = voxels
                .checked_mul(self.dim[i] as usize)
                .ok_or_else(|| Error::InvalidDimensions("dimension product overflow".into()))?;
        }
        voxels
            .checked_mul(self.datatype.byte_size())
            .ok_or_else(|| Error::InvalidDimensions("data size overflow".into()))?;

        Ok(())
    }
}

fn checked_ndim(raw: i64) -> Result<u8> {
    if (1..=7).contains(&raw) {
        Ok(raw as u8)
    } else {
        Err(Error::InvalidDimensions(format!(
            "ndim must be 1..=7, got {raw}"
        )))
    }
}

fn checked_datatype(code: i16, bitpix: i16) -> Result<DataType> {
    let datatype = DataType::from_code(code)?;
    let expected = (datatype.byte_size() * 8) as i16;
    if bitpix != expected {
        return Err(Error::InvalidDimensions(format!(
            "bitpix {bitpix} does not match datatype {} (expected {expected})",
            datatype.type_name()
        )));
    }
    Ok(datatype)
}

fn fixed_str(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

fn write_fixed_str(dst: &mut [u8], s: &str) {
    // Reserve one byte for the NUL terminator.
    let bytes = s.as_bytes();
    let len = bytes.len().min(dst.len() - 1);
    dst[..len].copy_from_slice(&bytes[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nifti1_roundtrip() {
        let header = NiftiHeader {
            ndim: 3,
            dim: [64, 64, 48, 1, 1, 1, 1],
            datatype: DataType::Int16,
            pixdim: [1.0, 1.0, 2.0, 3.0, 1.0, 1.0, 1.0, 1.0],
            descrip: "combined dseg".to_string(),
            ..NiftiHeader::default()
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 348);

        let parsed = NiftiHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.version, NiftiVersion::Nifti1);
        assert_eq!(parsed.ndim, 3);
        assert_eq!(parsed.dim[..3], [64, 64, 48]);
        assert_eq!(parsed.datatype, DataType::Int16);
        assert_eq!(parsed.descrip, "combined dseg");
    }

    #[test]
    fn nifti2_roundtrip() {
        let header = NiftiHeader {
            version: NiftiVersion::Nifti2,
            ndim: 3,
            dim: [100_000, 100_000, 100, 1, 1, 1, 1],
            datatype: DataType::Int32,
            pixdim: [1.0, 0.5, 0.5, 1.0, 1.0, 1.0, 1.0, 1.0],
            vox_offset: 544,
            ..NiftiHeader::default()
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 540);

        let parsed = NiftiHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.version, NiftiVersion::Nifti2);
        assert_eq!(parsed.dim[0], 100_000);
        assert_eq!(parsed.datatype, DataType::Int32);
    }

    #[test]
    fn bad_sizeof_hdr_is_invalid_magic() {
        let bytes = vec![0u8; 348];
        assert!(matches!(
            NiftiHeader::from_bytes(&bytes),
            Err(Error::InvalidMagic(_))
        ));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = NiftiHeader::default().to_bytes();
        bytes[v1::MAGIC..v1::MAGIC + 4].copy_from_slice(b"BAD!");
        assert!(matches!(
            NiftiHeader::from_bytes(&bytes),
            Err(Error::InvalidMagic(_))
        ));
    }

    #[test]
    fn unsupported_datatype_rejected() {
        let mut bytes = NiftiHeader::default().to_bytes();
        LittleEndian::write_i16(&mut bytes[v1::DATATYPE..v1::DATATYPE + 2], 9999);
        assert!(matches!(
            NiftiHeader::from_bytes(&bytes),
            Err(Error::UnsupportedDataType(9999))
        ));
    }

    #[test]
    fn mismatched_bitpix_rejected() {
        let mut bytes = NiftiHeader::default().to_bytes();
        // Int32 datatype with 8-bit bitpix.
        LittleEndian::write_i16(&mut bytes[v1::BITPIX..v1::BITPIX + 2], 8);
        assert!(NiftiHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn affine_prefers_sform() {
        let mut header = NiftiHeader::default();
        header.set_affine([
            [2.0, 0.0, 0.0, -10.0],
            [0.0, 2.0, 0.0, -20.0],
            [0.0, 0.0, 2.0, -30.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let affine = header.affine();
        assert_eq!(affine[0], [2.0, 0.0, 0.0, -10.0]);
        assert_eq!(affine[3], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(header.pixdim[1], 2.0);
    }

    #[test]
    fn affine_falls_back_to_pixdim() {
        let header = NiftiHeader {
            sform_code: 0,
            qform_code: 0,
            pixdim: [1.0, 2.0, 3.0, 4.0, 1.0, 1.0, 1.0, 1.0],
            ..NiftiHeader::default()
        };
        let affine = header.affine();
        assert_eq!(affine[0][0], 2.0);
        assert_eq!(affine[1][1], 3.0);
        assert_eq!(affine[2][2], 4.0);
    }

    #[test]
    fn validate_rejects_zero_dim() {
        let header = NiftiHeader {
            dim: [0, 1, 1, 1, 1, 1, 1],
            ..NiftiHeader::default()
        };
        assert!(header.validate().is_err());
    }

    #[test]
    fn validate_rejects_small_vox_offset() {
        let header = NiftiHeader {
            vox_offset: 100,
            ..NiftiHeader::default()
        };
        assert!(header.validate().is_err());
    }

    #[test]
    fn big_endian_header_parses() {
        let mut be = vec![0u8; 348];
        BigEndian::write_i32(&mut be[0..4], 348);
        be[v1::MAGIC..v1::MAGIC + 4].copy_from_slice(b"n+1\0");
        BigEndian::write_i16(&mut be[v1::DIM..v1::DIM + 2], 3);
        for i in 0..7 {
            let off = v1::DIM + 2 + i * 2;
            BigEndian::write_i16(&mut be[off..off + 2], if i < 3 { 8 } else { 1 });
        }
        BigEndian::write_i16(&mut be[v1::DATATYPE..v1::DATATYPE + 2], 2);
        BigEndian::write_i16(&mut be[v1::BITPIX..v1::BITPIX + 2], 8);
        for i in 0..8 {
            let off = v1::PIXDIM + i * 4;
            BigEndian::write_f32(&mut be[off..off + 4], 1.0);
        }
        BigEndian::write_f32(&mut be[v1::VOX_OFFSET..v1::VOX_OFFSET + 4], 352.0);

        let parsed = NiftiHeader::from_bytes(&be).unwrap();
        assert!(!parsed.little_endian);
        assert_eq!(parsed.shape(), vec![8, 8, 8]);
        assert_eq!(parsed.datatype, DataType::UInt8);
    }
}
