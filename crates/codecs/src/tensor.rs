//! Tensor payloads.
//!
//! Wire form: `[ header_len: u32 LE ][ TensorHeader protobuf ][ element buffer ]`.
//! The element buffer is the contiguous little-endian encoding of the
//! elements in the header's shape order. Round-trips preserve dtype,
//! shape and the exact buffer bytes.

use prost::Message;
use std::collections::BTreeMap;

use aifs_types::error::CodecError;

/// Supported element types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Dtype {
    /// Unset; rejected by validation.
    Unspecified = 0,
    /// Signed 8-bit integer.
    I8 = 1,
    /// Signed 16-bit integer.
    I16 = 2,
    /// Signed 32-bit integer.
    I32 = 3,
    /// Signed 64-bit integer.
    I64 = 4,
    /// Unsigned 8-bit integer.
    U8 = 5,
    /// Unsigned 16-bit integer.
    U16 = 6,
    /// Unsigned 32-bit integer.
    U32 = 7,
    /// Unsigned 64-bit integer.
    U64 = 8,
    /// IEEE 754 half precision.
    F16 = 9,
    /// IEEE 754 single precision.
    F32 = 10,
    /// IEEE 754 double precision.
    F64 = 11,
    /// One byte per element, 0 or 1.
    Bool = 12,
}

impl Dtype {
    /// Element width in bytes.
    pub fn size(&self) -> Option<u64> {
        match self {
            Self::Unspecified => None,
            Self::I8 | Self::U8 | Self::Bool => Some(1),
            Self::I16 | Self::U16 | Self::F16 => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 => Some(8),
        }
    }
}

/// The fixed protobuf header preceding the element buffer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TensorHeader {
    /// Element type, one of [`Dtype`].
    #[prost(enumeration = "Dtype", tag = "1")]
    pub dtype: i32,
    /// Dimension extents; empty means a scalar.
    #[prost(uint64, repeated, tag = "2")]
    pub shape: Vec<u64>,
    /// Optional element strides, one per dimension.
    #[prost(int64, repeated, tag = "3")]
    pub strides: Vec<i64>,
    /// Optional validity bitmap, one bit per element.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub null_bitmap: Option<Vec<u8>>,
    /// Free-form header metadata.
    #[prost(btree_map = "string, string", tag = "5")]
    pub metadata: BTreeMap<String, String>,
}

impl TensorHeader {
    /// Total element count implied by the shape.
    pub fn element_count(&self) -> u64 {
        self.shape.iter().product::<u64>()
    }

    /// Buffer length in bytes implied by shape and dtype.
    pub fn buffer_len(&self) -> Result<u64, CodecError> {
        let dtype = Dtype::try_from(self.dtype).map_err(|_| CodecError::UnsupportedDtype(self.dtype))?;
        let size = dtype.size().ok_or(CodecError::UnsupportedDtype(self.dtype))?;
        self.element_count()
            .checked_mul(size)
            .ok_or_else(|| CodecError::Malformed {
                kind: "tensor",
                reason: "shape overflows".to_string(),
            })
    }
}

/// Encodes a header and its element buffer into the wire form.
pub fn encode(header: &TensorHeader, buffer: &[u8]) -> Result<Vec<u8>, CodecError> {
    check(header, buffer)?;
    let header_bytes = header.encode_to_vec();
    let mut out = Vec::with_capacity(4 + header_bytes.len() + buffer.len());
    out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(buffer);
    Ok(out)
}

/// Splits the wire form into header and element buffer without copying
/// the buffer.
pub fn decode(bytes: &[u8]) -> Result<(TensorHeader, &[u8]), CodecError> {
    if bytes.len() < 4 {
        return Err(CodecError::Malformed {
            kind: "tensor",
            reason: "missing header length".to_string(),
        });
    }
    let (len_bytes, rest) = bytes.split_at(4);
    let header_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    if rest.len() < header_len {
        return Err(CodecError::Malformed {
            kind: "tensor",
            reason: "truncated header".to_string(),
        });
    }
    let (header_bytes, buffer) = rest.split_at(header_len);
    let header = TensorHeader::decode(header_bytes).map_err(|e| CodecError::Malformed {
        kind: "tensor",
        reason: e.to_string(),
    })?;
    Ok((header, buffer))
}

/// Validates the wire form, returning the parsed header.
pub fn validate(bytes: &[u8]) -> Result<TensorHeader, CodecError> {
    let (header, buffer) = decode(bytes)?;
    check(&header, buffer)?;
    Ok(header)
}

fn check(header: &TensorHeader, buffer: &[u8]) -> Result<(), CodecError> {
    let expected = header.buffer_len()?;
    if buffer.len() as u64 != expected {
        return Err(CodecError::TensorLength {
            expected,
            got: buffer.len() as u64,
        });
    }
    if !header.strides.is_empty() && header.strides.len() != header.shape.len() {
        return Err(CodecError::Malformed {
            kind: "tensor",
            reason: format!(
                "{} strides for {} dimensions",
                header.strides.len(),
                header.shape.len()
            ),
        });
    }
    if let Some(bitmap) = &header.null_bitmap {
        let needed = header.element_count().div_ceil(8);
        if bitmap.len() as u64 != needed {
            return Err(CodecError::Malformed {
                kind: "tensor",
                reason: format!("null bitmap is {} bytes, expected {needed}", bitmap.len()),
            });
        }
    }
    Ok(())
}
