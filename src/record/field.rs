//! # Field Types
//!
//! Storage primitives for record fields and their encoded widths.
//!
//! The size table here, the encode/decode match in [`super::codec`] and the
//! CSV column expansion in [`crate::logfile::csv`] must be extended together
//! whenever a type is added. Ordinals are written into every log file header
//! and must never be renumbered.

use serde::Deserialize;

/// Maximum length of a field name in bytes (one on-disk name slot)
pub const FIELD_NAME_LEN: usize = 16;

/// Storage primitive of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Signed 8-bit integer
    I8,
    /// Unsigned 8-bit integer
    U8,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 32-bit integer
    I32,
    /// Unsigned 32-bit integer
    U32,
    /// IEEE 754 single precision float, stored unscaled
    F32,
    /// Three signed 16-bit components (x, y, z)
    I16x3,
    /// Four unsigned 8-bit components (a, b, c, d)
    U8x4,
}

/// Encoded width in bytes, indexed by ordinal
const FIELD_SIZES: [usize; 9] = [1, 1, 2, 2, 4, 4, 4, 6, 4];

/// All field types in ordinal order
const FIELD_TYPES: [FieldType; 9] = [
    FieldType::I8,
    FieldType::U8,
    FieldType::I16,
    FieldType::U16,
    FieldType::I32,
    FieldType::U32,
    FieldType::F32,
    FieldType::I16x3,
    FieldType::U8x4,
];

impl FieldType {
    /// Stable ordinal used in the serialized schema
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Look up a field type by its serialized ordinal
    ///
    /// Returns `None` for ordinals written by a newer format version.
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        FIELD_TYPES.get(ordinal as usize).copied()
    }

    /// Encoded width in bytes
    pub fn size(self) -> usize {
        FIELD_SIZES[self as usize]
    }

    /// Number of scalar components packed into the field
    pub fn arity(self) -> usize {
        match self {
            FieldType::I16x3 => 3,
            FieldType::U8x4 => 4,
            _ => 1,
        }
    }

    /// Width of a single component in bytes
    pub fn component_size(self) -> usize {
        self.size() / self.arity()
    }

    /// Whether the field stores a float rather than a quantized integer
    pub fn is_float(self) -> bool {
        self == FieldType::F32
    }

    /// Whether the field packs more than one component
    pub fn is_vector(self) -> bool {
        self.arity() > 1
    }
}
