//! # Record Schema
//!
//! An ordered list of named, typed fields defining one fixed-size record
//! layout, plus its on-disk serialization.
//!
//! ## Serialized Layout (little-endian, packed)
//!
//! ```text
//! [field_count: u16]
//! [type: u8][name: 16 bytes, zero padded][scale: f32]   × field_count
//! ```
//!
//! Field sizes and offsets are never stored; they are recomputed from the
//! type ordinals whenever a schema is finalized or deserialized.

use std::collections::HashSet;

use super::codec;
use super::field::{FieldType, FIELD_NAME_LEN};
use crate::error::{Result, TelemetryError};

/// Size of the serialized field count prefix
pub const FIELD_COUNT_SIZE: usize = 2;

/// Size of one serialized field definition: type(1) + name(16) + scale(4)
pub const SERIALIZED_FIELD_SIZE: usize = 1 + FIELD_NAME_LEN + 4;

/// One named field of a schema
///
/// `size` and `offset` are derived by [`Schema::finalize`] and cannot be set
/// by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    field_type: FieldType,
    name: String,
    scale: f32,
    size: usize,
    offset: usize,
}

impl FieldDef {
    /// Declare a field. A scale of `0.0` is stored as `1.0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use telemetry_recorder::record::{FieldDef, FieldType};
    ///
    /// let field = FieldDef::new(FieldType::I16, "height", 0.0);
    /// assert_eq!(field.scale(), 1.0);
    /// ```
    pub fn new(field_type: FieldType, name: impl Into<String>, scale: f32) -> Self {
        let scale = if scale == 0.0 { 1.0 } else { scale };
        Self {
            field_type,
            name: name.into(),
            scale,
            size: field_type.size(),
            offset: 0,
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Encoded width in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Byte offset of the field inside a record
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte range of the field inside a record
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size
    }
}

/// Anything that can address a field: a positional index or a name
pub trait FieldKey {
    /// Resolve to a field index, if the schema has such a field
    fn resolve(&self, schema: &Schema) -> Option<usize>;

    /// Human readable form for error messages
    fn describe(&self) -> String;
}

impl FieldKey for usize {
    fn resolve(&self, schema: &Schema) -> Option<usize> {
        (*self < schema.len()).then_some(*self)
    }

    fn describe(&self) -> String {
        format!("#{}", self)
    }
}

impl FieldKey for &str {
    fn resolve(&self, schema: &Schema) -> Option<usize> {
        schema.index_of(self)
    }

    fn describe(&self) -> String {
        format!("'{}'", self)
    }
}

impl FieldKey for &String {
    fn resolve(&self, schema: &Schema) -> Option<usize> {
        schema.index_of(self)
    }

    fn describe(&self) -> String {
        format!("'{}'", self)
    }
}

/// Immutable, finalized record layout
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<FieldDef>,
    record_size: usize,
}

impl Schema {
    /// Validate field declarations and compute their offsets.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidSchema`] if:
    /// - the field list is empty or longer than `u16::MAX`
    /// - a name is empty, longer than 16 bytes, or repeats an earlier name
    /// - a scale is not finite
    ///
    /// # Examples
    ///
    /// ```
    /// use telemetry_recorder::record::{FieldDef, FieldType, Schema};
    ///
    /// let schema = Schema::finalize(vec![
    ///     FieldDef::new(FieldType::U32, "t", 1.0),
    ///     FieldDef::new(FieldType::I16, "h", 10.0),
    /// ])?;
    /// assert_eq!(schema.record_size(), 6);
    /// assert_eq!(schema.fields()[1].offset(), 4);
    /// # Ok::<(), telemetry_recorder::error::TelemetryError>(())
    /// ```
    pub fn finalize(mut fields: Vec<FieldDef>) -> Result<Self> {
        if fields.is_empty() {
            return Err(TelemetryError::InvalidSchema(
                "schema must declare at least one field".to_string(),
            ));
        }

        if fields.len() > u16::MAX as usize {
            return Err(TelemetryError::InvalidSchema(format!(
                "schema declares {} fields, maximum is {}",
                fields.len(),
                u16::MAX
            )));
        }

        let mut seen = HashSet::with_capacity(fields.len());
        let mut offset = 0;

        for field in fields.iter_mut() {
            if field.name.is_empty() {
                return Err(TelemetryError::InvalidSchema(format!(
                    "field at offset {} has an empty name",
                    offset
                )));
            }

            if field.name.len() > FIELD_NAME_LEN {
                return Err(TelemetryError::InvalidSchema(format!(
                    "field name '{}' exceeds {} bytes",
                    field.name, FIELD_NAME_LEN
                )));
            }

            if !seen.insert(field.name.clone()) {
                return Err(TelemetryError::InvalidSchema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }

            if !field.scale.is_finite() {
                return Err(TelemetryError::InvalidSchema(format!(
                    "field '{}' has non-finite scale {}",
                    field.name, field.scale
                )));
            }

            field.size = field.field_type.size();
            field.offset = offset;
            offset += field.size;
        }

        Ok(Self {
            fields,
            record_size: offset,
        })
    }

    /// Total encoded size of one record in bytes
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Case-sensitive linear lookup by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Resolve a field by index or name
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::FieldNotFound`] for unknown names and
    /// out-of-range indices.
    pub fn field<K: FieldKey>(&self, key: K) -> Result<&FieldDef> {
        key.resolve(self)
            .map(|idx| &self.fields[idx])
            .ok_or_else(|| TelemetryError::FieldNotFound(key.describe()))
    }

    /// Same record size and identical per-index `(type, size, offset)`.
    ///
    /// Names and scales are allowed to differ.
    pub fn is_layout_compatible(&self, other: &Schema) -> bool {
        self.record_size == other.record_size
            && self.fields.len() == other.fields.len()
            && self.fields.iter().zip(&other.fields).all(|(a, b)| {
                a.field_type == b.field_type && a.size == b.size && a.offset == b.offset
            })
    }

    /// Size of [`Schema::serialize`] output
    pub fn serialized_size(&self) -> usize {
        FIELD_COUNT_SIZE + self.fields.len() * SERIALIZED_FIELD_SIZE
    }

    /// Encode the schema for embedding in a log file header
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        out.extend_from_slice(&(self.fields.len() as u16).to_le_bytes());

        for field in &self.fields {
            out.push(field.field_type.ordinal());

            let mut name = [0u8; FIELD_NAME_LEN];
            let bytes = field.name.as_bytes();
            let len = bytes.len().min(FIELD_NAME_LEN);
            name[..len].copy_from_slice(&bytes[..len]);
            out.extend_from_slice(&name);

            out.extend_from_slice(&field.scale.to_le_bytes());
        }

        out
    }

    /// Decode a schema produced by [`Schema::serialize`]
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::IncompatibleFormat`] if the buffer is short,
    /// a type ordinal is unknown, a name is not UTF-8, or the decoded fields
    /// would not form a valid schema.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIELD_COUNT_SIZE {
            return Err(TelemetryError::IncompatibleFormat(format!(
                "schema too short: {} bytes",
                bytes.len()
            )));
        }

        let count = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        let expected = FIELD_COUNT_SIZE + count * SERIALIZED_FIELD_SIZE;
        if bytes.len() < expected {
            return Err(TelemetryError::IncompatibleFormat(format!(
                "schema declares {} fields ({} bytes) but only {} bytes are present",
                count,
                expected,
                bytes.len()
            )));
        }

        let mut fields = Vec::with_capacity(count);
        for chunk in bytes[FIELD_COUNT_SIZE..expected].chunks_exact(SERIALIZED_FIELD_SIZE) {
            let field_type = FieldType::from_ordinal(chunk[0]).ok_or_else(|| {
                TelemetryError::IncompatibleFormat(format!("unknown field type {}", chunk[0]))
            })?;

            let raw_name = &chunk[1..1 + FIELD_NAME_LEN];
            let name_len = raw_name.iter().position(|&b| b == 0).unwrap_or(FIELD_NAME_LEN);
            let name = std::str::from_utf8(&raw_name[..name_len]).map_err(|_| {
                TelemetryError::IncompatibleFormat("field name is not valid UTF-8".to_string())
            })?;

            let scale_at = 1 + FIELD_NAME_LEN;
            let scale = f32::from_le_bytes([
                chunk[scale_at],
                chunk[scale_at + 1],
                chunk[scale_at + 2],
                chunk[scale_at + 3],
            ]);

            fields.push(FieldDef::new(field_type, name, scale));
        }

        Self::finalize(fields).map_err(|e| match e {
            TelemetryError::InvalidSchema(msg) => TelemetryError::IncompatibleFormat(msg),
            other => other,
        })
    }

    /// Decode a scalar field from a record encoded with this schema
    ///
    /// # Errors
    ///
    /// - [`TelemetryError::FieldNotFound`] for unknown keys
    /// - [`TelemetryError::NotScalar`] for vector fields
    /// - [`TelemetryError::IncompatibleFormat`] if `record` is shorter than
    ///   [`Schema::record_size`]
    pub fn decode_value<K: FieldKey>(&self, record: &[u8], key: K) -> Result<f64> {
        let field = self.field(key)?;
        if field.field_type.is_vector() {
            return Err(TelemetryError::NotScalar(field.name.clone()));
        }
        self.check_record_len(record)?;
        Ok(codec::decode(field.field_type, field.scale, &record[field.range()])[0])
    }

    /// Decode every component of a field (one for scalars, 3/4 for vectors)
    pub fn decode_values<K: FieldKey>(&self, record: &[u8], key: K) -> Result<Vec<f64>> {
        let field = self.field(key)?;
        self.check_record_len(record)?;
        Ok(codec::decode(field.field_type, field.scale, &record[field.range()]))
    }

    pub(crate) fn check_record_len(&self, record: &[u8]) -> Result<()> {
        if record.len() < self.record_size {
            return Err(TelemetryError::IncompatibleFormat(format!(
                "record is {} bytes, schema needs {}",
                record.len(),
                self.record_size
            )));
        }
        Ok(())
    }
}
