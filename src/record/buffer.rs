//! # Record Buffer
//!
//! A mutable, schema-bound buffer holding one record while it is being
//! populated by sampling code.

use std::sync::Arc;

use super::codec;
use super::schema::{FieldKey, Schema};
use crate::error::{Result, TelemetryError};

/// Fixed-size byte buffer bound to one [`Schema`]
///
/// Always exactly `schema.record_size()` bytes. Zeroed on construction and by
/// [`RecordBuffer::clear`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use telemetry_recorder::record::{FieldDef, FieldType, RecordBuffer, Schema};
///
/// let schema = Arc::new(Schema::finalize(vec![
///     FieldDef::new(FieldType::U32, "t", 1.0),
///     FieldDef::new(FieldType::I16, "h", 10.0),
/// ])?);
///
/// let mut record = RecordBuffer::new(schema);
/// record.set_value("t", &[1000.0])?;
/// record.set_value("h", &[12.3])?;
/// assert_eq!(record.as_bytes(), &[0xE8, 0x03, 0x00, 0x00, 0x7B, 0x00]);
/// # Ok::<(), telemetry_recorder::error::TelemetryError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    schema: Arc<Schema>,
    bytes: Vec<u8>,
}

impl RecordBuffer {
    /// Create a zeroed buffer for `schema`
    pub fn new(schema: Arc<Schema>) -> Self {
        let bytes = vec![0u8; schema.record_size()];
        Self { schema, bytes }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Copy raw storage bytes into a field
    ///
    /// # Errors
    ///
    /// - [`TelemetryError::FieldNotFound`] for unknown keys
    /// - [`TelemetryError::RawLength`] if `bytes` is not exactly the field width
    pub fn set_raw<K: FieldKey>(&mut self, key: K, bytes: &[u8]) -> Result<()> {
        let field = self.schema.field(key)?;
        if bytes.len() != field.size() {
            return Err(TelemetryError::RawLength {
                field: field.name().to_string(),
                expected: field.size(),
                got: bytes.len(),
            });
        }

        let range = field.range();
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Quantize engineering-unit values into a field
    ///
    /// Scalar fields take exactly one value, `I16x3` three and `U8x4` four.
    /// Values that overflow the storage width wrap silently (see
    /// [`codec`](super::codec)).
    ///
    /// # Errors
    ///
    /// - [`TelemetryError::FieldNotFound`] for unknown keys
    /// - [`TelemetryError::ValueCount`] if `values.len()` differs from the arity
    pub fn set_value<K: FieldKey>(&mut self, key: K, values: &[f64]) -> Result<()> {
        let field = self.schema.field(key)?;
        let arity = field.field_type().arity();
        if values.len() != arity {
            return Err(TelemetryError::ValueCount {
                field: field.name().to_string(),
                expected: arity,
                got: values.len(),
            });
        }

        let range = field.range();
        codec::encode_into(
            field.field_type(),
            field.scale(),
            values,
            &mut self.bytes[range],
        );
        Ok(())
    }

    /// Read a scalar field back in engineering units
    ///
    /// # Errors
    ///
    /// - [`TelemetryError::FieldNotFound`] for unknown keys
    /// - [`TelemetryError::NotScalar`] for vector fields; use
    ///   [`RecordBuffer::get_values`] instead
    pub fn get_value<K: FieldKey>(&self, key: K) -> Result<f64> {
        self.schema.decode_value(&self.bytes, key)
    }

    /// Read every component of a field in engineering units
    pub fn get_values<K: FieldKey>(&self, key: K) -> Result<Vec<f64>> {
        self.schema.decode_values(&self.bytes, key)
    }

    /// Zero-fill the buffer
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }
}
