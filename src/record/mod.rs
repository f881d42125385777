//! # Record Module
//!
//! Schema-driven fixed-layout telemetry records.
//!
//! This module handles:
//! - The field type table (storage primitives and their widths)
//! - Schema finalization, lookup and on-disk serialization
//! - Quantized encoding of engineering-unit values
//! - The mutable record buffer populated by sampling code

pub mod buffer;
pub mod codec;
pub mod field;
pub mod schema;

pub use buffer::RecordBuffer;
pub use field::{FieldType, FIELD_NAME_LEN};
pub use schema::{FieldDef, FieldKey, Schema};
