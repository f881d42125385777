//! # Field Codec
//!
//! Quantized encoding of engineering-unit values into a field's storage
//! representation, and the inverse decode.
//!
//! Integer fields store `round(value * scale)` narrowed to the field width.
//! Narrowing wraps (two's-complement truncation of the rounded integer) and
//! never saturates or errors: `40000.0` written to an `I16` with scale `1`
//! reads back as `-25536`. `NaN` quantizes to `0`. `F32` fields store the
//! value unchanged and ignore the scale in both directions.

use super::field::FieldType;

/// Quantize one engineering-unit value to an integer.
///
/// `f64 as i64` saturates at the `i64` bounds; the later narrowing `as`
/// casts to the storage width are what produce the wraparound.
pub fn quantize(value: f64, scale: f32) -> i64 {
    (value * scale as f64).round() as i64
}

/// Encode `values` into `out` according to `field_type`.
///
/// `values.len()` must equal the type's arity and `out.len()` its size;
/// callers validate both.
pub fn encode_into(field_type: FieldType, scale: f32, values: &[f64], out: &mut [u8]) {
    match field_type {
        FieldType::I8 => out[0] = (quantize(values[0], scale) as i8) as u8,
        FieldType::U8 => out[0] = quantize(values[0], scale) as u8,
        FieldType::I16 => {
            out.copy_from_slice(&(quantize(values[0], scale) as i16).to_le_bytes())
        }
        FieldType::U16 => {
            out.copy_from_slice(&(quantize(values[0], scale) as u16).to_le_bytes())
        }
        FieldType::I32 => {
            out.copy_from_slice(&(quantize(values[0], scale) as i32).to_le_bytes())
        }
        FieldType::U32 => {
            out.copy_from_slice(&(quantize(values[0], scale) as u32).to_le_bytes())
        }
        FieldType::F32 => out.copy_from_slice(&(values[0] as f32).to_le_bytes()),
        FieldType::I16x3 => {
            for (chunk, &value) in out.chunks_exact_mut(2).zip(values) {
                chunk.copy_from_slice(&(quantize(value, scale) as i16).to_le_bytes());
            }
        }
        FieldType::U8x4 => {
            for (byte, &value) in out.iter_mut().zip(values) {
                *byte = quantize(value, scale) as u8;
            }
        }
    }
}

/// Decode the raw stored components of a field, before scaling.
///
/// `bytes` must be exactly `field_type.size()` long.
pub fn decode_raw(field_type: FieldType, bytes: &[u8]) -> Vec<f64> {
    match field_type {
        FieldType::I8 => vec![bytes[0] as i8 as f64],
        FieldType::U8 => vec![bytes[0] as f64],
        FieldType::I16 => vec![i16::from_le_bytes([bytes[0], bytes[1]]) as f64],
        FieldType::U16 => vec![u16::from_le_bytes([bytes[0], bytes[1]]) as f64],
        FieldType::I32 => vec![i32::from_le_bytes(le4(bytes)) as f64],
        FieldType::U32 => vec![u32::from_le_bytes(le4(bytes)) as f64],
        FieldType::F32 => vec![f32::from_le_bytes(le4(bytes)) as f64],
        FieldType::I16x3 => bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f64)
            .collect(),
        FieldType::U8x4 => bytes.iter().map(|&b| b as f64).collect(),
    }
}

/// Decode a field into engineering units (`raw / scale`, F32 unchanged).
pub fn decode(field_type: FieldType, scale: f32, bytes: &[u8]) -> Vec<f64> {
    let raw = decode_raw(field_type, bytes);
    if field_type.is_float() {
        return raw;
    }
    raw.into_iter().map(|r| r / scale as f64).collect()
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}
