//! # CSV Rendering
//!
//! Renders decoded records as comma-separated text for replay and ground
//! display.
//!
//! ## Columns
//!
//! | Field type | Columns |
//! |------------|---------|
//! | scalar | `name` |
//! | `I16x3` | `name.x`, `name.y`, `name.z` |
//! | `U8x4` | `name.a`, `name.b`, `name.c`, `name.d` |
//!
//! ## Number Formatting
//!
//! Integer fields with `scale <= 1` carry no fractional information and are
//! printed as integers. Larger scales print as right-aligned floats, 9 wide,
//! with enough decimals for one quantization step. `F32` fields print their
//! shortest exact representation.

use crate::error::Result;
use crate::record::{FieldDef, FieldType, Schema};

/// Column suffixes of 3-component vectors
pub const VEC3_SUFFIXES: [&str; 3] = ["x", "y", "z"];

/// Column suffixes of 4-component vectors
pub const VEC4_SUFFIXES: [&str; 4] = ["a", "b", "c", "d"];

/// Width of scaled float columns
const FLOAT_WIDTH: usize = 9;

/// Upper bound on decimals of scaled float columns
const MAX_DECIMALS: usize = 9;

/// Column names of one field
pub fn column_names(field: &FieldDef) -> Vec<String> {
    let suffixes: &[&str] = match field.field_type() {
        FieldType::I16x3 => &VEC3_SUFFIXES,
        FieldType::U8x4 => &VEC4_SUFFIXES,
        _ => return vec![field.name().to_string()],
    };

    suffixes
        .iter()
        .map(|suffix| format!("{}.{}", field.name(), suffix))
        .collect()
}

/// Render the header line, newline terminated
///
/// # Examples
///
/// ```
/// use telemetry_recorder::logfile::csv::render_csv_header;
/// use telemetry_recorder::record::{FieldDef, FieldType, Schema};
///
/// let schema = Schema::finalize(vec![
///     FieldDef::new(FieldType::U32, "t", 1.0),
///     FieldDef::new(FieldType::I16x3, "acc", 100.0),
/// ])?;
/// assert_eq!(render_csv_header(&schema), "t,acc.x,acc.y,acc.z\n");
/// # Ok::<(), telemetry_recorder::error::TelemetryError>(())
/// ```
pub fn render_csv_header(schema: &Schema) -> String {
    let columns: Vec<String> = schema.fields().iter().flat_map(column_names).collect();
    let mut line = columns.join(",");
    line.push('\n');
    line
}

/// Render one record as a line, newline terminated
///
/// # Errors
///
/// Returns [`crate::error::TelemetryError::IncompatibleFormat`] if `record` is
/// shorter than the schema's record size.
pub fn render_csv_row(schema: &Schema, record: &[u8]) -> Result<String> {
    let mut cells = Vec::with_capacity(schema.len());
    for (idx, field) in schema.fields().iter().enumerate() {
        for value in schema.decode_values(record, idx)? {
            cells.push(format_value(field, value));
        }
    }

    let mut line = cells.join(",");
    line.push('\n');
    Ok(line)
}

/// Format one decoded component of `field`
pub fn format_value(field: &FieldDef, value: f64) -> String {
    if field.field_type().is_float() {
        return format!("{}", value as f32);
    }

    let scale = field.scale();
    if scale <= 1.0 {
        return format!("{}", value.round() as i64);
    }

    format!(
        "{:width$.prec$}",
        value,
        width = FLOAT_WIDTH,
        prec = decimals_for_scale(scale)
    )
}

/// Decimals needed to show one quantization step of `scale`
fn decimals_for_scale(scale: f32) -> usize {
    let mut decimals = 1;
    let mut threshold = 10.0f64;
    while (scale as f64) > threshold && decimals < MAX_DECIMALS {
        decimals += 1;
        threshold *= 10.0;
    }
    decimals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordBuffer;
    use std::sync::Arc;

    #[test]
    fn test_example_header_and_row() {
        let schema = Arc::new(
            Schema::finalize(vec![
                FieldDef::new(FieldType::U32, "t", 1.0),
                FieldDef::new(FieldType::I16, "h", 10.0),
            ])
            .unwrap(),
        );

        let mut record = RecordBuffer::new(schema.clone());
        record.set_value("t", &[1000.0]).unwrap();
        record.set_value("h", &[12.3]).unwrap();

        assert_eq!(render_csv_header(&schema), "t,h\n");
        assert_eq!(
            render_csv_row(&schema, record.as_bytes()).unwrap(),
            "1000,     12.3\n"
        );
    }

    #[test]
    fn test_header_column_count() {
        let schema = Schema::finalize(vec![
            FieldDef::new(FieldType::U32, "millis", 1.0),
            FieldDef::new(FieldType::I8, "temp", 1.0),
            FieldDef::new(FieldType::I16x3, "accel", 100.0),
            FieldDef::new(FieldType::I16x3, "gyro", 16.0),
            FieldDef::new(FieldType::U8x4, "flags", 1.0),
        ])
        .unwrap();

        let header = render_csv_header(&schema);
        assert!(header.ends_with('\n'));
        let columns: Vec<&str> = header.trim_end().split(',').collect();
        // 2 scalars + 2 × 3 + 1 × 4
        assert_eq!(columns.len(), 12);
        assert_eq!(&columns[2..5], &["accel.x", "accel.y", "accel.z"]);
        assert_eq!(&columns[8..12], &["flags.a", "flags.b", "flags.c", "flags.d"]);
    }

    #[test]
    fn test_vector_row() {
        let schema = Arc::new(
            Schema::finalize(vec![
                FieldDef::new(FieldType::I16x3, "acc", 100.0),
                FieldDef::new(FieldType::U8x4, "st", 1.0),
            ])
            .unwrap(),
        );
        let mut record = RecordBuffer::new(schema.clone());
        record.set_value("acc", &[1.5, -0.25, 9.81]).unwrap();
        record.set_value("st", &[1.0, 2.0, 3.0, 4.0]).unwrap();

        assert_eq!(
            render_csv_row(&schema, record.as_bytes()).unwrap(),
            "     1.50,    -0.25,     9.81,1,2,3,4\n"
        );
    }

    #[test]
    fn test_f32_uses_float_formatting() {
        let field = FieldDef::new(FieldType::F32, "lat", 1.0);
        assert_eq!(format_value(&field, 47.5), "47.5");
    }

    #[test]
    fn test_fractional_scale_prints_integer() {
        let field = FieldDef::new(FieldType::U16, "alt", 0.5);
        assert_eq!(format_value(&field, 200.0), "200");
    }

    #[test]
    fn test_decimals_for_scale() {
        assert_eq!(decimals_for_scale(2.0), 1);
        assert_eq!(decimals_for_scale(10.0), 1);
        assert_eq!(decimals_for_scale(16.4), 2);
        assert_eq!(decimals_for_scale(100.0), 2);
        assert_eq!(decimals_for_scale(1000.0), 3);
    }

    #[test]
    fn test_short_record_is_error() {
        let schema = Schema::finalize(vec![FieldDef::new(FieldType::U32, "t", 1.0)]).unwrap();
        assert!(render_csv_row(&schema, &[0, 0]).is_err());
    }
}
