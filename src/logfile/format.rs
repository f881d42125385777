//! # Log File Format
//!
//! Header framing and file naming of the self-describing binary log.
//!
//! ## Byte Layout (little-endian, packed)
//!
//! ```text
//! [header_size: u32]                      total bytes of header + schema
//! [field_count: u16]                      first bytes of the serialized schema
//! [type: u8][name: 16 bytes][scale: f32]  × field_count
//! [record]                                × N, each exactly record_size bytes
//! ```
//!
//! Records follow the header back-to-back with no delimiter.

use std::path::{Path, PathBuf};

use crate::error::{Result, TelemetryError};
use crate::record::schema::{FIELD_COUNT_SIZE, SERIALIZED_FIELD_SIZE};
use crate::record::Schema;

/// Size of the leading `header_size` field
pub const HEADER_SIZE_FIELD: usize = 4;

/// Smallest possible header: `header_size` + `field_count`
pub const MIN_HEADER_SIZE: usize = HEADER_SIZE_FIELD + FIELD_COUNT_SIZE;

/// Log file extension
pub const LOG_FILE_EXTENSION: &str = "bin";

/// Parsed fixed part of a log file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    /// Total bytes of header fields plus serialized schema
    pub header_size: u32,
    /// Number of serialized field definitions
    pub field_count: u16,
}

/// Build the complete header (size prefix followed by the serialized schema)
pub fn encode_header(schema: &Schema) -> Vec<u8> {
    let serialized = schema.serialize();
    let header_size = (HEADER_SIZE_FIELD + serialized.len()) as u32;

    let mut out = Vec::with_capacity(header_size as usize);
    out.extend_from_slice(&header_size.to_le_bytes());
    out.extend_from_slice(&serialized);
    out
}

/// Split a log file into its header and the raw serialized schema bytes
///
/// # Errors
///
/// Returns [`TelemetryError::IncompatibleFormat`] if the file is shorter than
/// its declared header, or `header_size` does not match `field_count` whole
/// serialized fields.
pub fn read_header(bytes: &[u8]) -> Result<(LogHeader, &[u8])> {
    if bytes.len() < MIN_HEADER_SIZE {
        return Err(TelemetryError::IncompatibleFormat(format!(
            "file too short for a header: {} bytes",
            bytes.len()
        )));
    }

    let header_size = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let field_count = u16::from_le_bytes([bytes[4], bytes[5]]);
    let header = LogHeader {
        header_size,
        field_count,
    };

    let declared = header_size as usize;
    let expected = MIN_HEADER_SIZE + field_count as usize * SERIALIZED_FIELD_SIZE;
    if declared != expected {
        return Err(TelemetryError::IncompatibleFormat(format!(
            "header size {} does not hold {} fields of {} bytes",
            header_size, field_count, SERIALIZED_FIELD_SIZE
        )));
    }

    if bytes.len() < declared {
        return Err(TelemetryError::IncompatibleFormat(format!(
            "file is {} bytes but header declares {}",
            bytes.len(),
            declared
        )));
    }

    Ok((header, &bytes[HEADER_SIZE_FIELD..declared]))
}

/// File name of a log with the given ID, e.g. `0007.bin`
pub fn file_name(id: u32) -> String {
    format!("{:04}.{}", id, LOG_FILE_EXTENSION)
}

/// Full path of a log with the given ID
pub fn file_path(dir: &Path, id: u32) -> PathBuf {
    dir.join(file_name(id))
}

/// Parse the ID out of a log file name, `None` for foreign files
pub fn parse_file_id(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(LOG_FILE_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldDef, FieldType};

    fn example_schema() -> Schema {
        Schema::finalize(vec![
            FieldDef::new(FieldType::U32, "t", 1.0),
            FieldDef::new(FieldType::I16, "h", 10.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_encode_header_size() {
        let header = encode_header(&example_schema());
        // 4 (header_size) + 2 (field_count) + 2 × 21
        assert_eq!(header.len(), 48);
        assert_eq!(&header[0..4], &48u32.to_le_bytes());
        assert_eq!(&header[4..6], &2u16.to_le_bytes());
    }

    #[test]
    fn test_read_header() {
        let schema = example_schema();
        let mut file = encode_header(&schema);
        file.extend_from_slice(&[0xAA; 6]);

        let (header, raw_schema) = read_header(&file).unwrap();
        assert_eq!(header.header_size, 48);
        assert_eq!(header.field_count, 2);
        assert_eq!(raw_schema, schema.serialize().as_slice());
    }

    #[test]
    fn test_read_header_too_short() {
        assert!(matches!(
            read_header(&[0x30, 0, 0]),
            Err(TelemetryError::IncompatibleFormat(_))
        ));
    }

    #[test]
    fn test_read_header_size_mismatch() {
        let mut file = encode_header(&example_schema());
        // Claim three fields while the header size only covers two
        file[4] = 3;
        assert!(matches!(
            read_header(&file),
            Err(TelemetryError::IncompatibleFormat(_))
        ));
    }

    #[test]
    fn test_read_header_truncated_schema() {
        let file = encode_header(&example_schema());
        assert!(matches!(
            read_header(&file[..30]),
            Err(TelemetryError::IncompatibleFormat(_))
        ));
    }

    #[test]
    fn test_file_names() {
        assert_eq!(file_name(0), "0000.bin");
        assert_eq!(file_name(42), "0042.bin");
        assert_eq!(file_name(12345), "12345.bin");
        assert_eq!(
            file_path(Path::new("/telem"), 7),
            PathBuf::from("/telem/0007.bin")
        );
    }

    #[test]
    fn test_parse_file_id() {
        assert_eq!(parse_file_id("0000.bin"), Some(0));
        assert_eq!(parse_file_id("0042.bin"), Some(42));
        assert_eq!(parse_file_id("12345.bin"), Some(12345));
        assert_eq!(parse_file_id("notes.txt"), None);
        assert_eq!(parse_file_id("abcd.bin"), None);
        assert_eq!(parse_file_id(".bin"), None);
        assert_eq!(parse_file_id("-001.bin"), None);
        assert_eq!(parse_file_id("0001.bin.bak"), None);
    }
}
