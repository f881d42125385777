//! # Log File Reader
//!
//! Parses a log file using the schema embedded in its own header, never the
//! schema compiled into the running binary, and replays its records.

use std::io::Write;

use tracing::{debug, warn};

use super::csv::{render_csv_header, render_csv_row};
use super::format::{read_header, LogHeader};
use crate::error::Result;
use crate::record::Schema;

/// A parsed log file borrowing its record bytes
#[derive(Debug)]
pub struct DecodedLog<'a> {
    header: LogHeader,
    schema: Schema,
    body: &'a [u8],
}

impl<'a> DecodedLog<'a> {
    /// Parse the header and embedded schema of a log file
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::TelemetryError::IncompatibleFormat`] if the
    /// header or schema is structurally unreadable.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let (header, raw_schema) = read_header(bytes)?;
        let schema = Schema::deserialize(raw_schema)?;
        let body = &bytes[header.header_size as usize..];

        debug!(
            "Parsed log header: {} fields, {} byte records, {} body bytes",
            header.field_count,
            schema.record_size(),
            body.len()
        );

        Ok(Self {
            header,
            schema,
            body,
        })
    }

    pub fn header(&self) -> LogHeader {
        self.header
    }

    /// Schema stored in the file
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of complete records
    pub fn record_count(&self) -> usize {
        self.body.len() / self.schema.record_size()
    }

    /// Bytes of an incomplete trailing record, left by an interrupted write
    pub fn trailing_bytes(&self) -> usize {
        self.body.len() % self.schema.record_size()
    }

    /// Iterate complete records; a trailing partial record is skipped
    pub fn records(&self) -> impl Iterator<Item = &'a [u8]> {
        let body: &'a [u8] = self.body;
        body.chunks_exact(self.schema.record_size())
    }

    /// Write the CSV header and one row per complete record
    ///
    /// Returns the number of rows written.
    pub fn write_csv<W: Write>(&self, out: &mut W) -> Result<usize> {
        out.write_all(render_csv_header(&self.schema).as_bytes())?;

        let mut rows = 0;
        for record in self.records() {
            out.write_all(render_csv_row(&self.schema, record)?.as_bytes())?;
            rows += 1;
        }

        let trailing = self.trailing_bytes();
        if trailing > 0 {
            warn!(
                "Ignoring {} trailing bytes (partial record of {} bytes)",
                trailing,
                self.schema.record_size()
            );
        }

        Ok(rows)
    }
}
