//! # Log File Module
//!
//! Self-describing binary log files: each file starts with a header that
//! embeds the schema its records were written with, so any file can be
//! decoded later without the producing binary.
//!
//! This module handles:
//! - Header framing and file naming
//! - The storage provider seam and its filesystem implementation
//! - Numbered log files in a directory (write path)
//! - Replay as CSV and raw hex dumps (read path)

pub mod csv;
pub mod format;
pub mod hexdump;
pub mod reader;
pub mod storage;
pub mod store;

pub use format::{encode_header, read_header, LogHeader};
pub use reader::DecodedLog;
pub use storage::{FsStorage, Storage, StoredFile};
pub use store::{LogFileInfo, LogHandle, LogStore};
