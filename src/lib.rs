//! # Telemetry Recorder Library
//!
//! Schema-driven onboard telemetry: samples are packed into fixed-layout
//! binary records, appended to self-describing log files and mirrored over
//! an unreliable datagram link for live ground monitoring.
//!
//! The [`session::Session`] ties the pieces together for one recording run.

pub mod config;
pub mod error;
pub mod logfile;
pub mod record;
pub mod session;
pub mod transport;
