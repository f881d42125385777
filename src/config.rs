//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files, including
//! the record schema the recorder samples into.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddrV4;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TelemetryError};
use crate::record::{FieldDef, FieldType, Schema};
use crate::transport::{MacAddress, MAX_PAYLOAD};

/// Peer value that selects the link broadcast address
pub const BROADCAST_PEER: &str = "broadcast";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub schema: SchemaConfig,
}

/// Log file storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

/// Which side of the downlink this process runs
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LinkRole {
    /// Samples, records and transmits
    Recorder,
    /// Receives and prints records
    Ground,
}

/// Wireless downlink configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_link_enabled")]
    pub enabled: bool,

    #[serde(default = "default_link_role")]
    pub role: LinkRole,

    /// Local `ip:port` to bind
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Destination `ip:port`, or `"broadcast"`
    #[serde(default = "default_peer")]
    pub peer: String,

    /// Receive queue bound; 0 for unbounded
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Sampling loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SamplerConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Field receiving milliseconds since start
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
}

/// Diagnostic log output
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub directory: Option<String>,
}

/// Record layout
#[derive(Debug, Deserialize, Clone)]
pub struct SchemaConfig {
    #[serde(default = "default_fields")]
    pub fields: Vec<FieldConfig>,
}

/// One declared field
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FieldConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default = "default_scale")]
    pub scale: f32,
}

// Default value functions
fn default_log_dir() -> String { "./telem".to_string() }
fn default_flush_interval_ms() -> u64 { 500 }

fn default_link_enabled() -> bool { true }
fn default_link_role() -> LinkRole { LinkRole::Recorder }
fn default_bind() -> String { "0.0.0.0:4210".to_string() }
fn default_peer() -> String { BROADCAST_PEER.to_string() }
fn default_queue_capacity() -> usize { 64 }

fn default_sample_interval_ms() -> u64 { 100 }
fn default_timestamp_field() -> String { "millis".to_string() }

fn default_scale() -> f32 { 1.0 }

fn default_fields() -> Vec<FieldConfig> {
    vec![
        FieldConfig { name: "millis".to_string(), field_type: FieldType::U32, scale: 1.0 },
        FieldConfig { name: "height".to_string(), field_type: FieldType::I16, scale: 10.0 },
        FieldConfig { name: "temp".to_string(), field_type: FieldType::I16, scale: 100.0 },
        FieldConfig { name: "accel".to_string(), field_type: FieldType::I16x3, scale: 100.0 },
    ]
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            enabled: default_link_enabled(),
            role: default_link_role(),
            bind: default_bind(),
            peer: default_peer(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            timestamp_field: default_timestamp_field(),
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self { fields: default_fields() }
    }
}

impl StorageConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl SamplerConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

impl LinkConfig {
    /// Parsed local bind address
    pub fn bind_addr(&self) -> Result<SocketAddrV4> {
        self.bind.parse().map_err(|_| {
            TelemetryError::Config(toml::de::Error::custom(format!(
                "link bind '{}' is not an ipv4:port address",
                self.bind
            )))
        })
    }

    /// Destination link address
    pub fn peer_address(&self) -> Result<MacAddress> {
        if self.peer == BROADCAST_PEER {
            return Ok(MacAddress::BROADCAST);
        }
        self.peer
            .parse::<SocketAddrV4>()
            .map(MacAddress::from)
            .map_err(|_| {
                TelemetryError::Config(toml::de::Error::custom(format!(
                    "link peer '{}' must be an ipv4:port address or '{}'",
                    self.peer, BROADCAST_PEER
                )))
            })
    }

    /// Receive queue bound, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        (self.queue_capacity > 0).then_some(self.queue_capacity)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_recorder::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Finalize the declared fields into a schema
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidSchema`] for duplicate, empty or
    /// overlong names, or an empty field list.
    pub fn schema(&self) -> Result<Schema> {
        let fields = self
            .schema
            .fields
            .iter()
            .map(|f| FieldDef::new(f.field_type, f.name.clone(), f.scale))
            .collect();
        Schema::finalize(fields)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.storage.log_dir.is_empty() {
            return Err(TelemetryError::Config(
                toml::de::Error::custom("storage log_dir cannot be empty")
            ));
        }

        if self.storage.flush_interval_ms == 0 || self.storage.flush_interval_ms > 60000 {
            return Err(TelemetryError::Config(
                toml::de::Error::custom("flush_interval_ms must be between 1 and 60000")
            ));
        }

        if self.sampler.sample_interval_ms == 0 || self.sampler.sample_interval_ms > 60000 {
            return Err(TelemetryError::Config(
                toml::de::Error::custom("sample_interval_ms must be between 1 and 60000")
            ));
        }

        if self.link.enabled {
            self.link.bind_addr()?;
            self.link.peer_address()?;
        }

        let schema = self.schema()?;

        // Timestamp must be a scalar so one value fits
        if !self.sampler.timestamp_field.is_empty() {
            let field = schema.field(self.sampler.timestamp_field.as_str()).map_err(|_| {
                TelemetryError::Config(toml::de::Error::custom(format!(
                    "timestamp_field '{}' is not a schema field",
                    self.sampler.timestamp_field
                )))
            })?;
            if field.field_type().is_vector() {
                return Err(TelemetryError::Config(toml::de::Error::custom(format!(
                    "timestamp_field '{}' must be a scalar field",
                    self.sampler.timestamp_field
                ))));
            }
        }

        if self.link.enabled && schema.record_size() > MAX_PAYLOAD {
            return Err(TelemetryError::Config(toml::de::Error::custom(format!(
                "record size {} exceeds the {} byte link packet; disable the link or drop fields",
                schema.record_size(),
                MAX_PAYLOAD
            ))));
        }

        Ok(())
    }
}
