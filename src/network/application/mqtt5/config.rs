//! Client configuration loaded from JSON.
//!
//! ```rust
//! use libiot_mqtt5::network::application::mqtt5::config::ClientConfig;
//!
//! let json = r#"{"client_id":"sensor-01","keep_alive":30,"receive_maximum":10}"#;
//! let config = ClientConfig::from_json(json).unwrap();
//! assert_eq!(config.client_id.as_str(), "sensor-01");
//! assert_eq!(config.maximum_packet_size, 268_435_455);
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use heapless::String as BoundedString;
use serde::{Deserialize, Serialize};

use super::client::ConnectOptions;
use super::cursor::VAR_INT_MAX;

/// Capacity of the string fields.
pub const FIELD_CAPACITY: usize = 64;

/// A configuration that could not be loaded or used.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConfigError {
    /// The JSON document did not match [`ClientConfig`], or a string was too long.
    Parse,
    /// The output buffer was too small for the serialized configuration.
    Serialize,
    /// `receive_maximum` was zero.
    InvalidReceiveMaximum,
    /// `maximum_packet_size` was zero or above the protocol limit.
    InvalidMaximumPacketSize,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::Parse => write!(f, "invalid configuration document"),
            ConfigError::Serialize => write!(f, "configuration does not fit the buffer"),
            ConfigError::InvalidReceiveMaximum => write!(f, "receive_maximum must be non-zero"),
            ConfigError::InvalidMaximumPacketSize => {
                write!(f, "maximum_packet_size must be between 1 and 268435455")
            }
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConfigError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConfigError::Parse => defmt::write!(f, "Parse"),
            ConfigError::Serialize => defmt::write!(f, "Serialize"),
            ConfigError::InvalidReceiveMaximum => defmt::write!(f, "InvalidReceiveMaximum"),
            ConfigError::InvalidMaximumPacketSize => defmt::write!(f, "InvalidMaximumPacketSize"),
        }
    }
}

fn default_receive_maximum() -> u16 {
    u16::MAX
}

fn default_maximum_packet_size() -> u32 {
    VAR_INT_MAX
}

fn default_reconnect_interval_ms() -> u32 {
    1_000
}

/// Connection settings of one MQTT 5 client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client identifier; empty lets the server assign one.
    #[serde(default)]
    pub client_id: BoundedString<FIELD_CAPACITY>,
    /// User name, sent when non-empty.
    #[serde(default)]
    pub username: BoundedString<FIELD_CAPACITY>,
    /// Password, sent when non-empty.
    #[serde(default)]
    pub password: BoundedString<FIELD_CAPACITY>,
    /// Keep-alive in seconds, 0 disables it.
    #[serde(default)]
    pub keep_alive: u16,
    /// Session expiry in seconds.
    #[serde(default)]
    pub session_expiry_interval: u32,
    /// QoS 1/2 publishes this client accepts concurrently.
    #[serde(default = "default_receive_maximum")]
    pub receive_maximum: u16,
    /// Largest packet this client accepts.
    #[serde(default = "default_maximum_packet_size")]
    pub maximum_packet_size: u32,
    /// Delay before the reconnect timer reports it is time to reconnect.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u32,
    /// Prepended to every published topic and subscribed filter when non-empty.
    #[serde(default)]
    pub topic_prefix: BoundedString<FIELD_CAPACITY>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: BoundedString::new(),
            username: BoundedString::new(),
            password: BoundedString::new(),
            keep_alive: 0,
            session_expiry_interval: 0,
            receive_maximum: default_receive_maximum(),
            maximum_packet_size: default_maximum_packet_size(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            topic_prefix: BoundedString::new(),
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let (config, _): (Self, usize) =
            serde_json_core::from_str(json).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize into `buf`, returning the number of bytes written.
    pub fn to_json(&self, buf: &mut [u8]) -> Result<usize, ConfigError> {
        serde_json_core::to_slice(self, buf).map_err(|_| ConfigError::Serialize)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receive_maximum == 0 {
            return Err(ConfigError::InvalidReceiveMaximum);
        }
        if self.maximum_packet_size == 0 || self.maximum_packet_size > VAR_INT_MAX {
            return Err(ConfigError::InvalidMaximumPacketSize);
        }
        Ok(())
    }

    /// CONNECT settings derived from this configuration.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            client_id: String::from(self.client_id.as_str()),
            username: non_empty(&self.username).map(String::from),
            password: non_empty(&self.password).map(|p| Vec::from(p.as_bytes())),
            keep_alive: self.keep_alive,
            session_expiry_interval: self.session_expiry_interval,
            receive_maximum: self.receive_maximum,
            maximum_packet_size: self.maximum_packet_size,
            ..ConnectOptions::default()
        }
    }
}

fn non_empty(value: &BoundedString<FIELD_CAPACITY>) -> Option<&str> {
    if value.is_empty() { None } else { Some(value.as_str()) }
}
