//! Error types for the MQTT 5 engine.

use super::config::ConfigError;
use crate::network;

/// A failure while encoding or decoding a control packet.
///
/// Every decode failure means the byte stream can no longer be framed and
/// the connection has to be dropped.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CodecError {
    /// A read would run past the end of the packet.
    UnexpectedEnd,
    /// A Variable Byte Integer used more than four bytes.
    MalformedVariableInteger,
    /// A value does not fit the width required for its field.
    ValueOutOfRange,
    /// A string field is not valid UTF-8.
    InvalidUtf8,
    /// A string or binary field is longer than 65535 bytes.
    StringTooLong {
        /// Length of the offending field.
        len: usize,
    },
    /// A property identifier missing from the property table.
    UnknownProperty {
        /// The raw identifier.
        id: u32,
    },
    /// A property that may appear once appeared twice.
    DuplicateProperty {
        /// The raw identifier.
        id: u8,
    },
    /// A property value whose type disagrees with the property table.
    PropertyTypeMismatch {
        /// The raw identifier.
        id: u8,
    },
    /// The low nibble of the fixed header is not the value mandated for the command.
    InvalidHeaderFlags {
        /// The full fixed header byte.
        header: u8,
    },
    /// The command nibble is 0, which is reserved.
    UnknownCommand {
        /// The full fixed header byte.
        header: u8,
    },
    /// CONNECT did not carry the protocol name `MQTT`.
    InvalidProtocolName,
    /// CONNECT carried a protocol level other than 5.
    UnsupportedProtocolVersion {
        /// The received level.
        version: u8,
    },
    /// A QoS field held 3.
    InvalidQoS,
    /// A PUBLISH whose packet identifier presence disagrees with its QoS.
    InvalidPacketId,
    /// Reserved or contradictory CONNECT flags.
    InvalidConnectFlags {
        /// The received flags byte.
        flags: u8,
    },
    /// Reserved or out-of-range subscription option bits.
    InvalidSubscriptionOptions {
        /// The received options byte.
        options: u8,
    },
    /// SUBSCRIBE, UNSUBSCRIBE, SUBACK or UNSUBACK without a single entry.
    EmptyPayload,
    /// Bytes left over after the last field of the packet.
    TrailingBytes,
    /// A write would run past the end of the output buffer.
    BufferOverflow,
    /// The serializer did not fill exactly the number of bytes the size function announced.
    SizeMismatch {
        /// Size announced by the size function.
        expected: usize,
        /// Bytes actually written.
        actual: usize,
    },
    /// The remaining length exceeds the configured maximum packet size.
    PacketTooLarge {
        /// The announced remaining length.
        len: u32,
    },
}

impl core::fmt::Display for CodecError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CodecError::UnexpectedEnd => write!(f, "unexpected end of packet"),
            CodecError::MalformedVariableInteger => write!(f, "malformed variable byte integer"),
            CodecError::ValueOutOfRange => write!(f, "value out of range for field"),
            CodecError::InvalidUtf8 => write!(f, "invalid UTF-8 string"),
            CodecError::StringTooLong { len } => write!(f, "field of {} bytes exceeds 65535", len),
            CodecError::UnknownProperty { id } => write!(f, "unknown property identifier {}", id),
            CodecError::DuplicateProperty { id } => write!(f, "property {} appears more than once", id),
            CodecError::PropertyTypeMismatch { id } => {
                write!(f, "value type does not match property {}", id)
            }
            CodecError::InvalidHeaderFlags { header } => {
                write!(f, "invalid fixed header flags in 0x{:02x}", header)
            }
            CodecError::UnknownCommand { header } => {
                write!(f, "unknown command in fixed header 0x{:02x}", header)
            }
            CodecError::InvalidProtocolName => write!(f, "invalid protocol name in CONNECT"),
            CodecError::UnsupportedProtocolVersion { version } => {
                write!(f, "unsupported protocol version {}", version)
            }
            CodecError::InvalidQoS => write!(f, "invalid QoS value"),
            CodecError::InvalidPacketId => {
                write!(f, "PUBLISH packet identifier does not match its QoS")
            }
            CodecError::InvalidConnectFlags { flags } => {
                write!(f, "invalid CONNECT flags 0x{:02x}", flags)
            }
            CodecError::InvalidSubscriptionOptions { options } => {
                write!(f, "invalid subscription options 0x{:02x}", options)
            }
            CodecError::EmptyPayload => write!(f, "packet requires at least one payload entry"),
            CodecError::TrailingBytes => write!(f, "trailing bytes after packet"),
            CodecError::BufferOverflow => write!(f, "output buffer too small"),
            CodecError::SizeMismatch { expected, actual } => {
                write!(f, "serialized {} bytes, expected {}", actual, expected)
            }
            CodecError::PacketTooLarge { len } => write!(f, "packet of {} bytes is too large", len),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CodecError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            CodecError::UnexpectedEnd => defmt::write!(f, "UnexpectedEnd"),
            CodecError::MalformedVariableInteger => defmt::write!(f, "MalformedVariableInteger"),
            CodecError::ValueOutOfRange => defmt::write!(f, "ValueOutOfRange"),
            CodecError::InvalidUtf8 => defmt::write!(f, "InvalidUtf8"),
            CodecError::StringTooLong { len } => defmt::write!(f, "StringTooLong({})", len),
            CodecError::UnknownProperty { id } => defmt::write!(f, "UnknownProperty({})", id),
            CodecError::DuplicateProperty { id } => defmt::write!(f, "DuplicateProperty({})", id),
            CodecError::PropertyTypeMismatch { id } => {
                defmt::write!(f, "PropertyTypeMismatch({})", id)
            }
            CodecError::InvalidHeaderFlags { header } => {
                defmt::write!(f, "InvalidHeaderFlags({=u8:x})", header)
            }
            CodecError::UnknownCommand { header } => {
                defmt::write!(f, "UnknownCommand({=u8:x})", header)
            }
            CodecError::InvalidProtocolName => defmt::write!(f, "InvalidProtocolName"),
            CodecError::UnsupportedProtocolVersion { version } => {
                defmt::write!(f, "UnsupportedProtocolVersion({})", version)
            }
            CodecError::InvalidQoS => defmt::write!(f, "InvalidQoS"),
            CodecError::InvalidPacketId => defmt::write!(f, "InvalidPacketId"),
            CodecError::InvalidConnectFlags { flags } => {
                defmt::write!(f, "InvalidConnectFlags({=u8:x})", flags)
            }
            CodecError::InvalidSubscriptionOptions { options } => {
                defmt::write!(f, "InvalidSubscriptionOptions({=u8:x})", options)
            }
            CodecError::EmptyPayload => defmt::write!(f, "EmptyPayload"),
            CodecError::TrailingBytes => defmt::write!(f, "TrailingBytes"),
            CodecError::BufferOverflow => defmt::write!(f, "BufferOverflow"),
            CodecError::SizeMismatch { expected, actual } => {
                defmt::write!(f, "SizeMismatch({}, {})", expected, actual)
            }
            CodecError::PacketTooLarge { len } => defmt::write!(f, "PacketTooLarge({})", len),
        }
    }
}

/// Errors returned by the engine's entry points.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// Encoding failed, or the peer sent a malformed packet.
    Codec(CodecError),
    /// The connection failed while reading or writing.
    Network(network::error::Error),
    /// An outbound packet is larger than the server's Maximum-Packet-Size.
    PacketTooLarge {
        /// Size of the encoded packet.
        size: usize,
        /// Maximum accepted by the server.
        maximum: u32,
    },
    /// The client configuration was rejected.
    Config(ConfigError),
}

impl From<CodecError> for Error {
    fn from(error: CodecError) -> Self {
        Error::Codec(error)
    }
}

impl From<network::error::Error> for Error {
    fn from(error: network::error::Error) -> Self {
        Error::Network(error)
    }
}

impl From<ConfigError> for Error {
    fn from(error: ConfigError) -> Self {
        Error::Config(error)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Codec(e) => write!(f, "codec error: {}", e),
            Error::Network(e) => write!(f, "network error: {}", e),
            Error::PacketTooLarge { size, maximum } => {
                write!(f, "packet of {} bytes exceeds server maximum {}", size, maximum)
            }
            Error::Config(e) => write!(f, "configuration error: {}", e),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Codec(e) => defmt::write!(f, "Codec({})", e),
            Error::Network(e) => defmt::write!(f, "Network({})", e),
            Error::PacketTooLarge { size, maximum } => {
                defmt::write!(f, "PacketTooLarge({}, {})", size, maximum)
            }
            Error::Config(e) => defmt::write!(f, "Config({})", e),
        }
    }
}
