//! Common error types for transport operations

/// A transport-level error reported by a [`Connection`](crate::network::Connection).
///
/// The MQTT engine never inspects the connection's own error type; every
/// failure coming out of [`Read`](crate::network::Read) or
/// [`Write`](crate::network::Write) is folded into one of these variants.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a connection that is not open.
    NotOpen,
    /// An error occurred during a write operation.
    WriteError,
    /// An error occurred during a read operation.
    ReadError,
    /// The peer closed the connection (a write accepted zero bytes).
    ConnectionClosed,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::NotOpen => write!(f, "connection is not open"),
            Error::WriteError => write!(f, "write to connection failed"),
            Error::ReadError => write!(f, "read from connection failed"),
            Error::ConnectionClosed => write!(f, "connection closed by peer"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::ConnectionClosed => defmt::write!(f, "ConnectionClosed"),
        }
    }
}
