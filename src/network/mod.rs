//! Transport abstraction consumed by the MQTT 5 engine.
//!
//! The engine does not open sockets, negotiate TLS or resolve endpoints. The
//! enclosing layer hands it anything that implements [`Connection`]: reads
//! pull bytes the I/O loop reported as available, writes push complete
//! control packets.

#![deny(unsafe_code)]

/// Common error types for transport operations
pub mod error;

/// Application layer protocols built on top of [`Connection`].
pub mod application;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connection, Read, Write};
}

/// The receiving half of a connection.
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read up to `buf.len()` bytes, returning how many were read.
    ///
    /// Returning `Ok(0)` means nothing is available right now.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// The sending half of a connection.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Closing a connection.
pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A duplex byte stream.
pub trait Connection: Read + Write + Close {}

/// Write every byte of `buf`, then flush.
///
/// A write that accepts zero bytes is treated as a closed connection.
pub fn write_all<W: Write + ?Sized>(conn: &mut W, mut buf: &[u8]) -> Result<(), error::Error> {
    while !buf.is_empty() {
        match conn.write(buf) {
            Ok(0) => return Err(error::Error::ConnectionClosed),
            Ok(n) => buf = &buf[n.min(buf.len())..],
            Err(_) => return Err(error::Error::WriteError),
        }
    }
    conn.flush().map_err(|_| error::Error::WriteError)
}
