//! # Application Layer Protocols
//!
//! Protocol engines that sit on top of a [`Connection`](crate::network::Connection).
//!
//! - **[`mqtt5`]**: MQTT 5.0 wire codec, frame reader and QoS flow control.
//!
//! The engines are connection agnostic: they read bytes the caller reports as
//! available and write complete packets, so the same code runs over a TCP
//! socket on Linux or a smoltcp socket on a microcontroller.

/// MQTT 5.0 client engine.
///
/// Turns a byte stream into typed MQTT 5 control packets and back, and
/// enforces QoS 1/2 delivery across reconnects.
pub mod mqtt5;
