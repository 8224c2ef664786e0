//! # libiot-mqtt5 - MQTT 5 engine for IoT devices
//!
//! The MQTT 5 wire-protocol engine of the libiot SDK: a byte-exact codec for
//! every MQTT 5 control packet, an incremental frame reader, and the QoS
//! flow controller that keeps QoS 1/2 delivery correct across partial reads,
//! concurrent senders and reconnects. It is designed for embedded systems
//! and supports `no_std` environments with an allocator.
//!
//! ## Features
//!
//! ### Wire codec
//! - Variable Byte Integers, length-prefixed strings and binary data
//! - Typed property blocks for every MQTT 5 property
//! - Size, serialize and deserialize routines for all 15 control packets
//!
//! ### Flow control
//! - Packet identifier table with free-list reuse
//! - Receive Maximum enforcement with a FIFO pending queue
//! - Resend with DUP after reconnect, duplicate QoS 2 suppression
//!
//! ### Client façade
//! - Connect, publish, subscribe, unsubscribe, disconnect, AUTH
//! - Keep-alive and reconnect timing driven by the caller's clock
//! - JSON configuration through `serde-json-core`
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! libiot-mqtt5 = "0.1.0"
//! ```
//!
//! ### Encoding and decoding a packet
//!
//! ```rust
//! use libiot_mqtt5::network::application::mqtt5::codec;
//! use libiot_mqtt5::network::application::mqtt5::frame::FrameReader;
//! use libiot_mqtt5::network::application::mqtt5::packet::{AckData, ControlPacket};
//!
//! let encoded = codec::encode(&ControlPacket::PubAck(AckData::new(7))).unwrap();
//! assert_eq!(&encoded.frame[..], &[0x40, 0x02, 0x00, 0x07]);
//!
//! let mut reader = FrameReader::default();
//! let (_, frame) = reader.feed(&encoded.frame).unwrap();
//! let frame = frame.unwrap();
//! let packet = codec::decode(frame.header, frame.body).unwrap();
//! assert_eq!(packet, ControlPacket::PubAck(AckData::new(7)));
//! ```
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.) with a global allocator
//! - Linux-based IoT devices (Raspberry Pi, etc.)
//!
//! A `critical-section` implementation must be provided by the target: the
//! HAL on a microcontroller, or the `std` feature on a hosted platform.
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Enable defmt formatting of errors and states for embedded debugging

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![doc(html_root_url = "https://shishir-dey.github.io/libiot/")]

extern crate alloc;

/// Network abstraction layer and the MQTT 5 engine built on it.
///
/// Holds the connection traits the engine reads from and writes to, and the
/// protocol implementation under [`network::application::mqtt5`].
pub mod network;
