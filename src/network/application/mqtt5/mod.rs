//! MQTT 5.0 protocol engine for embedded systems.
//!
//! The engine turns a byte stream on one duplex connection into typed MQTT 5
//! control packets and back, and enforces the delivery guarantees of QoS 1
//! and 2 across partial reads, concurrent senders, a bounded packet
//! identifier pool and reconnects.
//!
//! # Layers
//!
//! | Module       | Role                                                          |
//! |--------------|---------------------------------------------------------------|
//! | [`property`] | Property identifiers, their wire types, the property set      |
//! | [`cursor`]   | Bounds-checked read/write cursors and primitive encodings     |
//! | [`packet`]   | Typed control packets                                         |
//! | [`codec`]    | `size_*`, `serialize_*` and `deserialize_*` for every packet  |
//! | [`frame`]    | Incremental frame reader                                      |
//! | [`flow`]     | Packet identifiers, in-flight list, pending queue             |
//! | [`protocol`] | Dispatch of inbound packets, QoS handshakes, outbound routing |
//! | [`client`]   | Application-facing façade and callbacks                       |
//! | [`config`]   | JSON client configuration                                     |
//! | [`timer`]    | Caller-clocked timers for keep-alive and reconnect            |
//!
//! # Data flow
//!
//! ```text
//! bytes -> FrameReader -> codec::decode -> Protocol -> FlowController -> acks out
//!                                              |
//!                                              +-> Client -> Callback
//!
//! Client -> codec::encode -> FlowController::prepare_for_send -> send / queue
//! ```

/// Application-facing client.
pub mod client;
/// Stateless packet codec.
pub mod codec;
/// JSON client configuration.
pub mod config;
/// Bounds-checked cursors.
pub mod cursor;
/// Error types.
pub mod error;
/// QoS flow control.
pub mod flow;
/// Incremental frame reader.
pub mod frame;
mod lock;
/// Typed control packets.
pub mod packet;
/// Property table and property set.
pub mod property;
/// Packet dispatcher.
pub mod protocol;
/// Caller-clocked timers.
pub mod timer;

pub use client::{
    AuthRequest, Callback, Client, ConnAck, ConnectOptions, DisconnectRequest, PublishRequest,
    ReceivedMessage, SubscribeRequest, TickOutcome, Will,
};
pub use config::ClientConfig;
pub use error::{CodecError, Error};
pub use flow::SendOutcome;
pub use packet::{QoS, RetainHandling, SubscribeEntry};
