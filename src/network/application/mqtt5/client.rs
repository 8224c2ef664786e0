//! MQTT 5 client façade.
//!
//! [`Client`] turns the pub/sub vocabulary of an application (topics, QoS,
//! response topic, correlation data, content type) into MQTT 5 packets and
//! reports inbound traffic through a [`Callback`]. It owns no socket and no
//! clock: the enclosing layer passes the connection into every call, reports
//! how many bytes are ready with [`Client::receive`], and drives keep-alive
//! and reconnect timing with [`Client::tick`].
//!
//! # Features
//!
//! - QoS 0, 1 and 2 publish and receive, including duplicate suppression
//! - Flow control bounded by the server's Receive Maximum, with transparent
//!   queueing when no packet identifier is free
//! - Session resume: unacknowledged packets are resent after reconnecting
//! - Keep-alive PINGREQ and dead-link detection
//! - Will message, user properties and enhanced authentication (AUTH)
//!
//! # Example
//!
//! ```rust
//! use libiot_mqtt5::network::application::mqtt5::client::{
//!     Callback, Client, ConnAck, ConnectOptions, PublishRequest, ReceivedMessage,
//! };
//! use libiot_mqtt5::network::application::mqtt5::packet::QoS;
//! # use libiot_mqtt5::network::Connection;
//! # struct MockConnection { sent: Vec<u8> }
//! # impl Connection for MockConnection {}
//! # impl libiot_mqtt5::network::Read for MockConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl libiot_mqtt5::network::Write for MockConnection {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
//! #         self.sent.extend_from_slice(buf);
//! #         Ok(buf.len())
//! #     }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl libiot_mqtt5::network::Close for MockConnection {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//!
//! struct Printer;
//!
//! impl Callback for Printer {
//!     fn received_conn_ack(&self, ack: &ConnAck) {
//!         println!("connected, receive maximum {}", ack.receive_maximum);
//!     }
//!     fn received_publish(&self, message: ReceivedMessage) {
//!         println!("{}: {} bytes", message.topic, message.payload.len());
//!     }
//! }
//!
//! let mut connection = MockConnection { sent: Vec::new() };
//! let client = Client::new(Printer);
//!
//! let options = ConnectOptions {
//!     client_id: "sensor_device_01".into(),
//!     keep_alive: 20,
//!     ..ConnectOptions::default()
//! };
//! client.connect(&mut connection, &options).unwrap();
//!
//! // Held until the CONNACK arrives through `client.receive`.
//! let request = PublishRequest {
//!     topic: "sensors/temperature",
//!     qos: QoS::AtLeastOnce,
//!     ..PublishRequest::default()
//! };
//! client.publish(&mut connection, &request, &b"23.5"[..]).unwrap();
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use bytes::Bytes;
use log::{error, info, warn};

use super::config::ClientConfig;
use super::cursor::VAR_INT_MAX;
use super::error::Error;
use super::flow::{Abandoned, SendOutcome};
use super::lock::Shared;
use super::packet::{
    AuthData, ConnAckData, ConnectData, DisconnectData, PublishData, QoS, SubscribeData,
    SubscribeEntry, UnsubscribeData, WillMessage, reason_code,
};
use super::property::{Properties, PropertyId};
use super::protocol::{Inbound, Protocol};
use super::timer::PollingTimer;
use crate::network::{Read, Write};

/// Events reported by the client.
///
/// Every method is called without any engine lock held, so a callback may
/// call back into the [`Client`].
pub trait Callback {
    /// A successful CONNACK arrived.
    fn received_conn_ack(&self, ack: &ConnAck);

    /// The server refused the connection (CONNACK reason code of 128 or more).
    fn connection_refused(&self, refusal: &Refusal) {
        let _ = refusal;
    }

    /// An application message arrived.
    fn received_publish(&self, message: ReceivedMessage);

    /// SUBACK for the SUBSCRIBE sent with `packet_id`.
    fn received_sub_ack(&self, packet_id: u16, reason_codes: &[u8]) {
        let _ = (packet_id, reason_codes);
    }

    /// UNSUBACK for the UNSUBSCRIBE sent with `packet_id`.
    fn received_unsub_ack(&self, packet_id: u16, reason_codes: &[u8]) {
        let _ = (packet_id, reason_codes);
    }

    /// PINGRESP.
    fn received_ping_resp(&self) {}

    /// The server sent DISCONNECT.
    fn received_disconnect(&self, info: &DisconnectInfo) {
        let _ = info;
    }

    /// The server sent AUTH.
    fn received_auth(&self, info: &AuthInfo) {
        let _ = info;
    }

    /// QoS 1/2 sends dropped by [`Client::disconnect`] without keeping the session.
    fn delivery_abandoned(&self, abandoned: &[Abandoned]) {
        let _ = abandoned;
    }

    /// The connection has to be closed: malformed input or keep-alive expiry.
    fn close_connection(&self) {}
}

/// Will Message settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Will {
    /// Topic the server publishes the will to.
    pub topic: String,
    /// Will payload.
    pub payload: Vec<u8>,
    /// QoS of the will publication.
    pub qos: QoS,
    /// Publish the will as retained.
    pub retain: bool,
    /// Seconds the server waits before publishing the will.
    pub delay_interval: Option<u32>,
    /// Lifetime of the will message in seconds.
    pub message_expiry_interval: Option<u32>,
    /// MIME type of the payload.
    pub content_type: Option<String>,
    /// The payload is UTF-8 text.
    pub payload_format_utf8: bool,
}

/// Settings for [`Client::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Client identifier; empty reuses the last server-assigned one, or asks
    /// the server to assign one.
    pub client_id: String,
    /// Optional user name.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<Vec<u8>>,
    /// Keep-alive in seconds, 0 disables it.
    pub keep_alive: u16,
    /// Session expiry in seconds.
    pub session_expiry_interval: u32,
    /// QoS 1/2 publishes this client accepts concurrently.
    pub receive_maximum: u16,
    /// Largest packet this client accepts.
    pub maximum_packet_size: u32,
    /// Optional Will Message.
    pub will: Option<Will>,
    /// Enhanced authentication method.
    pub authentication_method: Option<String>,
    /// Enhanced authentication data.
    pub authentication_data: Option<Vec<u8>>,
    /// User properties sent with CONNECT.
    pub user_properties: Vec<(String, String)>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            username: None,
            password: None,
            keep_alive: 60,
            session_expiry_interval: 0,
            receive_maximum: u16::MAX,
            maximum_packet_size: VAR_INT_MAX,
            will: None,
            authentication_method: None,
            authentication_data: None,
            user_properties: Vec::new(),
        }
    }
}

/// A successful CONNACK with its properties resolved to their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnAck {
    /// The server resumed an existing session.
    pub session_present: bool,
    /// Reason code, below 128.
    pub reason_code: u8,
    /// Session expiry chosen by the server.
    pub session_expiry_interval: Option<u32>,
    /// QoS 1/2 publishes the server accepts concurrently.
    pub receive_maximum: u16,
    /// Highest QoS the server supports.
    pub maximum_qos: QoS,
    /// Retained messages are supported.
    pub retain_available: bool,
    /// Largest packet the server accepts.
    pub maximum_packet_size: Option<u32>,
    /// Identifier assigned by the server.
    pub assigned_client_id: Option<String>,
    /// Highest topic alias the server accepts.
    pub topic_alias_maximum: u16,
    /// Human readable diagnostic.
    pub reason_string: Option<String>,
    /// Wildcard subscriptions are supported.
    pub wildcard_subscription_available: bool,
    /// Subscription identifiers are supported.
    pub subscription_identifiers_available: bool,
    /// Shared subscriptions are supported.
    pub shared_subscription_available: bool,
    /// Keep-alive imposed by the server.
    pub server_keep_alive: Option<u16>,
    /// Basis for response topics.
    pub response_information: Option<String>,
    /// Another server to use.
    pub server_reference: Option<String>,
    /// Enhanced authentication method.
    pub authentication_method: Option<String>,
    /// Enhanced authentication data.
    pub authentication_data: Option<Vec<u8>>,
    /// User properties.
    pub user_properties: Vec<(String, String)>,
}

fn availability(properties: &Properties, id: PropertyId) -> bool {
    properties.integer(id).is_none_or(|v| v != 0)
}

fn owned(properties: &Properties, id: PropertyId) -> Option<String> {
    properties.string(id).map(String::from)
}

impl ConnAck {
    fn from_packet(data: ConnAckData) -> Self {
        let p = &data.properties;
        Self {
            session_present: data.session_present,
            reason_code: data.reason_code,
            session_expiry_interval: p.integer(PropertyId::SessionExpiryInterval),
            receive_maximum: p
                .integer(PropertyId::ReceiveMaximum)
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or(u16::MAX),
            maximum_qos: p
                .integer(PropertyId::MaximumQoS)
                .and_then(|v| u8::try_from(v).ok())
                .and_then(|v| QoS::try_from(v).ok())
                .unwrap_or(QoS::ExactlyOnce),
            retain_available: availability(p, PropertyId::RetainAvailable),
            maximum_packet_size: p.integer(PropertyId::MaximumPacketSize),
            assigned_client_id: owned(p, PropertyId::AssignedClientIdentifier),
            topic_alias_maximum: p
                .integer(PropertyId::TopicAliasMaximum)
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or(0),
            reason_string: owned(p, PropertyId::ReasonString),
            wildcard_subscription_available: availability(
                p,
                PropertyId::WildcardSubscriptionAvailable,
            ),
            subscription_identifiers_available: availability(
                p,
                PropertyId::SubscriptionIdentifiersAvailable,
            ),
            shared_subscription_available: availability(p, PropertyId::SharedSubscriptionAvailable),
            server_keep_alive: p
                .integer(PropertyId::ServerKeepAlive)
                .and_then(|v| u16::try_from(v).ok()),
            response_information: owned(p, PropertyId::ResponseInformation),
            server_reference: owned(p, PropertyId::ServerReference),
            authentication_method: owned(p, PropertyId::AuthenticationMethod),
            authentication_data: p.binary(PropertyId::AuthenticationData).map(Vec::from),
            user_properties: p.user_properties().to_vec(),
        }
    }
}

/// A CONNACK carrying a failure reason code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    /// Reason code, 128 or more.
    pub reason_code: u8,
    /// Human readable diagnostic.
    pub reason_string: Option<String>,
    /// Another server to use.
    pub server_reference: Option<String>,
    /// User properties.
    pub user_properties: Vec<(String, String)>,
}

/// An application message delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Topic, with the configured prefix removed.
    pub topic: String,
    /// Application payload, moved out of the receive buffer without a copy.
    pub payload: Bytes,
    /// QoS the message was delivered with.
    pub qos: QoS,
    /// The message was retained.
    pub retain: bool,
    /// The server marked the message as a retransmission.
    pub dup: bool,
    /// The payload is UTF-8 text.
    pub payload_format_utf8: bool,
    /// Remaining lifetime in seconds.
    pub message_expiry_interval: Option<u32>,
    /// MIME type of the payload.
    pub content_type: Option<String>,
    /// Topic for a response.
    pub response_topic: Option<String>,
    /// Correlation data for a response.
    pub correlation_data: Option<Vec<u8>>,
    /// Identifiers of the matching subscriptions.
    pub subscription_identifiers: Vec<u32>,
    /// User properties.
    pub user_properties: Vec<(String, String)>,
}

impl ReceivedMessage {
    fn from_publish(data: PublishData, prefix: &str) -> Self {
        let stripped = if prefix.is_empty() {
            None
        } else {
            data.topic.strip_prefix(prefix).map(String::from)
        };
        let p = &data.properties;
        Self {
            payload_format_utf8: p.integer(PropertyId::PayloadFormatIndicator) == Some(1),
            message_expiry_interval: p.integer(PropertyId::MessageExpiryInterval),
            content_type: owned(p, PropertyId::ContentType),
            response_topic: owned(p, PropertyId::ResponseTopic),
            correlation_data: p.binary(PropertyId::CorrelationData).map(Vec::from),
            subscription_identifiers: p
                .variable_integers(PropertyId::SubscriptionIdentifier)
                .to_vec(),
            user_properties: p.user_properties().to_vec(),
            topic: stripped.unwrap_or(data.topic),
            payload: data.payload,
            qos: data.qos,
            retain: data.retain,
            dup: data.dup,
        }
    }
}

/// DISCONNECT received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectInfo {
    /// Disconnect reason code.
    pub reason_code: u8,
    /// Human readable diagnostic.
    pub reason_string: Option<String>,
    /// Another server to use.
    pub server_reference: Option<String>,
    /// User properties.
    pub user_properties: Vec<(String, String)>,
}

/// AUTH received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    /// Authenticate reason code.
    pub reason_code: u8,
    /// Authentication method.
    pub method: Option<String>,
    /// Authentication data.
    pub data: Option<Vec<u8>>,
    /// Human readable diagnostic.
    pub reason_string: Option<String>,
    /// User properties.
    pub user_properties: Vec<(String, String)>,
}

/// Arguments of [`Client::publish`].
#[derive(Debug, Clone, Default)]
pub struct PublishRequest<'a> {
    /// Topic name; the configured prefix is prepended.
    pub topic: &'a str,
    /// Delivery guarantee.
    pub qos: QoS,
    /// Retain the message on the server.
    pub retain: bool,
    /// Lifetime of the message in seconds.
    pub message_expiry_interval: Option<u32>,
    /// Topic for a response.
    pub response_topic: Option<&'a str>,
    /// Correlation data for a response.
    pub correlation_data: Option<&'a [u8]>,
    /// MIME type of the payload.
    pub content_type: Option<&'a str>,
    /// The payload is UTF-8 text.
    pub payload_format_utf8: bool,
    /// User properties.
    pub user_properties: &'a [(&'a str, &'a str)],
}

/// Arguments of [`Client::subscribe`].
#[derive(Debug, Clone, Default)]
pub struct SubscribeRequest<'a> {
    /// Topic filters and options; the configured prefix is prepended.
    pub entries: &'a [SubscribeEntry],
    /// Identifier echoed in matching PUBLISH packets.
    pub subscription_identifier: Option<u32>,
    /// User properties.
    pub user_properties: &'a [(&'a str, &'a str)],
}

/// Arguments of [`Client::disconnect`].
#[derive(Debug, Clone, Default)]
pub struct DisconnectRequest<'a> {
    /// Disconnect reason code.
    pub reason_code: u8,
    /// Human readable diagnostic.
    pub reason_string: Option<&'a str>,
    /// New session expiry in seconds.
    pub session_expiry_interval: Option<u32>,
    /// Keep in-flight and queued sends for a resumed session instead of
    /// abandoning them.
    pub keep_session: bool,
}

/// Arguments of [`Client::auth`].
#[derive(Debug, Clone, Default)]
pub struct AuthRequest<'a> {
    /// Authenticate reason code.
    pub reason_code: u8,
    /// Authentication method.
    pub method: Option<&'a str>,
    /// Authentication data.
    pub data: Option<&'a [u8]>,
    /// Human readable diagnostic.
    pub reason_string: Option<&'a str>,
}

/// What [`Client::tick`] found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// A PINGREQ was written.
    pub ping_sent: bool,
    /// Nothing was received for 1.5 times the keep-alive; the link is dead.
    pub keep_alive_expired: bool,
    /// The reconnect interval since the link went down has elapsed.
    pub reconnect_due: bool,
}

#[derive(Debug)]
struct Session {
    first_connection: bool,
    client_id: String,
    keep_alive: u16,
    ping: PollingTimer,
    activity: PollingTimer,
    reconnect: PollingTimer,
    reconnect_interval_ms: u64,
    topic_prefix: String,
}

impl Session {
    fn new(reconnect_interval_ms: u64, topic_prefix: String) -> Self {
        Self {
            first_connection: true,
            client_id: String::new(),
            keep_alive: 0,
            ping: PollingTimer::new(),
            activity: PollingTimer::new(),
            reconnect: PollingTimer::new(),
            reconnect_interval_ms,
            topic_prefix,
        }
    }

    fn arm_keep_alive(&mut self) {
        if self.keep_alive == 0 {
            self.ping.stop();
            self.activity.stop();
            return;
        }
        let period = u64::from(self.keep_alive) * 1_000;
        self.ping.start(period);
        self.activity.start(period + period / 2);
    }

    fn touch(&mut self) {
        if self.activity.is_running() {
            self.activity.start(self.activity.interval_ms());
        }
    }

    fn link_down(&mut self) {
        self.ping.stop();
        self.activity.stop();
        self.reconnect.start(self.reconnect_interval_ms);
    }

    fn prefixed(&self, topic: &str) -> String {
        let mut full = String::with_capacity(self.topic_prefix.len() + topic.len());
        full.push_str(&self.topic_prefix);
        full.push_str(topic);
        full
    }
}

/// MQTT 5 client for one logical connection.
///
/// All methods take `&self`; a `Client` can be shared between a receive
/// thread and any number of sender threads.
pub struct Client<H: Callback> {
    protocol: Protocol,
    session: Shared<Session>,
    callback: H,
}

impl<H: Callback> core::fmt::Debug for Client<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("protocol", &self.protocol)
            .field("client_id", &self.client_id())
            .finish_non_exhaustive()
    }
}

impl<H: Callback> Client<H> {
    /// A client with default settings.
    pub fn new(callback: H) -> Self {
        Self {
            protocol: Protocol::new(),
            session: Shared::new(Session::new(1_000, String::new())),
            callback,
        }
    }

    /// A client using the reconnect interval and topic prefix of `config`.
    pub fn with_config(config: &ClientConfig, callback: H) -> Result<Self, Error> {
        config.validate()?;
        let session = Session::new(
            u64::from(config.reconnect_interval_ms),
            String::from(config.topic_prefix.as_str()),
        );
        Ok(Self {
            protocol: Protocol::new(),
            session: Shared::new(session),
            callback,
        })
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        self.session.with(f)
    }

    /// The callback handler.
    pub fn callback(&self) -> &H {
        &self.callback
    }

    /// Protocol state, for inspection.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// `true` once a successful CONNACK has been processed.
    pub fn is_connected(&self) -> bool {
        self.protocol.is_ready()
    }

    /// Client identifier in use, including one assigned by the server.
    pub fn client_id(&self) -> String {
        self.with_session(|s| s.client_id.clone())
    }

    /// Keep-alive in effect, after any Server Keep Alive override.
    pub fn keep_alive(&self) -> u16 {
        self.with_session(|s| s.keep_alive)
    }

    /// Send CONNECT.
    ///
    /// The first connection of a client starts a clean session; later ones
    /// resume it, until [`Client::disconnect`] drops the session.
    pub fn connect<C>(&self, conn: &mut C, options: &ConnectOptions) -> Result<(), Error>
    where
        C: Write + ?Sized,
    {
        let (clean_start, client_id) = self.with_session(|s| {
            if !options.client_id.is_empty() {
                s.client_id = options.client_id.clone();
            }
            s.keep_alive = options.keep_alive;
            s.ping.stop();
            s.activity.stop();
            s.reconnect.stop();
            (s.first_connection, s.client_id.clone())
        });

        let mut properties = Properties::new();
        if options.session_expiry_interval != 0 {
            properties.set_integer(
                PropertyId::SessionExpiryInterval,
                options.session_expiry_interval,
            )?;
        }
        if options.receive_maximum != u16::MAX {
            properties.set_integer(PropertyId::ReceiveMaximum, u32::from(options.receive_maximum))?;
        }
        if options.maximum_packet_size != VAR_INT_MAX {
            properties.set_integer(PropertyId::MaximumPacketSize, options.maximum_packet_size)?;
        }
        if let Some(method) = &options.authentication_method {
            properties.set_string(PropertyId::AuthenticationMethod, method.as_str())?;
        }
        if let Some(data) = &options.authentication_data {
            properties.set_binary(PropertyId::AuthenticationData, data.as_slice())?;
        }
        for (key, value) in &options.user_properties {
            properties.push_user_property(key.as_str(), value.as_str());
        }

        let will = match &options.will {
            Some(will) => Some(will_message(will)?),
            None => None,
        };

        let data = ConnectData {
            keep_alive: options.keep_alive,
            properties,
            client_id,
            will,
            username: options.username.clone(),
            password: options.password.clone(),
            clean_start,
        };
        self.protocol
            .send_connect(conn, data, options.maximum_packet_size)?;
        info!(
            "CONNECT sent, clean_start={} keep_alive={}",
            clean_start, options.keep_alive
        );
        Ok(())
    }

    /// Publish `payload` to `request.topic`.
    ///
    /// QoS 0 messages are dropped while the link is not ready. QoS 1 and 2
    /// messages are queued until CONNACK or until a packet identifier frees
    /// up; completion is only visible as the absence of a later
    /// [`Callback::delivery_abandoned`].
    pub fn publish<C>(
        &self,
        conn: &mut C,
        request: &PublishRequest<'_>,
        payload: impl Into<Bytes>,
    ) -> Result<SendOutcome, Error>
    where
        C: Write + ?Sized,
    {
        let mut properties = Properties::new();
        if request.payload_format_utf8 {
            properties.set_integer(PropertyId::PayloadFormatIndicator, 1)?;
        }
        if let Some(expiry) = request.message_expiry_interval {
            properties.set_integer(PropertyId::MessageExpiryInterval, expiry)?;
        }
        if let Some(content_type) = request.content_type {
            properties.set_string(PropertyId::ContentType, content_type)?;
        }
        if let Some(response_topic) = request.response_topic {
            properties.set_string(PropertyId::ResponseTopic, response_topic)?;
        }
        if let Some(correlation) = request.correlation_data {
            properties.set_binary(PropertyId::CorrelationData, correlation)?;
        }
        for (key, value) in request.user_properties {
            properties.push_user_property(*key, *value);
        }

        let data = PublishData {
            qos: request.qos,
            dup: false,
            retain: request.retain,
            topic: self.with_session(|s| s.prefixed(request.topic)),
            packet_id: (request.qos != QoS::AtMostOnce).then_some(0),
            properties,
            payload: payload.into(),
        };
        self.protocol.send_publish(conn, data)
    }

    /// Subscribe to one or more topic filters.
    pub fn subscribe<C>(
        &self,
        conn: &mut C,
        request: &SubscribeRequest<'_>,
    ) -> Result<SendOutcome, Error>
    where
        C: Write + ?Sized,
    {
        let mut properties = Properties::new();
        if let Some(id) = request.subscription_identifier {
            properties.push_variable_integer(PropertyId::SubscriptionIdentifier, id)?;
        }
        for (key, value) in request.user_properties {
            properties.push_user_property(*key, *value);
        }
        let entries: Vec<SubscribeEntry> = self.with_session(|s| {
            request
                .entries
                .iter()
                .map(|entry| SubscribeEntry {
                    topic_filter: s.prefixed(&entry.topic_filter),
                    ..entry.clone()
                })
                .collect()
        });
        self.protocol.send_subscribe(
            conn,
            SubscribeData {
                packet_id: 0,
                properties,
                entries,
            },
        )
    }

    /// Remove subscriptions.
    pub fn unsubscribe<C>(&self, conn: &mut C, topics: &[&str]) -> Result<SendOutcome, Error>
    where
        C: Write + ?Sized,
    {
        let topics: Vec<String> =
            self.with_session(|s| topics.iter().map(|t| s.prefixed(t)).collect());
        self.protocol.send_unsubscribe(
            conn,
            UnsubscribeData {
                packet_id: 0,
                properties: Properties::new(),
                topics,
            },
        )
    }

    /// Send DISCONNECT and return to the idle state.
    ///
    /// Without `keep_session` every unacknowledged QoS 1/2 send is reported
    /// through [`Callback::delivery_abandoned`] and the next
    /// [`Client::connect`] starts a clean session. The local state is reset
    /// even if writing DISCONNECT fails.
    pub fn disconnect<C>(&self, conn: &mut C, request: &DisconnectRequest<'_>) -> Result<(), Error>
    where
        C: Write + ?Sized,
    {
        let mut properties = Properties::new();
        if let Some(expiry) = request.session_expiry_interval {
            properties.set_integer(PropertyId::SessionExpiryInterval, expiry)?;
        }
        if let Some(reason) = request.reason_string {
            properties.set_string(PropertyId::ReasonString, reason)?;
        }
        let sent = self.protocol.send_disconnect(
            conn,
            DisconnectData {
                reason_code: request.reason_code,
                properties,
            },
        );

        let keep = request.keep_session;
        self.with_session(|s| {
            s.ping.stop();
            s.activity.stop();
            s.reconnect.stop();
            if !keep {
                s.first_connection = true;
                s.client_id.clear();
            }
        });
        if keep {
            self.protocol.connection_lost();
        } else {
            let abandoned = self.protocol.reset();
            if !abandoned.is_empty() {
                warn!("abandoning {} unacknowledged sends", abandoned.len());
                self.callback.delivery_abandoned(&abandoned);
            }
        }
        sent
    }

    /// Send AUTH for enhanced authentication.
    pub fn auth<C>(&self, conn: &mut C, request: &AuthRequest<'_>) -> Result<(), Error>
    where
        C: Write + ?Sized,
    {
        let mut properties = Properties::new();
        if let Some(method) = request.method {
            properties.set_string(PropertyId::AuthenticationMethod, method)?;
        }
        if let Some(data) = request.data {
            properties.set_binary(PropertyId::AuthenticationData, data)?;
        }
        if let Some(reason) = request.reason_string {
            properties.set_string(PropertyId::ReasonString, reason)?;
        }
        self.protocol.send_auth(
            conn,
            AuthData {
                reason_code: request.reason_code,
                properties,
            },
        )
    }

    /// Drive keep-alive and reconnect timing.
    ///
    /// `now_ms` is any monotonic millisecond clock owned by the caller.
    pub fn tick<C>(&self, conn: &mut C, now_ms: u64) -> Result<TickOutcome, Error>
    where
        C: Write + ?Sized,
    {
        let (expired, ping_due, reconnect_due) = self.with_session(|s| {
            let expired = s.activity.is_expired(now_ms);
            let ping_due = !expired && s.ping.is_expired(now_ms);
            if ping_due {
                s.ping.start_at(u64::from(s.keep_alive) * 1_000, now_ms);
            }
            if expired {
                s.ping.stop();
                s.reconnect.start_at(s.reconnect_interval_ms, now_ms);
            }
            (expired, ping_due, s.reconnect.is_expired(now_ms))
        });

        let mut outcome = TickOutcome::default();
        if expired {
            warn!("keep-alive expired, nothing received for 1.5x keep-alive");
            self.protocol.connection_lost();
            self.callback.close_connection();
            outcome.keep_alive_expired = true;
        }
        if ping_due && self.protocol.is_ready() {
            self.protocol.send_ping(conn)?;
            outcome.ping_sent = true;
        }
        if reconnect_due {
            info!("reconnect interval elapsed");
            outcome.reconnect_due = true;
        }
        Ok(outcome)
    }

    /// Read up to `available` bytes from `conn` and process every packet
    /// they complete.
    ///
    /// A malformed packet requests [`Callback::close_connection`] and returns
    /// the codec error; delivery state is kept so the session can resume on a
    /// new connection.
    pub fn receive<C>(&self, conn: &mut C, available: usize) -> Result<usize, Error>
    where
        C: Read + Write + ?Sized,
    {
        match self
            .protocol
            .receive(conn, available, |inbound| self.handle_inbound(inbound))
        {
            Ok(read) => {
                if read > 0 {
                    self.with_session(|s| s.touch());
                }
                Ok(read)
            }
            Err(Error::Codec(e)) => {
                error!("closing connection after malformed packet: {}", e);
                self.protocol.connection_lost();
                self.with_session(|s| s.link_down());
                self.callback.close_connection();
                Err(Error::Codec(e))
            }
            Err(e) => Err(e),
        }
    }

    /// The enclosing layer lost the connection. Delivery state is kept and
    /// resent after the next successful CONNACK; the reconnect timer starts.
    pub fn connection_lost(&self) {
        self.protocol.connection_lost();
        self.with_session(|s| s.link_down());
    }

    fn handle_inbound(&self, inbound: Inbound) {
        match inbound {
            Inbound::ConnAck(data) => self.on_conn_ack(data),
            Inbound::Publish(data) => {
                let message =
                    self.with_session(|s| ReceivedMessage::from_publish(data, &s.topic_prefix));
                self.callback.received_publish(message);
            }
            Inbound::SubAck(data) => self
                .callback
                .received_sub_ack(data.packet_id, &data.reason_codes),
            Inbound::UnsubAck(data) => self
                .callback
                .received_unsub_ack(data.packet_id, &data.reason_codes),
            Inbound::PingResp => self.callback.received_ping_resp(),
            Inbound::Disconnect(data) => {
                warn!("server sent DISCONNECT with reason 0x{:02x}", data.reason_code);
                self.with_session(|s| s.link_down());
                let p = &data.properties;
                self.callback.received_disconnect(&DisconnectInfo {
                    reason_code: data.reason_code,
                    reason_string: owned(p, PropertyId::ReasonString),
                    server_reference: owned(p, PropertyId::ServerReference),
                    user_properties: p.user_properties().to_vec(),
                });
            }
            Inbound::Auth(data) => {
                let p = &data.properties;
                self.callback.received_auth(&AuthInfo {
                    reason_code: data.reason_code,
                    method: owned(p, PropertyId::AuthenticationMethod),
                    data: p.binary(PropertyId::AuthenticationData).map(Vec::from),
                    reason_string: owned(p, PropertyId::ReasonString),
                    user_properties: p.user_properties().to_vec(),
                });
            }
        }
    }

    fn on_conn_ack(&self, data: ConnAckData) {
        if reason_code::is_failure(data.reason_code) {
            warn!("connection refused with reason 0x{:02x}", data.reason_code);
            self.with_session(|s| {
                s.ping.stop();
                s.activity.stop();
            });
            let p = &data.properties;
            self.callback.connection_refused(&Refusal {
                reason_code: data.reason_code,
                reason_string: owned(p, PropertyId::ReasonString),
                server_reference: owned(p, PropertyId::ServerReference),
                user_properties: p.user_properties().to_vec(),
            });
            return;
        }

        let ack = ConnAck::from_packet(data);
        self.with_session(|s| {
            s.first_connection = false;
            if let Some(id) = &ack.assigned_client_id {
                s.client_id = id.clone();
            }
            if let Some(keep_alive) = ack.server_keep_alive {
                s.keep_alive = keep_alive;
            }
            s.arm_keep_alive();
        });
        info!(
            "connected, session_present={} receive_maximum={}",
            ack.session_present, ack.receive_maximum
        );
        self.callback.received_conn_ack(&ack);
    }
}

fn will_message(will: &Will) -> Result<WillMessage, Error> {
    let mut properties = Properties::new();
    if let Some(delay) = will.delay_interval {
        properties.set_integer(PropertyId::WillDelayInterval, delay)?;
    }
    if let Some(expiry) = will.message_expiry_interval {
        properties.set_integer(PropertyId::MessageExpiryInterval, expiry)?;
    }
    if let Some(content_type) = &will.content_type {
        properties.set_string(PropertyId::ContentType, content_type.as_str())?;
    }
    if will.payload_format_utf8 {
        properties.set_integer(PropertyId::PayloadFormatIndicator, 1)?;
    }
    Ok(WillMessage {
        properties,
        topic: will.topic.clone(),
        payload: will.payload.clone(),
        retain: will.retain,
        qos: will.qos,
    })
}
