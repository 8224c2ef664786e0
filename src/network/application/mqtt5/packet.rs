//! Typed MQTT 5 control packets.
//!
//! One data structure per packet kind, each owning its property set and
//! payload. [`ControlPacket`] is the tagged union the codec produces and
//! consumes.

use alloc::string::String;
use alloc::vec::Vec;

use bytes::Bytes;

use super::error::CodecError;
use super::property::Properties;

/// Reason codes the engine itself produces or inspects.
pub mod reason_code {
    /// Success, Normal disconnection, Granted QoS 0.
    pub const SUCCESS: u8 = 0x00;
    /// First failure code; every code at or above it is a failure.
    pub const UNSPECIFIED_ERROR: u8 = 0x80;
    /// PUBREL or PUBCOMP for an identifier the receiver does not know.
    pub const PACKET_IDENTIFIER_NOT_FOUND: u8 = 0x92;

    /// `true` for reason codes that report a failure.
    pub const fn is_failure(code: u8) -> bool {
        code >= UNSPECIFIED_ERROR
    }
}

/// MQTT control packet types, the high nibble of the fixed header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Command {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl Command {
    /// Extract the command from a fixed header byte.
    pub fn from_header(header: u8) -> Result<Self, CodecError> {
        Ok(match header >> 4 {
            1 => Command::Connect,
            2 => Command::ConnAck,
            3 => Command::Publish,
            4 => Command::PubAck,
            5 => Command::PubRec,
            6 => Command::PubRel,
            7 => Command::PubComp,
            8 => Command::Subscribe,
            9 => Command::SubAck,
            10 => Command::Unsubscribe,
            11 => Command::UnsubAck,
            12 => Command::PingReq,
            13 => Command::PingResp,
            14 => Command::Disconnect,
            15 => Command::Auth,
            _ => return Err(CodecError::UnknownCommand { header }),
        })
    }

    /// The low nibble every packet of this command must carry.
    ///
    /// `None` for PUBLISH, whose low nibble holds DUP, QoS and RETAIN.
    pub const fn required_flags(self) -> Option<u8> {
        match self {
            Command::Publish => None,
            Command::PubRel | Command::Subscribe | Command::Unsubscribe => Some(0b0010),
            _ => Some(0b0000),
        }
    }

    /// Fixed header byte for every command except PUBLISH.
    pub const fn header(self) -> u8 {
        let flags = match self.required_flags() {
            Some(flags) => flags,
            None => 0,
        };
        ((self as u8) << 4) | flags
    }
}

/// Quality of Service levels.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    /// At most once delivery.
    #[default]
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(CodecError::InvalidQoS),
        }
    }
}

/// When the server sends retained messages for a new subscription.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RetainHandling {
    /// Send retained messages at subscribe time.
    #[default]
    SendAtSubscribe = 0,
    /// Send retained messages only if the subscription is new.
    SendIfNew = 1,
    /// Never send retained messages for this subscription.
    DoNotSend = 2,
}

impl TryFrom<u8> for RetainHandling {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RetainHandling::SendAtSubscribe),
            1 => Ok(RetainHandling::SendIfNew),
            2 => Ok(RetainHandling::DoNotSend),
            _ => Err(CodecError::InvalidSubscriptionOptions { options: value << 4 }),
        }
    }
}

/// The Will Message carried in CONNECT.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct WillMessage {
    /// Will properties (delay interval, content type, expiry, ...).
    pub properties: Properties,
    /// Topic the server publishes the will to.
    pub topic: String,
    /// Will payload.
    pub payload: Vec<u8>,
    /// Publish the will as retained.
    pub retain: bool,
    /// QoS of the will publication.
    pub qos: QoS,
}

/// CONNECT.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ConnectData {
    /// Keep-alive in seconds, 0 disables it.
    pub keep_alive: u16,
    /// CONNECT properties.
    pub properties: Properties,
    /// Client identifier, may be empty to let the server assign one.
    pub client_id: String,
    /// Optional Will Message.
    pub will: Option<WillMessage>,
    /// Optional user name.
    pub username: Option<String>,
    /// Optional password.
    pub password: Option<Vec<u8>>,
    /// Start a new session instead of resuming one.
    pub clean_start: bool,
}

/// CONNACK.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ConnAckData {
    /// The server resumed an existing session.
    pub session_present: bool,
    /// Connect reason code.
    pub reason_code: u8,
    /// CONNACK properties.
    pub properties: Properties,
}

/// PUBLISH.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct PublishData {
    /// Delivery guarantee.
    pub qos: QoS,
    /// Retransmission of an earlier attempt.
    pub dup: bool,
    /// Retain the message on the server.
    pub retain: bool,
    /// Topic name.
    pub topic: String,
    /// Packet identifier, present only for QoS 1 and 2.
    pub packet_id: Option<u16>,
    /// PUBLISH properties.
    pub properties: Properties,
    /// Opaque application payload.
    pub payload: Bytes,
}

impl PublishData {
    /// Low nibble of the PUBLISH fixed header.
    pub fn flags(&self) -> u8 {
        ((self.qos as u8) << 1) | (u8::from(self.dup) << 3) | u8::from(self.retain)
    }
}

/// PUBACK, PUBREC, PUBREL and PUBCOMP share one layout.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct AckData {
    /// Identifier of the acknowledged packet.
    pub packet_id: u16,
    /// Reason code, 0 on success.
    pub reason_code: u8,
    /// Ack properties.
    pub properties: Properties,
}

impl AckData {
    /// A successful ack without properties.
    pub fn new(packet_id: u16) -> Self {
        Self {
            packet_id,
            ..Self::default()
        }
    }

    /// An ack carrying `reason_code`.
    pub fn with_reason(packet_id: u16, reason_code: u8) -> Self {
        Self {
            packet_id,
            reason_code,
            properties: Properties::new(),
        }
    }
}

/// One topic filter of a SUBSCRIBE.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SubscribeEntry {
    /// Topic filter, may contain wildcards.
    pub topic_filter: String,
    /// Retained message handling.
    pub retain_handling: RetainHandling,
    /// Keep the RETAIN flag of forwarded messages.
    pub retain_as_published: bool,
    /// Do not receive messages this client published.
    pub no_local: bool,
    /// Maximum QoS granted to this subscription.
    pub qos: QoS,
}

impl SubscribeEntry {
    /// A subscription with default options at `qos`.
    pub fn new(topic_filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            qos,
            ..Self::default()
        }
    }

    /// The Subscription Options byte.
    pub fn options(&self) -> u8 {
        (self.qos as u8)
            | (u8::from(self.no_local) << 2)
            | (u8::from(self.retain_as_published) << 3)
            | ((self.retain_handling as u8) << 4)
    }

    /// Fill the option fields from a Subscription Options byte.
    pub fn set_options(&mut self, options: u8) -> Result<(), CodecError> {
        if options & 0xC0 != 0 {
            return Err(CodecError::InvalidSubscriptionOptions { options });
        }
        self.qos = QoS::try_from(options & 0x03)
            .map_err(|_| CodecError::InvalidSubscriptionOptions { options })?;
        self.no_local = options & 0x04 != 0;
        self.retain_as_published = options & 0x08 != 0;
        self.retain_handling = RetainHandling::try_from((options >> 4) & 0x03)
            .map_err(|_| CodecError::InvalidSubscriptionOptions { options })?;
        Ok(())
    }
}

/// SUBSCRIBE.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SubscribeData {
    /// Packet identifier, patched in by the flow controller.
    pub packet_id: u16,
    /// SUBSCRIBE properties.
    pub properties: Properties,
    /// At least one subscription.
    pub entries: Vec<SubscribeEntry>,
}

/// SUBACK and UNSUBACK share one layout.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SubAckData {
    /// Identifier of the acknowledged request.
    pub packet_id: u16,
    /// Ack properties.
    pub properties: Properties,
    /// One reason code per requested topic filter.
    pub reason_codes: Vec<u8>,
}

/// UNSUBSCRIBE.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct UnsubscribeData {
    /// Packet identifier, patched in by the flow controller.
    pub packet_id: u16,
    /// UNSUBSCRIBE properties.
    pub properties: Properties,
    /// At least one topic filter.
    pub topics: Vec<String>,
}

/// DISCONNECT.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DisconnectData {
    /// Disconnect reason code.
    pub reason_code: u8,
    /// DISCONNECT properties.
    pub properties: Properties,
}

/// AUTH.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct AuthData {
    /// Authenticate reason code.
    pub reason_code: u8,
    /// AUTH properties.
    pub properties: Properties,
}

/// A decoded or to-be-encoded MQTT 5 control packet.
#[derive(Debug, PartialEq, Eq, Clone)]
#[allow(missing_docs)]
pub enum ControlPacket {
    Connect(ConnectData),
    ConnAck(ConnAckData),
    Publish(PublishData),
    PubAck(AckData),
    PubRec(AckData),
    PubRel(AckData),
    PubComp(AckData),
    Subscribe(SubscribeData),
    SubAck(SubAckData),
    Unsubscribe(UnsubscribeData),
    UnsubAck(SubAckData),
    PingReq,
    PingResp,
    Disconnect(DisconnectData),
    Auth(AuthData),
}

impl ControlPacket {
    /// The command of this packet.
    pub fn command(&self) -> Command {
        match self {
            ControlPacket::Connect(_) => Command::Connect,
            ControlPacket::ConnAck(_) => Command::ConnAck,
            ControlPacket::Publish(_) => Command::Publish,
            ControlPacket::PubAck(_) => Command::PubAck,
            ControlPacket::PubRec(_) => Command::PubRec,
            ControlPacket::PubRel(_) => Command::PubRel,
            ControlPacket::PubComp(_) => Command::PubComp,
            ControlPacket::Subscribe(_) => Command::Subscribe,
            ControlPacket::SubAck(_) => Command::SubAck,
            ControlPacket::Unsubscribe(_) => Command::Unsubscribe,
            ControlPacket::UnsubAck(_) => Command::UnsubAck,
            ControlPacket::PingReq => Command::PingReq,
            ControlPacket::PingResp => Command::PingResp,
            ControlPacket::Disconnect(_) => Command::Disconnect,
            ControlPacket::Auth(_) => Command::Auth,
        }
    }

    /// The fixed header byte this packet is sent with.
    pub fn header(&self) -> u8 {
        match self {
            ControlPacket::Publish(publish) => ((Command::Publish as u8) << 4) | publish.flags(),
            other => other.command().header(),
        }
    }

    /// The packet identifier, if this packet carries one.
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            ControlPacket::Publish(p) => p.packet_id,
            ControlPacket::PubAck(a)
            | ControlPacket::PubRec(a)
            | ControlPacket::PubRel(a)
            | ControlPacket::PubComp(a) => Some(a.packet_id),
            ControlPacket::Subscribe(s) => Some(s.packet_id),
            ControlPacket::SubAck(s) | ControlPacket::UnsubAck(s) => Some(s.packet_id),
            ControlPacket::Unsubscribe(u) => Some(u.packet_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_nibbles() {
        assert_eq!(Command::from_header(0x30).unwrap(), Command::Publish);
        assert_eq!(Command::from_header(0x3D).unwrap(), Command::Publish);
        assert_eq!(Command::from_header(0xF0).unwrap(), Command::Auth);
        assert_eq!(
            Command::from_header(0x00),
            Err(CodecError::UnknownCommand { header: 0x00 })
        );
    }

    #[test]
    fn fixed_flags_per_command() {
        assert_eq!(Command::PubRel.header(), 0x62);
        assert_eq!(Command::Subscribe.header(), 0x82);
        assert_eq!(Command::Unsubscribe.header(), 0xA2);
        assert_eq!(Command::PubAck.header(), 0x40);
        assert_eq!(Command::PingReq.header(), 0xC0);
        assert_eq!(Command::Publish.required_flags(), None);
    }

    #[test]
    fn publish_flags_layout() {
        let publish = PublishData {
            qos: QoS::ExactlyOnce,
            dup: true,
            retain: true,
            ..PublishData::default()
        };
        assert_eq!(publish.flags(), 0b1101);
        assert_eq!(ControlPacket::Publish(publish).header(), 0x3D);
    }

    #[test]
    fn subscription_options_byte() {
        let entry = SubscribeEntry {
            topic_filter: String::from("a/#"),
            retain_handling: RetainHandling::DoNotSend,
            retain_as_published: true,
            no_local: true,
            qos: QoS::AtLeastOnce,
        };
        assert_eq!(entry.options(), 0b0010_1101);

        let mut parsed = SubscribeEntry::default();
        parsed.set_options(entry.options()).unwrap();
        assert_eq!(parsed.qos, QoS::AtLeastOnce);
        assert!(parsed.no_local && parsed.retain_as_published);
        assert_eq!(parsed.retain_handling, RetainHandling::DoNotSend);

        assert!(parsed.set_options(0x40).is_err());
        assert!(parsed.set_options(0x03).is_err());
        assert!(parsed.set_options(0x30).is_err());
    }

    #[test]
    fn failure_reason_codes() {
        assert!(!reason_code::is_failure(reason_code::SUCCESS));
        assert!(!reason_code::is_failure(0x7F));
        assert!(reason_code::is_failure(0x80));
        assert!(reason_code::is_failure(reason_code::PACKET_IDENTIFIER_NOT_FOUND));
    }
}
