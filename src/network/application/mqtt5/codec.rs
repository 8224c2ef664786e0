//! Stateless encode and decode of MQTT 5 control packets.
//!
//! Every packet kind has a `size_*` function, a `serialize_*` function that
//! writes exactly that many bytes into a [`WriteCursor`], and a
//! `deserialize_*` function reading the body back from a [`ReadCursor`].
//! [`encode`] sizes the whole frame first, allocates it once, serializes it
//! and checks the byte count. [`decode`] validates the fixed header flags,
//! dispatches to the right deserializer and rejects trailing bytes.
//!
//! # Frame layout
//!
//! ```text
//! +--------+----------------------+-----------------------------+
//! | header | remaining length VBI | variable header + payload   |
//! +--------+----------------------+-----------------------------+
//! ```

use alloc::string::String;
use alloc::vec::Vec;

use bytes::BytesMut;

use super::cursor::{
    IdSlot, ReadCursor, WriteCursor, size_binary, size_properties, size_string, size_var_int,
};
use super::error::CodecError;
use super::packet::{
    AckData, AuthData, Command, ConnAckData, ConnectData, ControlPacket, DisconnectData,
    PublishData, QoS, SubAckData, SubscribeData, SubscribeEntry, UnsubscribeData, WillMessage,
    reason_code,
};
use super::property::Properties;

/// Protocol name carried in CONNECT.
pub const PROTOCOL_NAME: &str = "MQTT";
/// Protocol level of MQTT 5.0.
pub const PROTOCOL_VERSION: u8 = 5;

mod connect_flags {
    pub const USERNAME: u8 = 0x80;
    pub const PASSWORD: u8 = 0x40;
    pub const WILL_RETAIN: u8 = 0x20;
    pub const WILL_QOS_SHIFT: u8 = 3;
    pub const WILL_QOS_MASK: u8 = 0x18;
    pub const WILL: u8 = 0x04;
    pub const CLEAN_START: u8 = 0x02;
    pub const RESERVED: u8 = 0x01;
}

/// A fully serialized control packet.
#[derive(Debug, Clone)]
pub struct Encoded {
    /// Command of the encoded packet.
    pub command: Command,
    /// Fixed header, remaining length and body.
    pub frame: BytesMut,
    /// Where the packet identifier sits, for PUBLISH (QoS > 0), SUBSCRIBE
    /// and UNSUBSCRIBE.
    pub id_slot: Option<IdSlot>,
}

/// Serialize `packet` into a freshly allocated frame of exactly the right size.
pub fn encode(packet: &ControlPacket) -> Result<Encoded, CodecError> {
    let body = size_body(packet)?;
    let body_len = u32::try_from(body).map_err(|_| CodecError::ValueOutOfRange)?;
    let total = 1 + size_var_int(body_len)? + body;

    let mut frame = BytesMut::zeroed(total);
    let mut writer = WriteCursor::new(&mut frame[..]);
    writer.write_u8(packet.header())?;
    writer.write_var_int(body_len)?;
    serialize_body(packet, &mut writer)?;

    let written = writer.position();
    let id_slot = writer.id_slot();
    if written != total {
        return Err(CodecError::SizeMismatch {
            expected: total,
            actual: written,
        });
    }

    Ok(Encoded {
        command: packet.command(),
        frame,
        id_slot,
    })
}

/// Decode one packet body.
///
/// `header` is the fixed header byte and `body` exactly the remaining-length
/// bytes that followed it. PUBLISH payloads are split off `body` without
/// copying.
pub fn decode(header: u8, body: BytesMut) -> Result<ControlPacket, CodecError> {
    let command = Command::from_header(header)?;
    if let Some(flags) = command.required_flags() {
        if header & 0x0F != flags {
            return Err(CodecError::InvalidHeaderFlags { header });
        }
    }

    if command == Command::Publish {
        return deserialize_publish(header, body).map(ControlPacket::Publish);
    }

    let mut reader = ReadCursor::new(&body);
    let packet = match command {
        Command::Connect => ControlPacket::Connect(deserialize_connect(&mut reader)?),
        Command::ConnAck => ControlPacket::ConnAck(deserialize_conn_ack(&mut reader)?),
        Command::PubAck => ControlPacket::PubAck(deserialize_ack(&mut reader)?),
        Command::PubRec => ControlPacket::PubRec(deserialize_ack(&mut reader)?),
        Command::PubRel => ControlPacket::PubRel(deserialize_ack(&mut reader)?),
        Command::PubComp => ControlPacket::PubComp(deserialize_ack(&mut reader)?),
        Command::Subscribe => ControlPacket::Subscribe(deserialize_subscribe(&mut reader)?),
        Command::SubAck => ControlPacket::SubAck(deserialize_sub_ack(&mut reader)?),
        Command::Unsubscribe => {
            ControlPacket::Unsubscribe(deserialize_unsubscribe(&mut reader)?)
        }
        Command::UnsubAck => ControlPacket::UnsubAck(deserialize_sub_ack(&mut reader)?),
        Command::PingReq => ControlPacket::PingReq,
        Command::PingResp => ControlPacket::PingResp,
        Command::Disconnect => ControlPacket::Disconnect(deserialize_disconnect(&mut reader)?),
        Command::Auth => ControlPacket::Auth(deserialize_auth(&mut reader)?),
        Command::Publish => return Err(CodecError::UnknownCommand { header }),
    };
    reader.finish()?;
    Ok(packet)
}

/// Size of the packet body, fixed header and remaining length excluded.
pub fn size_body(packet: &ControlPacket) -> Result<usize, CodecError> {
    match packet {
        ControlPacket::Connect(data) => size_connect(data),
        ControlPacket::ConnAck(data) => size_conn_ack(data),
        ControlPacket::Publish(data) => size_publish(data),
        ControlPacket::PubAck(data)
        | ControlPacket::PubRec(data)
        | ControlPacket::PubRel(data)
        | ControlPacket::PubComp(data) => size_ack(data),
        ControlPacket::Subscribe(data) => size_subscribe(data),
        ControlPacket::SubAck(data) | ControlPacket::UnsubAck(data) => size_sub_ack(data),
        ControlPacket::Unsubscribe(data) => size_unsubscribe(data),
        ControlPacket::PingReq | ControlPacket::PingResp => Ok(0),
        ControlPacket::Disconnect(data) => size_reason_only(data.reason_code, &data.properties),
        ControlPacket::Auth(data) => size_reason_only(data.reason_code, &data.properties),
    }
}

fn serialize_body(packet: &ControlPacket, w: &mut WriteCursor<'_>) -> Result<(), CodecError> {
    match packet {
        ControlPacket::Connect(data) => serialize_connect(data, w),
        ControlPacket::ConnAck(data) => serialize_conn_ack(data, w),
        ControlPacket::Publish(data) => serialize_publish(data, w),
        ControlPacket::PubAck(data)
        | ControlPacket::PubRec(data)
        | ControlPacket::PubRel(data)
        | ControlPacket::PubComp(data) => serialize_ack(data, w),
        ControlPacket::Subscribe(data) => serialize_subscribe(data, w),
        ControlPacket::SubAck(data) | ControlPacket::UnsubAck(data) => serialize_sub_ack(data, w),
        ControlPacket::Unsubscribe(data) => serialize_unsubscribe(data, w),
        ControlPacket::PingReq | ControlPacket::PingResp => Ok(()),
        ControlPacket::Disconnect(data) => serialize_disconnect(data, w),
        ControlPacket::Auth(data) => serialize_auth(data, w),
    }
}

// CONNECT

/// Size of a CONNECT body.
pub fn size_connect(data: &ConnectData) -> Result<usize, CodecError> {
    let mut size = size_string(PROTOCOL_NAME)? + 1 + 1 + 2;
    size += size_properties(&data.properties)?;
    size += size_string(&data.client_id)?;
    if let Some(will) = &data.will {
        size += size_properties(&will.properties)?;
        size += size_string(&will.topic)?;
        size += size_binary(&will.payload)?;
    }
    if let Some(username) = &data.username {
        size += size_string(username)?;
    }
    if let Some(password) = &data.password {
        size += size_binary(password)?;
    }
    Ok(size)
}

fn connect_flags(data: &ConnectData) -> u8 {
    let mut flags = 0;
    if data.username.is_some() {
        flags |= connect_flags::USERNAME;
    }
    if data.password.is_some() {
        flags |= connect_flags::PASSWORD;
    }
    if let Some(will) = &data.will {
        flags |= connect_flags::WILL;
        flags |= (will.qos as u8) << connect_flags::WILL_QOS_SHIFT;
        if will.retain {
            flags |= connect_flags::WILL_RETAIN;
        }
    }
    if data.clean_start {
        flags |= connect_flags::CLEAN_START;
    }
    flags
}

/// Write a CONNECT body.
pub fn serialize_connect(data: &ConnectData, w: &mut WriteCursor<'_>) -> Result<(), CodecError> {
    w.write_string(PROTOCOL_NAME)?;
    w.write_u8(PROTOCOL_VERSION)?;
    w.write_u8(connect_flags(data))?;
    w.write_u16(data.keep_alive)?;
    w.write_properties(&data.properties)?;
    w.write_string(&data.client_id)?;
    if let Some(will) = &data.will {
        w.write_properties(&will.properties)?;
        w.write_string(&will.topic)?;
        w.write_binary(&will.payload)?;
    }
    if let Some(username) = &data.username {
        w.write_string(username)?;
    }
    if let Some(password) = &data.password {
        w.write_binary(password)?;
    }
    Ok(())
}

/// Read a CONNECT body.
pub fn deserialize_connect(r: &mut ReadCursor<'_>) -> Result<ConnectData, CodecError> {
    if r.read_string()? != PROTOCOL_NAME {
        return Err(CodecError::InvalidProtocolName);
    }
    let version = r.read_u8()?;
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedProtocolVersion { version });
    }
    let flags = r.read_u8()?;
    if flags & connect_flags::RESERVED != 0 {
        return Err(CodecError::InvalidConnectFlags { flags });
    }
    let will_qos = QoS::try_from((flags & connect_flags::WILL_QOS_MASK) >> connect_flags::WILL_QOS_SHIFT)
        .map_err(|_| CodecError::InvalidConnectFlags { flags })?;
    let has_will = flags & connect_flags::WILL != 0;
    if !has_will && (will_qos != QoS::AtMostOnce || flags & connect_flags::WILL_RETAIN != 0) {
        return Err(CodecError::InvalidConnectFlags { flags });
    }

    let keep_alive = r.read_u16()?;
    let properties = r.read_properties()?;
    let client_id = r.read_string()?;

    let will = if has_will {
        let properties = r.read_properties()?;
        let topic = r.read_string()?;
        let payload = Vec::from(r.read_binary()?);
        Some(WillMessage {
            properties,
            topic,
            payload,
            retain: flags & connect_flags::WILL_RETAIN != 0,
            qos: will_qos,
        })
    } else {
        None
    };
    let username = if flags & connect_flags::USERNAME != 0 {
        Some(r.read_string()?)
    } else {
        None
    };
    let password = if flags & connect_flags::PASSWORD != 0 {
        Some(Vec::from(r.read_binary()?))
    } else {
        None
    };

    Ok(ConnectData {
        keep_alive,
        properties,
        client_id,
        will,
        username,
        password,
        clean_start: flags & connect_flags::CLEAN_START != 0,
    })
}

// CONNACK

/// Size of a CONNACK body.
pub fn size_conn_ack(data: &ConnAckData) -> Result<usize, CodecError> {
    Ok(2 + size_properties(&data.properties)?)
}

/// Write a CONNACK body.
pub fn serialize_conn_ack(data: &ConnAckData, w: &mut WriteCursor<'_>) -> Result<(), CodecError> {
    w.write_u8(u8::from(data.session_present))?;
    w.write_u8(data.reason_code)?;
    w.write_properties(&data.properties)
}

/// Read a CONNACK body.
pub fn deserialize_conn_ack(r: &mut ReadCursor<'_>) -> Result<ConnAckData, CodecError> {
    let ack_flags = r.read_u8()?;
    if ack_flags & 0xFE != 0 {
        return Err(CodecError::InvalidConnectFlags { flags: ack_flags });
    }
    let reason_code = r.read_u8()?;
    let properties = r.read_properties()?;
    Ok(ConnAckData {
        session_present: ack_flags & 0x01 != 0,
        reason_code,
        properties,
    })
}

// PUBLISH

/// Size of a PUBLISH body, payload included.
pub fn size_publish(data: &PublishData) -> Result<usize, CodecError> {
    let mut size = size_string(&data.topic)?;
    if publish_packet_id(data)?.is_some() {
        size += 2;
    }
    size += size_properties(&data.properties)?;
    Ok(size + data.payload.len())
}

/// Write a PUBLISH body.
///
/// For QoS 1 and 2 the packet identifier is recorded as the cursor's
/// [`IdSlot`], so a sender can pass 0 and patch the real one in later.
pub fn serialize_publish(data: &PublishData, w: &mut WriteCursor<'_>) -> Result<(), CodecError> {
    w.write_string(&data.topic)?;
    if let Some(id) = publish_packet_id(data)? {
        w.write_packet_id(id)?;
    }
    w.write_properties(&data.properties)?;
    w.write_bytes(&data.payload)
}

/// QoS 0 carries no identifier, QoS 1 and 2 must carry one.
fn publish_packet_id(data: &PublishData) -> Result<Option<u16>, CodecError> {
    match (data.qos, data.packet_id) {
        (QoS::AtMostOnce, None) => Ok(None),
        (QoS::AtLeastOnce | QoS::ExactlyOnce, Some(id)) => Ok(Some(id)),
        _ => Err(CodecError::InvalidPacketId),
    }
}

/// Read a PUBLISH body, taking ownership of `body` so the payload can be
/// handed out without a copy.
pub fn deserialize_publish(header: u8, mut body: BytesMut) -> Result<PublishData, CodecError> {
    let qos = QoS::try_from((header >> 1) & 0x03)?;
    let dup = header & 0x08 != 0;
    if qos == QoS::AtMostOnce && dup {
        return Err(CodecError::InvalidHeaderFlags { header });
    }

    let mut r = ReadCursor::new(&body);
    let topic = r.read_string()?;
    let packet_id = if qos != QoS::AtMostOnce {
        Some(r.read_u16()?)
    } else {
        None
    };
    let properties = r.read_properties()?;
    let payload_offset = r.position();

    let payload = body.split_off(payload_offset).freeze();
    Ok(PublishData {
        qos,
        dup,
        retain: header & 0x01 != 0,
        topic,
        packet_id,
        properties,
        payload,
    })
}

// PUBACK, PUBREC, PUBREL, PUBCOMP

/// Size of an ack body. Reason code and properties are left out when they
/// carry nothing.
pub fn size_ack(data: &AckData) -> Result<usize, CodecError> {
    if data.properties.is_empty() {
        if data.reason_code == reason_code::SUCCESS {
            Ok(2)
        } else {
            Ok(3)
        }
    } else {
        Ok(3 + size_properties(&data.properties)?)
    }
}

/// Write an ack body.
pub fn serialize_ack(data: &AckData, w: &mut WriteCursor<'_>) -> Result<(), CodecError> {
    w.write_u16(data.packet_id)?;
    if data.properties.is_empty() {
        if data.reason_code != reason_code::SUCCESS {
            w.write_u8(data.reason_code)?;
        }
        return Ok(());
    }
    w.write_u8(data.reason_code)?;
    w.write_properties(&data.properties)
}

/// Read an ack body.
pub fn deserialize_ack(r: &mut ReadCursor<'_>) -> Result<AckData, CodecError> {
    let packet_id = r.read_u16()?;
    let reason_code = if r.is_empty() { reason_code::SUCCESS } else { r.read_u8()? };
    let properties = if r.is_empty() {
        Properties::new()
    } else {
        r.read_properties()?
    };
    Ok(AckData {
        packet_id,
        reason_code,
        properties,
    })
}

// SUBSCRIBE

/// Size of a SUBSCRIBE body.
pub fn size_subscribe(data: &SubscribeData) -> Result<usize, CodecError> {
    if data.entries.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    let mut size = 2 + size_properties(&data.properties)?;
    for entry in &data.entries {
        size += size_string(&entry.topic_filter)? + 1;
    }
    Ok(size)
}

/// Write a SUBSCRIBE body.
pub fn serialize_subscribe(data: &SubscribeData, w: &mut WriteCursor<'_>) -> Result<(), CodecError> {
    w.write_packet_id(data.packet_id)?;
    w.write_properties(&data.properties)?;
    for entry in &data.entries {
        w.write_string(&entry.topic_filter)?;
        w.write_u8(entry.options())?;
    }
    Ok(())
}

/// Read a SUBSCRIBE body.
pub fn deserialize_subscribe(r: &mut ReadCursor<'_>) -> Result<SubscribeData, CodecError> {
    let packet_id = r.read_u16()?;
    let properties = r.read_properties()?;
    let mut entries = Vec::new();
    while !r.is_empty() {
        let mut entry = SubscribeEntry {
            topic_filter: r.read_string()?,
            ..SubscribeEntry::default()
        };
        entry.set_options(r.read_u8()?)?;
        entries.push(entry);
    }
    if entries.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    Ok(SubscribeData {
        packet_id,
        properties,
        entries,
    })
}

// SUBACK, UNSUBACK

/// Size of a SUBACK or UNSUBACK body.
pub fn size_sub_ack(data: &SubAckData) -> Result<usize, CodecError> {
    if data.reason_codes.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    Ok(2 + size_properties(&data.properties)? + data.reason_codes.len())
}

/// Write a SUBACK or UNSUBACK body.
pub fn serialize_sub_ack(data: &SubAckData, w: &mut WriteCursor<'_>) -> Result<(), CodecError> {
    w.write_u16(data.packet_id)?;
    w.write_properties(&data.properties)?;
    w.write_bytes(&data.reason_codes)
}

/// Read a SUBACK or UNSUBACK body.
pub fn deserialize_sub_ack(r: &mut ReadCursor<'_>) -> Result<SubAckData, CodecError> {
    let packet_id = r.read_u16()?;
    let properties = r.read_properties()?;
    let reason_codes = Vec::from(r.read_bytes(r.remaining())?);
    if reason_codes.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    Ok(SubAckData {
        packet_id,
        properties,
        reason_codes,
    })
}

// UNSUBSCRIBE

/// Size of an UNSUBSCRIBE body.
pub fn size_unsubscribe(data: &UnsubscribeData) -> Result<usize, CodecError> {
    if data.topics.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    let mut size = 2 + size_properties(&data.properties)?;
    for topic in &data.topics {
        size += size_string(topic)?;
    }
    Ok(size)
}

/// Write an UNSUBSCRIBE body.
pub fn serialize_unsubscribe(
    data: &UnsubscribeData,
    w: &mut WriteCursor<'_>,
) -> Result<(), CodecError> {
    w.write_packet_id(data.packet_id)?;
    w.write_properties(&data.properties)?;
    for topic in &data.topics {
        w.write_string(topic)?;
    }
    Ok(())
}

/// Read an UNSUBSCRIBE body.
pub fn deserialize_unsubscribe(r: &mut ReadCursor<'_>) -> Result<UnsubscribeData, CodecError> {
    let packet_id = r.read_u16()?;
    let properties = r.read_properties()?;
    let mut topics: Vec<String> = Vec::new();
    while !r.is_empty() {
        topics.push(r.read_string()?);
    }
    if topics.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    Ok(UnsubscribeData {
        packet_id,
        properties,
        topics,
    })
}

// DISCONNECT, AUTH

fn size_reason_only(reason: u8, properties: &Properties) -> Result<usize, CodecError> {
    if properties.is_empty() {
        if reason == reason_code::SUCCESS {
            Ok(0)
        } else {
            Ok(1)
        }
    } else {
        Ok(1 + size_properties(properties)?)
    }
}

fn serialize_reason_only(
    reason: u8,
    properties: &Properties,
    w: &mut WriteCursor<'_>,
) -> Result<(), CodecError> {
    if properties.is_empty() {
        if reason != reason_code::SUCCESS {
            w.write_u8(reason)?;
        }
        return Ok(());
    }
    w.write_u8(reason)?;
    w.write_properties(properties)
}

fn deserialize_reason_only(r: &mut ReadCursor<'_>) -> Result<(u8, Properties), CodecError> {
    let reason = if r.is_empty() { reason_code::SUCCESS } else { r.read_u8()? };
    let properties = if r.is_empty() {
        Properties::new()
    } else {
        r.read_properties()?
    };
    Ok((reason, properties))
}

/// Size of a DISCONNECT body.
pub fn size_disconnect(data: &DisconnectData) -> Result<usize, CodecError> {
    size_reason_only(data.reason_code, &data.properties)
}

/// Write a DISCONNECT body.
pub fn serialize_disconnect(
    data: &DisconnectData,
    w: &mut WriteCursor<'_>,
) -> Result<(), CodecError> {
    serialize_reason_only(data.reason_code, &data.properties, w)
}

/// Read a DISCONNECT body.
pub fn deserialize_disconnect(r: &mut ReadCursor<'_>) -> Result<DisconnectData, CodecError> {
    let (reason_code, properties) = deserialize_reason_only(r)?;
    Ok(DisconnectData {
        reason_code,
        properties,
    })
}

/// Size of an AUTH body.
pub fn size_auth(data: &AuthData) -> Result<usize, CodecError> {
    size_reason_only(data.reason_code, &data.properties)
}

/// Write an AUTH body.
pub fn serialize_auth(data: &AuthData, w: &mut WriteCursor<'_>) -> Result<(), CodecError> {
    serialize_reason_only(data.reason_code, &data.properties, w)
}

/// Read an AUTH body.
pub fn deserialize_auth(r: &mut ReadCursor<'_>) -> Result<AuthData, CodecError> {
    let (reason_code, properties) = deserialize_reason_only(r)?;
    Ok(AuthData {
        reason_code,
        properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::application::mqtt5::property::PropertyId;
    use alloc::vec;
    use bytes::Bytes;

    fn split_frame(frame: &[u8]) -> (u8, BytesMut) {
        let mut r = ReadCursor::new(&frame[1..]);
        let len = r.read_var_int().unwrap() as usize;
        let offset = 1 + r.position();
        assert_eq!(frame.len() - offset, len, "remaining length mismatch");
        (frame[0], BytesMut::from(&frame[offset..]))
    }

    fn round_trip(packet: ControlPacket) {
        let encoded = encode(&packet).unwrap();
        assert_eq!(encoded.command, packet.command());
        let (header, body) = split_frame(&encoded.frame);
        assert_eq!(decode(header, body).unwrap(), packet);
    }

    #[test]
    fn ping_frames() {
        assert_eq!(&encode(&ControlPacket::PingReq).unwrap().frame[..], &[0xC0, 0x00]);
        assert_eq!(&encode(&ControlPacket::PingResp).unwrap().frame[..], &[0xD0, 0x00]);
        assert_eq!(decode(0xD0, BytesMut::new()).unwrap(), ControlPacket::PingResp);
    }

    #[test]
    fn connect_round_trip_with_will_and_credentials() {
        let mut properties = Properties::new();
        properties.set_integer(PropertyId::SessionExpiryInterval, 120).unwrap();
        properties.set_integer(PropertyId::ReceiveMaximum, 20).unwrap();
        let mut will_properties = Properties::new();
        will_properties.set_integer(PropertyId::WillDelayInterval, 5).unwrap();
        will_properties.set_string(PropertyId::ContentType, "text/plain").unwrap();

        round_trip(ControlPacket::Connect(ConnectData {
            keep_alive: 20,
            properties,
            client_id: String::from("device-7"),
            will: Some(WillMessage {
                properties: will_properties,
                topic: String::from("status/device-7"),
                payload: b"offline".to_vec(),
                retain: true,
                qos: QoS::AtLeastOnce,
            }),
            username: Some(String::from("user")),
            password: Some(vec![0, 1, 2]),
            clean_start: true,
        }));
    }

    #[test]
    fn minimal_connect_bytes() {
        let encoded = encode(&ControlPacket::Connect(ConnectData {
            keep_alive: 20,
            clean_start: true,
            ..ConnectData::default()
        }))
        .unwrap();
        assert_eq!(
            &encoded.frame[..],
            &[
                0x10, 0x0D, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, 0x02, 0x00, 0x14, 0x00,
                0x00, 0x00
            ]
        );
        assert_eq!(encoded.id_slot, None);
    }

    #[test]
    fn connect_rejects_bad_protocol() {
        let body = [0x00, 0x04, b'M', b'Q', b'T', b'X', 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            decode(0x10, BytesMut::from(&body[..])),
            Err(CodecError::InvalidProtocolName)
        );
        let body = [0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            decode(0x10, BytesMut::from(&body[..])),
            Err(CodecError::UnsupportedProtocolVersion { version: 4 })
        );
        let body = [0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            decode(0x10, BytesMut::from(&body[..])),
            Err(CodecError::InvalidConnectFlags { flags: 0x01 })
        );
    }

    #[test]
    fn conn_ack_round_trip() {
        let mut properties = Properties::new();
        properties.set_integer(PropertyId::ReceiveMaximum, 10).unwrap();
        properties.set_string(PropertyId::AssignedClientIdentifier, "auto-1").unwrap();
        properties.set_integer(PropertyId::ServerKeepAlive, 30).unwrap();
        properties.push_user_property("region", "eu");
        round_trip(ControlPacket::ConnAck(ConnAckData {
            session_present: true,
            reason_code: 0,
            properties,
        }));
    }

    #[test]
    fn publish_qos1_records_id_slot() {
        let publish = PublishData {
            qos: QoS::AtLeastOnce,
            packet_id: Some(0),
            topic: String::from("t"),
            payload: Bytes::from_static(&[1, 2, 3]),
            ..PublishData::default()
        };
        let encoded = encode(&ControlPacket::Publish(publish)).unwrap();
        assert_eq!(
            &encoded.frame[..],
            &[0x32, 0x09, 0x00, 0x01, b't', 0x00, 0x00, 0x00, 1, 2, 3]
        );
        let slot = encoded.id_slot.unwrap();
        assert_eq!(slot.offset(), 5);
    }

    #[test]
    fn publish_qos0_has_no_packet_id() {
        let publish = PublishData {
            topic: String::from("t"),
            payload: Bytes::from_static(b"x"),
            ..PublishData::default()
        };
        let encoded = encode(&ControlPacket::Publish(publish.clone())).unwrap();
        assert_eq!(&encoded.frame[..], &[0x30, 0x05, 0x00, 0x01, b't', 0x00, b'x']);
        assert_eq!(encoded.id_slot, None);
        round_trip(ControlPacket::Publish(publish));
    }

    #[test]
    fn publish_packet_id_must_match_qos() {
        let missing = PublishData {
            qos: QoS::ExactlyOnce,
            topic: String::from("t"),
            ..PublishData::default()
        };
        assert_eq!(
            encode(&ControlPacket::Publish(missing)).err(),
            Some(CodecError::InvalidPacketId)
        );

        let stray = PublishData {
            packet_id: Some(4),
            topic: String::from("t"),
            ..PublishData::default()
        };
        assert_eq!(
            encode(&ControlPacket::Publish(stray)).err(),
            Some(CodecError::InvalidPacketId)
        );
    }

    #[test]
    fn publish_round_trip_with_properties_and_empty_payload() {
        let mut properties = Properties::new();
        properties.set_string(PropertyId::ResponseTopic, "reply").unwrap();
        properties.set_binary(PropertyId::CorrelationData, vec![0xAA; 16]).unwrap();
        properties.set_integer(PropertyId::SubscriptionIdentifier, 4).unwrap();
        round_trip(ControlPacket::Publish(PublishData {
            qos: QoS::ExactlyOnce,
            dup: true,
            retain: true,
            topic: String::from("a/b"),
            packet_id: Some(513),
            properties,
            payload: Bytes::new(),
        }));
    }

    #[test]
    fn publish_qos3_and_dup_qos0_are_malformed() {
        let body = BytesMut::from(&[0x00, 0x01, b't', 0x00][..]);
        assert_eq!(decode(0x36, body.clone()), Err(CodecError::InvalidQoS));
        assert_eq!(decode(0x38, body), Err(CodecError::InvalidHeaderFlags { header: 0x38 }));
    }

    #[test]
    fn ack_short_forms() {
        let encoded = encode(&ControlPacket::PubAck(AckData::new(7))).unwrap();
        assert_eq!(&encoded.frame[..], &[0x40, 0x02, 0x00, 0x07]);
        assert_eq!(encoded.id_slot, None);

        let encoded = encode(&ControlPacket::PubRec(AckData::with_reason(7, 0x80))).unwrap();
        assert_eq!(&encoded.frame[..], &[0x50, 0x03, 0x00, 0x07, 0x80]);

        let encoded = encode(&ControlPacket::PubRel(AckData::new(7))).unwrap();
        assert_eq!(&encoded.frame[..], &[0x62, 0x02, 0x00, 0x07]);

        assert_eq!(
            decode(0x70, BytesMut::from(&[0x00, 0x07, 0x92][..])).unwrap(),
            ControlPacket::PubComp(AckData::with_reason(7, 0x92))
        );
    }

    #[test]
    fn ack_with_properties_round_trip() {
        let mut properties = Properties::new();
        properties.set_string(PropertyId::ReasonString, "quota").unwrap();
        round_trip(ControlPacket::PubAck(AckData {
            packet_id: 9,
            reason_code: 0x97,
            properties,
        }));
    }

    #[test]
    fn qos2_acks_round_trip_with_reason_and_properties() {
        let mut properties = Properties::new();
        properties.set_string(PropertyId::ReasonString, "not authorized").unwrap();
        properties.push_user_property("trace", "42");

        round_trip(ControlPacket::PubRec(AckData {
            packet_id: 300,
            reason_code: 0x87,
            properties: properties.clone(),
        }));
        round_trip(ControlPacket::PubRel(AckData {
            packet_id: 300,
            reason_code: 0x92,
            properties: properties.clone(),
        }));
        round_trip(ControlPacket::PubComp(AckData {
            packet_id: 300,
            reason_code: 0x92,
            properties,
        }));
    }

    #[test]
    fn ack_with_success_and_properties_keeps_reason_byte() {
        let mut properties = Properties::new();
        properties.push_user_property("k", "v");
        let packet = ControlPacket::PubRel(AckData {
            packet_id: 1,
            reason_code: reason_code::SUCCESS,
            properties,
        });
        let encoded = encode(&packet).unwrap();
        assert_eq!(&encoded.frame[..5], &[0x62, 0x0B, 0x00, 0x01, 0x00]);
        round_trip(packet);
    }

    #[test]
    fn fixed_flags_are_enforced() {
        assert_eq!(
            decode(0x60, BytesMut::from(&[0x00, 0x01][..])),
            Err(CodecError::InvalidHeaderFlags { header: 0x60 })
        );
        assert_eq!(
            decode(0x41, BytesMut::from(&[0x00, 0x01][..])),
            Err(CodecError::InvalidHeaderFlags { header: 0x41 })
        );
        assert_eq!(
            decode(0x80, BytesMut::from(&[0x00, 0x01, 0x00, 0x00, 0x01, b'a', 0x00][..])),
            Err(CodecError::InvalidHeaderFlags { header: 0x80 })
        );
    }

    #[test]
    fn subscribe_round_trip_and_slot() {
        let mut entry = SubscribeEntry::new("sensors/+/temp", QoS::ExactlyOnce);
        entry.no_local = true;
        let mut properties = Properties::new();
        properties.set_integer(PropertyId::SubscriptionIdentifier, 12).unwrap();
        let packet = ControlPacket::Subscribe(SubscribeData {
            packet_id: 3,
            properties,
            entries: vec![entry, SubscribeEntry::new("cmd/#", QoS::AtMostOnce)],
        });
        let encoded = encode(&packet).unwrap();
        assert_eq!(encoded.frame[0], 0x82);
        assert_eq!(encoded.id_slot.unwrap().offset(), 2);
        round_trip(packet);
    }

    #[test]
    fn empty_subscription_lists_are_rejected() {
        let empty = ControlPacket::Subscribe(SubscribeData::default());
        assert_eq!(encode(&empty).err(), Some(CodecError::EmptyPayload));
        assert_eq!(
            decode(0x90, BytesMut::from(&[0x00, 0x01, 0x00][..])),
            Err(CodecError::EmptyPayload)
        );
        assert_eq!(
            decode(0xA2, BytesMut::from(&[0x00, 0x01, 0x00][..])),
            Err(CodecError::EmptyPayload)
        );
    }

    #[test]
    fn sub_ack_and_unsub_ack_round_trip() {
        round_trip(ControlPacket::SubAck(SubAckData {
            packet_id: 4,
            properties: Properties::new(),
            reason_codes: vec![0x00, 0x02, 0x80],
        }));
        round_trip(ControlPacket::UnsubAck(SubAckData {
            packet_id: 4,
            properties: Properties::new(),
            reason_codes: vec![0x11],
        }));
        round_trip(ControlPacket::Unsubscribe(UnsubscribeData {
            packet_id: 8,
            properties: Properties::new(),
            topics: vec![String::from("a"), String::new()],
        }));
    }

    #[test]
    fn disconnect_and_auth_use_one_byte_reason() {
        assert_eq!(
            &encode(&ControlPacket::Disconnect(DisconnectData::default())).unwrap().frame[..],
            &[0xE0, 0x00]
        );
        assert_eq!(
            decode(0xE0, BytesMut::from(&[0x8D][..])).unwrap(),
            ControlPacket::Disconnect(DisconnectData {
                reason_code: 0x8D,
                properties: Properties::new(),
            })
        );
        let mut properties = Properties::new();
        properties.set_string(PropertyId::AuthenticationMethod, "SCRAM-SHA-1").unwrap();
        properties.set_binary(PropertyId::AuthenticationData, vec![1, 2]).unwrap();
        round_trip(ControlPacket::Auth(AuthData {
            reason_code: 0x18,
            properties,
        }));
    }

    #[test]
    fn disconnect_round_trip_with_properties() {
        let mut properties = Properties::new();
        properties.set_integer(PropertyId::SessionExpiryInterval, 0).unwrap();
        properties.set_string(PropertyId::ReasonString, "shutting down").unwrap();
        properties.set_string(PropertyId::ServerReference, "backup.example").unwrap();
        properties.push_user_property("node", "3");
        round_trip(ControlPacket::Disconnect(DisconnectData {
            reason_code: 0x8B,
            properties,
        }));

        let mut properties = Properties::new();
        properties.set_string(PropertyId::ReasonString, "bye").unwrap();
        round_trip(ControlPacket::Disconnect(DisconnectData {
            reason_code: reason_code::SUCCESS,
            properties,
        }));
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        assert_eq!(decode(0xC0, BytesMut::from(&[0x00][..])), Err(CodecError::TrailingBytes));
    }

    #[test]
    fn truncated_body_is_malformed() {
        assert_eq!(
            decode(0x20, BytesMut::from(&[0x00][..])),
            Err(CodecError::UnexpectedEnd)
        );
    }
}
