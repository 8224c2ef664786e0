//! Packet dispatcher: glue between the frame reader, the codec, the flow
//! controller and the connection.
//!
//! The frame reader and the flow controller are locked only for bookkeeping.
//! Every write to the connection happens under a separate send gate, held
//! together with the flow update that produced the frames, so packets reach
//! the wire in the order the flow controller decided on. Reads and decoding
//! never take the gate.

use alloc::vec::Vec;

use bytes::Bytes;
use log::{error, trace, warn};

use super::codec;
use super::cursor::VAR_INT_MAX;
use super::error::Error;
use super::flow::{Abandoned, AckOutcome, FlowController, IdStatus, Outbound, SendOutcome};
use super::frame::{Frame, FrameReader};
use super::lock::Shared;
use super::packet::{
    AckData, AuthData, Command, ConnAckData, ConnectData, ControlPacket, DisconnectData,
    PublishData, QoS, SubAckData, SubscribeData, UnsubscribeData, reason_code,
};
use super::property::PropertyId;
use crate::network::{self, Read, Write};

/// Size of the stack buffer used for each read from the connection.
const READ_CHUNK: usize = 256;

/// A decoded packet the caller has to act on.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Inbound {
    /// CONNACK, successful or not.
    ConnAck(ConnAckData),
    /// PUBLISH to hand to the application.
    Publish(PublishData),
    /// SUBACK for a request this side sent.
    SubAck(SubAckData),
    /// UNSUBACK for a request this side sent.
    UnsubAck(SubAckData),
    /// PINGRESP.
    PingResp,
    /// DISCONNECT sent by the server.
    Disconnect(DisconnectData),
    /// AUTH sent by the server.
    Auth(AuthData),
}

/// The protocol state of one logical connection.
pub struct Protocol {
    reader: Shared<FrameReader>,
    flow: Shared<FlowController>,
    send_gate: Shared<()>,
}

impl core::fmt::Debug for Protocol {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Protocol")
            .field("ready", &self.is_ready())
            .field("in_flight", &self.in_flight_ids())
            .field("pending", &self.pending_len())
            .finish()
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol {
    /// Idle protocol state.
    pub fn new() -> Self {
        Self {
            reader: Shared::new(FrameReader::default()),
            flow: Shared::new(FlowController::new()),
            send_gate: Shared::new(()),
        }
    }

    fn with_flow<R>(&self, f: impl FnOnce(&mut FlowController) -> R) -> R {
        self.flow.with(f)
    }

    fn with_reader<R>(&self, f: impl FnOnce(&mut FrameReader) -> R) -> R {
        self.reader.with(f)
    }

    /// Hold the send gate around `f`. `f` may take the reader and flow
    /// locks but must not reach the gate again.
    fn gated<R>(&self, f: impl FnOnce() -> R) -> R {
        self.send_gate.with(|_| f())
    }

    /// `true` once a successful CONNACK has been processed.
    pub fn is_ready(&self) -> bool {
        self.with_flow(|flow| flow.is_ready())
    }

    /// `true` between CONNECT and CONNACK.
    pub fn is_connecting(&self) -> bool {
        self.with_flow(|flow| flow.is_connecting())
    }

    /// Identifiers awaiting acknowledgement, in send order.
    pub fn in_flight_ids(&self) -> Vec<u16> {
        self.with_flow(|flow| flow.in_flight_ids())
    }

    /// Number of sends waiting for an identifier or for CONNACK.
    pub fn pending_len(&self) -> usize {
        self.with_flow(|flow| flow.pending_len())
    }

    /// Acknowledgement status of `packet_id`.
    pub fn id_status(&self, packet_id: u16) -> IdStatus {
        self.with_flow(|flow| flow.id_status(packet_id))
    }

    /// Receive-maximum negotiated in the last CONNACK.
    pub fn send_quota(&self) -> u16 {
        self.with_flow(|flow| flow.send_quota())
    }

    /// Read up to `available` bytes from `conn`, dispatching every packet
    /// they complete.
    ///
    /// Acknowledgements are written back before the call returns. Returns the
    /// number of bytes read. A malformed packet aborts the call with
    /// [`Error::Codec`]; the byte stream cannot be trusted afterwards.
    pub fn receive<C, F>(&self, conn: &mut C, available: usize, mut deliver: F) -> Result<usize, Error>
    where
        C: Read + Write + ?Sized,
        F: FnMut(Inbound),
    {
        let mut buf = [0u8; READ_CHUNK];
        let mut left = available;
        let mut total = 0;

        while left > 0 {
            let want = left.min(buf.len());
            let n = conn
                .read(&mut buf[..want])
                .map_err(|_| network::error::Error::ReadError)?
                .min(want);
            if n == 0 {
                break;
            }
            left -= n;
            total += n;

            let mut chunk = &buf[..n];
            while !chunk.is_empty() {
                let (used, frame) = self.with_reader(|reader| reader.feed(chunk))?;
                chunk = &chunk[used..];
                if let Some(frame) = frame {
                    self.dispatch(conn, frame, &mut deliver)?;
                }
            }
        }
        Ok(total)
    }

    fn dispatch<C, F>(&self, conn: &mut C, frame: Frame, deliver: &mut F) -> Result<(), Error>
    where
        C: Write + ?Sized,
        F: FnMut(Inbound),
    {
        let packet = codec::decode(frame.header, frame.body).inspect_err(|e| {
            error!("malformed packet with header 0x{:02x}: {}", frame.header, e);
        })?;
        let command = packet.command();
        trace!("received {:?}", command);

        match packet {
            ControlPacket::ConnAck(data) => {
                let success = !reason_code::is_failure(data.reason_code);
                let receive_maximum = data
                    .properties
                    .integer(PropertyId::ReceiveMaximum)
                    .and_then(|v| u16::try_from(v).ok())
                    .unwrap_or(u16::MAX);
                let maximum_packet_size = data
                    .properties
                    .integer(PropertyId::MaximumPacketSize)
                    .unwrap_or(VAR_INT_MAX);
                // Resent and drained frames reach the wire ahead of any send
                // that sees the link ready.
                self.gated(|| -> Result<(), Error> {
                    let mut outbox = Vec::new();
                    self.with_flow(|flow| {
                        flow.on_conn_ack(success, receive_maximum, maximum_packet_size, &mut outbox)
                    })?;
                    flush(conn, &outbox)
                })?;
                deliver(Inbound::ConnAck(data));
            }
            ControlPacket::Publish(data) => match (data.qos, data.packet_id) {
                (QoS::AtMostOnce, _) => deliver(Inbound::Publish(data)),
                (QoS::AtLeastOnce, Some(id)) => {
                    deliver(Inbound::Publish(data));
                    self.send_untracked(conn, &ControlPacket::PubAck(AckData::new(id)))?;
                }
                (QoS::ExactlyOnce, Some(id)) => {
                    let dup = data.dup;
                    if self.with_flow(|flow| flow.receive_exactly_once(id, dup)) {
                        deliver(Inbound::Publish(data));
                    }
                    self.send_untracked(conn, &ControlPacket::PubRec(AckData::new(id)))?;
                }
                _ => warn!("dropping PUBLISH without packet identifier"),
            },
            ControlPacket::PubAck(ack) | ControlPacket::PubRec(ack) | ControlPacket::PubComp(ack) => {
                self.gated(|| -> Result<(), Error> {
                    let mut outbox = Vec::new();
                    self.with_flow(|flow| {
                        flow.handle_ack(command, ack.packet_id, ack.reason_code, &mut outbox)
                    })?;
                    flush(conn, &outbox)
                })?;
            }
            ControlPacket::PubRel(ack) => {
                let known = self.with_flow(|flow| flow.release_exactly_once(ack.packet_id));
                let reason = if known {
                    reason_code::SUCCESS
                } else {
                    warn!("PUBREL for unknown packet id {}", ack.packet_id);
                    reason_code::PACKET_IDENTIFIER_NOT_FOUND
                };
                self.send_untracked(
                    conn,
                    &ControlPacket::PubComp(AckData::with_reason(ack.packet_id, reason)),
                )?;
            }
            ControlPacket::SubAck(data) => {
                if self.ack_request(conn, Command::SubAck, data.packet_id)? {
                    deliver(Inbound::SubAck(data));
                }
            }
            ControlPacket::UnsubAck(data) => {
                if self.ack_request(conn, Command::UnsubAck, data.packet_id)? {
                    deliver(Inbound::UnsubAck(data));
                }
            }
            ControlPacket::PingResp => deliver(Inbound::PingResp),
            ControlPacket::Disconnect(data) => {
                self.connection_lost();
                deliver(Inbound::Disconnect(data));
            }
            ControlPacket::Auth(data) => deliver(Inbound::Auth(data)),
            ControlPacket::Connect(_)
            | ControlPacket::Subscribe(_)
            | ControlPacket::Unsubscribe(_)
            | ControlPacket::PingReq => {
                warn!("ignoring client-only {:?} from server", command);
            }
        }
        Ok(())
    }

    /// Release the identifier of a SUBSCRIBE or UNSUBSCRIBE and send what
    /// the freed slot let through. `false` for an unknown identifier.
    fn ack_request<C>(&self, conn: &mut C, command: Command, packet_id: u16) -> Result<bool, Error>
    where
        C: Write + ?Sized,
    {
        self.gated(|| -> Result<bool, Error> {
            let mut outbox = Vec::new();
            let outcome =
                self.with_flow(|flow| flow.handle_ack(command, packet_id, 0, &mut outbox))?;
            flush(conn, &outbox)?;
            Ok(outcome != AckOutcome::Ignored)
        })
    }

    /// Send CONNECT and hold every QoS > 0 send until CONNACK.
    ///
    /// `maximum_packet_size` bounds the packets accepted from the server.
    pub fn send_connect<C>(
        &self,
        conn: &mut C,
        data: ConnectData,
        maximum_packet_size: u32,
    ) -> Result<(), Error>
    where
        C: Write + ?Sized,
    {
        let encoded = codec::encode(&ControlPacket::Connect(data))?;
        self.gated(|| {
            self.with_reader(|reader| {
                reader.clear_state();
                reader.set_maximum_packet_size(maximum_packet_size);
            });
            self.with_flow(|flow| flow.connect_sent());
            network::write_all(conn, &encoded.frame)
        })?;
        Ok(())
    }

    /// Send a PUBLISH through the flow controller.
    pub fn send_publish<C>(&self, conn: &mut C, data: PublishData) -> Result<SendOutcome, Error>
    where
        C: Write + ?Sized,
    {
        let qos = data.qos;
        self.send_tracked(conn, &ControlPacket::Publish(data), qos)
    }

    /// Send a SUBSCRIBE through the flow controller.
    pub fn send_subscribe<C>(&self, conn: &mut C, data: SubscribeData) -> Result<SendOutcome, Error>
    where
        C: Write + ?Sized,
    {
        self.send_tracked(conn, &ControlPacket::Subscribe(data), QoS::AtLeastOnce)
    }

    /// Send an UNSUBSCRIBE through the flow controller.
    pub fn send_unsubscribe<C>(
        &self,
        conn: &mut C,
        data: UnsubscribeData,
    ) -> Result<SendOutcome, Error>
    where
        C: Write + ?Sized,
    {
        self.send_tracked(conn, &ControlPacket::Unsubscribe(data), QoS::AtLeastOnce)
    }

    fn send_tracked<C>(
        &self,
        conn: &mut C,
        packet: &ControlPacket,
        qos: QoS,
    ) -> Result<SendOutcome, Error>
    where
        C: Write + ?Sized,
    {
        let encoded = codec::encode(packet)?;
        let size = encoded.frame.len();
        self.gated(|| -> Result<SendOutcome, Error> {
            let mut outbox = Vec::new();
            let outcome = self.with_flow(|flow| {
                let maximum = flow.maximum_packet_size();
                if size > maximum as usize {
                    return Err(Error::PacketTooLarge { size, maximum });
                }
                Ok(flow.prepare_for_send(Outbound::new(encoded, qos), &mut outbox)?)
            })?;
            flush(conn, &outbox)?;
            Ok(outcome)
        })
    }

    /// Send a packet the flow controller does not track.
    fn send_untracked<C>(&self, conn: &mut C, packet: &ControlPacket) -> Result<(), Error>
    where
        C: Write + ?Sized,
    {
        let encoded = codec::encode(packet)?;
        self.gated(|| network::write_all(conn, &encoded.frame))?;
        Ok(())
    }

    /// Send DISCONNECT.
    pub fn send_disconnect<C>(&self, conn: &mut C, data: DisconnectData) -> Result<(), Error>
    where
        C: Write + ?Sized,
    {
        self.send_untracked(conn, &ControlPacket::Disconnect(data))
    }

    /// Send AUTH.
    pub fn send_auth<C>(&self, conn: &mut C, data: AuthData) -> Result<(), Error>
    where
        C: Write + ?Sized,
    {
        self.send_untracked(conn, &ControlPacket::Auth(data))
    }

    /// Send PINGREQ.
    pub fn send_ping<C>(&self, conn: &mut C) -> Result<(), Error>
    where
        C: Write + ?Sized,
    {
        self.send_untracked(conn, &ControlPacket::PingReq)
    }

    /// The link dropped; keep delivery state for a resumed session.
    pub fn connection_lost(&self) {
        self.with_reader(|reader| reader.clear_state());
        self.with_flow(|flow| flow.link_down());
    }

    /// Forget the session, returning every unacknowledged QoS > 0 send.
    pub fn reset(&self) -> Vec<Abandoned> {
        self.with_reader(|reader| reader.clear_state());
        self.with_flow(|flow| flow.reset())
    }
}

fn flush<C: Write + ?Sized>(conn: &mut C, outbox: &[Bytes]) -> Result<(), Error> {
    for frame in outbox {
        network::write_all(conn, frame)?;
    }
    Ok(())
}
