//! Packet identifier bookkeeping and QoS flow control.
//!
//! [`FlowController`] owns every piece of per-connection delivery state:
//!
//! - the [`PacketIdTable`], a dense table of identifier statuses with a
//!   free-list,
//! - the in-flight list of sent packets awaiting acknowledgement, in send
//!   order,
//! - the pending queue of packets waiting for an identifier or for the
//!   CONNECT handshake to finish,
//! - the exactly-once receive set used to suppress duplicate QoS 2 delivery.
//!
//! It does no I/O. Packets that must go on the wire are pushed to an outbox
//! the caller drains after releasing its lock.

use alloc::collections::{BTreeSet, VecDeque};
use alloc::vec::Vec;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};

use super::codec::{self, Encoded};
use super::cursor::IdSlot;
use super::error::CodecError;
use super::packet::{AckData, Command, ControlPacket, QoS, reason_code};

/// Acknowledgement state of one packet identifier.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdStatus {
    /// Free.
    #[default]
    None,
    /// QoS 1 PUBLISH sent.
    WaitPubAck,
    /// QoS 2 PUBLISH sent.
    WaitPubRec,
    /// PUBREL sent.
    WaitPubComp,
    /// SUBSCRIBE sent.
    WaitSubAck,
    /// UNSUBSCRIBE sent.
    WaitUnsubAck,
}

/// Dense packet identifier table.
///
/// Index 0 is reserved. Freed identifiers go on a free-list and the most
/// recently freed one is handed out first; freeing the highest identifier
/// shrinks the table instead.
#[derive(Debug, Clone)]
pub struct PacketIdTable {
    entries: Vec<IdStatus>,
    free: Vec<u16>,
    in_use: usize,
}

impl Default for PacketIdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketIdTable {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            entries: alloc::vec![IdStatus::None],
            free: Vec::new(),
            in_use: 0,
        }
    }

    /// Allocate an identifier in `status`, keeping at most `limit` live.
    pub fn allocate(&mut self, status: IdStatus, limit: u16) -> Option<u16> {
        if status == IdStatus::None || self.in_use >= usize::from(limit) {
            return None;
        }
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = u16::try_from(self.entries.len()).ok()?;
                self.entries.push(IdStatus::None);
                id
            }
        };
        self.entries[usize::from(id)] = status;
        self.in_use += 1;
        Some(id)
    }

    /// Status of `id`; anything outside the table is free.
    pub fn status(&self, id: u16) -> IdStatus {
        if id == 0 {
            return IdStatus::None;
        }
        self.entries.get(usize::from(id)).copied().unwrap_or_default()
    }

    /// Move a live identifier to another waiting status.
    pub fn set_status(&mut self, id: u16, status: IdStatus) -> bool {
        match self.entries.get_mut(usize::from(id)) {
            Some(entry) if id != 0 && *entry != IdStatus::None && status != IdStatus::None => {
                *entry = status;
                true
            }
            _ => false,
        }
    }

    /// Free `id`. Returns `false` if it was not live.
    pub fn release(&mut self, id: u16) -> bool {
        if self.status(id) == IdStatus::None {
            return false;
        }
        self.entries[usize::from(id)] = IdStatus::None;
        self.in_use -= 1;

        if usize::from(id) == self.entries.len() - 1 {
            while self.entries.len() > 1 && self.entries.last() == Some(&IdStatus::None) {
                self.entries.pop();
                let trimmed = self.entries.len();
                self.free.retain(|free| usize::from(*free) != trimmed);
            }
        } else {
            self.free.push(id);
        }
        true
    }

    /// Number of live identifiers.
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Free every identifier.
    pub fn clear(&mut self) {
        self.entries.truncate(1);
        self.free.clear();
        self.in_use = 0;
    }
}

/// A serialized packet that needs a packet identifier before it can be sent.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// PUBLISH, SUBSCRIBE or UNSUBSCRIBE.
    pub command: Command,
    /// QoS of a PUBLISH; ignored for the other commands.
    pub qos: QoS,
    /// Complete frame with a placeholder identifier.
    pub frame: BytesMut,
    /// Where the identifier goes.
    pub id_slot: Option<IdSlot>,
}

impl Outbound {
    /// Wrap an encoded packet.
    pub fn new(encoded: Encoded, qos: QoS) -> Self {
        Self {
            command: encoded.command,
            qos,
            frame: encoded.frame,
            id_slot: encoded.id_slot,
        }
    }

    fn initial_status(&self) -> IdStatus {
        match (self.command, self.qos) {
            (Command::Publish, QoS::AtLeastOnce) => IdStatus::WaitPubAck,
            (Command::Publish, QoS::ExactlyOnce) => IdStatus::WaitPubRec,
            (Command::Subscribe, _) => IdStatus::WaitSubAck,
            (Command::Unsubscribe, _) => IdStatus::WaitUnsubAck,
            _ => IdStatus::None,
        }
    }
}

/// A sent packet awaiting its acknowledgement.
#[derive(Debug, Clone)]
pub struct InFlight {
    /// Allocated identifier.
    pub packet_id: u16,
    /// Command of the stored frame; PUBREL once a PUBREC was accepted.
    pub command: Command,
    /// The frame as it would be resent.
    pub frame: Bytes,
}

/// A QoS > 0 send dropped by a session reset before it was acknowledged.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Abandoned {
    /// Command of the dropped packet.
    pub command: Command,
    /// Identifier, if one had been allocated.
    pub packet_id: Option<u16>,
}

/// What [`FlowController::prepare_for_send`] did with a packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendOutcome {
    /// Pushed to the outbox, with the identifier if one was allocated.
    Sent(Option<u16>),
    /// Waiting in the pending queue.
    Queued,
    /// QoS 0 while the link is not ready.
    Dropped,
}

/// What [`FlowController::handle_ack`] did with an acknowledgement.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckOutcome {
    /// The identifier was freed.
    Released,
    /// PUBREC accepted, PUBREL pushed to the outbox.
    AwaitingComp,
    /// Unknown identifier or unexpected ack for its status.
    Ignored,
}

/// Per-connection delivery state.
#[derive(Debug)]
pub struct FlowController {
    ids: PacketIdTable,
    in_flight: VecDeque<InFlight>,
    pending: VecDeque<Outbound>,
    exactly_once: BTreeSet<u16>,
    send_quota: u16,
    connecting: bool,
    ready: bool,
    maximum_packet_size: u32,
}

impl Default for FlowController {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowController {
    /// Fresh state: not connected, no identifiers in use.
    pub fn new() -> Self {
        Self {
            ids: PacketIdTable::new(),
            in_flight: VecDeque::new(),
            pending: VecDeque::new(),
            exactly_once: BTreeSet::new(),
            send_quota: u16::MAX,
            connecting: false,
            ready: false,
            maximum_packet_size: super::cursor::VAR_INT_MAX,
        }
    }

    /// `true` once a successful CONNACK has been processed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// `true` between sending CONNECT and receiving CONNACK.
    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    /// Receive-maximum negotiated with the server.
    pub fn send_quota(&self) -> u16 {
        self.send_quota
    }

    /// Largest packet the server accepts.
    pub fn maximum_packet_size(&self) -> u32 {
        self.maximum_packet_size
    }

    /// Status of `id`.
    pub fn id_status(&self, id: u16) -> IdStatus {
        self.ids.status(id)
    }

    /// Identifiers of the in-flight packets, in send order.
    pub fn in_flight_ids(&self) -> Vec<u16> {
        self.in_flight.iter().map(|p| p.packet_id).collect()
    }

    /// Number of packets waiting in the pending queue.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Route an outbound packet: send it now, queue it, or drop it.
    pub fn prepare_for_send(
        &mut self,
        outbound: Outbound,
        outbox: &mut Vec<Bytes>,
    ) -> Result<SendOutcome, CodecError> {
        if outbound.initial_status() == IdStatus::None {
            if !self.ready {
                debug!("dropping QoS 0 {:?}, link not ready", outbound.command);
                return Ok(SendOutcome::Dropped);
            }
            outbox.push(outbound.frame.freeze());
            return Ok(SendOutcome::Sent(None));
        }

        if !self.ready || !self.pending.is_empty() {
            trace!("queueing {:?}, {} already pending", outbound.command, self.pending.len());
            self.pending.push_back(outbound);
            return Ok(SendOutcome::Queued);
        }

        match self.try_dispatch(outbound, outbox)? {
            Ok(id) => Ok(SendOutcome::Sent(Some(id))),
            Err(outbound) => {
                trace!("no packet identifier available, queueing {:?}", outbound.command);
                self.pending.push_back(outbound);
                Ok(SendOutcome::Queued)
            }
        }
    }

    /// Allocate, patch and record. Hands the packet back if no identifier is free.
    fn try_dispatch(
        &mut self,
        outbound: Outbound,
        outbox: &mut Vec<Bytes>,
    ) -> Result<Result<u16, Outbound>, CodecError> {
        let Some(id) = self.ids.allocate(outbound.initial_status(), self.send_quota) else {
            return Ok(Err(outbound));
        };
        let Outbound {
            command,
            mut frame,
            id_slot,
            ..
        } = outbound;
        if let Some(slot) = id_slot {
            if let Err(e) = slot.patch(&mut frame, id) {
                self.ids.release(id);
                return Err(e);
            }
        }
        let frame = frame.freeze();
        self.in_flight.push_back(InFlight {
            packet_id: id,
            command,
            frame: frame.clone(),
        });
        outbox.push(frame);
        Ok(Ok(id))
    }

    fn drain_pending(&mut self, outbox: &mut Vec<Bytes>) -> Result<(), CodecError> {
        while self.ready {
            let Some(next) = self.pending.pop_front() else {
                break;
            };
            if let Err(back) = self.try_dispatch(next, outbox)? {
                self.pending.push_front(back);
                break;
            }
        }
        Ok(())
    }

    /// Process PUBACK, PUBREC, PUBCOMP, SUBACK or UNSUBACK for `packet_id`.
    pub fn handle_ack(
        &mut self,
        command: Command,
        packet_id: u16,
        reason: u8,
        outbox: &mut Vec<Bytes>,
    ) -> Result<AckOutcome, CodecError> {
        let expected = match command {
            Command::PubAck => IdStatus::WaitPubAck,
            Command::PubRec => IdStatus::WaitPubRec,
            Command::PubComp => IdStatus::WaitPubComp,
            Command::SubAck => IdStatus::WaitSubAck,
            Command::UnsubAck => IdStatus::WaitUnsubAck,
            _ => return Ok(AckOutcome::Ignored),
        };
        let status = self.ids.status(packet_id);
        if status != expected {
            warn!(
                "ignoring {:?} for packet id {} in state {:?}",
                command, packet_id, status
            );
            return Ok(AckOutcome::Ignored);
        }

        if command == Command::PubRec && !reason_code::is_failure(reason) {
            let pubrel = codec::encode(&ControlPacket::PubRel(AckData::new(packet_id)))?
                .frame
                .freeze();
            self.ids.set_status(packet_id, IdStatus::WaitPubComp);
            if let Some(entry) = self.in_flight.iter_mut().find(|p| p.packet_id == packet_id) {
                entry.command = Command::PubRel;
                entry.frame = pubrel.clone();
            }
            outbox.push(pubrel);
            return Ok(AckOutcome::AwaitingComp);
        }

        if reason_code::is_failure(reason) {
            debug!("{:?} for packet id {} failed with 0x{:02x}", command, packet_id, reason);
        }
        self.ids.release(packet_id);
        self.in_flight.retain(|p| p.packet_id != packet_id);
        self.drain_pending(outbox)?;
        Ok(AckOutcome::Released)
    }

    /// CONNECT is on its way; hold every QoS > 0 send until CONNACK.
    pub fn connect_sent(&mut self) {
        self.connecting = true;
        self.ready = false;
    }

    /// Apply a CONNACK.
    ///
    /// On success the in-flight packets are resent in their original order,
    /// PUBLISH with DUP set, then the pending queue is drained.
    pub fn on_conn_ack(
        &mut self,
        success: bool,
        receive_maximum: u16,
        maximum_packet_size: u32,
        outbox: &mut Vec<Bytes>,
    ) -> Result<(), CodecError> {
        if !success {
            self.connecting = false;
            self.ready = false;
            return Ok(());
        }
        self.send_quota = receive_maximum.max(1);
        self.maximum_packet_size = maximum_packet_size;

        for entry in self.in_flight.iter_mut() {
            if entry.command == Command::Publish {
                let mut frame = BytesMut::from(&entry.frame[..]);
                frame[0] |= 0x08;
                entry.frame = frame.freeze();
            }
            trace!("resending {:?} packet id {}", entry.command, entry.packet_id);
            outbox.push(entry.frame.clone());
        }

        self.ready = true;
        self.connecting = false;
        self.drain_pending(outbox)
    }

    /// The connection dropped. Delivery state is kept for a resumed session.
    pub fn link_down(&mut self) {
        self.ready = false;
        self.connecting = false;
    }

    /// Forget the session, reporting every unacknowledged QoS > 0 send.
    pub fn reset(&mut self) -> Vec<Abandoned> {
        let mut abandoned: Vec<Abandoned> = self
            .in_flight
            .drain(..)
            .map(|p| Abandoned {
                command: match p.command {
                    Command::PubRel => Command::Publish,
                    other => other,
                },
                packet_id: Some(p.packet_id),
            })
            .collect();
        abandoned.extend(self.pending.drain(..).map(|p| Abandoned {
            command: p.command,
            packet_id: None,
        }));
        self.ids.clear();
        self.exactly_once.clear();
        self.send_quota = u16::MAX;
        self.maximum_packet_size = super::cursor::VAR_INT_MAX;
        self.connecting = false;
        self.ready = false;
        abandoned
    }

    /// Record an inbound QoS 2 PUBLISH. Returns `false` for a duplicate that
    /// must not be delivered again.
    pub fn receive_exactly_once(&mut self, packet_id: u16, dup: bool) -> bool {
        if dup && self.exactly_once.contains(&packet_id) {
            debug!("suppressing duplicate QoS 2 delivery of packet id {}", packet_id);
            return false;
        }
        self.exactly_once.insert(packet_id);
        true
    }

    /// Complete an inbound QoS 2 exchange on PUBREL. Returns `false` if the
    /// identifier was unknown.
    pub fn release_exactly_once(&mut self, packet_id: u16) -> bool {
        self.exactly_once.remove(&packet_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::application::mqtt5::packet::{PublishData, SubscribeData, SubscribeEntry};
    use alloc::string::String;
    use alloc::vec;

    fn publish(qos: QoS) -> Outbound {
        let data = PublishData {
            qos,
            packet_id: (qos != QoS::AtMostOnce).then_some(0),
            topic: String::from("t"),
            payload: Bytes::from_static(&[1, 2, 3]),
            ..PublishData::default()
        };
        Outbound::new(codec::encode(&ControlPacket::Publish(data)).unwrap(), qos)
    }

    fn subscribe() -> Outbound {
        let data = SubscribeData {
            packet_id: 0,
            properties: Default::default(),
            entries: vec![SubscribeEntry::new("a/#", QoS::AtLeastOnce)],
        };
        Outbound::new(codec::encode(&ControlPacket::Subscribe(data)).unwrap(), QoS::AtMostOnce)
    }

    fn connected(receive_maximum: u16) -> FlowController {
        let mut flow = FlowController::new();
        flow.connect_sent();
        let mut outbox = Vec::new();
        flow.on_conn_ack(true, receive_maximum, 1024, &mut outbox).unwrap();
        assert!(outbox.is_empty());
        flow
    }

    fn frame_id(frame: &[u8]) -> u16 {
        // PUBLISH "t": header, length, 00 01 't', id
        u16::from_be_bytes([frame[5], frame[6]])
    }

    #[test]
    fn table_reuses_most_recently_freed_first() {
        let mut table = PacketIdTable::new();
        for expected in 1..=5 {
            assert_eq!(table.allocate(IdStatus::WaitPubAck, 10), Some(expected));
        }
        assert!(table.release(2));
        assert!(table.release(4));
        assert_eq!(table.allocate(IdStatus::WaitPubAck, 10), Some(4));
        assert_eq!(table.allocate(IdStatus::WaitPubAck, 10), Some(2));
        assert_eq!(table.allocate(IdStatus::WaitPubAck, 10), Some(6));
    }

    #[test]
    fn table_trims_trailing_free_entries() {
        let mut table = PacketIdTable::new();
        for _ in 0..4 {
            table.allocate(IdStatus::WaitPubAck, 10);
        }
        table.release(3);
        table.release(4);
        // 3 was on the free-list; trimming 4 and then 3 removes it again.
        assert_eq!(table.allocate(IdStatus::WaitSubAck, 10), Some(3));
        assert_eq!(table.allocate(IdStatus::WaitSubAck, 10), Some(4));
        assert_eq!(table.in_use(), 4);
    }

    #[test]
    fn table_respects_limit_and_double_release() {
        let mut table = PacketIdTable::new();
        assert_eq!(table.allocate(IdStatus::WaitPubAck, 1), Some(1));
        assert_eq!(table.allocate(IdStatus::WaitPubAck, 1), None);
        assert!(table.release(1));
        assert!(!table.release(1));
        assert!(!table.release(0));
        assert_eq!(table.status(99), IdStatus::None);
    }

    #[test]
    fn qos0_is_dropped_until_ready() {
        let mut flow = FlowController::new();
        let mut outbox = Vec::new();
        assert_eq!(
            flow.prepare_for_send(publish(QoS::AtMostOnce), &mut outbox).unwrap(),
            SendOutcome::Dropped
        );
        assert!(outbox.is_empty());

        let mut flow = connected(10);
        assert_eq!(
            flow.prepare_for_send(publish(QoS::AtMostOnce), &mut outbox).unwrap(),
            SendOutcome::Sent(None)
        );
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn qos1_gets_id_patched_and_released_on_puback() {
        let mut flow = connected(10);
        let mut outbox = Vec::new();
        assert_eq!(
            flow.prepare_for_send(publish(QoS::AtLeastOnce), &mut outbox).unwrap(),
            SendOutcome::Sent(Some(1))
        );
        assert_eq!(frame_id(&outbox[0]), 1);
        assert_eq!(flow.id_status(1), IdStatus::WaitPubAck);

        outbox.clear();
        assert_eq!(
            flow.handle_ack(Command::PubAck, 1, 0, &mut outbox).unwrap(),
            AckOutcome::Released
        );
        assert!(outbox.is_empty());
        assert_eq!(flow.id_status(1), IdStatus::None);
        assert!(flow.in_flight_ids().is_empty());
    }

    #[test]
    fn qos2_pubrec_success_sends_pubrel() {
        let mut flow = connected(10);
        let mut outbox = Vec::new();
        flow.prepare_for_send(publish(QoS::ExactlyOnce), &mut outbox).unwrap();
        outbox.clear();

        assert_eq!(
            flow.handle_ack(Command::PubRec, 1, 0, &mut outbox).unwrap(),
            AckOutcome::AwaitingComp
        );
        assert_eq!(&outbox[0][..], &[0x62, 0x02, 0x00, 0x01]);
        assert_eq!(flow.id_status(1), IdStatus::WaitPubComp);

        outbox.clear();
        assert_eq!(
            flow.handle_ack(Command::PubComp, 1, 0, &mut outbox).unwrap(),
            AckOutcome::Released
        );
        assert!(outbox.is_empty());
        assert_eq!(flow.id_status(1), IdStatus::None);
    }

    #[test]
    fn qos2_pubrec_failure_frees_without_pubrel() {
        let mut flow = connected(10);
        let mut outbox = Vec::new();
        flow.prepare_for_send(publish(QoS::ExactlyOnce), &mut outbox).unwrap();
        outbox.clear();
        assert_eq!(
            flow.handle_ack(Command::PubRec, 1, 0x80, &mut outbox).unwrap(),
            AckOutcome::Released
        );
        assert!(outbox.is_empty());
        assert_eq!(flow.id_status(1), IdStatus::None);
    }

    #[test]
    fn mismatched_or_unknown_acks_are_ignored() {
        let mut flow = connected(10);
        let mut outbox = Vec::new();
        flow.prepare_for_send(publish(QoS::AtLeastOnce), &mut outbox).unwrap();
        outbox.clear();
        assert_eq!(
            flow.handle_ack(Command::PubComp, 1, 0, &mut outbox).unwrap(),
            AckOutcome::Ignored
        );
        assert_eq!(
            flow.handle_ack(Command::PubAck, 42, 0, &mut outbox).unwrap(),
            AckOutcome::Ignored
        );
        assert_eq!(flow.id_status(1), IdStatus::WaitPubAck);
        assert!(outbox.is_empty());
    }

    #[test]
    fn exhausted_ids_queue_and_drain_on_ack() {
        let mut flow = connected(10);
        let mut outbox = Vec::new();
        for _ in 0..12 {
            flow.prepare_for_send(publish(QoS::AtLeastOnce), &mut outbox).unwrap();
        }
        let ids: Vec<u16> = outbox.iter().map(|f| frame_id(f)).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<u16>>());
        assert_eq!(flow.pending_len(), 2);

        outbox.clear();
        flow.handle_ack(Command::PubAck, 3, 0, &mut outbox).unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(frame_id(&outbox[0]), 3);
        assert_eq!(flow.pending_len(), 1);
    }

    #[test]
    fn sends_during_connect_keep_their_order() {
        let mut flow = FlowController::new();
        flow.connect_sent();
        let mut outbox = Vec::new();
        flow.prepare_for_send(publish(QoS::AtLeastOnce), &mut outbox).unwrap();
        flow.prepare_for_send(subscribe(), &mut outbox).unwrap();
        flow.prepare_for_send(publish(QoS::ExactlyOnce), &mut outbox).unwrap();
        assert!(outbox.is_empty());
        assert_eq!(flow.pending_len(), 3);

        flow.on_conn_ack(true, 10, 1024, &mut outbox).unwrap();
        assert!(flow.is_ready() && !flow.is_connecting());
        let headers: Vec<u8> = outbox.iter().map(|f| f[0]).collect();
        assert_eq!(headers, vec![0x32, 0x82, 0x34]);
        assert_eq!(flow.in_flight_ids(), vec![1, 2, 3]);
        assert_eq!(flow.id_status(2), IdStatus::WaitSubAck);
    }

    #[test]
    fn reconnect_resends_in_flight_with_dup_before_pending() {
        let mut flow = connected(2);
        let mut outbox = Vec::new();
        flow.prepare_for_send(publish(QoS::AtLeastOnce), &mut outbox).unwrap();
        flow.prepare_for_send(publish(QoS::ExactlyOnce), &mut outbox).unwrap();
        flow.prepare_for_send(publish(QoS::AtLeastOnce), &mut outbox).unwrap();
        flow.handle_ack(Command::PubRec, 2, 0, &mut outbox).unwrap();
        outbox.clear();

        flow.link_down();
        flow.connect_sent();
        flow.on_conn_ack(true, 3, 1024, &mut outbox).unwrap();

        assert_eq!(outbox.len(), 3);
        assert_eq!(outbox[0][0], 0x3A);
        assert_eq!(frame_id(&outbox[0]), 1);
        assert_eq!(&outbox[1][..], &[0x62, 0x02, 0x00, 0x02]);
        assert_eq!(outbox[2][0], 0x32);
        assert_eq!(frame_id(&outbox[2]), 3);
    }

    #[test]
    fn reset_reports_abandoned_sends() {
        let mut flow = connected(1);
        let mut outbox = Vec::new();
        flow.prepare_for_send(publish(QoS::AtLeastOnce), &mut outbox).unwrap();
        flow.prepare_for_send(subscribe(), &mut outbox).unwrap();

        let abandoned = flow.reset();
        assert_eq!(
            abandoned,
            vec![
                Abandoned {
                    command: Command::Publish,
                    packet_id: Some(1)
                },
                Abandoned {
                    command: Command::Subscribe,
                    packet_id: None
                },
            ]
        );
        assert!(!flow.is_ready());
        assert_eq!(flow.id_status(1), IdStatus::None);
        assert_eq!(flow.pending_len(), 0);
    }

    #[test]
    fn exactly_once_set_suppresses_dup() {
        let mut flow = FlowController::new();
        assert!(flow.receive_exactly_once(7, false));
        assert!(!flow.receive_exactly_once(7, true));
        assert!(flow.release_exactly_once(7));
        assert!(!flow.release_exactly_once(7));
        assert!(flow.receive_exactly_once(7, true));
    }
}
