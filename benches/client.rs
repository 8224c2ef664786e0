use std::collections::VecDeque;

use criterion::{Criterion, Throughput};
use libiot_mqtt5::network::application::mqtt5::client::{
    Callback, Client, ConnAck, ConnectOptions, PublishRequest, ReceivedMessage,
};
use libiot_mqtt5::network::application::mqtt5::codec;
use libiot_mqtt5::network::application::mqtt5::packet::{
    AckData, ConnAckData, ControlPacket, PublishData, QoS,
};
use libiot_mqtt5::network::error::Error;
use libiot_mqtt5::network::{Read, Write};

#[derive(Default)]
struct LoopbackConnection {
    inbound: VecDeque<u8>,
    written: usize,
}

impl LoopbackConnection {
    fn inject(&mut self, packet: &ControlPacket) {
        self.inbound
            .extend(codec::encode(packet).unwrap().frame.iter().copied());
    }
}

impl Read for LoopbackConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl Write for LoopbackConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

struct Discard;

impl Callback for Discard {
    fn received_conn_ack(&self, _ack: &ConnAck) {}
    fn received_publish(&self, message: ReceivedMessage) {
        std::hint::black_box(message);
    }
}

fn setup_client() -> (Client<Discard>, LoopbackConnection) {
    let client = Client::new(Discard);
    let mut conn = LoopbackConnection::default();
    let options = ConnectOptions {
        client_id: "libiot-bench".into(),
        keep_alive: 0,
        ..ConnectOptions::default()
    };
    client.connect(&mut conn, &options).unwrap();
    conn.inject(&ControlPacket::ConnAck(ConnAckData::default()));
    let available = conn.inbound.len();
    client.receive(&mut conn, available).unwrap();
    (client, conn)
}

pub fn bench_publish_qos1_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_qos1_round_trip");
    let payload = &b"hello world from bench qos1"[..];
    group.throughput(Throughput::Bytes(payload.len() as u64 * 50));
    let (client, mut conn) = setup_client();
    let request = PublishRequest {
        topic: "libiot/bench-topic-qos1",
        qos: QoS::AtLeastOnce,
        ..PublishRequest::default()
    };

    group.bench_function("publish_and_ack", |b| {
        b.iter(|| {
            for _ in 0..50 {
                client.publish(&mut conn, &request, payload).unwrap();
                conn.inject(&ControlPacket::PubAck(AckData::new(1)));
                let available = conn.inbound.len();
                client.receive(&mut conn, available).unwrap();
            }
        })
    });
    group.finish();
}

pub fn bench_receive_qos0(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive_qos0");
    let (client, mut conn) = setup_client();
    let mut burst = LoopbackConnection::default();
    for _ in 0..50 {
        burst.inject(&ControlPacket::Publish(PublishData {
            topic: "libiot/bench-topic-qos0".into(),
            payload: bytes::Bytes::from_static(b"hello world from bench"),
            ..PublishData::default()
        }));
    }
    let stream: Vec<u8> = burst.inbound.into_iter().collect();
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("receive_burst", |b| {
        b.iter(|| {
            conn.inbound.extend(stream.iter().copied());
            client.receive(&mut conn, stream.len()).unwrap();
        })
    });
    group.finish();
}
