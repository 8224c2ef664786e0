use criterion::{criterion_group, criterion_main};

mod client;

criterion_group!(
    benches,
    codec::bench_encode_publish,
    codec::bench_decode_publish,
    codec::bench_frame_reader,
    client::bench_publish_qos1_round_trip,
    client::bench_receive_qos0
);
criterion_main!(benches);
