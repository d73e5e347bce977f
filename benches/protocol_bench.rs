use criterion::{black_box, criterion_group, criterion_main, Criterion};
use renoir_runtime::{Interfaces, Message, MessageType, ServiceDescription};

fn sender_request() -> Message {
    let service = ServiceDescription::new("Radar", "Front", "Distance").unwrap();
    Message::request(MessageType::ImplSender)
        .with("/sensorNode")
        .with(service.serialize())
        .with(Interfaces::Internal)
        .with("ctrl")
}

fn benchmark_message_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("Message_Codec");
    let request = sender_request();
    let encoded = request.encode().unwrap();

    group.bench_function("encode", |b| b.iter(|| black_box(&request).encode().unwrap()));
    group.bench_function("decode", |b| b.iter(|| Message::decode(black_box(&encoded)).unwrap()));

    group.finish();
}

fn benchmark_service_description(c: &mut Criterion) {
    let mut group = c.benchmark_group("ServiceDescription");
    let service = ServiceDescription::new("Radar", "Front", "Distance").unwrap();
    let serialized = service.serialize();

    group.bench_function("serialize", |b| b.iter(|| black_box(&service).serialize()));
    group.bench_function("deserialize", |b| {
        b.iter(|| ServiceDescription::deserialize(black_box(&serialized)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, benchmark_message_codec, benchmark_service_description);
criterion_main!(benches);
