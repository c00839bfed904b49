//! Session benchmarks against an in-memory device.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nesigner_client::{Nesigner, Signer};
use nesigner_crypto::SessionKey;
use nesigner_protocol::{
    Decoder, MessageType, RequestFrame, ResponseFrame, ResultCode, WireFrame,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::runtime::Runtime;

const PIN: &str = "1234";

/// Answers PING and ECHO the way the firmware does.
async fn run_device(device: DuplexStream) {
    let key = SessionKey::from_pin(PIN);
    let (mut reader, mut writer) = tokio::io::split(device);
    let mut decoder: Decoder<RequestFrame> = Decoder::new();
    let mut buf = vec![0u8; 8192];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        decoder.extend(&buf[..n]);

        while let Ok(Some(frame)) = decoder.decode_frame() {
            let (result, payload) = match frame.message_type {
                MessageType::Echo => match key.decrypt(&frame.iv, &frame.payload) {
                    Ok(message) => (ResultCode::Ok, key.encrypt(&frame.iv, &message)),
                    Err(_) => (ResultCode::Fail, Vec::new()),
                },
                MessageType::Ping => (ResultCode::Ok, Vec::new()),
                _ => (ResultCode::Fail, Vec::new()),
            };
            let response = ResponseFrame::new(
                frame.message_type,
                frame.correlation_id,
                result,
                frame.pubkey,
                frame.iv,
                Bytes::from(payload),
            );
            let Ok(encoded) = response.encode() else {
                return;
            };
            if writer.write_all(&encoded).await.is_err() {
                return;
            }
        }
    }
}

fn setup_session(rt: &Runtime) -> Nesigner {
    rt.block_on(async {
        let (host, device) = tokio::io::duplex(1024 * 1024);
        tokio::spawn(run_device(device));
        Nesigner::new(host, PIN)
    })
}

fn bench_ping_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let signer = setup_session(&rt);

    let mut group = c.benchmark_group("session_ping");
    group.throughput(Throughput::Elements(1));

    group.bench_function("ping", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(signer.ping().await.unwrap()) });
    });

    group.finish();
}

fn bench_echo(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let signer = setup_session(&rt);

    let mut group = c.benchmark_group("session_echo");

    for size in [16, 1024, 16384] {
        let message = "x".repeat(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.to_async(&rt)
                .iter(|| async { black_box(signer.echo(PIN, message).await.unwrap()) });
        });
    }

    group.finish();
}

fn bench_concurrent_requests(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let signer = setup_session(&rt);

    let mut group = c.benchmark_group("session_concurrent");
    group.sample_size(20);

    for concurrency in [1, 10, 50] {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_with_input(
            BenchmarkId::new("pings", concurrency),
            &concurrency,
            |b, &conc| {
                b.to_async(&rt).iter(|| {
                    let signer = &signer;
                    async move {
                        let futures: Vec<_> = (0..conc).map(|_| signer.ping()).collect();
                        black_box(futures::future::join_all(futures).await)
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ping_latency,
    bench_echo,
    bench_concurrent_requests,
);

criterion_main!(benches);
