//! Benchmarks for shade-core I/O adapters.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

use shade_core::{relay_bidirectional, CipherStream, PrefixedStream};
use shade_crypto::{CipherSuite, Method, ReplayGuard};

const GRACE: Duration = Duration::from_secs(1);

fn bench_relay_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("relay_throughput");

    for data_size in [1024, 8192, 65536] {
        group.throughput(Throughput::Bytes(data_size as u64 * 2)); // bidirectional
        group.bench_with_input(
            BenchmarkId::from_parameter(data_size),
            &data_size,
            |b, &size| {
                let data = vec![b'x'; size];
                b.iter(|| {
                    rt.block_on(async {
                        let (client, near) = duplex(size * 2);
                        let (far, target) = duplex(size * 2);

                        let data_clone = data.clone();
                        let relay = tokio::spawn(relay_bidirectional(near, far, 8192, GRACE));

                        let (mut client_r, mut client_w) = tokio::io::split(client);
                        let (mut target_r, mut target_w) = tokio::io::split(target);

                        let send = tokio::spawn(async move {
                            client_w.write_all(&data_clone).await.unwrap();
                            client_w.shutdown().await.unwrap();
                        });

                        let mut buf = vec![0u8; size];
                        target_r.read_exact(&mut buf).await.unwrap();

                        target_w.write_all(&buf).await.unwrap();
                        target_w.shutdown().await.unwrap();

                        client_r.read_exact(&mut buf).await.unwrap();

                        send.await.unwrap();
                        let outcome = relay.await.unwrap();
                        black_box(outcome.upstream + outcome.downstream);
                    })
                })
            },
        );
    }

    group.finish();
}

fn bench_cipher_stream_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("cipher_stream_throughput");

    let size = 256 * 1024;
    group.throughput(Throughput::Bytes(size as u64));

    for method in [
        Method::Plain,
        Method::Aes256Ctr,
        Method::Aes128Cfb,
        Method::Chacha20Ietf,
        Method::Aes128Gcm,
        Method::Chacha20Poly1305,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(method.name()),
            &method,
            |b, &method| {
                let suite = CipherSuite::from_password(method, "bench password");
                let data = vec![b'x'; size];
                b.iter(|| {
                    rt.block_on(async {
                        let (near, far) = duplex(64 * 1024);
                        let mut sender = CipherStream::new(
                            near,
                            suite.clone(),
                            Arc::new(ReplayGuard::disabled()),
                        );
                        let mut receiver = CipherStream::new(
                            far,
                            suite.clone(),
                            Arc::new(ReplayGuard::disabled()),
                        );

                        let data_clone = data.clone();
                        let writer = tokio::spawn(async move {
                            sender.write_all(&data_clone).await.unwrap();
                            sender.shutdown().await.unwrap();
                        });

                        let mut received = Vec::with_capacity(size);
                        receiver.read_to_end(&mut received).await.unwrap();
                        writer.await.unwrap();
                        black_box(received.len());
                    })
                })
            },
        );
    }

    group.finish();
}

fn bench_prefixed_stream_read(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("prefixed_stream_read");

    for prefix_size in [64, 256, 1024, 4096] {
        group.throughput(Throughput::Bytes(prefix_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(prefix_size),
            &prefix_size,
            |b, &size| {
                b.iter(|| {
                    rt.block_on(async {
                        let prefix = Bytes::from(vec![b'x'; size]);
                        let (_peer, inner) = duplex(1024);
                        let mut prefixed = PrefixedStream::new(prefix, inner);

                        let mut buf = vec![0u8; size + 64];
                        let n = prefixed.read(&mut buf).await.unwrap();
                        black_box(n);
                    })
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_relay_throughput,
    bench_cipher_stream_throughput,
    bench_prefixed_stream_read,
);

criterion_main!(benches);
