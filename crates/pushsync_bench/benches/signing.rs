//! Request signing benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pushsync_bench::utils::custom_properties;
use pushsync_client::{HttpMethod, RequestSigner, Url};

fn params(body_size: usize) -> Vec<(String, String)> {
    let body = serde_json::Value::Object(custom_properties(body_size)).to_string();
    vec![
        ("accessToken".to_string(), "TOKEN".to_string()),
        ("sdkVersion".to_string(), "Rust-bench".to_string()),
        ("body".to_string(), body),
    ]
}

/// Benchmark the canonical base string alone.
fn bench_base_string(c: &mut Criterion) {
    let url = Url::parse("https://api.wonderpush.com/v1/installation?lang=en").unwrap();
    let params = params(10);

    c.bench_function("base_string", |b| {
        b.iter(|| {
            black_box(RequestSigner::base_string(
                HttpMethod::Patch,
                black_box(&url),
                black_box(&params),
            ))
        });
    });
}

/// Benchmark the full header computation for growing bodies.
fn bench_authorization_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("authorization_header");
    let signer = RequestSigner::new("secret");
    let url = Url::parse("https://api.wonderpush.com/v1/installation").unwrap();

    for size in [1, 10, 100, 1000] {
        let params = params(size);
        let bytes: usize = params.iter().map(|(k, v)| k.len() + v.len()).sum();
        group.throughput(Throughput::Bytes(bytes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &params, |b, params| {
            b.iter(|| {
                black_box(
                    signer
                        .authorization_header(HttpMethod::Patch, black_box(&url), black_box(params))
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_base_string, bench_authorization_header);
criterion_main!(benches);
