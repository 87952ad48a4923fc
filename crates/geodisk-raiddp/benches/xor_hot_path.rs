// SPDX-License-Identifier: Apache-2.0
#![allow(missing_docs)]
//! Benchmark: `xor_into` at block sizes typical of a RAID-DP stripe width.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geodisk_raiddp::xor_into;

fn bench_xor(c: &mut Criterion) {
    let mut group = c.benchmark_group("xor_into");
    for width in [4096usize, 64 * 1024, 1024 * 1024] {
        group.throughput(Throughput::Bytes(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let src = vec![0xA5u8; width];
            let mut dst = vec![0x5Au8; width];
            b.iter(|| {
                xor_into(black_box(&mut dst), black_box(&src));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_xor);
criterion_main!(benches);
