// SPDX-License-Identifier: Apache-2.0
#![allow(missing_docs)]
//! Benchmark: appending and scanning a changelog of `n` records.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geodisk_changelog::{ChangelogFile, DecodedRecord, LogRecordScanner};
use geodisk_changelog::format::UPDATE_RECORD;

struct CountingScanner {
    count: usize,
}

impl LogRecordScanner for CountingScanner {
    fn process_record(&mut self, _record: &DecodedRecord) -> bool {
        self.count += 1;
        true
    }
}

fn build_log(dir: &tempfile::TempDir, n: usize) -> ChangelogFile {
    let path = dir.path().join("bench.log");
    let log = ChangelogFile::open(&path).expect("open changelog");
    for i in 0..n {
        let payload = format!("payload-{i:08}");
        log.store_record(UPDATE_RECORD, payload.as_bytes())
            .expect("store record");
    }
    log
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("changelog_scan");
    for n in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let dir = tempfile::tempdir().expect("tempdir");
            let log = build_log(&dir, n);
            b.iter(|| {
                let mut scanner = CountingScanner { count: 0 };
                log.scan_all_records(&mut scanner).expect("scan");
                assert_eq!(scanner.count, n);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scan);
criterion_main!(benches);
