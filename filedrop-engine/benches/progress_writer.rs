//! Throughput of the progress-instrumented write path

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use filedrop_core::{FileName, NamePolicy};
use filedrop_engine::{ProgressRegistry, ProgressWriter};
use tokio::io::AsyncWriteExt;

const TOTAL: usize = 4 * 1024 * 1024;
const CHUNK_SIZES: &[usize] = &[1024, 16 * 1024, 64 * 1024];

fn bench_progress_writer(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = ProgressRegistry::silent();
    let name = FileName::new("bench.bin", NamePolicy::Permissive).unwrap();

    let mut group = c.benchmark_group("progress_writer");
    group.throughput(Throughput::Bytes(TOTAL as u64));

    for &size in CHUNK_SIZES {
        let chunk = vec![42u8; size];
        group.bench_with_input(BenchmarkId::new("in_memory", size), &chunk, |b, chunk| {
            b.iter(|| {
                rt.block_on(async {
                    let handle = registry.register(name.clone(), Some(TOTAL as u64));
                    let mut writer = ProgressWriter::new(Vec::with_capacity(TOTAL), handle);
                    for _ in 0..TOTAL / chunk.len() {
                        writer.write_all(chunk).await.unwrap();
                    }
                    black_box(writer.bytes_written())
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_progress_writer);
criterion_main!(benches);
