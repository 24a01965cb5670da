use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use flockid::{
    ClockDriftPolicy, DEFAULT_EPOCH_MILLIS, Fingerprint, GeneratorConfig, HardwareAddr, IdLayout,
    MAX_WORKER_ID, MemoryStore, SnowflakeGenerator, SystemClock, TimeSource, WorkerRegistry,
};
use std::{
    net::Ipv4Addr,
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

struct FixedMockTime {
    millis: u64,
}

impl TimeSource for FixedMockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

// One full millisecond worth of sequence numbers, so a fixed clock never has
// to wait.
const TOTAL_IDS: usize = 4096;

fn bench_generator<T: TimeSource>(
    c: &mut Criterion,
    group_name: &str,
    generator_fn: impl Fn() -> SnowflakeGenerator<T>,
) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{}", TOTAL_IDS), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let generator = generator_fn();
                for _ in 0..TOTAL_IDS {
                    black_box(generator.next_id().ok());
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Shares one generator across threads; every call contends on its lock.
fn bench_generator_contended<T: TimeSource + Send + Sync>(
    c: &mut Criterion,
    group_name: &str,
    generator_fn: impl Fn() -> SnowflakeGenerator<T>,
) {
    let mut group = c.benchmark_group(group_name);

    for thread_count in [1, 2, 4, 8] {
        let ids_per_thread = TOTAL_IDS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_IDS as u64));
        group.bench_function(
            format!("elems/{}/threads/{}", TOTAL_IDS, thread_count),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();

                    for _ in 0..iters {
                        let generator = Arc::new(generator_fn());
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for _ in 0..thread_count {
                                let generator = Arc::clone(&generator);
                                let barrier = Arc::clone(&barrier);
                                s.spawn(move || {
                                    barrier.wait();
                                    for _ in 0..ids_per_thread {
                                        black_box(generator.next_id().ok());
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

fn fixed_generator() -> SnowflakeGenerator<FixedMockTime> {
    SnowflakeGenerator::new(1, GeneratorConfig::default(), FixedMockTime { millis: 1 << 41 })
}

fn system_generator() -> SnowflakeGenerator<SystemClock> {
    SnowflakeGenerator::new(1, GeneratorConfig::default(), SystemClock)
}

fn benchmark_mock_sequential(c: &mut Criterion) {
    bench_generator(c, "mock/sequential", fixed_generator);
}

fn benchmark_mock_sequential_compat(c: &mut Criterion) {
    bench_generator(c, "mock/sequential/compat", || {
        SnowflakeGenerator::new(
            1,
            GeneratorConfig::default().with_layout(IdLayout::COMPAT),
            FixedMockTime { millis: 1 << 41 },
        )
    });
}

fn benchmark_mock_contended(c: &mut Criterion) {
    bench_generator_contended(c, "mock/contended", fixed_generator);
}

/// Wall clock, so exhausting a millisecond waits for the next one.
fn benchmark_system_sequential(c: &mut Criterion) {
    bench_generator(c, "system/sequential", system_generator);
}

fn benchmark_system_contended(c: &mut Criterion) {
    bench_generator_contended(c, "system/contended", system_generator);
}

fn benchmark_system_reject(c: &mut Criterion) {
    bench_generator(c, "system/sequential/reject", || {
        SnowflakeGenerator::new(
            1,
            GeneratorConfig::new(ClockDriftPolicy::Reject, 0, DEFAULT_EPOCH_MILLIS),
            SystemClock,
        )
    });
}

/// Picks from a live list of `MAX_WORKER_ID + 1` workers.
fn benchmark_select_live_worker(c: &mut Criterion) {
    let registry = WorkerRegistry::new(MemoryStore::new()).expect("empty store");
    let now = SystemClock.current_millis();
    for n in 0..=MAX_WORKER_ID {
        let [hi, lo] = n.to_be_bytes();
        let fingerprint = Fingerprint {
            ip: Ipv4Addr::new(10, 0, hi, lo),
            mac: HardwareAddr([0x02, 0, 0, 0, hi, lo]),
        };
        registry
            .register(fingerprint, format!("http://10.0.{hi}.{lo}:8080"), now)
            .expect("capacity");
    }

    let mut group = c.benchmark_group("registry/select_live_worker");
    group.throughput(Throughput::Elements(1));
    group.bench_function("workers/1024", |b| {
        b.iter(|| black_box(registry.select_live_worker().ok()));
    });
    group.finish();
}

criterion_group!(
    benches,
    // Mock clock
    benchmark_mock_sequential,
    benchmark_mock_sequential_compat,
    benchmark_mock_contended,
    // Wall clock
    benchmark_system_sequential,
    benchmark_system_contended,
    benchmark_system_reject,
    // Coordinator
    benchmark_select_live_worker,
);
criterion_main!(benches);
