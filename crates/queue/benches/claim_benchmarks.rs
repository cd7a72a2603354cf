use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;
use std::time::Duration;

use jobkeeper_core::{Clock, JobId, ManualClock};
use jobkeeper_queue::{InMemoryJobQueue, JobQueue, ScheduledMessage};

const QUEUE: &str = "/jobs";
const LEASE: Duration = Duration::from_secs(30);

fn seeded_queue(depth: usize) -> (Arc<ManualClock>, InMemoryJobQueue) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let queue = InMemoryJobQueue::with_clock(clock.clone());
    for i in 0..depth {
        queue
            .post(
                QUEUE,
                ScheduledMessage::new(clock.now_ms() - i as i64, "bench", JobId::new()),
            )
            .unwrap();
    }
    (clock, queue)
}

/// Claim + ack cycle at different batch sizes against a fixed-depth queue.
fn bench_claim_and_ack(c: &mut Criterion) {
    let mut group = c.benchmark_group("claim_and_ack");

    for batch_size in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch", batch_size),
            batch_size,
            |b, &batch_size| {
                let (clock, queue) = seeded_queue(1_000);
                b.iter(|| {
                    let claimed = queue.claim(QUEUE, batch_size, LEASE).unwrap();
                    for c in &claimed {
                        queue.delete_lease(QUEUE, c.lease_id).unwrap();
                        queue
                            .post(QUEUE, ScheduledMessage::new(clock.now_ms(), "bench", JobId::new()))
                            .unwrap();
                    }
                    black_box(claimed.len())
                });
            },
        );
    }

    group.finish();
}

/// Heartbeat cost for a single held lease.
fn bench_renew(c: &mut Criterion) {
    let mut group = c.benchmark_group("renew");

    group.bench_function("renew_single_lease", |b| {
        let (_clock, queue) = seeded_queue(1_000);
        let mut lease_id = queue.claim(QUEUE, 1, LEASE).unwrap().remove(0).lease_id;
        b.iter(|| {
            lease_id = queue.renew(QUEUE, lease_id, LEASE).unwrap();
            black_box(lease_id)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_claim_and_ack, bench_renew);
criterion_main!(benches);
