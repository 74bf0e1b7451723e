//! Thread separator throughput and latency benchmark.
//!
//! Usage:
//!     cargo run --release --bin separator_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin consumer to CPU 2 (default: 2)
//!     RUST_LOG=...    Log filter (with the `tracing` feature)

use std::env;
use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use separator::{QueueConfig, Registry};

const QUEUE_CAPACITY: usize = 1 << 12;
const ITERATIONS: usize = 1 << 22;
const BATCH: usize = 64;

type Payload = i32;

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    let producer_cpu = env::var("PRODUCER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(0));
    let consumer_cpu = env::var("CONSUMER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(2));
    (producer_cpu, consumer_cpu)
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn registry(queues: usize) -> Registry {
    let configs = QueueConfig::uniform(queues, size_of::<Payload>(), QUEUE_CAPACITY);
    Registry::new(&configs).expect("benchmark queue configuration is valid")
}

/// One element per operation through reserve/push and acquire/release.
fn bench_throughput(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let registry = registry(1);
    let (mut producer, mut consumer) = registry.endpoints(0).unwrap();

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = ready.clone();

    let consumer_thread = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        ready_clone.store(true, Ordering::Release);

        for expected in 0..ITERATIONS as Payload {
            loop {
                if let Some(slot) = consumer.acquire() {
                    let value = Payload::from_ne_bytes(slot.try_into().unwrap());
                    assert_eq!(value, expected, "data corruption");
                    consumer.release();
                    break;
                }
                hint::spin_loop();
            }
        }
    });

    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }
    pin_to_cpu(producer_cpu);

    let start = Instant::now();
    for i in 0..ITERATIONS as Payload {
        loop {
            if let Some(slot) = producer.reserve() {
                slot.copy_from_slice(&i.to_ne_bytes());
                producer.push();
                break;
            }
            hint::spin_loop();
        }
    }
    consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    let ops_per_ms = ITERATIONS as u128 * 1_000_000 / elapsed.as_nanos();
    println!("{ops_per_ms} ops/ms (in place)");
    println!("  producer: {:?}", registry.producer_stats(0));
    println!("  consumer: {:?}", registry.consumer_stats(0));
}

/// Copying bulk API: `put_many` against `get_many_blocking`.
fn bench_bulk(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let registry = registry(1);
    let (mut producer, mut consumer) = registry.endpoints(0).unwrap();

    let consumer_thread = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        let mut batch = [0 as Payload; BATCH];
        let mut total = 0;
        loop {
            let n = consumer.get_many_blocking(separator::sample::as_bytes_mut(&mut batch));
            total += n;
            if n < BATCH {
                return total;
            }
        }
    });

    pin_to_cpu(producer_cpu);

    let start = Instant::now();
    let mut batch = [0 as Payload; BATCH];
    for chunk in 0..ITERATIONS / BATCH {
        for (j, slot) in batch.iter_mut().enumerate() {
            *slot = (chunk * BATCH + j) as Payload;
        }
        producer.put_many(separator::sample::as_bytes(&batch)).unwrap();
    }
    producer.finish();
    let total = consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    assert_eq!(total, ITERATIONS / BATCH * BATCH);
    let ops_per_ms = total as u128 * 1_000_000 / elapsed.as_nanos();
    println!("{ops_per_ms} ops/ms (bulk x{BATCH})");
}

fn bench_rtt(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let registry = registry(2);
    let (mut q1_producer, mut q1_consumer) = registry.endpoints(0).unwrap();
    let (mut q2_producer, mut q2_consumer) = registry.endpoints(1).unwrap();

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = ready.clone();

    let responder = std::thread::spawn(move || {
        pin_to_cpu(consumer_cpu);
        ready_clone.store(true, Ordering::Release);

        let mut value = [0u8; size_of::<Payload>()];
        for _ in 0..ITERATIONS {
            while !q1_consumer.get(&mut value) {
                hint::spin_loop();
            }
            q2_producer.put(&value).unwrap();
        }
    });

    while !ready.load(Ordering::Acquire) {
        hint::spin_loop();
    }
    pin_to_cpu(producer_cpu);

    let start = Instant::now();
    let mut echo = [0u8; size_of::<Payload>()];
    for i in 0..ITERATIONS as Payload {
        q1_producer.put(&i.to_ne_bytes()).unwrap();
        while !q2_consumer.get(&mut echo) {
            hint::spin_loop();
        }
    }
    let elapsed = start.elapsed();
    responder.join().unwrap();

    let rtt_ns = elapsed.as_nanos() / ITERATIONS as u128;
    println!("{rtt_ns} ns RTT");
}

fn main() {
    separator::init_tracing();
    let (producer_cpu, consumer_cpu) = get_cpu_affinity();

    println!("separator SPSC (capacity={QUEUE_CAPACITY}, iters={ITERATIONS}):");
    bench_throughput(producer_cpu, consumer_cpu);
    bench_bulk(producer_cpu, consumer_cpu);
    bench_rtt(producer_cpu, consumer_cpu);
}
