use crate::domain::model::Measurement;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

/// Operations between two checks of the stop flag.
const BATCH: u64 = 16;

/// Thread layout of one run. Background threads load the cell but are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadPlan {
    pub readers: usize,
    pub writers: usize,
    pub background_readers: usize,
    pub background_writers: usize,
}

impl ThreadPlan {
    pub fn readers(readers: usize) -> Self {
        Self {
            readers,
            ..Self::default()
        }
    }

    pub fn writers(writers: usize) -> Self {
        Self {
            writers,
            ..Self::default()
        }
    }

    pub fn with_background_readers(mut self, count: usize) -> Self {
        self.background_readers = count;
        self
    }

    pub fn with_background_writers(mut self, count: usize) -> Self {
        self.background_writers = count;
        self
    }

    pub fn total_threads(&self) -> usize {
        self.readers + self.writers + self.background_readers + self.background_writers
    }
}

/// Busy-waits for `nanos` to stand in for work done while holding a version.
pub fn simulate_work(nanos: u64) {
    if nanos == 0 {
        return;
    }
    let target = Duration::from_nanos(nanos);
    let start = Instant::now();
    while start.elapsed() < target {
        std::hint::spin_loop();
    }
}

/// Runs `plan` against `cell` for roughly `duration` and counts completed operations.
///
/// All threads start together behind a barrier. Writers get their own
/// deterministic RNG so scenarios can pick random slots. A panicking worker
/// turns into `Err` with the panic message once every thread has been joined.
pub fn measure<C, R, W>(
    cell: &C,
    plan: ThreadPlan,
    duration: Duration,
    read_op: R,
    write_op: W,
) -> std::result::Result<Measurement, String>
where
    C: Sync + ?Sized,
    R: Fn(&C) + Sync,
    W: Fn(&C, &mut StdRng) + Sync,
{
    let start_line = &Barrier::new(plan.total_threads() + 1);
    let stop = &AtomicBool::new(false);
    let read_op = &read_op;
    let write_op = &write_op;

    thread::scope(|s| {
        let mut readers = Vec::with_capacity(plan.readers + plan.background_readers);
        let mut writers = Vec::with_capacity(plan.writers + plan.background_writers);

        for _ in 0..plan.readers + plan.background_readers {
            readers.push(s.spawn(move || {
                start_line.wait();
                run_until_stopped(stop, || read_op(cell))
            }));
        }
        for seed in 0..plan.writers + plan.background_writers {
            writers.push(s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed as u64);
                start_line.wait();
                run_until_stopped(stop, || write_op(cell, &mut rng))
            }));
        }

        start_line.wait();
        let started = Instant::now();
        thread::sleep(duration);
        stop.store(true, Ordering::Relaxed);

        let mut measurement = Measurement::default();
        let mut failure = None;

        // Measured threads were spawned first in each group.
        for (index, handle) in readers.into_iter().enumerate() {
            match handle.join() {
                Ok(ops) if index < plan.readers => measurement.reads += ops,
                Ok(_) => {}
                Err(panic) => failure = Some(panic_message(panic.as_ref())),
            }
        }
        for (index, handle) in writers.into_iter().enumerate() {
            match handle.join() {
                Ok(ops) if index < plan.writers => measurement.writes += ops,
                Ok(_) => {}
                Err(panic) => failure = Some(panic_message(panic.as_ref())),
            }
        }
        measurement.elapsed = started.elapsed();

        match failure {
            Some(message) => Err(message),
            None => Ok(measurement),
        }
    })
}

fn run_until_stopped(stop: &AtomicBool, mut op: impl FnMut()) -> u64 {
    let mut ops = 0;
    while !stop.load(Ordering::Relaxed) {
        for _ in 0..BATCH {
            op();
        }
        ops += BATCH;
    }
    ops
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
