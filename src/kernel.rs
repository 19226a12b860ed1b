//! kernel.rs — deterministic discrete-event kernel.
//!
//! Grounded on `pysim/simulator.py`'s `EventQueue`/`Kernel`: a priority
//! queue of `(time, sequence_number, callback)` records, FIFO tie-breaking
//! by insertion order, and cancellation by tombstoning rather than heap
//! removal. Rust's `BinaryHeap` is a max-heap, so the queue key is wrapped
//! in `Reverse`, and `f64` does not implement `Ord` so it is wrapped in
//! `OrderedTime`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::ModelError;

/// Opaque handle returned by `schedule`/`call`, passed to `cancel`.
pub type EventId = u64;

/// A scheduled action. Boxed so callbacks can capture whatever state they
/// need by closure, the idiomatic replacement for Python's `*args/**kwargs`
/// partial application. Returning `Err` aborts the run: a model contract
/// violation, not a simulated physical event.
pub type Callback<Ctx> = Box<dyn FnOnce(&mut Kernel<Ctx>) -> Result<(), ModelError>>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderedTime(f64);

impl Eq for OrderedTime {}

impl PartialOrd for OrderedTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Simulation time is never NaN in this domain.
        self.0.partial_cmp(&other.0).expect("simulation time must not be NaN")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    time: OrderedTime,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    Ready,
    Running,
    Stopped,
}

/// Simulation kernel, generic over the user-provided context type (the
/// model: reader, tags, medium, statistics — see `scheduler::Model`).
pub struct Kernel<Ctx> {
    pub context: Ctx,
    pub max_simulation_time: Option<f64>,
    pub max_real_time: Option<f64>,
    pub rng: StdRng,

    state: KernelState,
    heap: BinaryHeap<Reverse<EventKey>>,
    pending: HashMap<u64, Callback<Ctx>>,
    next_id: u64,
    sim_time: f64,
    t_start: Option<Instant>,
    t_stop: Option<Instant>,
    num_events_served: u64,
    user_stop: bool,
}

impl<Ctx> Kernel<Ctx> {
    pub fn new(context: Ctx) -> Self {
        Self::with_seed(context, None)
    }

    /// `seed = None` draws entropy from the OS; `Some(seed)` gives
    /// reproducible runs, as required for the seeded end-to-end scenarios.
    pub fn with_seed(context: Ctx, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Kernel {
            context,
            max_simulation_time: None,
            max_real_time: None,
            rng,
            state: KernelState::Ready,
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_id: 0,
            sim_time: 0.0,
            t_start: None,
            t_stop: None,
            num_events_served: 0,
            user_stop: false,
        }
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn time(&self) -> f64 {
        self.sim_time
    }

    pub fn num_events_served(&self) -> u64 {
        self.num_events_served
    }

    pub fn queue_size(&self) -> usize {
        self.pending.len()
    }

    /// Schedule `callback` to fire `dt` seconds from now. `dt` must be
    /// non-negative; the kernel never runs backwards.
    pub fn schedule(&mut self, dt: f64, callback: Callback<Ctx>) -> EventId {
        let id = self.next_id;
        self.next_id += 1;
        let key = EventKey { time: OrderedTime(self.sim_time + dt), seq: id };
        self.heap.push(Reverse(key));
        self.pending.insert(id, callback);
        id
    }

    /// Schedule `callback` to fire at the current time, after the running
    /// callback returns but before any event with a strictly later
    /// timestamp — the `dt = 0` case.
    pub fn call(&mut self, callback: Callback<Ctx>) -> EventId {
        self.schedule(0.0, callback)
    }

    /// `id` is a no-op if already fired or already cancelled. Matches the
    /// Python queue's `cancel`, which tolerates `event_id = None`.
    pub fn cancel(&mut self, id: Option<EventId>) {
        if let Some(id) = id {
            self.pending.remove(&id);
        }
    }

    pub fn stop(&mut self) {
        self.user_stop = true;
    }

    pub fn real_time_elapsed(&self) -> f64 {
        match self.state {
            KernelState::Ready => 0.0,
            KernelState::Running => self.t_start.expect("running kernel has t_start").elapsed().as_secs_f64(),
            KernelState::Stopped => match (self.t_start, self.t_stop) {
                (Some(start), Some(stop)) => stop.duration_since(start).as_secs_f64(),
                _ => 0.0,
            },
        }
    }

    fn test_stop_conditions(&self) -> bool {
        if let Some(max_t) = self.max_simulation_time {
            if self.sim_time > max_t {
                return true;
            }
        }
        if let Some(max_rt) = self.max_real_time {
            if self.real_time_elapsed() > max_rt {
                return true;
            }
        }
        self.user_stop
    }

    /// Pop the next live event, skipping tombstoned ones, or `None` if the
    /// queue is exhausted of live events.
    fn pop(&mut self) -> Option<(f64, Callback<Ctx>)> {
        while let Some(Reverse(key)) = self.heap.pop() {
            if let Some(cb) = self.pending.remove(&key.seq) {
                return Some((key.time.0, cb));
            }
        }
        None
    }

    /// Run the simulation starting from `entry`. Refuses re-entry once the
    /// kernel has left the READY state — matching the Python kernel's
    /// `RuntimeError` on the same condition, but surfaced as a structured
    /// error rather than a panic. A callback returning `Err` aborts the run
    /// the same way.
    pub fn run(&mut self, entry: Callback<Ctx>) -> Result<(), ModelError> {
        if self.state != KernelState::Ready {
            return Err(ModelError::KernelNotReady);
        }
        self.state = KernelState::Running;
        self.num_events_served = 0;
        self.t_start = Some(Instant::now());
        self.schedule(0.0, entry);

        let result = loop {
            if self.pending.is_empty() || self.test_stop_conditions() {
                break Ok(());
            }
            let (t, callback) = match self.pop() {
                Some(next) => next,
                None => break Ok(()),
            };
            self.sim_time = t;
            if let Err(e) = callback(self) {
                break Err(e);
            }
            self.num_events_served += 1;
        };

        self.state = KernelState::Stopped;
        self.t_stop = Some(Instant::now());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> Kernel<Vec<(f64, u32)>> {
        Kernel::new(Vec::new())
    }

    #[test]
    fn events_fire_in_nondecreasing_time_order() {
        let mut k = kernel();
        k.run(Box::new(|k| {
            k.schedule(3.0, Box::new(|k| { k.context.push((k.time(), 3)); Ok(()) }));
            k.schedule(1.0, Box::new(|k| { k.context.push((k.time(), 1)); Ok(()) }));
            k.schedule(2.0, Box::new(|k| { k.context.push((k.time(), 2)); Ok(()) }));
            Ok(())
        })).unwrap();
        let times: Vec<f64> = k.context.iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn equal_times_fire_in_insertion_order() {
        let mut k = kernel();
        k.run(Box::new(|k| {
            k.schedule(1.0, Box::new(|k| { k.context.push((k.time(), 1)); Ok(()) }));
            k.schedule(1.0, Box::new(|k| { k.context.push((k.time(), 2)); Ok(()) }));
            k.schedule(1.0, Box::new(|k| { k.context.push((k.time(), 3)); Ok(()) }));
            Ok(())
        })).unwrap();
        let order: Vec<u32> = k.context.iter().map(|(_, id)| *id).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn cancelled_event_never_fires_and_queue_shrinks() {
        let mut k = kernel();
        k.run(Box::new(|k| {
            let id = k.schedule(1.0, Box::new(|k| { k.context.push((k.time(), 1)); Ok(()) }));
            let before = k.queue_size();
            k.cancel(Some(id));
            assert_eq!(k.queue_size(), before - 1);
            Ok(())
        })).unwrap();
        assert!(k.context.is_empty());
    }

    #[test]
    fn cancel_none_is_a_noop() {
        let mut k = kernel();
        k.cancel(None);
        assert_eq!(k.queue_size(), 0);
    }

    #[test]
    fn call_runs_strictly_after_current_callback_at_same_time() {
        let mut k = kernel();
        k.run(Box::new(|k| {
            k.context.push((k.time(), 0));
            k.call(Box::new(|k| { k.context.push((k.time(), 1)); Ok(()) }));
            Ok(())
        })).unwrap();
        assert_eq!(k.context, vec![(0.0, 0), (0.0, 1)]);
    }

    #[test]
    fn reentrant_run_returns_kernel_not_ready() {
        let mut k: Kernel<()> = Kernel::new(());
        let result = k.run(Box::new(|k| {
            let inner = k.run(Box::new(|_| Ok(())));
            assert!(matches!(inner, Err(ModelError::KernelNotReady)));
            Ok(())
        }));
        assert!(result.is_ok());
    }

    #[test]
    fn stop_halts_the_loop() {
        let mut k = kernel();
        k.run(Box::new(|k| {
            k.stop();
            k.schedule(1.0, Box::new(|k| { k.context.push((k.time(), 99)); Ok(()) }));
            Ok(())
        })).unwrap();
        assert!(k.context.is_empty());
        assert_eq!(k.state(), KernelState::Stopped);
    }
}
