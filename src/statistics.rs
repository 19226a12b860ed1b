//! statistics.rs — per-tag counters and the aggregate results the CLI
//! reports, plus the id-indexed listener-list primitive events are
//! published through.
//!
//! Grounded on `pysim/objects.py`'s `Listeners` class (append/remove/call
//! addressed by an opaque id) and on the three headline metrics computed
//! at the end of a run: rounds per tag, inventory probability, TID read
//! probability.

use std::collections::HashMap;

/// Generic id-indexed listener list. `add` returns a handle that `remove`
/// later accepts; `call` runs every registered closure in registration
/// order.
pub struct Listeners<T> {
    next_id: usize,
    handlers: Vec<(usize, Box<dyn FnMut(&T)>)>,
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Listeners { next_id: 0, handlers: Vec::new() }
    }

    pub fn add(&mut self, f: impl FnMut(&T) + 'static) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.push((id, Box::new(f)));
        id
    }

    pub fn remove(&mut self, id: usize) {
        self.handlers.retain(|(i, _)| *i != id);
    }

    pub fn call(&mut self, arg: &T) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(arg);
        }
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TagRecord {
    pub tag_id: u64,
    pub rounds_attained: u32,
    pub num_successful_inventories: u32,
    pub num_successful_tid_reads: u32,
}

pub struct TagReadEvent {
    pub tag_id: u64,
    pub record: TagRecord,
}

pub struct Statistics {
    records: HashMap<u64, TagRecord>,
    pub slot_end_listeners: Listeners<TagReadEvent>,
}

impl Statistics {
    pub fn new() -> Self {
        Statistics { records: HashMap::new(), slot_end_listeners: Listeners::new() }
    }

    pub fn register_tag(&mut self, tag_id: u64) {
        self.records.entry(tag_id).or_insert(TagRecord { tag_id, ..Default::default() });
    }

    pub fn record_round(&mut self, tag_id: u64) {
        if let Some(r) = self.records.get_mut(&tag_id) {
            r.rounds_attained += 1;
        }
    }

    pub fn record_inventory_success(&mut self, tag_id: u64) {
        if let Some(r) = self.records.get_mut(&tag_id) {
            r.num_successful_inventories += 1;
        }
        self.notify_slot_end(tag_id);
    }

    pub fn record_tid_read_success(&mut self, tag_id: u64) {
        if let Some(r) = self.records.get_mut(&tag_id) {
            r.num_successful_tid_reads += 1;
        }
        self.notify_slot_end(tag_id);
    }

    fn notify_slot_end(&mut self, tag_id: u64) {
        if let Some(record) = self.records.get(&tag_id).cloned() {
            self.slot_end_listeners.call(&TagReadEvent { tag_id, record });
        }
    }

    pub fn num_tags(&self) -> usize {
        self.records.len()
    }

    pub fn avg_rounds_per_tag(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let total: u32 = self.records.values().map(|r| r.rounds_attained).sum();
        total as f64 / self.records.len() as f64
    }

    pub fn inventory_probability(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let inventoried = self.records.values().filter(|r| r.num_successful_inventories > 0).count();
        inventoried as f64 / self.records.len() as f64
    }

    pub fn read_tid_probability(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let read = self.records.values().filter(|r| r.num_successful_tid_reads > 0).count();
        read as f64 / self.records.len() as f64
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_fire_in_registration_order_and_respect_removal() {
        let mut l: Listeners<i32> = Listeners::new();
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let log_a = log.clone();
        let id_a = l.add(move |x| log_a.borrow_mut().push(("a", *x)));
        let log_b = log.clone();
        l.add(move |x| log_b.borrow_mut().push(("b", *x)));
        l.call(&1);
        l.remove(id_a);
        l.call(&2);
        assert_eq!(*log.borrow(), vec![("a", 1), ("b", 1), ("b", 2)]);
    }

    #[test]
    fn aggregate_metrics_over_three_tags() {
        let mut s = Statistics::new();
        for id in 1..=3u64 {
            s.register_tag(id);
        }
        s.record_round(1);
        s.record_round(1);
        s.record_round(2);
        s.record_inventory_success(1);
        s.record_inventory_success(2);
        s.record_tid_read_success(1);

        assert!((s.avg_rounds_per_tag() - 1.0).abs() < 1e-9);
        assert!((s.inventory_probability() - 2.0 / 3.0).abs() < 1e-9);
        assert!((s.read_tid_probability() - 1.0 / 3.0).abs() < 1e-9);
    }
}
