//! Work items submitted to the pool.

/// The class a work item belongs to.
///
/// `Unordered` items carry no ordering guarantee relative to each other or
/// to ordered items within the same era. `Ordered(class)` items of the same
/// `class` execute in submission order on a deterministic worker. `Barrier`
/// is a zero-payload ordered item that separates eras (see `src/pool/planner.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkClass {
    Unordered,
    Ordered(u32),
    Barrier,
}

impl WorkClass {
    pub fn is_ordered(&self) -> bool {
        matches!(self, WorkClass::Ordered(_) | WorkClass::Barrier)
    }

    pub fn is_barrier(&self) -> bool {
        matches!(self, WorkClass::Barrier)
    }
}

/// A unit of work moving through the pool.
///
/// `work` runs on a worker thread. `after_work` runs later on the loop
/// thread once the item has been drained from the completion queue, with no
/// pool locks held. Both are boxed `FnOnce` closures rather than a
/// function-pointer-plus-context pair, the idiomatic Rust stand-in for that
/// capability shape.
pub struct WorkItem {
    pub(crate) cookie: u64,
    pub(crate) class: WorkClass,
    pub(crate) worker_id: usize,
    work: Option<Box<dyn FnOnce() + Send>>,
    after_work: Option<Box<dyn FnOnce() + Send>>,
}

impl WorkItem {
    pub fn new(
        cookie: u64,
        class: WorkClass,
        work: impl FnOnce() + Send + 'static,
        after_work: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            cookie,
            class,
            worker_id: 0,
            work: Some(Box::new(work)),
            after_work: Some(Box::new(after_work)),
        }
    }

    /// A barrier item: no work to run, only a synchronization point.
    pub fn barrier(cookie: u64, after_work: impl FnOnce() + Send + 'static) -> Self {
        Self::new(cookie, WorkClass::Barrier, || {}, after_work)
    }

    pub fn class(&self) -> WorkClass {
        self.class
    }

    /// Run the work callback. Panics if called twice; the planner/worker
    /// contract guarantees exactly one call.
    pub fn run_work(&mut self) {
        let work = self.work.take().expect("work callback already consumed");
        work();
    }

    /// Run the after-work callback on the loop thread.
    pub fn run_after_work(mut self) {
        let after_work = self
            .after_work
            .take()
            .expect("after_work callback already consumed");
        after_work();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn work_and_after_work_both_run() {
        let ran_work = Arc::new(AtomicBool::new(false));
        let ran_after = Arc::new(AtomicBool::new(false));
        let w1 = ran_work.clone();
        let w2 = ran_after.clone();
        let mut item = WorkItem::new(
            0,
            WorkClass::Unordered,
            move || w1.store(true, Ordering::SeqCst),
            move || w2.store(true, Ordering::SeqCst),
        );
        item.run_work();
        assert!(ran_work.load(Ordering::SeqCst));
        assert!(!ran_after.load(Ordering::SeqCst));
        item.run_after_work();
        assert!(ran_after.load(Ordering::SeqCst));
    }

    #[test]
    fn barrier_is_ordered_and_has_noop_work() {
        let item = WorkItem::barrier(0, || {});
        assert!(item.class().is_barrier());
        assert!(item.class().is_ordered());
    }
}
