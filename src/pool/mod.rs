//! The custom cooperative thread pool (component C): a planner thread and N
//! worker threads, two producer queues (ordered, unordered) separated by
//! barriers, one inbox per worker, and a completion queue drained by the
//! caller's "loop thread".
//!
//! Grounded on `GssMahadevan-gvthread/crates/gvthread-runtime/src/worker.rs`
//! for the OS-thread `WorkerPool` scaffolding (named `thread::Builder`
//! spawns, an `exiting` flag, per-worker wake primitives) and on
//! `other_examples/.../libsql-server-server-src-worker_pool.rs` for the
//! producer/worker split. The barrier-separated planner algorithm itself has
//! no direct analogue in the pack; see `DESIGN.md`.

mod item;
mod planner;
mod worker;

pub use item::{WorkClass, WorkItem};
pub use planner::PlannerState;

use crate::config::PoolConfig;
use crate::queue::Queue;
use crate::statem::StateMachine;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, trace};

pub(crate) struct PoolInner {
    ordered: Queue<WorkItem>,
    unordered: Queue<WorkItem>,
    worker_inboxes: Vec<Queue<WorkItem>>,
    in_flight: usize,
    planner_sm: StateMachine<PlannerState>,
    last_ordered_class: Option<u32>,
    exiting: bool,
    qos: u8,
}

pub(crate) struct PoolCore {
    inner: Mutex<PoolInner>,
    planner_cv: Condvar,
    worker_cvs: Vec<Condvar>,
    output: Mutex<Queue<WorkItem>>,
    output_cv: Condvar,
    n_workers: usize,
}

/// The pool. Owns the planner and worker threads; `shutdown` joins them.
pub struct Pool {
    core: Arc<PoolCore>,
    planner_handle: Option<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl Pool {
    pub fn new(cfg: PoolConfig) -> Self {
        cfg.validate().expect("invalid pool configuration");
        let n = cfg.threadpool_size;

        let inner = PoolInner {
            ordered: Queue::new(),
            unordered: Queue::new(),
            worker_inboxes: (0..n).map(|_| Queue::new()).collect(),
            in_flight: 0,
            planner_sm: StateMachine::new(PlannerState::Nothing),
            last_ordered_class: None,
            exiting: false,
            qos: 0,
        };

        let core = Arc::new(PoolCore {
            inner: Mutex::new(inner),
            planner_cv: Condvar::new(),
            worker_cvs: (0..n).map(|_| Condvar::new()).collect(),
            output: Mutex::new(Queue::new()),
            output_cv: Condvar::new(),
            n_workers: n,
        });

        let planner_core = core.clone();
        let planner_handle = std::thread::Builder::new()
            .name("pool-planner".into())
            .spawn(move || planner::run(planner_core))
            .expect("failed to spawn planner thread");

        let worker_handles = (0..n)
            .map(|id| {
                let worker_core = core.clone();
                std::thread::Builder::new()
                    .name(format!("pool-worker-{id}"))
                    .spawn(move || worker::run(worker_core, id))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            core,
            planner_handle: Some(planner_handle),
            worker_handles,
        }
    }

    /// Submit a work item. Panics if `class` is an ordered class that
    /// interleaves with a different ordered class without an intervening
    /// barrier (`SPEC_FULL.md` §9's resolved precondition), or if called
    /// after `shutdown` has begun.
    pub fn submit(
        &self,
        class: WorkClass,
        cookie: u64,
        work: impl FnOnce() + Send + 'static,
        after_work: impl FnOnce() + Send + 'static,
    ) {
        let worker_id = (cookie as usize) % self.core.n_workers;
        let mut item = WorkItem::new(cookie, class, work, after_work);
        item.worker_id = worker_id;

        let mut inner = self.core.inner.lock().unwrap();
        if inner.exiting {
            tracing::error!("submit called on a pool that has begun shutdown");
            panic!("submit called on a pool that has begun shutdown");
        }

        match class {
            WorkClass::Barrier => {
                inner.last_ordered_class = None;
                inner.ordered.push_back(item);
            }
            WorkClass::Ordered(c) => {
                if let Some(prev) = inner.last_ordered_class {
                    if prev != c {
                        tracing::error!(class = c, prev, "ordered class submitted without an intervening barrier");
                        panic!("ordered class {c} submitted without a barrier after class {prev}");
                    }
                }
                inner.last_ordered_class = Some(c);
                inner.ordered.push_back(item);
            }
            WorkClass::Unordered => {
                inner.unordered.push_back(item);
            }
        }
        trace!(?class, cookie, "submitted work item");
        self.core.planner_cv.notify_one();
    }

    /// Convenience wrapper for a pure synchronization point.
    pub fn submit_barrier(&self, cookie: u64, after_work: impl FnOnce() + Send + 'static) {
        let worker_id = (cookie as usize) % self.core.n_workers;
        let mut item = WorkItem::barrier(cookie, after_work);
        item.worker_id = worker_id;

        let mut inner = self.core.inner.lock().unwrap();
        if inner.exiting {
            tracing::error!("submit_barrier called on a pool that has begun shutdown");
            panic!("submit_barrier called on a pool that has begun shutdown");
        }
        inner.last_ordered_class = None;
        inner.ordered.push_back(item);
        self.core.planner_cv.notify_one();
    }

    /// Block until at least one item has completed, then run every ready
    /// item's `after_work` callback on the calling thread (the "loop
    /// thread"). Returns the number of callbacks run.
    pub fn drain_completions_blocking(&self) -> usize {
        let mut output = self.core.output.lock().unwrap();
        while output.is_empty() {
            output = self.core.output_cv.wait(output).unwrap();
        }
        let mut local = Queue::new();
        output.splice_onto(&mut local);
        drop(output);

        let mut count = 0;
        while let Some(item) = local.pop_front() {
            item.run_after_work();
            count += 1;
        }
        count
    }

    /// Non-blocking variant of `drain_completions_blocking`.
    pub fn try_drain_completions(&self) -> usize {
        let mut output = self.core.output.lock().unwrap();
        if output.is_empty() {
            return 0;
        }
        let mut local = Queue::new();
        output.splice_onto(&mut local);
        drop(output);

        let mut count = 0;
        while let Some(item) = local.pop_front() {
            item.run_after_work();
            count += 1;
        }
        count
    }

    /// Begin shutdown: stop accepting new submissions, wake every thread,
    /// and join. Any pending barrier with `in_flight > 0` blocks this call
    /// until the in-flight ordered work drains, by design.
    pub fn shutdown(mut self) {
        {
            let mut inner = self.core.inner.lock().unwrap();
            inner.exiting = true;
        }
        self.core.planner_cv.notify_all();
        for cv in &self.core.worker_cvs {
            cv.notify_all();
        }

        if let Some(h) = self.planner_handle.take() {
            h.join().expect("planner thread panicked");
        }
        for h in self.worker_handles.drain(..) {
            h.join().expect("worker thread panicked");
        }

        // Drain whatever completed during shutdown so after_work callbacks
        // still run; nothing should remain queued afterward.
        while self.try_drain_completions() > 0 {}

        let inner = self.core.inner.lock().unwrap();
        if !inner.ordered.is_empty() {
            tracing::error!("ordered queue non-empty at shutdown");
            panic!("ordered queue non-empty at shutdown");
        }
        if !inner.unordered.is_empty() {
            tracing::error!("unordered queue non-empty at shutdown");
            panic!("unordered queue non-empty at shutdown");
        }
        if inner.in_flight != 0 {
            tracing::error!(in_flight = inner.in_flight, "in-flight work remained at shutdown");
            panic!("in-flight work remained at shutdown");
        }
        debug!("pool shutdown complete");
    }
}
