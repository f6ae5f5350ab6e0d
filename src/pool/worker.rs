//! Worker thread main loop.

use super::item::WorkClass;
use super::PoolCore;
use std::sync::Arc;
use tracing::trace;

/// A worker's main loop: wait for its inbox to be non-empty, pop one item,
/// run its work callback with no pool locks held, push it to the completion
/// queue, then re-acquire the pool mutex only to adjust `in_flight`.
pub(crate) fn run(core: Arc<PoolCore>, id: usize) {
    loop {
        let mut inner = core.inner.lock().unwrap();
        while inner.worker_inboxes[id].is_empty() && !inner.exiting {
            inner = core.worker_cvs[id].wait(inner).unwrap();
        }
        let item = match inner.worker_inboxes[id].pop_front() {
            Some(item) => item,
            None => break, // exiting and inbox drained
        };
        drop(inner);

        let class = item.class();
        let mut item = item;
        item.run_work();
        trace!(worker = id, ?class, "work callback complete");

        {
            let mut output = core.output.lock().unwrap();
            output.push_back(item);
        }
        core.output_cv.notify_one();

        if let WorkClass::Ordered(_) = class {
            let mut inner = core.inner.lock().unwrap();
            inner.in_flight -= 1;
            if inner.in_flight == 0 {
                core.planner_cv.notify_one();
            }
        }
    }
}
