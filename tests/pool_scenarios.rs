//! Integration coverage for the barrier-separated ordered/unordered pool.

use latticedb_pool::config::PoolConfig;
use latticedb_pool::pool::{Pool, WorkClass};
use std::sync::{Arc, Mutex};

fn small_pool() -> Pool {
    Pool::new(PoolConfig {
        threadpool_size: 4,
        trace_enabled: false,
    })
}

/// `SPEC_FULL.md` §8 scenario 6: two ORD1 items, a BAR, another ORD1, and an
/// UNORD, all addressed to worker 0 via a shared cookie. The two leading
/// ORD1 items must complete before the barrier resolves, the barrier must
/// wait for them, and the trailing ORD1 must start only after the barrier.
#[test]
fn ordered_then_barrier_then_ordered_preserves_era_boundary() {
    let pool = small_pool();
    let log = Arc::new(Mutex::new(Vec::new()));

    let l1 = log.clone();
    pool.submit(WorkClass::Ordered(1), 1, move || l1.lock().unwrap().push("ord1-a"), || {});
    let l2 = log.clone();
    pool.submit(WorkClass::Ordered(1), 1, move || l2.lock().unwrap().push("ord1-b"), || {});
    let l3 = log.clone();
    pool.submit_barrier(1, move || l3.lock().unwrap().push("barrier"));
    let l4 = log.clone();
    pool.submit(WorkClass::Ordered(1), 1, move || l4.lock().unwrap().push("ord1-c"), || {});
    let l5 = log.clone();
    pool.submit(WorkClass::Unordered, 99, move || l5.lock().unwrap().push("unord"), || {});

    let mut completed = 0;
    while completed < 5 {
        completed += pool.drain_completions_blocking();
    }

    let observed = log.lock().unwrap().clone();
    let barrier_pos = observed.iter().position(|s| *s == "barrier").unwrap();
    let c_pos = observed.iter().position(|s| *s == "ord1-c").unwrap();
    let a_pos = observed.iter().position(|s| *s == "ord1-a").unwrap();
    let b_pos = observed.iter().position(|s| *s == "ord1-b").unwrap();
    let unord_pos = observed.iter().position(|s| *s == "unord").unwrap();

    assert!(a_pos < barrier_pos);
    assert!(b_pos < barrier_pos);
    assert!(barrier_pos < c_pos);
    // The barrier drains any already-pending unordered work before it
    // resolves, so the UNORD submitted ahead of it is dispatched first.
    assert!(unord_pos < barrier_pos);

    pool.shutdown();
}

#[test]
fn many_unordered_items_across_many_workers_all_complete() {
    let pool = Pool::new(PoolConfig {
        threadpool_size: 8,
        trace_enabled: false,
    });
    let total = Arc::new(Mutex::new(0usize));
    for i in 0..200u64 {
        let total = total.clone();
        pool.submit(WorkClass::Unordered, i, move || *total.lock().unwrap() += 1, || {});
    }
    let mut completed = 0;
    while completed < 200 {
        completed += pool.drain_completions_blocking();
    }
    assert_eq!(*total.lock().unwrap(), 200);
    pool.shutdown();
}

#[test]
fn shutdown_with_pending_barrier_drains_in_flight_work_first() {
    let pool = small_pool();
    let ran = Arc::new(Mutex::new(false));
    let r = ran.clone();
    pool.submit(WorkClass::Ordered(5), 5, move || *r.lock().unwrap() = true, || {});
    pool.submit_barrier(5, || {});

    // Drain once so the ordered item and barrier resolve before shutdown
    // asserts the queues are empty.
    let mut completed = 0;
    while completed < 2 {
        completed += pool.drain_completions_blocking();
    }
    assert!(*ran.lock().unwrap());
    pool.shutdown();
}
