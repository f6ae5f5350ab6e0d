//! The planner state machine: NOTHING / DRAINING / BARRIER / DRAINING_UNORD / EXITED.

use super::item::{WorkClass, WorkItem};
use super::{PoolCore, PoolInner};
use crate::statem::StateId;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    Nothing,
    Draining,
    Barrier,
    DrainingUnord,
    Exited,
}

impl StateId for PlannerState {
    fn index(&self) -> u32 {
        match self {
            PlannerState::Nothing => 0,
            PlannerState::Draining => 1,
            PlannerState::Barrier => 2,
            PlannerState::DrainingUnord => 3,
            PlannerState::Exited => 4,
        }
    }

    fn allowed_next(&self) -> u64 {
        match self {
            // NOTHING -> DRAINING or EXITED
            PlannerState::Nothing => (1 << 1) | (1 << 4),
            // DRAINING -> BARRIER (ordered head is BAR) or NOTHING (queues empty)
            PlannerState::Draining => (1 << 2) | (1 << 0),
            // BARRIER -> DRAINING_UNORD (flush unordered first) or DRAINING (BAR consumed)
            PlannerState::Barrier => (1 << 3) | (1 << 1),
            // DRAINING_UNORD -> BARRIER (unordered drained, re-check BAR precondition)
            PlannerState::DrainingUnord => 1 << 2,
            PlannerState::Exited => 0,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            PlannerState::Nothing => "NOTHING",
            PlannerState::Draining => "DRAINING",
            PlannerState::Barrier => "BARRIER",
            PlannerState::DrainingUnord => "DRAINING_UNORD",
            PlannerState::Exited => "EXITED",
        }
    }
}

/// Push one item onto its addressed worker's inbox, tracking `in_flight`
/// for strictly-ordered items (barriers are ordered but are not counted:
/// the planner itself waits for `in_flight == 0` before consuming a
/// barrier, so counting the barrier would deadlock it against itself).
fn dispatch(inner: &mut PoolInner, core: &PoolCore, item: WorkItem) {
    let worker_id = item.worker_id;
    if let WorkClass::Ordered(_) = item.class() {
        inner.in_flight += 1;
    }
    inner.worker_inboxes[worker_id].push_back(item);
    core.worker_cvs[worker_id].notify_one();
}

/// Pick the next item to dispatch, alternating preference between the
/// ordered and unordered queues so neither starves the other.
///
/// Callers must ensure the ordered queue's front (if any) is not a barrier
/// before calling this; the `DRAINING` loop checks that first.
fn pop_one(inner: &mut PoolInner) -> WorkItem {
    inner.qos = inner.qos.wrapping_add(1);
    let unordered_first = inner.qos % 2 == 1;
    if unordered_first {
        inner
            .unordered
            .pop_front()
            .or_else(|| inner.ordered.pop_front())
            .expect("pop_one called with both queues empty")
    } else {
        inner
            .ordered
            .pop_front()
            .or_else(|| inner.unordered.pop_front())
            .expect("pop_one called with both queues empty")
    }
}

/// The planner thread's main loop. Holds the pool mutex for the entire
/// function body except while blocked inside `planner_cv.wait` — acquiring
/// it once up front (rather than per iteration) is what makes that true;
/// re-locking every iteration would self-deadlock the planner against its
/// own still-held guard.
pub(crate) fn run(core: Arc<PoolCore>) {
    let mut inner = core.inner.lock().unwrap();
    loop {
        match inner.planner_sm.current() {
            PlannerState::Nothing => {
                while inner.ordered.is_empty() && inner.unordered.is_empty() && !inner.exiting {
                    inner = core.planner_cv.wait(inner).unwrap();
                }
                if inner.exiting && inner.ordered.is_empty() && inner.unordered.is_empty() {
                    inner.planner_sm.transition(PlannerState::Exited);
                    break;
                }
                inner.planner_sm.transition(PlannerState::Draining);
            }
            PlannerState::Draining => {
                if inner.ordered.is_empty() && inner.unordered.is_empty() {
                    inner.planner_sm.transition(PlannerState::Nothing);
                } else if inner
                    .ordered
                    .front()
                    .map(|front| front.class().is_barrier())
                    .unwrap_or(false)
                {
                    inner.planner_sm.transition(PlannerState::Barrier);
                } else {
                    let item = pop_one(&mut inner);
                    trace!(worker_id = item.worker_id, "dispatching item");
                    dispatch(&mut inner, &core, item);
                }
            }
            PlannerState::Barrier => {
                if !inner.unordered.is_empty() {
                    inner.planner_sm.transition(PlannerState::DrainingUnord);
                } else if inner.in_flight == 0 {
                    let bar = inner
                        .ordered
                        .pop_front()
                        .expect("BARRIER precondition: ordered head is a barrier");
                    dispatch(&mut inner, &core, bar);
                    inner.planner_sm.transition(PlannerState::Draining);
                } else {
                    inner = core.planner_cv.wait(inner).unwrap();
                }
            }
            PlannerState::DrainingUnord => {
                while let Some(item) = inner.unordered.pop_front() {
                    dispatch(&mut inner, &core, item);
                }
                inner.planner_sm.transition(PlannerState::Barrier);
            }
            PlannerState::Exited => unreachable!("loop breaks before re-matching Exited"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statem::StateMachine;

    #[test]
    fn full_lifecycle_is_legal() {
        let mut sm = StateMachine::new(PlannerState::Nothing);
        sm.transition(PlannerState::Draining);
        sm.transition(PlannerState::Barrier);
        sm.transition(PlannerState::DrainingUnord);
        sm.transition(PlannerState::Barrier);
        sm.transition(PlannerState::Draining);
        sm.transition(PlannerState::Nothing);
        sm.transition(PlannerState::Exited);
        assert_eq!(sm.current(), PlannerState::Exited);
    }

    #[test]
    #[should_panic(expected = "illegal state transition")]
    fn nothing_cannot_jump_to_barrier() {
        let mut sm = StateMachine::new(PlannerState::Nothing);
        sm.transition(PlannerState::Barrier);
    }

    #[test]
    fn in_flight_zero_invariant_enforced_in_nothing() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let in_flight = Arc::new(AtomicU32::new(0));
        let in_flight2 = in_flight.clone();
        let mut sm = StateMachine::new(PlannerState::Draining).with_invariant(move |_old, new| {
            if new == PlannerState::Nothing {
                assert_eq!(in_flight2.load(Ordering::SeqCst), 0);
            }
        });
        sm.transition(PlannerState::Nothing);
    }
}
