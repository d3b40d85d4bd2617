//! Shared plumbing for Window Protocols (spec §4.2–§4.9, §5 "Suspension
//! points"): every event-driven await is paired with a deadline, and every
//! suspension point also checks the preemption signal, so no protocol can
//! block forever or ignore a higher-priority arrival mid-step.

use tokio::sync::broadcast;

use crate::clock::Deadline;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::queue::PreemptSignal;
use crate::types::ContainerSnapshot;

pub enum StepOutcome<T> {
    Event(T),
    Timeout,
    Preempted,
}

/// Await the next value off `rx`, racing `deadline` and the preemption
/// signal ("whichever wins unregisters the other", spec §5).
pub async fn await_event<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
    deadline: Deadline,
    preempt: &mut PreemptSignal,
) -> StepOutcome<T> {
    loop {
        if *preempt.borrow() {
            return StepOutcome::Preempted;
        }
        tokio::select! {
            res = rx.recv() => match res {
                Ok(value) => return StepOutcome::Event(value),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return StepOutcome::Timeout,
            },
            _ = tokio::time::sleep_until(deadline.instant().into()) => return StepOutcome::Timeout,
            changed = preempt.changed() => {
                if changed.is_err() || *preempt.borrow() {
                    return StepOutcome::Preempted;
                }
            }
        }
    }
}

pub async fn await_container(
    rx: &mut broadcast::Receiver<ContainerSnapshot>,
    deadline: Deadline,
    preempt: &mut PreemptSignal,
) -> StepOutcome<ContainerSnapshot> {
    await_event(rx, deadline, preempt).await
}

/// Convert a timed-out/preempted step into the shared error vocabulary.
/// every protocol's watchdog bottoms out here.
pub fn step_result<T>(outcome: StepOutcome<T>, timeout: std::time::Duration) -> OrchestratorResult<T> {
    match outcome {
        StepOutcome::Event(v) => Ok(v),
        StepOutcome::Timeout => Err(OrchestratorError::Timeout(timeout)),
        StepOutcome::Preempted => Err(OrchestratorError::Preempted),
    }
}

/// A no-op check used at the top of tight polling loops (spec §5: "Event-
/// driven awaits MUST be paired with a deadline"). Tight loops don't await
/// an event so they only need the preempt/deadline half of the contract.
pub fn check_preempted(preempt: &PreemptSignal) -> OrchestratorResult<()> {
    if *preempt.borrow() {
        Err(OrchestratorError::Preempted)
    } else {
        Ok(())
    }
}
