//! Evaluation of composite jobs from the statuses of their children.
//!
//! A composite job never runs anything itself. Its status, and which of
//! its children should be dispatched or cancelled next, is a pure function
//! of the (ordered) child statuses. The engine applies the evaluation and
//! re-evaluates until it reaches a fixed point, so applying the same
//! evaluation twice is harmless.

use crate::jobs::JobMethod;
use crate::status::JobStatus;

/// Outcome of evaluating a composite job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeEvaluation {
    /// Aggregate status of the composite job.
    pub status: JobStatus,
    /// Indices of `WAITING` children that should be dispatched now.
    pub dispatch: Vec<usize>,
    /// Indices of `WAITING` children that must never run and should be
    /// cancelled.
    pub cancel: Vec<usize>,
}

impl CompositeEvaluation {
    fn settled(status: JobStatus) -> Self {
        Self {
            status,
            dispatch: Vec::new(),
            cancel: Vec::new(),
        }
    }
}

/// Evaluate a composite job.
///
/// - An empty child list is malformed and evaluates to `REJECTED`.
/// - `parallel`: `FAILURE` as soon as any child failed, `SUCCESS` when all
///   children succeeded, `CANCELLED` when all ended with at least one
///   cancellation, otherwise `RUNNING`. Waiting children are dispatched
///   unless the job already failed.
/// - `series`/`chain`: the first child that has not succeeded decides.
///   A waiting child is dispatched, a failed or cancelled child settles the
///   parent and the remaining waiting children are cancelled.
///
/// Atomic methods have no children and are never evaluated; passing one
/// is treated like a malformed graph.
pub fn evaluate(method: JobMethod, children: &[JobStatus]) -> CompositeEvaluation {
    if children.is_empty() || !method.is_composite() {
        return CompositeEvaluation::settled(JobStatus::Rejected);
    }

    if method.is_sequential() {
        evaluate_sequential(children)
    } else {
        evaluate_parallel(children)
    }
}

fn waiting_indices(children: &[JobStatus], from: usize) -> Vec<usize> {
    children
        .iter()
        .enumerate()
        .skip(from)
        .filter(|(_, s)| **s == JobStatus::Waiting)
        .map(|(i, _)| i)
        .collect()
}

fn evaluate_parallel(children: &[JobStatus]) -> CompositeEvaluation {
    if children.iter().any(|s| s.is_failed()) {
        return CompositeEvaluation {
            status: JobStatus::Failure,
            dispatch: Vec::new(),
            cancel: waiting_indices(children, 0),
        };
    }

    if children.iter().all(|s| s.is_terminal()) {
        let status = if children.contains(&JobStatus::Cancelled) {
            JobStatus::Cancelled
        } else {
            JobStatus::Success
        };
        return CompositeEvaluation::settled(status);
    }

    CompositeEvaluation {
        status: JobStatus::Running,
        dispatch: waiting_indices(children, 0),
        cancel: Vec::new(),
    }
}

fn evaluate_sequential(children: &[JobStatus]) -> CompositeEvaluation {
    for (index, status) in children.iter().enumerate() {
        match status {
            JobStatus::Success => continue,
            JobStatus::Waiting => {
                return CompositeEvaluation {
                    status: JobStatus::Running,
                    dispatch: vec![index],
                    cancel: Vec::new(),
                };
            }
            JobStatus::Failure | JobStatus::Rejected => {
                return CompositeEvaluation {
                    status: JobStatus::Failure,
                    dispatch: Vec::new(),
                    cancel: waiting_indices(children, index + 1),
                };
            }
            JobStatus::Cancelled => {
                return CompositeEvaluation {
                    status: JobStatus::Cancelled,
                    dispatch: Vec::new(),
                    cancel: waiting_indices(children, index + 1),
                };
            }
            _ => return CompositeEvaluation::settled(JobStatus::Running),
        }
    }
    CompositeEvaluation::settled(JobStatus::Success)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    #[test]
    fn empty_composite_is_rejected() {
        for method in [JobMethod::Parallel, JobMethod::Series, JobMethod::Chain] {
            assert_eq!(evaluate(method, &[]).status, Rejected);
        }
    }

    #[test]
    fn parallel_dispatches_all_waiting_children() {
        let eval = evaluate(JobMethod::Parallel, &[Waiting, Waiting, Waiting]);
        assert_eq!(eval.status, Running);
        assert_eq!(eval.dispatch, vec![0, 1, 2]);
        assert!(eval.cancel.is_empty());
    }

    #[test]
    fn parallel_succeeds_only_when_all_succeed() {
        assert_eq!(evaluate(JobMethod::Parallel, &[Success, Running]).status, Running);
        assert_eq!(evaluate(JobMethod::Parallel, &[Success, Success]).status, Success);
    }

    #[test]
    fn parallel_fails_on_first_failure_without_stopping_siblings() {
        let eval = evaluate(JobMethod::Parallel, &[Running, Failure, Dispatched]);
        assert_eq!(eval.status, Failure);
        assert!(eval.dispatch.is_empty());
        assert!(eval.cancel.is_empty(), "in-flight siblings are left to finish");
    }

    #[test]
    fn parallel_rejected_child_counts_as_failure() {
        let eval = evaluate(JobMethod::Parallel, &[Rejected, Waiting]);
        assert_eq!(eval.status, Failure);
        assert_eq!(eval.cancel, vec![1]);
    }

    #[test]
    fn parallel_all_ended_with_cancellation_is_cancelled() {
        assert_eq!(evaluate(JobMethod::Parallel, &[Success, Cancelled]).status, Cancelled);
        assert_eq!(evaluate(JobMethod::Parallel, &[Running, Cancelled]).status, Running);
    }

    #[test]
    fn chain_dispatches_only_first_child() {
        let eval = evaluate(JobMethod::Chain, &[Waiting, Waiting, Waiting]);
        assert_eq!(eval.status, Running);
        assert_eq!(eval.dispatch, vec![0]);
    }

    #[test]
    fn chain_waits_for_running_child() {
        let eval = evaluate(JobMethod::Series, &[Success, Running, Waiting]);
        assert_eq!(eval.status, Running);
        assert!(eval.dispatch.is_empty());
    }

    #[test]
    fn chain_advances_after_success() {
        let eval = evaluate(JobMethod::Chain, &[Success, Waiting, Waiting]);
        assert_eq!(eval.dispatch, vec![1]);
    }

    #[test]
    fn chain_failure_halts_remaining_children() {
        let eval = evaluate(JobMethod::Chain, &[Success, Failure, Waiting, Waiting]);
        assert_eq!(eval.status, Failure);
        assert!(eval.dispatch.is_empty());
        assert_eq!(eval.cancel, vec![2, 3]);
    }

    #[test]
    fn chain_cancelled_child_cancels_parent() {
        let eval = evaluate(JobMethod::Series, &[Cancelled, Waiting]);
        assert_eq!(eval.status, Cancelled);
        assert_eq!(eval.cancel, vec![1]);
    }

    #[test]
    fn chain_succeeds_when_all_succeed() {
        assert_eq!(evaluate(JobMethod::Chain, &[Success, Success]).status, Success);
    }

    #[test]
    fn evaluation_is_stable_after_settling() {
        let children = [Success, Failure, Cancelled];
        assert_eq!(
            evaluate(JobMethod::Chain, &children),
            evaluate(JobMethod::Chain, &children)
        );
    }
}
