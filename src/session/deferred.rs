//! Work postponed to the next coordinator tick

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::session::phase::SessionPhase;

/// An action the coordinator applies after the current tick's synchronous work
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredAction {
    /// Publish `phase_transition_completed` for this phase
    CompletePhaseTransition(SessionPhase),
    /// Close the active round with the victory manager's result
    FinishRound,
    /// Request a phase transition
    Transition(SessionPhase),
}

/// FIFO of deferred actions. Cloning shares the queue, so bus handlers can
/// hold a handle and push without touching the coordinator.
#[derive(Debug, Clone, Default)]
pub struct DeferredQueue {
    actions: Rc<RefCell<VecDeque<DeferredAction>>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, action: DeferredAction) {
        self.actions.borrow_mut().push_back(action);
    }

    pub fn len(&self) -> usize {
        self.actions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.borrow().is_empty()
    }

    /// Take everything queued so far. Actions pushed while the caller works
    /// through the batch land in the next one.
    pub fn take(&self) -> VecDeque<DeferredAction> {
        std::mem::take(&mut *self.actions.borrow_mut())
    }

    pub fn clear(&self) {
        self.actions.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_preserves_order() {
        let queue = DeferredQueue::new();
        queue.push(DeferredAction::FinishRound);
        queue.push(DeferredAction::Transition(SessionPhase::MapView));

        let batch: Vec<_> = queue.take().into_iter().collect();
        assert_eq!(
            batch,
            vec![
                DeferredAction::FinishRound,
                DeferredAction::Transition(SessionPhase::MapView),
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_during_drain_goes_to_next_batch() {
        let queue = DeferredQueue::new();
        let handle = queue.clone();
        queue.push(DeferredAction::FinishRound);

        for _ in queue.take() {
            handle.push(DeferredAction::CompletePhaseTransition(SessionPhase::Menu));
        }
        assert_eq!(queue.len(), 1);
    }
}
