use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ProcessError;

use super::result::FakeProcessResult;
use super::FakeOutcome;

/// An ordered queue of fake outcomes, one consumed per matching invocation.
///
/// Clones share the same queue, so a sequence registered as a fake keeps
/// its position across every process that matches it.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessSequence {
    state: Arc<Mutex<SequenceState>>,
}

#[derive(Debug, Default)]
struct SequenceState {
    queue: VecDeque<FakeOutcome>,
    when_empty: Option<FakeOutcome>,
}

impl FakeProcessSequence {
    pub fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FakeOutcome>,
    {
        let sequence = Self::default();
        sequence
            .lock()
            .queue
            .extend(items.into_iter().map(Into::into));
        sequence
    }

    pub fn push(self, item: impl Into<FakeOutcome>) -> Self {
        self.lock().queue.push_back(item.into());
        self
    }

    /// Serve `outcome` for every invocation after the queue runs dry.
    pub fn when_empty(self, outcome: impl Into<FakeOutcome>) -> Self {
        self.lock().when_empty = Some(outcome.into());
        self
    }

    /// Serve an empty successful result once the queue runs dry.
    pub fn dont_fail_when_empty(self) -> Self {
        self.when_empty(FakeProcessResult::new())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Pop the next outcome, falling back to the exhaustion policy.
    pub(crate) fn next_outcome(&self) -> Result<FakeOutcome, ProcessError> {
        let mut state = self.lock();
        if let Some(outcome) = state.queue.pop_front() {
            return Ok(outcome);
        }
        state
            .when_empty
            .clone()
            .ok_or(ProcessError::SequenceExhausted)
    }

    fn lock(&self) -> MutexGuard<'_, SequenceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
