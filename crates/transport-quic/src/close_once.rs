use parking_lot::Mutex;

/// Closed flag plus the recorded teardown result, behind one lock.
///
/// The first [`CloseOnce::close_with`] runs the teardown; every later call
/// gets a clone of the recorded result.
#[derive(Debug)]
pub(crate) struct CloseOnce<E> {
    result: Mutex<Option<Result<(), E>>>,
}

impl<E: Clone> CloseOnce<E> {
    pub(crate) fn new() -> Self {
        Self {
            result: Mutex::new(None),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.result.lock().is_some()
    }

    /// The recorded teardown result, if closed.
    pub(crate) fn result(&self) -> Option<Result<(), E>> {
        self.result.lock().clone()
    }

    /// `teardown` must not block; it runs with the lock held.
    pub(crate) fn close_with(&self, teardown: impl FnOnce() -> Result<(), E>) -> Result<(), E> {
        let mut result = self.result.lock();
        if let Some(recorded) = result.as_ref() {
            return recorded.clone();
        }

        let outcome = teardown();
        *result = Some(outcome.clone());
        outcome
    }
}
