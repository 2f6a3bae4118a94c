//! Thread-local record of the executor currently polling a task.

use std::cell::RefCell;

use super::TestExecutor;

thread_local! {
    static CURRENT: RefCell<Option<TestExecutor>> = const { RefCell::new(None) };
}

/// Returns the executor polling the current task, if any.
///
/// Code running inside a task spawned on a [`TestExecutor`] can use this to
/// reach the executor's clock or spawn siblings without threading a handle
/// through.
#[must_use]
pub fn current() -> Option<TestExecutor> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Restores the previous executor when dropped.
pub(crate) struct EnterGuard {
    previous: Option<TestExecutor>,
}

pub(crate) fn enter(executor: &TestExecutor) -> EnterGuard {
    let previous = CURRENT.with(|current| current.borrow_mut().replace(executor.clone()));
    EnterGuard { previous }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_restores_previous() {
        let outer = TestExecutor::new();
        let inner = TestExecutor::new();
        inner.clock().advance(std::time::Duration::from_secs(1));

        let _outer_guard = enter(&outer);
        {
            let _inner_guard = enter(&inner);
            assert_eq!(current().unwrap().clock().now().as_secs(), 1);
        }
        assert_eq!(current().unwrap().clock().now().as_secs(), 0);
    }
}
