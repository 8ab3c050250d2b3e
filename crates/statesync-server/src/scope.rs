//! Per-thread commit scope
//!
//! Records which channel guards the current thread holds. While any guard is
//! held, a write to a channel whose guard is not held is queued and runs once
//! the thread has released its outermost guard, so a thread never waits for
//! a second channel guard while holding one.

use std::cell::RefCell;
use std::collections::VecDeque;

type Deferred = Box<dyn FnOnce()>;

#[derive(Default)]
struct Scope {
    held: Vec<usize>,
    deferred: VecDeque<Deferred>,
}

thread_local! {
    static SCOPE: RefCell<Scope> = RefCell::new(Scope::default());
}

/// Marks a channel guard as held by this thread until dropped
pub(crate) struct Entered {
    key: usize,
}

impl Entered {
    pub(crate) fn new(key: usize) -> Self {
        SCOPE.with(|s| s.borrow_mut().held.push(key));
        Self { key }
    }
}

impl Drop for Entered {
    fn drop(&mut self) {
        SCOPE.with(|s| {
            let mut scope = s.borrow_mut();
            if let Some(pos) = scope.held.iter().rposition(|k| *k == self.key) {
                scope.held.remove(pos);
            }
        });
    }
}

/// True when this thread holds some channel guard other than `key`'s
pub(crate) fn must_defer(key: usize) -> bool {
    SCOPE.with(|s| {
        let scope = s.borrow();
        !scope.held.is_empty() && !scope.held.contains(&key)
    })
}

/// Queue a write until this thread releases its outermost guard
pub(crate) fn defer(job: impl FnOnce() + 'static) {
    SCOPE.with(|s| s.borrow_mut().deferred.push_back(Box::new(job)));
}

/// Run queued writes, unless a guard is still held
pub(crate) fn flush() {
    loop {
        let job = SCOPE.with(|s| {
            let mut scope = s.borrow_mut();
            if scope.held.is_empty() {
                scope.deferred.pop_front()
            } else {
                None
            }
        });
        match job {
            Some(job) => job(),
            None => break,
        }
    }
}
