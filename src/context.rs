//! Execution-context identity.
//!
//! Callback registrations are scoped to an execution context: each
//! context owns an isolated, ordered callback list, and a raise only
//! sees the callbacks of the context it runs in. A context is either an
//! OS thread (the default) or an explicitly allocated logical task.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Identity of the execution context that owns a callback list.
///
/// [`ContextId::current`] derives the id from the calling thread.
/// [`ContextId::task`] allocates a fresh id for a logical task that may
/// migrate across threads; pass it by value to wherever registration and
/// dispatch happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Scope);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Scope {
    Thread(ThreadId),
    Task(u64),
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    /// The context of the calling thread.
    pub fn current() -> Self {
        ContextId(Scope::Thread(thread::current().id()))
    }

    /// A fresh context detached from any thread.
    pub fn task() -> Self {
        ContextId(Scope::Task(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Scope::Thread(id) => write!(f, "thread:{:?}", id),
            Scope::Task(id) => write!(f, "task:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_stable_within_a_thread() {
        assert_eq!(ContextId::current(), ContextId::current());
    }

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(ContextId::task(), ContextId::task());
    }

    #[test]
    fn threads_get_distinct_contexts() {
        let here = ContextId::current();
        let there = thread::spawn(ContextId::current).join().unwrap();
        assert_ne!(here, there);
    }
}
