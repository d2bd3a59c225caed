/*!
 * Completion Pool
 * Bounded pool of in-flight send handles with explicit backpressure
 *
 * The pool never queues: when every handle is out, callers observe
 * `acquire() == None` and drop work instead of blocking. Handles release
 * their slot when dropped, which the send callback does after recording the
 * result.
 */

use std::cell::Cell;
use std::rc::Rc;

struct PoolState {
    capacity: usize,
    executing: Cell<usize>,
}

/// Bounded pool of completion handles (single-threaded, no locks)
pub struct CompletionPool {
    state: Rc<PoolState>,
}

impl CompletionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Rc::new(PoolState {
                capacity,
                executing: Cell::new(0),
            }),
        }
    }

    /// Take a handle, or `None` when the pool is exhausted
    pub fn acquire(&self) -> Option<Completion> {
        let executing = self.state.executing.get();
        if executing < self.state.capacity {
            self.state.executing.set(executing + 1);
            Some(Completion {
                state: Rc::clone(&self.state),
            })
        } else {
            None
        }
    }

    /// Number of handles currently out of the pool
    pub fn executing(&self) -> usize {
        self.state.executing.get()
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity
    }
}

/// Handle for one in-flight send; returns to the pool on drop
pub struct Completion {
    state: Rc<PoolState>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let executing = self.state.executing.get();
        debug_assert!(executing > 0);
        self.state.executing.set(executing.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_bounds_acquisitions() {
        let pool = CompletionPool::new(2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_eq!(pool.executing(), 2);

        drop(a);
        assert_eq!(pool.executing(), 1);
        let c = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        drop(b);
        drop(c);
        assert_eq!(pool.executing(), 0);
    }

    #[test]
    fn test_pool_empty_capacity() {
        let pool = CompletionPool::new(0);
        assert!(pool.acquire().is_none());
    }
}
