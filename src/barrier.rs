//! Support module for `AbortableBarrier` and related structs.
//!
//! See the documentation of the [`AbortableBarrier`] struct for more information.
//!
//! [`AbortableBarrier`]: struct.AbortableBarrier.html

use std::fmt;
use std::sync::{Condvar, Mutex};
use std::thread;

use log::{debug, trace};
use thiserror::Error;

use crate::util;

/// A reusable barrier for a fixed group of threads, which any thread can abort to release the
/// whole group at once.
///
/// An `AbortableBarrier` is created for a set number of workers. Each worker calls
/// `wait_at_barrier` when it finishes a "phase" of its work, and blocks there until every other
/// worker has done the same. The barrier then resets itself so the group can do the same for the
/// next phase, and so on for as long as the workers keep going.
///
/// What sets this apart from `std::sync::Barrier` is `abort`. When one worker (or some
/// supervising thread) decides the group can't continue, for example because one worker hit an
/// error the others can't recover from, it calls `abort`. Every thread blocked in
/// `wait_at_barrier` wakes up with an `Aborted` error, and every later call to `wait_at_barrier`
/// or `check_aborted` returns the same error without blocking. Workers in the middle of a long
/// computation can call `check_aborted` every so often to notice the abort without waiting for
/// the rest of the group.
///
/// Aborting is permanent. There is no way to reset an aborted barrier; make a new one instead.
///
/// # Example
///
/// Four workers run phases of work in lockstep until worker 2 gives up partway through its third
/// phase. Since worker 2 never reaches the barrier for that phase, nobody gets through it, and
/// every worker (including worker 2) ends with `Aborted`.
///
/// ```
/// use abortable_barrier::{AbortableBarrier, Aborted};
/// use std::sync::Arc;
/// use std::thread;
///
/// let worker_count = 4;
/// let barrier = Arc::new(AbortableBarrier::new(worker_count));
///
/// let handles: Vec<_> = (0..worker_count).map(|i| {
///     let barrier = barrier.clone();
///     thread::spawn(move || -> Result<(), Aborted> {
///         let mut phase = 0;
///         loop {
///             // do some work for this phase, checking in with the barrier now and then
///             barrier.check_aborted()?;
///
///             if i == 2 && phase == 2 {
///                 println!("worker {} can't continue!", i);
///                 barrier.abort();
///             }
///
///             barrier.wait_at_barrier()?;
///             phase += 1;
///         }
///     })
/// }).collect();
///
/// for handle in handles {
///     assert_eq!(handle.join().unwrap(), Err(Aborted));
/// }
/// ```
pub struct AbortableBarrier {
    worker_count: usize,
    state: Mutex<BarrierState>,
    cond: Condvar,
}

struct BarrierState {
    /// Workers yet to call `wait_at_barrier` for the current phase. Never rests at zero.
    arrivals_remaining: usize,
    /// Bumped (wrapping) every time a phase completes.
    generation: usize,
    aborted: bool,
}

/// The error returned by [`AbortableBarrier`] methods once the barrier has been aborted.
///
/// See [`AbortableBarrier::abort`] for more details.
///
/// [`AbortableBarrier`]: struct.AbortableBarrier.html
/// [`AbortableBarrier::abort`]: struct.AbortableBarrier.html#method.abort
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("the barrier was aborted")]
pub struct Aborted;

impl AbortableBarrier {
    /// Creates a new `AbortableBarrier` for a group of `worker_count` threads.
    ///
    /// A barrier for a single worker never blocks: every call to `wait_at_barrier` completes a
    /// phase on its own and returns `Ok(true)`.
    ///
    /// # Panics
    ///
    /// This function panics if `worker_count` is zero, since no phase could ever complete.
    pub fn new(worker_count: usize) -> AbortableBarrier {
        assert!(worker_count > 0, "an AbortableBarrier needs at least one worker");

        AbortableBarrier::starting_at(worker_count, 0)
    }

    fn starting_at(worker_count: usize, generation: usize) -> AbortableBarrier {
        AbortableBarrier {
            worker_count: worker_count,
            state: Mutex::new(BarrierState {
                arrivals_remaining: worker_count,
                generation: generation,
                aborted: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Returns the number of workers that must reach the barrier to complete a phase.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Blocks the current thread until every worker in the group has reached the barrier for
    /// this phase, or until the barrier is aborted.
    ///
    /// Each worker should call this exactly once per phase. The worker whose arrival completes the
    /// phase does not block at all, and receives `Ok(true)`. Every other worker receives
    /// `Ok(false)` once the phase completes, so exactly one worker per phase sees `true`.
    ///
    /// # Errors
    ///
    /// If the barrier has already been aborted, this returns `Err(Aborted)` immediately, without
    /// registering an arrival.
    ///
    /// If the barrier is aborted while this thread is blocked, this returns `Err(Aborted)` as
    /// soon as the thread wakes up. The exception is when the final worker for the phase arrived
    /// before the abort: in that case the phase already completed, and every worker in it gets
    /// its normal result. A single phase never ends with some workers released and others
    /// aborted.
    ///
    /// # Example
    ///
    /// ```
    /// use abortable_barrier::AbortableBarrier;
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// let barrier = Arc::new(AbortableBarrier::new(3));
    ///
    /// let handles: Vec<_> = (0..3).map(|_| {
    ///     let barrier = barrier.clone();
    ///     thread::spawn(move || barrier.wait_at_barrier().unwrap())
    /// }).collect();
    ///
    /// let triggered = handles.into_iter()
    ///                        .map(|h| h.join().unwrap())
    ///                        .filter(|&t| t)
    ///                        .count();
    /// assert_eq!(triggered, 1);
    /// ```
    pub fn wait_at_barrier(&self) -> Result<bool, Aborted> {
        let mut state = util::guts(self.state.lock());

        if state.aborted {
            return Err(Aborted);
        }

        state.arrivals_remaining -= 1;

        if state.arrivals_remaining == 0 {
            // overflow is fine, waiters only compare against their own snapshot
            state.generation = state.generation.wrapping_add(1);
            state.arrivals_remaining = self.worker_count;
            trace!("barrier phase complete, now at generation {}", state.generation);

            self.cond.notify_all();
            return Ok(true);
        }

        let generation = state.generation;
        loop {
            state = util::guts(self.cond.wait(state));

            // a completed phase wins over an abort that came after it
            if state.generation != generation {
                return Ok(false);
            }

            if state.aborted {
                return Err(Aborted);
            }
        }
    }

    /// Checks whether the barrier has been aborted, without blocking.
    ///
    /// This is meant for workers in the middle of a long stretch of work, so they can stop early
    /// once some other thread has aborted the group. It has no effect on the barrier itself.
    ///
    /// # Errors
    ///
    /// Returns `Err(Aborted)` if `abort` has been called on this barrier.
    pub fn check_aborted(&self) -> Result<(), Aborted> {
        if self.is_aborted() {
            Err(Aborted)
        } else {
            Ok(())
        }
    }

    /// Returns whether `abort` has been called on this barrier.
    pub fn is_aborted(&self) -> bool {
        util::guts(self.state.lock()).aborted
    }

    /// Aborts the barrier, waking every thread blocked in `wait_at_barrier` and causing every
    /// future call to `wait_at_barrier` or `check_aborted` to return `Err(Aborted)`.
    ///
    /// Returns `true` if this call aborted the barrier, or `false` if it was already aborted.
    /// When several threads race to abort the same barrier, exactly one of them gets `true`.
    ///
    /// This never blocks beyond briefly taking the barrier's internal lock.
    pub fn abort(&self) -> bool {
        let mut state = util::guts(self.state.lock());

        if state.aborted {
            return false;
        }

        state.aborted = true;
        debug!("barrier aborted with {} of {} workers waiting",
               self.worker_count - state.arrivals_remaining,
               self.worker_count);

        self.cond.notify_all();
        true
    }

    /// Returns a guard object that aborts this barrier if it is dropped while its thread is
    /// panicking.
    ///
    /// A worker that panics between phases would otherwise leave the rest of the group blocked at
    /// the barrier forever, waiting on an arrival that will never come. Holding one of these
    /// guards for the duration of the worker's loop turns that panic into an abort, so the other
    /// workers are released with `Err(Aborted)` instead.
    ///
    /// Dropping the guard normally does nothing to the barrier.
    ///
    /// # Example
    ///
    /// ```
    /// use abortable_barrier::{AbortableBarrier, Aborted};
    /// use std::sync::Arc;
    /// use std::thread;
    ///
    /// let barrier = Arc::new(AbortableBarrier::new(2));
    ///
    /// let waiter = {
    ///     let barrier = barrier.clone();
    ///     thread::spawn(move || barrier.wait_at_barrier())
    /// };
    ///
    /// let doomed = {
    ///     let barrier = barrier.clone();
    ///     thread::spawn(move || {
    ///         let _guard = barrier.abort_guard();
    ///         panic!("something went terribly wrong");
    ///     })
    /// };
    ///
    /// assert!(doomed.join().is_err());
    /// assert_eq!(waiter.join().unwrap(), Err(Aborted));
    /// ```
    pub fn abort_guard(&self) -> AbortGuard<'_> {
        AbortGuard::new(self)
    }

    #[cfg(test)]
    fn parked(&self) -> usize {
        // anyone who has arrived in the current phase released the lock by parking on the condvar
        self.worker_count - util::guts(self.state.lock()).arrivals_remaining
    }
}

impl fmt::Debug for AbortableBarrier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = util::guts(self.state.lock());

        f.debug_struct("AbortableBarrier")
            .field("worker_count", &self.worker_count)
            .field("arrivals_remaining", &state.arrivals_remaining)
            .field("generation", &state.generation)
            .field("aborted", &state.aborted)
            .finish()
    }
}

/// An opaque guard struct that aborts a borrowed `AbortableBarrier` if its thread panics.
///
/// See [`AbortableBarrier::abort_guard`] for more information about this struct.
///
/// [`AbortableBarrier::abort_guard`]: struct.AbortableBarrier.html#method.abort_guard
#[must_use = "the barrier is only protected while the guard is held"]
pub struct AbortGuard<'a> {
    barrier: &'a AbortableBarrier,
}

impl<'a> AbortGuard<'a> {
    fn new(barrier: &'a AbortableBarrier) -> AbortGuard<'a> {
        AbortGuard {
            barrier: barrier,
        }
    }

    /// Aborts the parent barrier right away, consuming the guard.
    ///
    /// Returns the same value as [`AbortableBarrier::abort`].
    ///
    /// [`AbortableBarrier::abort`]: struct.AbortableBarrier.html#method.abort
    pub fn abort_now(self) -> bool {
        self.barrier.abort()
    }
}

/// Upon drop during a panic, this guard will abort its parent `AbortableBarrier`. A normal drop
/// leaves the barrier alone.
impl<'a> Drop for AbortGuard<'a> {
    fn drop(&mut self) {
        if thread::panicking() && self.barrier.abort() {
            trace!("barrier aborted by a guard on a panicking thread");
        }
    }
}
