//! Crate-private helpers for working with the barrier's lock.

use std::sync::{LockResult, PoisonError};

// Take the guard out of a LockResult whether or not the lock was poisoned.
//
// Every critical section on the barrier state leaves it consistent between statements and none
// of them panic, so a poisoned lock still guards usable state.
pub fn guts<T>(res: LockResult<T>) -> T {
    res.unwrap_or_else(PoisonError::into_inner)
}
