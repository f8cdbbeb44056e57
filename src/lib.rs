//! A reusable thread barrier that can be aborted, releasing every thread waiting on it.
//!
//! The main type in this crate is [`AbortableBarrier`], which lets a fixed group of worker threads
//! run their work in lockstep "phases": every worker waits at the barrier at the end of each phase
//! until the whole group has arrived. Unlike `std::sync::Barrier`, any thread can call
//! [`abort`] to give up on the group. Every thread waiting at the barrier wakes up with an
//! [`Aborted`] error, and from then on the barrier refuses to block anyone.
//!
//! The crate also contains [`AbortGuard`], a scope guard that aborts its barrier if the thread
//! holding it panics.
//!
//! Logging goes through the `log` facade. Aborts are reported at the `debug` level, and completed
//! phases and guard-triggered aborts at the `trace` level.
//!
//! [`AbortableBarrier`]: barrier/struct.AbortableBarrier.html
//! [`abort`]: barrier/struct.AbortableBarrier.html#method.abort
//! [`Aborted`]: barrier/struct.Aborted.html
//! [`AbortGuard`]: barrier/struct.AbortGuard.html

#![deny(warnings, missing_docs)]

pub mod barrier;
mod util;

pub use barrier::{AbortableBarrier, Aborted, AbortGuard};
