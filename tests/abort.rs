use abortable_barrier::{AbortableBarrier, Aborted};
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
enum JobError {
    #[error(transparent)]
    Aborted(#[from] Aborted),
    #[error("worker {0} hit a bad row")]
    BadRow(usize),
}

fn worker(id: usize, barrier: &AbortableBarrier, fail_at: Option<usize>) -> Result<usize, JobError> {
    let mut phase = 0;
    loop {
        barrier.check_aborted()?;

        if fail_at == Some(phase) {
            barrier.abort();
            return Err(JobError::BadRow(id));
        }

        barrier.wait_at_barrier()?;
        phase += 1;

        if phase == 10 {
            return Ok(phase);
        }
    }
}

#[test]
fn group_finishes_without_abort() {
    let barrier = AbortableBarrier::new(4);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|id| {
            let barrier = &barrier;
            s.spawn(move || worker(id, barrier, None))
        }).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.iter().all(|r| *r == Ok(10)));
    assert!(!barrier.is_aborted());
}

#[test]
fn failing_worker_stops_the_group() {
    let barrier = AbortableBarrier::new(4);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|id| {
            let barrier = &barrier;
            let fail_at = if id == 1 { Some(3) } else { None };
            s.spawn(move || worker(id, barrier, fail_at))
        }).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results[1], Err(JobError::BadRow(1)));
    for (id, result) in results.iter().enumerate() {
        if id != 1 {
            assert_eq!(*result, Err(JobError::Aborted(Aborted)));
        }
    }
}

#[test]
fn supervisor_interrupts_long_work() {
    let barrier = Arc::new(AbortableBarrier::new(3));
    let started = Arc::new(AtomicBool::new(false));
    let outcomes = Arc::new(SegQueue::new());

    let handles: Vec<_> = (0..3).map(|_| {
        let barrier = barrier.clone();
        let started = started.clone();
        let outcomes = outcomes.clone();
        thread::spawn(move || {
            let outcome = barrier.wait_at_barrier().and_then(|_| -> Result<(), Aborted> {
                started.store(true, Ordering::SeqCst);
                // "long-running" work that only stops when told to
                loop {
                    barrier.check_aborted()?;
                    thread::sleep(Duration::from_millis(1));
                }
            });
            outcomes.push(outcome);
        })
    }).collect();

    while !started.load(Ordering::SeqCst) {
        thread::yield_now();
    }
    assert!(barrier.abort());
    assert!(!barrier.abort());

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(outcomes.len(), 3);
    while let Some(outcome) = outcomes.pop() {
        assert_eq!(outcome, Err(Aborted));
    }
}

#[test]
fn aborted_error_converts_with_question_mark() {
    fn step(barrier: &AbortableBarrier) -> Result<(), JobError> {
        barrier.wait_at_barrier()?;
        Ok(())
    }

    let barrier = AbortableBarrier::new(2);
    barrier.abort();

    let err = step(&barrier).unwrap_err();
    assert_eq!(err, JobError::Aborted(Aborted));
    assert_eq!(err.to_string(), "the barrier was aborted");
}
