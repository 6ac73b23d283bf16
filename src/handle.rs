//! Handles to supervised threads: bounded join or detach, exactly once.

use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};

/// Result of a bounded join.
#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome<T> {
    /// The thread finished within the timeout.
    Finished(T),
    /// The thread finished within the timeout by panicking.
    Panicked,
    /// The timeout elapsed; the thread has been detached.
    TimedOut,
}

/// Owned reference to a running thread.
///
/// Both [`join_timeout`](Self::join_timeout) and [`detach`](Self::detach)
/// consume the handle, so a thread is joined or abandoned once and never
/// both.
#[derive(Debug)]
pub struct WorkerHandle<T = ()> {
    name: String,
    thread: JoinHandle<T>,
    done: Receiver<()>,
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Spawn `f` on a named thread.
    pub fn spawn<F>(name: impl Into<String>, f: F) -> io::Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let name = name.into();
        // Never sent on: the sender is dropped when the thread body ends,
        // including on unwind, which disconnects the receiver.
        let (done_tx, done_rx) = bounded::<()>(1);
        let thread = thread::Builder::new().name(name.clone()).spawn(move || {
            let _done = done_tx;
            f()
        })?;
        Ok(Self {
            name,
            thread,
            done: done_rx,
        })
    }
}

impl<T> WorkerHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait at most `timeout` for the thread to finish, detaching it if it
    /// does not.
    pub fn join_timeout(self, timeout: Duration) -> JoinOutcome<T> {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                drop(self.thread);
                JoinOutcome::TimedOut
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match self.thread.join() {
                Ok(value) => JoinOutcome::Finished(value),
                Err(_) => JoinOutcome::Panicked,
            },
        }
    }

    /// Abandon the thread without waiting for it.
    pub fn detach(self) {
        drop(self.thread);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    #[test]
    fn join_returns_the_thread_result() {
        let handle = WorkerHandle::spawn("answer", || 42).unwrap();
        assert_eq!(handle.name(), "answer");
        assert_eq!(
            handle.join_timeout(Duration::from_secs(5)),
            JoinOutcome::Finished(42)
        );
    }

    #[test]
    fn join_reports_panics() {
        let handle = WorkerHandle::spawn("boom", || -> () { panic!("boom") }).unwrap();
        assert_eq!(
            handle.join_timeout(Duration::from_secs(5)),
            JoinOutcome::Panicked
        );
    }

    #[test]
    fn join_times_out_on_stuck_thread() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = release.clone();
        let handle = WorkerHandle::spawn("stuck", move || {
            while !flag.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        let started = Instant::now();
        assert_eq!(
            handle.join_timeout(Duration::from_millis(50)),
            JoinOutcome::TimedOut
        );
        assert!(started.elapsed() < Duration::from_secs(2));
        release.store(true, Ordering::Release);
    }

    #[test]
    fn detach_does_not_wait() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = release.clone();
        let handle = WorkerHandle::spawn("detached", move || {
            while !flag.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(5));
            }
        })
        .unwrap();

        let started = Instant::now();
        handle.detach();
        assert!(started.elapsed() < Duration::from_millis(500));
        release.store(true, Ordering::Release);
    }
}
