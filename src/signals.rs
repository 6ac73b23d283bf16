//! Termination signal handling.
//!
//! Every qualifying signal goes through one handler that only touches
//! atomics. The first one requests an orderly shutdown; the second one takes
//! the emergency path: best-effort PID file unlink and `_exit(1)`.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use anyhow::Result;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// Signals treated as a shutdown request. All are handled identically.
pub const QUALIFYING_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

/// Exit status of the emergency path.
pub const EMERGENCY_EXIT_CODE: i32 = 1;

/// Process shutdown state. Only ever moves forward.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownState {
    Running = 0,
    StopRequested = 1,
    Terminated = 2,
}

impl ShutdownState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::StopRequested,
            _ => Self::Terminated,
        }
    }
}

/// What the handler must do after recording a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// First signal: orderly shutdown through the coordinator.
    Shutdown,
    /// Repeated signal: skip all cleanup and terminate now.
    Emergency,
}

/// Process-wide shutdown flag with escalation on repeated signals.
#[derive(Debug)]
pub struct SignalGate {
    state: AtomicU8,
    count: AtomicUsize,
}

static GATE: SignalGate = SignalGate::new();

/// The gate wired to the installed signal handler.
pub fn gate() -> &'static SignalGate {
    &GATE
}

impl SignalGate {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            count: AtomicUsize::new(0),
        }
    }

    /// Count one qualifying signal and request shutdown.
    ///
    /// Async-signal-safe: two atomic read-modify-writes and nothing else.
    pub fn record_signal(&self) -> Escalation {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        self.advance(ShutdownState::StopRequested);
        if count >= 2 {
            Escalation::Emergency
        } else {
            Escalation::Shutdown
        }
    }

    /// Lock-free read, callable from any thread.
    #[inline]
    pub fn should_shutdown(&self) -> bool {
        self.state.load(Ordering::Acquire) != ShutdownState::Running as u8
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn signal_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Final transition, taken once the shutdown sequence has completed.
    pub fn mark_terminated(&self) {
        self.advance(ShutdownState::Terminated);
    }

    fn advance(&self, to: ShutdownState) {
        self.state.fetch_max(to as u8, Ordering::SeqCst);
    }
}

impl Default for SignalGate {
    fn default() -> Self {
        Self::new()
    }
}

extern "C" fn on_signal(_signal: libc::c_int) {
    if GATE.record_signal() == Escalation::Emergency {
        crate::pidfile::global().remove_emergency();
        // SAFETY: _exit(2) is async-signal-safe and does not return.
        unsafe { libc::_exit(EMERGENCY_EXIT_CODE) }
    }
}

/// Register the shutdown handler for every qualifying signal.
pub fn install() -> Result<&'static SignalGate> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for sig in QUALIFYING_SIGNALS {
        // SAFETY: the handler only uses atomics, unlink(2) and _exit(2).
        unsafe { signal::sigaction(sig, &action) }.map_err(|e| {
            anyhow::anyhow!(
                "Failed to register {} handler: {e}. Signal handling is required for orderly shutdown.",
                sig.as_str()
            )
        })?;
    }
    log::debug!("Installed shutdown handler for SIGINT, SIGTERM, SIGHUP, SIGQUIT");
    Ok(&GATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_signal_requests_shutdown() {
        let gate = SignalGate::new();
        assert!(!gate.should_shutdown());
        assert_eq!(gate.state(), ShutdownState::Running);

        assert_eq!(gate.record_signal(), Escalation::Shutdown);
        assert!(gate.should_shutdown());
        assert_eq!(gate.state(), ShutdownState::StopRequested);
        assert_eq!(gate.signal_count(), 1);
    }

    #[test]
    fn every_later_signal_escalates_and_flag_never_reverts() {
        let gate = SignalGate::new();
        gate.record_signal();
        for n in 2..10 {
            assert_eq!(gate.record_signal(), Escalation::Emergency);
            assert!(gate.should_shutdown());
            assert_eq!(gate.signal_count(), n);
        }
    }

    #[test]
    fn state_is_monotonic() {
        let gate = SignalGate::new();
        gate.record_signal();
        gate.mark_terminated();
        assert_eq!(gate.state(), ShutdownState::Terminated);

        gate.record_signal();
        assert_eq!(gate.state(), ShutdownState::Terminated);
        assert!(gate.should_shutdown());
    }

    #[test]
    fn concurrent_signals_count_exactly() {
        let gate = std::sync::Arc::new(SignalGate::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|_| gate.record_signal() == Escalation::Shutdown)
                        .count()
                })
            })
            .collect();
        let first_signals: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();

        assert_eq!(first_signals, 1);
        assert_eq!(gate.signal_count(), 800);
    }

    // The only test in this binary that delivers a real signal to itself:
    // a second one would take the emergency path and kill the test runner.
    #[test]
    fn installed_handler_flips_the_global_gate() {
        let gate = install().unwrap();
        assert!(!gate.should_shutdown());

        signal::raise(Signal::SIGHUP).unwrap();

        assert!(gate.should_shutdown());
        assert_eq!(gate.signal_count(), 1);
    }
}
