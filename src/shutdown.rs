//! The termination sequence run once a shutdown has been requested.

use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::ShutdownConfig;
use crate::handle::{JoinOutcome, WorkerHandle};
use crate::pidfile::PidFileManager;
use crate::server::ServerLifecycle;
use crate::signals::SignalGate;
use crate::worker::WorkerExit;

/// How the server thread ended during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerJoin {
    Finished,
    Panicked,
    /// Still running at the join timeout and abandoned.
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub server: ServerJoin,
    pub workers_detached: usize,
    pub elapsed: Duration,
}

/// Stops the server with a bounded join, abandons the periodic workers and
/// releases the PID file. Never blocks longer than grace + join timeout.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownCoordinator {
    grace: Duration,
    join_timeout: Duration,
}

impl ShutdownCoordinator {
    pub const fn new(grace: Duration, join_timeout: Duration) -> Self {
        Self {
            grace,
            join_timeout,
        }
    }

    pub fn from_config(cfg: &ShutdownConfig) -> Self {
        Self::new(cfg.grace(), cfg.join_timeout())
    }

    pub fn run(
        &self,
        server: ServerLifecycle,
        workers: Vec<WorkerHandle<WorkerExit>>,
        pid_file: &PidFileManager,
        gate: &SignalGate,
    ) -> ShutdownReport {
        let started = Instant::now();
        info!("Shutting down server...");

        server.stop();
        thread::sleep(self.grace);

        info!("Waiting for server thread to finish...");
        let server_join = match server.into_handle().join_timeout(self.join_timeout) {
            JoinOutcome::Finished(()) => {
                info!("Server thread finished cleanly");
                ServerJoin::Finished
            }
            JoinOutcome::Panicked => {
                error!("Server thread panicked");
                ServerJoin::Panicked
            }
            JoinOutcome::TimedOut => {
                warn!(
                    "Server thread did not finish within {:?}, detaching",
                    self.join_timeout
                );
                ServerJoin::Detached
            }
        };

        let workers_detached = workers.len();
        for worker in workers {
            info!("Detaching {} thread", worker.name());
            worker.detach();
        }

        pid_file.remove_normal();

        gate.mark_terminated();
        info!("Server shutdown complete");

        ShutdownReport {
            server: server_join,
            workers_detached,
            elapsed: started.elapsed(),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::from_config(&ShutdownConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::NetworkServer;
    use crate::signals::ShutdownState;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Cooperative {
        running: AtomicBool,
    }

    impl NetworkServer for Cooperative {
        fn serve(&self) -> anyhow::Result<()> {
            while self.running.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }

        fn stop(&self) {
            self.running.store(false, Ordering::Release);
        }
    }

    fn stuck_worker(release: &Arc<AtomicBool>) -> WorkerHandle<WorkerExit> {
        let release = release.clone();
        WorkerHandle::spawn("stuck", move || {
            while !release.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(5));
            }
            WorkerExit::Shutdown
        })
        .unwrap()
    }

    #[test]
    fn full_sequence_with_cooperative_server() {
        let dir = tempfile::tempdir().unwrap();
        let pid_path = dir.path().join("conspire.pid");
        let pid_file = PidFileManager::new();
        pid_file.create(&pid_path).unwrap();

        let gate = SignalGate::new();
        gate.record_signal();

        let server = ServerLifecycle::start(Arc::new(Cooperative {
            running: AtomicBool::new(true),
        }))
        .unwrap();
        let release = Arc::new(AtomicBool::new(false));
        let workers = vec![stuck_worker(&release), stuck_worker(&release)];

        let coordinator =
            ShutdownCoordinator::new(Duration::from_millis(20), Duration::from_secs(1));
        let report = coordinator.run(server, workers, &pid_file, &gate);

        assert_eq!(report.server, ServerJoin::Finished);
        assert_eq!(report.workers_detached, 2);
        // Stuck workers were not waited for.
        assert!(report.elapsed < Duration::from_millis(900));
        assert!(!pid_path.exists());
        assert!(!pid_file.is_owned());
        assert_eq!(gate.state(), ShutdownState::Terminated);
        release.store(true, Ordering::Release);
    }
}
