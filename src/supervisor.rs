//! Top-level driver: PID file, start-up of the three activities, waiting for
//! a shutdown request and handing over to the coordinator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::tick;
use log::{error, info};

use crate::config::ShutdownConfig;
use crate::handle::WorkerHandle;
use crate::pidfile::PidFileManager;
use crate::server::{NetworkServer, ServerLifecycle};
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::signals::SignalGate;
use crate::worker::{PeriodicWorker, WorkerExit};

/// Unit of work boxed so both workers share one type.
pub type BoxedUnit = Box<dyn FnMut() -> Result<()> + Send>;

/// Everything the supervisor runs, built only after the PID file exists.
pub struct Activities<S> {
    pub server: Arc<S>,
    pub keepalive: PeriodicWorker<BoxedUnit>,
    pub statistics: PeriodicWorker<BoxedUnit>,
}

pub struct Supervisor {
    gate: &'static SignalGate,
    pid_file: &'static PidFileManager,
    pid_path: Option<PathBuf>,
    wait_poll: Duration,
    coordinator: ShutdownCoordinator,
}

impl Supervisor {
    pub fn new(
        gate: &'static SignalGate,
        pid_file: &'static PidFileManager,
        pid_path: Option<PathBuf>,
        shutdown: &ShutdownConfig,
    ) -> Self {
        Self {
            gate,
            pid_file,
            pid_path,
            wait_poll: shutdown.wait_poll(),
            coordinator: ShutdownCoordinator::from_config(shutdown),
        }
    }

    /// Create the PID file, build and start the activities, block until a
    /// shutdown is requested, then run the termination sequence.
    ///
    /// A PID file failure returns before `build` is called, so nothing is
    /// started.
    pub fn run<S, B>(self, build: B) -> Result<ShutdownReport>
    where
        S: NetworkServer,
        B: FnOnce() -> Result<Activities<S>>,
    {
        if let Some(path) = &self.pid_path {
            self.pid_file.create(path)?;
        }

        let activities = match build() {
            Ok(activities) => activities,
            Err(e) => {
                self.pid_file.remove_normal();
                return Err(e);
            }
        };

        let server = match ServerLifecycle::start(activities.server) {
            Ok(server) => server,
            Err(e) => {
                self.pid_file.remove_normal();
                return Err(e).context("Failed to start server thread");
            }
        };

        let workers = match self.spawn_workers(activities.keepalive, activities.statistics) {
            Ok(workers) => workers,
            Err(e) => {
                error!("Failed to start periodic workers, stopping server");
                server.stop();
                server.into_handle().detach();
                self.pid_file.remove_normal();
                return Err(e);
            }
        };

        info!("Server started (pid {})", std::process::id());
        self.wait_for_shutdown();

        Ok(self
            .coordinator
            .run(server, workers, self.pid_file, self.gate))
    }

    fn spawn_workers(
        &self,
        keepalive: PeriodicWorker<BoxedUnit>,
        statistics: PeriodicWorker<BoxedUnit>,
    ) -> Result<Vec<WorkerHandle<WorkerExit>>> {
        let keepalive = keepalive
            .spawn(self.gate)
            .context("Failed to start keepalive thread")?;
        let statistics = statistics
            .spawn(self.gate)
            .context("Failed to start statistics thread")?;
        Ok(vec![keepalive, statistics])
    }

    fn wait_for_shutdown(&self) {
        let ticker = tick(self.wait_poll);
        while !self.gate.should_shutdown() {
            if ticker.recv().is_err() {
                break;
            }
        }
    }
}
