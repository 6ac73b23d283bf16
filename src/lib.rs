//! Conspire presence server.
//!
//! The interesting part is the process supervisor: a signal gate with
//! escalation, a PID file that the signal handler can remove, a listener
//! thread with a bounded-join shutdown and two periodic workers that are
//! abandoned rather than waited for.

pub mod cli;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod handle;
pub mod lobby;
pub mod pidfile;
pub mod server;
pub mod shutdown;
pub mod signals;
pub mod statistics;
pub mod supervisor;
pub mod worker;

pub use config::ServerConfig;
pub use error::{ConfigError, PidFileError, WorkerConfigError};
pub use handle::{JoinOutcome, WorkerHandle};
pub use pidfile::PidFileManager;
pub use server::{HttpServer, NetworkServer, ServerLifecycle};
pub use shutdown::{ServerJoin, ShutdownCoordinator, ShutdownReport};
pub use signals::{Escalation, ShutdownState, SignalGate};
pub use supervisor::{Activities, BoxedUnit, Supervisor};
pub use worker::{PeriodicWorker, PeriodicWorkerConfig, UnitOfWork, WorkerExit};
